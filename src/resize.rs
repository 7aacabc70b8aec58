//! `realloc`-style resizing.
//!
//! Resizing stays in place whenever the block itself, or the block plus a
//! free successor, can hold the new size. Only then does it fall back to
//! allocate, copy and release.
//!
//! ```text
//!   shrink:  ┌────────── csize ──────────┐
//!            │ asize (kept) │ rest (freed)│   rest >= MIN_BLOCK_SIZE
//!
//!   grow:    ┌── csize ──┬──── next (free) ────┐
//!            │     asize (kept)    │ rest     │   csize + next >= asize
//! ```

use log::{trace, warn};

use crate::{
  arena::Arena,
  block::{Block, MIN_BLOCK_SIZE, OVERHEAD, adjusted_size},
  heap::{Addr, Heap},
};

impl<A: Arena> Heap<A> {
  /// Changes the allocation at `ptr` to hold `size` bytes.
  ///
  /// - `ptr == None` behaves as [`allocate`](Self::allocate).
  /// - `size == 0` behaves as [`release`](Self::release) and returns `None`.
  /// - Otherwise the block is shrunk or grown in place when possible, or
  ///   moved with its first `min(old, new)` bytes copied over. On failure
  ///   `None` is returned and the original allocation is left untouched.
  ///
  /// A shrink whose leftover would be smaller than a minimum block returns
  /// `ptr` with the block unchanged, so its usable size stays what it was.
  pub fn resize(
    &mut self,
    ptr: Option<Addr>,
    size: usize,
  ) -> Option<Addr> {
    let Some(addr) = ptr else {
      return self.allocate(size);
    };

    if size == 0 {
      self.release(Some(addr));
      return None;
    }

    if self.start.is_none() {
      warn!("resize({:#x}) before the heap was initialized", addr.offset());
      return None;
    }

    let Some(asize) = adjusted_size(size) else {
      warn!("resize({:#x}, {size}) exceeds the largest block a tag can describe", addr.offset());
      self.stats.record_oom();
      return None;
    };

    let block = addr.block();
    let csize = block.size(self.arena.bytes());
    let old_usable = csize - OVERHEAD;

    if asize <= csize {
      if csize - asize >= MIN_BLOCK_SIZE {
        self.shrink_in_place(block, csize, asize);
      }

      let usable = self.usable(block);
      self.stats.record_resize(old_usable, usable, false);
      trace!("resize({:#x}, {size}) shrunk in place to {} bytes", addr.offset(), usable + OVERHEAD);
      return Some(addr);
    }

    if self.grow_in_place(block, csize, asize) {
      let usable = self.usable(block);
      self.stats.record_resize(old_usable, usable, false);
      trace!("resize({:#x}, {size}) grew in place to {} bytes", addr.offset(), usable + OVERHEAD);
      return Some(addr);
    }

    let moved = self.relocate(block, csize, size)?;
    let usable = self.usable(moved);
    self.stats.record_resize(old_usable, usable, true);
    trace!("resize({:#x}, {size}) moved to {:#x}", addr.offset(), moved.payload());
    Some(Addr::of(moved))
  }

  /// Keeps the first `asize` bytes of the block and frees the rest, which
  /// then coalesces with whatever follows.
  fn shrink_in_place(
    &mut self,
    block: Block,
    csize: usize,
    asize: usize,
  ) {
    let bytes = self.arena.bytes_mut();
    block.write(bytes, asize, true);

    let rest = block.next(asize);
    rest.write(bytes, csize - asize, true);
    self.release_block(rest);
  }

  /// Absorbs a free successor when the two together hold `asize` bytes,
  /// splitting off whatever is left over. Returns `false` if the successor
  /// is allocated or too small.
  fn grow_in_place(
    &mut self,
    block: Block,
    csize: usize,
    asize: usize,
  ) -> bool {
    let bytes = self.arena.bytes_mut();
    let next = block.next(csize);
    let next_tag = next.tag(bytes);

    if next_tag.is_allocated() || csize + next_tag.size() < asize {
      return false;
    }

    self.free.remove(bytes, next);
    let total = csize + next_tag.size();

    if total - asize >= MIN_BLOCK_SIZE {
      block.write(bytes, asize, true);

      let rest = block.next(asize);
      rest.write(bytes, total - asize, true);
      self.release_block(rest);
    } else {
      block.write(bytes, total, true);
    }

    true
  }

  /// Allocates a new block for `size` bytes, copies the old payload over
  /// and releases the old block.
  fn relocate(
    &mut self,
    block: Block,
    csize: usize,
    size: usize,
  ) -> Option<Block> {
    let Some(moved) = self.allocate_block(size) else {
      warn!("resize({:#x}, {size}) failed, original block kept", block.payload());
      return None;
    };

    let len = (csize - OVERHEAD).min(size);
    let src = block.payload();
    self
      .arena
      .bytes_mut()
      .copy_within(src..src + len, moved.payload());

    self.release_block(block);
    Some(moved)
  }
}
