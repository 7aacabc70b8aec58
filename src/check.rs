//! Offline heap consistency checker.
//!
//! Not used by any allocation path. Tests call it after every operation;
//! callers can run it while debugging a suspected corruption.

use std::collections::HashSet;

use crate::{
  arena::Arena,
  block::{ALIGNMENT, Block, DSIZE, MIN_BLOCK_SIZE, WSIZE},
  error::AllocError,
  free_list::FreeBlock,
  heap::Heap,
};

fn corrupted(message: String) -> Result<(), AllocError> {
  Err(AllocError::Corrupted(message))
}

impl<A: Arena> Heap<A> {
  /// Walks the heap and the free list and verifies that:
  ///
  /// - the prologue and epilogue are intact,
  /// - every block has matching header and footer, an aligned size of at
  ///   least [`MIN_BLOCK_SIZE`], and blocks tile the arena exactly,
  /// - no two free blocks are adjacent,
  /// - the free list holds exactly the free blocks, with consistent links
  ///   and no cycle.
  ///
  /// An uninitialized heap is trivially consistent.
  pub fn check(&self) -> Result<(), AllocError> {
    let Some(start) = self.start else {
      return Ok(());
    };
    let bytes = self.arena.bytes();

    let prologue = Block::at(start + DSIZE);
    let tag = prologue.tag(bytes);
    if tag.size() != DSIZE || !tag.is_allocated() || prologue.footer_tag(bytes) != tag {
      return corrupted(format!("bad prologue {tag:?}"));
    }

    let mut free_in_heap = HashSet::new();
    let mut prev_free = false;
    let mut block = prologue.next(DSIZE);

    loop {
      if block.header() + WSIZE > bytes.len() {
        return corrupted(format!("block {:#x} runs past the arena end", block.payload()));
      }

      let tag = block.tag(bytes);
      if tag.size() == 0 {
        break;
      }

      let size = tag.size();
      if size % ALIGNMENT != 0 || size < MIN_BLOCK_SIZE {
        return corrupted(format!("block {:#x} has invalid size {size}", block.payload()));
      }
      if block.payload() % ALIGNMENT != 0 {
        return corrupted(format!("block {:#x} is misaligned", block.payload()));
      }
      if block.footer(size) + WSIZE > bytes.len() {
        return corrupted(format!("block {:#x} of size {size} runs past the arena end", block.payload()));
      }
      if block.footer_tag(bytes) != tag {
        return corrupted(format!(
          "block {:#x} header {:?} and footer {:?} disagree",
          block.payload(),
          tag,
          block.footer_tag(bytes)
        ));
      }

      let free = !tag.is_allocated();
      if free && prev_free {
        return corrupted(format!("free block {:#x} escaped coalescing", block.payload()));
      }
      if free {
        free_in_heap.insert(block);
      }

      prev_free = free;
      block = block.next(size);
    }

    let epilogue = block.tag(bytes);
    if !epilogue.is_allocated() {
      return corrupted(format!("epilogue at {:#x} is not allocated", block.header()));
    }
    if block.header() + WSIZE != bytes.len() {
      return corrupted(format!(
        "epilogue at {:#x} is not at the arena end {:#x}",
        block.header(),
        bytes.len()
      ));
    }

    self.check_free_list(bytes, &free_in_heap)
  }

  fn check_free_list(
    &self,
    bytes: &[u8],
    free_in_heap: &HashSet<Block>,
  ) -> Result<(), AllocError> {
    let mut seen = HashSet::new();
    let mut expected_prev = None;
    let mut cursor = self.free.head();

    while let Some(block) = cursor {
      if block.payload() < WSIZE || block.payload() + WSIZE > bytes.len() {
        return corrupted(format!("free list entry {:#x} lies outside the arena", block.payload()));
      }
      if !seen.insert(block) {
        return corrupted(format!("free list cycles back to {:#x}", block.payload()));
      }

      let Some(node) = FreeBlock::view(bytes, block) else {
        return corrupted(format!("free list entry {:#x} is marked allocated", block.payload()));
      };
      if !free_in_heap.contains(&block) {
        return corrupted(format!("free list entry {:#x} is not a heap block", block.payload()));
      }
      if node.prev(bytes) != expected_prev {
        return corrupted(format!("free list entry {:#x} has a stale prev link", block.payload()));
      }

      expected_prev = Some(block);
      cursor = node.next(bytes);
    }

    if seen.len() != free_in_heap.len() {
      return corrupted(format!(
        "{} free blocks in the heap but {} on the free list",
        free_in_heap.len(),
        seen.len()
      ));
    }
    if seen.len() != self.free.len() {
      return corrupted(format!(
        "free list counts {} entries but links {}",
        self.free.len(),
        seen.len()
      ));
    }

    Ok(())
  }
}
