//! Explicit free list threaded through the payloads of free blocks.
//!
//! A free block keeps two links inside its own payload, written as 4-byte
//! offsets. Offset 0 never holds a payload, so it doubles as "none":
//!
//! ```text
//!   ┌────────┬─────────────┬─────────────┬───────────┬────────┐
//!   │ header │ next_free   │ prev_free   │  unused   │ footer │
//!   └────────┴─────────────┴─────────────┴───────────┴────────┘
//!            ▲ bp          ▲ bp + 4
//! ```
//!
//! New blocks are pushed at the head, so the list is in most-recently-freed
//! order.

use crate::block::{Block, MIN_BLOCK_SIZE, WSIZE, get, put};

const NONE: u32 = 0;

fn encode(link: Option<Block>) -> u32 {
  link.map_or(NONE, |block| block.payload() as u32)
}

fn decode(word: u32) -> Option<Block> {
  (word != NONE).then(|| Block::at(word as usize))
}

/// View of a block whose tags say it is free. The link fields are only
/// reachable through this type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeBlock(Block);

impl FreeBlock {
  /// Returns a view of `block` if it is currently free.
  pub fn view(
    bytes: &[u8],
    block: Block,
  ) -> Option<Self> {
    (!block.is_allocated(bytes)).then_some(Self(block))
  }

  /// Trusted constructor for list operations on blocks known to be free.
  fn assume(
    bytes: &[u8],
    block: Block,
  ) -> Self {
    debug_assert!(
      !block.is_allocated(bytes),
      "free list touched allocated block at {:#x}",
      block.payload()
    );
    Self(block)
  }

  pub fn block(self) -> Block {
    self.0
  }

  pub fn next(
    self,
    bytes: &[u8],
  ) -> Option<Block> {
    decode(get(bytes, self.0.payload()))
  }

  pub fn prev(
    self,
    bytes: &[u8],
  ) -> Option<Block> {
    decode(get(bytes, self.0.payload() + WSIZE))
  }

  fn set_next(
    self,
    bytes: &mut [u8],
    next: Option<Block>,
  ) {
    put(bytes, self.0.payload(), encode(next));
  }

  fn set_prev(
    self,
    bytes: &mut [u8],
    prev: Option<Block>,
  ) {
    put(bytes, self.0.payload() + WSIZE, encode(prev));
  }
}

/// Head of the doubly linked list of free blocks.
#[derive(Debug, Default)]
pub struct FreeList {
  head: Option<Block>,
  len: usize,
}

impl FreeList {
  pub fn new() -> Self {
    Self { head: None, len: 0 }
  }

  pub fn head(&self) -> Option<Block> {
    self.head
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Links `block` in at the head. Its tags must already mark it free.
  pub fn push_front(
    &mut self,
    bytes: &mut [u8],
    block: Block,
  ) {
    let node = FreeBlock::assume(bytes, block);

    node.set_next(bytes, self.head);
    node.set_prev(bytes, None);

    if let Some(head) = self.head {
      FreeBlock::assume(bytes, head).set_prev(bytes, Some(block));
    }

    self.head = Some(block);
    self.len += 1;
  }

  /// Unlinks `block`, patching both neighbors and the head.
  pub fn remove(
    &mut self,
    bytes: &mut [u8],
    block: Block,
  ) {
    let node = FreeBlock::assume(bytes, block);
    let next = node.next(bytes);
    let prev = node.prev(bytes);

    match prev {
      Some(prev) => FreeBlock::assume(bytes, prev).set_next(bytes, next),
      None => self.head = next,
    }

    if let Some(next) = next {
      FreeBlock::assume(bytes, next).set_prev(bytes, prev);
    }

    self.len -= 1;
  }

  /// First block in list order whose size is at least `asize`.
  pub fn first_fit(
    &self,
    bytes: &[u8],
    asize: usize,
  ) -> Option<Block> {
    self
      .iter(bytes)
      .map(FreeBlock::block)
      .find(|block| block.size(bytes) >= asize)
  }

  /// Walks the list from the head. The walk is bounded by the number of
  /// blocks the arena could hold, so a corrupted cycle cannot spin forever.
  pub fn iter<'a>(
    &self,
    bytes: &'a [u8],
  ) -> FreeIter<'a> {
    FreeIter {
      bytes,
      cursor: self.head,
      budget: bytes.len() / MIN_BLOCK_SIZE + 1,
    }
  }
}

pub struct FreeIter<'a> {
  bytes: &'a [u8],
  cursor: Option<Block>,
  budget: usize,
}

impl Iterator for FreeIter<'_> {
  type Item = FreeBlock;

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.cursor?;

    if self.budget == 0 {
      self.cursor = None;
      return None;
    }
    self.budget -= 1;

    let node = FreeBlock(block);
    self.cursor = node.next(self.bytes);
    Some(node)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Lays out free blocks of the given sizes back to back, starting at
  /// payload offset 8, without linking them.
  fn blocks(sizes: &[usize]) -> (Vec<u8>, Vec<Block>) {
    let total: usize = sizes.iter().sum();
    let mut bytes = vec![0u8; total + 8];
    let mut blocks = Vec::new();
    let mut block = Block::at(8);

    for &size in sizes {
      block.write(&mut bytes, size, false);
      blocks.push(block);
      block = block.next(size);
    }

    (bytes, blocks)
  }

  fn order(
    list: &FreeList,
    bytes: &[u8],
  ) -> Vec<Block> {
    list.iter(bytes).map(FreeBlock::block).collect()
  }

  #[test]
  fn test_push_is_lifo() {
    let (mut bytes, blocks) = blocks(&[16, 16, 16]);
    let mut list = FreeList::new();

    for &block in &blocks {
      list.push_front(&mut bytes, block);
    }

    assert_eq!(list.len(), 3);
    assert_eq!(list.head(), Some(blocks[2]));
    assert_eq!(order(&list, &bytes), vec![blocks[2], blocks[1], blocks[0]]);
  }

  #[test]
  fn test_links_are_consistent() {
    let (mut bytes, blocks) = blocks(&[16, 24]);
    let mut list = FreeList::new();
    list.push_front(&mut bytes, blocks[0]);
    list.push_front(&mut bytes, blocks[1]);

    let head = FreeBlock::view(&bytes, blocks[1]).unwrap();
    let tail = FreeBlock::view(&bytes, blocks[0]).unwrap();

    assert_eq!(head.prev(&bytes), None);
    assert_eq!(head.next(&bytes), Some(blocks[0]));
    assert_eq!(tail.prev(&bytes), Some(blocks[1]));
    assert_eq!(tail.next(&bytes), None);
  }

  #[test]
  fn test_remove_head_middle_tail() {
    let (mut bytes, blocks) = blocks(&[16, 16, 16, 16]);
    let mut list = FreeList::new();
    for &block in &blocks {
      list.push_front(&mut bytes, block);
    }

    // Head.
    list.remove(&mut bytes, blocks[3]);
    assert_eq!(order(&list, &bytes), vec![blocks[2], blocks[1], blocks[0]]);
    assert_eq!(FreeBlock::view(&bytes, blocks[2]).unwrap().prev(&bytes), None);

    // Middle.
    list.remove(&mut bytes, blocks[1]);
    assert_eq!(order(&list, &bytes), vec![blocks[2], blocks[0]]);
    assert_eq!(FreeBlock::view(&bytes, blocks[0]).unwrap().prev(&bytes), Some(blocks[2]));

    // Tail.
    list.remove(&mut bytes, blocks[0]);
    assert_eq!(order(&list, &bytes), vec![blocks[2]]);

    list.remove(&mut bytes, blocks[2]);
    assert_eq!(list.head(), None);
    assert_eq!(list.len(), 0);
    assert_eq!(list.iter(&bytes).count(), 0);
  }

  #[test]
  fn test_first_fit_takes_earliest_in_list_order() {
    let (mut bytes, blocks) = blocks(&[64, 16, 32]);
    let mut list = FreeList::new();
    for &block in &blocks {
      list.push_front(&mut bytes, block);
    }

    // List order is 32, 16, 64.
    assert_eq!(list.first_fit(&bytes, 16), Some(blocks[2]));
    assert_eq!(list.first_fit(&bytes, 40), Some(blocks[0]));
    assert_eq!(list.first_fit(&bytes, 72), None);
  }

  #[test]
  fn test_first_fit_on_empty_list() {
    let (bytes, _) = blocks(&[16]);
    let list = FreeList::new();

    assert_eq!(list.first_fit(&bytes, 16), None);
  }

  #[test]
  fn test_view_rejects_allocated_block() {
    let (mut bytes, blocks) = blocks(&[16, 16]);
    blocks[0].write(&mut bytes, 16, true);

    assert!(FreeBlock::view(&bytes, blocks[0]).is_none());
    assert!(FreeBlock::view(&bytes, blocks[1]).is_some());
  }

  #[test]
  fn test_iter_stops_on_cycle() {
    let (mut bytes, blocks) = blocks(&[16, 16]);
    let mut list = FreeList::new();
    list.push_front(&mut bytes, blocks[0]);
    list.push_front(&mut bytes, blocks[1]);

    // Point the tail back at the head.
    put(&mut bytes, blocks[0].payload(), blocks[1].payload() as u32);

    assert!(list.iter(&bytes).count() <= bytes.len() / MIN_BLOCK_SIZE + 1);
  }
}
