//! Boundary-tag coalescing.
//!
//! A block entering the free list is merged with whichever neighbors are
//! already free. The predecessor is found through the footer right before
//! the block, the successor through the header right after it:
//!
//! ```text
//!   case    prev   next    result
//!   ─────   ─────  ─────   ──────────────────────────────────────
//!   1       alloc  alloc   block stands alone
//!   2       alloc  free    block + next, identity stays at block
//!   3       free   alloc   prev + block, identity moves to prev
//!   4       free   free    prev + block + next, identity at prev
//! ```
//!
//! The prologue and epilogue always read as allocated, so no case needs a
//! bounds check.

use crate::{arena::Arena, block::Block, heap::Heap};

impl<A: Arena> Heap<A> {
  /// Merges the free-tagged `block` with its free neighbors and pushes the
  /// result onto the free list. Returns the merged block.
  pub(crate) fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    let bytes = self.arena.bytes_mut();
    let mut size = block.size(bytes);

    let prev_allocated = block.prev_footer_tag(bytes).is_allocated();
    let next = block.next(size);
    let next_allocated = next.is_allocated(bytes);

    let merged = match (prev_allocated, next_allocated) {
      (true, true) => block,
      (true, false) => {
        size += next.size(bytes);
        self.free.remove(bytes, next);
        block
      }
      (false, true) => {
        let prev = block.prev_block(bytes);
        size += prev.size(bytes);
        self.free.remove(bytes, prev);
        prev
      }
      (false, false) => {
        let prev = block.prev_block(bytes);
        size += prev.size(bytes) + next.size(bytes);
        self.free.remove(bytes, prev);
        self.free.remove(bytes, next);
        prev
      }
    };

    merged.write(bytes, size, false);
    self.free.push_front(bytes, merged);
    merged
  }
}

#[cfg(test)]
mod tests {
  use crate::{Addr, BlockInfo, Heap, HeapArena, HeapConfig};

  fn heap() -> Heap<HeapArena> {
    Heap::in_memory(HeapConfig::default().with_max_heap_size(1 << 16)).unwrap()
  }

  /// Three adjacent 32-byte blocks. The guard takes the 16-byte tail left
  /// by the last split, so nothing else is free.
  fn three_blocks(heap: &mut Heap<HeapArena>) -> [Addr; 3] {
    let a = heap.allocate(24).unwrap();
    let b = heap.allocate(24).unwrap();
    let c = heap.allocate(24).unwrap();
    let _guard = heap.allocate(8).unwrap();

    assert_eq!(b.offset(), a.offset() + 32);
    assert_eq!(c.offset(), b.offset() + 32);
    assert_eq!(heap.free_blocks().count(), 0);
    [a, b, c]
  }

  fn free_list(heap: &Heap<HeapArena>) -> Vec<(usize, usize)> {
    heap
      .free_blocks()
      .map(|info| (info.addr.offset(), info.size))
      .collect()
  }

  #[test]
  fn test_neither_neighbor_free() {
    let mut heap = heap();
    let [_, b, _] = three_blocks(&mut heap);

    heap.release(Some(b));

    assert_eq!(free_list(&heap), vec![(b.offset(), 32)]);
    assert!(heap.check().is_ok());
  }

  #[test]
  fn test_next_free() {
    let mut heap = heap();
    let [_, b, c] = three_blocks(&mut heap);

    heap.release(Some(c));
    heap.release(Some(b));

    assert_eq!(free_list(&heap), vec![(b.offset(), 64)]);
    assert!(heap.check().is_ok());
  }

  #[test]
  fn test_prev_free() {
    let mut heap = heap();
    let [a, b, _] = three_blocks(&mut heap);

    heap.release(Some(a));
    heap.release(Some(b));

    assert_eq!(free_list(&heap), vec![(a.offset(), 64)]);
    assert!(heap.check().is_ok());
  }

  #[test]
  fn test_both_free() {
    let mut heap = heap();
    let [a, b, c] = three_blocks(&mut heap);

    heap.release(Some(a));
    heap.release(Some(c));
    assert_eq!(free_list(&heap).len(), 2);

    heap.release(Some(b));

    assert_eq!(free_list(&heap), vec![(a.offset(), 96)]);
    assert!(heap.check().is_ok());
  }

  #[test]
  fn test_adjacent_pair_in_either_order() {
    for reversed in [false, true] {
      let mut heap = heap();
      let [_, b, c] = three_blocks(&mut heap);

      let (first, second) = if reversed { (c, b) } else { (b, c) };
      heap.release(Some(first));
      heap.release(Some(second));

      let free = free_list(&heap);
      assert_eq!(free, vec![(b.offset(), 64)]);
      assert!(!free.iter().any(|&(offset, _)| offset == c.offset()));
      assert!(heap.check().is_ok());
    }
  }

  #[test]
  fn test_merged_block_goes_to_head() {
    let mut heap = heap();
    let [a, b, c] = three_blocks(&mut heap);

    heap.release(Some(a));
    heap.release(Some(c));
    // Most recently freed first.
    assert_eq!(free_list(&heap), vec![(c.offset(), 32), (a.offset(), 32)]);

    heap.release(Some(b));
    assert_eq!(free_list(&heap)[0], (a.offset(), 96));
  }

  #[test]
  fn test_everything_released_collapses_to_one_block() {
    let mut heap = heap();
    let addrs: Vec<_> = (1..=20).map(|i| heap.allocate(i * 5).unwrap()).collect();

    for (i, addr) in addrs.iter().enumerate() {
      if i % 2 == 0 {
        heap.release(Some(*addr));
      }
    }
    for (i, addr) in addrs.iter().enumerate() {
      if i % 2 == 1 {
        heap.release(Some(*addr));
      }
    }

    let blocks: Vec<BlockInfo> = heap.blocks().collect();
    assert_eq!(blocks.len(), 1);
    assert!(!blocks[0].allocated);
    assert_eq!(heap.free_blocks().count(), 1);
    assert!(heap.check().is_ok());
  }
}
