//! Boundary tag codec.
//!
//! Every block carries its `(size, allocated)` pair twice, in a 4-byte header
//! word right before the payload and in a 4-byte footer word at the end of
//! the block:
//!
//! ```text
//!        bp - 4          bp                        bp + size - 8   bp + size - 4
//!   ┌─────────────┬────────────────────────────────┬─────────────┬──────────────┐
//!   │ header      │ payload                        │ footer      │ next header  │
//!   │ size | a    │ (next_free, prev_free if free) │ size | a    │              │
//!   └─────────────┴────────────────────────────────┴─────────────┴──────────────┘
//!                 ▲
//!                 └── block handle (payload offset)
//! ```
//!
//! Sizes are multiples of [`ALIGNMENT`], which leaves bit 0 of the word free
//! for the allocation flag.

use crate::align;

/// Size in bytes of a single tag word.
pub const WSIZE: usize = 4;
/// Size in bytes of a double word.
pub const DSIZE: usize = 8;
/// Payload alignment guaranteed to callers.
pub const ALIGNMENT: usize = 8;
/// Header plus footer.
pub const OVERHEAD: usize = DSIZE;
/// Header, footer and room for the two free-list links.
pub const MIN_BLOCK_SIZE: usize = 16;
/// Largest block or heap size a tag word can describe.
pub const MAX_BLOCK_SIZE: usize = (u32::MAX as usize) & !(ALIGNMENT - 1);

const ALLOC_BIT: u32 = 0x1;

/// A packed `(size, allocated)` boundary tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
  pub fn pack(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert_eq!(size % ALIGNMENT, 0, "unaligned block size {size}");
    debug_assert!(size <= MAX_BLOCK_SIZE, "block size {size} overflows a tag");

    Self(size as u32 | allocated as u32)
  }

  pub const fn from_bits(bits: u32) -> Self {
    Self(bits)
  }

  pub const fn bits(self) -> u32 {
    self.0
  }

  pub const fn size(self) -> usize {
    (self.0 & !ALLOC_BIT) as usize
  }

  pub const fn is_allocated(self) -> bool {
    self.0 & ALLOC_BIT != 0
  }
}

/// Reads the word at `offset`.
pub(crate) fn get(
  bytes: &[u8],
  offset: usize,
) -> u32 {
  let mut word = [0u8; WSIZE];
  word.copy_from_slice(&bytes[offset..offset + WSIZE]);
  u32::from_le_bytes(word)
}

/// Writes `value` as the word at `offset`.
pub(crate) fn put(
  bytes: &mut [u8],
  offset: usize,
  value: u32,
) {
  bytes[offset..offset + WSIZE].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn get_tag(
  bytes: &[u8],
  offset: usize,
) -> Tag {
  Tag::from_bits(get(bytes, offset))
}

pub(crate) fn put_tag(
  bytes: &mut [u8],
  offset: usize,
  tag: Tag,
) {
  put(bytes, offset, tag.bits());
}

/// Handle to a block, addressed by the offset of its payload in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(usize);

impl Block {
  pub const fn at(payload: usize) -> Self {
    Self(payload)
  }

  pub const fn payload(self) -> usize {
    self.0
  }

  pub const fn header(self) -> usize {
    self.0 - WSIZE
  }

  pub const fn footer(
    self,
    size: usize,
  ) -> usize {
    self.0 + size - DSIZE
  }

  /// The block that starts right after this one, given this block's size.
  pub const fn next(
    self,
    size: usize,
  ) -> Block {
    Block(self.0 + size)
  }

  pub fn tag(
    self,
    bytes: &[u8],
  ) -> Tag {
    get_tag(bytes, self.header())
  }

  pub fn footer_tag(
    self,
    bytes: &[u8],
  ) -> Tag {
    get_tag(bytes, self.footer(self.size(bytes)))
  }

  pub fn size(
    self,
    bytes: &[u8],
  ) -> usize {
    self.tag(bytes).size()
  }

  pub fn is_allocated(
    self,
    bytes: &[u8],
  ) -> bool {
    self.tag(bytes).is_allocated()
  }

  /// The tag stored in the footer of the block that precedes this one.
  pub fn prev_footer_tag(
    self,
    bytes: &[u8],
  ) -> Tag {
    get_tag(bytes, self.0 - DSIZE)
  }

  /// The block that precedes this one in address order, found through its footer.
  pub fn prev_block(
    self,
    bytes: &[u8],
  ) -> Block {
    Block(self.0 - self.prev_footer_tag(bytes).size())
  }

  /// Writes matching header and footer tags.
  pub fn write(
    self,
    bytes: &mut [u8],
    size: usize,
    allocated: bool,
  ) {
    let tag = Tag::pack(size, allocated);
    put_tag(bytes, self.header(), tag);
    put_tag(bytes, self.footer(size), tag);
  }
}

/// Block size needed to serve a `request`-byte payload, or `None` if it
/// cannot be described by a tag.
pub fn adjusted_size(request: usize) -> Option<usize> {
  if request > MAX_BLOCK_SIZE {
    return None;
  }

  let asize = align!(request).checked_add(OVERHEAD)?.max(MIN_BLOCK_SIZE);

  (asize <= MAX_BLOCK_SIZE).then_some(asize)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pack_unpack() {
    let tag = Tag::pack(24, true);
    assert_eq!(tag.size(), 24);
    assert!(tag.is_allocated());
    assert_eq!(tag.bits(), 25);

    let tag = Tag::pack(4096, false);
    assert_eq!(tag.size(), 4096);
    assert!(!tag.is_allocated());
  }

  #[test]
  fn test_epilogue_tag() {
    let tag = Tag::pack(0, true);
    assert_eq!(tag.size(), 0);
    assert!(tag.is_allocated());
  }

  #[test]
  fn test_block_offsets() {
    let block = Block::at(16);
    assert_eq!(block.header(), 12);
    assert_eq!(block.footer(32), 40);
    assert_eq!(block.next(32), Block::at(48));
  }

  #[test]
  fn test_write_and_walk() {
    let mut bytes = vec![0u8; 64];

    let first = Block::at(8);
    first.write(&mut bytes, 24, true);
    let second = first.next(first.size(&bytes));
    second.write(&mut bytes, 16, false);

    assert_eq!(second, Block::at(32));
    assert_eq!(first.tag(&bytes), first.footer_tag(&bytes));
    assert_eq!(second.size(&bytes), 16);
    assert!(!second.is_allocated(&bytes));
    assert!(second.prev_footer_tag(&bytes).is_allocated());
    assert_eq!(second.prev_block(&bytes), first);
  }

  #[test]
  fn test_words_are_little_endian() {
    let mut bytes = vec![0u8; 8];
    put(&mut bytes, 4, 0x0102_0304);
    assert_eq!(&bytes[4..], &[4, 3, 2, 1]);
    assert_eq!(get(&bytes, 4), 0x0102_0304);
  }

  #[test]
  fn test_adjusted_size() {
    assert_eq!(adjusted_size(1), Some(MIN_BLOCK_SIZE));
    assert_eq!(adjusted_size(8), Some(MIN_BLOCK_SIZE));
    assert_eq!(adjusted_size(9), Some(24));
    assert_eq!(adjusted_size(24), Some(32));
    assert_eq!(adjusted_size(100), Some(112));
    assert_eq!(adjusted_size(MAX_BLOCK_SIZE), None);
    assert_eq!(adjusted_size(usize::MAX), None);
  }
}
