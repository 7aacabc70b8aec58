//! Growable byte arenas the heap lives in.
//!
//! An [`Arena`] behaves like a trimmed-down `sbrk`: it only ever extends
//! forward, never relocates, and answers with the offset where the new
//! region begins. Two backings are provided:
//!
//! - [`HeapArena`] reserves its full capacity from the global allocator.
//! - [`MmapArena`] reserves a private anonymous mapping (unix only).
//!
//! Both reserve `capacity` bytes up front and move a break inside the
//! reservation, so offsets stay valid for the arena's whole lifetime.

use std::{alloc, ptr::NonNull, slice};

use crate::{block::ALIGNMENT, error::AllocError};

/// The contiguous region a [`Heap`](crate::Heap) manages.
pub trait Arena {
  /// Extends the region by `bytes` and returns the offset of the first new
  /// byte, or `None` when the arena is exhausted. The region never moves.
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Option<usize>;

  /// Current length of the region.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn bytes(&self) -> &[u8];

  fn bytes_mut(&mut self) -> &mut [u8];

  /// Address of offset 0, aligned to at least [`ALIGNMENT`].
  fn base_ptr(&self) -> *const u8;
}

/// A reservation of `capacity` zeroed bytes with a break inside it.
struct Region {
  base: NonNull<u8>,
  brk: usize,
  capacity: usize,
}

impl Region {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Option<usize> {
    let old_brk = self.brk;
    let new_brk = old_brk.checked_add(bytes)?;

    if new_brk > self.capacity {
      return None;
    }

    self.brk = new_brk;
    Some(old_brk)
  }

  fn bytes(&self) -> &[u8] {
    // SAFETY: `base` points to `capacity` initialized bytes owned by the
    // region and `brk <= capacity`.
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.brk) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    // SAFETY: as in `bytes`, and `&mut self` guarantees exclusive access.
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.brk) }
  }
}

/// An arena backed by a single allocation from the global allocator.
///
/// ```rust
/// use tagalloc::{Arena, HeapArena};
///
/// let mut arena = HeapArena::new(64).unwrap();
/// assert_eq!(arena.grow(32), Some(0));
/// assert_eq!(arena.grow(32), Some(32));
/// assert_eq!(arena.grow(8), None);
/// ```
pub struct HeapArena {
  region: Region,
  layout: alloc::Layout,
}

impl HeapArena {
  pub fn new(capacity: usize) -> Result<Self, AllocError> {
    let layout = alloc::Layout::from_size_align(capacity.max(ALIGNMENT), ALIGNMENT)
      .map_err(|_| AllocError::OutOfMemory { requested: capacity })?;

    // SAFETY: the layout has a non-zero size.
    let base = unsafe { alloc::alloc_zeroed(layout) };
    let base = NonNull::new(base).ok_or(AllocError::OutOfMemory { requested: capacity })?;

    Ok(Self {
      region: Region {
        base,
        brk: 0,
        capacity,
      },
      layout,
    })
  }

  pub fn capacity(&self) -> usize {
    self.region.capacity
  }
}

impl Arena for HeapArena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Option<usize> {
    self.region.grow(bytes)
  }

  fn len(&self) -> usize {
    self.region.brk
  }

  fn bytes(&self) -> &[u8] {
    self.region.bytes()
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    self.region.bytes_mut()
  }

  fn base_ptr(&self) -> *const u8 {
    self.region.base.as_ptr()
  }
}

impl Drop for HeapArena {
  fn drop(&mut self) {
    // SAFETY: allocated in `new` with this exact layout.
    unsafe { alloc::dealloc(self.region.base.as_ptr(), self.layout) }
  }
}

/// An arena backed by a private anonymous mapping, grown like `sbrk` inside
/// the reservation. Pages are only committed by the kernel once touched.
#[cfg(unix)]
pub struct MmapArena {
  region: Region,
  mapped: usize,
}

#[cfg(unix)]
impl MmapArena {
  pub fn new(capacity: usize) -> Result<Self, AllocError> {
    // SAFETY: sysconf has no preconditions.
    let page_size = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
      size if size > 0 => size as usize,
      _ => 4096,
    };

    let mapped = capacity
      .max(1)
      .checked_add(page_size - 1)
      .map(|len| len & !(page_size - 1))
      .ok_or(AllocError::OutOfMemory { requested: capacity })?;

    // SAFETY: anonymous mapping with no address hint; the result is checked
    // against MAP_FAILED before use.
    let base = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        mapped,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if base == libc::MAP_FAILED {
      return Err(AllocError::OutOfMemory { requested: capacity });
    }

    let base = NonNull::new(base as *mut u8).ok_or(AllocError::OutOfMemory { requested: capacity })?;

    Ok(Self {
      region: Region {
        base,
        brk: 0,
        capacity,
      },
      mapped,
    })
  }

  pub fn capacity(&self) -> usize {
    self.region.capacity
  }

  /// Address one past the last byte handed out, the equivalent of `sbrk(0)`.
  pub fn program_break(&self) -> *const u8 {
    self.region.base.as_ptr().wrapping_add(self.region.brk)
  }
}

#[cfg(unix)]
impl Arena for MmapArena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Option<usize> {
    self.region.grow(bytes)
  }

  fn len(&self) -> usize {
    self.region.brk
  }

  fn bytes(&self) -> &[u8] {
    self.region.bytes()
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    self.region.bytes_mut()
  }

  fn base_ptr(&self) -> *const u8 {
    self.region.base.as_ptr()
  }
}

#[cfg(unix)]
impl Drop for MmapArena {
  fn drop(&mut self) {
    // SAFETY: the mapping was created in `new` with length `mapped`.
    unsafe {
      libc::munmap(self.region.base.as_ptr() as *mut libc::c_void, self.mapped);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_heap_arena_grows_forward() {
    let mut arena = HeapArena::new(128).unwrap();

    assert!(arena.is_empty());
    assert_eq!(arena.grow(32), Some(0));
    assert_eq!(arena.grow(16), Some(32));
    assert_eq!(arena.len(), 48);
    assert_eq!(arena.bytes().len(), 48);
  }

  #[test]
  fn test_heap_arena_exhaustion() {
    let mut arena = HeapArena::new(64).unwrap();

    assert_eq!(arena.grow(48), Some(0));
    assert_eq!(arena.grow(24), None);
    assert_eq!(arena.len(), 48);
    assert_eq!(arena.grow(16), Some(48));
    assert_eq!(arena.grow(usize::MAX), None);
  }

  #[test]
  fn test_heap_arena_is_zeroed_and_aligned() {
    let mut arena = HeapArena::new(256).unwrap();
    arena.grow(256).unwrap();

    assert!(arena.bytes().iter().all(|&b| b == 0));
    assert_eq!(arena.base_ptr() as usize % ALIGNMENT, 0);
  }

  #[test]
  fn test_heap_arena_contents_survive_growth() {
    let mut arena = HeapArena::new(64).unwrap();
    arena.grow(8).unwrap();
    arena.bytes_mut().copy_from_slice(b"boundary");

    arena.grow(8).unwrap();
    assert_eq!(&arena.bytes()[..8], b"boundary");
  }

  #[cfg(unix)]
  #[test]
  fn test_mmap_arena() {
    let mut arena = MmapArena::new(1 << 16).unwrap();

    let start = arena.program_break();
    assert_eq!(arena.grow(4096), Some(0));
    assert_eq!(arena.program_break() as usize - start as usize, 4096);

    arena.bytes_mut()[4095] = 0xAB;
    assert_eq!(arena.bytes()[4095], 0xAB);

    assert_eq!(arena.grow(1 << 16), None);
    assert_eq!(arena.base_ptr() as usize % ALIGNMENT, 0);
  }
}
