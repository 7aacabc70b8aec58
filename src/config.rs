//! Heap tuning knobs.

use crate::{
  block::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE},
  error::AllocError,
};

/// Smallest amount the heap asks the arena for when no free block fits.
pub const DEFAULT_MIN_EXTENSION: usize = MIN_BLOCK_SIZE;
/// Ceiling on the total arena size, 20 MiB.
pub const DEFAULT_MAX_HEAP_SIZE: usize = 20 * (1 << 20);

/// Configuration for a [`Heap`](crate::Heap).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
  /// Lower bound on every arena extension. A larger value trades memory for
  /// fewer growth calls. Rounded up to an even number of words.
  pub min_extension: usize,
  /// The heap never grows the arena beyond this many bytes. Also the
  /// capacity reserved by [`HeapArena`](crate::HeapArena) and
  /// [`MmapArena`](crate::MmapArena) when built through the config.
  pub max_heap_size: usize,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      min_extension: DEFAULT_MIN_EXTENSION,
      max_heap_size: DEFAULT_MAX_HEAP_SIZE,
    }
  }
}

impl HeapConfig {
  pub fn with_min_extension(
    mut self,
    bytes: usize,
  ) -> Self {
    self.min_extension = bytes;
    self
  }

  pub fn with_max_heap_size(
    mut self,
    bytes: usize,
  ) -> Self {
    self.max_heap_size = bytes;
    self
  }

  pub fn validate(&self) -> Result<(), AllocError> {
    if self.max_heap_size > MAX_BLOCK_SIZE {
      return Err(AllocError::HeapTooLarge {
        requested: self.max_heap_size,
        max: MAX_BLOCK_SIZE,
      });
    }

    if self.min_extension > self.max_heap_size {
      return Err(AllocError::HeapTooLarge {
        requested: self.min_extension,
        max: self.max_heap_size,
      });
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_is_valid() {
    let config = HeapConfig::default();
    assert_eq!(config.min_extension, MIN_BLOCK_SIZE);
    assert_eq!(config.max_heap_size, 20 * 1024 * 1024);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_builders() {
    let config = HeapConfig::default()
      .with_min_extension(4096)
      .with_max_heap_size(1 << 16);

    assert_eq!(config.min_extension, 4096);
    assert_eq!(config.max_heap_size, 1 << 16);
  }

  #[test]
  fn test_rejects_oversized_heap() {
    let config = HeapConfig::default().with_max_heap_size(usize::MAX);

    assert!(matches!(config.validate(), Err(AllocError::HeapTooLarge { .. })));
  }

  #[test]
  fn test_rejects_extension_above_ceiling() {
    let config = HeapConfig::default()
      .with_max_heap_size(1024)
      .with_min_extension(2048);

    assert_eq!(
      config.validate(),
      Err(AllocError::HeapTooLarge {
        requested: 2048,
        max: 1024
      })
    );
  }
}
