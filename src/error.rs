//! Error types for heap setup and verification.
//!
//! The allocation paths themselves follow the C contract and report failure
//! as `None`; these errors surface from initialization, configuration and
//! the consistency checker.

/// Errors raised by the heap outside the allocation hot path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
  /// The arena could not grow by the requested amount.
  #[error("out of memory: arena could not grow by {requested} bytes")]
  OutOfMemory { requested: usize },

  /// The configured heap is larger than boundary tags can describe.
  #[error("heap size {requested} exceeds the {max} bytes a boundary tag can address")]
  HeapTooLarge { requested: usize, max: usize },

  /// The consistency checker found a broken invariant.
  #[error("heap consistency check failed: {0}")]
  Corrupted(String),
}
