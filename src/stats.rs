//! Usage statistics.
//!
//! [`HeapStats`] combines cumulative counters kept by the heap with a
//! snapshot of the arena taken when [`Heap::stats`](crate::Heap::stats) is
//! called. Utilization follows the usual trace-driver definition: the peak
//! of live payload bytes over the heap size.

/// Counters and a heap snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeapStats {
  /// Successful `allocate` calls, plus `resize` calls that behaved as one.
  pub allocations: u64,
  /// `release` calls on a live block, plus `resize` calls to size 0.
  pub releases: u64,
  /// `resize` calls on a live block with a non-zero size.
  pub resizes: u64,
  /// Resizes served without moving the block.
  pub in_place_resizes: u64,
  /// Resizes that had to allocate, copy and release.
  pub relocations: u64,
  /// Successful arena growths, including the initial one.
  pub arena_grows: u64,
  /// Requests that failed because the arena could not grow.
  pub oom_count: u64,
  /// Usable payload bytes in live blocks.
  pub live_bytes: usize,
  /// High-water mark of `live_bytes`.
  pub peak_live_bytes: usize,

  /// Arena length at snapshot time.
  pub heap_size: usize,
  /// Total size of free blocks at snapshot time.
  pub free_bytes: usize,
  /// Number of free blocks at snapshot time.
  pub free_blocks: usize,
}

impl HeapStats {
  /// Peak live payload over heap size, in `[0.0, 1.0]`.
  ///
  /// Returns `0.0` for an empty heap.
  pub fn utilization(&self) -> f64 {
    if self.heap_size == 0 {
      return 0.0;
    }
    self.peak_live_bytes as f64 / self.heap_size as f64
  }

  pub(crate) fn record_allocation(
    &mut self,
    usable: usize,
  ) {
    self.allocations += 1;
    self.add_live(usable);
  }

  pub(crate) fn record_release(
    &mut self,
    usable: usize,
  ) {
    self.releases += 1;
    self.live_bytes = self.live_bytes.saturating_sub(usable);
  }

  pub(crate) fn record_resize(
    &mut self,
    old_usable: usize,
    new_usable: usize,
    moved: bool,
  ) {
    self.resizes += 1;
    if moved {
      self.relocations += 1;
    } else {
      self.in_place_resizes += 1;
    }
    self.live_bytes = self.live_bytes.saturating_sub(old_usable);
    self.add_live(new_usable);
  }

  pub(crate) fn record_grow(&mut self) {
    self.arena_grows += 1;
  }

  pub(crate) fn record_oom(&mut self) {
    self.oom_count += 1;
  }

  fn add_live(
    &mut self,
    usable: usize,
  ) {
    self.live_bytes += usable;
    if self.live_bytes > self.peak_live_bytes {
      self.peak_live_bytes = self.live_bytes;
    }
  }

  /// Returns a human-readable summary.
  pub fn summary(&self) -> String {
    format!(
      "{} allocations, {} releases, {} resizes ({} in place, {} moved), \
       {} arena grows, {} OOMs, heap {} bytes ({} free in {} blocks), \
       {:.0}% utilization",
      self.allocations,
      self.releases,
      self.resizes,
      self.in_place_resizes,
      self.relocations,
      self.arena_grows,
      self.oom_count,
      self.heap_size,
      self.free_bytes,
      self.free_blocks,
      self.utilization() * 100.0,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_peak_survives_release() {
    let mut stats = HeapStats::default();
    stats.record_allocation(100);
    stats.record_allocation(50);
    stats.record_release(100);

    assert_eq!(stats.live_bytes, 50);
    assert_eq!(stats.peak_live_bytes, 150);
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.releases, 1);
  }

  #[test]
  fn test_resize_accounting() {
    let mut stats = HeapStats::default();
    stats.record_allocation(8);
    stats.record_resize(8, 24, false);
    stats.record_resize(24, 56, true);

    assert_eq!(stats.live_bytes, 56);
    assert_eq!(stats.in_place_resizes, 1);
    assert_eq!(stats.relocations, 1);
    assert_eq!(stats.resizes, 2);
  }

  #[test]
  fn test_utilization() {
    let mut stats = HeapStats::default();
    assert_eq!(stats.utilization(), 0.0);

    stats.record_allocation(512);
    stats.heap_size = 1024;
    assert!((stats.utilization() - 0.5).abs() < f64::EPSILON);
  }

  #[test]
  fn test_summary() {
    let mut stats = HeapStats::default();
    stats.record_allocation(8);
    stats.record_grow();

    let summary = stats.summary();
    assert!(summary.contains("1 allocations"));
    assert!(summary.contains("1 arena grows"));
  }
}
