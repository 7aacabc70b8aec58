use log::{debug, trace, warn};

use crate::{
  align,
  arena::{Arena, HeapArena},
  block::{self, Block, DSIZE, MIN_BLOCK_SIZE, OVERHEAD, Tag, WSIZE, adjusted_size},
  config::HeapConfig,
  error::AllocError,
  free_list::{FreeBlock, FreeList},
  stats::HeapStats,
};

#[cfg(unix)]
use crate::arena::MmapArena;

/// Bytes requested from the arena by [`Heap::init`]: padding, prologue,
/// one minimum free block and the epilogue header.
pub const INIT_SIZE: usize = 2 * DSIZE + MIN_BLOCK_SIZE;

/// Opaque address of an allocation: the offset of its payload in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addr(usize);

impl Addr {
  pub fn offset(self) -> usize {
    self.0
  }

  pub(crate) fn block(self) -> Block {
    Block::at(self.0)
  }

  pub(crate) fn of(block: Block) -> Self {
    Self(block.payload())
  }
}

/// One block seen while walking the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  pub addr: Addr,
  pub size: usize,
  pub allocated: bool,
}

/// An explicit free-list allocator over a single [`Arena`].
///
/// ```text
///   ┌─────┬──────────┬────────┬────────┬────────┬─────┬──────────┐
///   │ pad │ prologue │ block  │ block  │ block  │ ... │ epilogue │
///   │     │  8 / a   │ 24 / a │ 16 / f │ 48 / a │     │  0 / a   │
///   └─────┴──────────┴────────┴────────┴────────┴─────┴──────────┘
/// ```
///
/// The prologue and epilogue are permanently allocated, so coalescing never
/// has to check the arena edges.
pub struct Heap<A: Arena> {
  pub(crate) arena: A,
  pub(crate) config: HeapConfig,
  pub(crate) free: FreeList,
  /// Offset of the padding word, set once initialized.
  pub(crate) start: Option<usize>,
  pub(crate) stats: HeapStats,
}

impl<A: Arena> Heap<A> {
  /// Wraps `arena` with the default configuration. Nothing is written to
  /// the arena until [`init`](Self::init) or the first operation.
  pub fn new(arena: A) -> Self {
    Self {
      arena,
      config: HeapConfig::default(),
      free: FreeList::new(),
      start: None,
      stats: HeapStats::default(),
    }
  }

  pub fn with_config(
    arena: A,
    config: HeapConfig,
  ) -> Result<Self, AllocError> {
    config.validate()?;

    Ok(Self {
      config,
      ..Self::new(arena)
    })
  }

  /// Lays out the prologue, an initial free block and the epilogue.
  /// Calling it again is a no-op.
  ///
  /// An arena that was already grown to a length that is not a multiple
  /// of 8 gets a few bytes of padding first, so the layout below (offsets
  /// relative to its start) always begins on an 8-byte boundary.
  ///
  /// ```text
  ///   off 0    4        8        12       16              24       28
  ///   ┌────────┬────────┬────────┬────────┬───────────────┬────────┬────────┐
  ///   │  pad   │ 8 / a  │ 8 / a  │ 16 / f │ next | prev   │ 16 / f │ 0 / a  │
  ///   └────────┴────────┴────────┴────────┴───────────────┴────────┴────────┘
  ///             prologue          free block                        epilogue
  /// ```
  pub fn init(&mut self) -> Result<(), AllocError> {
    if self.start.is_some() {
      return Ok(());
    }

    let len = self.arena.len();
    let requested = align!(len) - len + INIT_SIZE;

    if len + requested > self.config.max_heap_size {
      return Err(AllocError::OutOfMemory { requested });
    }

    let grown = self
      .arena
      .grow(requested)
      .ok_or(AllocError::OutOfMemory { requested })?;
    let base = align!(grown);
    self.stats.record_grow();

    let bytes = self.arena.bytes_mut();
    block::put(bytes, base, 0);

    let prologue = Block::at(base + DSIZE);
    prologue.write(bytes, DSIZE, true);

    let first = prologue.next(DSIZE);
    first.write(bytes, MIN_BLOCK_SIZE, false);
    block::put_tag(bytes, first.next(MIN_BLOCK_SIZE).header(), Tag::pack(0, true));

    self.free = FreeList::new();
    self.free.push_front(bytes, first);
    self.start = Some(base);

    debug!("heap initialized at arena offset {base:#x}");
    Ok(())
  }

  /// Allocates a block with at least `size` usable bytes, 8-byte aligned.
  ///
  /// Returns `None` for `size == 0` (without touching the heap) or when
  /// the arena cannot grow.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<Addr> {
    if size == 0 {
      return None;
    }

    let block = self.allocate_block(size)?;
    let usable = self.usable(block);
    self.stats.record_allocation(usable);

    trace!("allocate({size}) -> {:#x} ({} byte block)", block.payload(), usable + OVERHEAD);
    Some(Addr::of(block))
  }

  /// Returns the block at `ptr` to the heap. `None` is ignored.
  ///
  /// `ptr` must come from this heap and still be live; anything else
  /// corrupts the heap's metadata.
  pub fn release(
    &mut self,
    ptr: Option<Addr>,
  ) {
    let Some(addr) = ptr else {
      return;
    };

    if self.start.is_none() {
      warn!("release({:#x}) before the heap was initialized", addr.offset());
      return;
    }

    let usable = self.usable(addr.block());
    self.stats.record_release(usable);

    trace!("release({:#x}) ({} byte block)", addr.offset(), usable + OVERHEAD);
    self.release_block(addr.block());
  }

  /// Initializes if needed, then finds or makes room for `size` bytes and
  /// marks the chosen block allocated.
  pub(crate) fn allocate_block(
    &mut self,
    size: usize,
  ) -> Option<Block> {
    if let Err(err) = self.init() {
      warn!("heap initialization failed: {err}");
      self.stats.record_oom();
      return None;
    }

    let Some(asize) = adjusted_size(size) else {
      warn!("allocate({size}) exceeds the largest block a tag can describe");
      self.stats.record_oom();
      return None;
    };

    let block = match self.free.first_fit(self.arena.bytes(), asize) {
      Some(block) => block,
      None => self.extend(asize)?,
    };

    self.place(block, asize);
    Some(block)
  }

  /// Clears the allocation bit and folds the block into its free neighbors.
  pub(crate) fn release_block(
    &mut self,
    block: Block,
  ) {
    let bytes = self.arena.bytes_mut();
    let size = block.size(bytes);
    block.write(bytes, size, false);

    self.coalesce(block);
  }

  /// Grows the arena by at least `asize` bytes and returns the resulting
  /// free block, merged with a free tail if there was one.
  fn extend(
    &mut self,
    asize: usize,
  ) -> Option<Block> {
    let size = align!(asize.max(self.config.min_extension)).max(MIN_BLOCK_SIZE);

    let within_ceiling = self
      .arena
      .len()
      .checked_add(size)
      .is_some_and(|len| len <= self.config.max_heap_size);

    let base = if within_ceiling { self.arena.grow(size) } else { None };
    let Some(base) = base else {
      warn!(
        "out of memory: cannot grow heap of {} bytes by {size}",
        self.arena.len()
      );
      self.stats.record_oom();
      return None;
    };
    self.stats.record_grow();

    debug!("extended heap by {size} bytes at {base:#x}");

    // The new block's header lands on the old epilogue.
    let bytes = self.arena.bytes_mut();
    let block = Block::at(base);
    block.write(bytes, size, false);
    block::put_tag(bytes, block.next(size).header(), Tag::pack(0, true));

    Some(self.coalesce(block))
  }

  /// Takes `asize` bytes out of the free `block`, splitting off the rest
  /// when it can stand as a block of its own.
  fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    let bytes = self.arena.bytes_mut();
    let csize = block.size(bytes);
    self.free.remove(bytes, block);

    if csize - asize >= MIN_BLOCK_SIZE {
      block.write(bytes, asize, true);

      let rest = block.next(asize);
      rest.write(bytes, csize - asize, false);
      self.coalesce(rest);
    } else {
      block.write(bytes, csize, true);
    }
  }

  /// Usable payload bytes of a block.
  pub(crate) fn usable(
    &self,
    block: Block,
  ) -> usize {
    block.size(self.arena.bytes()) - OVERHEAD
  }

  /// Usable payload bytes of the allocation at `addr`; at least what was
  /// requested.
  pub fn usable_size(
    &self,
    addr: Addr,
  ) -> usize {
    self.usable(addr.block())
  }

  pub fn payload(
    &self,
    addr: Addr,
  ) -> &[u8] {
    let start = addr.offset();
    &self.arena.bytes()[start..start + self.usable_size(addr)]
  }

  pub fn payload_mut(
    &mut self,
    addr: Addr,
  ) -> &mut [u8] {
    let start = addr.offset();
    let end = start + self.usable_size(addr);
    &mut self.arena.bytes_mut()[start..end]
  }

  /// Raw address of the payload, for callers that need a real pointer.
  pub fn as_ptr(
    &self,
    addr: Addr,
  ) -> *const u8 {
    self.arena.base_ptr().wrapping_add(addr.offset())
  }

  pub fn is_initialized(&self) -> bool {
    self.start.is_some()
  }

  pub fn heap_size(&self) -> usize {
    self.arena.len()
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  /// First real block after the prologue, if initialized.
  pub(crate) fn first_block(&self) -> Option<Block> {
    self.start.map(|start| Block::at(start + 2 * DSIZE))
  }

  /// Walks every block between the prologue and the epilogue in address
  /// order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      bytes: self.arena.bytes(),
      cursor: self.first_block(),
    }
  }

  /// Walks the free list in list order, most recently freed first.
  pub fn free_blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    let bytes = self.arena.bytes();
    self.free.iter(bytes).map(move |node| BlockInfo {
      addr: Addr::of(node.block()),
      size: node.block().size(bytes),
      allocated: false,
    })
  }

  /// Counters plus a snapshot of the current heap.
  pub fn stats(&self) -> HeapStats {
    let mut stats = self.stats.clone();
    stats.heap_size = self.arena.len();
    stats.free_blocks = 0;
    stats.free_bytes = 0;

    for block in self.free_blocks() {
      stats.free_blocks += 1;
      stats.free_bytes += block.size;
    }

    stats
  }

  /// Checks whether a free block starts at `addr`, through the typed view.
  pub fn is_free(
    &self,
    addr: Addr,
  ) -> bool {
    FreeBlock::view(self.arena.bytes(), addr.block()).is_some()
  }
}

impl Heap<HeapArena> {
  /// A heap over a [`HeapArena`] reserving `config.max_heap_size` bytes.
  pub fn in_memory(config: HeapConfig) -> Result<Self, AllocError> {
    config.validate()?;
    Self::with_config(HeapArena::new(config.max_heap_size)?, config)
  }
}

#[cfg(unix)]
impl Heap<MmapArena> {
  /// A heap over an [`MmapArena`] reserving `config.max_heap_size` bytes.
  pub fn mapped(config: HeapConfig) -> Result<Self, AllocError> {
    config.validate()?;
    Self::with_config(MmapArena::new(config.max_heap_size)?, config)
  }
}

/// Iterator over blocks in address order, see [`Heap::blocks`].
pub struct Blocks<'a> {
  bytes: &'a [u8],
  cursor: Option<Block>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.cursor?;

    if block.header() + WSIZE > self.bytes.len() {
      self.cursor = None;
      return None;
    }

    let tag = block.tag(self.bytes);
    if tag.size() == 0 {
      // Epilogue, or a zeroed tag in a corrupted heap.
      self.cursor = None;
      return None;
    }

    self.cursor = Some(block.next(tag.size()));
    Some(BlockInfo {
      addr: Addr::of(block),
      size: tag.size(),
      allocated: tag.is_allocated(),
    })
  }
}
