//! # tagalloc - An Explicit Free-List Allocator
//!
//! This crate provides a `malloc`-style allocator built on **boundary tags**
//! and an **explicit free list**, managing a single arena that only grows
//! forward, the way a heap grows under `sbrk`.
//!
//! ## Overview
//!
//! Every block carries its size and allocation bit in a header and a
//! matching footer. The footer is what makes constant-time coalescing
//! possible: the block before any given block can be found by reading the
//! word right in front of its header.
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                             ARENA                                    │
//!   │                                                                      │
//!   │  ┌───┬──────┬──────────┬────────┬────────────────┬────────┬──────┐   │
//!   │  │pad│ pro- │ A (used) │ F free │   B (used)     │ F free │ epi- │   │
//!   │  │   │logue │          │        │                │        │logue │   │
//!   │  └───┴──────┴──────────┴────────┴────────────────┴────────┴──────┘   │
//!   │                            ▲  │                       ▲  │           │
//!   │                            │  └──── next_free ────────┼──┘           │
//!   │                            └─────── prev_free ────────┘              │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Free blocks are linked through their own payload bytes.
//!   Allocation: first fit over the free list, split if worthwhile.
//!   Release: merge with free neighbors, push the result at the list head.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── arena      - Arena trait, HeapArena, MmapArena
//!   ├── block      - Boundary tag codec
//!   ├── free_list  - Intrusive doubly linked free list
//!   ├── heap       - Heap: init, allocate, release, placement, extension
//!   ├── coalesce   - Four-case boundary-tag coalescing
//!   ├── resize     - realloc-style in-place shrink/grow
//!   ├── check      - Offline consistency checker
//!   ├── config     - HeapConfig
//!   ├── stats      - HeapStats
//!   └── error      - AllocError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{Heap, HeapConfig};
//!
//! let mut heap = Heap::in_memory(HeapConfig::default()).unwrap();
//!
//! // Allocate room for a greeting and fill it in.
//! let greeting = heap.allocate(5).unwrap();
//! heap.payload_mut(greeting)[..5].copy_from_slice(b"hello");
//!
//! // Grow it; the contents come along.
//! let greeting = heap.resize(Some(greeting), 64).unwrap();
//! assert_eq!(&heap.payload(greeting)[..5], b"hello");
//!
//! // Free it.
//! heap.release(Some(greeting));
//! assert!(heap.check().is_ok());
//! ```
//!
//! ## Addresses
//!
//! Allocations are identified by [`Addr`], the offset of the payload inside
//! the arena. Offsets stay valid as the arena grows, every access goes
//! through a bounds-checked slice, and several heaps can live side by side.
//! [`Heap::as_ptr`] turns an address into a real pointer when needed; the
//! arenas hand out 8-byte-aligned bases, so pointers are 8-byte aligned too.
//!
//! ## Block Anatomy
//!
//! ```text
//!   Allocated block:                      Free block:
//!   ┌────────┬──────────────┬────────┐    ┌────────┬──────┬──────┬─────┬────────┐
//!   │ size|1 │   payload    │ size|1 │    │ size|0 │ next │ prev │ ... │ size|0 │
//!   └────────┴──────────────┴────────┘    └────────┴──────┴──────┴─────┴────────┘
//!     4 B     ▲ 8-aligned     4 B           4 B      4 B    4 B           4 B
//!             └── Addr
//! ```
//!
//! The smallest block is 16 bytes: two tags and room for the two links.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: every mutation takes `&mut self`
//! - **No shrinking of the arena**: freed memory is reused, never returned
//! - **4 GiB ceiling**: tags and links are 32-bit words
//! - **Undetected misuse**: releasing a foreign or already released address
//!   corrupts the heap's metadata; [`Heap::check`] can find the damage
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: `trace` for every operation,
//! `debug` for arena growth, `warn` for out-of-memory. Install any logger to
//! see the output.

pub mod align;
pub mod arena;
mod block;
mod check;
mod coalesce;
pub mod config;
mod error;
mod free_list;
mod heap;
mod resize;
mod stats;

#[cfg(unix)]
pub use arena::MmapArena;
pub use arena::{Arena, HeapArena};
pub use block::{ALIGNMENT, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, OVERHEAD};
pub use config::HeapConfig;
pub use error::AllocError;
pub use heap::{Addr, BlockInfo, Blocks, Heap, INIT_SIZE};
pub use stats::HeapStats;
