//! # tagalloc - A Boundary-Tag Memory Allocator Library
//!
//! This crate provides an explicit-free-list **boundary-tag allocator** over
//! a single contiguous, monotonically-growing heap region, in the lineage of
//! the classic `sbrk`-backed C allocators.
//!
//! ## Overview
//!
//! Every block carries its size and allocation state twice, in a header and
//! a mirrored footer. The duplicated tag is what makes freeing O(1): the
//! footer of the *previous* block sits directly before any block's header,
//! so both physical neighbors can be inspected and merged without walking
//! the heap.
//!
//! ```text
//!   One heap, bracketed by permanently-allocated sentinels:
//!
//!   ┌──────────┬─────────────┬─────────────┬── ─ ─ ──┬──────────┐
//!   │ prologue │   block A   │   block B   │         │ epilogue │
//!   ├──────────┼──────┬──────┼──────┬──────┤         ├──────────┤
//!   │  head of │ hdr  │ ftr  │ hdr  │ ftr  │   ...   │ tail of  │
//!   │ free lst │ size │ size │ size │ size │         │ free lst │
//!   └──────────┴──────┴──────┴──────┴──────┴── ─ ─ ──┴──────────┘
//!                  ▲ boundary tags mirror each other ▲
//! ```
//!
//! Free blocks are threaded on a doubly-linked list whose pointers live
//! inside the free payloads themselves, anchored by the two sentinels.
//! Searches, splits and free-list insertions are all *size-directed*: small
//! requests work from the head and the low end of the heap, large requests
//! from the tail and the high end, so the two size classes accrete at
//! opposite ends instead of interleaving.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align    - Alignment macro (align!)
//!   ├── block    - Boundary-tag encoding and block arithmetic (internal)
//!   ├── list     - Explicit free-list primitives (internal)
//!   ├── growers  - Heap primitives: sbrk-backed and arena-backed
//!   └── tag      - TagAllocator: placement, coalescing, heap audit
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{ArenaGrower, TagAllocator};
//!
//! let mut allocator = TagAllocator::new(ArenaGrower::with_capacity(1 << 20)).unwrap();
//!
//! unsafe {
//!   // Allocate 64 bytes and use them.
//!   let ptr = allocator.allocate(64);
//!   assert!(!ptr.is_null());
//!   ptr.write_bytes(0xAB, 64);
//!
//!   // Return them; the block coalesces with its free neighbors.
//!   allocator.deallocate(ptr);
//! }
//!
//! assert!(allocator.check_heap(false));
//! ```
//!
//! For a process-wide heap use [`BrkGrower`], which grows the program data
//! segment through `sbrk(2)` exactly like the historical allocators this
//! design descends from.
//!
//! ## How Allocation Works
//!
//! ```text
//!   allocate(n)
//!     1. adjust:    asize = max(round8(n + 16), 32)
//!     2. find_fit:  first fit over the free list
//!                     small (payload ≤ 100): head → tail
//!                     large (payload > 100): tail → head
//!     3. place:     split when the excess can host a block;
//!                     small: allocated at the LOW end of the block
//!                     large: allocated at the HIGH end of the block
//!     4. no fit:    grow the heap by max(asize, 6 × 64 KiB), merge the
//!                   fresh block with a free predecessor, place there
//! ```
//!
//! Freeing re-marks the tags, inserts the block at the head (small) or tail
//! (large) of the free list, and eagerly merges it with free physical
//! neighbors via the boundary tags.
//!
//! ## Features
//!
//! - **Boundary-tag coalescing**: O(1) merges, no deferred sweeps
//! - **Size-segregated layout**: small and large blocks cluster at opposite
//!   ends of the heap, which curbs fragmentation
//! - **Pluggable heap primitive**: `sbrk` in production, owned arenas in
//!   tests
//! - **Self-audit**: [`TagAllocator::check_heap`] verifies every structural
//!   invariant of the heap and the free list
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **8-byte alignment only**: stricter layouts are not supported
//! - **Memory is never returned to the OS**: the heap only grows
//! - **Naive reallocation**: always allocate-copy-free, no in-place resize
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! Allocation, deallocation and reallocation require `unsafe` blocks;
//! double-free and use-after-free are undefined behavior and are not
//! detected.

pub mod align;
mod block;
mod growers;
mod list;
mod tag;

pub use block::ALIGNMENT;
pub use growers::{ArenaGrower, BrkGrower, Grower};
pub use tag::{CHUNKSIZE, TagAllocator};
