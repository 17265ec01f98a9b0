//! # Boundary-Tag Allocator
//!
//! A general-purpose allocator over one contiguous, monotonically-growing
//! heap region, with an explicit doubly-linked free list and size-directed
//! placement.
//!
//! ## Heap Layout
//!
//! The heap is bracketed by two permanently-allocated sentinel blocks. The
//! prologue anchors the free-list head, the epilogue the tail; every byte
//! between them belongs to exactly one block:
//!
//! ```text
//!   low addresses                                          high addresses
//!   ┌──────────┬─────────┬─────────┬─────────┬── ─ ─ ──┬──────────┐
//!   │ prologue │ block 1 │ block 2 │ block 3 │         │ epilogue │
//!   │ 32 bytes │         │         │         │         │ size = 0 │
//!   │ alloc'd  │         │         │         │         │ alloc'd  │
//!   └──────────┴─────────┴─────────┴─────────┴── ─ ─ ──┴──────────┘
//!   ▲                                                   ▲
//!   └─ free-list head                                   └─ free-list tail
//! ```
//!
//! When the heap grows, the old epilogue is overwritten in place: its header
//! becomes the new free block's header and a fresh epilogue is written past
//! the new region.
//!
//! ## Size-Directed Policy
//!
//! A request is *small* when its payload is at most 100 bytes, *large*
//! otherwise. The class steers every policy decision:
//!
//! ```text
//!                       small request            large request
//!   find_fit            forward from head        backward from tail
//!   split placement     allocated LOW,           allocated HIGH,
//!                       remainder high           remainder low
//!   free insertion      at head                  at tail
//! ```
//!
//! The effect is spatial segregation: small blocks accrete at the low end of
//! the heap and large blocks at the high end, which keeps the two size
//! classes from interleaving and fragmenting each other:
//!
//! ```text
//!   ┌──────────┬────┬────┬────┬──────────────┬────────┬────────┬──────────┐
//!   │ prologue │ s1 │ s2 │ s3 │     free     │   L2   │   L1   │ epilogue │
//!   └──────────┴────┴────┴────┴──────────────┴────────┴────────┴──────────┘
//!               ◄── small requests            large requests ──►
//! ```
//!
//! ## Coalescing
//!
//! Freed blocks merge eagerly with free physical neighbors using the
//! boundary tags: the footer just before a block and the header just after
//! it identify both neighbors in O(1). The prologue carries a real footer
//! and the epilogue a real header, both permanently allocated, so the
//! neighbor checks need no boundary special cases.
//!
//! ## Contract
//!
//! The allocator is single-threaded and hands out 8-aligned payloads.
//! Double-free and use-after-free are undefined behavior; no detection is
//! attempted beyond the [`check_heap`](TagAllocator::check_heap) audit.

use std::cmp;
use std::ptr;

use static_assertions::const_assert;
use tracing::{debug, error, info};

use crate::block::{
  ALIGNMENT, EPILOGUE_RESERVE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, OVERHEAD, PROLOGUE_SIZE, block_of,
  footer_of, link_next, link_prev, next_block, payload_of, prev_block, prev_footer, set_link_next,
  set_link_prev, set_tags, tag_at,
};
use crate::growers::Grower;
use crate::list;

/// Initial heap acquisition and minimum growth unit, in bytes.
pub const CHUNKSIZE: usize = 1 << 16;

/// Largest payload still treated as a small request.
const SMALL_PAYLOAD_MAX: usize = 100;

/// Eager growth multiplier: when the free list has no fit, the heap grows
/// by at least this many chunks to amortize the cost of the growth call.
const GROWTH_FACTOR: usize = 6;

const_assert!(CHUNKSIZE % ALIGNMENT == 0);
const_assert!(CHUNKSIZE >= PROLOGUE_SIZE + EPILOGUE_RESERVE + MIN_BLOCK_SIZE);
const_assert!(GROWTH_FACTOR * CHUNKSIZE <= MAX_BLOCK_SIZE);

/// A boundary-tag allocator with an explicit, sentinel-anchored free list.
///
/// The allocator owns its [`Grower`] and the anchors into the region it
/// manages; dropping the allocator drops the grower (and with it the heap,
/// for growers that own their memory).
///
/// # Thread Safety
///
/// This allocator is **NOT** thread-safe. For multi-threaded usage,
/// external synchronization (e.g., a `Mutex`) is required.
pub struct TagAllocator<G: Grower> {
  /// Header address of the prologue sentinel; permanent free-list head.
  prologue: *mut u8,

  /// Header address of the epilogue sentinel; permanent free-list tail.
  /// Moves on every heap extension.
  epilogue: *mut u8,

  /// The external heap primitive all growth goes through.
  grower: G,
}

impl<G: Grower> TagAllocator<G> {
  /// Initializes a heap inside `grower` and returns the allocator.
  ///
  /// Acquires [`CHUNKSIZE`] bytes and lays them out as prologue, one free
  /// block covering the interior, and epilogue:
  ///
  /// ```text
  ///   ┌──────────┬─────────────────────────────────────────┬──────────┐
  ///   │ prologue │           free, 65480 bytes             │ epilogue │
  ///   └──────────┴─────────────────────────────────────────┴──────────┘
  /// ```
  ///
  /// Returns `None` if the grower cannot serve the initial chunk.
  pub fn new(mut grower: G) -> Option<Self> {
    let base = grower.grow(CHUNKSIZE)?.as_ptr();
    debug_assert_eq!(base as usize % ALIGNMENT, 0);

    // SAFETY: the grower contract makes `base..base + CHUNKSIZE` fresh,
    // exclusively-owned, 8-aligned memory.
    unsafe {
      let prologue = base;
      set_tags(prologue, PROLOGUE_SIZE, true);

      let initial = base.add(PROLOGUE_SIZE);
      let initial_size = CHUNKSIZE - PROLOGUE_SIZE - EPILOGUE_RESERVE;
      set_tags(initial, initial_size, false);

      let epilogue = base.add(CHUNKSIZE - EPILOGUE_RESERVE);
      tag_at(epilogue).set(0, true);

      set_link_prev(prologue, ptr::null_mut());
      set_link_next(prologue, initial);
      set_link_prev(initial, prologue);
      set_link_next(initial, epilogue);
      set_link_prev(epilogue, initial);
      set_link_next(epilogue, ptr::null_mut());

      debug!(base = ?base, free = initial_size, "heap initialized");

      Some(Self {
        prologue,
        epilogue,
        grower,
      })
    }
  }

  /// Whether a block of `size` total bytes carries a small payload.
  ///
  /// The same classification steers `find_fit`, `place` and `deallocate`.
  #[inline]
  fn is_small(size: usize) -> bool {
    size - OVERHEAD <= SMALL_PAYLOAD_MAX
  }

  /// Normalizes a request to an adjusted block size: tag overhead added,
  /// rounded up to 8, clamped to the minimum block.
  #[inline]
  fn adjusted_size(size: usize) -> usize {
    cmp::max(crate::align!(size + OVERHEAD), MIN_BLOCK_SIZE)
  }

  /// Allocates a block with a payload of at least `size` bytes.
  ///
  /// Returns an 8-aligned payload pointer, or null when `size` is 0, when
  /// `size` exceeds the representable block size, or when the heap cannot
  /// grow to satisfy the request.
  ///
  /// # Safety
  ///
  /// The returned pointer is valid until passed to
  /// [`deallocate`](Self::deallocate) or [`reallocate`](Self::reallocate),
  /// and only for this allocator instance. The caller must not use it
  /// beyond `size` bytes.
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size == 0 || size > MAX_BLOCK_SIZE - OVERHEAD {
      return ptr::null_mut();
    }

    let asize = Self::adjusted_size(size);

    unsafe {
      let mut block = self.find_fit(asize);

      if block.is_null() {
        block = self.extend(cmp::max(asize, GROWTH_FACTOR * CHUNKSIZE));
        if block.is_null() {
          debug!(size, asize, "allocation failed, heap cannot grow");
          return ptr::null_mut();
        }
      }

      payload_of(self.place(block, asize))
    }
  }

  /// Returns a payload previously obtained from this allocator.
  ///
  /// A null pointer is a no-op. The block is re-marked free, inserted at
  /// the list end matching its size class at free time, and coalesced with
  /// any free physical neighbors.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a pointer returned by
  /// [`allocate`](Self::allocate) / [`reallocate`](Self::reallocate) on
  /// this instance that has not already been freed.
  pub unsafe fn deallocate(
    &mut self,
    payload: *mut u8,
  ) {
    if payload.is_null() {
      return;
    }

    unsafe {
      let block = block_of(payload);
      let size = tag_at(block).size();

      set_tags(block, size, false);

      if Self::is_small(size) {
        list::insert_at_head(self.prologue, block);
      } else {
        list::insert_at_tail(self.epilogue, block);
      }

      debug!(block = ?block, size, "freed");

      self.coalesce(block);
    }
  }

  /// Resizes an allocation, moving it.
  ///
  /// The naive policy: allocate `new_size` bytes, copy
  /// `min(old_block_size, new_size)` bytes, free the old payload. No
  /// in-place growth or shrink is attempted.
  ///
  /// A null `payload` behaves as [`allocate`](Self::allocate); a zero
  /// `new_size` behaves as [`deallocate`](Self::deallocate) and returns
  /// null.
  ///
  /// # Panics
  ///
  /// Failure to allocate the new block is fatal.
  ///
  /// # Safety
  ///
  /// As [`deallocate`](Self::deallocate) for `payload`; the returned
  /// pointer carries the same contract as [`allocate`](Self::allocate).
  pub unsafe fn reallocate(
    &mut self,
    payload: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    unsafe {
      if payload.is_null() {
        return self.allocate(new_size);
      }
      if new_size == 0 {
        self.deallocate(payload);
        return ptr::null_mut();
      }

      let old_size = tag_at(block_of(payload)).size();

      let new_payload = self.allocate(new_size);
      assert!(
        !new_payload.is_null(),
        "reallocate: heap exhausted resizing a {old_size}-byte block to {new_size} payload bytes",
      );

      // The worst-case source range reaches one tag slot past the old
      // block, which is still inside the heap and never overlaps the
      // destination payload.
      ptr::copy_nonoverlapping(payload, new_payload, cmp::min(old_size, new_size));

      self.deallocate(payload);

      new_payload
    }
  }

  /// First-fit search over the free list, directed by the request class:
  /// small requests scan forward from the head, large requests backward
  /// from the tail. Returns null if nothing fits.
  unsafe fn find_fit(
    &self,
    asize: usize,
  ) -> *mut u8 {
    unsafe {
      if Self::is_small(asize) {
        let mut block = link_next(self.prologue);

        while !block.is_null() {
          let tag = tag_at(block);
          if !tag.allocated() && tag.size() >= asize {
            return block;
          }
          block = link_next(block);
        }
      } else {
        let mut block = link_prev(self.epilogue);

        while !block.is_null() {
          let tag = tag_at(block);
          if !tag.allocated() && tag.size() >= asize {
            return block;
          }
          block = link_prev(block);
        }
      }

      ptr::null_mut()
    }
  }

  /// Carves an `asize`-byte allocation out of free `block`, splitting when
  /// the excess can host a block of its own.
  ///
  /// The allocated portion goes to the LOW end for small requests and the
  /// HIGH end for large ones; either way the free remainder keeps a single
  /// list slot (inherited via replacement, or kept in place). Returns the
  /// header of the allocated portion.
  unsafe fn place(
    &mut self,
    block: *mut u8,
    asize: usize,
  ) -> *mut u8 {
    unsafe {
      let size = tag_at(block).size();
      debug_assert!(size >= asize);

      let split = size - asize;

      if split < MIN_BLOCK_SIZE {
        list::remove(block);
        set_tags(block, size, true);
        debug!(block = ?block, size, "placed whole block");
        return block;
      }

      if Self::is_small(asize) {
        set_tags(block, asize, true);

        let rest = block.add(asize);
        set_tags(rest, split, false);
        list::replace(block, rest);

        debug!(block = ?block, asize, split, "small request placed low");
        block
      } else {
        let allocated = block.add(split);
        set_tags(allocated, asize, true);
        set_tags(block, split, false);

        debug!(block = ?allocated, asize, split, "large request placed high");
        allocated
      }
    }
  }

  /// Merges `block` with free physical neighbors, restitching the free
  /// list, and returns the surviving block.
  ///
  /// The boundary tags of both neighbors are inspected in O(1); the four
  /// cases keep exactly one list slot for the merged block. Both sentinels
  /// read as allocated, so merging never crosses the heap ends.
  unsafe fn coalesce(
    &mut self,
    block: *mut u8,
  ) -> *mut u8 {
    unsafe {
      let size = tag_at(block).size();
      let next = next_block(block);

      let prev_allocated = tag_at(prev_footer(block)).allocated();
      let next_allocated = tag_at(next).allocated();

      match (prev_allocated, next_allocated) {
        (true, true) => block,

        // Absorb the successor; `block` keeps its list slot.
        (true, false) => {
          let merged = size + tag_at(next).size();

          list::remove(next);
          set_tags(block, merged, false);

          debug!(block = ?block, merged, "coalesced with successor");
          block
        }

        // Absorbed into the predecessor, which keeps its list slot.
        (false, true) => {
          let prev = prev_block(block);
          let merged = tag_at(prev).size() + size;

          list::remove(block);
          set_tags(prev, merged, false);

          debug!(block = ?prev, merged, "coalesced into predecessor");
          prev
        }

        // Both neighbors free: everything folds into the predecessor.
        (false, false) => {
          let prev = prev_block(block);
          let merged = tag_at(prev).size() + size + tag_at(next).size();

          list::remove(block);
          list::remove(next);
          set_tags(prev, merged, false);

          debug!(block = ?prev, merged, "coalesced with both neighbors");
          prev
        }
      }
    }
  }

  /// Grows the heap by `n` bytes (a non-zero multiple of 8) and returns
  /// the resulting free block, already coalesced with a free predecessor.
  ///
  /// The old epilogue is reinterpreted in place as the new block's header;
  /// because the epilogue's link slots become the block's link slots, the
  /// block inherits the tail position without any list surgery beyond
  /// pointing it at the fresh epilogue. Returns null if the grower fails
  /// or `n` is 0.
  unsafe fn extend(
    &mut self,
    n: usize,
  ) -> *mut u8 {
    debug_assert_eq!(n % ALIGNMENT, 0);

    if n == 0 {
      return ptr::null_mut();
    }

    let Some(region) = self.grower.grow(n) else {
      debug!(n, "heap extension failed");
      return ptr::null_mut();
    };

    unsafe {
      let block = self.epilogue;
      debug_assert_eq!(region.as_ptr(), block.add(EPILOGUE_RESERVE));

      set_tags(block, n, false);

      let epilogue = block.add(n);
      tag_at(epilogue).set(0, true);
      set_link_next(epilogue, ptr::null_mut());
      set_link_prev(epilogue, block);
      set_link_next(block, epilogue);
      self.epilogue = epilogue;

      debug!(block = ?block, n, "heap extended");

      self.coalesce(block)
    }
  }

  /// Audits the whole heap; returns `true` when every invariant holds.
  ///
  /// Walks the physical blocks from prologue to epilogue and the free list
  /// in both directions, verifying: sentinel tags; header/footer agreement
  /// in size and flag; payload alignment; no adjacent free pair; exact
  /// tiling of the interior; mutual `prev`/`next` consistency; and that
  /// the free list holds exactly the free blocks. Findings are reported as
  /// `tracing` error events; `verbose` additionally emits one event per
  /// block. Intended for tests.
  pub fn check_heap(
    &self,
    verbose: bool,
  ) -> bool {
    let mut ok = true;

    unsafe {
      let prologue_tag = tag_at(self.prologue);
      if prologue_tag.size() != PROLOGUE_SIZE || !prologue_tag.allocated() {
        error!(
          size = prologue_tag.size(),
          allocated = prologue_tag.allocated(),
          "bad prologue header"
        );
        ok = false;
      }

      let prologue_footer = tag_at(footer_of(self.prologue));
      if prologue_footer.size() != PROLOGUE_SIZE || !prologue_footer.allocated() {
        error!("prologue footer disagrees with header");
        ok = false;
      }

      if !link_prev(self.prologue).is_null() {
        error!("prologue prev link is not null");
        ok = false;
      }

      let epilogue_tag = tag_at(self.epilogue);
      if epilogue_tag.size() != 0 || !epilogue_tag.allocated() {
        error!(
          size = epilogue_tag.size(),
          allocated = epilogue_tag.allocated(),
          "bad epilogue header"
        );
        ok = false;
      }

      if !link_next(self.epilogue).is_null() {
        error!("epilogue next link is not null");
        ok = false;
      }

      // Physical walk: header-to-header by block size. Ending exactly on
      // the epilogue proves the interior tiles the heap.
      let mut free_blocks: Vec<*mut u8> = Vec::new();
      let mut previous_free = false;
      let mut block = next_block(self.prologue);

      while block != self.epilogue {
        if block > self.epilogue {
          error!(block = ?block, "block walk overran the epilogue");
          return false;
        }

        let tag = tag_at(block);
        let size = tag.size();

        if verbose {
          info!(block = ?block, size, allocated = tag.allocated(), "block");
        }

        if size < MIN_BLOCK_SIZE || size % ALIGNMENT != 0 {
          error!(block = ?block, size, "bad block size");
          return false;
        }

        if (payload_of(block) as usize) % ALIGNMENT != 0 {
          error!(block = ?block, "misaligned payload");
          ok = false;
        }

        let footer = tag_at(footer_of(block));
        if footer.size() != size || footer.allocated() != tag.allocated() {
          error!(
            block = ?block,
            header_size = size,
            footer_size = footer.size(),
            "header and footer disagree"
          );
          ok = false;
        }

        if !tag.allocated() {
          if previous_free {
            error!(block = ?block, "adjacent free blocks escaped coalescing");
            ok = false;
          }
          free_blocks.push(block);
          previous_free = true;
        } else {
          previous_free = false;
        }

        block = next_block(block);
      }

      // Forward list walk with mutual-link verification; the same links
      // walked backward therefore yield the same blocks.
      let mut listed: Vec<*mut u8> = Vec::new();
      let mut prev = self.prologue;
      let mut cursor = link_next(self.prologue);

      while cursor != self.epilogue {
        if cursor.is_null() {
          error!("free list broke before reaching the epilogue");
          return false;
        }

        if link_prev(cursor) != prev {
          error!(block = ?cursor, "free list prev link does not point back");
          ok = false;
        }

        if tag_at(cursor).allocated() {
          error!(block = ?cursor, "allocated block threaded on the free list");
          ok = false;
        }

        listed.push(cursor);
        prev = cursor;
        cursor = link_next(cursor);
      }

      if link_prev(self.epilogue) != prev {
        error!("epilogue prev link does not point at the list tail");
        ok = false;
      }

      // List membership must equal the free set, as sets.
      free_blocks.sort_unstable();
      listed.sort_unstable();
      if free_blocks != listed {
        error!(
          free = free_blocks.len(),
          listed = listed.len(),
          "free set and free list disagree"
        );
        ok = false;
      }
    }

    ok
  }

  /// Free-list sizes in list order, head to tail.
  #[cfg(test)]
  fn free_sizes(&self) -> Vec<usize> {
    let mut sizes = Vec::new();

    unsafe {
      let mut block = link_next(self.prologue);

      while !block.is_null() && block != self.epilogue {
        sizes.push(tag_at(block).size());
        block = link_next(block);
      }
    }

    sizes
  }
}
