//! Boundary-tag block metadata.
//!
//! Every block starts with an 8-byte header and ends with an 8-byte footer
//! of identical layout. The first four bytes of either slot pack the block
//! size together with the allocated flag; because sizes are always multiples
//! of 8, bit 0 of the size is free to carry the flag. The remaining four
//! bytes are reserved padding that keeps payloads 8-aligned.
//!
//! ```text
//!   ┌────────────┬──────────────────────────────────────┬────────────┐
//!   │   header   │               payload                │   footer   │
//!   │ size|alloc │                                      │ size|alloc │
//!   │  (8 bytes) │          size - 16 bytes             │  (8 bytes) │
//!   └────────────┴──────────────────────────────────────┴────────────┘
//!
//!   Free blocks overlay the first two payload words with list links:
//!
//!   ┌────────────┬────────────┬────────────┬────── ─ ─ ──┬────────────┐
//!   │   header   │    next    │    prev    │   (unused)  │   footer   │
//!   └────────────┴────────────┴────────────┴────── ─ ─ ──┴────────────┘
//! ```
//!
//! The helpers in this module are pure address computations and tag
//! reads/writes; list threading lives in [`crate::list`] and policy in
//! [`crate::tag`].

use std::mem;

use static_assertions::const_assert;

/// Heap alignment: payloads, headers and footers all sit on 8-byte
/// boundaries, and block sizes are multiples of 8.
pub const ALIGNMENT: usize = 8;

/// Size of one boundary tag slot (header or footer).
pub(crate) const WSIZE: usize = 8;

/// Per-block metadata overhead: one header plus one footer.
pub(crate) const OVERHEAD: usize = 2 * WSIZE;

/// Bytes occupied by the two free-list link slots of a free block.
pub(crate) const LINK_SIZE: usize = 2 * WSIZE;

/// Smallest legal block: header + next + prev + footer.
pub(crate) const MIN_BLOCK_SIZE: usize = OVERHEAD + LINK_SIZE;

/// The prologue sentinel is a permanently-allocated minimum-sized block:
/// header, both link slots, and a real footer so that the predecessor check
/// in coalescing never needs a special case.
pub(crate) const PROLOGUE_SIZE: usize = MIN_BLOCK_SIZE;

/// Physical bytes reserved for the epilogue sentinel at the heap end: a
/// header whose size field is 0 plus the two link slots. The epilogue has
/// no footer and no payload.
pub(crate) const EPILOGUE_RESERVE: usize = WSIZE + LINK_SIZE;

/// Largest representable block: the size field is 31 bits wide.
pub(crate) const MAX_BLOCK_SIZE: usize = (1 << 31) - ALIGNMENT;

const ALLOCATED_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !(ALIGNMENT as u32 - 1);

/// One boundary tag as it lives in heap memory.
#[repr(C)]
pub(crate) struct Tag {
  bits: u32,
  _reserved: u32,
}

const_assert!(mem::size_of::<Tag>() == WSIZE);
const_assert!(mem::align_of::<Tag>() <= ALIGNMENT);
const_assert!(MIN_BLOCK_SIZE == 32);
const_assert!(PROLOGUE_SIZE % ALIGNMENT == 0);
const_assert!(EPILOGUE_RESERVE % ALIGNMENT == 0);

impl Tag {
  /// Full block size in bytes (header + payload + footer).
  #[inline]
  pub(crate) fn size(&self) -> usize {
    (self.bits & SIZE_MASK) as usize
  }

  /// Whether the block carrying this tag is currently allocated.
  #[inline]
  pub(crate) fn allocated(&self) -> bool {
    (self.bits & ALLOCATED_BIT) != 0
  }

  /// Overwrites both fields. `size` must be a multiple of 8 and fit the
  /// 31-bit field.
  #[inline]
  pub(crate) fn set(
    &mut self,
    size: usize,
    allocated: bool,
  ) {
    debug_assert_eq!(size % ALIGNMENT, 0);
    debug_assert!(size <= MAX_BLOCK_SIZE);

    self.bits = size as u32 | allocated as u32;
  }
}

/// Reinterprets a tag slot address as a tag reference.
///
/// # Safety
///
/// `slot` must point at a live header or footer slot inside the heap.
#[inline]
pub(crate) unsafe fn tag_at<'a>(slot: *mut u8) -> &'a mut Tag {
  unsafe { &mut *slot.cast::<Tag>() }
}

/// Address of the footer belonging to `block`, read from its header.
///
/// # Safety
///
/// `block` must point at the header of a block with a valid size field.
#[inline]
pub(crate) unsafe fn footer_of(block: *mut u8) -> *mut u8 {
  unsafe { block.add(tag_at(block).size() - WSIZE) }
}

/// Writes `size`/`allocated` into both the header and the footer of `block`.
///
/// # Safety
///
/// The byte range `[block, block + size)` must lie inside the heap and must
/// not overlap any live payload other than `block`'s own.
#[inline]
pub(crate) unsafe fn set_tags(
  block: *mut u8,
  size: usize,
  allocated: bool,
) {
  unsafe {
    tag_at(block).set(size, allocated);
    tag_at(block.add(size - WSIZE)).set(size, allocated);
  }
}

/// Header address of the physically-next block.
///
/// # Safety
///
/// `block` must point at a block header with a valid, non-zero size field.
#[inline]
pub(crate) unsafe fn next_block(block: *mut u8) -> *mut u8 {
  unsafe { block.add(tag_at(block).size()) }
}

/// Footer slot of the physically-previous block.
///
/// # Safety
///
/// A block must physically precede `block` (true for everything after the
/// prologue, which carries a real footer itself).
#[inline]
pub(crate) unsafe fn prev_footer(block: *mut u8) -> *mut u8 {
  unsafe { block.sub(WSIZE) }
}

/// Header address of the physically-previous block, found through its
/// footer.
///
/// # Safety
///
/// Same as [`prev_footer`], and the footer's size field must be valid.
#[inline]
pub(crate) unsafe fn prev_block(block: *mut u8) -> *mut u8 {
  unsafe { block.sub(tag_at(prev_footer(block)).size()) }
}

/// Payload address of `block`: one tag slot past the header.
///
/// # Safety
///
/// `block` must point at a block header.
#[inline]
pub(crate) unsafe fn payload_of(block: *mut u8) -> *mut u8 {
  unsafe { block.add(WSIZE) }
}

/// Header address for a payload pointer previously handed to a client.
///
/// # Safety
///
/// `payload` must have been produced by [`payload_of`] for a live block.
#[inline]
pub(crate) unsafe fn block_of(payload: *mut u8) -> *mut u8 {
  unsafe { payload.sub(WSIZE) }
}

/// Reads the `next` free-list link of a free block or sentinel.
///
/// # Safety
///
/// `block` must be free or a sentinel; allocated payloads overwrite the
/// link slots.
#[inline]
pub(crate) unsafe fn link_next(block: *mut u8) -> *mut u8 {
  unsafe { block.add(WSIZE).cast::<*mut u8>().read() }
}

/// Reads the `prev` free-list link of a free block or sentinel.
///
/// # Safety
///
/// Same as [`link_next`].
#[inline]
pub(crate) unsafe fn link_prev(block: *mut u8) -> *mut u8 {
  unsafe { block.add(WSIZE + WSIZE).cast::<*mut u8>().read() }
}

/// Writes the `next` free-list link of a free block or sentinel.
///
/// # Safety
///
/// Same as [`link_next`].
#[inline]
pub(crate) unsafe fn set_link_next(
  block: *mut u8,
  to: *mut u8,
) {
  unsafe { block.add(WSIZE).cast::<*mut u8>().write(to) }
}

/// Writes the `prev` free-list link of a free block or sentinel.
///
/// # Safety
///
/// Same as [`link_next`].
#[inline]
pub(crate) unsafe fn set_link_prev(
  block: *mut u8,
  to: *mut u8,
) {
  unsafe { block.add(WSIZE + WSIZE).cast::<*mut u8>().write(to) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tag_round_trips_size_and_flag() {
    let mut buf = [0u64; 8];
    let base = buf.as_mut_ptr().cast::<u8>();

    unsafe {
      let tag = tag_at(base);

      tag.set(64, true);
      assert_eq!(64, tag.size());
      assert!(tag.allocated());

      tag.set(40, false);
      assert_eq!(40, tag.size());
      assert!(!tag.allocated());
    }
  }

  #[test]
  fn tags_bracket_the_block() {
    let mut buf = [0u64; 8];
    let base = buf.as_mut_ptr().cast::<u8>();

    unsafe {
      set_tags(base, 64, false);

      assert_eq!(base.add(64 - WSIZE), footer_of(base));
      assert_eq!(64, tag_at(footer_of(base)).size());
      assert!(!tag_at(footer_of(base)).allocated());
      assert_eq!(base.add(64), next_block(base));
    }
  }

  #[test]
  fn neighbor_arithmetic_inverts() {
    let mut buf = [0u64; 16];
    let base = buf.as_mut_ptr().cast::<u8>();

    unsafe {
      set_tags(base, 32, false);
      set_tags(base.add(32), 48, true);

      let second = next_block(base);
      assert_eq!(base.add(32), second);
      assert_eq!(base, prev_block(second));
      assert_eq!(footer_of(base), prev_footer(second));
    }
  }

  #[test]
  fn payload_is_one_slot_past_header() {
    let mut buf = [0u64; 8];
    let base = buf.as_mut_ptr().cast::<u8>();

    unsafe {
      let payload = payload_of(base);
      assert_eq!(base.add(WSIZE), payload);
      assert_eq!(base, block_of(payload));
    }
  }

  #[test]
  fn link_slots_overlay_the_payload() {
    let mut buf = [0u64; 8];
    let base = buf.as_mut_ptr().cast::<u8>();
    let mut target = [0u64; 1];
    let target_ptr = target.as_mut_ptr().cast::<u8>();

    unsafe {
      set_tags(base, 32, false);
      set_link_next(base, target_ptr);
      set_link_prev(base, std::ptr::null_mut());

      assert_eq!(target_ptr, link_next(base));
      assert!(link_prev(base).is_null());
    }
  }
}
