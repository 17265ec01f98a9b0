//! The explicit free list.
//!
//! The list is doubly linked and threaded through the link slots of free
//! blocks, with the prologue sentinel as permanent head and the epilogue
//! sentinel as permanent tail:
//!
//! ```text
//!   prologue ⇄ free block ⇄ free block ⇄ ... ⇄ free block ⇄ epilogue
//!   (prev: null)                                       (next: null)
//! ```
//!
//! List order is insertion order, not address order; the allocation policy
//! decides which end a freed block enters. These primitives are agnostic of
//! that choice and never touch boundary tags.

use crate::block::{link_next, link_prev, set_link_next, set_link_prev};

/// Splices `block` between `head` (the prologue) and its current successor.
///
/// # Safety
///
/// `head` must be the prologue of a live heap and `block` a free block of
/// that heap which is not currently in the list.
pub(crate) unsafe fn insert_at_head(
  head: *mut u8,
  block: *mut u8,
) {
  unsafe {
    let first = link_next(head);

    set_link_prev(block, head);
    set_link_next(block, first);
    set_link_next(head, block);
    set_link_prev(first, block);
  }
}

/// Splices `block` between `tail` (the epilogue) and its current
/// predecessor.
///
/// # Safety
///
/// `tail` must be the epilogue of a live heap and `block` a free block of
/// that heap which is not currently in the list.
pub(crate) unsafe fn insert_at_tail(
  tail: *mut u8,
  block: *mut u8,
) {
  unsafe {
    let last = link_prev(tail);

    set_link_next(block, tail);
    set_link_prev(block, last);
    set_link_prev(tail, block);
    set_link_next(last, block);
  }
}

/// Unlinks `block` from the list.
///
/// # Safety
///
/// `block` must currently be in the list and must not be a sentinel; both
/// of its neighbors' link slots are rewritten.
pub(crate) unsafe fn remove(block: *mut u8) {
  unsafe {
    let prev = link_prev(block);
    let next = link_next(block);

    set_link_next(prev, next);
    set_link_prev(next, prev);
  }
}

/// Puts `new` into the list position currently held by `old`.
///
/// Used when a split leaves the free remainder at a different address than
/// the block that owned the list slot.
///
/// # Safety
///
/// `old` must currently be in the list and must not be a sentinel; `new`
/// must be a free block that is not in the list.
pub(crate) unsafe fn replace(
  old: *mut u8,
  new: *mut u8,
) {
  unsafe {
    let prev = link_prev(old);
    let next = link_next(old);

    set_link_prev(new, prev);
    set_link_next(new, next);
    set_link_next(prev, new);
    set_link_prev(next, new);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::{MIN_BLOCK_SIZE, link_next, link_prev};

  /// Lays out `n` fake blocks in `buf`, wires the first as head and the
  /// last as tail, and returns their header addresses.
  unsafe fn sentinels(
    buf: &mut [u64],
    n: usize,
  ) -> Vec<*mut u8> {
    let base = buf.as_mut_ptr().cast::<u8>();
    let blocks: Vec<*mut u8> = (0..n).map(|i| unsafe { base.add(i * MIN_BLOCK_SIZE) }).collect();

    unsafe {
      set_link_prev(blocks[0], std::ptr::null_mut());
      set_link_next(blocks[0], blocks[n - 1]);
      set_link_prev(blocks[n - 1], blocks[0]);
      set_link_next(blocks[n - 1], std::ptr::null_mut());
    }

    blocks
  }

  #[test]
  fn head_insertion_lands_first() {
    let mut buf = [0u64; 16];

    unsafe {
      let blocks = sentinels(&mut buf, 3);
      let (head, tail, b) = (blocks[0], blocks[2], blocks[1]);

      insert_at_head(head, b);

      assert_eq!(b, link_next(head));
      assert_eq!(head, link_prev(b));
      assert_eq!(tail, link_next(b));
      assert_eq!(b, link_prev(tail));
    }
  }

  #[test]
  fn tail_insertion_lands_last() {
    let mut buf = [0u64; 20];

    unsafe {
      let blocks = sentinels(&mut buf, 4);
      let (head, tail) = (blocks[0], blocks[3]);

      insert_at_head(head, blocks[1]);
      insert_at_tail(tail, blocks[2]);

      assert_eq!(blocks[1], link_next(head));
      assert_eq!(blocks[2], link_next(blocks[1]));
      assert_eq!(tail, link_next(blocks[2]));
      assert_eq!(blocks[2], link_prev(tail));
    }
  }

  #[test]
  fn removal_restitches_neighbors() {
    let mut buf = [0u64; 16];

    unsafe {
      let blocks = sentinels(&mut buf, 3);
      let (head, tail, b) = (blocks[0], blocks[2], blocks[1]);

      insert_at_head(head, b);
      remove(b);

      assert_eq!(tail, link_next(head));
      assert_eq!(head, link_prev(tail));
    }
  }

  #[test]
  fn replacement_inherits_the_slot() {
    let mut buf = [0u64; 20];

    unsafe {
      let blocks = sentinels(&mut buf, 4);
      let (head, tail) = (blocks[0], blocks[3]);

      insert_at_head(head, blocks[1]);
      replace(blocks[1], blocks[2]);

      assert_eq!(blocks[2], link_next(head));
      assert_eq!(head, link_prev(blocks[2]));
      assert_eq!(tail, link_next(blocks[2]));
      assert_eq!(blocks[2], link_prev(tail));
    }
  }
}
