//! Randomized allocator traffic with full-heap audits.
//!
//! Every live allocation carries a shadow fill byte; payloads are verified
//! before they are freed or resized, and the structural audit runs at a
//! fixed cadence and at quiescence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tagalloc::{ArenaGrower, CHUNKSIZE, TagAllocator};

struct Slot {
  ptr: *mut u8,
  len: usize,
  fill: u8,
}

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

unsafe fn fill(
  ptr: *mut u8,
  len: usize,
  byte: u8,
) {
  unsafe { ptr.write_bytes(byte, len) }
}

unsafe fn verify(
  ptr: *mut u8,
  len: usize,
  byte: u8,
) {
  for i in 0..len {
    let got = unsafe { ptr.add(i).read() };
    assert_eq!(byte, got, "payload byte {i} of {len} corrupted at {ptr:p}");
  }
}

#[test]
fn randomized_traffic_keeps_the_heap_consistent() {
  init_tracing();

  let mut rng = StdRng::seed_from_u64(0xA110_C47E);
  let mut allocator =
    TagAllocator::new(ArenaGrower::with_capacity(16 << 20)).expect("arena holds the initial chunk");

  let mut live: Vec<Slot> = Vec::new();
  let mut serial: u8 = 0;

  unsafe {
    for op in 0..4000 {
      let roll = rng.gen_range(0..100);

      if roll < 55 || live.is_empty() {
        let len = rng.gen_range(1..=2048);
        let ptr = allocator.allocate(len);
        assert!(!ptr.is_null(), "allocation of {len} bytes failed");

        serial = serial.wrapping_add(1);
        fill(ptr, len, serial);
        live.push(Slot {
          ptr,
          len,
          fill: serial,
        });
      } else if roll < 85 {
        let slot = live.swap_remove(rng.gen_range(0..live.len()));
        verify(slot.ptr, slot.len, slot.fill);
        allocator.deallocate(slot.ptr);
      } else {
        let index = rng.gen_range(0..live.len());
        let new_len = rng.gen_range(1..=4096);
        let old = &live[index];
        let preserved = old.len.min(new_len);
        let fill_byte = old.fill;

        let ptr = allocator.reallocate(old.ptr, new_len);
        assert!(!ptr.is_null());
        verify(ptr, preserved, fill_byte);

        serial = serial.wrapping_add(1);
        fill(ptr, new_len, serial);
        live[index] = Slot {
          ptr,
          len: new_len,
          fill: serial,
        };
      }

      if op % 64 == 0 {
        assert!(allocator.check_heap(false), "heap audit failed after op {op}");
      }
    }

    for slot in live.drain(..) {
      verify(slot.ptr, slot.len, slot.fill);
      allocator.deallocate(slot.ptr);
    }
  }

  assert!(allocator.check_heap(false), "heap audit failed at quiescence");
}

#[test]
fn random_order_frees_coalesce_back_to_a_servable_heap() {
  init_tracing();

  // No spare arena capacity: after the churn, a half-chunk allocation can
  // only succeed if coalescing rebuilt a single large free block.
  let mut rng = StdRng::seed_from_u64(0x5EED);
  let mut allocator =
    TagAllocator::new(ArenaGrower::with_capacity(CHUNKSIZE)).expect("arena holds the initial chunk");

  unsafe {
    let mut ptrs: Vec<*mut u8> = (0..64)
      .map(|_| allocator.allocate(rng.gen_range(1..=512)))
      .collect();
    assert!(ptrs.iter().all(|p| !p.is_null()));

    while !ptrs.is_empty() {
      let ptr = ptrs.swap_remove(rng.gen_range(0..ptrs.len()));
      allocator.deallocate(ptr);
    }

    assert!(allocator.check_heap(false));

    let big = allocator.allocate(CHUNKSIZE / 2);
    assert!(!big.is_null(), "coalescing failed to rebuild a large block");
  }
}
