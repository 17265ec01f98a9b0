use std::io::Read;

use libc::sbrk;
use tagalloc::{BrkGrower, TagAllocator};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just visually track how allocations change the
/// program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  // Route the allocator's internal tracing events to stderr; run with
  // RUST_LOG=tagalloc=debug to watch placement and coalescing decisions.
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  // A boundary-tag allocator over the program break. It acquires one
  // 64 KiB chunk up front and lays out its sentinel blocks inside it.
  let grower = BrkGrower::new().expect("program break unavailable");
  let mut allocator = TagAllocator::new(grower).expect("initial heap acquisition failed");

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Three small allocations (payload ≤ 100 bytes).
    //    Small requests are carved from the LOW end of the heap.
    // --------------------------------------------------------------------
    let small_a = allocator.allocate(24);
    let small_b = allocator.allocate(24);
    let small_c = allocator.allocate(64);
    println!("\n[1] Three small allocations (low end of the heap)");
    println!("[1] small_a = {small_a:?}");
    println!("[1] small_b = {small_b:?}");
    println!("[1] small_c = {small_c:?}");

    small_a.cast::<u64>().write(0xDEADBEEF);
    println!("[1] Value written to small_a = 0x{:X}", small_a.cast::<u64>().read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Two large allocations (payload > 100 bytes).
    //    Large requests are carved from the HIGH end, so their addresses
    //    land above every small block.
    // --------------------------------------------------------------------
    let large_a = allocator.allocate(4096);
    let large_b = allocator.allocate(512);
    println!("\n[2] Two large allocations (high end of the heap)");
    println!("[2] large_a = {large_a:?}");
    println!("[2] large_b = {large_b:?}");
    println!(
      "[2] every small block below every large block? {}",
      if (small_c as usize) < (large_b as usize) {
        "Yes, the size classes are spatially segregated"
      } else {
        "No, something is off"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Free the middle small block and allocate the same size again.
    //    First-fit from the head finds the hole immediately.
    // --------------------------------------------------------------------
    allocator.deallocate(small_b);
    let reused = allocator.allocate(24);
    println!("\n[3] Free small_b, then allocate 24 bytes again");
    println!(
      "[3] reused == small_b? {}",
      if reused == small_b {
        "Yes, the freed block was reused"
      } else {
        "No, it was placed elsewhere"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Free two adjacent blocks and verify they merged: the heap audit
    //    fails loudly if an adjacent free pair survives.
    // --------------------------------------------------------------------
    allocator.deallocate(small_a);
    allocator.deallocate(reused);
    println!("\n[4] Freed small_a and its neighbor; boundary tags merged them");
    println!("[4] heap consistent = {}", allocator.check_heap(false));

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) A request bigger than the remaining free space. The allocator
    //    extends the heap through sbrk, which moves the program break.
    // --------------------------------------------------------------------
    print_program_break("before big alloc");

    let big = allocator.allocate(256 * 1024);
    println!("\n[5] Allocate 256 KiB, forcing the heap to grow");
    println!("[5] big = {big:?}");

    print_program_break("after big alloc");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) End of demo. Freed memory stays in the allocator's free list;
    //    the OS reclaims everything when the process exits.
    // --------------------------------------------------------------------
    allocator.deallocate(big);
    allocator.deallocate(large_a);
    allocator.deallocate(large_b);
    allocator.deallocate(small_c);
    println!("\n[6] All blocks freed, heap consistent = {}", allocator.check_heap(false));
    println!("[6] End of example. Process will exit and the OS will reclaim all memory.");
  }
}
