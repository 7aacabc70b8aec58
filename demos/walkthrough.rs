use std::io::Read;

use tagalloc::{Addr, Heap, HeapConfig, MmapArena};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect the process with tools like `pmap` or
/// `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the arena's break, the `sbrk(0)` of the managed region.
fn print_program_break(
  heap: &Heap<MmapArena>,
  label: &str,
) {
  println!(
    "[{}] PID = {}, heap size = {} bytes, break = {:?}",
    label,
    std::process::id(),
    heap.heap_size(),
    heap.arena().program_break(),
  );
}

/// Prints every block in address order, then the free list in list order.
fn print_heap(heap: &Heap<MmapArena>) {
  for block in heap.blocks() {
    println!(
      "    {:#06x}  {:>6} bytes  {}",
      block.addr.offset(),
      block.size,
      if block.allocated { "allocated" } else { "free" }
    );
  }

  let free: Vec<_> = heap
    .free_blocks()
    .map(|block| format!("{:#x}/{}", block.addr.offset(), block.size))
    .collect();
  println!("    free list: [{}]", free.join(" -> "));
}

fn print_alloc(
  heap: &Heap<MmapArena>,
  size: usize,
  addr: Addr,
) {
  println!(
    "Allocated {} bytes, offset = {:#x}, address = {:?}, usable = {}",
    size,
    addr.offset(),
    heap.as_ptr(addr),
    heap.usable_size(addr),
  );
}

fn main() {
  let mut heap = match Heap::mapped(HeapConfig::default().with_max_heap_size(1 << 20)) {
    Ok(heap) => heap,
    Err(err) => {
      eprintln!("cannot map arena: {err}");
      return;
    }
  };

  print_program_break(&heap, "start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Allocate 8 bytes. The first call lays out the prologue, the
  //    initial 16-byte free block and the epilogue, then uses that block.
  // --------------------------------------------------------------------
  let Some(first) = heap.allocate(8) else {
    eprintln!("out of memory");
    return;
  };
  println!("\n[1] Allocate 8 bytes");
  print_alloc(&heap, 8, first);
  heap.payload_mut(first).copy_from_slice(&0xDEAD_BEEF_u64.to_le_bytes());
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Allocate 100 bytes. Nothing on the free list fits, so the arena
  //    grows and the new space becomes a 112-byte block.
  // --------------------------------------------------------------------
  let Some(second) = heap.allocate(100) else {
    eprintln!("out of memory");
    return;
  };
  println!("\n[2] Allocate 100 bytes (arena grows)");
  print_alloc(&heap, 100, second);
  print_program_break(&heap, "after growth");
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Allocate another 8 bytes as a fence after the second block.
  // --------------------------------------------------------------------
  let Some(third) = heap.allocate(8) else {
    eprintln!("out of memory");
    return;
  };
  println!("\n[3] Allocate a fence");
  print_alloc(&heap, 8, third);
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Release the 100-byte block, then ask for 24 bytes. First fit finds
  //    the freed block and splits it; the rest stays on the free list.
  // --------------------------------------------------------------------
  heap.release(Some(second));
  println!("\n[4] Released {:#x}", second.offset());
  print_heap(&heap);

  let Some(fourth) = heap.allocate(24) else {
    eprintln!("out of memory");
    return;
  };
  println!(
    "[4] Allocate 24 bytes: {}",
    if fourth == second {
      "reused the freed block and split it"
    } else {
      "allocated somewhere else"
    }
  );
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Grow the first block. Its neighbor is allocated, so the contents
  //    move to a new block and the old one is released.
  // --------------------------------------------------------------------
  let Some(moved) = heap.resize(Some(first), 64) else {
    eprintln!("out of memory");
    return;
  };
  let mut word = [0u8; 8];
  word.copy_from_slice(&heap.payload(moved)[..8]);
  println!(
    "\n[5] Resize {:#x} to 64 bytes -> {:#x}, value = {:#X}",
    first.offset(),
    moved.offset(),
    u64::from_le_bytes(word)
  );
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) Release everything. Coalescing folds it all back into one block.
  // --------------------------------------------------------------------
  for addr in [moved, third, fourth] {
    heap.release(Some(addr));
  }
  println!("\n[6] Released everything");
  print_heap(&heap);

  match heap.check() {
    Ok(()) => println!("[6] heap is consistent"),
    Err(err) => println!("[6] {err}"),
  }
  println!("[6] {}", heap.stats().summary());
}
