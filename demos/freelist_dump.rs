//! Builds a heap out of several regions, copies the command line arguments
//! into it and prints the freelist along the way.

use nextfit_allocator::{Allocator, STRICT_ALIGNMENT};

const HEAP_SIZE: usize = 4096;
const BLOCKS_AMOUNT: usize = 4;
const BLOCK_SIZE: usize = HEAP_SIZE / BLOCKS_AMOUNT;

/// A chunk of memory aligned well enough for the allocator.
#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct HeapBlock([u8; BLOCK_SIZE]);

fn show_freelist(allocator: &Allocator, message: &str) {
    println!("{message}");

    // printing allocates from the system allocator, not from `allocator`, so
    // it's fine to do it while the freelist is being walked.
    let mut count = 0;
    allocator.for_each_free_block(|addr, capacity| {
        count += 1;
        println!("Block #{count}: {addr:#X}, {capacity} bytes");
    });
    println!();
}

fn main() {
    assert!(core::mem::align_of::<HeapBlock>() >= STRICT_ALIGNMENT);

    // an extra block which is not adjacent to the others.
    let mut extra_block = Box::new(HeapBlock([0; BLOCK_SIZE]));
    let mut heap = Box::new([HeapBlock([0; BLOCK_SIZE]); BLOCKS_AMOUNT]);

    let allocator = Allocator::empty();
    unsafe {
        allocator.add_region(extra_block.0.as_mut_ptr(), BLOCK_SIZE);

        // adjacent blocks are merged as they are added.
        for block in heap.iter_mut() {
            allocator.add_region(block.0.as_mut_ptr(), BLOCK_SIZE);
        }
    }
    show_freelist(&allocator, "Initial freelist:");

    // deep copy the arguments.
    let args: Vec<String> = std::env::args().collect();
    let copies = allocator
        .alloc(args.len() * core::mem::size_of::<*mut u8>())
        .cast::<*mut u8>();
    assert!(!copies.is_null());

    for (i, arg) in args.iter().enumerate() {
        let copy = allocator.alloc(arg.len() + 1);
        assert!(!copy.is_null());
        unsafe {
            copy.copy_from_nonoverlapping(arg.as_ptr(), arg.len());
            copy.add(arg.len()).write(0);
            copies.add(i).write(copy);
        }
    }
    show_freelist(&allocator, "Freelist after copying the arguments:");

    println!("Allocated:");
    println!(
        "Block #0: @{:#X}, {} bytes used of {}",
        copies as usize,
        args.len() * core::mem::size_of::<*mut u8>(),
        unsafe { allocator.alloc_size(copies.cast::<u8>()) }
    );
    for (i, arg) in args.iter().enumerate() {
        unsafe {
            let copy = copies.add(i).read();
            let bytes = core::slice::from_raw_parts(copy, arg.len());
            println!(
                "Block #{}: {:?}, {} bytes used of {}",
                i + 1,
                String::from_utf8_lossy(bytes),
                arg.len() + 1,
                allocator.alloc_size(copy)
            );
            allocator.free(copy);
        }
    }
    unsafe { allocator.free(copies.cast::<u8>()) };
    println!();

    show_freelist(&allocator, "Freelist after freeing:");
}
