
use core::alloc::Layout;
use std::vec::Vec;

use super::*;

/// A memory region obtained from the system allocator, aligned to
/// [`STRICT_ALIGNMENT`], which is returned to the system allocator when
/// dropped.
struct Arena {
    ptr: *mut u8,
    layout: Layout,
}
impl Arena {
    fn new(size: usize) -> Self {
        let layout = Layout::from_size_align(size, STRICT_ALIGNMENT).unwrap();
        let ptr = unsafe { std::alloc::alloc(layout) };
        assert!(!ptr.is_null());
        Self { ptr, layout }
    }

    /// Returns a pointer `offset` bytes into the arena.
    fn ptr_at(&self, offset: usize) -> *mut u8 {
        assert!(offset <= self.layout.size());
        unsafe { self.ptr.add(offset) }
    }

    fn addr(&self) -> usize {
        self.ptr as usize
    }
}
impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr, self.layout) }
    }
}

/// A guard that creates an allocator and gives it a single region of memory,
/// and frees that memory when dropped.
struct AllocatorInitGuard {
    allocator: Allocator,
    arena: Arena,
}
impl AllocatorInitGuard {
    /// Creates an allocator whose only region is a fresh arena of `mem_size`
    /// bytes.
    fn init(mem_size: usize) -> Self {
        let guard = Self {
            allocator: Allocator::empty(),
            arena: Arena::new(mem_size),
        };
        unsafe { guard.allocator.add_region(guard.arena.ptr, mem_size) };
        guard
    }

    /// Returns the address of the heap memory region.
    fn addr(&self) -> usize {
        self.arena.addr()
    }
}

/// The capacity of the single free block made from an aligned region of
/// `mem_size` bytes.
fn capacity_of_region(mem_size: usize) -> usize {
    (mem_size / UNIT_SIZE - 1) * UNIT_SIZE
}

/// The amount of units an allocation of `size` bytes occupies, including the
/// header.
fn units_of_allocation(size: usize) -> usize {
    size.div_ceil(UNIT_SIZE) + 1
}

/// Returns the `(header address, capacity)` of every free block, in freelist
/// order.
fn free_blocks<R: RelaxStrategy>(allocator: &Allocator<R>) -> Vec<(usize, usize)> {
    let mut blocks = Vec::new();
    allocator.for_each_free_block(|addr, capacity| blocks.push((addr, capacity)));
    blocks
}

/// The total amount of bytes occupied by free blocks, headers included.
fn free_bytes_including_headers<R: RelaxStrategy>(allocator: &Allocator<R>) -> usize {
    free_blocks(allocator)
        .into_iter()
        .map(|(_, capacity)| capacity + UNIT_SIZE)
        .sum()
}

/// Asserts that the freelist only contains a single free block with the
/// given capacity.
fn assert_only_1_free_block<R: RelaxStrategy>(allocator: &Allocator<R>, capacity: usize) {
    let blocks = free_blocks(allocator);
    assert_eq!(blocks.len(), 1, "freelist: {:x?}", blocks);
    assert_eq!(blocks[0].1, capacity);
}

/// Asserts that the freelist is ordered by address with exactly one wrap
/// around, that its blocks are aligned, and that no two blocks overlap or
/// touch.
fn assert_freelist_is_consistent<R: RelaxStrategy>(allocator: &Allocator<R>) {
    let blocks = free_blocks(allocator);

    for &(addr, capacity) in &blocks {
        assert!(is_aligned(addr, STRICT_ALIGNMENT));
        assert_eq!(capacity % UNIT_SIZE, 0);
    }

    if blocks.len() > 1 {
        let wraps = (0..blocks.len())
            .filter(|&i| blocks[(i + 1) % blocks.len()].0 < blocks[i].0)
            .count();
        assert_eq!(wraps, 1, "freelist is not address ordered: {:x?}", blocks);
    }

    let mut sorted = blocks.clone();
    sorted.sort_unstable();
    for pair in sorted.windows(2) {
        let (addr, capacity) = pair[0];
        let end = addr + UNIT_SIZE + capacity;
        assert!(
            end < pair[1].0,
            "free blocks overlap or were not coalesced: {:x?}",
            blocks
        );
    }
}
