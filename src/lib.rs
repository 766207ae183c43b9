#![no_std]

//! This is a thread-safe freelist allocator for `no_std` environments, such
//! as firmware, sandboxes or sub-allocators inside a larger program, which
//! hands out memory from regions supplied by the caller.
//!
//! Free memory is kept in a circular singly linked list, ordered by address,
//! of blocks which are prefixed by a one-unit header. Allocation is next fit:
//! the search resumes where the previous operation left off, and a block that
//! is too large is split by carving the allocation from its tail. Freed blocks
//! are inserted at their place in address order and merged with their
//! neighbours, so the freelist never contains two adjacent blocks. A single
//! spinlock protects the whole structure.
//!
//! ## Usage
//!
//! Create an allocator, hand it some memory, and allocate:
//!
//! ```
//! use nextfit_allocator::{Allocator, STRICT_ALIGNMENT};
//!
//! #[repr(align(16))]
//! struct Heap([u8; 4096]);
//!
//! let mut heap = Heap([0; 4096]);
//! let allocator = Allocator::empty();
//! unsafe { allocator.add_region(heap.0.as_mut_ptr(), heap.0.len()) };
//!
//! let ptr = allocator.alloc(100);
//! assert!(!ptr.is_null());
//! assert_eq!(ptr as usize % STRICT_ALIGNMENT, 0);
//! assert!(unsafe { allocator.alloc_size(ptr) } >= 100);
//!
//! unsafe { allocator.free(ptr) };
//! ```
//!
//! An allocator can also be used as the global allocator, as long as it is
//! given memory before the first allocation:
//!
//! ```ignore
//! use nextfit_allocator::Allocator;
//!
//! #[global_allocator]
//! static ALLOCATOR: Allocator = Allocator::empty();
//!
//! pub fn init_heap() {
//!     unsafe {
//!         ALLOCATOR.add_region(heap_start, heap_size);
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - **`log`**: Log region intake and allocation failures through the `log`
//!   crate. Logging never happens while the allocator's lock is held, but a
//!   logger which allocates from the very allocator it is logging about will
//!   recurse on allocation failures, so think twice before enabling this for a
//!   global allocator.

#[cfg(test)]
#[macro_use]
extern crate std;

macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::debug!($($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}

macro_rules! trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}

mod alignment;
mod block;
mod error;
mod freelist;
mod lock;

#[cfg(test)]
mod tests;

use core::{alloc::Layout, ptr::NonNull};

use alignment::*;
use block::Block;
pub use block::{STRICT_ALIGNMENT, UNIT_SIZE};
pub use error::AllocError;
use freelist::Freelist;
use lock::SpinLock;
pub use spin::relax::{Loop, RelaxStrategy, Spin};

/// A next fit freelist memory allocator.
///
/// The allocator starts out without any memory; memory is given to it with
/// [`Allocator::add_region`], as many times as needed. `R` decides how
/// threads waiting for the allocator's lock spin.
pub struct Allocator<R = Spin> {
    freelist: SpinLock<Freelist, R>,
}

impl Allocator {
    /// Creates an empty allocator without any memory region, which will
    /// always return null on allocation requests.
    ///
    /// To give it memory, use the `add_region` method.
    pub const fn empty() -> Self {
        Self::with_relax_strategy()
    }
}

impl<R> Allocator<R> {
    /// Creates an empty allocator whose lock spins using the relax strategy
    /// `R`.
    pub const fn with_relax_strategy() -> Self {
        Self {
            freelist: SpinLock::new(Freelist::new()),
        }
    }
}

impl<R: RelaxStrategy> Allocator<R> {
    /// Adds the memory region of `size` bytes starting at `ptr` to the
    /// allocator.
    ///
    /// The start of the region is aligned up to [`STRICT_ALIGNMENT`] and its
    /// size rounded down to a whole number of units. If the region can't hold
    /// a header and at least one more unit after that, it is ignored. Regions
    /// adjacent to free memory that was already added are merged with it.
    ///
    /// # Safety
    ///
    /// The provided memory region must be valid for reads and writes, must
    /// outlive the allocator and every allocation made from it, must not be
    /// used by anything else, and must not overlap any region previously added
    /// to this allocator.
    pub unsafe fn add_region(&self, ptr: *mut u8, size: usize) {
        let addr = ptr as usize;
        let Some(aligned_addr) = align_up(addr, STRICT_ALIGNMENT) else {
            debug!("ignoring region at {:#x}, it can't be aligned", addr);
            return;
        };
        let padding = aligned_addr - addr;

        let usable = size.saturating_sub(padding);
        if ptr.is_null() || usable < 2 * UNIT_SIZE {
            debug!(
                "ignoring region at {:#x} of {} bytes, it is too small",
                addr, size
            );
            return;
        }

        let nunits = usable / UNIT_SIZE;
        debug!(
            "adding region at {:#x} of {} units, {} bytes usable",
            aligned_addr,
            nunits,
            (nunits - 1) * UNIT_SIZE
        );

        let block = Block::create(NonNull::new_unchecked(ptr.add(padding)), nunits);
        self.freelist.lock().insert(block);
    }

    /// Allocates at least `size` bytes, aligned to [`STRICT_ALIGNMENT`].
    ///
    /// Returns null if `size` is 0 or if no free block is large enough.
    pub fn alloc(&self, size: usize) -> *mut u8 {
        match self.try_alloc(size) {
            Ok(ptr) => ptr.as_ptr(),
            Err(err) => {
                trace!("allocation of {} bytes failed: {}", size, err);
                core::ptr::null_mut()
            }
        }
    }

    /// Allocates at least `size` bytes, aligned to [`STRICT_ALIGNMENT`], and
    /// reports why the allocation failed if it did.
    pub fn try_alloc(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let nunits = Self::units_for(size)?;

        let mut freelist = self.freelist.lock();
        if freelist.is_empty() {
            return Err(AllocError::NoFreelist);
        }

        // SAFETY: every block in the freelist lives in a region which the
        // caller of `add_region` guaranteed to be valid.
        let block =
            unsafe { freelist.take(nunits) }.ok_or(AllocError::OutOfMemory { units: nunits })?;

        Ok(block.user_ptr())
    }

    /// Converts an allocation size into the amount of units needed to hold
    /// it, including the header.
    fn units_for(size: usize) -> Result<usize, AllocError> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }
        let rounded = align_up(size, UNIT_SIZE).ok_or(AllocError::SizeOverflow { size })?;
        Ok(rounded / UNIT_SIZE + 1)
    }

    /// Returns the allocation at `ptr` to the allocator. Does nothing if `ptr`
    /// is null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or have been returned by [`Allocator::alloc`] or
    /// [`Allocator::realloc`] on this allocator, and must not have been freed
    /// since.
    pub unsafe fn free(&self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        let block = Block::from_user_ptr(ptr);
        self.freelist.lock().insert(block);
    }

    /// Resizes the allocation at `ptr` to hold at least `size` bytes.
    ///
    /// A null `ptr` makes this an allocation, and a `size` of 0 makes it a
    /// free, which returns null. If the current block is already large enough
    /// `ptr` is returned as is; otherwise the content is moved to a new
    /// allocation. If that allocation fails, null is returned and `ptr` is
    /// left untouched.
    ///
    /// # Safety
    ///
    /// Same as [`Allocator::free`].
    pub unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.alloc(size);
        }
        if size == 0 {
            self.free(ptr);
            return core::ptr::null_mut();
        }

        let capacity = self.alloc_size(ptr);
        if capacity >= size {
            return ptr;
        }

        let new_ptr = self.alloc(size);
        if !new_ptr.is_null() {
            core::ptr::copy_nonoverlapping(ptr, new_ptr, capacity);
            self.free(ptr);
        }
        new_ptr
    }

    /// Returns the amount of bytes usable in the allocation at `ptr`, which
    /// may be more than what was requested. Returns 0 for a null `ptr`.
    ///
    /// # Safety
    ///
    /// Same as [`Allocator::free`].
    pub unsafe fn alloc_size(&self, ptr: *const u8) -> usize {
        let Some(ptr) = NonNull::new(ptr as *mut u8) else {
            return 0;
        };
        let _freelist = self.freelist.lock();
        Block::from_user_ptr(ptr).capacity()
    }

    /// Calls `f` with the header address and the capacity in bytes of every
    /// free block, in freelist order starting from the roving head.
    ///
    /// The allocator stays locked while `f` runs, so `f` must not use this
    /// allocator, otherwise it will deadlock.
    pub fn for_each_free_block<F: FnMut(usize, usize)>(&self, mut f: F) {
        let freelist = self.freelist.lock();
        // SAFETY: every block in the freelist lives in a region which the
        // caller of `add_region` guaranteed to be valid.
        unsafe { freelist.for_each(|block| f(block.addr(), block.capacity())) }
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::empty()
    }
}

unsafe impl<R: RelaxStrategy> core::alloc::GlobalAlloc for Allocator<R> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > STRICT_ALIGNMENT {
            return core::ptr::null_mut();
        }
        Allocator::<R>::alloc(self, layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.free(ptr)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > STRICT_ALIGNMENT {
            return core::ptr::null_mut();
        }
        Allocator::<R>::realloc(self, ptr, new_size)
    }
}
