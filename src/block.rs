use core::ptr::{self, NonNull};

use crate::alignment::is_aligned;

/// A type carrying the strictest alignment of any scalar type on the target.
///
/// Rust has no stable `max_align_t`, so the candidates for the widest
/// alignment are gathered in a union instead.
#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy)]
union MaxAlign {
    int128: u128,
    float: f64,
    int64: u64,
    function: fn(),
}

/// The header that prefixes every block, free or used.
///
/// The zero sized `MaxAlign` array raises the alignment of the header to the
/// strictest alignment, and since the size of a type is always a multiple of
/// its alignment, every unit boundary is strictly aligned as well.
#[repr(C)]
pub struct Header {
    /// Size of the block in units, including this header.
    nunits: usize,
    /// Next free block in the ring. Meaningless while the block is in use.
    next: *mut Header,
    _align: [MaxAlign; 0],
}

/// The size of a unit, which is the granularity of every block.
pub const UNIT_SIZE: usize = core::mem::size_of::<Header>();

/// The strictest alignment of any scalar type. Every pointer handed out by
/// the allocator is aligned to it.
pub const STRICT_ALIGNMENT: usize = core::mem::align_of::<MaxAlign>();

const _: () = assert!(UNIT_SIZE.is_power_of_two());
const _: () = assert!(UNIT_SIZE % STRICT_ALIGNMENT == 0);
const _: () = assert!(core::mem::align_of::<Header>() == STRICT_ALIGNMENT);

/// A handle to a block header somewhere inside an added region.
///
/// The handle itself is just a pointer; all accessors that touch the header
/// are unsafe because the caller must guarantee the header is live and that
/// no other thread is touching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block(NonNull<Header>);

impl Block {
    /// Writes a new header of `nunits` units at the given address. The new
    /// block links to itself.
    ///
    /// # Safety
    ///
    ///  - `addr` must be aligned to [`STRICT_ALIGNMENT`].
    ///  - `addr..addr + nunits * UNIT_SIZE` must be valid, writable memory
    ///    that no other block covers.
    pub unsafe fn create(addr: NonNull<u8>, nunits: usize) -> Self {
        debug_assert!(is_aligned(addr.as_ptr() as usize, STRICT_ALIGNMENT));
        let header = addr.cast::<Header>();
        header.as_ptr().write(Header {
            nunits,
            next: header.as_ptr(),
            _align: [],
        });
        Self(header)
    }

    /// Returns the block whose user region starts at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`Block::user_ptr`].
    pub unsafe fn from_user_ptr(ptr: NonNull<u8>) -> Self {
        Self(NonNull::new_unchecked(ptr.cast::<Header>().as_ptr().sub(1)))
    }

    /// The pointer to the first byte after the header.
    pub fn user_ptr(self) -> NonNull<u8> {
        // SAFETY: a block is at least one unit long, so one past the header is
        // still inside (or one past the end of) the block.
        unsafe { NonNull::new_unchecked(self.0.as_ptr().add(1).cast()) }
    }

    /// The address of the header.
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// The total size of the block in units, including the header.
    ///
    /// # Safety
    ///
    /// The header must be live and not concurrently modified.
    pub unsafe fn nunits(self) -> usize {
        ptr::addr_of!((*self.0.as_ptr()).nunits).read()
    }

    /// # Safety
    ///
    /// Same as [`Block::nunits`], and the new size must not make the block
    /// overlap any other block.
    pub unsafe fn set_nunits(self, nunits: usize) {
        ptr::addr_of_mut!((*self.0.as_ptr()).nunits).write(nunits)
    }

    /// The next block in the freelist.
    ///
    /// # Safety
    ///
    /// The block must currently be linked into a freelist.
    pub unsafe fn next(self) -> Self {
        Self(NonNull::new_unchecked(
            ptr::addr_of!((*self.0.as_ptr()).next).read(),
        ))
    }

    /// # Safety
    ///
    /// The header must be live and not concurrently modified.
    pub unsafe fn set_next(self, next: Self) {
        ptr::addr_of_mut!((*self.0.as_ptr()).next).write(next.0.as_ptr())
    }

    /// The address one past the last byte of the block.
    ///
    /// # Safety
    ///
    /// The header must be live.
    pub unsafe fn end_addr(self) -> usize {
        self.addr() + self.nunits() * UNIT_SIZE
    }

    /// The amount of bytes usable by the owner of this block.
    ///
    /// # Safety
    ///
    /// The header must be live.
    pub unsafe fn capacity(self) -> usize {
        (self.nunits() - 1) * UNIT_SIZE
    }

    /// Does `next` start exactly where this block ends?
    ///
    /// # Safety
    ///
    /// The header must be live.
    pub unsafe fn is_adjacent_to(self, next: Self) -> bool {
        self.end_addr() == next.addr()
    }

    /// Absorbs `next`, which must directly follow this block in memory, and
    /// takes over its link.
    ///
    /// # Safety
    ///
    /// Both headers must be live and `next` must be in a freelist.
    pub unsafe fn absorb(self, next: Self) {
        self.set_nunits(self.nunits() + next.nunits());
        self.set_next(next.next());
    }

    /// Shrinks this block by `nunits` units and returns a new block made of
    /// the units that were cut off its tail. The link of this block is left
    /// untouched.
    ///
    /// # Safety
    ///
    /// The header must be live and `nunits` must be smaller than the size of
    /// the block.
    pub unsafe fn split_off_tail(self, nunits: usize) -> Self {
        let remaining = self.nunits() - nunits;
        self.set_nunits(remaining);

        let tail = self.0.as_ptr().add(remaining);
        ptr::addr_of_mut!((*tail).nunits).write(nunits);
        Self(NonNull::new_unchecked(tail))
    }
}
