/// The reason an allocation request could not be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum AllocError {
    #[display("zero sized allocation requested")]
    ZeroSize,
    #[display("allocation size overflows when rounded up to a whole unit, size={size}")]
    SizeOverflow { size: usize },
    #[display("no memory region was added to the allocator, or all of it is in use")]
    NoFreelist,
    #[display("no free block is large enough, units={units}")]
    OutOfMemory { units: usize },
}
