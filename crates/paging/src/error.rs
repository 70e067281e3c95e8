//! Error types for the paging core.

/// Errors reported by a [`FrameAllocator`](crate::FrameAllocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// No block of the requested size is available.
    #[error("out of memory")]
    OutOfMemory,
    /// The requested size is zero or cannot be represented.
    #[error("invalid allocation size")]
    InvalidSize,
}

/// Errors that can occur while building, mutating, activating or destroying an address space.
///
/// Every error is reported to the immediate caller and nothing is retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PagingError {
    /// An address that must sit on a page boundary does not. Carries the offending address.
    #[error("address {0:#010x} is not page-aligned")]
    Misaligned(u32),
    /// The frame allocator could not satisfy a request. Any partially built structure has
    /// already been released when this is returned.
    #[error("frame allocation failed: {0}")]
    Alloc(#[from] AllocError),
    /// The address space handle has been destroyed.
    ///
    /// Continuing past this error would touch freed physical memory, so callers should treat it
    /// as a fatal programming error.
    #[error("address space handle is no longer valid")]
    InvalidHandle,
    /// The address space is installed in the MMU and cannot be destroyed until another space has
    /// been activated.
    #[error("cannot destroy the active address space")]
    SpaceActive,
    /// The address space was last installed through a different [`PagingContext`], which is the
    /// only one that can tell whether it is still active.
    ///
    /// [`PagingContext`]: crate::PagingContext
    #[error("address space was activated through another paging context")]
    ForeignContext,
    /// Paging cannot be turned on before a directory has been activated.
    #[error("no address space is active")]
    NoActiveSpace,
    /// Bits outside the entry flag vocabulary were supplied.
    #[error("undefined entry flag bits {0:#05x}")]
    UndefinedFlags(u32),
    /// A run of pages would extend past the end of the 32-bit address space.
    #[error("page run extends past the end of the address space")]
    RangeOverflow,
}
