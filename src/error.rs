//! Error types surfaced by allocators and handle construction.

use thiserror::Error;

/// An allocator could not satisfy a request.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum AllocError {
    /// The arena has fewer free bytes than the request needs, counting
    /// alignment padding.
    #[error("arena exhausted: requested {requested} bytes (align {align}), {remaining} bytes remaining")]
    Exhausted {
        requested: usize,
        align: usize,
        remaining: usize,
    },
    /// `n * size_of::<T>()` does not fit in `usize`.
    #[error("allocation size overflow")]
    CapacityOverflow,
    /// The system allocator returned null.
    #[error("system allocator failed for {size} bytes")]
    System { size: usize },
}

/// Failure to produce a `Shared` handle.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum SharedError {
    /// The control block could not be allocated.
    #[error(transparent)]
    Alloc(#[from] AllocError),
    /// The object is not (or no longer) owned by any `Shared` handle.
    #[error("bad weak reference: object is not owned by a shared handle")]
    BadWeakRef,
}
