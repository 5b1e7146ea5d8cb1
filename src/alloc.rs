//! The allocator contract shared by control blocks and containers.
//!
//! Allocators are typed: `allocate(n)` hands out room for `n` values of
//! `Self::Value`. A control block or container node obtains an allocator for
//! its own type with `rebind`, which must keep the same backing resource.
//!
//! Equality means "memory from one may be returned through the other".
//! Containers consult it together with the propagation constants when they
//! are copied or assigned.

use crate::error::AllocError;
use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

pub trait Allocator: Clone + PartialEq {
    /// Element type this allocator hands out.
    type Value;

    /// The same allocator, retargeted to element type `U`.
    type Rebind<U>: Allocator<Value = U>;

    /// Copy assignment of a container also copies the source allocator.
    const PROPAGATE_ON_COPY_ASSIGN: bool = false;

    /// Move assignment of a container also moves the source allocator.
    const PROPAGATE_ON_MOVE_ASSIGN: bool = false;

    /// Reserve room for `n` values. Never returns a partially usable region.
    fn allocate(&self, n: usize) -> Result<NonNull<Self::Value>, AllocError>;

    /// Return a region obtained from `allocate` on an equal allocator.
    ///
    /// # Safety
    /// `ptr` must come from `allocate(n)` on an allocator equal to `self`
    /// and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<Self::Value>, n: usize);

    fn rebind<U>(&self) -> Self::Rebind<U>;

    /// Allocator a container copy should start with.
    fn select_on_copy(&self) -> Self {
        self.clone()
    }
}

/// Stateless allocator over the global heap.
pub struct SystemAlloc<T> {
    _ty: PhantomData<fn() -> T>,
}

impl<T> SystemAlloc<T> {
    pub const fn new() -> Self {
        Self { _ty: PhantomData }
    }
}

impl<T> Default for SystemAlloc<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SystemAlloc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SystemAlloc<T> {}

impl<T, U> PartialEq<SystemAlloc<U>> for SystemAlloc<T> {
    fn eq(&self, _other: &SystemAlloc<U>) -> bool {
        true
    }
}

impl<T> Eq for SystemAlloc<T> {}

impl<T> fmt::Debug for SystemAlloc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SystemAlloc")
    }
}

impl<T> Allocator for SystemAlloc<T> {
    type Value = T;
    type Rebind<U> = SystemAlloc<U>;

    const PROPAGATE_ON_MOVE_ASSIGN: bool = true;

    fn allocate(&self, n: usize) -> Result<NonNull<T>, AllocError> {
        let layout = Layout::array::<T>(n).map_err(|_| AllocError::CapacityOverflow)?;
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }
        // SAFETY: layout has non-zero size.
        let raw = unsafe { std::alloc::alloc(layout) };
        NonNull::new(raw.cast::<T>()).ok_or(AllocError::System {
            size: layout.size(),
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        let Ok(layout) = Layout::array::<T>(n) else {
            return;
        };
        if layout.size() != 0 {
            std::alloc::dealloc(ptr.as_ptr().cast::<u8>(), layout);
        }
    }

    fn rebind<U>(&self) -> SystemAlloc<U> {
        SystemAlloc::new()
    }
}

/// Unwrap a system allocation result the way `Box::new` does.
pub(crate) fn or_handle_alloc_error<T>(res: Result<T, AllocError>) -> T {
    match res {
        Ok(v) => v,
        Err(e) => {
            let size = match e {
                AllocError::System { size } => size,
                _ => 0,
            };
            let layout = Layout::from_size_align(size, 1).unwrap_or(Layout::new::<u8>());
            std::alloc::handle_alloc_error(layout)
        }
    }
}
