//! Fixed-capacity bump arena and the allocator cursor over it.
//!
//! `ArenaStorage` owns a byte buffer and a monotonically increasing
//! high-water mark. `ArenaAllocator<T>` is a cheap handle onto one storage;
//! any number of allocators, for any element types, may draw from the same
//! storage. Individual deallocations are ignored. The buffer is released
//! once the storage and every allocator referring to it are gone, so a
//! control block living in the arena can never outlive its memory.

use crate::alloc::{or_handle_alloc_error, Allocator};
use crate::error::AllocError;
use core::alloc::Layout;
use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;
use log::{debug, trace};
use std::rc::Rc;

// Buffer start alignment; requests with larger alignment pay padding.
const BUF_ALIGN: usize = 16;

struct ArenaBuf {
    base: NonNull<u8>,
    layout: Layout,
    capacity: usize,
    // High-water mark: bytes consumed from the start of the buffer.
    used: Cell<usize>,
}

impl ArenaBuf {
    fn try_new(capacity: usize) -> Result<Self, AllocError> {
        let layout = Layout::from_size_align(capacity.max(1), BUF_ALIGN)
            .map_err(|_| AllocError::CapacityOverflow)?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { std::alloc::alloc(layout) };
        let base = NonNull::new(raw).ok_or(AllocError::System {
            size: layout.size(),
        })?;
        Ok(Self {
            base,
            layout,
            capacity,
            used: Cell::new(0),
        })
    }

    fn remaining(&self) -> usize {
        self.capacity - self.used.get()
    }

    /// Carve `size` bytes aligned to `align`. The mark only moves on success.
    fn bump(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(align.is_power_of_two());
        let used = self.used.get();
        let exhausted = || AllocError::Exhausted {
            requested: size,
            align,
            remaining: self.capacity - used,
        };
        let cursor = self.base.as_ptr() as usize + used;
        let aligned = cursor
            .checked_add(align - 1)
            .map(|c| c & !(align - 1))
            .ok_or_else(exhausted)?;
        let start = aligned - self.base.as_ptr() as usize;
        let end = start.checked_add(size).ok_or_else(exhausted)?;
        if end > self.capacity {
            let err = exhausted();
            debug!("arena request refused: {err}");
            return Err(err);
        }
        self.used.set(end);
        trace!("arena {:p}: {size} bytes at offset {start}", self.base);
        // SAFETY: start + size <= capacity, so the pointer stays in the buffer.
        Ok(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(start)) })
    }
}

impl Drop for ArenaBuf {
    fn drop(&mut self) {
        // SAFETY: base was allocated with exactly this layout in `new`.
        unsafe { std::alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

/// Caller-owned backing buffer for `ArenaAllocator`s.
pub struct ArenaStorage {
    buf: Rc<ArenaBuf>,
}

impl ArenaStorage {
    /// Panics on a capacity the global allocator cannot describe. `try_new`
    /// returns `AllocError::CapacityOverflow` instead.
    pub fn new(capacity: usize) -> Self {
        match Self::try_new(capacity) {
            Ok(storage) => storage,
            Err(AllocError::CapacityOverflow) => {
                panic!("arena capacity overflow: {capacity} bytes")
            }
            Err(e) => or_handle_alloc_error(Err(e)),
        }
    }

    pub fn try_new(capacity: usize) -> Result<Self, AllocError> {
        Ok(Self {
            buf: Rc::new(ArenaBuf::try_new(capacity)?),
        })
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity
    }

    /// Bytes consumed so far, including alignment padding.
    pub fn used(&self) -> usize {
        self.buf.used.get()
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn allocator<T>(&self) -> ArenaAllocator<T> {
        ArenaAllocator::new(self)
    }
}

impl fmt::Debug for ArenaStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaStorage")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .finish()
    }
}

/// Bump allocator over an `ArenaStorage`.
///
/// Two allocators are equal iff they draw from the same storage instance,
/// whatever their element types.
pub struct ArenaAllocator<T> {
    buf: Rc<ArenaBuf>,
    _ty: PhantomData<fn() -> T>,
}

impl<T> ArenaAllocator<T> {
    pub fn new(storage: &ArenaStorage) -> Self {
        Self {
            buf: Rc::clone(&storage.buf),
            _ty: PhantomData,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}

impl<T> Clone for ArenaAllocator<T> {
    fn clone(&self) -> Self {
        Self {
            buf: Rc::clone(&self.buf),
            _ty: PhantomData,
        }
    }
}

impl<T, U> PartialEq<ArenaAllocator<U>> for ArenaAllocator<T> {
    fn eq(&self, other: &ArenaAllocator<U>) -> bool {
        Rc::ptr_eq(&self.buf, &other.buf)
    }
}

impl<T> Eq for ArenaAllocator<T> {}

impl<T> fmt::Debug for ArenaAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("storage", &self.buf.base)
            .field("remaining", &self.buf.remaining())
            .finish()
    }
}

impl<T> Allocator for ArenaAllocator<T> {
    type Value = T;
    type Rebind<U> = ArenaAllocator<U>;

    // A container keeps its own arena across copy assignment, but takes the
    // source's arena along with the source's nodes on move assignment.
    const PROPAGATE_ON_COPY_ASSIGN: bool = false;
    const PROPAGATE_ON_MOVE_ASSIGN: bool = true;

    fn allocate(&self, n: usize) -> Result<NonNull<T>, AllocError> {
        let size = n
            .checked_mul(size_of::<T>())
            .ok_or(AllocError::CapacityOverflow)?;
        if size == 0 {
            return Ok(NonNull::dangling());
        }
        self.buf.bump(size, align_of::<T>()).map(NonNull::cast)
    }

    /// No-op: a bump arena reclaims nothing until the storage goes away.
    unsafe fn deallocate(&self, _ptr: NonNull<T>, _n: usize) {}

    fn rebind<U>(&self) -> ArenaAllocator<U> {
        ArenaAllocator {
            buf: Rc::clone(&self.buf),
            _ty: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_advance_the_mark() {
        let storage = ArenaStorage::new(64);
        let bytes: ArenaAllocator<u8> = storage.allocator();
        let words: ArenaAllocator<u64> = bytes.rebind();

        let b = bytes.allocate(3).unwrap();
        assert_eq!(storage.used(), 3);
        let w = words.allocate(2).unwrap();
        assert_eq!(w.as_ptr() as usize % align_of::<u64>(), 0);
        assert!(w.as_ptr() as usize >= b.as_ptr() as usize + 3);
        assert!(storage.used() >= 3 + 16);
    }

    #[test]
    fn refused_request_leaves_the_mark_alone() {
        let storage = ArenaStorage::new(16);
        let a: ArenaAllocator<u32> = storage.allocator();
        a.allocate(3).unwrap();
        let before = storage.used();
        let err = a.allocate(2).unwrap_err();
        assert_eq!(
            err,
            AllocError::Exhausted {
                requested: 8,
                align: 4,
                remaining: 4
            }
        );
        assert_eq!(storage.used(), before);
        assert!(a.allocate(1).is_ok());
        assert_eq!(storage.remaining(), 0);
    }

    #[test]
    fn deallocate_reclaims_nothing() {
        let storage = ArenaStorage::new(32);
        let a: ArenaAllocator<u16> = storage.allocator();
        let p = a.allocate(4).unwrap();
        unsafe { a.deallocate(p, 4) };
        assert_eq!(storage.used(), 8);
    }

    #[test]
    fn zero_sized_requests_do_not_consume_space() {
        let storage = ArenaStorage::new(8);
        let a: ArenaAllocator<()> = storage.allocator();
        a.allocate(100).unwrap();
        let b: ArenaAllocator<u8> = storage.allocator();
        b.allocate(0).unwrap();
        assert_eq!(storage.used(), 0);
    }

    #[test]
    fn oversized_capacity_is_reported_not_panicked() {
        assert_eq!(
            ArenaStorage::try_new(usize::MAX).unwrap_err(),
            AllocError::CapacityOverflow
        );
        assert_eq!(
            ArenaStorage::try_new(isize::MAX as usize).unwrap_err(),
            AllocError::CapacityOverflow
        );
        let ok = ArenaStorage::try_new(24).unwrap();
        assert_eq!(ok.capacity(), 24);
        assert_eq!(ok.remaining(), 24);
    }

    #[test]
    fn buffer_outlives_storage_while_allocators_remain() {
        let a: ArenaAllocator<u64> = {
            let storage = ArenaStorage::new(32);
            storage.allocator()
        };
        let p = a.allocate(1).unwrap();
        unsafe {
            p.as_ptr().write(7);
            assert_eq!(*p.as_ptr(), 7);
        }
    }
}
