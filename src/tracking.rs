//! Allocation tracking as an allocator adaptor.
//!
//! `TrackingAlloc<A>` forwards to `A` and records every allocation in an
//! `AllocStats` shared by all rebinds and clones of the adaptor. Tests wrap
//! the allocator they care about instead of relying on process-wide
//! counters, so each test observes only its own allocations.

use crate::alloc::Allocator;
use crate::error::AllocError;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::mem::size_of;
use core::ptr::NonNull;
use hashbrown::HashMap;
use log::warn;
use std::rc::Rc;

/// Counters and the live set recorded by a `TrackingAlloc`.
#[derive(Default)]
pub struct AllocStats {
    // address -> bytes, for allocations not yet returned
    live: RefCell<HashMap<usize, usize>>,
    allocations: Cell<usize>,
    deallocations: Cell<usize>,
    failures: Cell<usize>,
    stray: Cell<usize>,
}

impl AllocStats {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Successful `allocate` calls.
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    pub fn deallocations(&self) -> usize {
        self.deallocations.get()
    }

    /// `allocate` calls the inner allocator refused.
    pub fn failures(&self) -> usize {
        self.failures.get()
    }

    /// Deallocations of addresses that were not live (double or foreign frees).
    pub fn stray_deallocations(&self) -> usize {
        self.stray.get()
    }

    /// Non-empty allocations not yet returned.
    pub fn live(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn live_bytes(&self) -> usize {
        self.live.borrow().values().sum()
    }

    pub fn is_live<T>(&self, ptr: NonNull<T>) -> bool {
        self.live.borrow().contains_key(&(ptr.as_ptr() as usize))
    }

    fn record_alloc(&self, addr: usize, bytes: usize) {
        self.allocations.set(self.allocations.get() + 1);
        if bytes != 0 {
            self.live.borrow_mut().insert(addr, bytes);
        }
    }

    fn record_dealloc(&self, addr: usize, bytes: usize) {
        self.deallocations.set(self.deallocations.get() + 1);
        if bytes != 0 && self.live.borrow_mut().remove(&addr).is_none() {
            warn!("deallocation of non-live address {addr:#x} ({bytes} bytes)");
            self.stray.set(self.stray.get() + 1);
        }
    }
}

impl fmt::Debug for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocStats")
            .field("allocations", &self.allocations())
            .field("deallocations", &self.deallocations())
            .field("failures", &self.failures())
            .field("stray", &self.stray_deallocations())
            .field("live", &self.live())
            .finish()
    }
}

/// Allocator adaptor that records traffic through `A` into shared stats.
pub struct TrackingAlloc<A> {
    inner: A,
    stats: Rc<AllocStats>,
}

impl<A: Allocator> TrackingAlloc<A> {
    pub fn new(inner: A) -> Self {
        Self::with_stats(inner, AllocStats::new())
    }

    pub fn with_stats(inner: A, stats: Rc<AllocStats>) -> Self {
        Self { inner, stats }
    }

    pub fn stats(&self) -> &Rc<AllocStats> {
        &self.stats
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: Clone> Clone for TrackingAlloc<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            stats: Rc::clone(&self.stats),
        }
    }
}

impl<A: PartialEq> PartialEq for TrackingAlloc<A> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner && Rc::ptr_eq(&self.stats, &other.stats)
    }
}

impl<A: fmt::Debug> fmt::Debug for TrackingAlloc<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingAlloc")
            .field("inner", &self.inner)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<A: Allocator> Allocator for TrackingAlloc<A> {
    type Value = A::Value;
    type Rebind<U> = TrackingAlloc<A::Rebind<U>>;

    const PROPAGATE_ON_COPY_ASSIGN: bool = A::PROPAGATE_ON_COPY_ASSIGN;
    const PROPAGATE_ON_MOVE_ASSIGN: bool = A::PROPAGATE_ON_MOVE_ASSIGN;

    fn allocate(&self, n: usize) -> Result<NonNull<A::Value>, AllocError> {
        match self.inner.allocate(n) {
            Ok(ptr) => {
                let bytes = n.saturating_mul(size_of::<A::Value>());
                self.stats.record_alloc(ptr.as_ptr() as usize, bytes);
                Ok(ptr)
            }
            Err(e) => {
                self.stats.failures.set(self.stats.failures.get() + 1);
                Err(e)
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<A::Value>, n: usize) {
        let bytes = n.saturating_mul(size_of::<A::Value>());
        self.stats.record_dealloc(ptr.as_ptr() as usize, bytes);
        self.inner.deallocate(ptr, n);
    }

    fn rebind<U>(&self) -> TrackingAlloc<A::Rebind<U>> {
        TrackingAlloc {
            inner: self.inner.rebind::<U>(),
            stats: Rc::clone(&self.stats),
        }
    }

    fn select_on_copy(&self) -> Self {
        Self {
            inner: self.inner.select_on_copy(),
            stats: Rc::clone(&self.stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::SystemAlloc;
    use crate::arena::ArenaStorage;

    #[test]
    fn records_live_set_and_counts() {
        let a = TrackingAlloc::new(SystemAlloc::<u32>::new());
        let p = a.allocate(4).unwrap();
        let q = a.allocate(1).unwrap();
        assert_eq!(a.stats().allocations(), 2);
        assert_eq!(a.stats().live(), 2);
        assert_eq!(a.stats().live_bytes(), 20);
        assert!(a.stats().is_live(p));

        unsafe { a.deallocate(p, 4) };
        assert!(!a.stats().is_live(p));
        assert_eq!(a.stats().live(), 1);
        unsafe { a.deallocate(q, 1) };
        assert_eq!(a.stats().deallocations(), 2);
        assert_eq!(a.stats().stray_deallocations(), 0);
    }

    #[test]
    fn rebinds_share_stats() {
        let a = TrackingAlloc::new(SystemAlloc::<u8>::new());
        let b: TrackingAlloc<SystemAlloc<u64>> = a.rebind();
        let p = b.allocate(2).unwrap();
        assert_eq!(a.stats().live_bytes(), 16);
        unsafe { b.deallocate(p, 2) };
        assert_eq!(a.stats().live(), 0);
    }

    #[test]
    fn refused_requests_count_as_failures() {
        let storage = ArenaStorage::new(8);
        let a = TrackingAlloc::new(storage.allocator::<u64>());
        assert!(a.allocate(2).is_err());
        assert_eq!(a.stats().failures(), 1);
        assert_eq!(a.stats().allocations(), 0);
    }

    #[test]
    fn double_free_is_reported_as_stray() {
        let storage = ArenaStorage::new(8);
        let a = TrackingAlloc::new(storage.allocator::<u16>());
        let p = a.allocate(1).unwrap();
        unsafe {
            a.deallocate(p, 1);
            a.deallocate(p, 1);
        }
        assert_eq!(a.stats().stray_deallocations(), 1);
    }
}
