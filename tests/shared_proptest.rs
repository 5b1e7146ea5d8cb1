// Shared/Weak property tests.
//
// Property 1: counts match outstanding handles.
//  - Model: Vec of live Shared handles and Vec of live Weak handles, all
//    for one value.
//  - Invariant: use_count() == strong.len() and weak_count() == weak.len()
//    whenever a handle exists to ask; expired() == strong.is_empty().
//  - Operations: clone, drop, downgrade, drop-weak, lock, reset-in-place.
//
// Property 2: destruction and block release happen exactly once.
//  - The value's drop count is 0 while any Shared lives and 1 after.
//  - The tracked allocator sees exactly one allocation and, once every
//    handle is gone, exactly one deallocation with nothing stray.
use proptest::prelude::*;
use rc_arena::{allocate_shared, AllocStats, Shared, SystemAlloc, TrackingAlloc, Weak};
use std::cell::Cell;
use std::rc::Rc;

struct Probe(Rc<Cell<usize>>);

impl Drop for Probe {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

proptest! {
    #[test]
    fn prop_counts_follow_handles(ops in proptest::collection::vec((0u8..=5u8, 0usize..64usize), 1..200)) {
        let stats = AllocStats::new();
        let drops = Rc::new(Cell::new(0));
        let first = allocate_shared(
            TrackingAlloc::with_stats(SystemAlloc::<()>::new(), stats.clone()),
            Probe(drops.clone()),
        )
        .unwrap();
        let mut strong: Vec<Shared<Probe>> = vec![first];
        let mut weak: Vec<Weak<Probe>> = Vec::new();

        for (op, pick) in ops {
            match op {
                0 => {
                    if let Some(s) = strong.get(pick % strong.len().max(1)) {
                        let c = s.clone();
                        strong.push(c);
                    }
                }
                1 => {
                    if !strong.is_empty() {
                        let i = pick % strong.len();
                        drop(strong.swap_remove(i));
                    }
                }
                2 => {
                    if let Some(s) = strong.get(pick % strong.len().max(1)) {
                        weak.push(Shared::downgrade(s));
                    }
                }
                3 => {
                    if !weak.is_empty() {
                        let i = pick % weak.len();
                        drop(weak.swap_remove(i));
                    }
                }
                4 => {
                    if let Some(w) = weak.get(pick % weak.len().max(1)) {
                        let l = w.lock();
                        prop_assert_eq!(l.is_empty(), strong.is_empty());
                        if !l.is_empty() {
                            strong.push(l);
                        }
                    }
                }
                _ => {
                    if !strong.is_empty() {
                        let i = pick % strong.len();
                        let mut s = strong.swap_remove(i);
                        s.reset();
                        prop_assert!(s.is_empty());
                        prop_assert_eq!(s.use_count(), 0);
                    }
                }
            }

            if let Some(s) = strong.first() {
                prop_assert_eq!(s.use_count(), strong.len());
                prop_assert_eq!(s.weak_count(), weak.len());
                prop_assert_eq!(drops.get(), 0);
            } else {
                prop_assert_eq!(drops.get(), 1);
            }
            for w in &weak {
                prop_assert_eq!(w.expired(), strong.is_empty());
                prop_assert_eq!(w.use_count(), strong.len());
                prop_assert_eq!(w.weak_count(), weak.len());
            }
            let block_alive = !strong.is_empty() || !weak.is_empty();
            prop_assert_eq!(stats.live(), usize::from(block_alive));
        }

        strong.clear();
        weak.clear();
        prop_assert_eq!(drops.get(), 1);
        prop_assert_eq!(stats.allocations(), 1);
        prop_assert_eq!(stats.deallocations(), 1);
        prop_assert_eq!(stats.stray_deallocations(), 0);
    }
}

// Property 3: map projections share the owner's count.
proptest! {
    #[test]
    fn prop_projections_share_the_block(n in 1usize..20) {
        let drops = Rc::new(Cell::new(0));
        let base = rc_arena::make_shared((Probe(drops.clone()), 0u32));
        let views: Vec<Shared<u32>> = (0..n).map(|_| Shared::map(base.clone(), |p| &p.1)).collect();
        prop_assert_eq!(base.use_count(), n + 1);
        drop(base);
        prop_assert_eq!(drops.get(), 0);
        for v in &views {
            prop_assert_eq!(v.use_count(), n);
        }
        drop(views);
        prop_assert_eq!(drops.get(), 1);
    }
}
