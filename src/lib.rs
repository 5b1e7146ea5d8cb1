//! rc-arena: single-threaded shared/weak reference-counted handles whose
//! control blocks can live in a caller-supplied allocator, plus a bump
//! arena and an allocator-aware list built on the same allocator contract.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: shared ownership with explicit, observable allocation, built in
//!   small layers that can be reasoned about independently.
//! - Layers:
//!   - `tokens`: zero-sized linear tokens minted and consumed by a
//!     `RefCount`. Every strong and weak unit of a control block is a
//!     token held by exactly one handle.
//!   - `alloc`, `arena`, `tracking`: the `Allocator` contract, the global
//!     heap (`SystemAlloc`), a bump arena (`ArenaStorage` and
//!     `ArenaAllocator`) and an instrumenting wrapper (`TrackingAlloc`).
//!   - `block`: the control block. One header (strong count, weak count,
//!     release functions) followed either by the value itself (in-place
//!     block) or by a pointer and its deleter (regular block). The block
//!     frees itself through a copy of the allocator it was created with.
//!   - `shared`, `weak`, `observer`: the public handles and the
//!     self-observation capability.
//!   - `list`: a doubly linked list that consumes the allocator contract,
//!     including its propagation rules.
//!
//! Constraints
//! - Single-threaded: handles are `!Send`/`!Sync` (no atomics).
//! - The value is destroyed exactly once, when the strong count reaches
//!   zero. The block is released exactly once, when both counts are zero.
//! - All strong handles together hold one weak unit, returned after the
//!   value is destroyed. A value holding a weak reference to itself may
//!   therefore drop it from its own destructor.
//! - Allocators and deleters stored in a block are `'static`: the block's
//!   lifetime is only known at runtime.
//! - Allocation failure is a `Result` at every fallible boundary; the
//!   infallible conveniences (`make_shared`, `Shared::from_box`) go through
//!   `std::alloc::handle_alloc_error`.
//!
//! Overflow semantics
//! - Count overflow aborts the process, matching `Rc`. Count underflow is
//!   a bug in this crate and panics.
//!
//! Notes and non-goals
//! - No thread-safe variant, no cycle collection, no arena reclamation
//!   before the arena itself is dropped.
//! - Subtype conversion is expressed as projection: `Shared::map` can view
//!   a value as a field or as a trait object while keeping the original
//!   block alive.

mod alloc;
mod arena;
mod block;
mod error;
mod list;
mod observer;
mod shared;
pub mod tokens;
mod tracking;
mod weak;

// Public surface
pub use alloc::{Allocator, SystemAlloc};
pub use arena::{ArenaAllocator, ArenaStorage};
pub use block::{DefaultDelete, Deleter};
pub use error::{AllocError, SharedError};
pub use list::{Iter, List};
pub use observer::{EnableSharedFromThis, SelfObserver};
pub use shared::{
    allocate_shared, allocate_shared_observed, allocate_shared_with,
    allocate_shared_with_observed, make_shared, make_shared_observed, Shared,
};
pub use tracking::{AllocStats, TrackingAlloc};
pub use weak::Weak;
