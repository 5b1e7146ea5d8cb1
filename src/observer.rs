//! Self-observation: letting a managed value hand out owning handles to
//! itself.
//!
//! A type opts in by embedding a `SelfObserver<Self>` and implementing
//! `EnableSharedFromThis`. The `*_observed` constructors point the embedded
//! weak handle at the freshly created block. The back-reference is weak, so
//! the value does not keep itself alive.

use crate::error::SharedError;
use crate::shared::Shared;
use crate::weak::Weak;
use core::cell::RefCell;
use core::fmt;

/// Weak back-reference from a value to the block that owns it.
pub struct SelfObserver<T> {
    weak: RefCell<Weak<T>>,
}

impl<T> SelfObserver<T> {
    pub const fn new() -> Self {
        Self {
            weak: RefCell::new(Weak::new()),
        }
    }

    /// Point at `owner` unless already observing a live owner.
    pub(crate) fn attach(&self, owner: &Shared<T>) {
        let mut weak = self.weak.borrow_mut();
        if weak.expired() {
            *weak = Shared::downgrade(owner);
        }
    }

    pub fn lock(&self) -> Result<Shared<T>, SharedError> {
        self.weak.borrow().upgrade().ok_or(SharedError::BadWeakRef)
    }

    pub fn weak(&self) -> Weak<T> {
        self.weak.borrow().clone()
    }
}

impl<T> Default for SelfObserver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SelfObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfObserver")
            .field("expired", &self.weak.borrow().expired())
            .finish()
    }
}

/// Opt-in capability for values that need owning handles to themselves.
pub trait EnableSharedFromThis: Sized {
    fn self_observer(&self) -> &SelfObserver<Self>;

    /// An owning handle to `self`.
    ///
    /// Fails with `SharedError::BadWeakRef` if `self` was never placed
    /// under a `Shared` handle through an `*_observed` constructor, or if
    /// its owners are already gone.
    fn shared_from_this(&self) -> Result<Shared<Self>, SharedError> {
        self.self_observer().lock()
    }

    fn weak_from_this(&self) -> Weak<Self> {
        self.self_observer().weak()
    }
}
