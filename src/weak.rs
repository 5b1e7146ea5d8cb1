//! `Weak<T>`: the observing handle.

use crate::block::BlockRef;
use crate::shared::{Owned, Shared};
use crate::tokens::WeakToken;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

struct Observed<T: ?Sized> {
    block: BlockRef,
    value: NonNull<T>,
    token: WeakToken,
    projected: bool,
}

/// Non-owning handle. Keeps the control block, not the value, alive.
pub struct Weak<T: ?Sized> {
    raw: Option<Observed<T>>,
    _observes: PhantomData<*const T>,
}

impl<T: ?Sized> Weak<T> {
    /// A weak handle observing nothing; always expired.
    pub const fn new() -> Self {
        Self {
            raw: None,
            _observes: PhantomData,
        }
    }

    pub(crate) fn from_parts(
        block: BlockRef,
        value: NonNull<T>,
        token: WeakToken,
        projected: bool,
    ) -> Self {
        Self {
            raw: Some(Observed {
                block,
                value,
                token,
                projected,
            }),
            _observes: PhantomData,
        }
    }

    /// True once no `Shared` handle owns the value (or nothing was ever
    /// observed).
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    pub fn use_count(&self) -> usize {
        self.raw.as_ref().map_or(0, |o| o.block.strong_count())
    }

    pub fn weak_count(&self) -> usize {
        self.raw.as_ref().map_or(0, |o| o.block.weak_count())
    }

    /// A new owning handle, or an empty one if the value is already gone.
    /// Never yields a handle to a destroyed value.
    pub fn lock(&self) -> Shared<T> {
        self.upgrade().unwrap_or_default()
    }

    pub fn upgrade(&self) -> Option<Shared<T>> {
        let o = self.raw.as_ref()?;
        let token = o.block.try_acquire_strong()?;
        Some(Shared::from_owned(Owned {
            block: o.block,
            value: o.value,
            token,
            projected: o.projected,
        }))
    }

    /// Stop observing, leaving this handle empty.
    pub fn reset(&mut self) {
        if let Some(Observed { block, token, .. }) = self.raw.take() {
            // SAFETY: token was minted by block.
            unsafe { block.release_weak(token) };
        }
    }

    /// Observe the same block and view.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        match (&a.raw, &b.raw) {
            (Some(x), Some(y)) => x.block == y.block && x.value.cast::<()>() == y.value.cast::<()>(),
            (None, None) => true,
            _ => false,
        }
    }

    /// Project the view the way `Shared::map` does. The value must be alive
    /// to be projected, so an expired handle maps to an empty `Weak` that no
    /// longer observes the block: its counts read 0 and it does not keep
    /// the block allocated.
    pub fn map<U: ?Sized, F>(&self, f: F) -> Weak<U>
    where
        T: 'static,
        F: FnOnce(&T) -> &U,
    {
        match self.upgrade() {
            Some(strong) => Shared::downgrade(&Shared::map(strong, f)),
            None => Weak::new(),
        }
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    fn from(shared: &Shared<T>) -> Self {
        Shared::downgrade(shared)
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        match &self.raw {
            Some(o) => Self::from_parts(o.block, o.value, o.block.acquire_weak(), o.projected),
            None => Self::new(),
        }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Weak)")
    }
}
