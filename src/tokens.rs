//! Lifetime-tied linear tokens and the counters that mint them.
//!
//! Tokens are zero-sized proofs that a unit was acquired from a
//! particular counter. Dropping a token panics; the only valid way to
//! dispose of it is to return it to the originating counter via
//! `Count::put`. Every `Shared` handle carries one strong token and every
//! `Weak` handle carries one weak token, so the counters in a control
//! block always equal the number of outstanding tokens.

use core::cell::Cell;
use core::marker::PhantomData;

/// Zero-sized, linear token tied to its originating counter via lifetime.
pub struct Token<'a, C: ?Sized> {
    // Lifetime is tracked separately from the counter type to avoid
    // imposing `'a` bounds on `C`.
    _lt: PhantomData<&'a ()>,
    _ctr: PhantomData<*const C>,
}

impl<'a, C: ?Sized> Token<'a, C> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            _lt: PhantomData,
            _ctr: PhantomData,
        }
    }
}

impl<'a, C: ?Sized> Drop for Token<'a, C> {
    fn drop(&mut self) {
        panic!("Token dropped without Count::put");
    }
}

/// A source of counted references, enforced by linear Token flow.
pub trait Count {
    /// The token type minted by this counter.
    type Token<'a>: Sized
    where
        Self: 'a;

    /// Acquire one counted reference and return a linear token for it.
    fn get(&self) -> Self::Token<'static>;

    /// Return (consume) a previously acquired token.
    /// Returns true if the count is now zero.
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool;
}

/// Marker for the counter of owning handles.
#[derive(Debug)]
pub enum StrongRefs {}

/// Marker for the counter of observing handles.
#[derive(Debug)]
pub enum WeakRefs {}

/// Single-threaded reference counter, branded by the kind of handle it counts.
#[derive(Debug)]
pub struct RefCount<K> {
    count: Cell<usize>,
    _kind: PhantomData<K>,
}

pub type StrongToken = Token<'static, RefCount<StrongRefs>>;
pub type WeakToken = Token<'static, RefCount<WeakRefs>>;

impl<K: 'static> RefCount<K> {
    pub const fn new() -> Self {
        Self {
            count: Cell::new(0),
            _kind: PhantomData,
        }
    }

    #[inline]
    pub fn load(&self) -> usize {
        self.count.get()
    }

    /// Mint a token only if the count is non-zero. A counter that reached
    /// zero stays there.
    #[inline]
    pub fn get_if_live(&self) -> Option<Token<'static, Self>> {
        if self.count.get() == 0 {
            None
        } else {
            Some(self.get())
        }
    }
}

impl<K: 'static> Default for RefCount<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: 'static> Count for RefCount<K> {
    type Token<'a>
        = Token<'a, Self>
    where
        Self: 'a;

    #[inline]
    fn get(&self) -> Self::Token<'static> {
        let n = self.count.get().wrapping_add(1);
        self.count.set(n);
        if n == 0 {
            // Same policy as Rc: abort on overflow rather than continue unsafely.
            std::process::abort();
        }
        Token::<'static, Self>::new()
    }

    #[inline]
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool {
        let c = self.count.get();
        assert!(c > 0, "RefCount underflow");
        let n = c - 1;
        self.count.set(n);
        core::mem::forget(t);
        n == 0
    }
}
