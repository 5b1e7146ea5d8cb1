//! `Shared<T>`: the owning handle.
//!
//! A handle is either empty or holds a strong token for a control block
//! together with a view pointer into the block's value. The view may differ
//! from the block's own value pointer after `Shared::map` (a field, or the
//! same value seen as a trait object); the block always releases the value
//! through the type it was created with.

use crate::alloc::{or_handle_alloc_error, Allocator, SystemAlloc};
use crate::block::{Adopted, BlockRef, DefaultDelete, Deleter, InPlaceBlock, RegularBlock};
use crate::error::{AllocError, SharedError};
use crate::observer::EnableSharedFromThis;
use crate::tokens::StrongToken;
use crate::weak::Weak;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ops::Deref;
use core::ptr::NonNull;

pub(crate) struct Owned<T: ?Sized> {
    pub(crate) block: BlockRef,
    pub(crate) value: NonNull<T>,
    pub(crate) token: StrongToken,
    // The view came from `map` rather than from the block itself.
    pub(crate) projected: bool,
}

/// Reference-counted owning handle. `!Send`/`!Sync`: counts are plain
/// integers.
pub struct Shared<T: ?Sized> {
    raw: Option<Owned<T>>,
    _owns: PhantomData<T>,
}

/// Build `value` in a control block obtained from the global heap.
pub fn make_shared<T>(value: T) -> Shared<T> {
    or_handle_alloc_error(allocate_shared(SystemAlloc::<()>::new(), value))
}

/// Build `value` in a control block obtained from `alloc`.
pub fn allocate_shared<T, A>(alloc: A, value: T) -> Result<Shared<T>, AllocError>
where
    A: Allocator + 'static,
{
    allocate_shared_with(alloc, move || value)
}

/// Like `allocate_shared`, but builds the value only once the block memory
/// is secured. A panic in `init` returns the memory and propagates.
pub fn allocate_shared_with<T, A, F>(alloc: A, init: F) -> Result<Shared<T>, AllocError>
where
    A: Allocator + 'static,
    F: FnOnce() -> T,
{
    InPlaceBlock::create(alloc, init).map(Shared::from_adopted)
}

/// `make_shared` for self-observing types: `value.shared_from_this()`
/// works as soon as this returns.
pub fn make_shared_observed<T: EnableSharedFromThis>(value: T) -> Shared<T> {
    let this = make_shared(value);
    this.attach_observer();
    this
}

pub fn allocate_shared_observed<T, A>(alloc: A, value: T) -> Result<Shared<T>, AllocError>
where
    T: EnableSharedFromThis,
    A: Allocator + 'static,
{
    allocate_shared_with_observed(alloc, move || value)
}

pub fn allocate_shared_with_observed<T, A, F>(alloc: A, init: F) -> Result<Shared<T>, AllocError>
where
    T: EnableSharedFromThis,
    A: Allocator + 'static,
    F: FnOnce() -> T,
{
    let this = allocate_shared_with(alloc, init)?;
    this.attach_observer();
    Ok(this)
}

impl<T: ?Sized> Shared<T> {
    pub const fn empty() -> Self {
        Self {
            raw: None,
            _owns: PhantomData,
        }
    }

    pub(crate) fn from_adopted(adopted: Adopted<T>) -> Self {
        let Adopted {
            block,
            value,
            token,
        } = adopted;
        Self::from_owned(Owned {
            block,
            value,
            token,
            projected: false,
        })
    }

    pub(crate) fn from_owned(owned: Owned<T>) -> Self {
        Self {
            raw: Some(owned),
            _owns: PhantomData,
        }
    }

    /// Take ownership of a boxed value through a regular control block.
    pub fn from_box(value: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(value));
        let res = RegularBlock::create(ptr, DefaultDelete, SystemAlloc::<()>::new());
        or_handle_alloc_error(res.map(Self::from_adopted))
    }

    /// Take ownership of a raw pointer, released with `Box::from_raw`.
    ///
    /// A null pointer yields an empty handle.
    ///
    /// # Safety
    /// `ptr` must come from `Box::into_raw` and must not be freed or owned
    /// by anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Result<Self, SharedError> {
        Self::from_raw_in(ptr, DefaultDelete, SystemAlloc::<()>::new())
    }

    /// # Safety
    /// `deleter` must be a correct way to release `ptr`, and nothing else
    /// may release it.
    pub unsafe fn from_raw_with_deleter<D>(ptr: *mut T, deleter: D) -> Result<Self, SharedError>
    where
        D: Deleter<T> + 'static,
    {
        Self::from_raw_in(ptr, deleter, SystemAlloc::<()>::new())
    }

    /// Take ownership of `ptr`, placing the control block in `alloc`.
    ///
    /// If the block cannot be allocated, `deleter` is run on `ptr` and the
    /// allocation error is returned.
    ///
    /// # Safety
    /// As for `from_raw_with_deleter`.
    pub unsafe fn from_raw_in<D, A>(ptr: *mut T, deleter: D, alloc: A) -> Result<Self, SharedError>
    where
        D: Deleter<T> + 'static,
        A: Allocator + 'static,
    {
        let Some(ptr) = NonNull::new(ptr) else {
            return Ok(Self::empty());
        };
        let adopted = RegularBlock::create(ptr, deleter, alloc)?;
        Ok(Self::from_adopted(adopted))
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// Number of `Shared` handles for this value; 0 for an empty handle.
    pub fn use_count(&self) -> usize {
        self.raw.as_ref().map_or(0, |o| o.block.strong_count())
    }

    /// Number of `Weak` handles observing this value; 0 for an empty handle.
    pub fn weak_count(&self) -> usize {
        self.raw.as_ref().map_or(0, |o| o.block.weak_count())
    }

    pub fn get(&self) -> Option<&T> {
        // SAFETY: our strong token keeps the value alive.
        self.raw.as_ref().map(|o| unsafe { o.value.as_ref() })
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.raw.as_ref().map(|o| o.value)
    }

    /// Exclusive access when no other `Shared` or `Weak` handle exists.
    ///
    /// Always `None` for a handle produced by `map`: a projected view was
    /// derived from a shared borrow and may not even point into the block.
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        let owned = this.raw.as_mut()?;
        if owned.projected {
            return None;
        }
        if owned.block.strong_count() == 1 && owned.block.weak_count() == 0 {
            // SAFETY: unique owner, no observers; `this` is borrowed mutably.
            Some(unsafe { owned.value.as_mut() })
        } else {
            None
        }
    }

    /// Same view address.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        match (&a.raw, &b.raw) {
            (Some(x), Some(y)) => x.value.cast::<()>() == y.value.cast::<()>(),
            (None, None) => true,
            _ => false,
        }
    }

    /// Same control block, whatever the views.
    pub fn owner_eq<U: ?Sized>(a: &Self, b: &Shared<U>) -> bool {
        a.block().map(|x| x.as_ptr()) == b.block().map(|y| y.as_ptr())
    }

    pub(crate) fn block(&self) -> Option<BlockRef> {
        self.raw.as_ref().map(|o| o.block)
    }

    pub fn downgrade(this: &Self) -> Weak<T> {
        match &this.raw {
            Some(o) => Weak::from_parts(o.block, o.value, o.block.acquire_weak(), o.projected),
            None => Weak::new(),
        }
    }

    /// Drop this handle's ownership, leaving it empty.
    pub fn reset(&mut self) {
        if let Some(Owned { block, token, .. }) = self.raw.take() {
            // SAFETY: token was minted by block.
            unsafe { block.release_strong(token) };
        }
    }

    /// Replace the managed value with a boxed one.
    pub fn reset_box(&mut self, value: Box<T>) {
        *self = Self::from_box(value);
    }

    /// Replace the managed value with a raw pointer. On error this handle
    /// keeps its previous value.
    ///
    /// # Safety
    /// As for `from_raw`.
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) -> Result<(), SharedError> {
        *self = Self::from_raw(ptr)?;
        Ok(())
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.raw, &mut other.raw);
    }

    /// Keep the block alive but view part of the value (a field, or the value
    /// as a trait object). An empty handle maps to an empty handle.
    pub fn map<U: ?Sized, F>(this: Self, f: F) -> Shared<U>
    where
        T: 'static,
        F: FnOnce(&T) -> &U,
    {
        let mut this = this;
        let Some(owned) = this.raw.take() else {
            return Shared::empty();
        };
        // SAFETY: the strong token moves into the result, keeping the value alive.
        let view = NonNull::from(f(unsafe { owned.value.as_ref() }));
        Shared::from_owned(Owned {
            block: owned.block,
            value: view,
            token: owned.token,
            projected: true,
        })
    }
}

impl<T: EnableSharedFromThis> Shared<T> {
    pub fn from_box_observed(value: Box<T>) -> Self {
        let this = Self::from_box(value);
        this.attach_observer();
        this
    }

    /// Raw-pointer construction for self-observing types.
    ///
    /// A null pointer cannot be observed and is refused with
    /// `SharedError::BadWeakRef`.
    ///
    /// # Safety
    /// As for `from_raw`.
    pub unsafe fn from_raw_observed(ptr: *mut T) -> Result<Self, SharedError> {
        Self::from_raw_in_observed(ptr, DefaultDelete, SystemAlloc::<()>::new())
    }

    /// # Safety
    /// As for `from_raw_with_deleter`.
    pub unsafe fn from_raw_with_deleter_observed<D>(
        ptr: *mut T,
        deleter: D,
    ) -> Result<Self, SharedError>
    where
        D: Deleter<T> + 'static,
    {
        Self::from_raw_in_observed(ptr, deleter, SystemAlloc::<()>::new())
    }

    /// `from_raw_in` for self-observing types. A null pointer is refused
    /// with `SharedError::BadWeakRef` and `deleter` is not run.
    ///
    /// # Safety
    /// As for `from_raw_with_deleter`.
    pub unsafe fn from_raw_in_observed<D, A>(
        ptr: *mut T,
        deleter: D,
        alloc: A,
    ) -> Result<Self, SharedError>
    where
        D: Deleter<T> + 'static,
        A: Allocator + 'static,
    {
        if ptr.is_null() {
            return Err(SharedError::BadWeakRef);
        }
        let this = Self::from_raw_in(ptr, deleter, alloc)?;
        this.attach_observer();
        Ok(this)
    }

    pub(crate) fn attach_observer(&self) {
        if let Some(value) = self.get() {
            value.self_observer().attach(self);
        }
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        make_shared(value)
    }
}

impl<T: ?Sized> From<Box<T>> for Shared<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: ?Sized> Default for Shared<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        match &self.raw {
            Some(o) => Self::from_owned(Owned {
                block: o.block,
                value: o.value,
                token: o.block.acquire_strong(),
                projected: o.projected,
            }),
            None => Self::empty(),
        }
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// Panics on an empty handle.
    fn deref(&self) -> &T {
        match self.get() {
            Some(v) => v,
            None => panic!("dereferenced an empty Shared handle"),
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(v) => f.debug_tuple("Shared").field(&v).finish(),
            None => f.write_str("Shared(<empty>)"),
        }
    }
}
