//! Control blocks: the shared metadata behind every `Shared`/`Weak` pair.
//!
//! A block carries two counters and a closed `BlockKind` describing how to
//! end the two lifetimes it manages:
//!
//! - `release_value` destroys the managed value. It runs exactly once, when
//!   the strong count falls from 1 to 0.
//! - `release_block` returns the block's own memory to the allocator it was
//!   carved from. It runs exactly once, after both counts are zero.
//!
//! Strong handles collectively hold one unit of the weak counter
//! (`strong_group`). It is returned only after `release_value` completes,
//! so weak handles dropped while the value is being destroyed (a value
//! observing itself, for instance) cannot free the block underneath the
//! destructor.
//!
//! Two block layouts exist. `InPlaceBlock` embeds the value after the
//! header and destroys it in place. `RegularBlock` points at a value that
//! lives elsewhere and hands it to a type-erased `Deleter` captured with the
//! value's original type.

use crate::alloc::Allocator;
use crate::error::AllocError;
use crate::tokens::{Count, RefCount, StrongRefs, StrongToken, WeakRefs, WeakToken};
use core::cell::Cell;
use core::mem::{self, ManuallyDrop, MaybeUninit};
use core::ptr::{self, NonNull};
use log::trace;

/// Destruction strategy for a value held by a `RegularBlock`.
///
/// Invoked at most once, with the pointer the block was created for.
/// Deleters must not panic.
pub trait Deleter<T: ?Sized> {
    fn delete(self, ptr: NonNull<T>);
}

impl<T: ?Sized, F> Deleter<T> for F
where
    F: FnOnce(NonNull<T>),
{
    fn delete(self, ptr: NonNull<T>) {
        self(ptr)
    }
}

/// Deleter for pointers obtained from `Box::into_raw`.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultDelete;

impl<T: ?Sized> Deleter<T> for DefaultDelete {
    fn delete(self, ptr: NonNull<T>) {
        // SAFETY: callers of the raw constructors promise `ptr` came from Box.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

type ReleaseFn = unsafe fn(NonNull<BlockHeader>);

/// The two block shapes, each with its monomorphized release routines.
#[derive(Copy, Clone)]
pub(crate) enum BlockKind {
    InPlace { drop_value: ReleaseFn, free: ReleaseFn },
    Regular { delete: ReleaseFn, free: ReleaseFn },
}

impl BlockKind {
    fn name(&self) -> &'static str {
        match self {
            BlockKind::InPlace { .. } => "in-place",
            BlockKind::Regular { .. } => "regular",
        }
    }
}

#[repr(C)]
pub(crate) struct BlockHeader {
    strong: RefCount<StrongRefs>,
    weak: RefCount<WeakRefs>,
    strong_group: Cell<Option<WeakToken>>,
    kind: BlockKind,
}

impl BlockHeader {
    fn new(kind: BlockKind) -> Self {
        Self {
            strong: RefCount::new(),
            weak: RefCount::new(),
            strong_group: Cell::new(None),
            kind,
        }
    }
}

/// Result of creating a block: the block, the view of its value, and the
/// strong token for the first `Shared` handle.
pub(crate) struct Adopted<T: ?Sized> {
    pub(crate) block: BlockRef,
    pub(crate) value: NonNull<T>,
    pub(crate) token: StrongToken,
}

/// Non-owning pointer to a live control block.
///
/// Valid as long as the caller holds a strong or weak token for the block.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) struct BlockRef(NonNull<BlockHeader>);

impl BlockRef {
    /// Mint the first strong token and the strong group's weak unit.
    fn adopt(ptr: NonNull<BlockHeader>) -> (Self, StrongToken) {
        let this = BlockRef(ptr);
        let header = this.header();
        header.strong_group.set(Some(header.weak.get()));
        let token = header.strong.get();
        trace!("control block {:p} ({}) created", ptr, header.kind.name());
        (this, token)
    }

    #[inline]
    fn header(&self) -> &BlockHeader {
        // SAFETY: a BlockRef is only used while a token keeps the block alive.
        unsafe { self.0.as_ref() }
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        self.0.as_ptr().cast()
    }

    pub(crate) fn strong_count(&self) -> usize {
        self.header().strong.load()
    }

    /// Live `Weak` handles, excluding the unit held by the strong group.
    pub(crate) fn weak_count(&self) -> usize {
        let header = self.header();
        let group = header.strong_group.take();
        let held = usize::from(group.is_some());
        header.strong_group.set(group);
        header.weak.load() - held
    }

    pub(crate) fn acquire_strong(&self) -> StrongToken {
        self.header().strong.get()
    }

    /// Strong token for a block whose value is still alive.
    pub(crate) fn try_acquire_strong(&self) -> Option<StrongToken> {
        self.header().strong.get_if_live()
    }

    pub(crate) fn acquire_weak(&self) -> WeakToken {
        self.header().weak.get()
    }

    /// Return a strong token; destroys the value when it was the last one.
    ///
    /// # Safety
    /// `token` must have been minted by this block. The block may be freed
    /// before this returns.
    pub(crate) unsafe fn release_strong(self, token: StrongToken) {
        if !self.header().strong.put(token) {
            return;
        }
        self.release_value();
        if let Some(group) = self.header().strong_group.take() {
            self.release_weak(group);
        }
    }

    /// Return a weak token; frees the block when no unit remains.
    ///
    /// # Safety
    /// `token` must have been minted by this block. The block may be freed
    /// before this returns.
    pub(crate) unsafe fn release_weak(self, token: WeakToken) {
        if self.header().weak.put(token) {
            self.release_block();
        }
    }

    unsafe fn release_value(self) {
        trace!("control block {:p}: releasing value", self.0);
        match self.header().kind {
            BlockKind::InPlace { drop_value, .. } => drop_value(self.0),
            BlockKind::Regular { delete, .. } => delete(self.0),
        }
    }

    unsafe fn release_block(self) {
        debug_assert_eq!(self.header().strong.load(), 0);
        trace!("control block {:p}: releasing block", self.0);
        match self.header().kind {
            BlockKind::InPlace { free, .. } | BlockKind::Regular { free, .. } => free(self.0),
        }
    }
}

/// Block with the managed value stored inline after the header.
#[repr(C)]
pub(crate) struct InPlaceBlock<T, A> {
    header: BlockHeader,
    alloc: ManuallyDrop<A>,
    value: MaybeUninit<T>,
}

impl<T, A: Allocator> InPlaceBlock<T, A> {
    const KIND: BlockKind = BlockKind::InPlace {
        drop_value: Self::drop_value,
        free: Self::free,
    };

    /// Allocate a block through `alloc` rebound to the block type, then build
    /// the value with `init`. If `init` panics the block memory is returned
    /// and no ownership is established.
    pub(crate) fn create<F>(alloc: A, init: F) -> Result<Adopted<T>, AllocError>
    where
        F: FnOnce() -> T,
    {
        let block_alloc: A::Rebind<Self> = alloc.rebind();
        let ptr = block_alloc.allocate(1)?;

        struct Unwind<'g, B: Allocator> {
            alloc: &'g B,
            ptr: NonNull<B::Value>,
        }
        impl<B: Allocator> Drop for Unwind<'_, B> {
            fn drop(&mut self) {
                // SAFETY: ptr came from allocate(1) on this allocator.
                unsafe { self.alloc.deallocate(self.ptr, 1) }
            }
        }

        let unwind = Unwind {
            alloc: &block_alloc,
            ptr,
        };
        let value = init();
        mem::forget(unwind);

        let raw = ptr.as_ptr();
        // SAFETY: ptr is fresh, properly aligned storage for one Self.
        unsafe {
            raw.write(InPlaceBlock {
                header: BlockHeader::new(Self::KIND),
                alloc: ManuallyDrop::new(alloc),
                value: MaybeUninit::new(value),
            });
        }
        let (block, token) = BlockRef::adopt(ptr.cast());
        // SAFETY: the value field was initialized just above.
        let value = unsafe { NonNull::new_unchecked(ptr::addr_of_mut!((*raw).value).cast::<T>()) };
        Ok(Adopted {
            block,
            value,
            token,
        })
    }

    unsafe fn drop_value(this: NonNull<BlockHeader>) {
        let block = this.cast::<Self>().as_ptr();
        ptr::drop_in_place(ptr::addr_of_mut!((*block).value).cast::<T>());
    }

    unsafe fn free(this: NonNull<BlockHeader>) {
        let block = this.cast::<Self>();
        let alloc = ManuallyDrop::take(&mut (*block.as_ptr()).alloc);
        let block_alloc: A::Rebind<Self> = alloc.rebind();
        block_alloc.deallocate(block, 1);
    }
}

/// Block pointing at a separately allocated value owned through a deleter.
#[repr(C)]
pub(crate) struct RegularBlock<T: ?Sized, A, D> {
    header: BlockHeader,
    alloc: ManuallyDrop<A>,
    deleter: ManuallyDrop<D>,
    ptr: NonNull<T>,
}

impl<T: ?Sized, A: Allocator, D: Deleter<T>> RegularBlock<T, A, D> {
    const KIND: BlockKind = BlockKind::Regular {
        delete: Self::delete,
        free: Self::free,
    };

    /// Allocate a block managing `ptr`. If the block cannot be allocated the
    /// deleter is run on `ptr` before the error is returned, so the resource
    /// never leaks.
    pub(crate) fn create(ptr: NonNull<T>, deleter: D, alloc: A) -> Result<Adopted<T>, AllocError> {
        let block_alloc: A::Rebind<Self> = alloc.rebind();
        let raw = match block_alloc.allocate(1) {
            Ok(raw) => raw,
            Err(e) => {
                deleter.delete(ptr);
                return Err(e);
            }
        };
        // SAFETY: raw is fresh, properly aligned storage for one Self.
        unsafe {
            raw.as_ptr().write(RegularBlock {
                header: BlockHeader::new(Self::KIND),
                alloc: ManuallyDrop::new(alloc),
                deleter: ManuallyDrop::new(deleter),
                ptr,
            });
        }
        let (block, token) = BlockRef::adopt(raw.cast());
        Ok(Adopted {
            block,
            value: ptr,
            token,
        })
    }

    unsafe fn delete(this: NonNull<BlockHeader>) {
        let block = this.cast::<Self>().as_ptr();
        let deleter = ManuallyDrop::take(&mut (*block).deleter);
        let ptr = (*block).ptr;
        deleter.delete(ptr);
    }

    unsafe fn free(this: NonNull<BlockHeader>) {
        let block = this.cast::<Self>();
        let alloc = ManuallyDrop::take(&mut (*block.as_ptr()).alloc);
        let block_alloc: A::Rebind<Self> = alloc.rebind();
        block_alloc.deallocate(block, 1);
    }
}
