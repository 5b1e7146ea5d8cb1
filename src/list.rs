//! `List<T, A>`: a doubly linked list drawing its nodes from an `Allocator`.
//!
//! The list is the reference consumer of the allocator contract:
//!
//! - nodes come from `A` rebound to the node type;
//! - `try_clone` starts the copy with `A::select_on_copy`;
//! - `assign_clone` (copy assignment) adopts the source allocator only when
//!   `A::PROPAGATE_ON_COPY_ASSIGN` is set;
//! - `assign` (move assignment) steals the source's nodes when the
//!   allocator propagates or both allocators are equal, and otherwise
//!   moves the elements one by one into nodes of its own allocator.
//!
//! Every mutating operation is all-or-nothing with respect to allocation
//! failure: on `Err` the list's length and contents are unchanged.

use crate::alloc::{Allocator, SystemAlloc};
use crate::error::AllocError;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;

struct Node<T> {
    prev: Option<NonNull<Node<T>>>,
    next: Option<NonNull<Node<T>>>,
    value: T,
}

pub struct List<T, A: Allocator = SystemAlloc<T>> {
    head: Option<NonNull<Node<T>>>,
    tail: Option<NonNull<Node<T>>>,
    len: usize,
    alloc: A,
    _owns: PhantomData<Box<Node<T>>>,
}

impl<T> List<T> {
    pub fn new() -> Self {
        Self::new_in(SystemAlloc::new())
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> List<T, A> {
    pub fn new_in(alloc: A) -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            alloc,
            _owns: PhantomData,
        }
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node_alloc(&self) -> A::Rebind<Node<T>> {
        self.alloc.rebind()
    }

    fn new_node(&self, value: T) -> Result<NonNull<Node<T>>, AllocError> {
        let node = self.node_alloc().allocate(1)?;
        // SAFETY: fresh storage for one node.
        unsafe {
            node.as_ptr().write(Node {
                prev: None,
                next: None,
                value,
            });
        }
        Ok(node)
    }

    /// Unlink-free teardown of one node: move the value out, return the memory.
    ///
    /// # Safety
    /// `node` must be unlinked and allocated by this list's allocator.
    unsafe fn free_node(&self, node: NonNull<Node<T>>) -> T {
        let Node { value, .. } = node.as_ptr().read();
        self.node_alloc().deallocate(node, 1);
        value
    }

    pub fn push_back(&mut self, value: T) -> Result<(), AllocError> {
        let node = self.new_node(value)?;
        // SAFETY: node is fresh; tail (if any) is a live node of this list.
        unsafe {
            (*node.as_ptr()).prev = self.tail;
            match self.tail {
                Some(tail) => (*tail.as_ptr()).next = Some(node),
                None => self.head = Some(node),
            }
        }
        self.tail = Some(node);
        self.len += 1;
        Ok(())
    }

    pub fn push_front(&mut self, value: T) -> Result<(), AllocError> {
        let node = self.new_node(value)?;
        // SAFETY: node is fresh; head (if any) is a live node of this list.
        unsafe {
            (*node.as_ptr()).next = self.head;
            match self.head {
                Some(head) => (*head.as_ptr()).prev = Some(node),
                None => self.tail = Some(node),
            }
        }
        self.head = Some(node);
        self.len += 1;
        Ok(())
    }

    pub fn pop_back(&mut self) -> Option<T> {
        let node = self.tail?;
        // SAFETY: node is the live tail of this list.
        unsafe {
            self.tail = (*node.as_ptr()).prev;
            match self.tail {
                Some(tail) => (*tail.as_ptr()).next = None,
                None => self.head = None,
            }
            self.len -= 1;
            Some(self.free_node(node))
        }
    }

    pub fn pop_front(&mut self) -> Option<T> {
        let node = self.head?;
        // SAFETY: node is the live head of this list.
        unsafe {
            self.head = (*node.as_ptr()).next;
            match self.head {
                Some(head) => (*head.as_ptr()).prev = None,
                None => self.tail = None,
            }
            self.len -= 1;
            Some(self.free_node(node))
        }
    }

    pub fn front(&self) -> Option<&T> {
        // SAFETY: head is live while borrowed through &self.
        self.head.map(|n| unsafe { &(*n.as_ptr()).value })
    }

    pub fn back(&self) -> Option<&T> {
        // SAFETY: tail is live while borrowed through &self.
        self.tail.map(|n| unsafe { &(*n.as_ptr()).value })
    }

    pub fn clear(&mut self) {
        while self.pop_front().is_some() {}
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            head: self.head,
            tail: self.tail,
            len: self.len,
            _list: PhantomData,
        }
    }

    /// Copy every element of `other` into a fresh list using `alloc`.
    fn clone_into_new(other: &Self, alloc: A) -> Result<Self, AllocError>
    where
        T: Clone,
    {
        let mut out = Self::new_in(alloc);
        for v in other.iter() {
            out.push_back(v.clone())?;
        }
        Ok(out)
    }

    /// Copy construction: the copy's allocator comes from `select_on_copy`.
    pub fn try_clone(&self) -> Result<Self, AllocError>
    where
        T: Clone,
    {
        Self::clone_into_new(self, self.alloc.select_on_copy())
    }

    /// Copy assignment. Keeps this list's allocator unless `A` propagates
    /// on copy assignment. On failure `self` is untouched.
    pub fn assign_clone(&mut self, other: &Self) -> Result<(), AllocError>
    where
        T: Clone,
    {
        let alloc = if A::PROPAGATE_ON_COPY_ASSIGN {
            other.alloc.clone()
        } else {
            self.alloc.clone()
        };
        let fresh = Self::clone_into_new(other, alloc)?;
        *self = fresh;
        Ok(())
    }

    /// Move assignment. Nodes are stolen when the allocator propagates or
    /// the two allocators are equal; otherwise elements are moved into
    /// nodes from this list's allocator. On failure `self` is untouched and
    /// the elements not yet moved are dropped with `other`.
    pub fn assign(&mut self, mut other: Self) -> Result<(), AllocError> {
        if A::PROPAGATE_ON_MOVE_ASSIGN {
            *self = other;
            return Ok(());
        }
        if self.alloc == other.alloc {
            self.clear();
            self.head = other.head.take();
            self.tail = other.tail.take();
            self.len = mem::take(&mut other.len);
            return Ok(());
        }
        let mut fresh = Self::new_in(self.alloc.clone());
        while let Some(v) = other.pop_front() {
            fresh.push_back(v)?;
        }
        *self = fresh;
        Ok(())
    }
}

impl<T, A: Allocator> Drop for List<T, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for List<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a List<T, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// Borrowing iterator over a `List`, front to back.
pub struct Iter<'a, T> {
    head: Option<NonNull<Node<T>>>,
    tail: Option<NonNull<Node<T>>>,
    len: usize,
    _list: PhantomData<&'a Node<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.len == 0 {
            return None;
        }
        let node = self.head?;
        self.len -= 1;
        // SAFETY: the list is borrowed for 'a and `len` bounds the walk.
        unsafe {
            self.head = (*node.as_ptr()).next;
            Some(&(*node.as_ptr()).value)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'a, T> DoubleEndedIterator for Iter<'a, T> {
    fn next_back(&mut self) -> Option<&'a T> {
        if self.len == 0 {
            return None;
        }
        let node = self.tail?;
        self.len -= 1;
        // SAFETY: as in `next`.
        unsafe {
            self.tail = (*node.as_ptr()).prev;
            Some(&(*node.as_ptr()).value)
        }
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
