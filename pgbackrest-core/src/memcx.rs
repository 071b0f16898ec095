//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! Component B: the hierarchical memory-context arena.
//!
//! Grounded in `pgx/src/memcxt.rs`'s `PgMemoryContexts`/`OwnedMemoryContext` pair
//! (an enum over FFI pointers, freed on `Drop`) and `pgrx/src/memcx.rs`'s
//! lifetime-carrying `MemCx` borrow, reimplemented without an FFI boundary: this
//! crate owns its arenas outright rather than wrapping a `pg_sys::MemoryContext`,
//! so teardown drives `std::alloc` directly instead of calling back into Postgres.
//!
//! A context is a named node in a tree. Every raw allocation charged to it is
//! recorded with its `Layout` so the context can deallocate correctly at free time
//! without the caller re-supplying a size (`grow`/`free_alloc` only take a pointer).
//! Freeing a context recursively frees its children (most-recently-created first,
//! so sibling callbacks fire in reverse creation order as `spec.md` §5 requires),
//! then runs its own callback, then releases its own raw allocations.

use std::alloc::Layout;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::types::{ASSERT_ERROR, MEMORY_ERROR};
use crate::throw;

/// Lifecycle state of a [`MemContext`], mirroring `spec.md` §3.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemContextState {
    Active,
    Freeing,
    Freed,
}

struct Allocation {
    ptr: *mut u8,
    layout: Layout,
}

struct MemContextInner {
    name: String,
    state: MemContextState,
    parent: Option<MemContextHandle>,
    children: Vec<MemContextHandle>,
    allocations: HashMap<usize, Allocation>,
    callback: Option<Box<dyn FnOnce()>>,
}

/// An opaque, cloneable handle to a memory context node.
///
/// Cloning a handle does not clone the arena -- it is a reference-counted pointer
/// to the same node, the Rust analogue of passing around the C implementation's
/// `MemContext *`.
#[derive(Clone)]
pub struct MemContextHandle(Rc<RefCell<MemContextInner>>);

impl fmt::Debug for MemContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("MemContext").field("name", &inner.name).field("state", &inner.state).finish()
    }
}

impl PartialEq for MemContextHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for MemContextHandle {}

thread_local! {
    static ROOT: MemContextHandle = MemContextHandle(Rc::new(RefCell::new(MemContextInner {
        name: "TopMemoryContext".to_string(),
        state: MemContextState::Active,
        parent: None,
        children: Vec::new(),
        allocations: HashMap::new(),
        callback: None,
    })));
    static CURRENT: RefCell<MemContextHandle> = ROOT.with(|r| RefCell::new(r.clone()));
}

/// The process-wide root context. Lives for the duration of the thread; it can
/// never be freed or reparented.
pub fn top_context() -> MemContextHandle {
    ROOT.with(|r| r.clone())
}

/// The context on top of this thread's current-context stack.
pub fn current_handle() -> MemContextHandle {
    CURRENT.with(|c| c.borrow().clone())
}

/// Sets the current context for subsequent allocations, returning the previous
/// one so the caller can restore it later.
pub fn switch_to(ctx: MemContextHandle) -> MemContextHandle {
    CURRENT.with(|c| c.replace(ctx))
}

fn is_root(ctx: &MemContextHandle) -> bool {
    ROOT.with(|r| Rc::ptr_eq(&r.0, &ctx.0))
}

impl MemContextHandle {
    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn state(&self) -> MemContextState {
        self.0.borrow().state
    }

    pub fn parent(&self) -> Option<MemContextHandle> {
        self.0.borrow().parent.clone()
    }

    /// Creates a new child context under `self` and returns it. Mirrors `new(parent,
    /// name)`; the freshly created context is left `Active` with no allocations.
    pub fn new_child(&self, name: impl Into<String>) -> MemContextHandle {
        let child = MemContextHandle(Rc::new(RefCell::new(MemContextInner {
            name: name.into(),
            state: MemContextState::Active,
            parent: Some(self.clone()),
            children: Vec::new(),
            allocations: HashMap::new(),
            callback: None,
        })));

        self.0.borrow_mut().children.push(child.clone());
        child
    }

    /// Allocates `size` bytes charged to this context. Returns a dangling-but-valid
    /// pointer for a zero-size request (mirroring `std::alloc`'s own contract).
    pub fn alloc(&self, size: usize) -> *mut u8 {
        self.alloc_with(size, false)
    }

    /// Like [`alloc`](Self::alloc), but the memory is zeroed.
    pub fn alloc_zero(&self, size: usize) -> *mut u8 {
        self.alloc_with(size, true)
    }

    fn alloc_with(&self, size: usize, zero: bool) -> *mut u8 {
        {
            let inner = self.0.borrow();
            if inner.state != MemContextState::Active {
                throw!(ASSERT_ERROR, "cannot allocate in context '{}' while it is {:?}", inner.name, inner.state);
            }
        }

        let layout = Layout::from_size_align(size.max(1), 1).unwrap();
        let ptr = unsafe {
            if zero {
                std::alloc::alloc_zeroed(layout)
            } else {
                std::alloc::alloc(layout)
            }
        };

        if ptr.is_null() {
            throw!(MEMORY_ERROR, "unable to allocate {} bytes in context '{}'", size, self.name());
        }

        self.0.borrow_mut().allocations.insert(ptr as usize, Allocation { ptr, layout });
        ptr
    }

    /// Grows a previous allocation from this context to `new_size`, moving it if
    /// necessary. Panics with an assertion error if `ptr` was not allocated here.
    pub fn grow(&self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        let old = {
            let mut inner = self.0.borrow_mut();
            inner.allocations.remove(&(ptr as usize)).unwrap_or_else(|| {
                throw!(ASSERT_ERROR, "pointer was not allocated in context '{}'", inner.name)
            })
        };

        let new_layout = Layout::from_size_align(new_size.max(1), 1).unwrap();
        let new_ptr = unsafe { std::alloc::realloc(old.ptr, old.layout, new_layout.size()) };

        if new_ptr.is_null() {
            throw!(MEMORY_ERROR, "unable to grow allocation to {} bytes in context '{}'", new_size, self.name());
        }

        self.0.borrow_mut().allocations.insert(new_ptr as usize, Allocation { ptr: new_ptr, layout: new_layout });
        new_ptr
    }

    /// Frees one allocation owned by this context ahead of the context's own
    /// teardown. Double-free (or freeing a pointer this context never owned) is an
    /// assertion error.
    pub fn free_alloc(&self, ptr: *mut u8) {
        let removed = self.0.borrow_mut().allocations.remove(&(ptr as usize));
        match removed {
            Some(alloc) => unsafe { std::alloc::dealloc(alloc.ptr, alloc.layout) },
            None => throw!(ASSERT_ERROR, "double free or foreign pointer in context '{}'", self.name()),
        }
    }

    /// Installs the context's single free-time callback. A second call replaces
    /// the first (the C implementation asserts here; this crate's collaborators
    /// have no need to stack callbacks per context, so replace-on-set is adopted
    /// instead of panicking, matching `spec.md`'s "at most one callback per
    /// context").
    pub fn callback_set(&self, callback: impl FnOnce() + 'static) {
        self.0.borrow_mut().callback = Some(Box::new(callback));
    }

    /// Reparents this context (and its whole subtree) under `new_parent`. Moving
    /// the root, or moving a context into one of its own descendants, is an
    /// assertion error.
    pub fn move_to(&self, new_parent: &MemContextHandle) {
        if is_root(self) {
            throw!(ASSERT_ERROR, "cannot move the root memory context");
        }

        if self == new_parent || new_parent.is_descendant_of(self) {
            throw!(ASSERT_ERROR, "moving context '{}' under '{}' would create a cycle", self.name(), new_parent.name());
        }

        let old_parent = self.0.borrow().parent.clone();
        if let Some(old_parent) = old_parent {
            old_parent.0.borrow_mut().children.retain(|c| c != self);
        }

        new_parent.0.borrow_mut().children.push(self.clone());
        self.0.borrow_mut().parent = Some(new_parent.clone());
    }

    fn is_descendant_of(&self, ancestor: &MemContextHandle) -> bool {
        let mut current = self.parent();
        while let Some(ctx) = current {
            if &ctx == ancestor {
                return true;
            }
            current = ctx.parent();
        }
        false
    }

    /// Recursively frees descendants (most-recently-created child first), then
    /// this context's own callback, then its own raw allocations. Freeing the root
    /// or double-freeing a context is an assertion error.
    pub fn free(&self) {
        if is_root(self) {
            throw!(ASSERT_ERROR, "cannot free the root memory context");
        }

        if self.0.borrow().state != MemContextState::Active {
            throw!(ASSERT_ERROR, "double free of context '{}'", self.name());
        }

        self.0.borrow_mut().state = MemContextState::Freeing;

        let children = std::mem::take(&mut self.0.borrow_mut().children);
        for child in children.into_iter().rev() {
            child.free();
        }

        let callback = self.0.borrow_mut().callback.take();
        if let Some(callback) = callback {
            callback();
        }

        let allocations = std::mem::take(&mut self.0.borrow_mut().allocations);
        for (_, alloc) in allocations {
            unsafe { std::alloc::dealloc(alloc.ptr, alloc.layout) };
        }

        if let Some(parent) = self.0.borrow().parent.clone() {
            parent.0.borrow_mut().children.retain(|c| c != self);
        }

        self.0.borrow_mut().state = MemContextState::Freed;
    }
}

/// Legacy alias kept for call sites that spell out the full type; `MemContext` is
/// the public name used in documentation and by collaborators, `MemContextHandle`
/// the precise implementation type.
pub type MemContext = MemContextHandle;

/// Creates a child of the current context, switches to it, and runs `f`. On normal
/// return the current context is restored and the child is *kept alive* (the
/// caller owns it and must `free()` it eventually, or let an ancestor's free
/// cascade into it). On unwind (a `throw!` inside `f`), the current context is
/// still restored but the child is freed before the panic continues -- this is
/// the Rust analogue of the C macro pair `MEM_CONTEXT_NEW_BEGIN`/`_END`.
pub fn scoped_new<R>(name: impl Into<String>, f: impl FnOnce() -> R + std::panic::UnwindSafe) -> R {
    let parent = current_handle();
    let child = parent.new_child(name);
    switch_to(child.clone());

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    switch_to(parent);

    match outcome {
        Ok(value) => value,
        Err(payload) => {
            child.free();
            std::panic::resume_unwind(payload);
        }
    }
}

/// Creates a disposable child of the current context, switches to it, runs `f`,
/// switches back, and frees the child regardless of whether `f` returned normally
/// or unwound. The Rust analogue of `MEM_CONTEXT_TEMP_BEGIN`/`_END`.
pub fn scoped_temp<R>(f: impl FnOnce() -> R + std::panic::UnwindSafe) -> R {
    let parent = current_handle();
    let child = parent.new_child("temporary");
    switch_to(child.clone());

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    switch_to(parent);
    child.free();

    match outcome {
        Ok(value) => value,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc as StdRc;

    #[test]
    fn new_child_is_active_and_parented() {
        let parent = top_context().new_child("parent");
        let child = parent.new_child("child");
        assert_eq!(child.state(), MemContextState::Active);
        assert_eq!(child.parent().unwrap(), parent);
        parent.free();
    }

    #[test]
    fn alloc_and_free_alloc_round_trip() {
        let ctx = top_context().new_child("alloc-test");
        let ptr = ctx.alloc_zero(16);
        unsafe {
            assert_eq!(*ptr, 0);
            *ptr = 7;
        }
        ctx.free_alloc(ptr);
        ctx.free();
    }

    #[test]
    fn free_cascades_to_descendants_and_fires_callbacks_in_reverse_creation_order() {
        let order: Rc<RefCell<Vec<&'static str>>> = StdRc::new(RefCell::new(Vec::new()));

        let parent = top_context().new_child("parent");
        let child_a = parent.new_child("a");
        let child_b = parent.new_child("b");

        let order_a = order.clone();
        child_a.callback_set(move || order_a.borrow_mut().push("a"));
        let order_b = order.clone();
        child_b.callback_set(move || order_b.borrow_mut().push("b"));
        let order_parent = order.clone();
        parent.callback_set(move || order_parent.borrow_mut().push("parent"));

        parent.free();

        assert_eq!(*order.borrow(), vec!["b", "a", "parent"]);
        assert_eq!(child_a.state(), MemContextState::Freed);
        assert_eq!(child_b.state(), MemContextState::Freed);
        assert_eq!(parent.state(), MemContextState::Freed);
    }

    #[test]
    #[should_panic]
    fn double_free_is_an_assertion_error() {
        let ctx = top_context().new_child("double-free");
        ctx.free();
        ctx.free();
    }

    #[test]
    #[should_panic]
    fn freeing_root_is_an_assertion_error() {
        top_context().free();
    }

    #[test]
    fn move_to_reparents_and_detaches_from_old_parent() {
        let old_parent = top_context().new_child("old");
        let new_parent = top_context().new_child("new");
        let moved = old_parent.new_child("moved");

        moved.move_to(&new_parent);

        assert_eq!(moved.parent().unwrap(), new_parent);
        old_parent.free();
        new_parent.free();
    }

    #[test]
    #[should_panic]
    fn move_into_own_descendant_is_rejected() {
        let parent = top_context().new_child("p");
        let child = parent.new_child("c");
        parent.move_to(&child);
    }

    #[test]
    fn scoped_temp_always_frees_the_child() {
        let before = current_handle();
        let flag = Cell::new(false);

        scoped_temp(|| {
            assert_ne!(current_handle(), before);
            flag.set(true);
        });

        assert_eq!(current_handle(), before);
        assert!(flag.get());
    }

    #[test]
    fn scoped_new_restores_context_and_frees_child_on_unwind() {
        let before = current_handle();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            scoped_new("will-throw", || -> () {
                throw!(crate::error::types::FORMAT_ERROR, "boom");
            })
        }));

        assert!(outcome.is_err());
        assert_eq!(current_handle(), before);
    }

    #[test]
    fn try_builder_restores_current_context_captured_at_entry() {
        use crate::error::PgTryBuilder;
        let outer = top_context().new_child("outer-frame-context");
        switch_to(outer.clone());

        let _ = PgTryBuilder::new(|| -> u32 {
            let inner = top_context().new_child("inner");
            switch_to(inner);
            throw!(crate::error::types::FORMAT_ERROR, "x")
        })
        .catch_when(&crate::error::types::FORMAT_ERROR, |_| 0)
        .execute();

        assert_eq!(current_handle(), outer);
        switch_to(top_context());
        outer.free();
    }
}
