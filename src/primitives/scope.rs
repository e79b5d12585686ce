// ============================================================================
// spark-weave - Cleanup Scope
//
// Owns everything mounted under one structural context.
// ============================================================================
//
// A CleanupScope collects the computations created while it is active plus
// any explicit cleanup actions, and releases all of them in one `dispose()`.
// Rows of a keyed list, the realized subtree of a branch, and the list or
// branch binding itself each get one.
//
// - run(fn) - Execute function with this scope active
// - dispose() - Tear down computations, run cleanups, dispose child scopes
// - Nested scopes are disposed with their parent
// - Detached scopes opt out of parent collection
// ============================================================================

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::primitives::computation::Computation;

// =============================================================================
// THREAD-LOCAL SCOPE STATE
// =============================================================================

thread_local! {
    /// Currently active scope (if any)
    static ACTIVE_SCOPE: RefCell<Option<Rc<CleanupScopeInner>>> = const { RefCell::new(None) };
}

fn get_active_scope() -> Option<Rc<CleanupScopeInner>> {
    ACTIVE_SCOPE.with(|s| s.borrow().clone())
}

fn set_active_scope(scope: Option<Rc<CleanupScopeInner>>) -> Option<Rc<CleanupScopeInner>> {
    ACTIVE_SCOPE.with(|s| s.replace(scope))
}

/// Cleanup action run when a scope is disposed
pub type CleanupFn = Box<dyn FnOnce()>;

// =============================================================================
// CLEANUP SCOPE INNER
// =============================================================================

pub struct CleanupScopeInner {
    active: Cell<bool>,

    /// Computations created within this scope
    computations: RefCell<Vec<Computation>>,

    /// Cleanup actions, run in reverse registration order
    cleanups: RefCell<Vec<CleanupFn>>,

    parent: RefCell<Option<Weak<CleanupScopeInner>>>,

    children: RefCell<Vec<Rc<CleanupScopeInner>>>,

    self_weak: Weak<CleanupScopeInner>,
}

impl CleanupScopeInner {
    fn new(detached: bool) -> Rc<Self> {
        let parent = if detached { None } else { get_active_scope() };

        let scope = Rc::new_cyclic(|weak| Self {
            active: Cell::new(true),
            computations: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            parent: RefCell::new(parent.as_ref().map(Rc::downgrade)),
            children: RefCell::new(Vec::new()),
            self_weak: weak.clone(),
        });

        if let Some(parent_scope) = parent {
            parent_scope.children.borrow_mut().push(scope.clone());
        }

        scope
    }

    fn dispose(&self) {
        if !self.active.replace(false) {
            return;
        }

        // Stop reactive work first so nothing fires while cleaning up
        let computations: Vec<_> = self.computations.borrow_mut().drain(..).collect();
        for computation in &computations {
            computation.teardown();
        }
        drop(computations);

        let cleanups: Vec<_> = self.cleanups.borrow_mut().drain(..).collect();
        for cleanup in cleanups.into_iter().rev() {
            if catch_unwind(AssertUnwindSafe(cleanup)).is_err() {
                warn!("cleanup action panicked");
            }
        }

        let children: Vec<_> = self.children.borrow_mut().drain(..).collect();
        for child in children {
            child.dispose();
        }

        let parent = self.parent.borrow_mut().take();
        if let Some(parent) = parent.and_then(|w| w.upgrade()) {
            let me = self.self_weak.as_ptr();
            parent.children.borrow_mut().retain(|s| !std::ptr::eq(Rc::as_ptr(s), me));
        }
    }
}

// =============================================================================
// PUBLIC WRAPPER
// =============================================================================

/// Owner of the computations and cleanup actions of one structural context.
///
/// # Example
///
/// ```
/// use spark_weave::{cleanup_scope, computation, on_cleanup, wrap, RawObject};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let state = wrap(&RawObject::map());
/// let runs = Rc::new(Cell::new(0));
/// let cleaned = Rc::new(Cell::new(false));
///
/// let scope = cleanup_scope();
/// scope.run(|| {
///     let s = state.clone();
///     let runs = runs.clone();
///     computation(move || {
///         let _ = s.get("x");
///         runs.set(runs.get() + 1);
///     });
///     let cleaned = cleaned.clone();
///     on_cleanup(move || cleaned.set(true));
/// });
///
/// state.set("x", 1);
/// assert_eq!(runs.get(), 2);
///
/// scope.dispose();
/// assert!(cleaned.get());
/// state.set("x", 2);
/// assert_eq!(runs.get(), 2);
/// ```
#[derive(Clone)]
pub struct CleanupScope {
    inner: Rc<CleanupScopeInner>,
}

impl CleanupScope {
    /// A scope that is not collected by the currently active scope
    pub fn detached() -> Self {
        Self {
            inner: CleanupScopeInner::new(true),
        }
    }

    /// Run `f` with this scope active. Returns `None` once disposed.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.inner.active.get() {
            return None;
        }

        struct RestoreGuard(Option<Option<Rc<CleanupScopeInner>>>);

        impl Drop for RestoreGuard {
            fn drop(&mut self) {
                if let Some(prev) = self.0.take() {
                    set_active_scope(prev);
                }
            }
        }

        let _guard = RestoreGuard(Some(set_active_scope(Some(self.inner.clone()))));
        Some(f())
    }

    /// Register a cleanup action. Runs immediately if already disposed.
    pub fn add_cleanup(&self, f: impl FnOnce() + 'static) {
        if self.inner.active.get() {
            self.inner.cleanups.borrow_mut().push(Box::new(f));
        } else {
            f();
        }
    }

    /// Take ownership of a computation. Tears it down if already disposed.
    pub fn adopt(&self, computation: &Computation) {
        if self.inner.active.get() {
            self.inner.computations.borrow_mut().push(computation.clone());
        } else {
            computation.teardown();
        }
    }

    /// Release everything owned by this scope. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn computation_count(&self) -> usize {
        self.inner.computations.borrow().len()
    }

    pub fn cleanup_count(&self) -> usize {
        self.inner.cleanups.borrow().len()
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    pub fn ptr_eq(&self, other: &CleanupScope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create a scope owned by the currently active scope (if any).
pub fn cleanup_scope() -> CleanupScope {
    CleanupScope {
        inner: CleanupScopeInner::new(false),
    }
}

/// The currently active scope
pub fn current_scope() -> Option<CleanupScope> {
    get_active_scope().map(|inner| CleanupScope { inner })
}

/// Register a cleanup with the active scope.
///
/// Returns false (and drops `f` without running it) when no scope is active.
pub fn on_cleanup(f: impl FnOnce() + 'static) -> bool {
    match get_active_scope() {
        Some(inner) => {
            CleanupScope { inner }.add_cleanup(f);
            true
        }
        None => false,
    }
}

/// Hand a freshly created computation to the active scope
pub(crate) fn register_computation(computation: &Computation) {
    if let Some(inner) = get_active_scope() {
        CleanupScope { inner }.adopt(computation);
    }
}

// =============================================================================
// TESTS
// =============================================================================
