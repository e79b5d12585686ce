// ============================================================================
// spark-weave - Runtime Context
// Thread-local state: active computation, side tables, and the pending queue
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::types::ObjectId;
use crate::primitives::computation::ComputationInner;
use crate::reactivity::graph::DependencyGraph;
use crate::reactivity::scheduling::Schedulable;
use crate::store::observable::ObservableInner;

/// Host hook invoked when a flush becomes necessary
pub type TickRequester = Rc<dyn Fn()>;

// =============================================================================
// RUNTIME CONTEXT
// =============================================================================

/// Thread-local runtime context holding all global state for reactivity.
///
/// Every side table is keyed by a stable identity ([`ObjectId`] or a job id)
/// and entries are released explicitly when their owner goes away.
pub struct RuntimeContext {
    // =========================================================================
    // TRACKING
    // =========================================================================
    /// Computation whose body is currently executing
    pub active_computation: RefCell<Option<Weak<ComputationInner>>>,

    /// Whether reads are currently exempt from tracking
    pub untracking: Cell<bool>,

    /// Nesting depth of trigger suppression (bulk list mutations)
    pub trigger_pause: Cell<u32>,

    // =========================================================================
    // SIDE TABLES
    // =========================================================================
    /// Raw object -> its one observable wrapper
    pub wrappers: RefCell<HashMap<ObjectId, Weak<ObservableInner>>>,

    /// (object, field) -> subscribed computations
    pub graph: RefCell<DependencyGraph>,

    // =========================================================================
    // SCHEDULING
    // =========================================================================
    /// Jobs waiting for the next flush, in first-enqueue order
    pub queue: RefCell<Vec<Rc<dyn Schedulable>>>,

    /// A flush has been requested and has not happened yet
    pub flush_requested: Cell<bool>,

    /// A flush is currently running
    pub flushing: Cell<bool>,

    /// Host hook used to source the next tick
    pub tick_requester: RefCell<Option<TickRequester>>,
}

impl RuntimeContext {
    /// Create a new runtime context with default values
    pub fn new() -> Self {
        Self {
            active_computation: RefCell::new(None),
            untracking: Cell::new(false),
            trigger_pause: Cell::new(0),
            wrappers: RefCell::new(HashMap::new()),
            graph: RefCell::new(DependencyGraph::new()),
            queue: RefCell::new(Vec::new()),
            flush_requested: Cell::new(false),
            flushing: Cell::new(false),
            tick_requester: RefCell::new(None),
        }
    }

    // =========================================================================
    // TRACKING
    // =========================================================================

    /// Set the active computation, returning the previous one
    pub fn set_active_computation(
        &self,
        computation: Option<Weak<ComputationInner>>,
    ) -> Option<Weak<ComputationInner>> {
        self.active_computation.replace(computation)
    }

    /// Get the active computation if it is still alive
    pub fn active_computation(&self) -> Option<Rc<ComputationInner>> {
        self.active_computation
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
    }

    pub fn has_active_computation(&self) -> bool {
        self.active_computation.borrow().is_some()
    }

    /// Set untracking mode, returning previous value
    pub fn set_untracking(&self, value: bool) -> bool {
        self.untracking.replace(value)
    }

    pub fn is_untracking(&self) -> bool {
        self.untracking.get()
    }

    pub fn pause_triggers(&self) {
        self.trigger_pause.set(self.trigger_pause.get() + 1);
    }

    pub fn resume_triggers(&self) {
        self.trigger_pause
            .set(self.trigger_pause.get().saturating_sub(1));
    }

    pub fn triggers_paused(&self) -> bool {
        self.trigger_pause.get() > 0
    }

    // =========================================================================
    // SCHEDULING
    // =========================================================================

    pub fn enqueue(&self, job: Rc<dyn Schedulable>) {
        self.queue.borrow_mut().push(job);
    }

    /// Take the whole queue, leaving an empty one for the next tick
    pub fn take_queue(&self) -> Vec<Rc<dyn Schedulable>> {
        self.queue.replace(Vec::new())
    }

    pub fn queue_len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Mark a flush as requested, returning whether one already was
    pub fn request_flush(&self) -> bool {
        self.flush_requested.replace(true)
    }

    pub fn tick_requester(&self) -> Option<TickRequester> {
        self.tick_requester.borrow().clone()
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    /// The thread-local runtime context
    static CONTEXT: RuntimeContext = RuntimeContext::new();
}

/// Access the thread-local runtime context.
///
/// # Example
///
/// ```ignore
/// with_context(|ctx| {
///     ctx.pause_triggers();
/// });
/// ```
pub fn with_context<R>(f: impl FnOnce(&RuntimeContext) -> R) -> R {
    CONTEXT.with(f)
}

/// Like [`with_context`], but returns `None` once the thread-local has been
/// torn down (used from `Drop` impls).
pub(crate) fn try_with_context<R>(f: impl FnOnce(&RuntimeContext) -> R) -> Option<R> {
    CONTEXT.try_with(f).ok()
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Check if reads are currently being tracked (inside a computation, not untracking)
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.has_active_computation() && !ctx.is_untracking())
}

/// Check if currently untracking
pub fn is_untracking() -> bool {
    with_context(|ctx| ctx.is_untracking())
}

/// Check if triggers are currently suppressed
pub fn triggers_paused() -> bool {
    with_context(|ctx| ctx.triggers_paused())
}

// =============================================================================
// TESTS
// =============================================================================
