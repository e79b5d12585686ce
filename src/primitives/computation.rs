// ============================================================================
// spark-weave - Computations
// Re-runnable units of work whose dependency set is rebuilt on every run
// ============================================================================
//
// State machine: idle -> running -> idle, with `pending` as an orthogonal flag
// owned by the scheduler.
//
// Every run starts by dropping all current subscriptions, so only the fields
// read during the latest run stay subscribed. A computation either re-runs
// inline when triggered or, if it carries a scheduling delegate, hands itself
// to the delegate (usually "run on the next tick").
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::core::constants::*;
use crate::core::context::{try_with_context, with_context};
use crate::core::error::Result;
use crate::core::types::JobId;
use crate::primitives::scope::register_computation;
use crate::reactivity::graph::DepKey;
use crate::reactivity::scheduling::{contain, schedule, unschedule, Schedulable};

// =============================================================================
// TYPE ALIASES
// =============================================================================

/// Body of a computation
pub type ComputationFn = Box<dyn FnMut() -> Result<()>>;

/// Called instead of the body when a scheduled computation is triggered
pub type SchedulingDelegate = Rc<dyn Fn(&Computation)>;

// =============================================================================
// COMPUTATION INNER
// =============================================================================

pub struct ComputationInner {
    id: JobId,

    /// Flags bitmask for state tracking
    flags: Cell<u32>,

    /// The body; taken out while running
    body: RefCell<Option<ComputationFn>>,

    delegate: Option<SchedulingDelegate>,

    /// Dependency entries this computation is currently subscribed under
    subscriptions: RefCell<Vec<DepKey>>,

    runs: Cell<u64>,

    self_weak: Weak<ComputationInner>,
}

impl ComputationInner {
    fn new(body: ComputationFn, delegate: Option<SchedulingDelegate>) -> Rc<Self> {
        let flags = if delegate.is_some() { SCHEDULED } else { 0 };
        Rc::new_cyclic(|weak| Self {
            id: JobId::next(),
            flags: Cell::new(flags),
            body: RefCell::new(Some(body)),
            delegate,
            subscriptions: RefCell::new(Vec::new()),
            runs: Cell::new(0),
            self_weak: weak.clone(),
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.flags.get() & RUNNING != 0
    }

    pub fn is_pending(&self) -> bool {
        self.flags.get() & PENDING != 0
    }

    pub fn is_destroyed(&self) -> bool {
        self.flags.get() & DESTROYED != 0
    }

    pub fn run_count(&self) -> u64 {
        self.runs.get()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Second half of the graph's bidirectional link
    pub(crate) fn record_subscription(&self, key: DepKey) {
        self.subscriptions.borrow_mut().push(key);
    }

    /// Remove this computation from every entry it is subscribed under
    fn release_subscriptions(&self) {
        let keys = self.subscriptions.take();
        if keys.is_empty() {
            return;
        }
        try_with_context(|ctx| {
            let mut graph = ctx.graph.borrow_mut();
            for key in &keys {
                graph.unsubscribe(key, self.id);
            }
        });
    }

    /// React to a trigger: defer through the delegate or run inline
    pub(crate) fn notify(self: &Rc<Self>) {
        if self.is_destroyed() {
            return;
        }
        match &self.delegate {
            Some(delegate) => {
                let handle = Computation {
                    inner: self.clone(),
                };
                delegate(&handle);
            }
            None => self.run(),
        }
    }

    /// Execute the body once, rebuilding the dependency set
    pub fn run(&self) {
        if self.is_destroyed() {
            return;
        }
        if self.is_running() {
            trace!(job = ?self.id, "skipping re-entrant run");
            return;
        }

        self.release_subscriptions();

        let Some(mut body) = self.body.borrow_mut().take() else {
            return;
        };

        self.set_flags(self.flags() | RUNNING);
        // A computation created inside `untrack` still tracks its own reads
        let (prev, prev_untracking) = with_context(|ctx| {
            (
                ctx.set_active_computation(Some(self.self_weak.clone())),
                ctx.set_untracking(false),
            )
        });

        let _ = contain(self.id, || body());

        with_context(|ctx| {
            ctx.set_active_computation(prev);
            ctx.set_untracking(prev_untracking);
        });
        self.set_flags((self.flags() & !RUNNING) | RAN);
        self.runs.set(self.runs.get() + 1);

        if self.is_destroyed() {
            // Torn down by its own body: drop whatever it subscribed to
            self.release_subscriptions();
        } else {
            *self.body.borrow_mut() = Some(body);
        }
    }

    /// Unsubscribe, leave the pending queue, and release the body
    pub fn teardown(&self) {
        if self.is_destroyed() {
            return;
        }
        self.set_flags(self.flags() | DESTROYED);
        self.release_subscriptions();
        unschedule(self.id);

        // Dropped outside the borrow: captured state may tear down more work
        let body = self.body.borrow_mut().take();
        drop(body);
    }
}

impl Schedulable for ComputationInner {
    fn job_id(&self) -> JobId {
        self.id
    }

    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn execute(&self) {
        self.run();
    }
}

impl Drop for ComputationInner {
    fn drop(&mut self) {
        self.release_subscriptions();
    }
}

// =============================================================================
// COMPUTATION HANDLE
// =============================================================================

/// Public handle to a computation.
///
/// Dropping the last handle tears the computation down. A computation created
/// inside a [`CleanupScope`](crate::CleanupScope) is also owned by that scope
/// and lives until the scope is disposed.
#[derive(Clone)]
pub struct Computation {
    inner: Rc<ComputationInner>,
}

impl Computation {
    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// Run the body now, regardless of pending state
    pub fn run(&self) {
        self.inner.run();
    }

    /// Queue a run for the next flush
    pub fn schedule(&self) {
        schedule(self.inner.clone());
    }

    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub fn is_pending(&self) -> bool {
        self.inner.is_pending()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Number of completed runs, including the initial one
    pub fn run_count(&self) -> u64 {
        self.inner.run_count()
    }

    /// Number of (object, field) entries currently subscribed
    pub fn subscription_count(&self) -> usize {
        self.inner.subscription_count()
    }

    pub fn ptr_eq(&self, other: &Computation) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Drop for Computation {
    fn drop(&mut self) {
        // The pending queue holds one extra strong reference while queued
        let queued = usize::from(self.inner.is_pending());
        if Rc::strong_count(&self.inner) <= 1 + queued {
            self.inner.teardown();
        }
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Delegate that defers every re-run to the next flush
pub fn next_tick_delegate() -> SchedulingDelegate {
    Rc::new(|computation: &Computation| computation.schedule())
}

/// Create a computation and run it once immediately.
///
/// With a delegate, later triggers call the delegate instead of the body.
/// Errors returned by the body are logged per run and never propagate.
pub fn create_computation(body: ComputationFn, delegate: Option<SchedulingDelegate>) -> Computation {
    let computation = Computation {
        inner: ComputationInner::new(body, delegate),
    };
    register_computation(&computation);
    computation.run();
    computation
}

/// A computation that re-runs inline, synchronously, on every trigger.
///
/// # Example
///
/// ```
/// use spark_weave::{computation, wrap, RawObject};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let state = wrap(&RawObject::map());
/// state.set("count", 0);
///
/// let seen = Rc::new(Cell::new(0.0));
/// let seen_in = seen.clone();
/// let s = state.clone();
/// let c = computation(move || {
///     seen_in.set(s.get("count").as_f64().unwrap_or_default());
/// });
///
/// state.set("count", 3);
/// assert_eq!(seen.get(), 3.0);
///
/// c.teardown();
/// state.set("count", 4);
/// assert_eq!(seen.get(), 3.0);
/// ```
pub fn computation<F>(mut f: F) -> Computation
where
    F: FnMut() + 'static,
{
    create_computation(
        Box::new(move || {
            f();
            Ok(())
        }),
        None,
    )
}

/// A computation whose re-runs are batched onto the next flush.
pub fn scheduled_computation<F>(mut f: F) -> Computation
where
    F: FnMut() + 'static,
{
    create_computation(
        Box::new(move || {
            f();
            Ok(())
        }),
        Some(next_tick_delegate()),
    )
}

// =============================================================================
// TESTS
// =============================================================================
