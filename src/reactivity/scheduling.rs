// ============================================================================
// spark-weave - Scheduling
// One deduplicated pending queue, flushed once per tick
// ============================================================================
//
// There is no platform microtask here. "Next tick" is whatever the host says
// it is: either it installs a tick requester (called once each time the queue
// goes from idle to "flush needed") and calls `flush()` from it, or it drives
// `flush()` / `run_until_idle()` itself.
//
// Flush semantics:
// - the live queue is swapped out for an empty one before anything runs, so
//   jobs scheduled while flushing land in the next tick
// - each job's pending flag is cleared right before it runs, so a job that is
//   invalidated by an earlier job of the same snapshot still runs once, in
//   this flush, and is not queued again for the next one
// - the "flush requested" flag stays set until the snapshot is done, so the
//   tick requester is never called from inside a running flush; work queued
//   meanwhile gets one fresh request once the flush settles
// - a failing job is logged and skipped; siblings still run
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{error, trace, warn};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::error::{ReactiveError, Result};
use crate::core::types::JobId;

// =============================================================================
// SCHEDULABLE
// =============================================================================

/// Anything that can sit in the pending queue.
pub trait Schedulable {
    /// Stable identity used for deduplication and removal
    fn job_id(&self) -> JobId;

    /// Get the flags bitmask
    fn flags(&self) -> u32;

    /// Set the flags bitmask
    fn set_flags(&self, flags: u32);

    /// Run the job once
    fn execute(&self);

    fn is_pending(&self) -> bool {
        self.flags() & PENDING != 0
    }

    fn is_destroyed(&self) -> bool {
        self.flags() & DESTROYED != 0
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Knobs for the driver loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Flushes `run_until_idle_with` performs before giving up
    pub max_ticks: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_ticks: MAX_TICKS,
        }
    }
}

// =============================================================================
// SCHEDULE
// =============================================================================

/// Put a job in the pending queue for the next flush.
///
/// No-op when the job is already pending or destroyed. Requests a tick from
/// the host the first time the queue needs flushing.
pub fn schedule(job: Rc<dyn Schedulable>) {
    let flags = job.flags();
    if flags & (PENDING | DESTROYED) != 0 {
        return;
    }
    job.set_flags(flags | PENDING);

    let requester = with_context(|ctx| {
        ctx.enqueue(job);
        let already_requested = ctx.request_flush();
        if already_requested {
            None
        } else {
            ctx.tick_requester()
        }
    });

    // Call the host hook outside the context borrow; it may flush right away
    if let Some(request_tick) = requester {
        request_tick();
    }
}

/// Schedule an arbitrary task for the next tick.
///
/// Re-scheduling a task that is already pending is a no-op, so a task
/// requested many times before a flush runs once.
pub fn schedule_on_next_tick(task: &Task) {
    schedule(task.inner.clone());
}

/// Remove a job from the pending queue, clearing its pending flag.
pub(crate) fn unschedule(id: JobId) {
    let removed = with_context(|ctx| {
        let mut queue = ctx.queue.borrow_mut();
        let pos = queue.iter().position(|job| job.job_id() == id);
        pos.map(|pos| queue.remove(pos))
    });
    if let Some(job) = removed {
        job.set_flags(job.flags() & !PENDING);
    }
}

// =============================================================================
// FLUSH
// =============================================================================

/// Run every job that was pending when the flush started, in FIFO order.
///
/// Returns the number of jobs executed.
pub fn flush() -> usize {
    let snapshot = with_context(|ctx| ctx.take_queue());

    if snapshot.is_empty() {
        if !is_flushing() {
            with_context(|ctx| ctx.flush_requested.set(false));
        }
        return 0;
    }

    trace!(jobs = snapshot.len(), "flush");

    let was_flushing = with_context(|ctx| ctx.flushing.replace(true));

    let mut executed = 0;
    for job in snapshot {
        job.set_flags(job.flags() & !PENDING);
        if job.is_destroyed() {
            continue;
        }
        job.execute();
        executed += 1;
    }

    with_context(|ctx| ctx.flushing.set(was_flushing));
    if !was_flushing {
        settle_tick_request();
    }

    executed
}

/// Clear the request flag after a flush, asking the host for another tick when
/// jobs were queued while it ran.
fn settle_tick_request() {
    let requester = with_context(|ctx| {
        ctx.flush_requested.set(false);
        if ctx.queue_len() == 0 {
            return None;
        }
        ctx.request_flush();
        ctx.tick_requester()
    });

    if let Some(request_tick) = requester {
        request_tick();
    }
}

/// Flush repeatedly until nothing is pending, using the default config.
pub fn run_until_idle() -> Result<usize> {
    run_until_idle_with(SchedulerConfig::default())
}

/// Flush repeatedly until nothing is pending.
///
/// Fails with [`ReactiveError::UpdateDepthExceeded`] when jobs are still
/// pending after `config.max_ticks` flushes; the remaining jobs stay queued.
pub fn run_until_idle_with(config: SchedulerConfig) -> Result<usize> {
    let mut total = 0;
    let mut ticks = 0;

    while pending_count() > 0 {
        if ticks >= config.max_ticks {
            error!(ticks, pending = pending_count(), "update depth exceeded");
            return Err(ReactiveError::UpdateDepthExceeded { ticks });
        }
        ticks += 1;
        total += flush();
    }

    Ok(total)
}

/// Number of jobs waiting for the next flush
pub fn pending_count() -> usize {
    with_context(|ctx| ctx.queue_len())
}

/// Whether a flush is currently running
pub fn is_flushing() -> bool {
    with_context(|ctx| ctx.flushing.get())
}

/// Install (or clear) the host hook that sources the next tick.
pub fn set_tick_requester(requester: Option<Rc<dyn Fn()>>) {
    with_context(|ctx| *ctx.tick_requester.borrow_mut() = requester);
}

// =============================================================================
// FAULT CONTAINMENT
// =============================================================================

/// Run one invocation of user code, containing errors and panics.
///
/// The fault is logged and returned; it never escapes as a panic.
pub(crate) fn contain(id: JobId, f: impl FnOnce() -> Result<()>) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            warn!(job = ?id, error = %err, "job failed");
            Err(err)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(job = ?id, %message, "job panicked");
            Err(ReactiveError::Panicked { message })
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// =============================================================================
// TASK
// =============================================================================

type TaskFn = Box<dyn FnMut() -> Result<()>>;

pub struct TaskInner {
    id: JobId,
    flags: Cell<u32>,
    func: RefCell<Option<TaskFn>>,
}

impl Schedulable for TaskInner {
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
        // Take the closure out so it can schedule itself again while running
        let Some(mut func) = self.func.borrow_mut().take() else {
            return;
        };
        let _ = contain(self.id, &mut func);
        if !self.is_destroyed() {
            *self.func.borrow_mut() = Some(func);
        }
    }
}

/// A reusable unit of deferred work with its own pending flag.
///
/// # Example
///
/// ```
/// use spark_weave::{flush, schedule_on_next_tick, Task};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let hits = Rc::new(Cell::new(0));
/// let hits_in = hits.clone();
/// let task = Task::new(move || hits_in.set(hits_in.get() + 1));
///
/// schedule_on_next_tick(&task);
/// schedule_on_next_tick(&task);
/// assert_eq!(hits.get(), 0);
///
/// flush();
/// assert_eq!(hits.get(), 1);
/// ```
#[derive(Clone)]
pub struct Task {
    inner: Rc<TaskInner>,
}

impl Task {
    pub fn new(mut f: impl FnMut() + 'static) -> Self {
        Self::fallible(move || {
            f();
            Ok(())
        })
    }

    /// A task whose failures are logged by the flush
    pub fn fallible(f: impl FnMut() -> Result<()> + 'static) -> Self {
        Self {
            inner: Rc::new(TaskInner {
                id: JobId::next(),
                flags: Cell::new(0),
                func: RefCell::new(Some(Box::new(f))),
            }),
        }
    }

    /// A task that runs at most once
    pub fn once(f: impl FnOnce() + 'static) -> Self {
        let mut f = Some(f);
        Self::new(move || {
            if let Some(f) = f.take() {
                f();
            }
        })
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    pub fn is_pending(&self) -> bool {
        self.inner.is_pending()
    }

    /// Drop the task from the queue and prevent it from ever running again
    pub fn cancel(&self) {
        unschedule(self.inner.id);
        self.inner.set_flags(self.inner.flags() | DESTROYED);
        *self.inner.func.borrow_mut() = None;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_task() -> (Task, Rc<Cell<u32>>) {
        let hits = Rc::new(Cell::new(0));
        let hits_in = hits.clone();
        (Task::new(move || hits_in.set(hits_in.get() + 1)), hits)
    }

    #[test]
    fn repeated_schedule_runs_once() {
        let (task, hits) = counter_task();
        for _ in 0..5 {
            schedule_on_next_tick(&task);
        }
        assert!(task.is_pending());
        assert_eq!(pending_count(), 1);

        assert_eq!(flush(), 1);
        assert_eq!(hits.get(), 1);
        assert!(!task.is_pending());

        schedule_on_next_tick(&task);
        flush();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn flush_runs_in_first_enqueue_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let tasks: Vec<Task> = (0..3)
            .map(|i| {
                let log = log.clone();
                Task::new(move || log.borrow_mut().push(i))
            })
            .collect();

        schedule_on_next_tick(&tasks[2]);
        schedule_on_next_tick(&tasks[0]);
        schedule_on_next_tick(&tasks[2]);
        schedule_on_next_tick(&tasks[1]);
        flush();

        assert_eq!(*log.borrow(), vec![2, 0, 1]);
    }

    #[test]
    fn work_scheduled_during_flush_waits_for_next_tick() {
        let (second, second_hits) = counter_task();
        let second_in = second.clone();
        let first = Task::new(move || schedule_on_next_tick(&second_in));

        schedule_on_next_tick(&first);
        assert_eq!(flush(), 1);
        assert_eq!(second_hits.get(), 0);
        assert_eq!(pending_count(), 1);

        assert_eq!(flush(), 1);
        assert_eq!(second_hits.get(), 1);
    }

    #[test]
    fn failing_task_does_not_block_siblings() {
        let bad = Task::fallible(|| Err(ReactiveError::body("nope")));
        let panicky = Task::new(|| panic!("boom"));
        let (good, hits) = counter_task();

        schedule_on_next_tick(&bad);
        schedule_on_next_tick(&panicky);
        schedule_on_next_tick(&good);
        assert_eq!(flush(), 3);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn cancel_removes_pending_task() {
        let (task, hits) = counter_task();
        schedule_on_next_tick(&task);
        task.cancel();
        assert_eq!(pending_count(), 0);
        flush();
        assert_eq!(hits.get(), 0);

        schedule_on_next_tick(&task);
        assert_eq!(pending_count(), 0);
    }

    #[test]
    fn tick_requester_called_once_per_tick() {
        let requests = Rc::new(Cell::new(0));
        let requests_in = requests.clone();
        set_tick_requester(Some(Rc::new(move || requests_in.set(requests_in.get() + 1))));

        let (a, _) = counter_task();
        let (b, _) = counter_task();
        schedule_on_next_tick(&a);
        schedule_on_next_tick(&b);
        assert_eq!(requests.get(), 1);

        flush();
        schedule_on_next_tick(&a);
        assert_eq!(requests.get(), 2);

        set_tick_requester(None);
        flush();
    }

    #[test]
    fn synchronous_requester_never_reenters_a_flush() {
        let reentered = Rc::new(Cell::new(false));
        let requests = Rc::new(Cell::new(0));
        {
            let reentered = reentered.clone();
            let requests = requests.clone();
            set_tick_requester(Some(Rc::new(move || {
                requests.set(requests.get() + 1);
                if is_flushing() {
                    reentered.set(true);
                }
                flush();
            })));
        }

        let (second, second_hits) = counter_task();
        let second_in = second.clone();
        let first = Task::new(move || schedule_on_next_tick(&second_in));

        schedule_on_next_tick(&first);
        assert!(!reentered.get());
        assert_eq!(second_hits.get(), 1);
        assert_eq!(requests.get(), 2);
        assert_eq!(pending_count(), 0);

        set_tick_requester(None);
    }

    #[test]
    fn job_invalidated_earlier_in_the_same_flush_runs_once() {
        let (late, late_hits) = counter_task();
        let late_in = late.clone();
        let early = Task::new(move || schedule_on_next_tick(&late_in));

        schedule_on_next_tick(&early);
        schedule_on_next_tick(&late);
        assert_eq!(flush(), 2);
        assert_eq!(late_hits.get(), 1);
        assert_eq!(pending_count(), 0);
    }

    #[test]
    fn run_until_idle_detects_self_rescheduling() {
        let slot: Rc<RefCell<Option<Task>>> = Rc::new(RefCell::new(None));
        let slot_in = slot.clone();
        let task = Task::new(move || {
            if let Some(me) = slot_in.borrow().as_ref() {
                schedule_on_next_tick(me);
            }
        });
        *slot.borrow_mut() = Some(task.clone());

        schedule_on_next_tick(&task);
        let result = run_until_idle_with(SchedulerConfig { max_ticks: 5 });
        assert_eq!(result, Err(ReactiveError::UpdateDepthExceeded { ticks: 5 }));

        task.cancel();
        slot.borrow_mut().take();
        assert_eq!(run_until_idle(), Ok(0));
    }
}
