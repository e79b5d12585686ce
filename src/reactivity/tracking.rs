// ============================================================================
// spark-weave - Dependency Tracking
// Track reads, trigger writes
// ============================================================================
//
// Borrow scoping: subscribers are collected into a snapshot while the graph is
// borrowed, the borrow is released, and only then is each subscriber notified.
// A notified computation re-subscribes while running, which needs the graph
// mutably again.
// ============================================================================

use std::rc::Rc;

use tracing::trace;

use crate::core::context::with_context;
use crate::core::types::{Field, ObjectId};

// =============================================================================
// TRACK
// =============================================================================

/// Register the active computation as a dependent of `(object, field)`.
///
/// No-op outside a computation or inside [`untrack`].
pub fn track(object: ObjectId, field: Field) {
    let Some(computation) = with_context(|ctx| {
        if ctx.is_untracking() {
            None
        } else {
            ctx.active_computation()
        }
    }) else {
        return;
    };

    if computation.is_destroyed() {
        return;
    }

    let key = (object, field);
    let added = with_context(|ctx| {
        ctx.graph
            .borrow_mut()
            .subscribe(key.clone(), computation.id(), Rc::downgrade(&computation))
    });
    if added {
        computation.record_subscription(key);
    }
}

// =============================================================================
// TRIGGER
// =============================================================================

/// Notify every computation subscribed to `(object, field)`.
///
/// Subscribers with a scheduling delegate hand themselves to it; the rest run
/// inline. Suppressed while a bulk list mutation is in progress.
pub fn trigger(object: ObjectId, field: Field) {
    let key = (object, field);
    let subscribers = with_context(|ctx| {
        if ctx.triggers_paused() {
            return Vec::new();
        }
        ctx.graph.borrow().subscribers(&key)
    });

    if subscribers.is_empty() {
        return;
    }

    trace!(object = object.get(), field = %key.1, count = subscribers.len(), "trigger");

    for computation in subscribers {
        computation.notify();
    }
}

// =============================================================================
// UNTRACK / PAUSE
// =============================================================================

/// Run `f` without recording any dependencies.
///
/// # Example
///
/// ```
/// use spark_weave::{computation, untrack, wrap, RawObject};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let state = wrap(&RawObject::map());
/// state.set("a", 1);
/// state.set("b", 2);
///
/// let runs = Rc::new(Cell::new(0));
/// let runs_in = runs.clone();
/// let s = state.clone();
/// let _c = computation(move || {
///     let _ = s.get("a");
///     let _ = untrack(|| s.get("b"));
///     runs_in.set(runs_in.get() + 1);
/// });
///
/// state.set("b", 20);
/// assert_eq!(runs.get(), 1);
/// state.set("a", 10);
/// assert_eq!(runs.get(), 2);
/// ```
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let prev = with_context(|ctx| ctx.set_untracking(true));

    struct UntrackGuard {
        prev: bool,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_untracking(self.prev));
        }
    }

    let _guard = UntrackGuard { prev };
    f()
}

/// Run `f` with all triggers suppressed.
///
/// Used by bulk list mutations so that a single operation does not notify
/// every index it touches.
pub fn without_triggers<T>(f: impl FnOnce() -> T) -> T {
    with_context(|ctx| ctx.pause_triggers());

    struct PauseGuard;

    impl Drop for PauseGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.resume_triggers());
        }
    }

    let _guard = PauseGuard;
    f()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::triggers_paused;
    use crate::primitives::computation::computation;
    use std::cell::Cell;

    #[test]
    fn track_outside_computation_is_noop() {
        let object = ObjectId::next();
        track(object, Field::from("a"));
        assert_eq!(
            with_context(|ctx| ctx.graph.borrow().entries_for(object)),
            0
        );
    }

    #[test]
    fn track_and_trigger_rerun_subscriber() {
        let object = ObjectId::next();
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();

        let _c = computation(move || {
            track(object, Field::from("a"));
            runs_in.set(runs_in.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        trigger(object, Field::from("a"));
        assert_eq!(runs.get(), 2);

        trigger(object, Field::from("b"));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn untrack_skips_registration() {
        let object = ObjectId::next();
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();

        let _c = computation(move || {
            untrack(|| track(object, Field::from("a")));
            runs_in.set(runs_in.get() + 1);
        });

        trigger(object, Field::from("a"));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn without_triggers_suppresses_and_restores() {
        let object = ObjectId::next();
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();

        let _c = computation(move || {
            track(object, Field::Length);
            runs_in.set(runs_in.get() + 1);
        });

        without_triggers(|| {
            assert!(triggers_paused());
            trigger(object, Field::Length);
        });
        assert!(!triggers_paused());
        assert_eq!(runs.get(), 1);

        trigger(object, Field::Length);
        assert_eq!(runs.get(), 2);
    }
}
