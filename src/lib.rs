// ============================================================================
// spark-weave - Fine-Grained Reactive View Runtime for Rust
// ============================================================================
//
// Keeps a tree of view nodes in sync with a mutable state graph without
// diffing the whole view:
//
// - store/      observable wrappers over plain mappings and lists
// - reactivity/ (object, field) dependency graph, track/trigger, scheduler
// - primitives/ computations and the cleanup scopes that own them
// - view/       render-tree seam, keyed list reconciler, branches
//
// Single-threaded by construction: all runtime state lives in a thread-local
// context, and "next tick" is whenever the host calls `flush()`.
// ============================================================================

#[macro_use]
mod macros;

pub mod core;
pub mod primitives;
pub mod reactivity;
pub mod store;
pub mod view;

// Re-export core items at crate root for ergonomic access
pub use core::constants;
pub use core::context::{is_tracking, is_untracking, triggers_paused, with_context, RuntimeContext};
pub use core::error::{ReactiveError, Result};
pub use core::types::{Callable, Field, JobId, NodeId, ObjectId, Value};

// Store
pub use store::observable::{unwrap, wrap, wrapper_count, Observable};
pub use store::path::{call_path, evaluate_path, resolve_path, Resolved};
pub use store::raw::{RawData, RawObject};

// Reactivity
pub use reactivity::scheduling::{
    flush, is_flushing, pending_count, run_until_idle, run_until_idle_with, schedule,
    schedule_on_next_tick, set_tick_requester, Schedulable, SchedulerConfig, Task,
};
pub use reactivity::tracking::{track, trigger, untrack, without_triggers};

// Primitives
pub use primitives::computation::{
    computation, create_computation, next_tick_delegate, scheduled_computation, Computation,
    ComputationFn, SchedulingDelegate,
};
pub use primitives::scope::{cleanup_scope, current_scope, on_cleanup, CleanupFn, CleanupScope};

// View
pub use view::branch::{condition_holds, when, when_with, Branch, BranchBinding};
pub use view::each::{each, each_with, ListBinding, ListDirective};
pub use view::memory::{MemoryTree, TreeStats};
pub use view::reconcile::{
    Aliases, Entry, KeyExtractor, ReconcileStats, Reconciler, Row, RowKey,
};
pub use view::tree::RenderTree;

// =============================================================================
// TESTS
// =============================================================================
