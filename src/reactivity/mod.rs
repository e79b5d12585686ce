// ============================================================================
// spark-weave - Reactivity Module
// Dependency graph, track/trigger, and the batching scheduler
// ============================================================================

pub mod graph;
pub mod scheduling;
pub mod tracking;

// Re-export main tracking functions
pub use tracking::{track, trigger, untrack, without_triggers};

// Re-export scheduling functions
pub use scheduling::{
    flush, is_flushing, pending_count, run_until_idle, run_until_idle_with, schedule,
    schedule_on_next_tick, set_tick_requester, Schedulable, SchedulerConfig, Task,
};

pub use graph::{DepKey, DependencyGraph};
