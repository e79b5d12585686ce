// ============================================================================
// spark-weave - Primitives Module
// Computations and the cleanup scopes that own them
// ============================================================================

pub mod computation;
pub mod scope;

// Re-export for convenience
pub use computation::{
    computation, create_computation, next_tick_delegate, scheduled_computation, Computation,
    ComputationFn, ComputationInner, SchedulingDelegate,
};
pub use scope::{cleanup_scope, current_scope, on_cleanup, CleanupFn, CleanupScope};
