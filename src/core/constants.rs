// ============================================================================
// spark-weave - Constants
// Flag bits for computations and scheduled jobs, plus runtime limits
// ============================================================================

// =============================================================================
// JOB STATE FLAGS
// =============================================================================

/// Job is sitting in the pending queue, waiting for the next flush
pub const PENDING: u32 = 1 << 0;

/// Computation body is currently executing
pub const RUNNING: u32 = 1 << 1;

/// Computation has been torn down and must never run again
pub const DESTROYED: u32 = 1 << 2;

/// Computation defers its re-runs to the scheduler instead of running inline
pub const SCHEDULED: u32 = 1 << 3;

/// Computation has completed at least one run
pub const RAN: u32 = 1 << 4;

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum number of consecutive flushes `run_until_idle` performs before it
/// assumes a job keeps re-scheduling itself.
pub const MAX_TICKS: u32 = 1000;

// =============================================================================
// TESTS
// =============================================================================
