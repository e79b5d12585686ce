// ============================================================================
// spark-weave - Core Module
// Fundamental types, errors, and thread-local runtime context
// ============================================================================

pub mod constants;
pub mod context;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use context::{is_tracking, is_untracking, triggers_paused, with_context, RuntimeContext};
pub use error::{ReactiveError, Result};
pub use types::{Callable, Field, JobId, NodeId, ObjectId, Value};
