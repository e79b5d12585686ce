// ============================================================================
// spark-weave - Store Module
// Raw state objects and their observable wrappers
// ============================================================================

pub mod observable;
pub mod path;
pub mod raw;

pub use observable::{unwrap, wrap, wrapper_count, Observable};
pub use path::{call_path, evaluate_path, resolve_path, Resolved};
pub use raw::{RawData, RawObject};
