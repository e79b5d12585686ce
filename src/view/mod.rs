// ============================================================================
// spark-weave - View Module
// Render-tree seam, keyed list reconciliation, and branches
// ============================================================================

pub mod branch;
pub mod each;
pub mod memory;
pub mod reconcile;
pub mod tree;

pub use branch::{condition_holds, when, when_with, Branch, BranchBinding, BranchFactory};
pub use each::{each, each_with, ListBinding, ListDirective};
pub use memory::{MemoryTree, TreeStats};
pub use reconcile::{
    collect_entries, derive_keys, Aliases, Entry, KeyExtractor, ReconcileStats, Reconciler, Row,
    RowFactory, RowKey, RowUpdater,
};
pub use tree::RenderTree;
