// ============================================================================
// spark-weave - Dependency Graph
// (object, field) -> computations that read that field on their last run
// ============================================================================
//
// The graph is one half of a bidirectional link: every computation also keeps
// the list of keys it is subscribed under, so tearing it down only touches
// the entries it actually holds. Entries are created on first tracked read and
// dropped as soon as their last subscriber leaves.
// ============================================================================

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::core::types::{Field, JobId, ObjectId};
use crate::primitives::computation::ComputationInner;

/// Key of one dependency entry
pub type DepKey = (ObjectId, Field);

struct Subscriber {
    id: JobId,
    computation: Weak<ComputationInner>,
}

/// Identity-keyed table of subscriptions.
#[derive(Default)]
pub struct DependencyGraph {
    entries: HashMap<DepKey, Vec<Subscriber>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `computation` under `key`.
    ///
    /// Returns false when it was already subscribed there.
    pub fn subscribe(&mut self, key: DepKey, id: JobId, computation: Weak<ComputationInner>) -> bool {
        let list = self.entries.entry(key).or_default();
        if list.iter().any(|s| s.id == id) {
            return false;
        }
        list.push(Subscriber { id, computation });
        true
    }

    /// Remove one subscription, dropping the entry when it empties.
    pub fn unsubscribe(&mut self, key: &DepKey, id: JobId) {
        let Some(list) = self.entries.get_mut(key) else {
            return;
        };
        if let Some(pos) = list.iter().position(|s| s.id == id) {
            list.swap_remove(pos);
        }
        if list.is_empty() {
            self.entries.remove(key);
        }
    }

    /// Snapshot of the live subscribers of `key`.
    ///
    /// Callers iterate the snapshot, so subscribers may come and go while it
    /// is being walked.
    pub fn subscribers(&self, key: &DepKey) -> Vec<Rc<ComputationInner>> {
        self.entries
            .get(key)
            .map(|list| list.iter().filter_map(|s| s.computation.upgrade()).collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, key: &DepKey) -> usize {
        self.entries.get(key).map_or(0, Vec::len)
    }

    /// Number of live (object, field) entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries held for one object
    pub fn entries_for(&self, object: ObjectId) -> usize {
        self.entries.keys().filter(|(id, _)| *id == object).count()
    }
}

// =============================================================================
// TESTS
// =============================================================================
