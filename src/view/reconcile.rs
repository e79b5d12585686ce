// ============================================================================
// spark-weave - Keyed Reconciler
// Converge a pool of realized rows onto a keyed collection
// ============================================================================
//
// One pass:
// 1. Read the source (tracking its length or key set) into ordered entries
// 2. Derive one key per entry; duplicate keys get a positional suffix
// 3. Tear down pooled rows whose key is absent from the new key set
// 4. Walk the keys left to right with a cursor that starts at the anchor:
//    reuse or create the row, then, if its first node is not right after
//    the cursor, move its whole node run there in one call
// 5. The visited rows become the new pool
//
// Evicting before the walk means rows that merely lost a predecessor are
// already in place when the walk reaches them, so they are not moved.
// ============================================================================

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, error, trace};

use crate::core::types::{Field, NodeId, ObjectId, Value};
use crate::primitives::scope::CleanupScope;
use crate::reactivity::scheduling::panic_message;
use crate::reactivity::tracking::untrack;
use crate::store::observable::Observable;
use crate::store::path::resolve_path;
use crate::view::tree::RenderTree;

// =============================================================================
// KEYS AND ENTRIES
// =============================================================================

/// Identity of a row across reconciliation passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    /// The item (or its explicit key) is an object
    Object(ObjectId),
    /// Canonical string of a primitive key
    Value(String),
    /// A key that collided with an earlier entry, disambiguated by position
    Suffixed(Box<RowKey>, usize),
}

impl RowKey {
    fn of_value(value: &Value) -> RowKey {
        match value.object_id() {
            Some(id) => RowKey::Object(id),
            None => RowKey::Value(value.key_string()),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Object(id) => write!(f, "object#{}", id.get()),
            RowKey::Value(key) => f.write_str(key),
            RowKey::Suffixed(key, position) => write!(f, "{key}@{position}"),
        }
    }
}

/// One element of the source collection, as seen by a single pass.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Position in iteration order
    pub position: usize,
    /// List index (number) or mapping key (string); bound to the index alias
    pub index: Value,
    pub item: Value,
}

/// Read a source collection into entries.
///
/// Lists track `length` and every index read; mappings track their key set
/// and every field read, in insertion order. Anything else is empty.
pub fn collect_entries(source: &Value) -> (Vec<Entry>, bool) {
    let Some(collection) = source.as_observable() else {
        if !source.is_nullish() {
            trace!(?source, "list source is not a collection");
        }
        return (Vec::new(), true);
    };

    if collection.is_list() {
        let entries = (0..collection.len())
            .map(|position| Entry {
                position,
                index: Value::from(position),
                item: collection.get(position),
            })
            .collect();
        (entries, true)
    } else {
        let entries = collection
            .keys()
            .into_iter()
            .enumerate()
            .map(|(position, field)| Entry {
                position,
                index: Value::from(field.to_string()),
                item: collection.get(field),
            })
            .collect();
        (entries, false)
    }
}

// =============================================================================
// KEY EXTRACTOR
// =============================================================================

type KeyFn = dyn Fn(&Entry) -> Value;

/// How rows are identified.
#[derive(Clone, Default)]
pub enum KeyExtractor {
    /// Object items by identity; list primitives by `position_value`;
    /// mapping entries by their key
    #[default]
    Structural,
    /// Dotted path evaluated on object items
    Path(Rc<str>),
    Custom(Rc<KeyFn>),
}

impl KeyExtractor {
    pub fn path(path: impl Into<Rc<str>>) -> Self {
        KeyExtractor::Path(path.into())
    }

    pub fn custom(f: impl Fn(&Entry) -> Value + 'static) -> Self {
        KeyExtractor::Custom(Rc::new(f))
    }

    /// Key for one entry. Explicit keys that come out undefined fall back to
    /// the structural key.
    pub fn key_for(&self, entry: &Entry, from_list: bool) -> RowKey {
        let explicit = match self {
            KeyExtractor::Structural => None,
            KeyExtractor::Path(path) => entry
                .item
                .as_observable()
                .map(|item| resolve_path(&item, path).value),
            KeyExtractor::Custom(f) => Some(f(entry)),
        };

        match explicit {
            Some(key) if !key.is_undefined() => RowKey::of_value(&key),
            _ => Self::structural(entry, from_list),
        }
    }

    fn structural(entry: &Entry, from_list: bool) -> RowKey {
        match entry.item.object_id() {
            Some(id) => RowKey::Object(id),
            None if from_list => {
                RowKey::Value(format!("{}_{}", entry.position, entry.item.key_string()))
            }
            None => RowKey::Value(entry.index.key_string()),
        }
    }
}

impl fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyExtractor::Structural => f.write_str("Structural"),
            KeyExtractor::Path(path) => write!(f, "Path({path})"),
            KeyExtractor::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Keys for a whole pass, suffixing every repeat with its position.
pub fn derive_keys(entries: &[Entry], extractor: &KeyExtractor, from_list: bool) -> Vec<RowKey> {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .iter()
        .map(|entry| {
            let key = extractor.key_for(entry, from_list);
            if seen.insert(key.clone()) {
                key
            } else {
                let suffixed = RowKey::Suffixed(Box::new(key), entry.position);
                seen.insert(suffixed.clone());
                suffixed
            }
        })
        .collect()
}

// =============================================================================
// ROW
// =============================================================================

/// Names under which each row scope exposes its item and index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aliases {
    pub item: Rc<str>,
    pub index: Option<Rc<str>>,
}

impl Aliases {
    pub fn new(item: impl Into<Rc<str>>) -> Self {
        Self {
            item: item.into(),
            index: None,
        }
    }

    pub fn with_index(mut self, index: impl Into<Rc<str>>) -> Self {
        self.index = Some(index.into());
        self
    }
}

/// A realized, reusable unit of output.
pub struct Row {
    nodes: Vec<NodeId>,
    scope: Observable,
    cleanups: CleanupScope,
}

impl Row {
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Child scope exposing the item and index aliases
    pub fn scope(&self) -> &Observable {
        &self.scope
    }

    /// Owner of everything mounted under this row
    pub fn cleanups(&self) -> &CleanupScope {
        &self.cleanups
    }

    fn first(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    fn last(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("nodes", &self.nodes)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// STATS
// =============================================================================

/// What one or more passes did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub reused: usize,
    /// Relocations of already-pooled rows
    pub moved: usize,
    pub destroyed: usize,
    /// Entries skipped because their row factory panicked
    pub failed: usize,
}

impl std::ops::AddAssign for ReconcileStats {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.reused += other.reused;
        self.moved += other.moved;
        self.destroyed += other.destroyed;
        self.failed += other.failed;
    }
}

// =============================================================================
// RECONCILER
// =============================================================================

/// Builds the nodes of a new row with its scope active. Computations created
/// inside are owned by the row.
pub type RowFactory = Box<dyn FnMut(&Observable) -> Vec<NodeId>>;

/// Extra work for a reused row, after its aliases were rebound
pub type RowUpdater = Box<dyn FnMut(&Row, &Entry)>;

/// Pool of rows kept in sync with a keyed collection.
///
/// Rows sit after `anchor`, in collection order, under the anchor's parent.
pub struct Reconciler<T: RenderTree> {
    tree: Rc<RefCell<T>>,
    anchor: NodeId,
    parent_scope: Observable,
    aliases: Aliases,
    key: KeyExtractor,
    factory: RowFactory,
    updater: Option<RowUpdater>,
    pool: IndexMap<RowKey, Row>,
    totals: ReconcileStats,
}

impl<T: RenderTree> Reconciler<T> {
    pub fn new(
        tree: Rc<RefCell<T>>,
        anchor: NodeId,
        parent_scope: Observable,
        aliases: Aliases,
        factory: impl FnMut(&Observable) -> Vec<NodeId> + 'static,
    ) -> Self {
        Self {
            tree,
            anchor,
            parent_scope,
            aliases,
            key: KeyExtractor::Structural,
            factory: Box::new(factory),
            updater: None,
            pool: IndexMap::new(),
            totals: ReconcileStats::default(),
        }
    }

    pub fn with_key(mut self, key: KeyExtractor) -> Self {
        self.key = key;
        self
    }

    pub fn with_updater(mut self, updater: impl FnMut(&Row, &Entry) + 'static) -> Self {
        self.updater = Some(Box::new(updater));
        self
    }

    /// Run one pass against `source` and return what it did.
    pub fn reconcile(&mut self, source: &Value) -> ReconcileStats {
        let (entries, from_list) = collect_entries(source);
        let keys = derive_keys(&entries, &self.key, from_list);
        let mut stats = ReconcileStats::default();

        // Evict first so surviving rows keep their positions where possible
        let present: HashSet<&RowKey> = keys.iter().collect();
        let stale: Vec<RowKey> = self
            .pool
            .keys()
            .filter(|key| !present.contains(key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(row) = self.pool.shift_remove(&key) {
                self.destroy_row(row);
                stats.destroyed += 1;
            }
        }

        let mut cursor = self.anchor;
        let mut next_pool = IndexMap::with_capacity(keys.len());

        for (key, entry) in keys.into_iter().zip(entries) {
            let (row, is_new) = match self.pool.shift_remove(&key) {
                Some(row) => {
                    self.rebind(&row, &entry);
                    stats.reused += 1;
                    (row, false)
                }
                None => match self.create_row(&key, &entry) {
                    Some(row) => {
                        stats.created += 1;
                        (row, true)
                    }
                    None => {
                        stats.failed += 1;
                        continue;
                    }
                },
            };

            if let (Some(first), Some(last)) = (row.first(), row.last()) {
                let in_place = self.tree.borrow().next_sibling(cursor) == Some(first);
                if !in_place {
                    self.tree.borrow_mut().insert_after(cursor, &row.nodes);
                    if !is_new {
                        stats.moved += 1;
                    }
                }
                cursor = last;
            }

            next_pool.insert(key, row);
        }

        // Only reachable if the pool was modified from inside a row factory
        for (_, row) in self.pool.drain(..).collect::<Vec<_>>() {
            self.destroy_row(row);
            stats.destroyed += 1;
        }
        self.pool = next_pool;
        self.totals += stats;

        debug!(
            created = stats.created,
            reused = stats.reused,
            moved = stats.moved,
            destroyed = stats.destroyed,
            failed = stats.failed,
            rows = self.pool.len(),
            "reconciled"
        );
        stats
    }

    /// Build a row, or `None` when its factory panicked. A failed row leaves
    /// nothing behind: its cleanups run and no node is placed.
    fn create_row(&mut self, key: &RowKey, entry: &Entry) -> Option<Row> {
        let scope = self.parent_scope.child_scope();

        // Aliases are own fields of the row scope, shadowing any outer ones
        let raw = scope.raw();
        raw.put(&Field::from(self.aliases.item.clone()), entry.item.clone());
        if let Some(index) = &self.aliases.index {
            raw.put(&Field::from(index.clone()), entry.index.clone());
        }

        let cleanups = CleanupScope::detached();
        let factory = &mut self.factory;
        let built = cleanups
            .run(|| catch_unwind(AssertUnwindSafe(|| untrack(|| factory(&scope)))))
            .unwrap_or_else(|| Ok(Vec::new()));

        match built {
            Ok(nodes) => Some(Row {
                nodes,
                scope,
                cleanups,
            }),
            Err(payload) => {
                error!(%key, message = %panic_message(payload.as_ref()), "row factory panicked");
                cleanups.dispose();
                None
            }
        }
    }

    fn rebind(&mut self, row: &Row, entry: &Entry) {
        untrack(|| {
            row.scope.set(self.aliases.item.clone(), entry.item.clone());
            if let Some(index) = &self.aliases.index {
                row.scope.set(index.clone(), entry.index.clone());
            }
            if let Some(updater) = self.updater.as_mut() {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| updater(row, entry))) {
                    error!(message = %panic_message(payload.as_ref()), "row updater panicked");
                }
            }
        });
    }

    fn destroy_row(&self, row: Row) {
        row.cleanups.dispose();
        match self.tree.try_borrow_mut() {
            Ok(mut tree) => tree.remove(&row.nodes),
            Err(_) => trace!("render tree busy; row nodes left in place"),
        }
    }

    /// Tear down every row. Returns how many were destroyed.
    pub fn dispose(&mut self) -> usize {
        let rows: Vec<Row> = self.pool.drain(..).map(|(_, row)| row).collect();
        let count = rows.len();
        for row in rows {
            self.destroy_row(row);
        }
        self.totals.destroyed += count;
        count
    }

    /// Keys of the pooled rows, in collection order
    pub fn keys(&self) -> Vec<RowKey> {
        self.pool.keys().cloned().collect()
    }

    pub fn row(&self, key: &RowKey) -> Option<&Row> {
        self.pool.get(key)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&RowKey, &Row)> {
        self.pool.iter()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn anchor(&self) -> NodeId {
        self.anchor
    }

    /// Totals across every pass so far
    pub fn totals(&self) -> ReconcileStats {
        self.totals
    }
}

impl<T: RenderTree> Drop for Reconciler<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::observable::wrap;
    use crate::store::raw::RawObject;
    use crate::view::memory::MemoryTree;
    use std::cell::Cell;

    struct Fixture {
        tree: Rc<RefCell<MemoryTree>>,
        anchor: NodeId,
        scope: Observable,
        built: Rc<Cell<usize>>,
    }

    fn fixture() -> Fixture {
        let tree = Rc::new(RefCell::new(MemoryTree::new()));
        let anchor = {
            let mut t = tree.borrow_mut();
            let anchor = t.create("anchor");
            let root = t.root();
            t.append(root, anchor);
            anchor
        };
        Fixture {
            tree,
            anchor,
            scope: wrap(&RawObject::map()),
            built: Rc::new(Cell::new(0)),
        }
    }

    /// One node per row, labelled with the item's `id` (or the item itself)
    fn reconciler(f: &Fixture) -> Reconciler<MemoryTree> {
        let tree = f.tree.clone();
        let built = f.built.clone();
        Reconciler::new(
            f.tree.clone(),
            f.anchor,
            f.scope.clone(),
            Aliases::new("item").with_index("i"),
            move |scope| {
                built.set(built.get() + 1);
                let item = scope.get("item");
                let label = match item.as_observable() {
                    Some(obj) => obj.get("id").key_string(),
                    None => item.key_string(),
                };
                vec![tree.borrow_mut().create(label)]
            },
        )
    }

    fn labels(f: &Fixture) -> Vec<String> {
        let tree = f.tree.borrow();
        tree.labels(tree.root()).into_iter().skip(1).collect()
    }

    fn item(id: i32) -> RawObject {
        RawObject::from_pairs([("id", id)])
    }

    #[test]
    fn reorder_reuses_rows_and_moves_once() {
        let f = fixture();
        let mut r = reconciler(&f).with_key(KeyExtractor::path("id"));
        let (one, two) = (item(1), item(2));

        let list = wrap(&RawObject::from_values([one.clone(), two.clone()]));
        r.reconcile(&Value::Observed(list.clone()));
        assert_eq!(labels(&f), vec!["1", "2"]);

        list.reverse();
        f.tree.borrow_mut().reset_stats();
        let stats = r.reconcile(&Value::Observed(list));

        assert_eq!(labels(&f), vec!["2", "1"]);
        assert_eq!(stats.reused, 2);
        assert_eq!(stats.created, 0);
        assert_eq!(stats.moved, 1);
        assert_eq!(f.tree.borrow().stats().insert_calls, 1);
        assert_eq!(f.built.get(), 2);
    }

    #[test]
    fn removed_key_is_torn_down_once() {
        let f = fixture();
        let mut r = reconciler(&f);
        let list = wrap(&RawObject::from_values([item(1), item(2), item(3)]));
        r.reconcile(&Value::Observed(list.clone()));

        let middle = r.keys()[1].clone();
        let torn = Rc::new(Cell::new(0));
        let torn_in = torn.clone();
        r.row(&middle)
            .unwrap()
            .cleanups()
            .add_cleanup(move || torn_in.set(torn_in.get() + 1));

        list.splice(1, 1, Vec::<Value>::new());
        f.tree.borrow_mut().reset_stats();
        let stats = r.reconcile(&Value::Observed(list));

        assert_eq!(torn.get(), 1);
        assert_eq!(stats.destroyed, 1);
        assert_eq!(stats.moved, 0);
        assert_eq!(labels(&f), vec!["1", "3"]);
        assert_eq!(f.tree.borrow().stats().insert_calls, 0);
    }

    /// Like `reconciler`, but the factory panics for id 3 after registering
    /// a cleanup that counts into `cleaned`.
    fn faulty_reconciler(f: &Fixture, cleaned: Rc<Cell<usize>>) -> Reconciler<MemoryTree> {
        let tree = f.tree.clone();
        Reconciler::new(
            f.tree.clone(),
            f.anchor,
            f.scope.clone(),
            Aliases::new("item"),
            move |scope| {
                let id = scope.get("item").as_observable().unwrap().get("id");
                let cleaned = cleaned.clone();
                crate::primitives::scope::on_cleanup(move || cleaned.set(cleaned.get() + 1));
                if id == Value::from(3) {
                    panic!("row 3 cannot be built");
                }
                vec![tree.borrow_mut().create(id.key_string())]
            },
        )
    }

    #[test]
    fn panicking_factory_skips_the_entry_and_keeps_the_pool() {
        let f = fixture();
        let cleaned = Rc::new(Cell::new(0));
        let mut r = faulty_reconciler(&f, cleaned.clone());
        let list = wrap(&RawObject::from_values([item(1), item(2)]));
        r.reconcile(&Value::Observed(list.clone()));

        list.push([item(3)]);
        let stats = r.reconcile(&Value::Observed(list.clone()));
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.reused, 2);
        assert_eq!(r.len(), 2);
        assert_eq!(labels(&f), vec!["1", "2"]);
        // The half-built row released what it had registered
        assert_eq!(cleaned.get(), 1);

        list.pop();
        let stats = r.reconcile(&Value::Observed(list));
        assert_eq!(stats, ReconcileStats { reused: 2, ..Default::default() });
        assert_eq!(labels(&f), vec!["1", "2"]);
        assert_eq!(cleaned.get(), 1);
    }

    #[test]
    fn failed_entry_is_retried_on_the_next_pass() {
        let f = fixture();
        let cleaned = Rc::new(Cell::new(0));
        let mut r = faulty_reconciler(&f, cleaned.clone());
        let list = wrap(&RawObject::from_values([item(3), item(1)]));

        let stats = r.reconcile(&Value::Observed(list.clone()));
        assert_eq!((stats.created, stats.failed), (1, 1));
        assert_eq!(labels(&f), vec!["1"]);

        list.set(0, item(4));
        let stats = r.reconcile(&Value::Observed(list));
        assert_eq!((stats.created, stats.reused, stats.failed), (1, 1, 0));
        assert_eq!(labels(&f), vec!["4", "1"]);
        assert_eq!(r.totals().failed, 1);
    }

    #[test]
    fn panicking_updater_leaves_rows_in_place() {
        let f = fixture();
        let mut r = reconciler(&f).with_updater(|_, entry| {
            if entry.position == 0 {
                panic!("updater");
            }
        });
        let list = wrap(&RawObject::from_values([item(1), item(2)]));
        r.reconcile(&Value::Observed(list.clone()));

        list.reverse();
        let stats = r.reconcile(&Value::Observed(list));
        assert_eq!(stats.reused, 2);
        assert_eq!(labels(&f), vec!["2", "1"]);
    }

    #[test]
    fn primitive_duplicates_get_distinct_rows() {
        let f = fixture();
        let mut r = reconciler(&f);
        let list = wrap(&RawObject::from_values(["a", "a", "b"]));
        r.reconcile(&Value::Observed(list));
        assert_eq!(labels(&f), vec!["a", "a", "b"]);
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn repeated_object_is_suffixed_by_position() {
        let f = fixture();
        let mut r = reconciler(&f);
        let shared = item(7);
        let list = wrap(&RawObject::from_values([shared.clone(), shared.clone()]));
        r.reconcile(&Value::Observed(list));

        let keys = r.keys();
        assert_eq!(keys[0], RowKey::Object(shared.id()));
        assert_eq!(
            keys[1],
            RowKey::Suffixed(Box::new(RowKey::Object(shared.id())), 1)
        );
        assert_eq!(labels(&f), vec!["7", "7"]);
    }

    #[test]
    fn reused_rows_get_rebound_aliases() {
        let f = fixture();
        let mut r = reconciler(&f).with_key(KeyExtractor::path("id"));
        let (one, two) = (item(1), item(2));
        let list = wrap(&RawObject::from_values([one.clone(), two.clone()]));
        r.reconcile(&Value::Observed(list.clone()));

        list.reverse();
        r.reconcile(&Value::Observed(list));

        let row = r.row(&RowKey::Value("2".into())).unwrap();
        assert_eq!(row.scope().get("i"), Value::from(0));
        assert_eq!(row.scope().get("item"), Value::Object(two));
    }

    #[test]
    fn map_sources_iterate_in_insertion_order() {
        let f = fixture();
        let mut r = reconciler(&f);
        let map = wrap(&RawObject::from_pairs([("x", 1), ("y", 2)]));
        r.reconcile(&Value::Observed(map.clone()));
        assert_eq!(labels(&f), vec!["1", "2"]);

        let row = r.row(&RowKey::Value("y".into())).unwrap();
        assert_eq!(row.scope().get("i"), Value::from("y"));

        map.delete("x");
        r.reconcile(&Value::Observed(map));
        assert_eq!(labels(&f), vec!["2"]);
    }

    #[test]
    fn row_aliases_shadow_outer_fields() {
        let f = fixture();
        f.scope.set("item", "outer");
        let mut r = reconciler(&f);
        let list = wrap(&RawObject::from_values(["inner"]));
        r.reconcile(&Value::Observed(list));

        assert_eq!(f.scope.get("item"), Value::from("outer"));
        assert_eq!(labels(&f), vec!["inner"]);
    }

    #[test]
    fn non_collections_render_nothing() {
        let f = fixture();
        let mut r = reconciler(&f);
        let list = wrap(&RawObject::from_values([1, 2]));
        r.reconcile(&Value::Observed(list));

        let stats = r.reconcile(&Value::Undefined);
        assert_eq!(stats.destroyed, 2);
        assert!(r.is_empty());
        assert!(labels(&f).is_empty());

        r.reconcile(&Value::from(42));
        assert!(r.is_empty());
    }

    #[test]
    fn dispose_and_drop_tear_everything_down() {
        let f = fixture();
        let mut r = reconciler(&f);
        r.reconcile(&Value::Observed(wrap(&RawObject::from_values([1, 2]))));
        assert_eq!(r.dispose(), 2);
        assert!(labels(&f).is_empty());

        r.reconcile(&Value::Observed(wrap(&RawObject::from_values([3]))));
        drop(r);
        assert!(labels(&f).is_empty());
    }

    #[test]
    fn rows_own_their_computations() {
        let f = fixture();
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();
        let tree = f.tree.clone();
        let mut r = Reconciler::new(
            f.tree.clone(),
            f.anchor,
            f.scope.clone(),
            Aliases::new("item"),
            move |scope| {
                let scope = scope.clone();
                let runs = runs_in.clone();
                crate::primitives::computation::computation(move || {
                    let _ = scope.get("item");
                    runs.set(runs.get() + 1);
                });
                vec![tree.borrow_mut().create("row")]
            },
        );

        let obj = wrap(&RawObject::map());
        let list = wrap(&RawObject::from_values([obj.raw().clone()]));
        r.reconcile(&Value::Observed(list.clone()));
        assert_eq!(runs.get(), 1);

        // Row scope alias write re-runs the row computation
        let row_key = r.keys()[0].clone();
        let row_scope = r.row(&row_key).unwrap().scope().clone();
        row_scope.set("item", 5);
        assert_eq!(runs.get(), 2);

        list.pop();
        r.reconcile(&Value::Observed(list));
        assert!(r.is_empty());

        // Torn down with its row
        row_scope.set("item", 6);
        assert_eq!(runs.get(), 2);
    }
}
