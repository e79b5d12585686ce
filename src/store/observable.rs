// ============================================================================
// spark-weave - Observable Store
// Identity-stable tracking wrappers over raw objects
// ============================================================================
//
// Reads go through `get` and record (object, field) for the active
// computation; writes go through `set` and notify only when the stored value
// actually changed. Nested objects are wrapped lazily, on read, and every raw
// object has at most one live wrapper, so reading the same nested field twice
// yields the same `Observable`.
//
// Synthetic fields:
// - `Field::Length` on lists, notified by any element write and by every bulk
//   mutation (once per operation, never once per touched index)
// - `Field::Keys` on mappings, notified when a field is added or removed
// ============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::core::context::{try_with_context, with_context};
use crate::core::types::{Field, ObjectId, Value};
use crate::reactivity::tracking::{track, trigger, without_triggers};
use crate::store::raw::{RawData, RawObject};

// =============================================================================
// WRAP / UNWRAP
// =============================================================================

/// Get the observable wrapper of a raw object.
///
/// Idempotent: while any handle to the wrapper is alive, wrapping the same
/// raw object again returns that same wrapper.
///
/// # Example
///
/// ```
/// use spark_weave::{unwrap, wrap, RawObject};
///
/// let raw = RawObject::map();
/// let a = wrap(&raw);
/// let b = wrap(&raw);
/// assert!(a.ptr_eq(&b));
/// assert!(unwrap(&a).ptr_eq(&raw));
/// ```
pub fn wrap(raw: &RawObject) -> Observable {
    with_context(|ctx| {
        let mut wrappers = ctx.wrappers.borrow_mut();
        if let Some(existing) = wrappers.get(&raw.id()).and_then(Weak::upgrade) {
            return Observable(existing);
        }
        let inner = Rc::new(ObservableInner { raw: raw.clone() });
        wrappers.insert(raw.id(), Rc::downgrade(&inner));
        Observable(inner)
    })
}

/// Escape hatch back to the raw object. Reads and writes on the result are
/// not observed.
pub fn unwrap(observable: &Observable) -> RawObject {
    observable.raw().clone()
}

/// Number of live wrappers in the cache
pub fn wrapper_count() -> usize {
    with_context(|ctx| {
        ctx.wrappers
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    })
}

// =============================================================================
// OBSERVABLE INNER
// =============================================================================

pub struct ObservableInner {
    raw: RawObject,
}

impl Drop for ObservableInner {
    fn drop(&mut self) {
        let id = self.raw.id();
        try_with_context(|ctx| {
            if let Ok(mut wrappers) = ctx.wrappers.try_borrow_mut() {
                if wrappers.get(&id).is_some_and(|w| w.strong_count() == 0) {
                    wrappers.remove(&id);
                }
            }
        });
    }
}

// =============================================================================
// OBSERVABLE
// =============================================================================

/// Tracking wrapper over a raw mapping or list.
#[derive(Clone)]
pub struct Observable(Rc<ObservableInner>);

impl Observable {
    /// Wrap a fresh empty mapping
    pub fn new_map() -> Self {
        wrap(&RawObject::map())
    }

    /// Wrap a fresh empty list
    pub fn new_list() -> Self {
        wrap(&RawObject::list())
    }

    pub fn raw(&self) -> &RawObject {
        &self.0.raw
    }

    pub fn id(&self) -> ObjectId {
        self.0.raw.id()
    }

    pub fn is_list(&self) -> bool {
        self.0.raw.is_list()
    }

    pub fn ptr_eq(&self, other: &Observable) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Parent scope, if this mapping inherits fields from one
    pub fn parent(&self) -> Option<Observable> {
        self.raw().parent().map(wrap)
    }

    /// New child scope that inherits every field of this one
    pub fn child_scope(&self) -> Observable {
        wrap(&RawObject::child_of(self.raw()))
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Read a field, tracking it for the active computation.
    ///
    /// Missing fields are inherited from the parent scope (tracked there as
    /// well) or read as `Undefined`. Objects come back wrapped.
    pub fn get(&self, field: impl Into<Field>) -> Value {
        let field = self.raw().normalize(field.into());
        track(self.id(), field.clone());

        match self.raw().get_own(&field) {
            Some(value) => present(value),
            None => match self.parent() {
                Some(parent) => parent.get(field),
                None => Value::Undefined,
            },
        }
    }

    /// Whether the field exists here or anywhere up the scope chain
    pub fn has(&self, field: impl Into<Field>) -> bool {
        let field = self.raw().normalize(field.into());
        track(self.id(), field.clone());
        self.raw().has_own(&field) || self.parent().is_some_and(|p| p.has(field))
    }

    /// Own field names (mappings) or indices (lists).
    ///
    /// Tracks `Keys` on mappings and `Length` on lists.
    pub fn keys(&self) -> Vec<Field> {
        track(self.id(), self.shape_field());
        self.raw().own_keys()
    }

    /// Number of elements (lists) or own fields (mappings)
    pub fn len(&self) -> usize {
        track(self.id(), self.shape_field());
        self.raw().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All own entries, tracking the shape and every entry read
    pub fn entries(&self) -> Vec<(Field, Value)> {
        self.keys()
            .into_iter()
            .map(|field| {
                let value = self.get(field.clone());
                (field, value)
            })
            .collect()
    }

    fn shape_field(&self) -> Field {
        if self.is_list() {
            Field::Length
        } else {
            Field::Keys
        }
    }

    // =========================================================================
    // WRITE
    // =========================================================================

    /// Write a field. Returns whether the stored value changed.
    ///
    /// Writing a field this scope does not own but an ancestor does writes it
    /// on that ancestor, so a child scope never shadows an inherited field.
    /// Assigning the value a field already holds notifies nobody.
    pub fn set(&self, field: impl Into<Field>, value: impl Into<Value>) -> bool {
        let field = self.raw().normalize(field.into());
        if !self.raw().accepts(&field) {
            trace!(?field, "write to a field this object cannot hold ignored");
            return false;
        }
        let value = value.into().into_stored();
        let is_list = self.is_list();
        let previous = self.raw().get_own(&field);

        if !is_list && previous.is_none() {
            if let Some(owner) = self.raw().find_owner(&field) {
                let old = owner.get_own(&field).unwrap_or_default();
                let changed = value != old;
                wrap(&owner).set(field.clone(), value);
                if changed {
                    trigger(self.id(), field);
                }
                return changed;
            }
        }

        let had = previous.is_some();
        let old = previous.unwrap_or_default();
        self.raw().put(&field, value.clone());

        if had && value == old {
            return false;
        }

        let is_length = field == Field::Length;
        trigger(self.id(), field);
        if is_list {
            if !is_length {
                trigger(self.id(), Field::Length);
            }
        } else if !had {
            trigger(self.id(), Field::Keys);
        }
        true
    }

    /// Remove an own field. Returns whether it existed.
    pub fn delete(&self, field: impl Into<Field>) -> bool {
        let field = self.raw().normalize(field.into());
        if !self.raw().has_own(&field) || field == Field::Length {
            return false;
        }
        self.raw().remove(&field);

        trigger(self.id(), field);
        trigger(self.id(), self.shape_field());
        true
    }

    // =========================================================================
    // LIST MUTATIONS
    // =========================================================================
    //
    // Each one runs with triggers suppressed and then fires exactly one
    // `Length` notification. On a mapping they do nothing.

    fn mutate_list<R>(&self, op: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        let result = without_triggers(|| match &mut *self.raw().data_mut() {
            RawData::List(list) => Some(op(list)),
            RawData::Map(_) => None,
        })?;

        trigger(self.id(), Field::Length);
        Some(result)
    }

    /// Append values; returns the new length
    pub fn push<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> usize {
        let values: Vec<Value> = values.into_iter().map(|v| v.into().into_stored()).collect();
        self.mutate_list(|list| {
            list.extend(values);
            list.len()
        })
        .unwrap_or_default()
    }

    /// Remove and return the last element
    pub fn pop(&self) -> Value {
        self.mutate_list(Vec::pop)
            .flatten()
            .map(present)
            .unwrap_or_default()
    }

    /// Remove and return the first element
    pub fn shift(&self) -> Value {
        self.mutate_list(|list| (!list.is_empty()).then(|| list.remove(0)))
            .flatten()
            .map(present)
            .unwrap_or_default()
    }

    /// Prepend values, keeping their order; returns the new length
    pub fn unshift<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> usize {
        let values: Vec<Value> = values.into_iter().map(|v| v.into().into_stored()).collect();
        self.mutate_list(|list| {
            list.splice(0..0, values);
            list.len()
        })
        .unwrap_or_default()
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    ///
    /// Out-of-range arguments are clamped. Returns the removed elements.
    pub fn splice<V: Into<Value>>(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = V>,
    ) -> Vec<Value> {
        let items: Vec<Value> = items.into_iter().map(|v| v.into().into_stored()).collect();
        self.mutate_list(|list| {
            let start = start.min(list.len());
            let end = start.saturating_add(delete_count).min(list.len());
            list.splice(start..end, items).collect::<Vec<_>>()
        })
        .unwrap_or_default()
        .into_iter()
        .map(present)
        .collect()
    }

    /// Stable sort with a comparator over the (wrapped) elements
    ///
    /// The comparator sorts a copy: it may read the list while it runs, and
    /// the stored order only changes once sorting has finished.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        let mut items = match &*self.raw().data() {
            RawData::List(list) => list.clone(),
            RawData::Map(_) => return,
        };
        without_triggers(|| {
            items.sort_by(|a, b| compare(&present(a.clone()), &present(b.clone())));
        });
        self.mutate_list(move |list| std::mem::replace(list, items));
    }

    pub fn reverse(&self) {
        self.mutate_list(|list| list.reverse());
    }
}

/// Wrap objects on the way out; everything else is returned as stored.
fn present(value: Value) -> Value {
    match value {
        Value::Object(raw) => Value::Observed(wrap(&raw)),
        other => other,
    }
}

impl PartialEq for Observable {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Observable({:?})", self.raw())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::computation::computation;
    use std::cell::Cell;

    fn runs_of(f: impl Fn() + 'static) -> (crate::Computation, Rc<Cell<u32>>) {
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();
        let c = computation(move || {
            f();
            runs_in.set(runs_in.get() + 1);
        });
        (c, runs)
    }

    #[test]
    fn nested_reads_return_the_same_wrapper() {
        let inner = RawObject::from_pairs([("x", 1)]);
        let outer = wrap(&RawObject::from_pairs([("inner", inner.clone())]));

        let a = outer.get("inner").as_observable().unwrap();
        let b = outer.get("inner").as_observable().unwrap();
        assert!(a.ptr_eq(&b));
        assert!(a.raw().ptr_eq(&inner));
    }

    #[test]
    fn wrapper_cache_entry_released_when_unreachable() {
        let raw = RawObject::map();
        let before = wrapper_count();
        {
            let _obs = wrap(&raw);
            assert_eq!(wrapper_count(), before + 1);
        }
        assert_eq!(wrapper_count(), before);
    }

    #[test]
    fn nodes_are_returned_as_is() {
        let obs = Observable::new_map();
        obs.set("el", crate::NodeId::new(7));
        assert_eq!(obs.get("el"), Value::Node(crate::NodeId::new(7)));
    }

    #[test]
    fn set_same_value_is_silent() {
        let obs = wrap(&RawObject::from_pairs([("a", 1)]));
        let o = obs.clone();
        let (_c, runs) = runs_of(move || {
            let _ = o.get("a");
        });

        assert!(!obs.set("a", 1));
        assert_eq!(runs.get(), 1);
        assert!(obs.set("a", 2));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn adding_a_field_notifies_key_readers() {
        let obs = Observable::new_map();
        let o = obs.clone();
        let (_c, runs) = runs_of(move || {
            let _ = o.keys();
        });

        obs.set("a", 1);
        assert_eq!(runs.get(), 2);
        obs.set("a", 2);
        assert_eq!(runs.get(), 2);
        obs.delete("a");
        assert_eq!(runs.get(), 3);
        assert!(!obs.delete("a"));
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn element_write_notifies_length_readers() {
        let list = wrap(&RawObject::from_values([1, 2]));
        let l = list.clone();
        let (_c, runs) = runs_of(move || {
            let _ = l.len();
        });

        list.set(0, 10);
        assert_eq!(runs.get(), 2);
        list.set(5, 1);
        assert_eq!(runs.get(), 3);
        assert_eq!(list.raw().len(), 6);
    }

    #[test]
    fn child_scope_reads_and_writes_through_to_owner() {
        let parent = wrap(&RawObject::from_pairs([("count", 1)]));
        let child = parent.child_scope();

        assert_eq!(child.get("count"), Value::from(1));

        let p = parent.clone();
        let (_c, parent_runs) = runs_of(move || {
            let _ = p.get("count");
        });

        assert!(child.set("count", 2));
        assert_eq!(parent.get("count"), Value::from(2));
        assert!(!child.raw().has_own(&Field::from("count")));
        assert_eq!(parent_runs.get(), 2);

        // Fields nobody owns are created on the child
        child.set("local", true);
        assert!(child.raw().has_own(&Field::from("local")));
        assert!(!parent.has("local"));
    }

    #[test]
    fn child_reader_notified_by_write_through_child() {
        let parent = wrap(&RawObject::from_pairs([("count", 1)]));
        let child = parent.child_scope();
        let c = child.clone();
        let (_c, runs) = runs_of(move || {
            let _ = c.get("count");
        });

        child.set("count", 5);
        // Notified once via the child entry and once via the parent entry
        assert!(runs.get() >= 2);
        assert_eq!(child.get("count"), Value::from(5));
    }

    #[test]
    fn bulk_mutations_fire_one_length_notification() {
        let list = Observable::new_list();
        let l = list.clone();
        let (_c, runs) = runs_of(move || {
            let _ = l.len();
        });

        assert_eq!(list.push([1, 2, 3]), 3);
        assert_eq!(runs.get(), 2);

        assert_eq!(list.unshift([0]), 4);
        assert_eq!(runs.get(), 3);

        list.reverse();
        assert_eq!(runs.get(), 4);

        assert_eq!(list.pop(), Value::from(0));
        assert_eq!(list.shift(), Value::from(3));
        assert_eq!(runs.get(), 6);
    }

    #[test]
    fn splice_clamps_and_returns_removed() {
        let list = wrap(&RawObject::from_values([1, 2, 3, 4]));
        let removed = list.splice(1, 2, ["a"]);
        assert_eq!(removed, vec![Value::from(2), Value::from(3)]);
        assert_eq!(list.raw().len(), 3);

        let removed = list.splice(10, 5, Vec::<Value>::new());
        assert!(removed.is_empty());
    }

    #[test]
    fn sort_by_orders_wrapped_objects() {
        let list = Observable::new_list();
        for id in [3, 1, 2] {
            list.push([RawObject::from_pairs([("id", id)])]);
        }
        list.sort_by(|a, b| {
            let a = a.as_observable().unwrap().get("id").as_f64().unwrap();
            let b = b.as_observable().unwrap().get("id").as_f64().unwrap();
            a.total_cmp(&b)
        });

        let ids: Vec<f64> = list
            .entries()
            .iter()
            .map(|(_, v)| v.as_observable().unwrap().get("id").as_f64().unwrap())
            .collect();
        assert_eq!(ids, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn panicking_comparator_leaves_the_list_intact() {
        let list = wrap(&RawObject::from_values([3, 1, 2]));
        let (_reader, runs) = {
            let l = list.clone();
            runs_of(move || {
                l.len();
            })
        };

        let l = list.clone();
        let _sorter = computation(move || l.sort_by(|_, _| panic!("comparator")));

        assert_eq!(list.len(), 3);
        assert_eq!(list.get(0), Value::from(3));
        assert_eq!(list.get(2), Value::from(2));
        assert_eq!(runs.get(), 1);

        list.push([4]);
        assert_eq!(list.len(), 4);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn comparator_can_read_the_list_being_sorted() {
        let list = wrap(&RawObject::from_values([3, 1, 2]));
        let seen = Rc::new(Cell::new(0));

        let l = list.clone();
        let seen_in = seen.clone();
        list.sort_by(move |a, b| {
            seen_in.set(l.len());
            a.as_f64().unwrap().total_cmp(&b.as_f64().unwrap())
        });

        assert_eq!(seen.get(), 3);
        assert_eq!(list.get(0), Value::from(1));
    }

    #[test]
    fn unholdable_fields_are_not_written() {
        let list = wrap(&RawObject::from_values([1, 2]));
        let map = wrap(&RawObject::from_pairs([("a", 1)]));
        let (_c, runs) = {
            let (l, m) = (list.clone(), map.clone());
            runs_of(move || {
                l.len();
                m.keys();
            })
        };

        assert!(!list.set("label", "x"));
        assert!(!map.set(Field::Keys, 5));
        assert_eq!(runs.get(), 1);
        assert_eq!(list.len(), 2);
        assert_eq!(map.keys().len(), 1);
    }

    #[test]
    fn list_mutators_on_a_map_do_nothing() {
        let map = Observable::new_map();
        assert_eq!(map.push([1]), 0);
        assert!(map.pop().is_undefined());
        assert!(map.is_empty());
    }

    #[test]
    fn storing_an_observable_stores_the_raw_object() {
        let child = Observable::new_map();
        let parent = Observable::new_map();
        parent.set("child", child.clone());

        let stored = parent.raw().get_own(&Field::from("child")).unwrap();
        assert!(matches!(stored, Value::Object(_)));
        assert_eq!(parent.get("child").as_observable().unwrap(), child);
    }
}
