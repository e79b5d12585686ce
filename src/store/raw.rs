// ============================================================================
// spark-weave - Raw Objects
// Plain, untracked state: a mapping or a list, shared by reference
// ============================================================================
//
// A raw object is owned by whoever built it. The observable layer never
// copies it; it only wraps it. Mappings may carry a parent pointer, which is
// how nested scopes inherit fields from the scope they were created in.
// ============================================================================

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::core::types::{Field, ObjectId, Value};

// =============================================================================
// RAW DATA
// =============================================================================

/// Storage behind a raw object
#[derive(Debug, Clone)]
pub enum RawData {
    /// Named fields in insertion order
    Map(IndexMap<Rc<str>, Value>),
    List(Vec<Value>),
}

impl RawData {
    pub fn len(&self) -> usize {
        match self {
            RawData::Map(map) => map.len(),
            RawData::List(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct RawInner {
    id: ObjectId,
    data: RefCell<RawData>,
    parent: Option<RawObject>,
}

// =============================================================================
// RAW OBJECT
// =============================================================================

/// Shared handle to a plain mapping or list.
///
/// Cloning the handle never copies the data: both clones name the same
/// object and share one [`ObjectId`].
#[derive(Clone)]
pub struct RawObject(Rc<RawInner>);

impl RawObject {
    fn from_data(data: RawData, parent: Option<RawObject>) -> Self {
        Self(Rc::new(RawInner {
            id: ObjectId::next(),
            data: RefCell::new(data),
            parent,
        }))
    }

    /// Empty mapping
    pub fn map() -> Self {
        Self::from_data(RawData::Map(IndexMap::new()), None)
    }

    /// Empty list
    pub fn list() -> Self {
        Self::from_data(RawData::List(Vec::new()), None)
    }

    /// Mapping built from `(name, value)` pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into().into_stored()))
            .collect();
        Self::from_data(RawData::Map(map), None)
    }

    /// List built from values
    pub fn from_values<V, I>(values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let list = values.into_iter().map(|v| v.into().into_stored()).collect();
        Self::from_data(RawData::List(list), None)
    }

    /// Empty mapping that inherits fields from `parent`
    pub fn child_of(parent: &RawObject) -> Self {
        Self::from_data(RawData::Map(IndexMap::new()), Some(parent.clone()))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn is_list(&self) -> bool {
        matches!(*self.0.data.borrow(), RawData::List(_))
    }

    /// Parent in the scope chain
    pub fn parent(&self) -> Option<&RawObject> {
        self.0.parent.as_ref()
    }

    pub fn ptr_eq(&self, other: &RawObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn len(&self) -> usize {
        self.0.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the underlying data
    pub fn data(&self) -> Ref<'_, RawData> {
        self.0.data.borrow()
    }

    /// Mutably borrow the underlying data. Changes made here are not observed.
    pub fn data_mut(&self) -> RefMut<'_, RawData> {
        self.0.data.borrow_mut()
    }

    /// Normalize a field name for this object's shape
    pub(crate) fn normalize(&self, field: Field) -> Field {
        if self.is_list() {
            field.for_list()
        } else {
            field.for_map()
        }
    }

    /// Read an own field without tracking. `Length` is answered for lists.
    pub fn get_own(&self, field: &Field) -> Option<Value> {
        match (&*self.data(), field) {
            (RawData::Map(map), Field::Name(name)) => map.get(name).cloned(),
            (RawData::List(list), Field::Index(i)) => list.get(*i).cloned(),
            (RawData::List(list), Field::Length) => Some(Value::from(list.len())),
            _ => None,
        }
    }

    pub fn has_own(&self, field: &Field) -> bool {
        match (&*self.data(), field) {
            (RawData::Map(map), Field::Name(name)) => map.contains_key(name),
            (RawData::List(list), Field::Index(i)) => *i < list.len(),
            (RawData::List(_), Field::Length) => true,
            _ => false,
        }
    }

    /// Whether `field` names a storable slot: names on maps, indices and
    /// `Length` on lists.
    pub fn accepts(&self, field: &Field) -> bool {
        matches!(
            (&*self.data(), field),
            (RawData::Map(_), Field::Name(_))
                | (RawData::List(_), Field::Index(_) | Field::Length)
        )
    }

    /// First ancestor (excluding `self`) that owns `field`
    pub fn find_owner(&self, field: &Field) -> Option<RawObject> {
        let mut current = self.parent();
        while let Some(object) = current {
            if object.has_own(field) {
                return Some(object.clone());
            }
            current = object.parent();
        }
        None
    }

    /// Untracked write of an own field.
    ///
    /// List writes past the end pad with `Undefined`. Returns the previous
    /// value, if the field existed.
    pub fn put(&self, field: &Field, value: Value) -> Option<Value> {
        let value = value.into_stored();
        match (&mut *self.data_mut(), field) {
            (RawData::Map(map), Field::Name(name)) => map.insert(name.clone(), value),
            (RawData::List(list), Field::Index(i)) => {
                if *i < list.len() {
                    Some(std::mem::replace(&mut list[*i], value))
                } else {
                    list.resize(*i, Value::Undefined);
                    list.push(value);
                    None
                }
            }
            (RawData::List(list), Field::Length) => {
                let len = value.as_f64().map_or(list.len(), |n| n.max(0.0) as usize);
                let old = list.len();
                list.resize(len, Value::Undefined);
                Some(Value::from(old))
            }
            _ => None,
        }
    }

    /// Untracked removal of an own field. List entries become `Undefined`.
    pub fn remove(&self, field: &Field) -> Option<Value> {
        match (&mut *self.data_mut(), field) {
            (RawData::Map(map), Field::Name(name)) => map.shift_remove(name),
            (RawData::List(list), Field::Index(i)) if *i < list.len() => {
                Some(std::mem::take(&mut list[*i]))
            }
            _ => None,
        }
    }

    /// Own field names (mappings) or indices (lists), untracked
    pub fn own_keys(&self) -> Vec<Field> {
        match &*self.data() {
            RawData::Map(map) => map.keys().map(|k| Field::Name(k.clone())).collect(),
            RawData::List(list) => (0..list.len()).map(Field::Index).collect(),
        }
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_list() { "list" } else { "map" };
        write!(f, "RawObject({kind}#{}, len {})", self.id().get(), self.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let a = RawObject::map();
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), RawObject::map().id());
    }

    #[test]
    fn put_and_get_own() {
        let map = RawObject::from_pairs([("a", 1)]);
        assert_eq!(map.get_own(&Field::from("a")), Some(Value::from(1)));
        assert_eq!(map.put(&Field::from("a"), Value::from(2)), Some(Value::from(1)));
        assert_eq!(map.put(&Field::from("b"), Value::from(3)), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn list_put_past_end_pads() {
        let list = RawObject::from_values([1]);
        list.put(&Field::Index(3), Value::from(4));
        assert_eq!(list.len(), 4);
        assert!(list.get_own(&Field::Index(1)).unwrap().is_undefined());
    }

    #[test]
    fn find_owner_walks_the_parent_chain() {
        let root = RawObject::from_pairs([("shared", 1)]);
        let middle = RawObject::child_of(&root);
        let leaf = RawObject::child_of(&middle);

        let owner = leaf.find_owner(&Field::from("shared")).unwrap();
        assert!(owner.ptr_eq(&root));
        assert!(leaf.find_owner(&Field::from("missing")).is_none());
    }

    #[test]
    fn remove_preserves_insertion_order() {
        let map = RawObject::from_pairs([("a", 1), ("b", 2), ("c", 3)]);
        map.remove(&Field::from("b"));
        let keys: Vec<_> = map.own_keys().iter().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }
}
