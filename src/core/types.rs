// ============================================================================
// spark-weave - Type Definitions
// Dynamic values, identities and field names shared by every layer
// ============================================================================
//
// The state graph is dynamically shaped: a mapping or a list holds `Value`s,
// and a `Value` may itself be another mapping or list. Objects are shared by
// reference (`RawObject` is an `Rc` handle), so two values naming the same
// object compare equal by identity, never by content.
// =============================================================================

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::error::Result;
use crate::store::observable::{wrap, Observable};
use crate::store::raw::RawObject;

// =============================================================================
// IDENTITIES
// =============================================================================

/// Stable identity of a raw object, used as the key of every side table.
///
/// Ids come from a monotonically increasing counter and are never reused, so a
/// stale id can never alias a newer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Identity of a schedulable job (computation or task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque handle to a node owned by the render tree.
///
/// The runtime never looks inside a node and never wraps one in an
/// observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

// =============================================================================
// FIELD
// =============================================================================

/// Name of a tracked slot on an object.
///
/// `Length` and `Keys` are synthetic: nothing is stored under them, they only
/// exist so that size-sensitive and enumeration-sensitive readers have
/// something to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Name(Rc<str>),
    Index(usize),
    Length,
    Keys,
}

impl Field {
    /// Normalize a field for a list target: numeric names become indices and
    /// `"length"` becomes the synthetic length field.
    pub(crate) fn for_list(self) -> Field {
        match self {
            Field::Name(name) => {
                if &*name == "length" {
                    Field::Length
                } else if let Ok(index) = name.parse::<usize>() {
                    Field::Index(index)
                } else {
                    Field::Name(name)
                }
            }
            other => other,
        }
    }

    /// Normalize a field for a mapping target: indices become names.
    pub(crate) fn for_map(self) -> Field {
        match self {
            Field::Index(index) => Field::Name(index.to_string().into()),
            Field::Length => Field::Name("length".into()),
            other => other,
        }
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Field::Name(name.into())
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Field::Name(name.into())
    }
}

impl From<Rc<str>> for Field {
    fn from(name: Rc<str>) -> Self {
        Field::Name(name)
    }
}

impl From<usize> for Field {
    fn from(index: usize) -> Self {
        Field::Index(index)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Name(name) => f.write_str(name),
            Field::Index(index) => write!(f, "{index}"),
            Field::Length => f.write_str("<length>"),
            Field::Keys => f.write_str("<keys>"),
        }
    }
}

// =============================================================================
// CALLABLE
// =============================================================================

type CallableFn = dyn Fn(&Observable) -> Result<Value>;

/// A function stored in the state graph (handler, computed getter, hook).
///
/// It is always invoked with the object that owns it, which replaces implicit
/// call-site receiver binding.
#[derive(Clone)]
pub struct Callable(Rc<CallableFn>);

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Observable) -> Result<Value> + 'static,
    {
        Self(Rc::new(f))
    }

    /// Invoke with the owning object as context
    pub fn call(&self, this: &Observable) -> Result<Value> {
        (self.0)(this)
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callable(..)")
    }
}

// =============================================================================
// VALUE
// =============================================================================

/// A value in the state graph.
///
/// `Object` holds a raw object as stored inside another raw object.
/// `Observed` is what reads through an [`Observable`] hand back for objects:
/// the same raw object behind its cached wrapper. Both compare equal when they
/// name the same object.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(RawObject),
    Observed(Observable),
    Node(NodeId),
    Func(Callable),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `Undefined` or `Null`
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Observed(_))
    }

    /// Identity of the referenced object, if this value is one
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Value::Object(raw) => Some(raw.id()),
            Value::Observed(obs) => Some(obs.id()),
            _ => None,
        }
    }

    /// The raw object behind this value, if any
    pub fn as_raw(&self) -> Option<RawObject> {
        match self {
            Value::Object(raw) => Some(raw.clone()),
            Value::Observed(obs) => Some(obs.raw().clone()),
            _ => None,
        }
    }

    /// The observable wrapper for this value, wrapping lazily if needed
    pub fn as_observable(&self) -> Option<Observable> {
        match self {
            Value::Object(raw) => Some(wrap(raw)),
            Value::Observed(obs) => Some(obs.clone()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Loose truthiness: `Undefined`, `Null`, `false`, `0`, `NaN` and the
    /// empty string are false; everything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Observed(_) | Value::Node(_) | Value::Func(_) => true,
        }
    }

    /// Strip the wrapper from an observed object so it can be stored raw.
    pub(crate) fn into_stored(self) -> Value {
        match self {
            Value::Observed(obs) => Value::Object(obs.raw().clone()),
            other => other,
        }
    }

    /// Canonical string form used for structural row keys.
    pub fn key_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::Object(raw) => format!("object#{}", raw.id().get()),
            Value::Observed(obs) => format!("object#{}", obs.id().get()),
            Value::Node(node) => format!("node#{}", node.index()),
            Value::Func(_) => "function".to_string(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl PartialEq for Value {
    /// Identity for objects, nodes and callables; plain equality otherwise.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            (a, b) if a.is_object() && b.is_object() => a.object_id() == b.object_id(),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<RawObject> for Value {
    fn from(raw: RawObject) -> Self {
        Value::Object(raw)
    }
}

impl From<Observable> for Value {
    fn from(obs: Observable) -> Self {
        Value::Observed(obs)
    }
}

impl From<NodeId> for Value {
    fn from(node: NodeId) -> Self {
        Value::Node(node)
    }
}

impl From<Callable> for Value {
    fn from(f: Callable) -> Self {
        Value::Func(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(!Value::Undefined.truthy());
        assert!(!Value::Null.truthy());
        assert!(!Value::from(0).truthy());
        assert!(!Value::from(f64::NAN).truthy());
        assert!(!Value::from("").truthy());
        assert!(Value::from("x").truthy());
        assert!(Value::from(-1).truthy());
        assert!(Value::Object(RawObject::map()).truthy());
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = RawObject::map();
        let b = RawObject::map();
        assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
        assert_ne!(Value::Object(a.clone()), Value::Object(b));
        assert_eq!(Value::Object(a.clone()), Value::Observed(wrap(&a)));
    }

    #[test]
    fn nan_is_never_equal() {
        assert_ne!(Value::from(f64::NAN), Value::from(f64::NAN));
    }

    #[test]
    fn key_string_formats_integers_without_fraction() {
        assert_eq!(Value::from(3).key_string(), "3");
        assert_eq!(Value::from(2.5).key_string(), "2.5");
        assert_eq!(Value::from("a").key_string(), "a");
        assert_eq!(Value::Null.key_string(), "null");
    }

    #[test]
    fn field_normalization() {
        assert_eq!(Field::from("2").for_list(), Field::Index(2));
        assert_eq!(Field::from("length").for_list(), Field::Length);
        assert_eq!(Field::from("name").for_list(), Field::from("name"));
        assert_eq!(Field::Index(4).for_map(), Field::from("4"));
    }
}
