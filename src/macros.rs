// ============================================================================
// spark-weave - Ergonomic Macros
// ============================================================================

/// Helper macro to clone variables into a move closure.
///
/// This reduces the boilerplate of manually cloning `Observable` or `Rc`
/// handles before moving them into a closure.
///
/// # Usage
///
/// ```rust
/// use spark_weave::{cloned, computation, Observable};
///
/// let state = Observable::new_map();
/// let _c = computation(cloned!(state => move || {
///     let _ = state.get("count");
/// }));
/// state.set("count", 1);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Create an inline computation with automatic variable capturing.
///
/// Wraps `computation(cloned!(... => move || ...))`.
///
/// # Usage
///
/// ```rust
/// use spark_weave::{computation, Observable};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let state = Observable::new_map();
/// let seen = Rc::new(Cell::new(0.0));
///
/// let _c = computation!(state, seen => {
///     seen.set(state.get("n").as_f64().unwrap_or_default());
/// });
///
/// state.set("n", 4);
/// assert_eq!(seen.get(), 4.0);
/// ```
#[macro_export]
macro_rules! computation {
    // Case 1: With dependencies
    ($($deps:ident),+ => $body:expr) => {
        $crate::computation($crate::cloned!($($deps),+ => move || { $body; }))
    };
    // Case 2: No dependencies
    ($body:expr) => {
        $crate::computation(move || { $body; })
    };
}

/// Build a raw mapping from `name => value` pairs.
///
/// # Usage
///
/// ```rust
/// use spark_weave::{object, wrap, Value};
///
/// let user = object! { "name" => "ada", "age" => 36 };
/// assert_eq!(wrap(&user).get("age"), Value::from(36));
/// ```
#[macro_export]
macro_rules! object {
    () => {
        $crate::RawObject::map()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {
        $crate::RawObject::from_pairs([
            $( ($name, $crate::Value::from($value)) ),+
        ])
    };
}

/// Build a raw list from values of any convertible type.
///
/// # Usage
///
/// ```rust
/// use spark_weave::{list, object, wrap};
///
/// let items = list![object! { "id" => 1 }, object! { "id" => 2 }];
/// assert_eq!(wrap(&items).len(), 2);
///
/// let mixed = list![1, "two", true];
/// assert_eq!(mixed.len(), 3);
/// ```
#[macro_export]
macro_rules! list {
    () => {
        $crate::RawObject::list()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::RawObject::from_values([
            $( $crate::Value::from($value) ),+
        ])
    };
}
