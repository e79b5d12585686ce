// ============================================================================
// spark-weave - Path Resolution
// Dotted paths over observable scopes, with silent-miss semantics
// ============================================================================
//
// `resolve_path(scope, "user.profile.name")` walks one field per segment,
// tracking every read. A missing intermediate never fails: the result is
// `Undefined` with no owner, and a trace event records the miss so a host
// can surface it while the binding keeps working.
// ============================================================================

use tracing::trace;

use crate::core::error::{ReactiveError, Result};
use crate::core::types::Value;
use crate::store::observable::Observable;

/// Outcome of resolving a path.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub value: Value,
    /// Object the last segment was read from; the context callables run with
    pub owner: Option<Observable>,
}

impl Resolved {
    fn missing() -> Self {
        Self {
            value: Value::Undefined,
            owner: None,
        }
    }
}

/// Resolve a dotted path against a scope.
///
/// # Example
///
/// ```
/// use spark_weave::{resolve_path, wrap, RawObject, Value};
///
/// let user = RawObject::from_pairs([("name", "ada")]);
/// let scope = wrap(&RawObject::from_pairs([("user", user)]));
///
/// assert_eq!(resolve_path(&scope, "user.name").value, Value::from("ada"));
/// assert!(resolve_path(&scope, "user.missing.name").value.is_undefined());
/// ```
pub fn resolve_path(scope: &Observable, path: &str) -> Resolved {
    let path = path.trim();
    if path.is_empty() {
        return Resolved {
            value: Value::Observed(scope.clone()),
            owner: None,
        };
    }

    let mut owner = scope.clone();
    let mut segments = path.split('.').map(str::trim).peekable();

    while let Some(segment) = segments.next() {
        let value = owner.get(segment);

        if segments.peek().is_none() {
            if value.is_undefined() {
                trace!(path, "path resolved to undefined");
            }
            return Resolved {
                value,
                owner: Some(owner),
            };
        }

        match value.as_observable() {
            Some(next) => owner = next,
            None => {
                trace!(path, segment, "missing intermediate in path");
                return Resolved::missing();
            }
        }
    }

    Resolved::missing()
}

/// Resolve a path and, if it names a callable, invoke it with its owner.
///
/// Non-callable values are returned as they are.
pub fn evaluate_path(scope: &Observable, path: &str) -> Result<Value> {
    let Resolved { value, owner } = resolve_path(scope, path);
    match (&value, owner) {
        (Value::Func(callable), Some(owner)) => callable.call(&owner),
        _ => Ok(value),
    }
}

/// Resolve a path that must name a callable and invoke it with its owner.
pub fn call_path(scope: &Observable, path: &str) -> Result<Value> {
    let Resolved { value, owner } = resolve_path(scope, path);
    match (value, owner) {
        (Value::Func(callable), Some(owner)) => callable.call(&owner),
        _ => Err(ReactiveError::NotCallable {
            path: path.to_string(),
        }),
    }
}

// =============================================================================
// TESTS
// =============================================================================
