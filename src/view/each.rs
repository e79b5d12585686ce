// ============================================================================
// spark-weave - List Binding
// A reconciler driven by a scheduled computation
// ============================================================================
//
// `each` parses an `item in items` / `(item, index) in items` directive,
// resolves the collection path against the enclosing scope on every run, and
// reconciles. Re-runs are batched onto the next flush. A directive that does
// not parse produces an inert binding and a warning, never an error.
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use tracing::warn;

use crate::core::error::{ReactiveError, Result};
use crate::core::types::{NodeId, Value};
use crate::primitives::computation::{create_computation, next_tick_delegate, Computation};
use crate::primitives::scope::on_cleanup;
use crate::store::observable::Observable;
use crate::store::path::resolve_path;
use crate::view::reconcile::{Aliases, KeyExtractor, ReconcileStats, Reconciler, RowKey};
use crate::view::tree::RenderTree;

// =============================================================================
// DIRECTIVE
// =============================================================================

/// Parsed form of `item in items` or `(item, index) in items`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDirective {
    pub aliases: Aliases,
    /// Dotted path of the collection
    pub source: Rc<str>,
}

impl ListDirective {
    /// Parse a list directive.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_weave::ListDirective;
    ///
    /// let d = ListDirective::parse("(todo, i) in state.todos").unwrap();
    /// assert_eq!(&*d.aliases.item, "todo");
    /// assert_eq!(d.aliases.index.as_deref(), Some("i"));
    /// assert_eq!(&*d.source, "state.todos");
    ///
    /// assert!(ListDirective::parse("todos").is_err());
    /// ```
    pub fn parse(expression: &str) -> Result<Self> {
        let malformed = || ReactiveError::MalformedDirective {
            expression: expression.to_string(),
        };

        let (lhs, rhs) = split_on_in(expression).ok_or_else(malformed)?;

        let lhs: String = lhs.chars().filter(|c| *c != '(' && *c != ')').collect();
        let mut names = lhs.split(',').map(str::trim);
        let item = names.next().filter(|n| !n.is_empty()).ok_or_else(malformed)?;
        let index = names.next().filter(|n| !n.is_empty());

        let source = rhs.trim();
        if source.is_empty() {
            return Err(malformed());
        }

        let mut aliases = Aliases::new(item);
        if let Some(index) = index {
            aliases = aliases.with_index(index);
        }
        Ok(Self {
            aliases,
            source: source.into(),
        })
    }
}

impl FromStr for ListDirective {
    type Err = ReactiveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split at the first ` in ` that has whitespace on both sides and a
/// non-empty left-hand side.
fn split_on_in(expression: &str) -> Option<(&str, &str)> {
    let bytes = expression.as_bytes();
    expression.match_indices("in").find_map(|(at, _)| {
        let before = at.checked_sub(1).map(|i| bytes[i])?;
        let after = *bytes.get(at + 2)?;
        if !before.is_ascii_whitespace() || !after.is_ascii_whitespace() {
            return None;
        }
        let lhs = expression[..at].trim();
        (!lhs.is_empty()).then(|| (lhs, &expression[at + 2..]))
    })
}

// =============================================================================
// LIST BINDING
// =============================================================================

/// Handle to a live list binding.
pub struct ListBinding<T: RenderTree> {
    reconciler: Option<Rc<RefCell<Reconciler<T>>>>,
    computation: Option<Computation>,
}

impl<T: RenderTree + 'static> ListBinding<T> {
    fn inert() -> Self {
        Self {
            reconciler: None,
            computation: None,
        }
    }

    /// True when the directive did not parse and nothing is bound
    pub fn is_inert(&self) -> bool {
        self.reconciler.is_none()
    }

    pub fn computation(&self) -> Option<&Computation> {
        self.computation.as_ref()
    }

    /// Keys of the mounted rows, in order
    pub fn keys(&self) -> Vec<RowKey> {
        self.reconciler
            .as_ref()
            .map(|r| r.borrow().keys())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.reconciler.as_ref().map_or(0, |r| r.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Totals across every pass so far
    pub fn stats(&self) -> ReconcileStats {
        self.reconciler
            .as_ref()
            .map(|r| r.borrow().totals())
            .unwrap_or_default()
    }

    /// Run `f` against the reconciler (row scopes, individual rows)
    pub fn with_reconciler<R>(&self, f: impl FnOnce(&Reconciler<T>) -> R) -> Option<R> {
        self.reconciler.as_ref().map(|r| f(&r.borrow()))
    }

    /// Stop reacting and tear down every row
    pub fn dispose(&self) {
        if let Some(computation) = &self.computation {
            computation.teardown();
        }
        if let Some(reconciler) = &self.reconciler {
            reconciler.borrow_mut().dispose();
        }
    }
}

/// Bind a keyed list directive to the rows after `anchor`.
///
/// The collection path is resolved against `scope`. Each row gets a child
/// scope of `scope` holding the aliases, and `factory` builds its nodes with
/// that scope. When a cleanup scope is active, disposing it disposes the
/// binding.
///
/// # Example
///
/// ```
/// use spark_weave::{each, flush, wrap, KeyExtractor, MemoryTree, RawObject};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let tree = Rc::new(RefCell::new(MemoryTree::new()));
/// let root = tree.borrow().root();
/// let anchor = tree.borrow_mut().create("anchor");
/// tree.borrow_mut().append(root, anchor);
///
/// let todos = RawObject::from_values(["write", "test"]);
/// let scope = wrap(&RawObject::from_pairs([("todos", todos)]));
///
/// let t = tree.clone();
/// let binding = each(tree.clone(), anchor, &scope, "todo in todos", KeyExtractor::Structural, move |row| {
///     let label = row.get("todo").as_str().unwrap_or_default().to_string();
///     vec![t.borrow_mut().create(label)]
/// });
/// assert_eq!(binding.len(), 2);
///
/// scope.get("todos").as_observable().unwrap().push(["ship"]);
/// flush();
/// assert_eq!(tree.borrow().labels(root), vec!["anchor", "write", "test", "ship"]);
/// ```
pub fn each<T, F>(
    tree: Rc<RefCell<T>>,
    anchor: NodeId,
    scope: &Observable,
    expression: &str,
    key: KeyExtractor,
    factory: F,
) -> ListBinding<T>
where
    T: RenderTree + 'static,
    F: FnMut(&Observable) -> Vec<NodeId> + 'static,
{
    let directive = match ListDirective::parse(expression) {
        Ok(directive) => directive,
        Err(err) => {
            warn!(%err, "list binding ignored");
            return ListBinding::inert();
        }
    };

    let source_scope = scope.clone();
    let source_path = directive.source.clone();
    each_with(
        tree,
        anchor,
        scope,
        directive.aliases,
        move || resolve_path(&source_scope, &source_path).value,
        key,
        factory,
    )
}

/// Like [`each`], with the collection supplied by a closure.
///
/// Every read the closure performs is tracked by the binding.
pub fn each_with<T, S, F>(
    tree: Rc<RefCell<T>>,
    anchor: NodeId,
    scope: &Observable,
    aliases: Aliases,
    mut source: S,
    key: KeyExtractor,
    factory: F,
) -> ListBinding<T>
where
    T: RenderTree + 'static,
    S: FnMut() -> Value + 'static,
    F: FnMut(&Observable) -> Vec<NodeId> + 'static,
{
    let reconciler = Rc::new(RefCell::new(
        Reconciler::new(tree, anchor, scope.clone(), aliases, factory).with_key(key),
    ));

    let driven = reconciler.clone();
    let computation = create_computation(
        Box::new(move || {
            let collection = source();
            match driven.try_borrow_mut() {
                Ok(mut reconciler) => {
                    reconciler.reconcile(&collection);
                    Ok(())
                }
                Err(_) => Err(ReactiveError::body("list binding re-entered while reconciling")),
            }
        }),
        Some(next_tick_delegate()),
    );

    let owned = reconciler.clone();
    on_cleanup(move || {
        if let Ok(mut reconciler) = owned.try_borrow_mut() {
            reconciler.dispose();
        }
    });

    ListBinding {
        reconciler: Some(reconciler),
        computation: Some(computation),
    }
}

// =============================================================================
// TESTS
// =============================================================================
