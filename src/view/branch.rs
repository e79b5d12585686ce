// ============================================================================
// spark-weave - Branch Controller
// One optional subtree, mounted and unmounted on condition transitions
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::core::types::{NodeId, Value};
use crate::primitives::computation::{create_computation, next_tick_delegate, Computation};
use crate::primitives::scope::{on_cleanup, CleanupScope};
use crate::reactivity::tracking::untrack;
use crate::store::observable::Observable;
use crate::store::path::resolve_path;
use crate::view::tree::RenderTree;

/// Builds the guarded subtree. Computations created inside belong to it.
pub type BranchFactory = Box<dyn FnMut() -> Vec<NodeId>>;

struct Realized {
    nodes: Vec<NodeId>,
    cleanups: CleanupScope,
}

/// Single-slot reconciler for a boolean-gated subtree.
///
/// Only the transitions act: activating an active branch or deactivating an
/// inactive one does nothing. The subtree is placed right after `anchor`.
pub struct Branch<T: RenderTree> {
    tree: Rc<RefCell<T>>,
    anchor: NodeId,
    factory: BranchFactory,
    realized: Option<Realized>,
    mounts: usize,
    unmounts: usize,
}

impl<T: RenderTree> Branch<T> {
    pub fn new(
        tree: Rc<RefCell<T>>,
        anchor: NodeId,
        factory: impl FnMut() -> Vec<NodeId> + 'static,
    ) -> Self {
        Self {
            tree,
            anchor,
            factory: Box::new(factory),
            realized: None,
            mounts: 0,
            unmounts: 0,
        }
    }

    /// Mount or unmount the subtree. Returns whether anything changed.
    pub fn set_active(&mut self, active: bool) -> bool {
        match (active, self.realized.is_some()) {
            (true, false) => {
                self.mount();
                true
            }
            (false, true) => {
                self.unmount();
                true
            }
            _ => false,
        }
    }

    fn mount(&mut self) {
        let cleanups = CleanupScope::detached();
        let factory = &mut self.factory;
        let nodes = cleanups.run(|| untrack(|| factory())).unwrap_or_default();

        if !nodes.is_empty() {
            self.tree.borrow_mut().insert_after(self.anchor, &nodes);
        }
        self.mounts += 1;
        debug!(nodes = nodes.len(), "branch mounted");
        self.realized = Some(Realized { nodes, cleanups });
    }

    fn unmount(&mut self) {
        let Some(realized) = self.realized.take() else {
            return;
        };
        realized.cleanups.dispose();
        match self.tree.try_borrow_mut() {
            Ok(mut tree) => tree.remove(&realized.nodes),
            Err(_) => warn!("render tree busy; branch nodes left in place"),
        }
        self.unmounts += 1;
        debug!(nodes = realized.nodes.len(), "branch unmounted");
    }

    pub fn is_active(&self) -> bool {
        self.realized.is_some()
    }

    /// Nodes of the realized subtree (empty while inactive)
    pub fn nodes(&self) -> &[NodeId] {
        self.realized
            .as_ref()
            .map(|r| r.nodes.as_slice())
            .unwrap_or(&[])
    }

    pub fn mount_count(&self) -> usize {
        self.mounts
    }

    pub fn unmount_count(&self) -> usize {
        self.unmounts
    }
}

impl<T: RenderTree> Drop for Branch<T> {
    fn drop(&mut self) {
        self.unmount();
    }
}

// =============================================================================
// CONDITIONS
// =============================================================================

/// Coerce a condition value to a boolean.
///
/// Callables are invoked with `owner` as their context and their result is
/// coerced; a failing callable counts as false.
pub fn condition_holds(value: &Value, owner: Option<&Observable>) -> bool {
    match (value, owner) {
        (Value::Func(callable), Some(owner)) => match callable.call(owner) {
            Ok(result) => result.truthy(),
            Err(err) => {
                warn!(%err, "branch condition failed");
                false
            }
        },
        _ => value.truthy(),
    }
}

// =============================================================================
// BRANCH BINDING
// =============================================================================

/// Handle to a live branch binding.
pub struct BranchBinding<T: RenderTree> {
    branch: Rc<RefCell<Branch<T>>>,
    computation: Computation,
}

impl<T: RenderTree + 'static> BranchBinding<T> {
    pub fn is_active(&self) -> bool {
        self.branch.borrow().is_active()
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.branch.borrow().nodes().to_vec()
    }

    pub fn mount_count(&self) -> usize {
        self.branch.borrow().mount_count()
    }

    pub fn unmount_count(&self) -> usize {
        self.branch.borrow().unmount_count()
    }

    pub fn computation(&self) -> &Computation {
        &self.computation
    }

    /// Stop reacting and unmount
    pub fn dispose(&self) {
        self.computation.teardown();
        self.branch.borrow_mut().set_active(false);
    }
}

/// Gate a subtree on the value at `path` in `scope`.
///
/// A leading `!` negates the condition: `"!hidden"` mounts while `hidden`
/// is falsy.
///
/// Re-evaluation is batched onto the next flush, so flipping the condition
/// back and forth before a flush settles on the final value only.
///
/// # Example
///
/// ```
/// use spark_weave::{flush, when, wrap, MemoryTree, RawObject};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let tree = Rc::new(RefCell::new(MemoryTree::new()));
/// let root = tree.borrow().root();
/// let anchor = tree.borrow_mut().create("anchor");
/// tree.borrow_mut().append(root, anchor);
///
/// let scope = wrap(&RawObject::from_pairs([("open", false)]));
/// let t = tree.clone();
/// let binding = when(tree.clone(), anchor, &scope, "open", move || {
///     vec![t.borrow_mut().create("panel")]
/// });
/// assert!(!binding.is_active());
///
/// scope.set("open", true);
/// flush();
/// assert_eq!(tree.borrow().labels(root), vec!["anchor", "panel"]);
/// ```
pub fn when<T, F>(
    tree: Rc<RefCell<T>>,
    anchor: NodeId,
    scope: &Observable,
    path: &str,
    factory: F,
) -> BranchBinding<T>
where
    T: RenderTree + 'static,
    F: FnMut() -> Vec<NodeId> + 'static,
{
    let scope = scope.clone();
    let (negated, path) = match path.trim().strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, path.trim()),
    };
    let path: Rc<str> = path.into();
    when_with(tree, anchor, factory, move || {
        let resolved = resolve_path(&scope, &path);
        condition_holds(&resolved.value, resolved.owner.as_ref()) != negated
    })
}

/// Like [`when`], with the condition supplied by a closure.
pub fn when_with<T, F, C>(
    tree: Rc<RefCell<T>>,
    anchor: NodeId,
    factory: F,
    mut condition: C,
) -> BranchBinding<T>
where
    T: RenderTree + 'static,
    F: FnMut() -> Vec<NodeId> + 'static,
    C: FnMut() -> bool + 'static,
{
    let branch = Rc::new(RefCell::new(Branch::new(tree, anchor, factory)));

    let driven = branch.clone();
    let computation = create_computation(
        Box::new(move || {
            let active = condition();
            match driven.try_borrow_mut() {
                Ok(mut branch) => {
                    branch.set_active(active);
                    Ok(())
                }
                Err(_) => Err(crate::ReactiveError::body(
                    "branch re-entered while mounting",
                )),
            }
        }),
        Some(next_tick_delegate()),
    );

    let owned = branch.clone();
    on_cleanup(move || {
        if let Ok(mut branch) = owned.try_borrow_mut() {
            branch.set_active(false);
        }
    });

    BranchBinding {
        branch,
        computation,
    }
}

// =============================================================================
// TESTS
// =============================================================================
