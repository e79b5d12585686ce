// ============================================================================
// spark-weave - In-Memory Render Tree
// Index arena of labelled nodes, used by hosts without a real view layer
// ============================================================================
//
// Every node lives in one arena slot forever; detaching only clears its parent
// link. Structural calls are counted so callers can assert on how much the
// tree actually moved.
// ============================================================================

use crate::core::types::NodeId;
use crate::view::tree::RenderTree;

#[derive(Debug, Clone)]
struct NodeData {
    label: String,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Counters for structural operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// `insert_after` calls (one per relocated or newly placed run)
    pub insert_calls: usize,
    pub nodes_inserted: usize,
    pub nodes_removed: usize,
}

/// Arena-backed [`RenderTree`].
///
/// # Example
///
/// ```
/// use spark_weave::{MemoryTree, RenderTree};
///
/// let mut tree = MemoryTree::new();
/// let root = tree.root();
/// let anchor = tree.create("anchor");
/// tree.append(root, anchor);
///
/// let a = tree.create("a");
/// let b = tree.create("b");
/// tree.insert_after(anchor, &[a, b]);
/// assert_eq!(tree.labels(root), vec!["anchor", "a", "b"]);
///
/// tree.insert_after(anchor, &[b]);
/// assert_eq!(tree.labels(root), vec!["anchor", "b", "a"]);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryTree {
    nodes: Vec<NodeData>,
    root: NodeId,
    stats: TreeStats,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId::new(0),
            stats: TreeStats::default(),
        };
        tree.root = tree.create("root");
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Mint a detached node
    pub fn create(&mut self, label: impl Into<String>) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(NodeData {
            label: label.into(),
            text: None,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Make `child` the last child of `parent`, detaching it first
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        if self.node(parent).is_none() || self.node(child).is_none() {
            return;
        }
        self.detach(child);
        if let Some(data) = self.node_mut(parent) {
            data.children.push(child);
        }
        if let Some(data) = self.node_mut(child) {
            data.parent = Some(parent);
        }
    }

    pub fn children(&self, parent: NodeId) -> &[NodeId] {
        self.node(parent)
            .map(|data| data.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|data| data.parent)
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.parent(node).is_some()
    }

    pub fn label(&self, node: NodeId) -> Option<&str> {
        self.node(node).map(|data| data.label.as_str())
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        self.node(node).and_then(|data| data.text.as_deref())
    }

    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) {
        if let Some(data) = self.node_mut(node) {
            data.text = Some(text.into());
        }
    }

    /// Labels of the children of `parent`, in order
    pub fn labels(&self, parent: NodeId) -> Vec<String> {
        self.children(parent)
            .iter()
            .filter_map(|&child| self.label(child).map(str::to_string))
            .collect()
    }

    /// Text of the children of `parent` that carry any, in order
    pub fn texts(&self, parent: NodeId) -> Vec<String> {
        self.children(parent)
            .iter()
            .filter_map(|&child| self.text(child).map(str::to_string))
            .collect()
    }

    /// Number of nodes ever created, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = TreeStats::default();
    }

    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.index())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.index())
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        if let Some(data) = self.node_mut(parent) {
            data.children.retain(|&c| c != node);
        }
        if let Some(data) = self.node_mut(node) {
            data.parent = None;
        }
    }
}

impl RenderTree for MemoryTree {
    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let siblings = self.children(self.parent(node)?);
        let position = siblings.iter().position(|&c| c == node)?;
        siblings.get(position + 1).copied()
    }

    fn insert_after(&mut self, anchor: NodeId, nodes: &[NodeId]) {
        let Some(parent) = self.parent(anchor) else {
            return;
        };
        let placed: Vec<NodeId> = nodes
            .iter()
            .copied()
            .filter(|&n| n != anchor && self.node(n).is_some())
            .collect();
        for &node in &placed {
            self.detach(node);
        }

        let Some(position) = self.children(parent).iter().position(|&c| c == anchor) else {
            return;
        };
        for &node in &placed {
            if let Some(data) = self.node_mut(node) {
                data.parent = Some(parent);
            }
        }
        if let Some(data) = self.node_mut(parent) {
            let at = position + 1;
            data.children.splice(at..at, placed.iter().copied());
        }

        self.stats.insert_calls += 1;
        self.stats.nodes_inserted += placed.len();
    }

    fn remove(&mut self, nodes: &[NodeId]) {
        for &node in nodes {
            if self.is_attached(node) {
                self.detach(node);
                self.stats.nodes_removed += 1;
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
