// ============================================================================
// spark-weave - Render Tree Seam
// The three structural operations the reconciler and branches need
// ============================================================================

use crate::core::types::NodeId;

/// Host-side tree of view nodes.
///
/// The runtime only ever asks three things of it: who follows a node, move a
/// contiguous run of nodes to right after a node, and take nodes out. Nodes
/// are opaque [`NodeId`]s minted by the host.
pub trait RenderTree {
    /// The node immediately after `node` under the same parent
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    /// Place `nodes`, in order, immediately after `anchor`.
    ///
    /// Nodes that are already attached somewhere are moved, not copied.
    fn insert_after(&mut self, anchor: NodeId, nodes: &[NodeId]);

    /// Detach `nodes` from the tree
    fn remove(&mut self, nodes: &[NodeId]);
}
