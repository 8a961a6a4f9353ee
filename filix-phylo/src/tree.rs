//! Rooted phylogenetic trees with branch lengths.
//!
//! Trees are stored as an arena of nodes indexed by [`NodeId`]. Each node
//! records its parent, children, optional name, and the length of the branch
//! leading to it from its parent.

use filix_core::{FilixError, Result, Summarizable};
use std::collections::HashSet;

/// Index of a node within a tree's arena.
pub type NodeId = usize;

/// A single node in a phylogenetic tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Arena index of this node.
    pub id: NodeId,
    /// Parent node, or `None` for the root.
    pub parent: Option<NodeId>,
    /// Child nodes in input order.
    pub children: Vec<NodeId>,
    /// Length of the branch leading to this node.
    pub branch_length: Option<f64>,
    /// Node label (taxon name for tips).
    pub name: Option<String>,
}

impl Node {
    /// Returns true if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns true if this node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A rooted phylogenetic tree stored as a node arena.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhyloTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl PhyloTree {
    /// Creates a tree containing a single unnamed root node.
    pub fn new() -> Self {
        PhyloTree {
            nodes: vec![Node {
                id: 0,
                parent: None,
                children: Vec::new(),
                branch_length: None,
                name: None,
            }],
            root: 0,
        }
    }

    /// Builds a tree from a pre-assembled arena.
    ///
    /// Node ids must equal their arena positions and the root must exist.
    pub fn from_nodes(nodes: Vec<Node>, root: NodeId) -> Result<Self> {
        if nodes.is_empty() {
            return Err(FilixError::InvalidInput(
                "from_nodes: node list must not be empty".into(),
            ));
        }
        if root >= nodes.len() {
            return Err(FilixError::InvalidInput(format!(
                "from_nodes: root id {} out of range ({} nodes)",
                root,
                nodes.len()
            )));
        }
        for (i, node) in nodes.iter().enumerate() {
            if node.id != i {
                return Err(FilixError::InvalidInput(format!(
                    "from_nodes: node at position {} has id {}",
                    i, node.id
                )));
            }
        }
        Ok(PhyloTree { nodes, root })
    }

    /// Appends a new child under `parent` and returns its id.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: Option<String>,
        branch_length: Option<f64>,
    ) -> Result<NodeId> {
        if parent >= self.nodes.len() {
            return Err(FilixError::InvalidInput(format!(
                "add_child: parent id {} out of range",
                parent
            )));
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            parent: Some(parent),
            children: Vec::new(),
            branch_length,
            name,
        });
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    /// Returns the node with the given id, if present.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Returns a mutable reference to the node with the given id.
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Id of the root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaf (tip) nodes.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Ids of all leaves in arena order.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.id)
            .collect()
    }

    /// Sorted names of all named leaves.
    pub fn leaf_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.is_leaf())
            .filter_map(|n| n.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Iterates node ids in preorder (parent before children).
    pub fn iter_preorder(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = vec![self.root];
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            let node = &self.nodes[id];
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
            Some(id)
        })
    }

    /// Iterates node ids in postorder (children before parent).
    pub fn iter_postorder(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in &self.nodes[id].children {
                stack.push(child);
            }
        }
        order.reverse();
        order.into_iter()
    }

    /// Restricts the tree to the named tips, collapsing unary nodes.
    ///
    /// The result contains exactly the leaves whose names appear in `keep`
    /// (names absent from the tree are ignored). Internal nodes left with a
    /// single surviving child are removed and their branch lengths merged
    /// into the child's branch. The new root is the most recent common
    /// ancestor of the kept tips and carries no branch length.
    ///
    /// Returns an error if no tree tip matches `keep`.
    pub fn prune_to_tips(&self, keep: &[String]) -> Result<PhyloTree> {
        if keep.is_empty() {
            return Err(FilixError::InvalidInput(
                "prune_to_tips: tip set must not be empty".into(),
            ));
        }
        let wanted: HashSet<&str> = keep.iter().map(|s| s.as_str()).collect();

        // Kept-leaf count per subtree.
        let mut kept = vec![0usize; self.nodes.len()];
        for id in self.iter_postorder() {
            let node = &self.nodes[id];
            if node.is_leaf() {
                if node.name.as_deref().map_or(false, |n| wanted.contains(n)) {
                    kept[id] = 1;
                }
            } else {
                kept[id] = node.children.iter().map(|&c| kept[c]).sum();
            }
        }
        if kept[self.root] == 0 {
            return Err(FilixError::InvalidInput(
                "prune_to_tips: no tree tip matches the requested set".into(),
            ));
        }

        let (top, _) = self.descend_unary(&kept, self.root);
        let mut out = Vec::new();
        let root = self.copy_pruned(&kept, top, None, 0.0, &mut out);
        PhyloTree::from_nodes(out, root)
    }

    /// Follows a chain of single-surviving-child nodes starting at `id`,
    /// accumulating the branch lengths of the skipped nodes.
    fn descend_unary(&self, kept: &[usize], start: NodeId) -> (NodeId, f64) {
        let mut id = start;
        let mut carry = 0.0;
        loop {
            let node = &self.nodes[id];
            if node.is_leaf() {
                return (id, carry);
            }
            let mut surviving = node.children.iter().copied().filter(|&c| kept[c] > 0);
            let first = surviving.next();
            if surviving.next().is_none() {
                if let Some(only) = first {
                    carry += node.branch_length.unwrap_or(0.0);
                    id = only;
                    continue;
                }
            }
            return (id, carry);
        }
    }

    /// Copies the subtree rooted at `id` into `out`, dropping unkept leaves
    /// and collapsing unary chains. `carry` is branch length inherited from
    /// collapsed ancestors.
    fn copy_pruned(
        &self,
        kept: &[usize],
        id: NodeId,
        parent: Option<NodeId>,
        carry: f64,
        out: &mut Vec<Node>,
    ) -> NodeId {
        let src = &self.nodes[id];
        let branch_length = if parent.is_none() {
            None
        } else {
            match src.branch_length {
                Some(len) => Some(len + carry),
                None if carry > 0.0 => Some(carry),
                None => None,
            }
        };
        let new_id = out.len();
        out.push(Node {
            id: new_id,
            parent,
            children: Vec::new(),
            branch_length,
            name: src.name.clone(),
        });
        for &child in &src.children {
            if kept[child] == 0 {
                continue;
            }
            let (target, extra) = self.descend_unary(kept, child);
            let copied = self.copy_pruned(kept, target, Some(new_id), extra, out);
            out[new_id].children.push(copied);
        }
        new_id
    }

    /// Parses a Newick string into a tree.
    pub fn from_newick(input: &str) -> Result<Self> {
        crate::newick::parse(input)
    }

    /// Serializes the tree to a Newick string.
    pub fn to_newick(&self) -> String {
        crate::newick::write(self)
    }
}

impl Default for PhyloTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Summarizable for PhyloTree {
    fn summary(&self) -> String {
        let leaves = self.leaf_count();
        format!(
            "PhyloTree: {} nodes ({} leaves, {} internal)",
            self.node_count(),
            leaves,
            self.node_count() - leaves
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ((A:1,B:2):0.5,C:3);
    fn sample_tree() -> PhyloTree {
        let mut tree = PhyloTree::new();
        let inner = tree.add_child(0, None, Some(0.5)).unwrap();
        tree.add_child(inner, Some("A".into()), Some(1.0)).unwrap();
        tree.add_child(inner, Some("B".into()), Some(2.0)).unwrap();
        tree.add_child(0, Some("C".into()), Some(3.0)).unwrap();
        tree
    }

    #[test]
    fn build_and_count() {
        let tree = sample_tree();
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.leaf_names(), vec!["A", "B", "C"]);
    }

    #[test]
    fn preorder_visits_parent_first() {
        let tree = sample_tree();
        let order: Vec<NodeId> = tree.iter_preorder().collect();
        assert_eq!(order[0], tree.root());
        let pos =
            |id: NodeId| order.iter().position(|&x| x == id).unwrap();
        for id in 0..tree.node_count() {
            if let Some(parent) = tree.get_node(id).unwrap().parent {
                assert!(pos(parent) < pos(id), "parent {} after child {}", parent, id);
            }
        }
    }

    #[test]
    fn postorder_visits_children_first() {
        let tree = sample_tree();
        let order: Vec<NodeId> = tree.iter_postorder().collect();
        assert_eq!(*order.last().unwrap(), tree.root());
        let pos =
            |id: NodeId| order.iter().position(|&x| x == id).unwrap();
        for id in 0..tree.node_count() {
            if let Some(parent) = tree.get_node(id).unwrap().parent {
                assert!(pos(id) < pos(parent), "child {} after parent {}", id, parent);
            }
        }
    }

    #[test]
    fn from_nodes_rejects_bad_ids() {
        let nodes = vec![Node {
            id: 7,
            parent: None,
            children: Vec::new(),
            branch_length: None,
            name: None,
        }];
        assert!(PhyloTree::from_nodes(nodes, 0).is_err());
    }

    #[test]
    fn prune_keeps_requested_tips() {
        let tree = sample_tree();
        let pruned = tree
            .prune_to_tips(&["A".to_string(), "C".to_string()])
            .unwrap();
        assert_eq!(pruned.leaf_names(), vec!["A", "C"]);
        // B's parent collapses: A's branch absorbs the inner 0.5.
        let a = pruned
            .leaves()
            .into_iter()
            .find(|&id| pruned.get_node(id).unwrap().name.as_deref() == Some("A"))
            .unwrap();
        let len = pruned.get_node(a).unwrap().branch_length.unwrap();
        assert!((len - 1.5).abs() < 1e-12, "expected 1.5, got {}", len);
    }

    #[test]
    fn prune_promotes_mrca_to_root() {
        let tree = sample_tree();
        let pruned = tree
            .prune_to_tips(&["A".to_string(), "B".to_string()])
            .unwrap();
        assert_eq!(pruned.leaf_names(), vec!["A", "B"]);
        assert_eq!(pruned.node_count(), 3);
        let root = pruned.get_node(pruned.root()).unwrap();
        assert!(root.branch_length.is_none());
    }

    #[test]
    fn prune_is_idempotent() {
        let tree = sample_tree();
        let keep = vec!["A".to_string(), "C".to_string()];
        let once = tree.prune_to_tips(&keep).unwrap();
        let twice = once.prune_to_tips(&keep).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn prune_single_tip() {
        let tree = sample_tree();
        let pruned = tree.prune_to_tips(&["B".to_string()]).unwrap();
        assert_eq!(pruned.node_count(), 1);
        let root = pruned.get_node(pruned.root()).unwrap();
        assert_eq!(root.name.as_deref(), Some("B"));
        assert!(root.branch_length.is_none());
    }

    #[test]
    fn prune_ignores_unknown_names() {
        let tree = sample_tree();
        let pruned = tree
            .prune_to_tips(&["A".to_string(), "Z".to_string()])
            .unwrap();
        assert_eq!(pruned.leaf_names(), vec!["A"]);
    }

    #[test]
    fn prune_rejects_disjoint_tip_set() {
        let tree = sample_tree();
        let err = tree.prune_to_tips(&["X".to_string(), "Y".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn summary_reports_counts() {
        let tree = sample_tree();
        assert_eq!(tree.summary(), "PhyloTree: 5 nodes (3 leaves, 2 internal)");
    }
}
