//! Tip-depth computation and ultrametric forcing.
//!
//! Diversification models assume an ultrametric tree: every tip at the same
//! distance from the root. Empirical trees accumulate rounding drift, so
//! [`force_ultrametric`] extends each terminal branch until its tip reaches
//! the depth of the deepest tip. Internal branches are never modified.

use crate::tree::PhyloTree;
use filix_core::{FilixError, Result};

/// Outcome of [`force_ultrametric`].
#[derive(Debug, Clone, PartialEq)]
pub struct UltrametricReport {
    /// Root-to-tip depth shared by all tips after forcing.
    pub target_depth: f64,
    /// Number of terminal branches that were lengthened.
    pub adjusted_tips: usize,
    /// Sum of the absolute changes applied to terminal branches.
    pub total_adjustment: f64,
}

/// Root-to-node distances for every node, indexed by node id.
///
/// Every non-root node must carry a branch length.
pub fn node_depths(tree: &PhyloTree) -> Result<Vec<f64>> {
    let mut depths = vec![0.0; tree.node_count()];
    for id in tree.iter_preorder() {
        let node = match tree.get_node(id) {
            Some(n) => n,
            None => continue,
        };
        let parent = match node.parent {
            Some(p) => p,
            None => continue,
        };
        let length = node.branch_length.ok_or_else(|| {
            FilixError::InvalidInput(format!(
                "node_depths: node {} has no branch length",
                id
            ))
        })?;
        depths[id] = depths[parent] + length;
    }
    Ok(depths)
}

/// Depth of the deepest tip (the tree height).
pub fn tree_height(tree: &PhyloTree) -> Result<f64> {
    let depths = node_depths(tree)?;
    Ok(tree
        .leaves()
        .into_iter()
        .map(|id| depths[id])
        .fold(0.0f64, f64::max))
}

/// Returns true if all tip depths agree within `tol`.
pub fn is_ultrametric(tree: &PhyloTree, tol: f64) -> Result<bool> {
    let depths = node_depths(tree)?;
    let tips: Vec<f64> = tree.leaves().into_iter().map(|id| depths[id]).collect();
    let max = tips.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = tips.iter().copied().fold(f64::INFINITY, f64::min);
    Ok(max - min <= tol)
}

/// Lengthens terminal branches so every tip sits at the maximum tip depth.
pub fn force_ultrametric(tree: &mut PhyloTree) -> Result<UltrametricReport> {
    let depths = node_depths(tree)?;
    let leaves = tree.leaves();
    if leaves.is_empty() {
        return Err(FilixError::InvalidInput(
            "force_ultrametric: tree has no leaves".into(),
        ));
    }
    let target = leaves.iter().map(|&id| depths[id]).fold(0.0f64, f64::max);

    let mut adjusted = 0usize;
    let mut total = 0.0;
    for id in leaves {
        let node = match tree.get_node_mut(id) {
            Some(n) => n,
            None => continue,
        };
        let parent = match node.parent {
            Some(p) => p,
            None => continue,
        };
        let old = node.branch_length.unwrap_or(0.0);
        let new = target - depths[parent];
        if new != old {
            adjusted += 1;
            total += (new - old).abs();
            node.branch_length = Some(new);
        }
    }
    Ok(UltrametricReport {
        target_depth: target,
        adjusted_tips: adjusted,
        total_adjustment: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    /// ((A:1,B:0.9):1,C:1.95); -- tips at depths 2.0, 1.9, 1.95.
    fn drifted_tree() -> PhyloTree {
        PhyloTree::from_newick("((A:1,B:0.9):1,C:1.95);").unwrap()
    }

    #[test]
    fn depths_accumulate_from_root() {
        let tree = drifted_tree();
        let depths = node_depths(&tree).unwrap();
        let by_name = |name: &str| {
            tree.leaves()
                .into_iter()
                .find(|&id| tree.get_node(id).unwrap().name.as_deref() == Some(name))
                .unwrap()
        };
        assert!((depths[by_name("A")] - 2.0).abs() < TOL);
        assert!((depths[by_name("B")] - 1.9).abs() < TOL);
        assert!((depths[by_name("C")] - 1.95).abs() < TOL);
    }

    #[test]
    fn depths_require_branch_lengths() {
        let tree = PhyloTree::from_newick("((A:1,B),C:2);").unwrap();
        assert!(node_depths(&tree).is_err());
    }

    #[test]
    fn detects_non_ultrametric_tree() {
        let tree = drifted_tree();
        assert!(!is_ultrametric(&tree, 1e-9).unwrap());
        assert!(is_ultrametric(&tree, 0.2).unwrap());
    }

    #[test]
    fn forcing_extends_short_tips() {
        let mut tree = drifted_tree();
        let report = force_ultrametric(&mut tree).unwrap();
        assert!((report.target_depth - 2.0).abs() < TOL);
        assert_eq!(report.adjusted_tips, 2);
        assert!(
            (report.total_adjustment - 0.15).abs() < TOL,
            "total adjustment {}",
            report.total_adjustment
        );
        assert!(is_ultrametric(&tree, TOL).unwrap());
        assert!((tree_height(&tree).unwrap() - 2.0).abs() < TOL);
    }

    #[test]
    fn forcing_preserves_internal_branches() {
        let mut tree = drifted_tree();
        force_ultrametric(&mut tree).unwrap();
        let inner = tree
            .iter_preorder()
            .find(|&id| {
                let n = tree.get_node(id).unwrap();
                !n.is_leaf() && !n.is_root()
            })
            .unwrap();
        let len = tree.get_node(inner).unwrap().branch_length.unwrap();
        assert!((len - 1.0).abs() < TOL);
    }

    #[test]
    fn forcing_is_noop_on_ultrametric_tree() {
        let mut tree = PhyloTree::from_newick("((A:1,B:1):1,C:2);").unwrap();
        let report = force_ultrametric(&mut tree).unwrap();
        assert_eq!(report.adjusted_tips, 0);
        assert!(report.total_adjustment.abs() < TOL);
    }
}
