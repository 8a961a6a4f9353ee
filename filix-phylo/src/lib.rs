//! Phylogenetic tree structures and tree IO for the filix workspace.
//!
//! This crate provides:
//!
//! - **Trees**: arena-based rooted phylogenetic trees with branch lengths
//!   ([`tree::PhyloTree`]), including pruning to a tip subset.
//! - **Newick IO**: parsing and writing of Newick strings ([`newick`]),
//!   with quoted labels and bracket comments.
//! - **Ultrametric forcing**: tip-depth computation and extension of
//!   terminal branches so all tips are equidistant from the root
//!   ([`ultrametric`]).

pub mod newick;
pub mod tree;
pub mod ultrametric;

pub use tree::{Node, NodeId, PhyloTree};
pub use ultrametric::{force_ultrametric, is_ultrametric, tree_height, UltrametricReport};
