//! Local state models

pub mod file_tree;

pub use file_tree::{normalize_relative_path, FileStatusTree, NodeIndex, StatusNode, TreeSummary};
