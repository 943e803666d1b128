//! File Status Tree
//!
//! Arena-backed mirror of the scanned source tree. All nodes live in one
//! `Vec<StatusNode>`; parent/child links are `NodeIndex` values. A
//! `relative_path → NodeIndex` index is built once when the tree is loaded so
//! every per-file status update is a single hash lookup.

use docwatch_common::api::{FileNodeDto, NodeKind, NodeStatus};
use std::collections::HashMap;

/// Index into the tree arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(u32);

impl NodeIndex {
    #[inline]
    fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeIndex overflow");
        Self(index as u32)
    }

    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// One file or directory
#[derive(Debug, Clone, PartialEq)]
pub struct StatusNode {
    /// Display label (last path segment)
    pub name: String,
    /// Normalised unique key within the tree
    pub relative_path: String,
    /// Absolute path on the runner
    pub path: String,
    pub kind: NodeKind,
    pub status: NodeStatus,
    pub depth: u32,
    pub doc_path: Option<String>,
    pub parent: Option<NodeIndex>,
    /// Directories first, then by name
    pub children: Vec<NodeIndex>,
}

impl StatusNode {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// Per-status file counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeSummary {
    pub files: usize,
    pub directories: usize,
    pub not_started: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TreeSummary {
    fn count(&mut self, status: NodeStatus) {
        match status {
            NodeStatus::NotStarted => self.not_started += 1,
            NodeStatus::InProgress => self.in_progress += 1,
            NodeStatus::Completed => self.completed += 1,
            NodeStatus::Failed => self.failed += 1,
            NodeStatus::Skipped => self.skipped += 1,
        }
    }
}

/// Hierarchical per-file status for one task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileStatusTree {
    nodes: Vec<StatusNode>,
    root: Option<NodeIndex>,
    index: HashMap<String, NodeIndex>,
}

/// Normalise a path reported by the runner to the tree's key form
///
/// Backslashes become `/`; leading `./` and `/` are stripped.
pub fn normalize_relative_path(raw: &str) -> String {
    let mut path = raw.trim().replace('\\', "/");
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest.to_string();
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest.to_string();
        } else {
            break;
        }
    }
    if path == "." {
        path.clear();
    }
    path
}

impl FileStatusTree {
    /// Build the arena and path index from the service DTO
    ///
    /// If the DTO violates path uniqueness, the first node in document
    /// order keeps the index entry.
    pub fn from_dto(root: &FileNodeDto) -> Self {
        let mut tree = Self::default();
        let root_idx = tree.insert(root, None);
        tree.root = Some(root_idx);
        tree
    }

    fn insert(&mut self, dto: &FileNodeDto, parent: Option<NodeIndex>) -> NodeIndex {
        let idx = NodeIndex::new(self.nodes.len());
        let relative_path = normalize_relative_path(&dto.relative_path);
        self.nodes.push(StatusNode {
            name: dto.name.clone(),
            relative_path: relative_path.clone(),
            path: dto.path.clone(),
            kind: dto.kind,
            status: dto.status,
            depth: dto.depth,
            doc_path: dto.doc_path.clone(),
            parent,
            children: Vec::with_capacity(dto.children.len()),
        });
        self.index.entry(relative_path).or_insert(idx);

        let mut ordered: Vec<&FileNodeDto> = dto.children.iter().collect();
        ordered.sort_by(|a, b| {
            let a_file = a.kind == NodeKind::File;
            let b_file = b.kind == NodeKind::File;
            a_file.cmp(&b_file).then_with(|| a.name.cmp(&b.name))
        });

        for child in ordered {
            let child_idx = self.insert(child, Some(idx));
            self.nodes[idx.idx()].children.push(child_idx);
        }
        idx
    }

    /// Set the status of the file at `relative_path`
    ///
    /// Returns `false` (and changes nothing) when no file has that path.
    /// Directory paths are rejected; their status is derived.
    pub fn propagate(&mut self, relative_path: &str, status: NodeStatus) -> bool {
        let key = normalize_relative_path(relative_path);
        let Some(&idx) = self.index.get(&key) else {
            return false;
        };
        let node = &mut self.nodes[idx.idx()];
        if node.is_dir() {
            return false;
        }
        node.status = status;
        true
    }

    pub fn get(&self, relative_path: &str) -> Option<&StatusNode> {
        self.index
            .get(&normalize_relative_path(relative_path))
            .map(|idx| &self.nodes[idx.idx()])
    }

    pub fn root(&self) -> Option<&StatusNode> {
        self.root.map(|idx| &self.nodes[idx.idx()])
    }

    pub fn node(&self, idx: NodeIndex) -> &StatusNode {
        &self.nodes[idx.idx()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in document order, paired with their nesting level below the root
    pub fn iter_preorder(&self) -> Vec<(usize, &StatusNode)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, NodeIndex)> = self.root.map(|r| (0, r)).into_iter().collect();
        while let Some((level, idx)) = stack.pop() {
            let node = &self.nodes[idx.idx()];
            out.push((level, node));
            for child in node.children.iter().rev() {
                stack.push((level + 1, *child));
            }
        }
        out
    }

    /// Count files by status
    pub fn summary(&self) -> TreeSummary {
        let mut summary = TreeSummary::default();
        for node in &self.nodes {
            if node.is_dir() {
                summary.directories += 1;
            } else {
                summary.files += 1;
                summary.count(node.status);
            }
        }
        summary
    }

    /// Display status of any node; directories aggregate their descendants
    ///
    /// Failed if any file failed, Completed once every file is completed or
    /// skipped, InProgress once any file has started, else NotStarted.
    pub fn derived_status(&self, relative_path: &str) -> Option<NodeStatus> {
        let idx = *self.index.get(&normalize_relative_path(relative_path))?;
        let node = &self.nodes[idx.idx()];
        if !node.is_dir() {
            return Some(node.status);
        }

        let mut summary = TreeSummary::default();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.idx()];
            if node.is_dir() {
                stack.extend(node.children.iter().copied());
            } else {
                summary.files += 1;
                summary.count(node.status);
            }
        }

        let status = if summary.failed > 0 {
            NodeStatus::Failed
        } else if summary.files > 0 && summary.completed + summary.skipped == summary.files {
            NodeStatus::Completed
        } else if summary.in_progress + summary.completed + summary.skipped > 0 {
            NodeStatus::InProgress
        } else {
            NodeStatus::NotStarted
        };
        Some(status)
    }
}
