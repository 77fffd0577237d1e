//! Nested tree view derived from the flat entry store.
//!
//! Nothing here is cached: every call regroups the entries by parent path,
//! so the projection cannot drift from the store.

use super::entry_store::{Entry, EntryKind, EntryStore};
use super::path;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub path: String,
    pub name: String,
    pub kind: EntryKind,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub path: String,
    pub name: String,
    pub depth: u16,
    pub is_dir: bool,
    pub is_expanded: bool,
}

/// Directories first, then full-path byte order.
pub fn compare_entries(a: &Entry, b: &Entry) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.path.cmp(&b.path),
    }
}

/// Builds the ordered nested view of `store`, starting at the root.
///
/// Entries whose parent is not in the store are not reachable and do not
/// appear.
pub fn project(store: &EntryStore) -> Vec<TreeNode> {
    let mut by_parent: FxHashMap<&str, Vec<&Entry>> = FxHashMap::default();
    for entry in store.all() {
        by_parent.entry(entry.parent()).or_default().push(entry);
    }
    for siblings in by_parent.values_mut() {
        siblings.sort_by(|a, b| compare_entries(a, b));
    }
    build_level(&by_parent, path::ROOT)
}

fn build_level(by_parent: &FxHashMap<&str, Vec<&Entry>>, parent: &str) -> Vec<TreeNode> {
    let Some(siblings) = by_parent.get(parent) else {
        return Vec::new();
    };
    siblings
        .iter()
        .map(|entry| TreeNode {
            path: entry.path.clone(),
            name: entry.name().to_string(),
            kind: entry.kind,
            children: if entry.is_dir() {
                build_level(by_parent, &entry.path)
            } else {
                Vec::new()
            },
        })
        .collect()
}

/// Depth-first rows of `nodes`, descending only into expanded directories.
pub fn flatten_for_view(nodes: &[TreeNode], expanded: &FxHashSet<String>) -> Vec<TreeRow> {
    let mut result = Vec::new();
    let mut stack: Vec<(&TreeNode, u16)> = nodes.iter().rev().map(|node| (node, 0)).collect();

    while let Some((node, depth)) = stack.pop() {
        let is_expanded = node.is_dir() && expanded.contains(&node.path);
        result.push(TreeRow {
            path: node.path.clone(),
            name: node.name.clone(),
            depth,
            is_dir: node.is_dir(),
            is_expanded,
        });
        if is_expanded {
            for child in node.children.iter().rev() {
                stack.push((child, depth.saturating_add(1)));
            }
        }
    }

    result
}

#[cfg(test)]
#[path = "../../tests/unit/models/tree.rs"]
mod tests;
