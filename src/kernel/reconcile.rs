//! Directory reconciliation diff.
//!
//! A structural watch event is only a hint that something changed under a
//! directory. Truth comes from a fresh listing, compared against the
//! directory's immediate children in the store.

use crate::kernel::services::ports::DirEntryInfo;
use crate::models::{path, Entry, EntryStore};
use rustc_hash::FxHashMap;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirDiff {
    /// Children gone from the listing; each takes its whole subtree with it.
    pub removed: Vec<String>,
    /// Children new to the store, inserted with empty content.
    pub added: Vec<Entry>,
}

impl DirDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Compares `listing` (the fresh children of `dir`) with the store.
///
/// Children present on both sides with the same kind are left alone so any
/// unflushed content survives. A child whose kind flipped is removed and
/// re-added.
pub fn diff_listing(store: &EntryStore, dir: &str, listing: &[DirEntryInfo]) -> DirDiff {
    let fresh: FxHashMap<String, &DirEntryInfo> = listing
        .iter()
        .map(|info| (path::join(dir, &info.name), info))
        .collect();

    let mut diff = DirDiff::default();
    for existing in store.children_of(dir) {
        match fresh.get(&existing.path) {
            Some(info) if info.kind == existing.kind => {}
            _ => diff.removed.push(existing.path.clone()),
        }
    }
    for (child, info) in &fresh {
        let unchanged = store
            .get(child)
            .is_some_and(|existing| existing.kind == info.kind);
        if !unchanged {
            diff.added.push(Entry {
                path: child.clone(),
                kind: info.kind,
                content: String::new(),
            });
        }
    }

    diff.removed.sort();
    diff.added.sort_by(|a, b| a.path.cmp(&b.path));
    diff
}

#[cfg(test)]
#[path = "../../tests/unit/kernel/reconcile.rs"]
mod tests;
