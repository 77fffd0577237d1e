//! Synchronizer state and its transitions.
//!
//! Everything here runs synchronously under the synchronizer's lock; the
//! async side only decides when to call in. Each transition reports whether
//! it changed anything so callers publish exactly one notification per
//! effective mutation.

use super::error::{SyncError, SyncResult};
use super::reconcile::{diff_listing, DirDiff};
use super::services::ports::DirEntryInfo;
use super::watch::{RoutedEvent, WatchRegistry};
use crate::models::{path, Entry, EntryKind, EntryStore, TabRegistry};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

pub struct SyncState {
    pub entries: EntryStore,
    pub tabs: TabRegistry,
    pub watches: WatchRegistry,
    pub expanded: FxHashSet<String>,
    pub version: u64,
}

impl SyncState {
    pub fn new(events: mpsc::Sender<RoutedEvent>) -> Self {
        Self {
            entries: EntryStore::new(),
            tabs: TabRegistry::new(),
            watches: WatchRegistry::new(events),
            expanded: FxHashSet::default(),
            version: 0,
        }
    }

    pub fn bump_version(&mut self) -> u64 {
        self.version = self.version.saturating_add(1);
        self.version
    }

    /// Fails unless `dir` is the root or a directory entry.
    pub fn require_directory(&self, dir: &str) -> SyncResult<()> {
        if self.entries.is_directory(dir) {
            Ok(())
        } else if self.entries.contains(dir) {
            Err(SyncError::NotADirectory(dir.to_string()))
        } else {
            Err(SyncError::NotFound(dir.to_string()))
        }
    }

    /// Applies a fresh listing of `dir`.
    ///
    /// Returns `None` when `dir` left the store while the listing was in
    /// flight; the result is then discarded.
    pub fn apply_listing(&mut self, dir: &str, listing: &[DirEntryInfo]) -> Option<DirDiff> {
        if !self.entries.is_directory(dir) {
            return None;
        }
        let diff = diff_listing(&self.entries, dir, listing);
        for removed in &diff.removed {
            self.remove_subtree(removed);
        }
        for added in &diff.added {
            self.entries.upsert(added.clone());
        }
        Some(diff)
    }

    /// Drops `root` and everything under it from every view of the state.
    pub fn remove_subtree(&mut self, root: &str) -> bool {
        let removed = self.entries.remove_subtree(root);
        let tabs_changed = self.tabs.remove_under(root);
        self.watches.release_under(root);
        self.expanded
            .retain(|dir| !path::is_ancestor_or_self(root, dir));
        !removed.is_empty() || tabs_changed
    }

    pub fn validate_create(&self, parent: &str, name: &str) -> SyncResult<String> {
        if !path::is_valid_name(name) {
            return Err(SyncError::InvalidPath(name.to_string()));
        }
        self.require_directory(parent)?;
        let full = path::join(parent, name);
        if self.entries.contains(&full) {
            return Err(SyncError::AlreadyExists(full));
        }
        Ok(full)
    }

    pub fn apply_created(&mut self, full: &str, kind: EntryKind) -> bool {
        if !self.entries.is_directory(path::parent_of(full)) {
            return false;
        }
        // A reconcile may have picked the new entry up already.
        if self.entries.get(full).is_some_and(|entry| entry.kind == kind) {
            return false;
        }
        if self.entries.contains(full) {
            self.remove_subtree(full);
        }
        let entry = match kind {
            EntryKind::File => Entry::file(full),
            EntryKind::Directory => Entry::directory(full),
        };
        self.entries.upsert(entry);
        true
    }

    pub fn validate_rename(&self, from: &str, to: &str) -> SyncResult<()> {
        if from.is_empty() || to.is_empty() {
            return Err(SyncError::InvalidPath(from.to_string()));
        }
        if path::is_ancestor_or_self(from, to) {
            return Err(SyncError::InvalidPath(to.to_string()));
        }
        if self.entries.contains(to) {
            return Err(SyncError::AlreadyExists(to.to_string()));
        }
        self.require_directory(path::parent_of(to))
    }

    /// Moves `from` and its subtree to `to` across entries, tabs, selection
    /// and expansion state.
    ///
    /// Watches under `from` are released; the returned paths are where they
    /// must be re-acquired.
    pub fn apply_renamed(&mut self, from: &str, to: &str) -> Vec<String> {
        self.entries.rename_subtree(from, to);
        self.tabs.rename_under(from, to);

        let released = self.watches.release_under(from);
        let expanded: Vec<String> = self
            .expanded
            .iter()
            .filter(|dir| path::is_ancestor_or_self(from, dir))
            .cloned()
            .collect();
        for dir in expanded {
            self.expanded.remove(&dir);
            if let Some(moved) = path::rebase(&dir, from, to) {
                self.expanded.insert(moved);
            }
        }

        released
            .iter()
            .filter_map(|dir| path::rebase(dir, from, to))
            .collect()
    }

    /// Stores `content` for the file at `target`, creating the entry if needed.
    pub fn apply_local_write(&mut self, target: &str, content: String) -> SyncResult<bool> {
        if target.is_empty() {
            return Err(SyncError::InvalidPath(target.to_string()));
        }
        match self.entries.get_mut(target) {
            Some(entry) if entry.is_dir() => Err(SyncError::NotAFile(target.to_string())),
            Some(entry) => {
                if entry.content == content {
                    return Ok(false);
                }
                entry.content = content;
                Ok(true)
            }
            None => {
                self.require_directory(path::parent_of(target))?;
                self.entries.upsert(Entry::file(target).with_content(content));
                Ok(true)
            }
        }
    }

    /// Replaces the payload of an existing file with bytes read from the provider.
    pub fn refresh_content(&mut self, target: &str, content: String) -> bool {
        match self.entries.get_mut(target) {
            Some(entry) if !entry.is_dir() && entry.content != content => {
                entry.content = content;
                true
            }
            _ => false,
        }
    }

    pub fn activate(&mut self, target: &str) -> SyncResult<bool> {
        match self.entries.get(target) {
            Some(entry) if entry.is_dir() => Err(SyncError::NotAFile(target.to_string())),
            Some(_) => Ok(self.tabs.activate(target)),
            None => Err(SyncError::NotFound(target.to_string())),
        }
    }

    pub fn active_entry(&self) -> Option<&Entry> {
        self.tabs.active().and_then(|active| self.entries.get(active))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/kernel/state.rs"]
mod tests;
