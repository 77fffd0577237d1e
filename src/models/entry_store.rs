//! Flat, path-keyed collection of workspace entries.
//!
//! The store never performs I/O. Callers keep it in step with the provider
//! by mutating the provider first and the store second.

use super::path;
use rustc_hash::FxHashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        self == EntryKind::Directory
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    /// File text; always empty for directories and for files not yet read.
    pub content: String,
}

impl Entry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            content: String::new(),
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            content: String::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn name(&self) -> &str {
        path::file_name(&self.path)
    }

    pub fn parent(&self) -> &str {
        path::parent_of(&self.path)
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

#[derive(Debug, Default, Clone)]
pub struct EntryStore {
    entries: FxHashMap<String, Entry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry`, replacing any entry with the same path.
    pub fn upsert(&mut self, entry: Entry) -> Option<Entry> {
        self.entries.insert(entry.path.clone(), entry)
    }

    /// Removes every entry matching `predicate` and returns them.
    pub fn remove<F>(&mut self, mut predicate: F) -> Vec<Entry>
    where
        F: FnMut(&Entry) -> bool,
    {
        let doomed: Vec<String> = self
            .entries
            .values()
            .filter(|entry| predicate(entry))
            .map(|entry| entry.path.clone())
            .collect();
        doomed
            .into_iter()
            .filter_map(|path| self.entries.remove(&path))
            .collect()
    }

    /// Removes `root` and all of its descendants.
    pub fn remove_subtree(&mut self, root: &str) -> Vec<Entry> {
        self.remove(|entry| path::is_ancestor_or_self(root, &entry.path))
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Entry> {
        self.entries.get_mut(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn all(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immediate children of `dir`, not the full subtree.
    pub fn children_of<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries
            .values()
            .filter(move |entry| entry.parent() == dir)
    }

    /// True when `dir` is the root or an existing directory entry.
    pub fn is_directory(&self, dir: &str) -> bool {
        dir.is_empty() || self.get(dir).is_some_and(Entry::is_dir)
    }

    /// Rewrites the `from` prefix to `to` on `from` and every descendant.
    ///
    /// Returns the number of entries moved. Entries already living at the
    /// destination paths are overwritten.
    pub fn rename_subtree(&mut self, from: &str, to: &str) -> usize {
        let moved = self.remove_subtree(from);
        let count = moved.len();
        for mut entry in moved {
            if let Some(new_path) = path::rebase(&entry.path, from, to) {
                entry.path = new_path;
            }
            self.upsert(entry);
        }
        count
    }
}

#[cfg(test)]
#[path = "../../tests/unit/models/entry_store.rs"]
mod tests;
