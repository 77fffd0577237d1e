//! In-memory provider.
//!
//! Holds a whole namespace in a map and emits the same watch events a disk
//! backend would. Every mutation, including the ones made through the
//! `external_*` helpers, notifies the watchers of the affected directories.

use crate::kernel::services::ports::file::{
    DirEntryInfo, FsError, FsFuture, FsProvider, Result, WatchEvent, WatchStream,
};
use crate::models::{path, EntryKind};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Eq)]
enum MemNode {
    File(Vec<u8>),
    Directory,
}

struct MemWatcher {
    path: String,
    recursive: bool,
    tx: UnboundedSender<WatchEvent>,
}

impl MemWatcher {
    fn observes_dir(&self, dir: &str) -> bool {
        if self.recursive {
            path::is_ancestor_or_self(&self.path, dir)
        } else {
            self.path == dir
        }
    }
}

#[derive(Default)]
struct MemState {
    nodes: BTreeMap<String, MemNode>,
    watchers: Vec<MemWatcher>,
    failing_watches: FxHashSet<String>,
    fail_writes: bool,
    list_calls: usize,
    read_calls: usize,
}

impl MemState {
    fn is_dir(&self, dir: &str) -> bool {
        dir.is_empty() || matches!(self.nodes.get(dir), Some(MemNode::Directory))
    }

    fn require_parent_dir(&self, target: &str) -> Result<()> {
        let parent = path::parent_of(target);
        if self.is_dir(parent) {
            Ok(())
        } else if self.nodes.contains_key(parent) {
            Err(FsError::NotADirectory(parent.to_string()))
        } else {
            Err(FsError::NotFound(parent.to_string()))
        }
    }

    fn emit_structural(&mut self, changed: &str) {
        let dir = path::parent_of(changed).to_string();
        self.watchers.retain(|watcher| !watcher.tx.is_closed());
        for watcher in &self.watchers {
            if watcher.observes_dir(&dir) {
                let _ = watcher.tx.send(WatchEvent::structural(dir.clone()));
            }
        }
    }

    fn emit_content(&mut self, file: &str) {
        let dir = path::parent_of(file);
        self.watchers.retain(|watcher| !watcher.tx.is_closed());
        for watcher in &self.watchers {
            if watcher.path == file || watcher.observes_dir(dir) {
                let _ = watcher.tx.send(WatchEvent::content(file));
            }
        }
    }

    fn list(&mut self, dir: &str) -> Result<Vec<DirEntryInfo>> {
        self.list_calls += 1;
        if !self.is_dir(dir) {
            return Err(if self.nodes.contains_key(dir) {
                FsError::NotADirectory(dir.to_string())
            } else {
                FsError::NotFound(dir.to_string())
            });
        }
        Ok(self
            .nodes
            .iter()
            .filter(|(child, _)| path::parent_of(child) == dir)
            .map(|(child, node)| {
                let name = path::file_name(child);
                match node {
                    MemNode::File(_) => DirEntryInfo::file(name),
                    MemNode::Directory => DirEntryInfo::directory(name),
                }
            })
            .collect())
    }

    fn read(&mut self, file: &str) -> Result<Vec<u8>> {
        self.read_calls += 1;
        match self.nodes.get(file) {
            Some(MemNode::File(bytes)) => Ok(bytes.clone()),
            Some(MemNode::Directory) => Err(FsError::io(file, "is a directory")),
            None => Err(FsError::NotFound(file.to_string())),
        }
    }

    fn write(&mut self, file: &str, bytes: Vec<u8>) -> Result<()> {
        if self.fail_writes {
            return Err(FsError::io(file, "write rejected"));
        }
        if file.is_empty() {
            return Err(FsError::io(file, "cannot write the root"));
        }
        self.require_parent_dir(file)?;
        match self.nodes.get_mut(file) {
            Some(MemNode::Directory) => Err(FsError::io(file, "is a directory")),
            Some(MemNode::File(existing)) => {
                *existing = bytes;
                self.emit_content(file);
                Ok(())
            }
            None => {
                self.nodes.insert(file.to_string(), MemNode::File(bytes));
                self.emit_structural(file);
                Ok(())
            }
        }
    }

    fn create(&mut self, file: &str) -> Result<()> {
        if self.fail_writes {
            return Err(FsError::io(file, "write rejected"));
        }
        if file.is_empty() || self.nodes.contains_key(file) {
            return Err(FsError::AlreadyExists(file.to_string()));
        }
        self.require_parent_dir(file)?;
        self.nodes.insert(file.to_string(), MemNode::File(Vec::new()));
        self.emit_structural(file);
        Ok(())
    }

    fn mkdir(&mut self, dir: &str) -> Result<()> {
        if self.is_dir(dir) || self.nodes.contains_key(dir) {
            return Err(FsError::AlreadyExists(dir.to_string()));
        }
        self.require_parent_dir(dir)?;
        self.nodes.insert(dir.to_string(), MemNode::Directory);
        self.emit_structural(dir);
        Ok(())
    }

    fn remove(&mut self, target: &str, recursive: bool) -> Result<()> {
        if target.is_empty() {
            return Err(FsError::io(target, "cannot remove the root"));
        }
        if !self.nodes.contains_key(target) {
            return Err(FsError::NotFound(target.to_string()));
        }
        let has_children = self
            .nodes
            .keys()
            .any(|other| other != target && path::is_ancestor_or_self(target, other));
        if has_children && !recursive {
            return Err(FsError::io(target, "directory not empty"));
        }
        self.nodes
            .retain(|other, _| !path::is_ancestor_or_self(target, other));
        self.emit_structural(target);
        // A watched directory that no longer exists ends its subscription.
        self.watchers
            .retain(|watcher| !path::is_ancestor_or_self(target, &watcher.path));
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.nodes.contains_key(from) {
            return Err(FsError::NotFound(from.to_string()));
        }
        if self.nodes.contains_key(to) || to.is_empty() {
            return Err(FsError::AlreadyExists(to.to_string()));
        }
        if path::is_ancestor_or_self(from, to) {
            return Err(FsError::io(to, "cannot move a directory into itself"));
        }
        self.require_parent_dir(to)?;

        let moved: Vec<String> = self
            .nodes
            .keys()
            .filter(|other| path::is_ancestor_or_self(from, other))
            .cloned()
            .collect();
        for old in moved {
            if let (Some(node), Some(new_path)) =
                (self.nodes.remove(&old), path::rebase(&old, from, to))
            {
                self.nodes.insert(new_path, node);
            }
        }
        self.emit_structural(from);
        if path::parent_of(from) != path::parent_of(to) {
            self.emit_structural(to);
        }
        Ok(())
    }

    fn watch(&mut self, target: &str, recursive: bool) -> Result<WatchStream> {
        if self.failing_watches.contains(target) {
            return Err(FsError::io(target, "watch limit reached"));
        }
        if !target.is_empty() && !self.nodes.contains_key(target) {
            return Err(FsError::NotFound(target.to_string()));
        }
        let (tx, rx) = unbounded_channel();
        self.watchers.push(MemWatcher {
            path: target.to_string(),
            recursive,
            tx,
        });
        Ok(WatchStream::new(rx))
    }
}

#[derive(Clone, Default)]
pub struct MemoryFsProvider {
    state: Arc<Mutex<MemState>>,
}

impl MemoryFsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a provider from `(path, kind)` pairs; files start empty.
    pub fn with_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, EntryKind)>,
    {
        let provider = Self::new();
        {
            let mut state = provider.lock();
            for (raw, kind) in entries {
                let node = match kind {
                    EntryKind::File => MemNode::File(Vec::new()),
                    EntryKind::Directory => MemNode::Directory,
                };
                state.nodes.insert(path::canonicalize(raw), node);
            }
        }
        provider
    }

    fn lock(&self) -> MutexGuard<'_, MemState> {
        lock_state(&self.state)
    }

    pub fn exists(&self, target: &str) -> bool {
        target.is_empty() || self.lock().nodes.contains_key(target)
    }

    pub fn kind_of(&self, target: &str) -> Option<EntryKind> {
        match self.lock().nodes.get(target)? {
            MemNode::File(_) => Some(EntryKind::File),
            MemNode::Directory => Some(EntryKind::Directory),
        }
    }

    pub fn contents(&self, target: &str) -> Option<Vec<u8>> {
        match self.lock().nodes.get(target)? {
            MemNode::File(bytes) => Some(bytes.clone()),
            MemNode::Directory => None,
        }
    }

    /// Live (not yet closed) watchers on exactly `target`.
    pub fn active_watchers(&self, target: &str) -> usize {
        self.lock()
            .watchers
            .iter()
            .filter(|watcher| watcher.path == target && !watcher.tx.is_closed())
            .count()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn read_calls(&self) -> usize {
        self.lock().read_calls
    }

    /// Makes every future `watch` on `target` fail.
    pub fn fail_watch(&self, target: &str, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing_watches.insert(target.to_string());
        } else {
            state.failing_watches.remove(target);
        }
    }

    /// Ends every subscription on `target` as if the backend gave up on it.
    pub fn terminate_watchers(&self, target: &str) -> usize {
        let mut state = self.lock();
        let before = state.watchers.len();
        state.watchers.retain(|watcher| watcher.path != target);
        before - state.watchers.len()
    }

    pub fn fail_writes(&self, failing: bool) {
        self.lock().fail_writes = failing;
    }

    /// Simulates an edit made outside the synchronizer.
    pub fn external_write(&self, target: &str, bytes: &[u8]) -> Result<()> {
        let mut state = self.lock();
        let fail_writes = std::mem::take(&mut state.fail_writes);
        let result = state.write(target, bytes.to_vec());
        state.fail_writes = fail_writes;
        result
    }

    pub fn external_mkdir(&self, target: &str) -> Result<()> {
        self.lock().mkdir(target)
    }

    pub fn external_remove(&self, target: &str) -> Result<()> {
        self.lock().remove(target, true)
    }

    pub fn external_rename(&self, from: &str, to: &str) -> Result<()> {
        self.lock().rename(from, to)
    }
}

impl FsProvider for MemoryFsProvider {
    fn list(&self, path: String) -> FsFuture<Result<Vec<DirEntryInfo>>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move { lock_state(&state).list(&path) })
    }

    fn read_file(&self, path: String) -> FsFuture<Result<Vec<u8>>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move { lock_state(&state).read(&path) })
    }

    fn write_file(&self, path: String, bytes: Vec<u8>) -> FsFuture<Result<()>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move { lock_state(&state).write(&path, bytes) })
    }

    fn create_file(&self, path: String) -> FsFuture<Result<()>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move { lock_state(&state).create(&path) })
    }

    fn mkdir(&self, path: String) -> FsFuture<Result<()>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move { lock_state(&state).mkdir(&path) })
    }

    fn remove(&self, path: String, recursive: bool) -> FsFuture<Result<()>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move { lock_state(&state).remove(&path, recursive) })
    }

    fn rename(&self, from: String, to: String) -> FsFuture<Result<()>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move { lock_state(&state).rename(&from, &to) })
    }

    fn watch(&self, path: String, recursive: bool) -> FsFuture<Result<WatchStream>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move { lock_state(&state).watch(&path, recursive) })
    }
}

fn lock_state(state: &Mutex<MemState>) -> MutexGuard<'_, MemState> {
    state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/file/memory.rs"]
mod tests;
