//! Workspace file-tree synchronizer.
//!
//! A [`Synchronizer`] owns the in-memory mirror of one workspace: the entry
//! store, the open tabs, the expanded directories and one watch per expanded
//! directory. User operations write through to the provider; watch events are
//! routed through a bounded channel into a single reconcile task. Every state
//! transition runs under one lock that is never held across an `.await`.

use super::error::{SyncError, SyncResult};
use super::reconcile::DirDiff;
use super::services::bus::{change_bus, ChangeBus, ChangeCause, ChangeReceiver, StoreChange};
use super::services::ports::{FsProvider, SyncConfig, WatchEventKind};
use super::state::SyncState;
use super::watch::{RoutedEvent, WatchSignal, WatchState};
use crate::models::{flatten_for_view, path, project, Entry, EntryKind, Tab, TreeNode, TreeRow};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANGE_BUS_CAPACITY: usize = 64;

struct Inner {
    provider: Arc<dyn FsProvider>,
    config: SyncConfig,
    state: Mutex<SyncState>,
    bus: ChangeBus,
    reconciler: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let reconciler = self
            .reconciler
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = reconciler.take() {
            task.abort();
        }
    }
}

#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<Inner>,
}

impl Synchronizer {
    /// Lists and watches the workspace root and spawns the reconcile task.
    ///
    /// Must be called from within a tokio runtime. Failing to list the root
    /// is an error; failing to watch it is only logged.
    pub async fn start(provider: Arc<dyn FsProvider>, config: SyncConfig) -> SyncResult<Self> {
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity());
        let inner = Arc::new(Inner {
            provider,
            state: Mutex::new(SyncState::new(events_tx)),
            bus: change_bus(CHANGE_BUS_CAPACITY),
            reconciler: Mutex::new(None),
            config,
        });
        let task = tokio::spawn(run_reconciler(Arc::downgrade(&inner), events_rx));
        *lock(&inner.reconciler) = Some(task);

        let sync = Self { inner };
        sync.reconcile_dir(path::ROOT).await?;
        {
            let mut state = sync.state();
            state.expanded.insert(path::ROOT.to_string());
        }
        if let Err(err) = sync.acquire_watch(path::ROOT).await {
            tracing::warn!(error = %err, "workspace root is not watched");
        }
        tracing::info!(entries = sync.state().entries.len(), "synchronizer started");
        Ok(sync)
    }

    /// Releases every watch and stops the reconcile task.
    pub fn shutdown(&self) {
        self.state().watches.release_all();
        if let Some(task) = lock(&self.inner.reconciler).take() {
            task.abort();
        }
        tracing::info!("synchronizer stopped");
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        lock(&self.inner.state)
    }

    fn provider(&self) -> &dyn FsProvider {
        self.inner.provider.as_ref()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> ChangeReceiver {
        self.inner.bus.subscribe()
    }

    pub fn version(&self) -> u64 {
        self.state().version
    }

    pub fn projection(&self) -> Vec<TreeNode> {
        project(&self.state().entries)
    }

    /// Rows a tree view shows, descending only into expanded directories.
    pub fn visible_rows(&self) -> Vec<TreeRow> {
        let state = self.state();
        flatten_for_view(&project(&state.entries), &state.expanded)
    }

    pub fn active_selection(&self) -> Option<String> {
        self.state().tabs.active().map(str::to_string)
    }

    pub fn open_tabs(&self) -> Vec<Tab> {
        self.state().tabs.tabs().to_vec()
    }

    pub fn entry(&self, target: &str) -> Option<Entry> {
        self.state().entries.get(&path::canonicalize(target)).cloned()
    }

    /// Every entry, sorted by path.
    pub fn entries(&self) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self.state().entries.all().cloned().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    pub fn is_expanded(&self, dir: &str) -> bool {
        self.state().expanded.contains(&path::canonicalize(dir))
    }

    pub fn watch_state(&self, dir: &str) -> WatchState {
        self.state().watches.state(&path::canonicalize(dir))
    }

    pub fn is_watching(&self, dir: &str) -> bool {
        self.watch_state(dir) == WatchState::Watching
    }

    pub fn watched_paths(&self) -> Vec<String> {
        self.state().watches.paths()
    }

    /// Loads the listing of `dir`, marks it expanded and watches it.
    ///
    /// Calling it again on an expanded directory re-lists it and re-acquires
    /// a watch that was lost.
    pub async fn expand(&self, dir: &str) -> SyncResult<()> {
        let dir = path::canonicalize(dir);
        self.state().require_directory(&dir)?;
        if self.reconcile_dir(&dir).await?.is_none() {
            return Err(SyncError::NotFound(dir));
        }
        {
            let mut state = self.state();
            if state.expanded.insert(dir.clone()) {
                self.commit(&mut state, ChangeCause::Expanded { path: dir.clone() });
            }
        }
        self.acquire_watch(&dir).await?;
        Ok(())
    }

    /// Releases the watch on `dir`. Entries already loaded stay in the store.
    pub fn collapse(&self, dir: &str) {
        let dir = path::canonicalize(dir);
        let mut state = self.state();
        state.watches.release(&dir);
        if state.expanded.remove(&dir) {
            self.commit(&mut state, ChangeCause::Collapsed { path: dir });
        }
    }

    /// Makes the file at `target` the active selection, opening a tab for it.
    pub fn activate(&self, target: &str) -> SyncResult<()> {
        let target = path::canonicalize(target);
        let mut state = self.state();
        if state.activate(&target)? {
            self.commit(&mut state, ChangeCause::Selection);
        }
        Ok(())
    }

    /// Activates `target` and loads its current bytes from the provider.
    pub async fn open_file(&self, target: &str) -> SyncResult<Entry> {
        let target = path::canonicalize(target);
        self.activate(&target)?;
        let bytes = self.provider().read_file(target.clone()).await?;
        let mut state = self.state();
        if state.refresh_content(&target, String::from_utf8_lossy(&bytes).into_owned()) {
            self.commit(&mut state, ChangeCause::ContentRefreshed { path: target.clone() });
        }
        state
            .entries
            .get(&target)
            .cloned()
            .ok_or(SyncError::NotFound(target))
    }

    pub fn close(&self, target: &str) -> bool {
        let target = path::canonicalize(target);
        let mut state = self.state();
        let closed = state.tabs.close(&target);
        if closed {
            self.commit(&mut state, ChangeCause::Tabs);
        }
        closed
    }

    /// Creates an empty file or a directory named `name` under `parent`.
    pub async fn create_entry(&self, parent: &str, name: &str, kind: EntryKind) -> SyncResult<String> {
        let parent = path::canonicalize(parent);
        let full = self.state().validate_create(&parent, name)?;

        let created = match kind {
            EntryKind::File => self.provider().create_file(full.clone()).await,
            EntryKind::Directory => self.provider().mkdir(full.clone()).await,
        };
        if let Err(err) = created {
            tracing::warn!(path = %full, error = %err, "create failed");
            return Err(err.into());
        }

        let mut state = self.state();
        if state.apply_created(&full, kind) {
            self.commit(&mut state, ChangeCause::Created { path: full.clone() });
        }
        Ok(full)
    }

    /// Removes `target` and its subtree, closing tabs that pointed into it.
    pub async fn delete_entry(&self, target: &str) -> SyncResult<()> {
        let target = path::canonicalize(target);
        if target.is_empty() {
            return Err(SyncError::InvalidPath(target));
        }
        if let Err(err) = self.provider().remove(target.clone(), true).await {
            tracing::warn!(path = %target, error = %err, "delete failed");
            return Err(err.into());
        }

        let mut state = self.state();
        if state.remove_subtree(&target) {
            self.commit(&mut state, ChangeCause::Deleted { path: target });
        }
        Ok(())
    }

    /// Renames `from` to `to`, carrying its subtree, tabs and watches along.
    pub async fn rename_entry(&self, from: &str, to: &str) -> SyncResult<()> {
        let from = path::canonicalize(from);
        let to = path::canonicalize(to);
        self.state().validate_rename(&from, &to)?;

        if let Err(err) = self.provider().rename(from.clone(), to.clone()).await {
            tracing::warn!(from = %from, to = %to, error = %err, "rename failed");
            return Err(err.into());
        }

        let rewatch = {
            let mut state = self.state();
            let rewatch = state.apply_renamed(&from, &to);
            self.commit(
                &mut state,
                ChangeCause::Renamed {
                    from: from.clone(),
                    to: to.clone(),
                },
            );
            rewatch
        };
        for dir in rewatch {
            if let Err(err) = self.acquire_watch(&dir).await {
                tracing::warn!(path = %dir, error = %err, "watch lost after rename");
            }
        }
        Ok(())
    }

    /// Moves `source` into `target_dir`, keeping its name.
    pub async fn move_entry(&self, source: &str, target_dir: &str) -> SyncResult<String> {
        let source = path::canonicalize(source);
        let target_dir = path::canonicalize(target_dir);
        let dest = path::join(&target_dir, path::file_name(&source));
        if dest == source {
            return Ok(dest);
        }
        self.rename_entry(&source, &dest).await?;
        Ok(dest)
    }

    /// Stores `content` locally, then writes it to the provider.
    ///
    /// A failed write is returned but the local content is kept.
    pub async fn write_content(&self, target: &str, content: String) -> SyncResult<()> {
        let target = path::canonicalize(target);
        {
            let mut state = self.state();
            if state.apply_local_write(&target, content.clone())? {
                self.commit(&mut state, ChangeCause::ContentWritten { path: target.clone() });
            }
        }
        if let Err(err) = self.provider().write_file(target.clone(), content.into_bytes()).await {
            tracing::warn!(path = %target, error = %err, "write failed; local content kept");
            return Err(err.into());
        }
        Ok(())
    }

    fn commit(&self, state: &mut SyncState, cause: ChangeCause) {
        let version = state.bump_version();
        tracing::trace!(version, cause = ?cause, "store changed");
        self.inner.bus.publish(StoreChange { version, cause });
    }

    /// Re-lists `dir` and applies the diff against its children in the store.
    ///
    /// `Ok(None)` means `dir` left the store while the listing was in flight.
    async fn reconcile_dir(&self, dir: &str) -> SyncResult<Option<DirDiff>> {
        let mut listing = self.provider().list(dir.to_string()).await?;
        listing.retain(|info| !self.inner.config.should_ignore(&info.name));

        let mut state = self.state();
        let Some(diff) = state.apply_listing(dir, &listing) else {
            tracing::debug!(path = %dir, "stale listing discarded");
            return Ok(None);
        };
        if !diff.is_empty() {
            tracing::debug!(
                path = %dir,
                added = diff.added.len(),
                removed = diff.removed.len(),
                "reconciled"
            );
            self.commit(&mut state, ChangeCause::Reconciled { dir: dir.to_string() });
        }
        Ok(Some(diff))
    }

    /// Subscribes to `dir` unless it is already watched or pending.
    async fn acquire_watch(&self, dir: &str) -> SyncResult<bool> {
        let Some(generation) = self.state().watches.begin_acquire(dir) else {
            return Ok(false);
        };
        match self.provider().watch(dir.to_string(), false).await {
            Ok(stream) => Ok(self
                .state()
                .watches
                .complete_acquire(dir, generation, stream)),
            Err(err) => {
                self.state().watches.fail_acquire(dir, generation);
                tracing::warn!(path = %dir, error = %err, "watch failed");
                Err(SyncError::watch(dir, err))
            }
        }
    }

    async fn handle_routed(&self, routed: RoutedEvent) {
        let RoutedEvent {
            watched,
            generation,
            signal,
        } = routed;
        if !self.state().watches.is_current(&watched, generation) {
            tracing::debug!(path = %watched, generation, "stale watch event dropped");
            return;
        }
        match signal {
            WatchSignal::Terminated => {
                let mut state = self.state();
                if state.watches.release(&watched) {
                    tracing::warn!(path = %watched, "watch terminated by provider");
                    self.commit(&mut state, ChangeCause::WatchLost { path: watched });
                }
            }
            WatchSignal::Event(event) => match event.kind {
                WatchEventKind::Structural => {
                    if !self.state().entries.is_directory(&event.path) {
                        return;
                    }
                    match self.reconcile_dir(&event.path).await {
                        Ok(_) => {}
                        Err(SyncError::NotFound(_)) => {
                            tracing::debug!(path = %event.path, "directory vanished before listing");
                        }
                        Err(err) => {
                            tracing::warn!(path = %event.path, error = %err, "reconcile failed");
                        }
                    }
                }
                WatchEventKind::Content => self.refresh_if_active(&event.path).await,
            },
        }
    }

    /// Re-reads `target` only when it is the active selection.
    async fn refresh_if_active(&self, target: &str) {
        if self.state().tabs.active() != Some(target) {
            return;
        }
        let bytes = match self.provider().read_file(target.to_string()).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(path = %target, error = %err, "content refresh skipped");
                return;
            }
        };
        let mut state = self.state();
        if state.tabs.active() != Some(target) {
            return;
        }
        if state.refresh_content(target, String::from_utf8_lossy(&bytes).into_owned()) {
            self.commit(&mut state, ChangeCause::ContentRefreshed { path: target.to_string() });
        }
    }
}

async fn run_reconciler(inner: Weak<Inner>, mut events: mpsc::Receiver<RoutedEvent>) {
    while let Some(routed) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        Synchronizer { inner }.handle_routed(routed).await;
    }
    tracing::debug!("reconcile task finished");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[path = "../../tests/unit/kernel/sync.rs"]
mod tests;
