//! Disk-backed provider rooted at a workspace directory.
//!
//! Canonical paths are joined under the root; watch notifications from
//! `notify` are normalized back into canonical paths.

use crate::kernel::services::ports::file::{
    DirEntryInfo, FsError, FsFuture, FsProvider, Result, WatchEvent, WatchStream,
};
use crate::models::path;
use notify::event::ModifyKind;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::unbounded_channel;

#[derive(Clone)]
pub struct LocalFsProvider {
    root: Arc<PathBuf>,
}

impl LocalFsProvider {
    pub fn new(root: &Path) -> Self {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        Self {
            root: Arc::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn absolute(&self, canonical: &str) -> PathBuf {
        absolute_path(&self.root, canonical)
    }
}

fn absolute_path(root: &Path, canonical: &str) -> PathBuf {
    if canonical.is_empty() {
        root.to_path_buf()
    } else {
        canonical
            .split(path::SEPARATOR)
            .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
    }
}

/// Canonical path of `absolute` relative to `root`, if it lies inside it.
fn canonical_path(root: &Path, absolute: &Path) -> Option<String> {
    let relative = match absolute.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => absolute
            .canonicalize()
            .ok()?
            .strip_prefix(root)
            .ok()?
            .to_path_buf(),
    };
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => segments.push(name.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(segments.join("/"))
}

async fn entry_kind(path: &Path) -> Option<crate::models::EntryKind> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    if meta.is_dir() {
        Some(crate::models::EntryKind::Directory)
    } else if meta.is_file() {
        Some(crate::models::EntryKind::File)
    } else {
        None
    }
}

/// Translates one `notify` event into contract events.
///
/// Create/remove/rename become one structural event per affected directory,
/// data changes on files become content events, metadata-only noise is
/// dropped.
pub(crate) fn normalize_notify_event(root: &Path, event: notify::Event) -> Vec<WatchEvent> {
    let mut events: Vec<WatchEvent> = Vec::new();
    let mut push = |event: WatchEvent| {
        if !events.contains(&event) {
            events.push(event);
        }
    };

    match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            for changed in &event.paths {
                if let Some(canonical) = canonical_path(root, changed) {
                    if canonical.is_empty() {
                        continue;
                    }
                    push(WatchEvent::structural(path::parent_of(&canonical)));
                }
            }
        }
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other) => {
            for changed in &event.paths {
                let Some(canonical) = canonical_path(root, changed) else {
                    continue;
                };
                match std::fs::metadata(changed) {
                    Ok(meta) if meta.is_dir() => push(WatchEvent::structural(canonical)),
                    Ok(_) => push(WatchEvent::content(canonical)),
                    Err(_) => {
                        if !canonical.is_empty() {
                            push(WatchEvent::structural(path::parent_of(&canonical)));
                        }
                    }
                }
            }
        }
        _ => {}
    }

    events
}

impl FsProvider for LocalFsProvider {
    fn list(&self, path: String) -> FsFuture<Result<Vec<DirEntryInfo>>> {
        let dir = self.absolute(&path);
        Box::pin(async move {
            let mut read_dir = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| FsError::from_io(path.clone(), &e))?;
            let mut entries = Vec::new();
            loop {
                let entry = match read_dir.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => return Err(FsError::from_io(path, &e)),
                };
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Some(kind) = entry_kind(&entry.path()).await {
                    entries.push(DirEntryInfo { name, kind });
                }
            }
            Ok(entries)
        })
    }

    fn read_file(&self, path: String) -> FsFuture<Result<Vec<u8>>> {
        let file = self.absolute(&path);
        Box::pin(async move {
            tokio::fs::read(&file)
                .await
                .map_err(|e| FsError::from_io(path, &e))
        })
    }

    fn write_file(&self, path: String, bytes: Vec<u8>) -> FsFuture<Result<()>> {
        let file = self.absolute(&path);
        Box::pin(async move {
            tokio::fs::write(&file, bytes)
                .await
                .map_err(|e| FsError::from_io(path, &e))
        })
    }

    fn create_file(&self, path: String) -> FsFuture<Result<()>> {
        let file = self.absolute(&path);
        Box::pin(async move {
            tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&file)
                .await
                .map(drop)
                .map_err(|e| FsError::from_io(path, &e))
        })
    }

    fn mkdir(&self, path: String) -> FsFuture<Result<()>> {
        let dir = self.absolute(&path);
        Box::pin(async move {
            tokio::fs::create_dir(&dir)
                .await
                .map_err(|e| FsError::from_io(path, &e))
        })
    }

    fn remove(&self, path: String, recursive: bool) -> FsFuture<Result<()>> {
        let target = self.absolute(&path);
        Box::pin(async move {
            let meta = tokio::fs::symlink_metadata(&target)
                .await
                .map_err(|e| FsError::from_io(path.clone(), &e))?;
            let result = if meta.is_dir() {
                if recursive {
                    tokio::fs::remove_dir_all(&target).await
                } else {
                    tokio::fs::remove_dir(&target).await
                }
            } else {
                tokio::fs::remove_file(&target).await
            };
            result.map_err(|e| FsError::from_io(path, &e))
        })
    }

    fn rename(&self, from: String, to: String) -> FsFuture<Result<()>> {
        let source = self.absolute(&from);
        let target = self.absolute(&to);
        Box::pin(async move {
            if !tokio::fs::try_exists(&source)
                .await
                .map_err(|e| FsError::from_io(from.clone(), &e))?
            {
                return Err(FsError::NotFound(from));
            }
            if tokio::fs::try_exists(&target)
                .await
                .map_err(|e| FsError::from_io(to.clone(), &e))?
            {
                return Err(FsError::AlreadyExists(to));
            }
            tokio::fs::rename(&source, &target)
                .await
                .map_err(|e| FsError::from_io(from, &e))
        })
    }

    fn watch(&self, path: String, recursive: bool) -> FsFuture<Result<WatchStream>> {
        let root = Arc::clone(&self.root);
        let target = self.absolute(&path);
        Box::pin(async move {
            let (tx, rx) = unbounded_channel();
            let callback_root = Arc::clone(&root);
            let mut watcher = RecommendedWatcher::new(
                move |res: std::result::Result<notify::Event, notify::Error>| {
                    let Ok(event) = res else { return };
                    for normalized in normalize_notify_event(&callback_root, event) {
                        let _ = tx.send(normalized);
                    }
                },
                Config::default(),
            )
            .map_err(|e| FsError::io(path.clone(), e))?;
            let mode = if recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher.watch(&target, mode).map_err(|e| match e.kind {
                notify::ErrorKind::PathNotFound => FsError::NotFound(path.clone()),
                _ => FsError::io(path.clone(), e),
            })?;
            tracing::debug!(path = %path, recursive, "local watch established");
            Ok(WatchStream::with_guard(rx, watcher))
        })
    }
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/file/local.rs"]
mod tests;
