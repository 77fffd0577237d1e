//! File-system provider contract.
//!
//! The synchronizer only ever talks to the authoritative namespace through
//! [`FsProvider`]. Paths handed to a provider are canonical workspace paths
//! (see [`crate::models::path`]).

use crate::models::EntryKind;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc::UnboundedReceiver;

pub type FsFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("i/o error on {path}: {message}")]
    Io { path: String, message: String },
}

impl FsError {
    pub fn io(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        FsError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Maps an OS error onto the contract's error kinds.
    pub fn from_io(path: impl Into<String>, err: &std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(path),
            std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path),
            _ => FsError::io(path, err),
        }
    }
}

/// One immediate child reported by [`FsProvider::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntryInfo {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    /// Something under the watched directory was created, removed or renamed.
    Structural,
    /// The bytes of `path` changed.
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    /// Watched directory for structural events, changed file for content events.
    pub path: String,
}

impl WatchEvent {
    pub fn structural(path: impl Into<String>) -> Self {
        Self {
            kind: WatchEventKind::Structural,
            path: path.into(),
        }
    }

    pub fn content(path: impl Into<String>) -> Self {
        Self {
            kind: WatchEventKind::Content,
            path: path.into(),
        }
    }
}

/// Live subscription returned by [`FsProvider::watch`].
///
/// Dropping or closing the stream ends delivery: the receiver goes away
/// together with whatever backend object produced the events.
pub struct WatchStream {
    rx: UnboundedReceiver<WatchEvent>,
    _guard: Option<Box<dyn Any + Send>>,
}

impl WatchStream {
    pub fn new(rx: UnboundedReceiver<WatchEvent>) -> Self {
        Self { rx, _guard: None }
    }

    /// Keeps `guard` alive for as long as the stream is open.
    pub fn with_guard(rx: UnboundedReceiver<WatchEvent>, guard: impl Any + Send) -> Self {
        Self {
            rx,
            _guard: Some(Box::new(guard)),
        }
    }

    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    pub fn close(mut self) {
        self.rx.close();
    }
}

impl std::fmt::Debug for WatchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchStream").finish_non_exhaustive()
    }
}

pub trait FsProvider: Send + Sync {
    /// Immediate children of the directory at `path`.
    fn list(&self, path: String) -> FsFuture<Result<Vec<DirEntryInfo>>>;

    fn read_file(&self, path: String) -> FsFuture<Result<Vec<u8>>>;

    /// Writes `bytes`, creating the file when absent.
    fn write_file(&self, path: String, bytes: Vec<u8>) -> FsFuture<Result<()>>;

    /// Creates an empty file; fails with `AlreadyExists` if anything lives at `path`.
    fn create_file(&self, path: String) -> FsFuture<Result<()>>;

    fn mkdir(&self, path: String) -> FsFuture<Result<()>>;

    fn remove(&self, path: String, recursive: bool) -> FsFuture<Result<()>>;

    fn rename(&self, from: String, to: String) -> FsFuture<Result<()>>;

    fn watch(&self, path: String, recursive: bool) -> FsFuture<Result<WatchStream>>;
}
