//! Service ports: traits + data contracts.

pub mod config;
pub mod file;

pub use config::SyncConfig;
pub use file::{
    DirEntryInfo, FsError, FsFuture, FsProvider, Result as FsResult, WatchEvent, WatchEventKind,
    WatchStream,
};
