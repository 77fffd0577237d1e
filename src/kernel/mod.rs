//! Headless synchronizer core.

pub mod error;
pub mod reconcile;
pub mod services;
pub mod state;
pub mod sync;
pub mod watch;

pub use error::{SyncError, SyncResult};
pub use reconcile::{diff_listing, DirDiff};
pub use state::SyncState;
pub use sync::Synchronizer;
pub use watch::{WatchRegistry, WatchState};
