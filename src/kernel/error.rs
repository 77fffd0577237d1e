use crate::kernel::services::ports::FsError;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The target vanished between decision and execution.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("i/o failure on {path}: {message}")]
    IoFailure { path: String, message: String },
    #[error("cannot watch {path}: {message}")]
    WatchFailure { path: String, message: String },
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl SyncError {
    pub fn watch(path: impl Into<String>, err: FsError) -> Self {
        SyncError::WatchFailure {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<FsError> for SyncError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound(path) => SyncError::NotFound(path),
            FsError::AlreadyExists(path) => SyncError::AlreadyExists(path),
            FsError::NotADirectory(path) => SyncError::NotADirectory(path),
            FsError::Io { path, message } => SyncError::IoFailure { path, message },
        }
    }
}
