use std::path::PathBuf;
use thiserror::Error;

pub type WatchResult<T> = Result<T, WatchError>;

/// Errors from the filesystem watch layer
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to create watch backend: {0}")]
    Backend(#[from] notify::Error),

    #[error("Failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("Failed to unwatch {}: {source}", path.display())]
    Unwatch {
        path: PathBuf,
        source: notify::Error,
    },
}

pub type ProjectResult<T> = Result<T, ProjectError>;

/// Errors from the project facade
#[derive(Debug, Error)]
pub enum ProjectError {
    /// The coordinator task has exited; the handle can only be dropped
    #[error("Project is closed")]
    Closed,

    #[error(transparent)]
    Watch(#[from] WatchError),
}
