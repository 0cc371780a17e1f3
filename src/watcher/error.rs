//! Error types for the watch loop.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a running watch loop.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Cannot create directory {path}: {source}")]
    Bootstrap {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Map stage failed for '{name}': {source}")]
    MapFailed {
        name: String,
        source: anyhow::Error,
    },

    #[error("Loop is missing required configuration: {field}")]
    MissingConfig { field: &'static str },

    #[error("Watch thread panicked: {reason}")]
    ThreadPanicked { reason: String },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

/// Render a panic payload for logs and errors.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
