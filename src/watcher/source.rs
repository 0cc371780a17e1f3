//! Change notifications from the input directory.
//!
//! Wraps a `notify::RecommendedWatcher` registered non-recursively on the
//! input directory. The watcher callback converts each notify event into
//! zero or more [`ChangeNotification`]s and pushes them onto a channel that
//! the watch thread drains with a blocking `select!`.

use std::fmt;
use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};

use super::error::WatchError;
use super::stop::StopListener;

/// Kind of change reported for an entry of the input directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    /// Classify a notify event kind. Access and unclassified events yield `None`.
    pub fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(ChangeKind::Created),
            EventKind::Modify(_) => Some(ChangeKind::Modified),
            EventKind::Remove(_) => Some(ChangeKind::Deleted),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChangeKind::Created => "CREATE",
            ChangeKind::Modified => "MODIFY",
            ChangeKind::Deleted => "DELETE",
        };
        f.write_str(label)
    }
}

/// A raw, undebounced notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// Affected entry name, relative to the watched directory.
    pub name: String,
    /// Full path as reported by the OS.
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeNotification {
    /// Build a notification, deriving the name from the last path component.
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { name, path, kind }
    }

    /// One notification per path carried by a notify event.
    pub fn from_event(event: &Event) -> Vec<Self> {
        let Some(kind) = ChangeKind::from_notify(&event.kind) else {
            return Vec::new();
        };
        event
            .paths
            .iter()
            .map(|path| Self::new(path.clone(), kind))
            .collect()
    }
}

/// What the source produced on one blocking read.
#[derive(Debug)]
pub(crate) enum SourceStep {
    Notification(ChangeNotification),
    Stopped,
    Closed,
}

/// Blocking sequence of notifications for one directory.
///
/// Owns the native watcher; dropping the source releases it.
pub struct ChangeEventSource {
    notifications: Receiver<ChangeNotification>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl ChangeEventSource {
    /// Register the platform watcher on `dir`.
    pub fn watch(dir: &Path) -> Result<Self, WatchError> {
        let (tx, rx) = unbounded();
        let mut watcher = notify::recommended_watcher(forwarder(tx))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
        crate::debug_event!("watcher", "watching", "{}", dir.display());

        Ok(Self {
            notifications: rx,
            _watcher: Some(watcher),
        })
    }

    /// Use an arbitrary producer instead of the platform watcher.
    ///
    /// The source closes once every sender is dropped.
    pub fn from_channel(notifications: Receiver<ChangeNotification>) -> Self {
        Self {
            notifications,
            _watcher: None,
        }
    }

    /// Whether this source is backed by the platform watcher.
    pub fn is_native(&self) -> bool {
        self._watcher.is_some()
    }

    /// Block until a notification, a stop request, or closure of the source.
    pub(crate) fn next(&self, stop: &StopListener) -> SourceStep {
        if stop.is_stopped() {
            return SourceStep::Stopped;
        }
        select! {
            recv(stop.receiver()) -> _ => SourceStep::Stopped,
            recv(self.notifications) -> msg => match msg {
                Ok(notification) => SourceStep::Notification(notification),
                Err(_) => SourceStep::Closed,
            },
        }
    }
}

impl fmt::Debug for ChangeEventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEventSource")
            .field("native", &self.is_native())
            .field("queued", &self.notifications.len())
            .finish()
    }
}

fn forwarder(tx: Sender<ChangeNotification>) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for notification in ChangeNotification::from_event(&event) {
                // Receiver gone means the loop already exited.
                let _ = tx.send(notification);
            }
        }
        Err(e) => {
            tracing::error!("[watcher] file watch error: {e}");
        }
    }
}
