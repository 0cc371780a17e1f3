//! Collapses the OS double-fire into one logical event.
//!
//! Saving a file is reported as two consecutive modifications: a metadata
//! touch followed by the content write. The debouncer drops the first half
//! and forwards the second.
//!
//! Two modes exist:
//! - [`DebounceMode::Alternation`] (default) keeps a single global state and
//!   pairs notifications purely by arrival order, whatever file they name.
//! - [`DebounceMode::Keyed`] tracks the pending half per entry name, so
//!   interleaved edits to different files pair up correctly.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::source::{ChangeKind, ChangeNotification};

/// How notifications are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceMode {
    #[default]
    Alternation,
    Keyed,
}

/// Alternation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    AwaitingSecondEvent,
}

/// A debounced change that triggers one map + reduce cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalEvent {
    pub name: String,
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl From<ChangeNotification> for LogicalEvent {
    fn from(n: ChangeNotification) -> Self {
        Self {
            name: n.name,
            path: n.path,
            kind: n.kind,
        }
    }
}

/// Pairs raw notifications into logical events.
#[derive(Debug)]
pub enum Debouncer {
    Alternation { state: DebounceState },
    Keyed { pending: HashSet<String> },
}

impl Debouncer {
    pub fn new(mode: DebounceMode) -> Self {
        match mode {
            DebounceMode::Alternation => Debouncer::Alternation {
                state: DebounceState::Idle,
            },
            DebounceMode::Keyed => Debouncer::Keyed {
                pending: HashSet::new(),
            },
        }
    }

    pub fn mode(&self) -> DebounceMode {
        match self {
            Debouncer::Alternation { .. } => DebounceMode::Alternation,
            Debouncer::Keyed { .. } => DebounceMode::Keyed,
        }
    }

    /// Feed one raw notification.
    ///
    /// Returns the logical event when `notification` completes a pair.
    pub fn observe(&mut self, notification: ChangeNotification) -> Option<LogicalEvent> {
        match self {
            Debouncer::Alternation { state } => match *state {
                DebounceState::Idle => {
                    *state = DebounceState::AwaitingSecondEvent;
                    None
                }
                DebounceState::AwaitingSecondEvent => {
                    *state = DebounceState::Idle;
                    Some(notification.into())
                }
            },
            Debouncer::Keyed { pending } => {
                if pending.remove(&notification.name) {
                    Some(notification.into())
                } else {
                    pending.insert(notification.name);
                    None
                }
            }
        }
    }

    /// Current state. In keyed mode, `AwaitingSecondEvent` means some name is pending.
    pub fn state(&self) -> DebounceState {
        match self {
            Debouncer::Alternation { state } => *state,
            Debouncer::Keyed { pending } if pending.is_empty() => DebounceState::Idle,
            Debouncer::Keyed { .. } => DebounceState::AwaitingSecondEvent,
        }
    }

    /// Number of entries waiting for their second half.
    pub fn pending_count(&self) -> usize {
        match self {
            Debouncer::Alternation { state } => {
                usize::from(*state == DebounceState::AwaitingSecondEvent)
            }
            Debouncer::Keyed { pending } => pending.len(),
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DebounceMode::default())
    }
}
