//! Cooperative shutdown for the watch thread.
//!
//! A stop request wakes the loop wherever it is blocked: in the idle
//! `select!` over the notification channel, or inside a cycle's gate wait.

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::reduce::{CompletionGate, GateWait};

#[derive(Debug)]
struct StopState {
    requested: AtomicBool,
    wake_tx: Sender<()>,
    active_gate: Mutex<Option<CompletionGate>>,
}

/// Requests the watch loop to exit. Cheap to clone; safe to call repeatedly.
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: Arc<StopState>,
}

impl StopHandle {
    /// Ask the loop to exit at its next blocking point.
    pub fn stop(&self) {
        if self.state.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.state.wake_tx.try_send(());
        if let Some(gate) = self.state.active_gate.lock().as_ref() {
            gate.interrupt();
        }
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }
}

/// Loop-side half of the stop pair.
#[derive(Debug)]
pub(crate) struct StopListener {
    state: Arc<StopState>,
    wake_rx: Receiver<()>,
}

impl StopListener {
    pub(crate) fn is_stopped(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.wake_rx
    }

    /// Block on `gate` unless a stop arrives first.
    pub(crate) fn wait_gate(&self, gate: &CompletionGate) -> GateWait {
        *self.state.active_gate.lock() = Some(gate.clone());
        // Registered before the flag check: a concurrent stop either sees the
        // gate or is seen here.
        if self.is_stopped() {
            gate.interrupt();
        }
        let outcome = gate.wait();
        self.state.active_gate.lock().take();
        outcome
    }
}

pub(crate) fn stop_pair() -> (StopHandle, StopListener) {
    let (wake_tx, wake_rx) = bounded(1);
    let state = Arc::new(StopState {
        requested: AtomicBool::new(false),
        wake_tx,
        active_gate: Mutex::new(None),
    });
    (
        StopHandle {
            state: Arc::clone(&state),
        },
        StopListener { state, wake_rx },
    )
}
