//! One-shot countdown barrier for a single reduce cycle.
//!
//! A [`CompletionGate`] is created per cycle with a count equal to the number
//! of reducers. Each reducer holds a [`CompletionSignal`] that releases one
//! unit of the count exactly once: either explicitly through
//! [`CompletionSignal::done`] or implicitly when the signal is dropped.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct GateState {
    remaining: usize,
    interrupted: bool,
}

#[derive(Debug)]
struct GateInner {
    state: Mutex<GateState>,
    released: Condvar,
}

/// Result of blocking on a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateWait {
    /// The count reached zero.
    Released,
    /// [`CompletionGate::interrupt`] was called before the count reached zero.
    Interrupted,
}

/// Countdown barrier shared between the watch thread and reducer tasks.
///
/// Cloning shares the same count.
#[derive(Debug, Clone)]
pub struct CompletionGate {
    inner: Arc<GateInner>,
}

impl CompletionGate {
    /// Create a gate that releases after `count` decrements.
    pub fn new(count: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                state: Mutex::new(GateState {
                    remaining: count,
                    interrupted: false,
                }),
                released: Condvar::new(),
            }),
        }
    }

    /// Number of decrements still outstanding.
    pub fn remaining(&self) -> usize {
        self.inner.state.lock().remaining
    }

    /// Whether the count has reached zero.
    pub fn is_released(&self) -> bool {
        self.remaining() == 0
    }

    /// Decrement the count, waking the waiter when it reaches zero.
    ///
    /// Saturates at zero.
    pub fn count_down(&self) {
        let mut state = self.inner.state.lock();
        if state.remaining == 0 {
            return;
        }
        state.remaining -= 1;
        if state.remaining == 0 {
            self.inner.released.notify_all();
        }
    }

    /// Issue a signal token bound to this gate.
    ///
    /// The dispatcher hands out exactly one token per reducer.
    pub fn signal(&self) -> CompletionSignal {
        CompletionSignal {
            gate: Some(self.clone()),
        }
    }

    /// Wake any waiter without releasing the count.
    ///
    /// Sticky: later waits return [`GateWait::Interrupted`] immediately.
    pub fn interrupt(&self) {
        let mut state = self.inner.state.lock();
        state.interrupted = true;
        self.inner.released.notify_all();
    }

    /// Block until the count reaches zero or the gate is interrupted.
    pub fn wait(&self) -> GateWait {
        let mut state = self.inner.state.lock();
        loop {
            if state.remaining == 0 {
                return GateWait::Released;
            }
            if state.interrupted {
                return GateWait::Interrupted;
            }
            self.inner.released.wait(&mut state);
        }
    }

    /// Block for at most `timeout`. Returns `None` if the deadline passed first.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<GateWait> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if state.remaining == 0 {
                return Some(GateWait::Released);
            }
            if state.interrupted {
                return Some(GateWait::Interrupted);
            }
            if self
                .inner
                .released
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return match (state.remaining, state.interrupted) {
                    (0, _) => Some(GateWait::Released),
                    (_, true) => Some(GateWait::Interrupted),
                    _ => None,
                };
            }
        }
    }
}

/// A single reducer's right to decrement its cycle's gate.
///
/// Consumed by [`done`](Self::done); dropping an unused signal also counts
/// down, so a reducer that errors or panics cannot leave the gate stuck.
/// A signal that is leaked (for example moved into work that never ends)
/// keeps the gate closed.
#[derive(Debug)]
#[must_use = "dropping a signal releases it immediately"]
pub struct CompletionSignal {
    gate: Option<CompletionGate>,
}

impl CompletionSignal {
    /// Release this signal's unit of the gate.
    pub fn done(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.count_down();
        }
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        self.release();
    }
}
