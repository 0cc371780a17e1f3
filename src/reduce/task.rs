//! Reducers, the unit of work submitted for them, and the handle to its result.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError, bounded};
use parking_lot::Mutex;
use thiserror::Error;

use super::gate::CompletionSignal;
use crate::stage::Persistence;
use crate::watcher::error::panic_message;

/// A downstream processor run once per cycle over the map output.
///
/// The reducer's [`CompletionSignal`] is released when `reduce` returns,
/// unless the reducer took it with [`ReduceContext::take_signal`] to release
/// it later from other work.
pub trait Reducer: Send + Sync {
    /// Reducer name for logging and result lookup.
    fn name(&self) -> &str;

    fn reduce(&self, ctx: &mut ReduceContext) -> anyhow::Result<()>;
}

/// Closure-backed [`Reducer`].
pub struct FnReducer<F> {
    name: String,
    f: F,
}

impl<F> FnReducer<F>
where
    F: Fn(&mut ReduceContext) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Reducer for FnReducer<F>
where
    F: Fn(&mut ReduceContext) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn reduce(&self, ctx: &mut ReduceContext) -> anyhow::Result<()> {
        (self.f)(ctx)
    }
}

impl<F> fmt::Debug for FnReducer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnReducer").field("name", &self.name).finish()
    }
}

/// Per-execution inputs handed to [`Reducer::reduce`].
#[derive(Debug)]
pub struct ReduceContext {
    input: PathBuf,
    persistence: Option<Persistence>,
    signal: Option<CompletionSignal>,
}

impl ReduceContext {
    /// Directory holding this cycle's map output.
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// The configured persistence collaborator, if it is a `T`.
    pub fn persistence<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.persistence.as_ref()?.downcast_ref::<T>()
    }

    /// Take ownership of the completion signal to release it later.
    ///
    /// Returns `None` if it was already taken.
    pub fn take_signal(&mut self) -> Option<CompletionSignal> {
        self.signal.take()
    }
}

/// Why a reduce execution did not succeed.
#[derive(Error, Debug)]
pub enum ReduceFailure {
    #[error("reducer failed: {0}")]
    Failed(#[source] anyhow::Error),

    #[error("reducer panicked: {0}")]
    Panicked(String),

    #[error("task was dropped before it ran")]
    Lost,
}

/// Outcome of one reduce execution.
pub type ReduceOutcome = Result<(), ReduceFailure>;

/// Type-erased job as seen by an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// One reducer bound to one cycle, ready to run.
///
/// Dropping a task without running it still releases its gate signal; its
/// handle then reports [`ReduceFailure::Lost`].
pub struct ReduceTask {
    reducer: Arc<dyn Reducer>,
    context: ReduceContext,
}

impl ReduceTask {
    pub(crate) fn new(
        reducer: Arc<dyn Reducer>,
        input: PathBuf,
        persistence: Option<Persistence>,
        signal: CompletionSignal,
    ) -> Self {
        Self {
            reducer,
            context: ReduceContext {
                input,
                persistence,
                signal: Some(signal),
            },
        }
    }

    pub fn reducer_name(&self) -> &str {
        self.reducer.name()
    }

    pub fn input(&self) -> &Path {
        self.context.input()
    }

    /// Split into a runnable job and the handle observing it.
    pub fn into_job(self) -> (Job, TaskHandle) {
        let (tx, rx) = bounded(1);
        let handle = TaskHandle {
            reducer: self.reducer.name().to_string(),
            receiver: Mutex::new(rx),
            outcome: OnceLock::new(),
        };
        let mut task = self;
        let job: Job = Box::new(move || {
            let outcome = task.execute();
            let _ = tx.send(outcome);
            // `task` still holds the gate signal until here.
        });
        (job, handle)
    }

    /// Run the reducer on the current thread.
    pub fn run(mut self) -> ReduceOutcome {
        self.execute()
    }

    fn execute(&mut self) -> ReduceOutcome {
        let name = self.reducer.name().to_string();
        let started = Instant::now();
        crate::debug_event!("reduce", "started", "{name} <- {}", self.context.input.display());

        let result = catch_unwind(AssertUnwindSafe(|| self.reducer.reduce(&mut self.context)));
        match result {
            Ok(Ok(())) => {
                crate::debug_event!("reduce", "finished", "{name} in {:?}", started.elapsed());
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!("[reduce] {name} failed: {e:#}");
                Err(ReduceFailure::Failed(e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("[reduce] {name} panicked: {message}");
                Err(ReduceFailure::Panicked(message))
            }
        }
    }
}

impl fmt::Debug for ReduceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReduceTask")
            .field("reducer", &self.reducer.name())
            .field("input", &self.context.input)
            .finish()
    }
}

/// Handle to an in-flight reduce execution.
///
/// The outcome is received once and cached; every accessor after that
/// returns the same reference.
pub struct TaskHandle {
    reducer: String,
    receiver: Mutex<Receiver<ReduceOutcome>>,
    outcome: OnceLock<ReduceOutcome>,
}

impl TaskHandle {
    /// Name of the reducer this handle belongs to.
    pub fn reducer(&self) -> &str {
        &self.reducer
    }

    /// Block until the execution finishes.
    pub fn outcome(&self) -> &ReduceOutcome {
        if let Some(outcome) = self.outcome.get() {
            return outcome;
        }
        let receiver = self.receiver.lock();
        if let Some(outcome) = self.outcome.get() {
            return outcome;
        }
        let outcome = receiver.recv().unwrap_or(Err(ReduceFailure::Lost));
        self.outcome.get_or_init(|| outcome)
    }

    /// The outcome if already available.
    pub fn try_outcome(&self) -> Option<&ReduceOutcome> {
        if let Some(outcome) = self.outcome.get() {
            return Some(outcome);
        }
        let receiver = self.receiver.try_lock()?;
        if let Some(outcome) = self.outcome.get() {
            return Some(outcome);
        }
        let outcome = match receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Disconnected) => Err(ReduceFailure::Lost),
            Err(TryRecvError::Empty) => return None,
        };
        Some(self.outcome.get_or_init(|| outcome))
    }

    /// Wait at most `timeout` for the outcome.
    pub fn outcome_timeout(&self, timeout: Duration) -> Option<&ReduceOutcome> {
        if let Some(outcome) = self.outcome.get() {
            return Some(outcome);
        }
        let deadline = Instant::now() + timeout;
        let receiver = self.receiver.try_lock_until(deadline)?;
        if let Some(outcome) = self.outcome.get() {
            return Some(outcome);
        }
        let outcome = match receiver.recv_deadline(deadline) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Disconnected) => Err(ReduceFailure::Lost),
            Err(RecvTimeoutError::Timeout) => return None,
        };
        Some(self.outcome.get_or_init(|| outcome))
    }

    /// Whether the execution has finished.
    pub fn is_finished(&self) -> bool {
        self.try_outcome().is_some()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("reducer", &self.reducer)
            .field("outcome", &self.outcome.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::gate::CompletionGate;
    use std::thread;

    fn task(gate: &CompletionGate, reducer: impl Reducer + 'static) -> ReduceTask {
        ReduceTask::new(Arc::new(reducer), PathBuf::from("/out"), None, gate.signal())
    }

    #[test]
    fn test_success_releases_gate_and_reports() {
        let gate = CompletionGate::new(1);
        let t = task(&gate, FnReducer::new("ok", |ctx: &mut ReduceContext| {
            assert_eq!(ctx.input(), Path::new("/out"));
            Ok(())
        }));
        let (job, handle) = t.into_job();
        assert!(handle.try_outcome().is_none());

        job();
        assert!(gate.is_released());
        assert!(handle.outcome().is_ok());
        assert!(handle.is_finished());
    }

    #[test]
    fn test_error_is_captured() {
        let gate = CompletionGate::new(1);
        let t = task(&gate, FnReducer::new("bad", |_: &mut ReduceContext| {
            anyhow::bail!("disk full")
        }));
        let (job, handle) = t.into_job();
        job();

        assert!(gate.is_released());
        match handle.outcome() {
            Err(ReduceFailure::Failed(e)) => assert_eq!(e.to_string(), "disk full"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_panic_is_captured() {
        let gate = CompletionGate::new(1);
        let t = task(&gate, FnReducer::new("boom", |_: &mut ReduceContext| {
            panic!("index out of range")
        }));
        let (job, handle) = t.into_job();
        job();

        assert!(gate.is_released());
        assert!(matches!(handle.outcome(), Err(ReduceFailure::Panicked(m)) if m == "index out of range"));
    }

    #[test]
    fn test_dropped_job_is_lost_but_releases() {
        let gate = CompletionGate::new(1);
        let t = task(&gate, FnReducer::new("never", |_: &mut ReduceContext| Ok(())));
        let (job, handle) = t.into_job();
        drop(job);

        assert!(gate.is_released());
        assert!(matches!(handle.outcome(), Err(ReduceFailure::Lost)));
    }

    #[test]
    fn test_taken_signal_defers_release() {
        let gate = CompletionGate::new(1);
        let (signal_tx, signal_rx) = bounded(1);
        let t = task(&gate, FnReducer::new("deferred", move |ctx: &mut ReduceContext| {
            signal_tx.send(ctx.take_signal()).unwrap();
            Ok(())
        }));
        let (job, handle) = t.into_job();
        job();

        assert!(handle.outcome().is_ok());
        assert_eq!(gate.remaining(), 1);

        let signal = signal_rx.recv().unwrap().unwrap();
        signal.done();
        assert!(gate.is_released());
    }

    #[test]
    fn test_outcome_timeout_while_running() {
        let gate = CompletionGate::new(1);
        let (release_tx, release_rx) = bounded::<()>(0);
        let t = task(&gate, FnReducer::new("slow", move |_: &mut ReduceContext| {
            release_rx.recv().ok();
            Ok(())
        }));
        let (job, handle) = t.into_job();
        let worker = thread::spawn(job);

        assert!(handle.outcome_timeout(Duration::from_millis(30)).is_none());
        release_tx.send(()).unwrap();
        assert!(handle.outcome_timeout(Duration::from_secs(5)).is_some());
        worker.join().unwrap();
    }

    #[test]
    fn test_persistence_downcast() {
        let gate = CompletionGate::new(1);
        let store: Persistence = Arc::new(String::from("mongo://local"));
        let t = ReduceTask::new(
            Arc::new(FnReducer::new("store", |ctx: &mut ReduceContext| {
                assert_eq!(ctx.persistence::<String>().map(String::as_str), Some("mongo://local"));
                assert!(ctx.persistence::<u32>().is_none());
                Ok(())
            })),
            PathBuf::from("/out"),
            Some(store),
            gate.signal(),
        );
        assert!(t.run().is_ok());
    }
}
