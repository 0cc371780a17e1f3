//! The watch → debounce → map → fan-out → join loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::bootstrap::ensure_directories;
use super::debouncer::{DebounceMode, Debouncer, LogicalEvent};
use super::error::{WatchError, panic_message};
use super::source::{ChangeEventSource, ChangeKind, SourceStep};
use super::stop::{StopHandle, StopListener, stop_pair};
use crate::config::WatchConfig;
use crate::reduce::{
    GateWait, ReduceDispatcher, ReduceTask, Reducer, ReducerDescriptor, TaskExecutor, TaskHandle,
};
use crate::stage::{CycleReport, FinishHook, LogOutcomes, MapContext, MapStage, Persistence};

/// What happens to the loop when the map stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// The error ends the loop.
    #[default]
    FailFast,
    /// The error is logged, the cycle's reduce is skipped and the loop goes on.
    Isolate,
}

/// Why [`WatchLoop::run`] returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Every producer of notifications went away.
    SourceClosed,
    /// A [`StopHandle`] requested shutdown.
    Stopped,
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSummary {
    /// Raw notifications that passed the kind filter.
    pub notifications: u64,
    /// Cycles whose finish hook ran.
    pub cycles: u64,
    /// Cycles skipped under [`CyclePolicy::Isolate`].
    pub failed_cycles: u64,
    pub exit: ExitReason,
}

enum CycleEnd {
    Finished,
    Skipped,
    Interrupted,
}

/// A configured, not yet running, watch loop.
///
/// Build with [`WatchLoop::builder`]. [`run`](Self::run) drives the loop on
/// the current thread; [`spawn`](Self::spawn) moves it to a dedicated one.
pub struct WatchLoop {
    input: PathBuf,
    output: PathBuf,
    kinds: Vec<ChangeKind>,
    source: Option<ChangeEventSource>,
    debouncer: Debouncer,
    mapper: Box<dyn MapStage>,
    finish: Box<dyn FinishHook>,
    dispatcher: ReduceDispatcher,
    persistence: Option<Persistence>,
    policy: CyclePolicy,
    stop: StopHandle,
    listener: StopListener,
}

impl WatchLoop {
    pub fn builder() -> WatchLoopBuilder {
        WatchLoopBuilder::new()
    }

    /// Handle that stops this loop once it runs.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Move the loop onto its own thread.
    pub fn spawn(self) -> Result<WatchThread, WatchError> {
        let stop = self.stop.clone();
        let handle = thread::Builder::new()
            .name("watchreduce-watch".to_string())
            .spawn(move || self.run())
            .map_err(|e| WatchError::InitFailed {
                reason: format!("cannot spawn watch thread: {e}"),
            })?;
        Ok(WatchThread { stop, handle })
    }

    /// Run until the source closes, a stop is requested, or a fatal error.
    ///
    /// The native watcher, if any, is dropped on every exit path.
    pub fn run(mut self) -> Result<LoopSummary, WatchError> {
        ensure_directories(&self.input, &self.output)
            .inspect_err(|e| tracing::error!("[watcher] bootstrap failed: {e}"))?;

        let source = match self.source.take() {
            Some(source) => source,
            None => ChangeEventSource::watch(&self.input)
                .inspect_err(|e| tracing::error!("[watcher] {e}"))?,
        };

        crate::log_event!(
            "watcher",
            "started",
            "{} ({:?} debounce, {} reducers)",
            self.input.display(),
            self.debouncer.mode(),
            self.dispatcher.len()
        );

        let mut notifications = 0;
        let mut cycles = 0;
        let mut failed_cycles = 0;

        let exit = loop {
            let notification = match source.next(&self.listener) {
                SourceStep::Notification(n) => n,
                SourceStep::Stopped => break ExitReason::Stopped,
                SourceStep::Closed => break ExitReason::SourceClosed,
            };

            if !self.kinds.contains(&notification.kind) {
                crate::debug_event!("watcher", "filtered", "{} {}", notification.name, notification.kind);
                continue;
            }
            notifications += 1;

            let Some(event) = self.debouncer.observe(notification) else {
                crate::debug_event!("watcher", "debounced", "waiting for second notification");
                continue;
            };

            crate::log_event!("watcher", "change detected", "{} {}", event.name, event.kind);
            match self.run_cycle(&event, cycles + 1)? {
                CycleEnd::Finished => cycles += 1,
                CycleEnd::Skipped => failed_cycles += 1,
                CycleEnd::Interrupted => break ExitReason::Stopped,
            }
        };

        crate::log_event!(
            "watcher",
            "stopped",
            "{exit:?} after {cycles} cycles ({notifications} notifications)"
        );

        Ok(LoopSummary {
            notifications,
            cycles,
            failed_cycles,
            exit,
        })
    }

    fn run_cycle(&mut self, event: &LogicalEvent, cycle: u64) -> Result<CycleEnd, WatchError> {
        let started = Instant::now();
        let ctx = MapContext::new(&self.input, &self.output, self.persistence.as_ref());

        if let Err(source) = self.mapper.map(event, &ctx) {
            match self.policy {
                CyclePolicy::FailFast => {
                    tracing::error!("[cycle] map failed for {}: {source:#}", event.name);
                    return Err(WatchError::MapFailed {
                        name: event.name.clone(),
                        source,
                    });
                }
                CyclePolicy::Isolate => {
                    tracing::warn!("[cycle] map failed for {}, skipping: {source:#}", event.name);
                    return Ok(CycleEnd::Skipped);
                }
            }
        }

        let (gate, handles) = self.dispatcher.dispatch(&self.output);
        if self.listener.wait_gate(&gate) == GateWait::Interrupted {
            crate::log_event!(
                "cycle",
                "interrupted",
                "{} of {} reducers pending",
                gate.remaining(),
                handles.len()
            );
            return Ok(CycleEnd::Interrupted);
        }

        let report = CycleReport {
            cycle,
            event,
            handles: &handles,
            elapsed: started.elapsed(),
        };
        crate::debug_event!("cycle", "joined", "#{cycle} in {:?}", report.elapsed);
        self.finish.finish(&report);
        Ok(CycleEnd::Finished)
    }
}

impl std::fmt::Debug for WatchLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchLoop")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("kinds", &self.kinds)
            .field("debouncer", &self.debouncer)
            .field("dispatcher", &self.dispatcher)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// A loop running on its own thread.
#[derive(Debug)]
pub struct WatchThread {
    stop: StopHandle,
    handle: JoinHandle<Result<LoopSummary, WatchError>>,
}

impl WatchThread {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request shutdown without waiting for it.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to exit. A panic in the map stage or finish hook
    /// surfaces as [`WatchError::ThreadPanicked`].
    pub fn join(self) -> Result<LoopSummary, WatchError> {
        self.handle.join().map_err(|payload| WatchError::ThreadPanicked {
            reason: panic_message(payload.as_ref()),
        })?
    }

    /// [`stop`](Self::stop) then [`join`](Self::join).
    pub fn shutdown(self) -> Result<LoopSummary, WatchError> {
        self.stop();
        self.join()
    }
}

/// Builder for [`WatchLoop`].
pub struct WatchLoopBuilder {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    kinds: Vec<ChangeKind>,
    source: Option<ChangeEventSource>,
    debounce: DebounceMode,
    mapper: Option<Box<dyn MapStage>>,
    finish: Option<Box<dyn FinishHook>>,
    reducers: Vec<Arc<dyn Reducer>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    persistence: Option<Persistence>,
    policy: CyclePolicy,
}

impl WatchLoopBuilder {
    pub fn new() -> Self {
        Self {
            input: None,
            output: None,
            kinds: vec![ChangeKind::Modified],
            source: None,
            debounce: DebounceMode::default(),
            mapper: None,
            finish: None,
            reducers: Vec::new(),
            executor: None,
            persistence: None,
            policy: CyclePolicy::default(),
        }
    }

    /// Start from the `[watch]` settings section.
    pub fn from_settings(config: &WatchConfig) -> Self {
        Self::new()
            .input_path(config.input_path.clone())
            .output_path(config.output_path.clone())
            .kinds(config.kinds.iter().copied())
            .debounce(config.debounce)
            .cycle_policy(config.on_map_error)
    }

    pub fn input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Notification kinds that reach the debouncer. Defaults to modifications only.
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Replace the platform watcher with another notification source.
    pub fn source(mut self, source: ChangeEventSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn debounce(mut self, mode: DebounceMode) -> Self {
        self.debounce = mode;
        self
    }

    pub fn cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn map_stage(mut self, stage: impl MapStage + 'static) -> Self {
        self.mapper = Some(Box::new(stage));
        self
    }

    /// Closure form of [`map_stage`](Self::map_stage).
    pub fn map_fn<F>(self, f: F) -> Self
    where
        F: FnMut(&LogicalEvent, &MapContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.map_stage(f)
    }

    pub fn finish_hook(mut self, hook: impl FinishHook + 'static) -> Self {
        self.finish = Some(Box::new(hook));
        self
    }

    /// Closure form of [`finish_hook`](Self::finish_hook).
    pub fn finish_fn<F>(self, f: F) -> Self
    where
        F: FnMut(&CycleReport<'_>) + Send + 'static,
    {
        self.finish_hook(f)
    }

    pub fn reducer(mut self, reducer: impl Reducer + 'static) -> Self {
        self.reducers.push(Arc::new(reducer));
        self
    }

    pub fn reducer_arc(mut self, reducer: Arc<dyn Reducer>) -> Self {
        self.reducers.push(reducer);
        self
    }

    pub fn executor(mut self, executor: impl TaskExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Closure form of [`executor`](Self::executor).
    pub fn submit_fn<F>(self, f: F) -> Self
    where
        F: Fn(ReduceTask) -> TaskHandle + Send + Sync + 'static,
    {
        self.executor(f)
    }

    pub fn persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn build(self) -> Result<WatchLoop, WatchError> {
        let input = self
            .input
            .ok_or(WatchError::MissingConfig { field: "input path" })?;
        let output = self
            .output
            .ok_or(WatchError::MissingConfig { field: "output path" })?;
        let mapper = self
            .mapper
            .ok_or(WatchError::MissingConfig { field: "map stage" })?;
        let executor = self
            .executor
            .ok_or(WatchError::MissingConfig { field: "task executor" })?;

        let descriptors = self
            .reducers
            .into_iter()
            .map(ReducerDescriptor::new)
            .collect();
        let (stop, listener) = stop_pair();

        Ok(WatchLoop {
            input,
            output,
            kinds: self.kinds,
            source: self.source,
            debouncer: Debouncer::new(self.debounce),
            mapper,
            finish: self.finish.unwrap_or_else(|| Box::new(LogOutcomes)),
            dispatcher: ReduceDispatcher::new(descriptors, executor, self.persistence.clone()),
            persistence: self.persistence,
            policy: self.policy,
            stop,
            listener,
        })
    }
}

impl Default for WatchLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
