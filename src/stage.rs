//! Caller-supplied behaviour slots: the map stage and the finish hook.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::reduce::{ReduceOutcome, TaskHandle};
use crate::watcher::LogicalEvent;

/// Opaque persistence collaborator threaded through to map and reduce.
pub type Persistence = Arc<dyn Any + Send + Sync>;

/// What the map stage may touch during one cycle.
#[derive(Debug, Clone, Copy)]
pub struct MapContext<'a> {
    input: &'a Path,
    output: &'a Path,
    persistence: Option<&'a Persistence>,
}

impl<'a> MapContext<'a> {
    pub fn new(input: &'a Path, output: &'a Path, persistence: Option<&'a Persistence>) -> Self {
        Self {
            input,
            output,
            persistence,
        }
    }

    pub fn input_dir(&self) -> &'a Path {
        self.input
    }

    pub fn output_dir(&self) -> &'a Path {
        self.output
    }

    /// The configured persistence collaborator, if it is a `T`.
    pub fn persistence<T: Any + Send + Sync>(&self) -> Option<&'a T> {
        self.persistence?.downcast_ref::<T>()
    }
}

/// Transform one logical event into artifacts in the output directory.
///
/// Runs on the watch thread, never concurrently with itself.
pub trait MapStage: Send {
    fn map(&mut self, event: &LogicalEvent, ctx: &MapContext<'_>) -> anyhow::Result<()>;
}

impl<F> MapStage for F
where
    F: FnMut(&LogicalEvent, &MapContext<'_>) -> anyhow::Result<()> + Send,
{
    fn map(&mut self, event: &LogicalEvent, ctx: &MapContext<'_>) -> anyhow::Result<()> {
        self(event, ctx)
    }
}

/// Everything the finish hook gets once a cycle's gate is released.
#[derive(Debug)]
pub struct CycleReport<'a> {
    /// 1-based cycle number.
    pub cycle: u64,
    pub event: &'a LogicalEvent,
    /// Task handles in reducer order.
    pub handles: &'a [TaskHandle],
    /// Time from map start to gate release.
    pub elapsed: Duration,
}

impl CycleReport<'_> {
    /// `(reducer, outcome)` pairs in reducer order. Blocks per handle until
    /// its outcome is available.
    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &ReduceOutcome)> + '_ {
        self.handles.iter().map(|h| (h.reducer(), h.outcome()))
    }

    /// Number of reducers whose outcome is an error.
    pub fn failures(&self) -> usize {
        self.outcomes().filter(|(_, outcome)| outcome.is_err()).count()
    }
}

/// Called on the watch thread after every completed cycle.
pub trait FinishHook: Send {
    fn finish(&mut self, report: &CycleReport<'_>);
}

impl<F> FinishHook for F
where
    F: FnMut(&CycleReport<'_>) + Send,
{
    fn finish(&mut self, report: &CycleReport<'_>) {
        self(report)
    }
}

/// Default hook: logs each reducer failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutcomes;

impl FinishHook for LogOutcomes {
    fn finish(&mut self, report: &CycleReport<'_>) {
        for (reducer, outcome) in report.outcomes() {
            match outcome {
                Ok(()) => crate::debug_event!("cycle", "reducer ok", "{reducer}"),
                Err(e) => tracing::warn!("[cycle] #{} {reducer}: {e}", report.cycle),
            }
        }
    }
}
