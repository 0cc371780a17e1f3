//! Watch a directory and run a map stage followed by parallel reducers
//! on every change.

pub mod builtin;
pub mod cli;
pub mod config;
pub mod logging;
pub mod reduce;
pub mod stage;
pub mod watcher;

pub use config::Settings;
pub use reduce::{
    CompletionGate, CompletionSignal, FnReducer, RayonExecutor, ReduceContext, ReduceFailure,
    ReduceOutcome, ReduceTask, Reducer, TaskExecutor, TaskHandle, ThreadExecutor,
};
pub use stage::{CycleReport, FinishHook, MapContext, MapStage, Persistence};
pub use watcher::{
    ChangeEventSource, ChangeKind, ChangeNotification, CyclePolicy, DebounceMode, ExitReason,
    LogicalEvent, LoopSummary, StopHandle, WatchError, WatchLoop, WatchLoopBuilder, WatchThread,
};
