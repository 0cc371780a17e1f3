//! Directory watcher that drives map + reduce cycles.
//!
//! # Architecture
//!
//! ```text
//! WatchLoop (one dedicated thread)
//!   ensure_directories(input, output)
//!   ChangeEventSource      notify::RecommendedWatcher -> channel
//!     -> Debouncer         two raw notifications -> one LogicalEvent
//!     -> MapStage          synchronous, writes into output/
//!     -> ReduceDispatcher  fan-out on the TaskExecutor
//!     -> CompletionGate    blocks until every reducer signals
//!     -> FinishHook        CycleReport with the task handles
//! ```
//!
//! Cycles are strictly serialized: the next notification is not read until
//! the previous cycle's finish hook has returned.

mod bootstrap;
mod debouncer;
pub(crate) mod error;
mod event_loop;
mod source;
mod stop;

pub use bootstrap::{WatchedDirectory, ensure_directories};
pub use debouncer::{DebounceMode, DebounceState, Debouncer, LogicalEvent};
pub use error::WatchError;
pub use event_loop::{
    CyclePolicy, ExitReason, LoopSummary, WatchLoop, WatchLoopBuilder, WatchThread,
};
pub use source::{ChangeEventSource, ChangeKind, ChangeNotification};
pub use stop::StopHandle;
