//! Reduce stage: parallel fan-out and barrier join.
//!
//! # Architecture
//!
//! ```text
//! ReduceDispatcher::dispatch(output)
//!   - fresh CompletionGate(count = reducers)
//!   - one ReduceTask per descriptor, in order
//!         |
//!    +---------+---------+
//!    |         |         |
//!  Task R1   Task R2   Task Rn   (TaskExecutor, caller-owned)
//!    |         |         |
//!    +---- CompletionSignal ----> gate reaches zero
//! ```

mod dispatch;
mod executor;
mod gate;
mod task;

pub use dispatch::{ReduceDispatcher, ReducerDescriptor};
pub use executor::{RayonExecutor, TaskExecutor, ThreadExecutor};
pub use gate::{CompletionGate, CompletionSignal, GateWait};
pub use task::{
    FnReducer, Job, ReduceContext, ReduceFailure, ReduceOutcome, ReduceTask, Reducer, TaskHandle,
};
