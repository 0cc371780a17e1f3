//! Task-execution services that run reduce tasks.
//!
//! The loop never sizes or owns the pool; it only calls
//! [`TaskExecutor::submit`]. Submission must return without waiting for the
//! task to finish.

use std::fmt;
use std::sync::Arc;
use std::thread;

use super::task::{ReduceTask, TaskHandle};

/// Accepts a unit of work and returns a handle to it.
pub trait TaskExecutor: Send + Sync {
    fn submit(&self, task: ReduceTask) -> TaskHandle;
}

impl<F> TaskExecutor for F
where
    F: Fn(ReduceTask) -> TaskHandle + Send + Sync,
{
    fn submit(&self, task: ReduceTask) -> TaskHandle {
        self(task)
    }
}

/// Spawns one OS thread per task.
#[derive(Debug, Clone)]
pub struct ThreadExecutor {
    name_prefix: String,
}

impl ThreadExecutor {
    pub fn new() -> Self {
        Self {
            name_prefix: "reduce".to_string(),
        }
    }

    /// Prefix for spawned thread names (`<prefix>-<reducer>`).
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskExecutor for ThreadExecutor {
    fn submit(&self, task: ReduceTask) -> TaskHandle {
        let name = format!("{}-{}", self.name_prefix, task.reducer_name());
        let (job, handle) = task.into_job();
        // On spawn failure the job is dropped, which releases the gate and
        // marks the handle lost.
        if let Err(e) = thread::Builder::new().name(name.clone()).spawn(job) {
            tracing::error!("[reduce] failed to spawn {name}: {e}");
        }
        handle
    }
}

/// Runs tasks on a caller-supplied rayon pool.
#[derive(Clone)]
pub struct RayonExecutor {
    pool: Arc<rayon::ThreadPool>,
}

impl RayonExecutor {
    pub fn new(pool: Arc<rayon::ThreadPool>) -> Self {
        Self { pool }
    }

    /// Build a dedicated pool with `threads` workers (minimum 1).
    pub fn with_threads(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("reduce-{i}"))
            .build()?;
        Ok(Self::new(Arc::new(pool)))
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl TaskExecutor for RayonExecutor {
    fn submit(&self, task: ReduceTask) -> TaskHandle {
        let (job, handle) = task.into_job();
        self.pool.spawn(job);
        handle
    }
}

impl fmt::Debug for RayonExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RayonExecutor")
            .field("threads", &self.threads())
            .finish()
    }
}
