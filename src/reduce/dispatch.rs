//! Fan-out of one cycle's map output to every configured reducer.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::executor::TaskExecutor;
use super::gate::CompletionGate;
use super::task::{ReduceTask, Reducer, TaskHandle};
use crate::stage::Persistence;

/// A configured reducer plus its per-cycle bindings.
///
/// Only `input_path` and `gate` change between cycles.
pub struct ReducerDescriptor {
    reducer: Arc<dyn Reducer>,
    input_path: Option<PathBuf>,
    gate: Option<CompletionGate>,
}

impl ReducerDescriptor {
    pub fn new(reducer: Arc<dyn Reducer>) -> Self {
        Self {
            reducer,
            input_path: None,
            gate: None,
        }
    }

    pub fn name(&self) -> &str {
        self.reducer.name()
    }

    /// Input bound by the most recent dispatch.
    pub fn input_path(&self) -> Option<&Path> {
        self.input_path.as_deref()
    }

    /// Gate bound by the most recent dispatch.
    pub fn gate(&self) -> Option<&CompletionGate> {
        self.gate.as_ref()
    }
}

impl fmt::Debug for ReducerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerDescriptor")
            .field("reducer", &self.name())
            .field("input_path", &self.input_path)
            .field("gate", &self.gate)
            .finish()
    }
}

/// Submits every reducer for a cycle and collects their handles.
pub struct ReduceDispatcher {
    descriptors: Vec<ReducerDescriptor>,
    executor: Arc<dyn TaskExecutor>,
    persistence: Option<Persistence>,
}

impl ReduceDispatcher {
    pub fn new(
        descriptors: Vec<ReducerDescriptor>,
        executor: Arc<dyn TaskExecutor>,
        persistence: Option<Persistence>,
    ) -> Self {
        Self {
            descriptors,
            executor,
            persistence,
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[ReducerDescriptor] {
        &self.descriptors
    }

    /// Point every reducer at `output`, bind a fresh gate and submit.
    ///
    /// Handles come back in reducer order. The returned gate releases once
    /// every submitted task has signalled.
    pub fn dispatch(&mut self, output: &Path) -> (CompletionGate, Vec<TaskHandle>) {
        let gate = CompletionGate::new(self.descriptors.len());
        let mut handles = Vec::with_capacity(self.descriptors.len());

        for descriptor in &mut self.descriptors {
            descriptor.input_path = Some(output.to_path_buf());
            descriptor.gate = Some(gate.clone());

            let task = ReduceTask::new(
                Arc::clone(&descriptor.reducer),
                output.to_path_buf(),
                self.persistence.clone(),
                gate.signal(),
            );
            crate::debug_event!("reduce", "dispatch", "{}", descriptor.name());
            handles.push(self.executor.submit(task));
        }

        (gate, handles)
    }
}

impl fmt::Debug for ReduceDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReduceDispatcher")
            .field("descriptors", &self.descriptors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::executor::ThreadExecutor;
    use crate::reduce::gate::GateWait;
    use crate::reduce::task::{FnReducer, ReduceContext};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn recording(name: &'static str, seen: Arc<Mutex<Vec<(String, PathBuf)>>>) -> ReducerDescriptor {
        ReducerDescriptor::new(Arc::new(FnReducer::new(name, move |ctx: &mut ReduceContext| {
            seen.lock().push((name.to_string(), ctx.input().to_path_buf()));
            Ok(())
        })))
    }

    #[test]
    fn test_dispatch_binds_inputs_and_gate() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = ReduceDispatcher::new(
            vec![recording("r1", seen.clone()), recording("r2", seen.clone())],
            Arc::new(ThreadExecutor::new()),
            None,
        );

        let output = PathBuf::from("/data/out");
        let (gate, handles) = dispatcher.dispatch(&output);

        let names: Vec<_> = handles.iter().map(|h| h.reducer()).collect();
        assert_eq!(names, vec!["r1", "r2"]);
        assert_eq!(gate.wait_timeout(Duration::from_secs(5)), Some(GateWait::Released));

        for descriptor in dispatcher.descriptors() {
            assert_eq!(descriptor.input_path(), Some(output.as_path()));
            assert!(descriptor.gate().is_some_and(CompletionGate::is_released));
        }

        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![("r1".to_string(), output.clone()), ("r2".to_string(), output)]
        );
    }

    #[test]
    fn test_each_cycle_gets_a_fresh_gate() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = ReduceDispatcher::new(
            vec![recording("r1", seen)],
            Arc::new(ThreadExecutor::new()),
            None,
        );

        let (first, _) = dispatcher.dispatch(Path::new("/out"));
        first.wait();
        let (second, handles) = dispatcher.dispatch(Path::new("/out"));
        second.wait();

        assert_eq!(handles.len(), 1);
        assert!(first.is_released() && second.is_released());
    }

    #[test]
    fn test_empty_reducer_list_releases_immediately() {
        let mut dispatcher = ReduceDispatcher::new(Vec::new(), Arc::new(ThreadExecutor::new()), None);
        let (gate, handles) = dispatcher.dispatch(Path::new("/out"));

        assert!(handles.is_empty());
        assert_eq!(gate.wait(), GateWait::Released);
    }
}
