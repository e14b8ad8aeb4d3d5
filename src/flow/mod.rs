//=====================================================
// File: flow/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Boundary types shared with the host dataflow engine
// Objective: Describe task contexts, per-record calls, operator lifecycles and
//            flow listeners the way the engine presents them
//=====================================================

use crate::environment::{EnvironmentCell, EnvironmentConfig, ScriptEnvironment};
use crate::error::FlowError;
use crate::record::Record;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
enum CellSlot {
    Global,
    Shared(Arc<EnvironmentCell>),
}

/// What a task hands to an operator: where the environment lives and how to build it.
#[derive(Debug, Clone)]
pub struct TaskContext {
    cell: CellSlot,
    config: EnvironmentConfig,
}

impl TaskContext {
    /// Context backed by the process-wide environment cell.
    pub fn new(config: EnvironmentConfig) -> Self {
        Self {
            cell: CellSlot::Global,
            config,
        }
    }

    /// Context backed by an explicit cell, so separate environments can coexist.
    pub fn with_cell(cell: Arc<EnvironmentCell>, config: EnvironmentConfig) -> Self {
        Self {
            cell: CellSlot::Shared(cell),
            config,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config = self.config.with_property(name, value);
        self
    }

    pub fn cell(&self) -> &EnvironmentCell {
        match &self.cell {
            CellSlot::Global => EnvironmentCell::global(),
            CellSlot::Shared(cell) => cell,
        }
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.config.properties.get(name).map(String::as_str)
    }

    pub fn environment(&self) -> Result<Arc<ScriptEnvironment>, FlowError> {
        Ok(self.cell().get_or_create(&self.config)?)
    }
}

/// Sink for records emitted by an operator.
pub trait OutputCollector {
    fn add(&mut self, record: Record);
}

#[derive(Debug, Default, Clone)]
pub struct VecCollector {
    records: Vec<Record>,
}

impl VecCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl OutputCollector for VecCollector {
    fn add(&mut self, record: Record) {
        self.records.push(record);
    }
}

/// One input record for a map operator.
pub struct FunctionCall<'a> {
    pub arguments: Record,
    pub output: &'a mut dyn OutputCollector,
}

/// One group for a buffer operator. The records are streamed and read at most once.
pub struct BufferCall<'a> {
    pub group: Record,
    pub arguments: Box<dyn Iterator<Item = Record> + Send>,
    pub output: &'a mut dyn OutputCollector,
}

impl<'a> BufferCall<'a> {
    pub fn new<I>(group: Record, records: I, output: &'a mut dyn OutputCollector) -> Self
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: Send + 'static,
    {
        Self {
            group,
            arguments: Box::new(records.into_iter()),
            output,
        }
    }
}

/// One input record for a filter.
pub struct FilterCall {
    pub arguments: Record,
}

pub trait Operation {
    /// Called once per operator instance before any record is processed.
    fn prepare(&mut self, context: &TaskContext) -> Result<(), FlowError>;
}

pub trait Function: Operation {
    fn operate(&mut self, context: &TaskContext, call: FunctionCall<'_>) -> Result<(), FlowError>;
}

pub trait Buffer: Operation {
    fn operate(&mut self, context: &TaskContext, call: BufferCall<'_>) -> Result<(), FlowError>;
}

pub trait Filter: Operation {
    fn is_remove(&mut self, context: &TaskContext, call: FilterCall) -> Result<bool, FlowError>;
}

/// Lifecycle callbacks around a whole flow.
pub trait FlowListener: Send + Sync {
    fn on_starting(&self) {}
    fn on_stopping(&self) {}
    fn on_completed(&self) {}
    /// Returns true when the failure was handled.
    fn on_throwable(&self, _error: &FlowError) -> bool {
        false
    }
}

/// Drives `listeners` around `body`. A failure of `body` is returned unchanged,
/// whatever the listeners do with it.
pub fn run_flow<T, F>(listeners: &[&dyn FlowListener], body: F) -> Result<T, FlowError>
where
    F: FnOnce() -> Result<T, FlowError>,
{
    for listener in listeners {
        listener.on_starting();
    }
    let result = body();
    match &result {
        Ok(_) => {
            for listener in listeners {
                listener.on_completed();
            }
        }
        Err(error) => {
            warn!(%error, "flow failed");
            for listener in listeners {
                listener.on_throwable(error);
            }
        }
    }
    result
}

/// Tells `listeners` the flow is being stopped before completion.
pub fn stop_flow(listeners: &[&dyn FlowListener]) {
    for listener in listeners {
        listener.on_stopping();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    impl FlowListener for Recorder {
        fn on_starting(&self) {
            self.events.lock().push("starting");
        }
        fn on_stopping(&self) {
            self.events.lock().push("stopping");
        }
        fn on_completed(&self) {
            self.events.lock().push("completed");
        }
        fn on_throwable(&self, _error: &FlowError) -> bool {
            self.events.lock().push("throwable");
            true
        }
    }

    #[test]
    fn listeners_see_completion() {
        let recorder = Recorder::default();
        let value = run_flow(&[&recorder], || Ok(5)).unwrap();
        assert_eq!(value, 5);
        assert_eq!(*recorder.events.lock(), vec!["starting", "completed"]);
    }

    #[test]
    fn failures_are_returned_unchanged() {
        let recorder = Recorder::default();
        let result: Result<(), FlowError> =
            run_flow(&[&recorder], || Err(FlowError::NotPrepared));
        assert!(matches!(result, Err(FlowError::NotPrepared)));
        assert_eq!(*recorder.events.lock(), vec!["starting", "throwable"]);

        stop_flow(&[&recorder]);
        assert_eq!(recorder.events.lock().last(), Some(&"stopping"));
    }

    // The only test in this crate that touches the process-wide cell.
    #[test]
    fn default_contexts_share_the_process_environment() {
        let first_root = tempdir().unwrap();
        fs::write(first_root.path().join("main.svs"), "let answer = 42;").unwrap();
        let second_root = tempdir().unwrap();
        fs::write(second_root.path().join("main.svs"), "let broken = ;").unwrap();

        let first = TaskContext::new(EnvironmentConfig::local("main.svs", first_root.path()));
        let second = TaskContext::new(EnvironmentConfig::local("main.svs", second_root.path()));
        assert!(std::ptr::eq(first.cell(), EnvironmentCell::global()));
        assert!(std::ptr::eq(second.cell(), EnvironmentCell::global()));

        let env = first.environment().unwrap();
        let again = second.environment().unwrap();
        assert!(Arc::ptr_eq(&env, &again));
        assert_eq!(
            again.main_module().get("answer"),
            Some(crate::interpreter::Value::Int(42))
        );
        assert!(EnvironmentCell::global().is_initialized());
    }

    #[test]
    fn vec_collector_keeps_order() {
        let mut out = VecCollector::new();
        out.add(Record::new(vec![]));
        out.add(Record::with_names(vec!["a".into()], vec![crate::interpreter::Value::Int(1)]));
        let records = out.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].names(), &["a".to_string()]);
    }
}
