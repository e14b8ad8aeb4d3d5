//=====================================================
// File: operator/host.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Host objects handed to script functions
// Objective: Expose the output collector and the environment handle through
//            native method calls
//=====================================================

use crate::environment::ScriptEnvironment;
use crate::interpreter::{NativeObject, RuntimeError, Value};
use parking_lot::Mutex;
use std::sync::Arc;

fn expect_args(method: &str, args: &[Value], count: usize) -> Result<(), RuntimeError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(RuntimeError::ArgumentError(format!(
            "{}() expects {} argument(s), got {}",
            method,
            count,
            args.len()
        )))
    }
}

/// Output collector handed to functions running in collects mode.
///
/// Values are buffered during the call and coerced into records afterwards.
#[derive(Debug, Default)]
pub struct ScriptCollector {
    items: Mutex<Vec<Value>>,
}

impl ScriptCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.items.lock())
    }
}

impl NativeObject for ScriptCollector {
    fn type_name(&self) -> &str {
        "collector"
    }

    fn call_method(&self, method: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match method {
            "add" => {
                expect_args(method, &args, 1)?;
                self.items.lock().extend(args);
                Ok(Value::Null)
            }
            other => Err(RuntimeError::VariableNotFound(format!("collector.{}", other))),
        }
    }
}

/// The environment handle a function receives when it asks for one.
#[derive(Debug)]
pub struct EnvironmentObject {
    env: Arc<ScriptEnvironment>,
}

impl EnvironmentObject {
    pub fn new(env: Arc<ScriptEnvironment>) -> Self {
        Self { env }
    }
}

impl NativeObject for EnvironmentObject {
    fn type_name(&self) -> &str {
        "environment"
    }

    fn call_method(&self, method: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match method {
            "property" => {
                expect_args(method, &args, 1)?;
                let Value::Str(name) = &args[0] else {
                    return Err(RuntimeError::TypeError(format!(
                        "property() expects a string, got {}",
                        args[0].type_name()
                    )));
                };
                Ok(self.env.property(name).map_or(Value::Null, Value::from))
            }
            "main_file" => {
                expect_args(method, &args, 0)?;
                Ok(Value::from(self.env.config().main_file.as_str()))
            }
            other => Err(RuntimeError::VariableNotFound(format!("environment.{}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_buffers_added_values() {
        let collector = ScriptCollector::new();
        collector
            .call_method("add", vec![Value::list(vec![Value::Int(1)])])
            .unwrap();
        assert!(collector.call_method("add", vec![]).is_err());
        assert!(collector.call_method("emit", vec![Value::Null]).is_err());
        assert_eq!(collector.take().len(), 1);
        assert!(collector.take().is_empty());
    }
}
