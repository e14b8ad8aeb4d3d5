//=====================================================
// File: operator/consumer.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Filter operator backed by a script function
// Objective: Rehydrate a shipped configuration and remove records whose result
//            is falsy
//=====================================================

use super::producer::{PreparedCall, decode_for};
use super::{OperatorConfiguration, OperatorKind};
use crate::error::FlowError;
use crate::flow::{Filter, FilterCall, Operation, TaskContext};
use crate::handle::SourceIntrospector;
use crate::record::{Record, convert_input};
use tracing::debug;

/// Filter backed by a script function: a record is removed when the function's
/// result is falsy.
pub struct RecordConsumer {
    payload: Vec<u8>,
    call: Option<PreparedCall>,
}

impl RecordConsumer {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            call: None,
        }
    }

    pub fn from_configuration(
        config: &OperatorConfiguration,
        introspector: &dyn SourceIntrospector,
    ) -> Result<Self, FlowError> {
        if config.kind() != OperatorKind::Filter {
            return Err(FlowError::InvalidOperator(format!(
                "a {:?} configuration cannot filter records",
                config.kind()
            )));
        }
        Ok(Self::new(config.encode(introspector)?))
    }

    pub fn is_prepared(&self) -> bool {
        self.call.is_some()
    }

    pub fn remove_record(&mut self, record: &Record) -> Result<bool, FlowError> {
        let call = self.call.as_mut().ok_or(FlowError::NotPrepared)?;
        call.check_fields(record)?;
        let args = call.arguments(vec![convert_input(record, call.conversion)]);
        let keep = call.call(args)?;
        Ok(!keep.is_truthy())
    }
}

impl Operation for RecordConsumer {
    fn prepare(&mut self, context: &TaskContext) -> Result<(), FlowError> {
        if self.call.is_some() {
            return Ok(());
        }
        let env = context.environment()?;
        let operator = decode_for(&self.payload, &[OperatorKind::Filter])?;
        let call = PreparedCall::rehydrate(operator, &env)?;
        debug!(function = %call.function_name, "record consumer prepared");
        self.call = Some(call);
        Ok(())
    }
}

impl Filter for RecordConsumer {
    fn is_remove(&mut self, _context: &TaskContext, call: FilterCall) -> Result<bool, FlowError> {
        self.remove_record(&call.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentCell, EnvironmentConfig};
    use crate::handle::ScriptIntrospector;
    use crate::interpreter::Value;
    use crate::record::ConversionPolicy;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    const MAIN: &str = r#"
fn always(r) {
    return true;
}

fn never(r) {
    return false;
}

fn long_words(r, min) {
    return len(r["word"]) >= min;
}

fn count(r) {
    return r[0];
}
"#;

    fn consumer(name: &str, configure: impl FnOnce(&mut OperatorConfiguration)) -> (tempfile::TempDir, RecordConsumer) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.svs"), MAIN).unwrap();
        let context = TaskContext::with_cell(
            Arc::new(EnvironmentCell::new()),
            EnvironmentConfig::local("main.svs", dir.path()),
        );
        let function = context.environment().unwrap().main_module().get(name).unwrap();
        let mut config = OperatorConfiguration::new(OperatorKind::Filter, function);
        configure(&mut config);
        let mut consumer = RecordConsumer::from_configuration(&config, &ScriptIntrospector).unwrap();
        consumer.prepare(&context).unwrap();
        (dir, consumer)
    }

    fn records() -> Vec<Record> {
        ["a", "bb", "ccc"]
            .iter()
            .map(|word| Record::with_names(vec!["word".into()], vec![Value::from(*word)]))
            .collect()
    }

    #[test]
    fn true_keeps_everything_and_false_removes_everything() {
        let (_dir, mut always) = consumer("always", |_| {});
        let (_dir2, mut never) = consumer("never", |_| {});
        for record in records() {
            assert!(!always.remove_record(&record).unwrap());
            assert!(never.remove_record(&record).unwrap());
        }
    }

    #[test]
    fn uses_truthiness_of_any_value() {
        let (_dir, mut count) = consumer("count", |config| {
            *config = config.clone().with_conversion(ConversionPolicy::AsNativeList);
        });
        assert!(count.remove_record(&Record::new(vec![Value::Int(0)])).unwrap());
        assert!(!count.remove_record(&Record::new(vec![Value::Int(2)])).unwrap());
        assert!(!count.remove_record(&Record::new(vec![Value::from("x")])).unwrap());
    }

    #[test]
    fn extra_arguments_reach_the_filter() {
        let (_dir, mut long) = consumer("long_words", |config| {
            *config = config.clone().with_conversion(ConversionPolicy::AsNativeDict);
            config.set_extra_positional(vec![Value::Int(2)]);
        });
        let removed: Vec<bool> = records()
            .iter()
            .map(|record| long.remove_record(record).unwrap())
            .collect();
        assert_eq!(removed, vec![true, false, false]);
    }

    #[test]
    fn rejects_producer_configurations() {
        let config = OperatorConfiguration::new(OperatorKind::Map, Value::Null);
        assert!(matches!(
            RecordConsumer::from_configuration(&config, &ScriptIntrospector),
            Err(FlowError::InvalidOperator(_))
        ));
    }
}
