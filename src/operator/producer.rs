//=====================================================
// File: operator/producer.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Map and buffer operators backed by script functions
// Objective: Rehydrate a shipped configuration once per instance and call the
//            function for every record or group
//=====================================================

use super::host::{EnvironmentObject, ScriptCollector};
use super::output::OutputCoercion;
use super::{OperatorConfiguration, OperatorKind, OutputMode};
use crate::environment::ScriptEnvironment;
use crate::error::FlowError;
use crate::flow::{
    Buffer, BufferCall, Function, FunctionCall, Operation, OutputCollector, TaskContext,
};
use crate::handle::SourceIntrospector;
use crate::interpreter::{Interpreter, LazySequence, ScriptError, Value};
use crate::record::{ConversionPolicy, Record, convert_input};
use crate::wire::{self, WireOperator};
use std::sync::Arc;
use tracing::debug;

/// Call state rebuilt in `prepare` from the shipped configuration.
pub(crate) struct PreparedCall {
    pub function: Value,
    pub function_name: String,
    pub interpreter: Interpreter,
    pub conversion: ConversionPolicy,
    pub expected_fields: Option<usize>,
    /// Fixed slots followed by the extra positional values and the extra named values.
    pub template: Vec<Value>,
    pub named: Vec<String>,
}

impl PreparedCall {
    pub fn rehydrate(
        operator: WireOperator,
        env: &Arc<ScriptEnvironment>,
    ) -> Result<Self, FlowError> {
        let function_name = operator.function.to_string();
        let function = wire::WireValue::Function(operator.function).into_value(env)?;
        let fixed = operator.fixed_arg_count as usize;

        let mut template = vec![Value::Null; fixed];
        for value in operator.extra_positional.into_iter().flatten() {
            template.push(value.into_value(env)?);
        }
        let mut named = Vec::new();
        for (name, value) in operator.extra_named.into_iter().flatten() {
            template.push(value.into_value(env)?);
            named.push(name);
        }

        Ok(Self {
            function,
            function_name,
            interpreter: env.interpreter(env.main_module().clone()),
            conversion: operator.conversion,
            expected_fields: operator.expected_fields.map(|n| n as usize),
            template,
            named,
        })
    }

    pub fn check_fields(&self, record: &Record) -> Result<(), FlowError> {
        match self.expected_fields {
            Some(expected) if expected != record.len() => Err(FlowError::FieldCount {
                expected,
                actual: record.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Fresh argument buffer with the leading fixed slots filled.
    pub fn arguments(&self, fixed: Vec<Value>) -> Vec<Value> {
        let mut args = self.template.clone();
        for (slot, value) in args.iter_mut().zip(fixed) {
            *slot = value;
        }
        args
    }

    pub fn call(&mut self, mut args: Vec<Value>) -> Result<Value, FlowError> {
        let kwargs: Vec<(String, Value)> = self
            .named
            .iter()
            .cloned()
            .zip(args.split_off(args.len() - self.named.len()))
            .collect();
        self.interpreter
            .call_value(&self.function, args, kwargs)
            .map_err(|error| FlowError::Script {
                function: self.function_name.clone(),
                source: ScriptError::from(error),
            })
    }
}

pub(super) fn decode_for(payload: &[u8], expected: &[OperatorKind]) -> Result<WireOperator, FlowError> {
    let operator = wire::decode(payload)?;
    if !expected.contains(&operator.kind) {
        return Err(FlowError::InvalidOperator(format!(
            "{:?} configuration shipped to the wrong operator",
            operator.kind
        )));
    }
    Ok(operator)
}

struct ProducerState {
    call: PreparedCall,
    coercion: OutputCoercion,
    collector: Option<Arc<ScriptCollector>>,
    environment: Option<Value>,
}

/// Map and buffer operator backed by a script function.
///
/// Holds the encoded configuration until `prepare`, which resolves the function in the
/// task's environment exactly once.
pub struct RecordProducer {
    payload: Vec<u8>,
    state: Option<ProducerState>,
}

impl RecordProducer {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            state: None,
        }
    }

    pub fn from_configuration(
        config: &OperatorConfiguration,
        introspector: &dyn SourceIntrospector,
    ) -> Result<Self, FlowError> {
        if config.kind() == OperatorKind::Filter {
            return Err(FlowError::InvalidOperator(
                "a filter configuration cannot produce records".to_string(),
            ));
        }
        Ok(Self::new(config.encode(introspector)?))
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_prepared(&self) -> bool {
        self.state.is_some()
    }

    /// Current coercion state, once prepared.
    pub fn coercion(&self) -> Option<&OutputCoercion> {
        self.state.as_ref().map(|state| &state.coercion)
    }

    /// Map form: one call per input record.
    pub fn operate_record(
        &mut self,
        record: &Record,
        output: &mut dyn OutputCollector,
    ) -> Result<(), FlowError> {
        let state = self.state.as_mut().ok_or(FlowError::NotPrepared)?;
        state.call.check_fields(record)?;
        let input = convert_input(record, state.call.conversion);
        state.invoke(vec![input], output)
    }

    /// Grouped form: the group key and a lazy sequence of the group's records. An
    /// empty group calls nothing.
    pub fn operate_group(
        &mut self,
        group: &Record,
        records: Box<dyn Iterator<Item = Record> + Send>,
        output: &mut dyn OutputCollector,
    ) -> Result<(), FlowError> {
        let state = self.state.as_mut().ok_or(FlowError::NotPrepared)?;
        let mut records = records.peekable();
        if records.peek().is_none() {
            return Ok(());
        }

        let conversion = state.call.conversion;
        let key = convert_input(group, conversion);
        let rows =
            LazySequence::streaming(records.map(move |record| convert_input(&record, conversion)));
        state.invoke(vec![key, Value::sequence(rows)], output)
    }
}

impl ProducerState {
    fn invoke(
        &mut self,
        mut inputs: Vec<Value>,
        output: &mut dyn OutputCollector,
    ) -> Result<(), FlowError> {
        if let Some(collector) = &self.collector {
            inputs.push(Value::Native(collector.clone()));
        }
        if let Some(environment) = &self.environment {
            inputs.push(environment.clone());
        }

        let args = self.call.arguments(inputs);
        let returned = self.call.call(args)?;
        match &self.collector {
            Some(collector) => {
                for value in collector.take() {
                    self.coercion.emit(value, output)?;
                }
            }
            None => self.coercion.collect(returned, output)?,
        }
        Ok(())
    }
}

impl Operation for RecordProducer {
    fn prepare(&mut self, context: &TaskContext) -> Result<(), FlowError> {
        if self.state.is_some() {
            return Ok(());
        }
        let env = context.environment()?;
        let operator = decode_for(&self.payload, &[OperatorKind::Map, OperatorKind::Buffer])?;

        let collects = operator.output_mode == OutputMode::Collects;
        let coercion = OutputCoercion::new(operator.output_mode, operator.output_shape)
            .with_output_fields(operator.output_fields.clone().unwrap_or_default());
        let environment = operator
            .pass_environment
            .then(|| Value::Native(Arc::new(EnvironmentObject::new(env.clone()))));
        let call = PreparedCall::rehydrate(operator, &env)?;
        debug!(function = %call.function_name, "record producer prepared");

        self.state = Some(ProducerState {
            call,
            coercion,
            collector: collects.then(|| Arc::new(ScriptCollector::new())),
            environment,
        });
        Ok(())
    }
}

impl Function for RecordProducer {
    fn operate(&mut self, _context: &TaskContext, call: FunctionCall<'_>) -> Result<(), FlowError> {
        self.operate_record(&call.arguments, call.output)
    }
}

impl Buffer for RecordProducer {
    fn operate(&mut self, _context: &TaskContext, call: BufferCall<'_>) -> Result<(), FlowError> {
        self.operate_group(&call.group, call.arguments, call.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentCell, EnvironmentConfig};
    use crate::flow::VecCollector;
    use crate::handle::ScriptIntrospector;
    use crate::operator::OutputShape;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    const MAIN: &str = r#"
fn upper_all(r) {
    return [upper(r[0])];
}

fn explode(r) {
    for word in split(r[0], " ") {
        yield [word];
    }
}

fn total(group, rows) {
    let sum = 0;
    for row in rows {
        sum = sum + row[0];
    }
    return [group[0], sum];
}

fn tagged(r, out, env) {
    out.add([r[0], env.property("tag")]);
}

fn scaled(r, factor, offset = 0) {
    return [r[0] * factor + offset];
}
"#;

    fn context() -> (TempDir, TaskContext) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.svs"), MAIN).unwrap();
        let config = EnvironmentConfig::local("main.svs", dir.path()).with_property("tag", "t1");
        let context = TaskContext::with_cell(Arc::new(EnvironmentCell::new()), config);
        (dir, context)
    }

    fn producer(context: &TaskContext, config: OperatorConfiguration) -> RecordProducer {
        let mut producer = RecordProducer::from_configuration(&config, &ScriptIntrospector).unwrap();
        producer.prepare(context).unwrap();
        producer
    }

    fn function(context: &TaskContext, name: &str) -> Value {
        context.environment().unwrap().main_module().get(name).unwrap()
    }

    fn row(values: Vec<Value>) -> Record {
        Record::new(values)
    }

    #[test]
    fn operate_before_prepare_fails() {
        let mut producer = RecordProducer::new(Vec::new());
        let mut out = VecCollector::new();
        let err = producer
            .operate_record(&row(vec![Value::Int(1)]), &mut out)
            .unwrap_err();
        assert!(matches!(err, FlowError::NotPrepared));
    }

    #[test]
    fn maps_returned_lists() {
        let (_dir, context) = context();
        let config = OperatorConfiguration::new(OperatorKind::Map, function(&context, "upper_all"))
            .with_conversion(ConversionPolicy::AsNativeList)
            .with_output_fields(["shout"]);
        let mut producer = producer(&context, config);
        let mut out = VecCollector::new();
        producer
            .operate_record(&row(vec![Value::from("hey")]), &mut out)
            .unwrap();
        assert_eq!(out.records()[0].get_by_name("shout"), Some(&Value::from("HEY")));
        assert_eq!(producer.coercion().unwrap().mode(), OutputMode::Returns);
    }

    #[test]
    fn maps_generators() {
        let (_dir, context) = context();
        let config = OperatorConfiguration::new(OperatorKind::Map, function(&context, "explode"))
            .with_conversion(ConversionPolicy::AsNativeList);
        let mut producer = producer(&context, config);
        let mut out = VecCollector::new();
        producer
            .operate_record(&row(vec![Value::from("a b c")]), &mut out)
            .unwrap();
        assert_eq!(out.records().len(), 3);
        assert_eq!(producer.coercion().unwrap().mode(), OutputMode::Yields);
        assert_eq!(producer.coercion().unwrap().shape(), OutputShape::NativeList);
    }

    #[test]
    fn buffers_stream_group_records() {
        let (_dir, context) = context();
        let config = OperatorConfiguration::new(OperatorKind::Buffer, function(&context, "total"))
            .with_conversion(ConversionPolicy::AsNativeList);
        let mut producer = producer(&context, config);
        let mut out = VecCollector::new();
        let rows = vec![row(vec![Value::Int(2)]), row(vec![Value::Int(3)])];
        producer
            .operate_group(&row(vec![Value::from("k")]), Box::new(rows.into_iter()), &mut out)
            .unwrap();
        assert_eq!(
            out.records(),
            &[row(vec![Value::from("k"), Value::Int(5)])]
        );

        producer
            .operate_group(&row(vec![Value::from("k")]), Box::new(Vec::<Record>::new().into_iter()), &mut out)
            .unwrap();
        assert_eq!(out.records().len(), 1);
    }

    #[test]
    fn collects_mode_passes_collector_and_environment() {
        let (_dir, context) = context();
        let config = OperatorConfiguration::new(OperatorKind::Map, function(&context, "tagged"))
            .with_conversion(ConversionPolicy::AsNativeList)
            .with_output_mode(OutputMode::Collects)
            .with_pass_environment(true);
        let mut producer = producer(&context, config);
        let mut out = VecCollector::new();
        producer
            .operate_record(&row(vec![Value::Int(9)]), &mut out)
            .unwrap();
        assert_eq!(out.records(), &[row(vec![Value::Int(9), Value::from("t1")])]);
    }

    #[test]
    fn extra_arguments_follow_fixed_ones() {
        let (_dir, context) = context();
        let mut config =
            OperatorConfiguration::new(OperatorKind::Map, function(&context, "scaled"))
                .with_conversion(ConversionPolicy::AsNativeList);
        config.set_extra_positional(vec![Value::Int(10)]);
        config.set_extra_named(vec![("offset".to_string(), Value::Int(1))]);
        let mut producer = producer(&context, config);
        let mut out = VecCollector::new();
        producer
            .operate_record(&row(vec![Value::Int(4)]), &mut out)
            .unwrap();
        assert_eq!(out.records(), &[row(vec![Value::Int(41)])]);
    }

    #[test]
    fn field_count_mismatch_is_fatal() {
        let (_dir, context) = context();
        let config = OperatorConfiguration::new(OperatorKind::Map, function(&context, "upper_all"))
            .with_conversion(ConversionPolicy::AsNativeList)
            .with_expected_fields(2);
        let mut producer = producer(&context, config);
        let mut out = VecCollector::new();
        let err = producer
            .operate_record(&row(vec![Value::from("x")]), &mut out)
            .unwrap_err();
        assert!(matches!(err, FlowError::FieldCount { expected: 2, actual: 1 }));
    }

    #[test]
    fn script_failures_name_the_function() {
        let (_dir, context) = context();
        let config = OperatorConfiguration::new(OperatorKind::Map, function(&context, "upper_all"))
            .with_conversion(ConversionPolicy::AsNativeList);
        let mut producer = producer(&context, config);
        let mut out = VecCollector::new();
        let err = producer
            .operate_record(&row(vec![Value::Int(1)]), &mut out)
            .unwrap_err();
        assert!(err.to_string().contains("upper_all"), "{}", err);
    }
}
