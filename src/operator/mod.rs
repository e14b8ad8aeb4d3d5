//=====================================================
// File: operator/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Build-time description of a script-backed dataflow operator
// Objective: Hold the operator function with its calling convention, read it
//            from decorator attributes, and encode it for workers
//=====================================================

pub mod consumer;
pub mod host;
pub mod output;
pub mod producer;

pub use consumer::RecordConsumer;
pub use host::{EnvironmentObject, ScriptCollector};
pub use output::{OutputCoercion, OutputTypeError};
pub use producer::RecordProducer;

use crate::error::FlowError;
use crate::handle::SourceIntrospector;
use crate::interpreter::builtins::{
    ATTR_ARGS, ATTR_INPUT_CONVERSION, ATTR_KWARGS, ATTR_NUMARGS, ATTR_OUTPUT_METHOD,
    ATTR_OUTPUT_TYPE, ATTR_PRODUCES, ATTR_TYPE,
};
use crate::interpreter::{Dict, Key, Value};
use crate::record::ConversionPolicy;
use crate::wire::{self, WireError, WireOperator, WireValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorKind {
    Map,
    Filter,
    Buffer,
}

/// How a script function hands its results back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    /// Decided by the first non-null return value.
    #[default]
    AutoDetect,
    Returns,
    Yields,
    /// Results go through a collector argument; the return value is ignored.
    Collects,
}

impl OutputMode {
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name {
            "auto" => Some(OutputMode::AutoDetect),
            "returns" => Some(OutputMode::Returns),
            "yields" => Some(OutputMode::Yields),
            "collects" => Some(OutputMode::Collects),
            _ => None,
        }
    }
}

/// Shape of each emitted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputShape {
    #[default]
    AutoDetect,
    NativeList,
    NativeRecord,
}

impl OutputShape {
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name {
            "auto" => Some(OutputShape::AutoDetect),
            "list" => Some(OutputShape::NativeList),
            "records" => Some(OutputShape::NativeRecord),
            _ => None,
        }
    }
}

/// Number of leading call arguments the operator itself supplies.
pub fn fixed_arg_count(kind: OperatorKind, mode: OutputMode, pass_environment: bool) -> usize {
    match kind {
        OperatorKind::Filter => 1,
        OperatorKind::Map | OperatorKind::Buffer => {
            let inputs = if kind == OperatorKind::Buffer { 2 } else { 1 };
            inputs + usize::from(mode == OutputMode::Collects) + usize::from(pass_environment)
        }
    }
}

/// A script function plus everything needed to call it from an operator.
///
/// The call-argument buffer is laid out as the fixed arguments, then the extra
/// positional arguments, then the values of the extra named arguments.
#[derive(Debug, Clone)]
pub struct OperatorConfiguration {
    function: Value,
    kind: OperatorKind,
    conversion: ConversionPolicy,
    pass_environment: bool,
    expected_fields: Option<usize>,
    output_fields: Option<Vec<String>>,
    output_mode: OutputMode,
    output_shape: OutputShape,
    extra_positional: Option<Vec<Value>>,
    extra_named: Option<Vec<(String, Value)>>,
    fixed_arg_count: usize,
    arg_buffer_len: usize,
}

impl OperatorConfiguration {
    pub fn new(kind: OperatorKind, function: Value) -> Self {
        let fixed = fixed_arg_count(kind, OutputMode::AutoDetect, false);
        Self {
            function,
            kind,
            conversion: ConversionPolicy::None,
            pass_environment: false,
            expected_fields: None,
            output_fields: None,
            output_mode: OutputMode::AutoDetect,
            output_shape: OutputShape::AutoDetect,
            extra_positional: None,
            extra_named: None,
            fixed_arg_count: fixed,
            arg_buffer_len: fixed,
        }
    }

    /// Reads the attributes left by the decorator builtins. A bare function gets the
    /// defaults.
    pub fn from_decorated(kind: OperatorKind, value: &Value) -> Result<Self, FlowError> {
        let Some(decorators) = value.decorators() else {
            if !value.is_callable() {
                return Err(FlowError::InvalidOperator(format!(
                    "expected a function, got {}",
                    value.type_name()
                )));
            }
            return Ok(Self::new(kind, value.clone()));
        };
        let decorators = decorators.read();

        let function = value.undecorated().unwrap_or_else(|| value.clone());
        let declared = text_attribute(&decorators, ATTR_TYPE)?.unwrap_or("auto");
        if kind == OperatorKind::Filter && matches!(declared, "map" | "buffer") {
            return Err(FlowError::InvalidOperator(format!(
                "a {} function cannot be used as a filter",
                declared
            )));
        }

        let mut config = Self::new(kind, function);
        if let Some(name) = text_attribute(&decorators, ATTR_INPUT_CONVERSION)? {
            config.conversion = ConversionPolicy::from_attribute(name).ok_or_else(|| {
                FlowError::InvalidOperator(format!("unknown input conversion '{}'", name))
            })?;
        }
        if kind != OperatorKind::Filter {
            if let Some(name) = text_attribute(&decorators, ATTR_OUTPUT_METHOD)? {
                let mode = OutputMode::from_attribute(name).ok_or_else(|| {
                    FlowError::InvalidOperator(format!("unknown output method '{}'", name))
                })?;
                config = config.with_output_mode(mode);
            }
            if let Some(name) = text_attribute(&decorators, ATTR_OUTPUT_TYPE)? {
                config.output_shape = OutputShape::from_attribute(name).ok_or_else(|| {
                    FlowError::InvalidOperator(format!("unknown output type '{}'", name))
                })?;
            }
        }

        match decorators.get_str(ATTR_NUMARGS) {
            None | Some(Value::Null) => {}
            Some(Value::Int(n)) if *n >= 0 => config.expected_fields = Some(*n as usize),
            Some(other) => {
                return Err(FlowError::InvalidOperator(format!(
                    "numargs_expected must be a non-negative int, got {}",
                    other.type_name()
                )));
            }
        }
        config.output_fields = field_names(decorators.get_str(ATTR_PRODUCES))?;

        match decorators.get_str(ATTR_ARGS) {
            None | Some(Value::Null) => {}
            Some(Value::List(items)) => config.set_extra_positional(items.read().clone()),
            Some(other) => {
                return Err(FlowError::InvalidOperator(format!(
                    "args must be a list, got {}",
                    other.type_name()
                )));
            }
        }
        match decorators.get_str(ATTR_KWARGS) {
            None | Some(Value::Null) => {}
            Some(Value::Dict(dict)) => config.set_extra_named(named_arguments(&dict.read())?),
            Some(other) => {
                return Err(FlowError::InvalidOperator(format!(
                    "kwargs must be a dict, got {}",
                    other.type_name()
                )));
            }
        }
        Ok(config)
    }

    pub fn with_conversion(mut self, conversion: ConversionPolicy) -> Self {
        self.conversion = conversion;
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self.recompute_fixed();
        self
    }

    pub fn with_output_shape(mut self, shape: OutputShape) -> Self {
        self.output_shape = shape;
        self
    }

    pub fn with_pass_environment(mut self, pass: bool) -> Self {
        self.pass_environment = pass;
        self.recompute_fixed();
        self
    }

    pub fn with_expected_fields(mut self, count: usize) -> Self {
        self.expected_fields = Some(count);
        self
    }

    pub fn with_output_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_fields = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn set_extra_positional(&mut self, args: Vec<Value>) {
        self.extra_positional = Some(args);
        self.recompute_buffer_len();
    }

    pub fn set_extra_named(&mut self, kwargs: Vec<(String, Value)>) {
        self.extra_named = Some(kwargs);
        self.recompute_buffer_len();
    }

    fn recompute_fixed(&mut self) {
        self.fixed_arg_count = fixed_arg_count(self.kind, self.output_mode, self.pass_environment);
        self.recompute_buffer_len();
    }

    fn recompute_buffer_len(&mut self) {
        self.arg_buffer_len = self.fixed_arg_count
            + self.extra_positional.as_ref().map_or(0, Vec::len)
            + self.extra_named.as_ref().map_or(0, Vec::len);
    }

    pub fn function(&self) -> &Value {
        &self.function
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn conversion(&self) -> ConversionPolicy {
        self.conversion
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    pub fn output_shape(&self) -> OutputShape {
        self.output_shape
    }

    pub fn pass_environment(&self) -> bool {
        self.pass_environment
    }

    pub fn expected_fields(&self) -> Option<usize> {
        self.expected_fields
    }

    pub fn output_fields(&self) -> Option<&[String]> {
        self.output_fields.as_deref()
    }

    pub fn fixed_arg_count(&self) -> usize {
        self.fixed_arg_count
    }

    pub fn arg_buffer_len(&self) -> usize {
        self.arg_buffer_len
    }

    /// Wire form with every function value replaced by its handle.
    pub fn to_wire(
        &self,
        introspector: &dyn SourceIntrospector,
    ) -> Result<WireOperator, WireError> {
        let extra_positional = self
            .extra_positional
            .as_ref()
            .map(|args| {
                args.iter()
                    .map(|arg| WireValue::from_value(arg, introspector))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        let extra_named = self
            .extra_named
            .as_ref()
            .map(|kwargs| {
                kwargs
                    .iter()
                    .map(|(name, arg)| Ok((name.clone(), WireValue::from_value(arg, introspector)?)))
                    .collect::<Result<Vec<_>, WireError>>()
            })
            .transpose()?;

        Ok(WireOperator {
            function: introspector.handle_for(&self.function)?,
            kind: self.kind,
            conversion: self.conversion,
            fixed_arg_count: self.fixed_arg_count as u32,
            pass_environment: self.pass_environment,
            expected_fields: self.expected_fields.map(|n| n as u32),
            output_fields: self.output_fields.clone(),
            output_mode: self.output_mode,
            output_shape: self.output_shape,
            extra_positional,
            extra_named,
        })
    }

    pub fn encode(&self, introspector: &dyn SourceIntrospector) -> Result<Vec<u8>, WireError> {
        wire::encode(&self.to_wire(introspector)?)
    }
}

fn text_attribute<'a>(decorators: &'a Dict, name: &str) -> Result<Option<&'a str>, FlowError> {
    match decorators.get_str(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Str(text)) => Ok(Some(text.as_str())),
        Some(other) => Err(FlowError::InvalidOperator(format!(
            "decorator attribute '{}' must be a string, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn field_names(value: Option<&Value>) -> Result<Option<Vec<String>>, FlowError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Str(name)) => Ok(Some(vec![name.clone()])),
        Some(Value::List(items)) => items
            .read()
            .iter()
            .map(|item| match item {
                Value::Str(name) => Ok(name.clone()),
                other => Err(FlowError::InvalidOperator(format!(
                    "output field names must be strings, got {}",
                    other.type_name()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(FlowError::InvalidOperator(format!(
            "produces must be a string or a list, got {}",
            other.type_name()
        ))),
    }
}

fn named_arguments(dict: &Dict) -> Result<Vec<(String, Value)>, FlowError> {
    dict.iter()
        .map(|(key, value)| match key {
            Key::Str(name) => Ok((name.clone(), value.clone())),
            Key::Int(n) => Err(FlowError::InvalidOperator(format!(
                "named argument keys must be strings, got {}",
                n
            ))),
        })
        .collect()
}
