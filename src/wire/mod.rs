//=====================================================
// File: wire/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Binary form of operator configurations
// Objective: Replace every function value with its handle on the way out and
//            resolve handles back into callables on the way in
//=====================================================

use crate::environment::ScriptEnvironment;
use crate::handle::{self, FunctionHandle, ResolveError, SourceIntrospector};
use crate::interpreter::{Dict, Key, Value, builtins};
use crate::operator::{OperatorKind, OutputMode, OutputShape};
use crate::record::{ConversionPolicy, Record};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("value of type {0} cannot be shipped to workers")]
    Unshippable(String),
    #[error("unknown builtin {0}")]
    UnknownBuiltin(String),
    #[error("invalid dict key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Handle(#[from] ResolveError),
}

/// A script value with every function replaced by its handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<WireValue>),
    Dict(Vec<(WireValue, WireValue)>),
    Record {
        names: Vec<String>,
        values: Vec<WireValue>,
    },
    Builtin(String),
    Function(FunctionHandle),
}

impl WireValue {
    pub fn from_value(
        value: &Value,
        introspector: &dyn SourceIntrospector,
    ) -> Result<WireValue, WireError> {
        let wire = match value {
            Value::Null => WireValue::Null,
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Int(n) => WireValue::Int(*n),
            Value::Float(f) => WireValue::Float(*f),
            Value::Str(s) => WireValue::Str(s.clone()),
            Value::List(items) => WireValue::List(
                items
                    .read()
                    .iter()
                    .map(|item| WireValue::from_value(item, introspector))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Dict(dict) => WireValue::Dict(
                dict.read()
                    .iter()
                    .map(|(key, item)| {
                        Ok((
                            WireValue::from_value(&key.to_value(), introspector)?,
                            WireValue::from_value(item, introspector)?,
                        ))
                    })
                    .collect::<Result<_, WireError>>()?,
            ),
            Value::Record(record) => WireValue::Record {
                names: record.names().to_vec(),
                values: record
                    .values()
                    .iter()
                    .map(|item| WireValue::from_value(item, introspector))
                    .collect::<Result<_, _>>()?,
            },
            Value::Builtin(builtin) => WireValue::Builtin(builtin.name.to_string()),
            Value::Function(_) => WireValue::Function(introspector.handle_for(value)?),
            other => return Err(WireError::Unshippable(other.type_name())),
        };
        Ok(wire)
    }

    /// Rebuilds the value, resolving function handles in `env`.
    pub fn into_value(self, env: &ScriptEnvironment) -> Result<Value, WireError> {
        let value = match self {
            WireValue::Null => Value::Null,
            WireValue::Bool(b) => Value::Bool(b),
            WireValue::Int(n) => Value::Int(n),
            WireValue::Float(f) => Value::Float(f),
            WireValue::Str(s) => Value::Str(s),
            WireValue::List(items) => Value::list(
                items
                    .into_iter()
                    .map(|item| item.into_value(env))
                    .collect::<Result<_, _>>()?,
            ),
            WireValue::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, item) in entries {
                    let key = key.into_value(env)?;
                    let key = Key::from_value(&key)
                        .map_err(|error| WireError::InvalidKey(error.to_string()))?;
                    dict.insert(key, item.into_value(env)?);
                }
                Value::dict(dict)
            }
            WireValue::Record { names, values } => Value::Record(Record::with_names(
                names,
                values
                    .into_iter()
                    .map(|item| item.into_value(env))
                    .collect::<Result<_, _>>()?,
            )),
            WireValue::Builtin(name) => match builtins::lookup(&name) {
                Some(builtin) => Value::Builtin(builtin),
                None => return Err(WireError::UnknownBuiltin(name)),
            },
            WireValue::Function(handle) => handle::resolve(&handle, env)?,
        };
        Ok(value)
    }

    fn validate_handles(&self) -> Result<(), WireError> {
        match self {
            WireValue::Function(handle) => Ok(handle.validate()?),
            WireValue::List(items) | WireValue::Record { values: items, .. } => {
                items.iter().try_for_each(WireValue::validate_handles)
            }
            WireValue::Dict(entries) => entries.iter().try_for_each(|(key, item)| {
                key.validate_handles()?;
                item.validate_handles()
            }),
            _ => Ok(()),
        }
    }
}

/// Shipped form of an operator configuration.
///
/// Field order is the encoded order; optional fields carry a one-byte presence flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireOperator {
    pub function: FunctionHandle,
    pub kind: OperatorKind,
    pub conversion: ConversionPolicy,
    pub fixed_arg_count: u32,
    pub pass_environment: bool,
    pub expected_fields: Option<u32>,
    pub output_fields: Option<Vec<String>>,
    pub output_mode: OutputMode,
    pub output_shape: OutputShape,
    pub extra_positional: Option<Vec<WireValue>>,
    pub extra_named: Option<Vec<(String, WireValue)>>,
}

pub fn encode(operator: &WireOperator) -> Result<Vec<u8>, WireError> {
    Ok(bincode::serialize(operator)?)
}

/// Decodes and checks that every handle is well formed. Handles are not resolved here.
pub fn decode(bytes: &[u8]) -> Result<WireOperator, WireError> {
    let operator: WireOperator = bincode::deserialize(bytes)?;
    operator.function.validate()?;
    for value in operator.extra_positional.iter().flatten() {
        value.validate_handles()?;
    }
    for (_, value) in operator.extra_named.iter().flatten() {
        value.validate_handles()?;
    }
    Ok(operator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{BindingKind, ScriptIntrospector};

    fn operator() -> WireOperator {
        WireOperator {
            function: FunctionHandle::global("main.svs", "split_words"),
            kind: OperatorKind::Map,
            conversion: ConversionPolicy::AsNativeList,
            fixed_arg_count: 1,
            pass_environment: false,
            expected_fields: None,
            output_fields: Some(vec!["word".to_string()]),
            output_mode: OutputMode::Yields,
            output_shape: OutputShape::AutoDetect,
            extra_positional: None,
            extra_named: Some(vec![("limit".to_string(), WireValue::Int(3))]),
        }
    }

    #[test]
    fn handle_layout_puts_presence_flag_before_source() {
        let global = bincode::serialize(&FunctionHandle::global("m", "f")).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.push(b'f');
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.push(b'm');
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.push(0);
        assert_eq!(global, expected);

        let closure = bincode::serialize(&FunctionHandle::closure("m", "f", "s")).unwrap();
        assert_eq!(&closure[18..22], &1u32.to_le_bytes());
        assert_eq!(closure[22], 1);
        assert_eq!(&closure[23..31], &1u64.to_le_bytes());
        assert_eq!(closure[31], b's');
    }

    #[test]
    fn operator_survives_encoding() {
        let bytes = encode(&operator()).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, operator());
        assert_eq!(decoded.function.binding_kind, BindingKind::Global);
    }

    #[test]
    fn decode_rejects_inconsistent_handles() {
        let mut broken = operator();
        broken.function.binding_kind = BindingKind::Closure;
        let bytes = encode(&broken).unwrap();
        assert!(matches!(
            decode(&bytes),
            Err(WireError::Handle(ResolveError::Malformed { .. }))
        ));
        assert!(matches!(decode(&bytes[..4]), Err(WireError::Codec(_))));
    }

    #[test]
    fn plain_values_convert_and_sequences_do_not() {
        let value = Value::list(vec![Value::Int(1), Value::from("a"), Value::Null]);
        assert_eq!(
            WireValue::from_value(&value, &ScriptIntrospector).unwrap(),
            WireValue::List(vec![
                WireValue::Int(1),
                WireValue::Str("a".to_string()),
                WireValue::Null
            ])
        );

        let len = Value::Builtin(builtins::lookup("len").unwrap());
        assert_eq!(
            WireValue::from_value(&len, &ScriptIntrospector).unwrap(),
            WireValue::Builtin("len".to_string())
        );

        let sequence = Value::sequence(crate::interpreter::LazySequence::streaming(
            Vec::new().into_iter(),
        ));
        assert!(matches!(
            WireValue::from_value(&sequence, &ScriptIntrospector),
            Err(WireError::Unshippable(name)) if name == "sequence"
        ));
    }
}
