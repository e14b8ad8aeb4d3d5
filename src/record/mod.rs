//=====================================================
// File: record/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Records flowing between dataflow operators
// Objective: Hold ordered values with optional field names and convert them
//            into native lists or dicts for script functions
//=====================================================

use crate::interpreter::{Dict, Key, Value};
use serde::{Deserialize, Serialize};

/// A dataflow record: ordered values, optionally named.
///
/// Names may be fewer than values; trailing values are then addressed by position only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    names: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            names: Vec::new(),
            values,
        }
    }

    pub fn with_names(names: Vec<String>, values: Vec<Value>) -> Self {
        Self { names, values }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .and_then(|index| self.values.get(index))
    }

    /// Same values under a new set of names.
    pub fn renamed(self, names: Vec<String>) -> Self {
        Self {
            names,
            values: self.values,
        }
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Record::new(values)
    }
}

/// How input records are presented to a script function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConversionPolicy {
    /// The native record is passed through.
    #[default]
    None,
    /// Field values in order.
    AsNativeList,
    /// Field name to value; unnamed positions use their integer index.
    AsNativeDict,
}

impl ConversionPolicy {
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name {
            "none" => Some(ConversionPolicy::None),
            "list" => Some(ConversionPolicy::AsNativeList),
            "dict" => Some(ConversionPolicy::AsNativeDict),
            _ => None,
        }
    }
}

pub fn convert_input(record: &Record, policy: ConversionPolicy) -> Value {
    match policy {
        ConversionPolicy::None => Value::Record(record.clone()),
        ConversionPolicy::AsNativeList => Value::list(record.values().to_vec()),
        ConversionPolicy::AsNativeDict => {
            let dict: Dict = record
                .values()
                .iter()
                .enumerate()
                .map(|(index, value)| {
                    let key = match record.names().get(index) {
                        Some(name) => Key::Str(name.clone()),
                        None => Key::Int(index as i64),
                    };
                    (key, value.clone())
                })
                .collect();
            Value::dict(dict)
        }
    }
}

/// Shape of a value emitted by a record producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    List,
    Record,
    Other,
}

pub fn classify(value: &Value) -> ValueShape {
    match value {
        Value::List(_) => ValueShape::List,
        Value::Record(_) => ValueShape::Record,
        _ => ValueShape::Other,
    }
}
