//=====================================================
// File: operator/output.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Turn script results into output records
// Objective: Lock the output mode and record shape on first use and reject
//            values that disagree with the locked decision
//=====================================================

use super::{OutputMode, OutputShape};
use crate::flow::OutputCollector;
use crate::interpreter::{RuntimeError, Value};
use crate::record::{Record, ValueShape, classify};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum OutputTypeError {
    #[error("script function must return {expected}, got {type_name}")]
    Mismatch {
        expected: &'static str,
        type_name: String,
    },
    #[error("reading yielded values failed: {0}")]
    Sequence(RuntimeError),
}

fn mismatch(expected: &'static str, value: &Value) -> OutputTypeError {
    OutputTypeError::Mismatch {
        expected,
        type_name: value.type_name(),
    }
}

/// Turns script results into output records.
///
/// Both the mode and the shape start undecided and lock on first use; a locked
/// decision never changes for the lifetime of the operator instance.
#[derive(Debug, Clone)]
pub struct OutputCoercion {
    mode: OutputMode,
    shape: OutputShape,
    output_fields: Vec<String>,
}

impl OutputCoercion {
    pub fn new(mode: OutputMode, shape: OutputShape) -> Self {
        Self {
            mode,
            shape,
            output_fields: Vec::new(),
        }
    }

    /// Field names given to records built from lists.
    pub fn with_output_fields(mut self, names: Vec<String>) -> Self {
        self.output_fields = names;
        self
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn shape(&self) -> OutputShape {
        self.shape
    }

    /// Routes a function's return value to `output`.
    pub fn collect(
        &mut self,
        returned: Value,
        output: &mut dyn OutputCollector,
    ) -> Result<(), OutputTypeError> {
        if returned.is_null() || self.mode == OutputMode::Collects {
            return Ok(());
        }
        if self.mode == OutputMode::AutoDetect {
            self.mode = match returned {
                Value::Sequence(_) => OutputMode::Yields,
                _ => OutputMode::Returns,
            };
            debug!(mode = ?self.mode, "output mode locked");
        }

        match self.mode {
            OutputMode::Yields => {
                let Value::Sequence(sequence) = &returned else {
                    return Err(mismatch("a sequence of records", &returned));
                };
                while let Some(item) = sequence.next_value().map_err(OutputTypeError::Sequence)? {
                    if !item.is_null() {
                        self.emit(item, output)?;
                    }
                }
                Ok(())
            }
            _ => self.emit(returned, output),
        }
    }

    /// Converts one emitted value into a record.
    pub fn emit(
        &mut self,
        value: Value,
        output: &mut dyn OutputCollector,
    ) -> Result<(), OutputTypeError> {
        let shape = classify(&value);
        if self.shape == OutputShape::AutoDetect {
            self.shape = match shape {
                ValueShape::List => OutputShape::NativeList,
                ValueShape::Record => OutputShape::NativeRecord,
                ValueShape::Other => return Err(mismatch("a list or a record", &value)),
            };
            debug!(shape = ?self.shape, "output shape locked");
        }

        match (self.shape, value) {
            (OutputShape::NativeList, Value::List(items)) => {
                let values = items.read().clone();
                output.add(Record::with_names(self.output_fields.clone(), values));
                Ok(())
            }
            (OutputShape::NativeRecord, Value::Record(record)) => {
                output.add(record);
                Ok(())
            }
            (OutputShape::NativeList, other) => Err(mismatch("a list", &other)),
            (_, other) => Err(mismatch("a record", &other)),
        }
    }
}
