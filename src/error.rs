//=====================================================
// File: error.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Operator-facing error type
// Objective: Wrap environment, handle, wire, config and output failures
//            behind one error returned by every operator call
//=====================================================

use crate::environment::{ConfigError, EnvironmentError};
use crate::handle::ResolveError;
use crate::interpreter::ScriptError;
use crate::operator::output::OutputTypeError;
use crate::wire::WireError;
use thiserror::Error;

/// Failures surfaced by operators and the flow host interface. None of them are
/// retried.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    OutputType(#[from] OutputTypeError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("script function {function} failed: {source}")]
    Script {
        function: String,
        source: ScriptError,
    },
    #[error("operator used before prepare")]
    NotPrepared,
    #[error("expected {expected} input fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },
    #[error("invalid operator: {0}")]
    InvalidOperator(String),
}
