//=====================================================
// File: handle/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Wire identity of SolvraScript functions
// Objective: Describe a function by module, name and captured source, and turn
//            that description back into a live callable inside an environment
//=====================================================

use crate::environment::ScriptEnvironment;
use crate::interpreter::{ScriptError, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// How a function is bound in its defining module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingKind {
    /// Declared at module level; found by name in the module globals.
    Global,
    /// Declared inside another function; its source must be re-executed first.
    Closure,
}

/// The only thing put on the wire for a function value.
///
/// Field order is the encoded order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionHandle {
    pub function_name: String,
    pub defining_source: String,
    pub binding_kind: BindingKind,
    pub captured_source: Option<String>,
}

impl FunctionHandle {
    pub fn global(defining_source: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            defining_source: defining_source.into(),
            binding_kind: BindingKind::Global,
            captured_source: None,
        }
    }

    pub fn closure(
        defining_source: impl Into<String>,
        function_name: impl Into<String>,
        captured_source: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            defining_source: defining_source.into(),
            binding_kind: BindingKind::Closure,
            captured_source: Some(captured_source.into()),
        }
    }

    /// Captured source is present exactly for closures.
    pub fn validate(&self) -> Result<(), ResolveError> {
        let consistent = match self.binding_kind {
            BindingKind::Global => self.captured_source.is_none(),
            BindingKind::Closure => self.captured_source.is_some(),
        };
        if consistent && !self.function_name.is_empty() {
            Ok(())
        } else {
            Err(ResolveError::Malformed {
                function_name: self.function_name.clone(),
                defining_source: self.defining_source.clone(),
            })
        }
    }
}

impl fmt::Display for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.defining_source, self.function_name)
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("value of type {type_name} is not a script function")]
    NotAFunction { type_name: String },
    #[error("handle for {function_name} in {defining_source} is malformed")]
    Malformed {
        function_name: String,
        defining_source: String,
    },
    #[error("cannot load {defining_source} to resolve {function_name}: {source}")]
    Module {
        function_name: String,
        defining_source: String,
        source: ScriptError,
    },
    #[error("re-executing the source of {function_name} in {defining_source} failed: {source}")]
    CapturedSource {
        function_name: String,
        defining_source: String,
        source: ScriptError,
    },
    #[error(
        "{function_name} in {defining_source} reads local variables of its enclosing function ({names}), which cannot be shipped"
    )]
    CapturesLocals {
        function_name: String,
        defining_source: String,
        names: String,
    },
    #[error("function {function_name} not found in {defining_source}")]
    NotFound {
        function_name: String,
        defining_source: String,
    },
    #[error("{function_name} in {defining_source} resolved to a {type_name}, which is not callable")]
    NotCallable {
        function_name: String,
        defining_source: String,
        type_name: String,
    },
}

/// Maps a live function value to its handle.
pub trait SourceIntrospector: Send + Sync {
    fn handle_for(&self, function: &Value) -> Result<FunctionHandle, ResolveError>;
}

/// Introspector backed by the metadata every script function carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptIntrospector;

impl SourceIntrospector for ScriptIntrospector {
    fn handle_for(&self, function: &Value) -> Result<FunctionHandle, ResolveError> {
        match function {
            Value::Function(func) if func.is_nested() => {
                let locals: Vec<String> = func
                    .decl
                    .free_names()
                    .into_iter()
                    .filter(|name| func.captured.contains_key(name))
                    .collect();
                if !locals.is_empty() {
                    return Err(ResolveError::CapturesLocals {
                        function_name: func.name().to_string(),
                        defining_source: func.module_id.clone(),
                        names: locals.join(", "),
                    });
                }
                Ok(FunctionHandle::closure(
                    func.module_id.clone(),
                    func.name(),
                    func.source(),
                ))
            }
            Value::Function(func) => Ok(FunctionHandle::global(
                func.module_id.clone(),
                func.name(),
            )),
            other => match other.undecorated() {
                Some(inner) => self.handle_for(&inner),
                None => Err(ResolveError::NotAFunction {
                    type_name: other.type_name(),
                }),
            },
        }
    }
}

/// Reconstructs the callable a handle names inside `env`.
///
/// Closures always have their captured source executed in the defining module before
/// the lookup, so the freshly defined binding wins over any earlier one. A decorated
/// value is unwrapped one level.
pub fn resolve(handle: &FunctionHandle, env: &ScriptEnvironment) -> Result<Value, ResolveError> {
    handle.validate()?;

    let scope = env
        .module_scope(&handle.defining_source)
        .map_err(|error| ResolveError::Module {
            function_name: handle.function_name.clone(),
            defining_source: handle.defining_source.clone(),
            source: error.into(),
        })?;

    if let Some(captured) = &handle.captured_source {
        env.interpreter(scope.clone())
            .execute_source(captured)
            .map_err(|source| ResolveError::CapturedSource {
                function_name: handle.function_name.clone(),
                defining_source: handle.defining_source.clone(),
                source,
            })?;
    }

    let found = scope
        .get(&handle.function_name)
        .ok_or_else(|| ResolveError::NotFound {
            function_name: handle.function_name.clone(),
            defining_source: handle.defining_source.clone(),
        })?;
    let function = found.undecorated().unwrap_or(found);

    if !function.is_callable() {
        return Err(ResolveError::NotCallable {
            function_name: handle.function_name.clone(),
            defining_source: handle.defining_source.clone(),
            type_name: function.type_name(),
        });
    }

    debug!(handle = %handle, kind = ?handle.binding_kind, "resolved function handle");
    Ok(function)
}
