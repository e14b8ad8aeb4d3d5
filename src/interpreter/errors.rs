use super::value::Value;
use crate::modules::ModuleError;
use crate::parser::ParseError;
use std::fmt;

/// Errors raised while evaluating SolvraScript.
///
/// `Return`, `Break` and `Continue` carry control flow through the evaluator and never
/// escape a function call or loop body.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    VariableNotFound(String),
    TypeError(String),
    ArgumentError(String),
    IndexError(String),
    DivisionByZero,
    StackOverflow,
    NotImplemented(String),
    Module(String),
    Return(Value),
    Break,
    Continue,
    Custom(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::VariableNotFound(name) => write!(f, "Variable '{}' not found", name),
            RuntimeError::TypeError(msg) => write!(f, "Type error: {}", msg),
            RuntimeError::ArgumentError(msg) => write!(f, "Argument error: {}", msg),
            RuntimeError::IndexError(msg) => write!(f, "Index error: {}", msg),
            RuntimeError::DivisionByZero => write!(f, "Division by zero"),
            RuntimeError::StackOverflow => write!(f, "Stack overflow"),
            RuntimeError::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            RuntimeError::Module(msg) => write!(f, "Module error: {}", msg),
            RuntimeError::Return(val) => write!(f, "Return: {}", val),
            RuntimeError::Break => write!(f, "Break statement outside loop"),
            RuntimeError::Continue => write!(f, "Continue statement outside loop"),
            RuntimeError::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<ModuleError> for RuntimeError {
    fn from(value: ModuleError) -> Self {
        RuntimeError::Module(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Syntax,
    ModuleResolution,
    TypeMismatch,
    InvalidOperation,
    RuntimePanic,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Syntax => "E001",
            ErrorCode::ModuleResolution => "E002",
            ErrorCode::TypeMismatch => "E003",
            ErrorCode::InvalidOperation => "E004",
            ErrorCode::RuntimePanic => "E005",
        }
    }
}

/// A script failure flattened to a code and message, suitable for crossing into the
/// dataflow layer.
#[derive(Debug, Clone)]
pub struct ScriptError {
    pub code: ErrorCode,
    pub message: String,
}

impl ScriptError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code_str(), self.message)
    }
}

impl std::error::Error for ScriptError {}

impl From<ParseError> for ScriptError {
    fn from(value: ParseError) -> Self {
        ScriptError::new(ErrorCode::Syntax, value.to_string())
    }
}

impl From<ModuleError> for ScriptError {
    fn from(value: ModuleError) -> Self {
        match value {
            ModuleError::Parse { .. } => ScriptError::new(ErrorCode::Syntax, value.to_string()),
            ModuleError::Runtime { .. } => {
                ScriptError::new(ErrorCode::RuntimePanic, value.to_string())
            }
            _ => ScriptError::new(ErrorCode::ModuleResolution, value.to_string()),
        }
    }
}

impl From<RuntimeError> for ScriptError {
    fn from(value: RuntimeError) -> Self {
        ScriptError::new(runtime_error_code(&value), value.to_string())
    }
}

pub fn runtime_error_code(error: &RuntimeError) -> ErrorCode {
    match error {
        RuntimeError::TypeError(_) => ErrorCode::TypeMismatch,
        RuntimeError::ArgumentError(_)
        | RuntimeError::IndexError(_)
        | RuntimeError::DivisionByZero
        | RuntimeError::VariableNotFound(_)
        | RuntimeError::NotImplemented(_) => ErrorCode::InvalidOperation,
        RuntimeError::Module(_) => ErrorCode::ModuleResolution,
        RuntimeError::StackOverflow | RuntimeError::Custom(_) => ErrorCode::RuntimePanic,
        RuntimeError::Return(_) | RuntimeError::Break | RuntimeError::Continue => {
            ErrorCode::RuntimePanic
        }
    }
}
