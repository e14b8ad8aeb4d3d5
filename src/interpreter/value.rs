//=====================================================
// File: interpreter/value.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Runtime values of SolvraScript
// Objective: Share lists, dicts and lazy sequences across task threads and
//            resume generator bodies one yield at a time
//=====================================================

use super::builtins::Builtin;
use super::errors::RuntimeError;
use crate::ast::FunctionDecl;
use crate::modules::ModuleScope;
use crate::record::Record;
use crossbeam_channel::{Receiver, Sender, bounded};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread;

pub type ListRef = Arc<RwLock<Vec<Value>>>;
pub type DictRef = Arc<RwLock<Dict>>;

/// Dict keys: integers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    pub fn from_value(value: &Value) -> Result<Key, RuntimeError> {
        match value {
            Value::Int(n) => Ok(Key::Int(*n)),
            Value::Bool(b) => Ok(Key::Int(i64::from(*b))),
            Value::Str(s) => Ok(Key::Str(s.clone())),
            other => Err(RuntimeError::TypeError(format!(
                "unhashable dict key of type '{}'",
                other.type_name()
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(n) => Value::Int(*n),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{}", n),
            Key::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Insertion-ordered mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: IndexMap<Key, Value>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.entries.get(&Key::Str(key.to_string()))
    }

    /// Inserts or replaces, keeping the original position of an existing key.
    pub fn insert(&mut self, key: Key, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter()
    }
}

impl FromIterator<(Key, Value)> for Dict {
    fn from_iter<T: IntoIterator<Item = (Key, Value)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A user-defined function together with where it was defined.
#[derive(Debug)]
pub struct ScriptFunction {
    pub decl: Arc<FunctionDecl>,
    pub module: Weak<ModuleScope>,
    pub module_id: String,
    /// Snapshot of the enclosing locals for nested functions; empty at module level.
    pub captured: HashMap<String, Value>,
}

impl ScriptFunction {
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn is_nested(&self) -> bool {
        self.decl.nested
    }

    pub fn source(&self) -> &str {
        &self.decl.source
    }
}

/// Host-provided object reachable from scripts through method calls.
pub trait NativeObject: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;
    fn call_method(&self, method: &str, args: Vec<Value>) -> Result<Value, RuntimeError>;
}

/// A builtin with some arguments already supplied.
#[derive(Debug)]
pub struct Partial {
    pub builtin: &'static Builtin,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

type Body = Box<dyn FnOnce(YieldSink) -> Result<(), RuntimeError> + Send>;
type Stream = Box<dyn Iterator<Item = Value> + Send>;
type Pulled = Result<Option<Value>, RuntimeError>;

/// Generator side of a lazy sequence. Each `yield` hands one value over and blocks until
/// the next pull.
pub struct YieldSink {
    values: Sender<Pulled>,
    resume: Receiver<()>,
}

impl YieldSink {
    pub fn send(&self, value: Value) -> Result<(), RuntimeError> {
        if self.values.send(Ok(Some(value))).is_err() || self.resume.recv().is_err() {
            return Err(RuntimeError::Custom(
                "generator abandoned by its consumer".to_string(),
            ));
        }
        Ok(())
    }
}

/// Consumer side of a running generator thread.
struct Generator {
    resume: Sender<()>,
    values: Receiver<Pulled>,
}

impl Generator {
    fn spawn(body: Body) -> Result<Self, RuntimeError> {
        let (resume_tx, resume_rx) = bounded::<()>(0);
        let (values_tx, values_rx) = bounded::<Pulled>(1);
        let done = values_tx.clone();
        thread::Builder::new()
            .name("solvraflow-generator".to_string())
            .spawn(move || {
                if resume_rx.recv().is_err() {
                    return;
                }
                let sink = YieldSink {
                    values: values_tx,
                    resume: resume_rx,
                };
                let outcome = body(sink).map(|()| None);
                let _ = done.send(outcome);
            })
            .map_err(|error| RuntimeError::Custom(format!("failed to start generator: {}", error)))?;
        Ok(Self {
            resume: resume_tx,
            values: values_rx,
        })
    }

    /// Lets the body run up to its next `yield` or its end.
    fn pull(&self) -> Pulled {
        if self.resume.send(()).is_err() {
            return Ok(None);
        }
        self.values.recv().unwrap_or_else(|_| {
            Err(RuntimeError::Custom(
                "generator stopped without finishing".to_string(),
            ))
        })
    }
}

enum SequenceState {
    Pending(Body),
    Running,
    Generating(Generator),
    Streaming(Stream),
    Exhausted,
}

/// Single-pass lazy sequence: generator results or a streamed group of records.
pub struct LazySequence {
    state: Mutex<SequenceState>,
}

impl LazySequence {
    /// Sequence produced by `body`, which starts on the first pull and then runs on its
    /// own thread one `yield` at a time. Dropping the sequence stops the body at its next
    /// `yield`.
    pub fn generator<F>(body: F) -> Self
    where
        F: FnOnce(YieldSink) -> Result<(), RuntimeError> + Send + 'static,
    {
        Self {
            state: Mutex::new(SequenceState::Pending(Box::new(body))),
        }
    }

    pub fn streaming<I>(iter: I) -> Self
    where
        I: Iterator<Item = Value> + Send + 'static,
    {
        Self {
            state: Mutex::new(SequenceState::Streaming(Box::new(iter))),
        }
    }

    pub fn next_value(&self) -> Result<Option<Value>, RuntimeError> {
        let generator = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SequenceState::Running) {
                SequenceState::Pending(body) => match Generator::spawn(body) {
                    Ok(generator) => generator,
                    Err(error) => {
                        *state = SequenceState::Exhausted;
                        return Err(error);
                    }
                },
                SequenceState::Generating(generator) => generator,
                SequenceState::Running => {
                    return Err(RuntimeError::Custom(
                        "sequence pulled while it is still being produced".to_string(),
                    ));
                }
                SequenceState::Streaming(mut stream) => {
                    let next = stream.next();
                    *state = match next {
                        Some(_) => SequenceState::Streaming(stream),
                        None => SequenceState::Exhausted,
                    };
                    return Ok(next);
                }
                SequenceState::Exhausted => {
                    *state = SequenceState::Exhausted;
                    return Ok(None);
                }
            }
        };

        // Lock released while the body runs.
        let pulled = generator.pull();
        let mut state = self.state.lock();
        *state = match pulled {
            Ok(Some(_)) => SequenceState::Generating(generator),
            _ => SequenceState::Exhausted,
        };
        pulled
    }

    /// Pulls every remaining item.
    pub fn drain(&self) -> Result<Vec<Value>, RuntimeError> {
        let mut items = Vec::new();
        while let Some(item) = self.next_value()? {
            items.push(item);
        }
        Ok(items)
    }
}

impl fmt::Debug for LazySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LazySequence")
    }
}

/// Runtime values of SolvraScript
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(ListRef),
    Dict(DictRef),
    Record(Record),
    Function(Arc<ScriptFunction>),
    Builtin(&'static Builtin),
    Partial(Arc<Partial>),
    Sequence(Arc<LazySequence>),
    Module(Arc<ModuleScope>),
    Native(Arc<dyn NativeObject>),
}

impl Value {
    pub fn str(value: impl Into<String>) -> Value {
        Value::Str(value.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn dict(dict: Dict) -> Value {
        Value::Dict(Arc::new(RwLock::new(dict)))
    }

    pub fn sequence(sequence: LazySequence) -> Value {
        Value::Sequence(Arc::new(sequence))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.read().is_empty(),
            Value::Dict(dict) => !dict.read().is_empty(),
            Value::Record(record) => !record.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Record(_) => "record".to_string(),
            Value::Function(_) => "function".to_string(),
            Value::Builtin(_) => "builtin".to_string(),
            Value::Partial(_) => "partial".to_string(),
            Value::Sequence(_) => "sequence".to_string(),
            Value::Module(_) => "module".to_string(),
            Value::Native(object) => object.type_name().to_string(),
        }
    }

    /// The `decorators` mapping of a decorated value, when it wraps a function.
    pub fn decorators(&self) -> Option<DictRef> {
        let Value::Dict(outer) = self else {
            return None;
        };
        match outer.read().get_str("decorators") {
            Some(Value::Dict(inner)) if inner.read().get_str("function").is_some() => {
                Some(inner.clone())
            }
            _ => None,
        }
    }

    /// One level of decoration removed; `None` when this is not a decorated value.
    pub fn undecorated(&self) -> Option<Value> {
        self.decorators()
            .and_then(|inner| inner.read().get_str("function").cloned())
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Builtin(_) | Value::Partial(_)
        ) || self.decorators().is_some()
    }

    fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Partial(a), Value::Partial(b)) => Arc::ptr_eq(a, b),
            (Value::Sequence(a), Value::Sequence(b)) => Arc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) if n.is_finite() && n.fract() == 0.0 => write!(f, "{:.1}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                let parts: Vec<String> = items.read().iter().map(Value::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Dict(dict) => {
                let parts: Vec<String> = dict
                    .read()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.repr()))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Record(record) => {
                let parts: Vec<String> = record.values().iter().map(Value::repr).collect();
                write!(f, "record({})", parts.join(", "))
            }
            Value::Function(func) => write!(f, "<fn {}>", func.name()),
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            Value::Partial(partial) => write!(f, "<partial {}>", partial.builtin.name),
            Value::Sequence(_) => write!(f, "<sequence>"),
            Value::Module(module) => write!(f, "<module {}>", module.id()),
            Value::Native(object) => write!(f, "<{}>", object.type_name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({:?})", s),
            other => write!(f, "{}({})", other.type_name(), other),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}
