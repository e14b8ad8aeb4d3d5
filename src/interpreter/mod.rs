//=====================================================
// File: interpreter/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Tree-walking evaluator for SolvraScript
// Objective: Execute module sources against their global scope and call script
//            functions on behalf of dataflow operators
//=====================================================

pub mod builtins;
pub mod errors;
pub mod value;

pub use builtins::{Builtin, NativeArity, SCRIPT_LOG_TARGET};
pub use errors::{ErrorCode, RuntimeError, ScriptError};
pub use value::{
    Dict, Key, LazySequence, NativeObject, Partial, ScriptFunction, Value, YieldSink,
};

use crate::ast::{Argument, BinaryOp, Expr, Literal, Program, Stmt, UnaryOp};
use crate::modules::{ModuleRegistry, ModuleScope};
use crate::parser::parse_source;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

type Environment = HashMap<String, Value>;

//=============================================
//            Section 1: Interpreter State
//=============================================

/// Evaluation context: one module's globals plus, inside a function, a stack of local
/// scopes. At module level the local stack is empty and bindings go to the globals.
pub struct Interpreter {
    registry: Arc<ModuleRegistry>,
    module: Arc<ModuleScope>,
    locals: Vec<Environment>,
    depth: usize,
    max_call_depth: usize,
    yield_sink: Option<YieldSink>,
}

impl Interpreter {
    pub fn new(registry: Arc<ModuleRegistry>, module: Arc<ModuleScope>) -> Self {
        Self {
            registry,
            module,
            locals: Vec::new(),
            depth: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            yield_sink: None,
        }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn module(&self) -> &Arc<ModuleScope> {
        &self.module
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Runs every top-level statement of `program` in this module.
    pub fn execute_program(&mut self, program: &Program) -> Result<(), RuntimeError> {
        for stmt in &program.statements {
            match self.eval_stmt(stmt) {
                Ok(()) => {}
                Err(RuntimeError::Return(_)) => {
                    return Err(RuntimeError::Custom(
                        "'return' outside of a function".to_string(),
                    ));
                }
                Err(RuntimeError::Break) | Err(RuntimeError::Continue) => {
                    return Err(RuntimeError::Custom(
                        "'break' or 'continue' outside of a loop".to_string(),
                    ));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Parses and runs source text in this module.
    pub fn execute_source(&mut self, source: &str) -> Result<(), ScriptError> {
        let program = parse_source(source)?;
        self.execute_program(&program)?;
        Ok(())
    }

    /// Calls any callable value with positional and named arguments.
    pub fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(func) => self.call_function(func, args, kwargs),
            Value::Builtin(builtin) => builtin.call(&args, &kwargs),
            Value::Partial(partial) => {
                let mut all_args = partial.args.clone();
                all_args.extend(args);
                let mut all_kwargs = partial.kwargs.clone();
                all_kwargs.extend(kwargs);
                partial.builtin.call(&all_args, &all_kwargs)
            }
            other => match other.undecorated() {
                Some(inner) => self.call_value(&inner, args, kwargs),
                None => Err(RuntimeError::TypeError(format!(
                    "Value of type '{}' is not callable",
                    other.type_name()
                ))),
            },
        }
    }

    //=============================================
    //            Section 2: Function Calls
    //=============================================

    fn call_function(
        &mut self,
        func: &Arc<ScriptFunction>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        if self.depth >= self.max_call_depth {
            return Err(RuntimeError::StackOverflow);
        }

        let module = func.module.upgrade().ok_or_else(|| {
            RuntimeError::Custom(format!(
                "module '{}' defining '{}' is no longer loaded",
                func.module_id,
                func.name()
            ))
        })?;

        let mut frame = func.captured.clone();
        if func.is_nested() {
            frame.insert(func.name().to_string(), Value::Function(func.clone()));
        }

        let mut callee = Interpreter {
            registry: self.registry.clone(),
            module,
            locals: vec![frame],
            depth: self.depth + 1,
            max_call_depth: self.max_call_depth,
            yield_sink: None,
        };
        callee.bind_parameters(func, args, kwargs)?;

        if func.decl.is_generator {
            let decl = func.decl.clone();
            return Ok(Value::sequence(LazySequence::generator(move |sink| {
                callee.yield_sink = Some(sink);
                callee.run_body(&decl.body).map(|_| ())
            })));
        }

        callee.run_body(&func.decl.body)
    }

    fn bind_parameters(
        &mut self,
        func: &ScriptFunction,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<(), RuntimeError> {
        let params = &func.decl.params;
        if args.len() > params.len() {
            return Err(RuntimeError::ArgumentError(format!(
                "Function '{}' expects at most {} arguments, got {}",
                func.name(),
                params.len(),
                args.len()
            )));
        }

        let mut bound: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        bound.resize(params.len(), None);

        for (name, value) in kwargs {
            let index = params
                .iter()
                .position(|param| param.name == name)
                .ok_or_else(|| {
                    RuntimeError::ArgumentError(format!(
                        "Function '{}' has no parameter named '{}'",
                        func.name(),
                        name
                    ))
                })?;
            if bound[index].is_some() {
                return Err(RuntimeError::ArgumentError(format!(
                    "Function '{}' got multiple values for '{}'",
                    func.name(),
                    name
                )));
            }
            bound[index] = Some(value);
        }

        for (param, slot) in params.iter().zip(bound) {
            let value = match (slot, &param.default_value) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval_expr(default)?,
                (None, None) => {
                    return Err(RuntimeError::ArgumentError(format!(
                        "Function '{}' is missing argument '{}'",
                        func.name(),
                        param.name
                    )));
                }
            };
            self.define_variable(&param.name, value);
        }
        Ok(())
    }

    fn run_body(&mut self, body: &[Stmt]) -> Result<Value, RuntimeError> {
        match self.exec_statements(body) {
            Ok(()) => Ok(Value::Null),
            Err(RuntimeError::Return(value)) => Ok(value),
            Err(RuntimeError::Break) | Err(RuntimeError::Continue) => Err(RuntimeError::Custom(
                "'break' or 'continue' outside of a loop".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    //=============================================
    //            Section 3: Statements
    //=============================================

    fn exec_statements(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        for stmt in statements {
            self.eval_stmt(stmt)?;
        }
        Ok(())
    }

    fn exec_block(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        if self.locals.is_empty() {
            return self.exec_statements(statements);
        }
        self.push_scope();
        let result = self.exec_statements(statements);
        self.pop_scope();
        result
    }

    fn eval_stmt(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        match stmt {
            Stmt::Expression { expr, .. } => {
                self.eval_expr(expr)?;
                Ok(())
            }

            Stmt::Let {
                name, initializer, ..
            } => {
                let value = match initializer {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Null,
                };
                self.define_variable(name, value);
                Ok(())
            }

            Stmt::Assign { target, value, .. } => {
                let value = self.eval_expr(value)?;
                self.assign_target(target, value)
            }

            Stmt::FunctionDecl { decl } => {
                let captured = if self.locals.is_empty() {
                    HashMap::new()
                } else {
                    self.capture_environment()
                };
                let mut value = Value::Function(Arc::new(ScriptFunction {
                    decl: decl.clone(),
                    module: Arc::downgrade(&self.module),
                    module_id: self.module.id().to_string(),
                    captured,
                }));
                for decorator in decl.decorators.iter().rev() {
                    let decorator = self.eval_expr(decorator)?;
                    value = self.call_value(&decorator, vec![value], Vec::new())?;
                }
                self.define_variable(&decl.name, value);
                Ok(())
            }

            Stmt::Import { module, .. } => {
                let scope = self.registry.load(module)?;
                self.define_variable(module, Value::Module(scope));
                Ok(())
            }

            Stmt::Block { statements, .. } => self.exec_block(statements),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.eval_expr(condition)?.is_truthy() {
                    self.exec_block(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch)
                } else {
                    Ok(())
                }
            }

            Stmt::While {
                condition, body, ..
            } => {
                while self.eval_expr(condition)?.is_truthy() {
                    match self.exec_block(body) {
                        Ok(()) | Err(RuntimeError::Continue) => {}
                        Err(RuntimeError::Break) => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }

            Stmt::For {
                variable,
                iterable,
                body,
                ..
            } => {
                let iterable = self.eval_expr(iterable)?;
                if let Value::Sequence(sequence) = &iterable {
                    while let Some(item) = sequence.next_value()? {
                        if !self.run_loop_iteration(variable, item, body)? {
                            break;
                        }
                    }
                } else {
                    for item in builtins::iterable_items(&iterable)? {
                        if !self.run_loop_iteration(variable, item, body)? {
                            break;
                        }
                    }
                }
                Ok(())
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Null,
                };
                Err(RuntimeError::Return(value))
            }

            Stmt::Yield { value, .. } => {
                let value = self.eval_expr(value)?;
                match self.yield_sink.as_ref() {
                    Some(sink) => sink.send(value),
                    None => Err(RuntimeError::Custom(
                        "'yield' outside of a generator".to_string(),
                    )),
                }
            }

            Stmt::Break { .. } => Err(RuntimeError::Break),
            Stmt::Continue { .. } => Err(RuntimeError::Continue),
        }
    }

    /// Returns `false` when the loop should stop.
    fn run_loop_iteration(
        &mut self,
        variable: &str,
        item: Value,
        body: &[Stmt],
    ) -> Result<bool, RuntimeError> {
        self.define_variable(variable, item);
        match self.exec_block(body) {
            Ok(()) | Err(RuntimeError::Continue) => Ok(true),
            Err(RuntimeError::Break) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn assign_target(&mut self, target: &Expr, value: Value) -> Result<(), RuntimeError> {
        match target {
            Expr::Identifier { name, .. } => self.assign_variable(name, value),
            Expr::Index { object, index, .. } => {
                let object = self.eval_expr(object)?;
                let index = self.eval_expr(index)?;
                match &object {
                    Value::List(items) => {
                        let mut items = items.write();
                        let slot = list_index(&index, items.len())?;
                        items[slot] = value;
                        Ok(())
                    }
                    Value::Dict(dict) => {
                        dict.write().insert(Key::from_value(&index)?, value);
                        Ok(())
                    }
                    other => Err(RuntimeError::TypeError(format!(
                        "cannot assign by index into '{}'",
                        other.type_name()
                    ))),
                }
            }
            Expr::Member {
                object, property, ..
            } => match self.eval_expr(object)? {
                Value::Dict(dict) => {
                    dict.write().insert(Key::Str(property.clone()), value);
                    Ok(())
                }
                other => Err(RuntimeError::TypeError(format!(
                    "cannot assign field '{}' on '{}'",
                    property,
                    other.type_name()
                ))),
            },
            _ => Err(RuntimeError::TypeError(
                "invalid assignment target".to_string(),
            )),
        }
    }

    //=============================================
    //            Section 4: Expressions
    //=============================================

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal { value, .. } => Ok(match value {
                Literal::Integer(n) => Value::Int(*n),
                Literal::Float(f) => Value::Float(*f),
                Literal::String(s) => Value::Str(s.clone()),
                Literal::Boolean(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
            }),

            Expr::Identifier { name, .. } => self.get_variable(name),

            Expr::List { elements, .. } => {
                let items = elements
                    .iter()
                    .map(|element| self.eval_expr(element))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(items))
            }

            Expr::Dict { entries, .. } => {
                let mut dict = Dict::new();
                for (key, value) in entries {
                    let key = Key::from_value(&self.eval_expr(key)?)?;
                    let value = self.eval_expr(value)?;
                    dict.insert(key, value);
                }
                Ok(Value::dict(dict))
            }

            Expr::Binary {
                left,
                operator,
                right,
                ..
            } => {
                let left = self.eval_expr(left)?;
                match operator {
                    BinaryOp::And if !left.is_truthy() => Ok(left),
                    BinaryOp::Or if left.is_truthy() => Ok(left),
                    BinaryOp::And | BinaryOp::Or => self.eval_expr(right),
                    _ => {
                        let right = self.eval_expr(right)?;
                        binary_op(*operator, &left, &right)
                    }
                }
            }

            Expr::Unary {
                operator, operand, ..
            } => {
                let operand = self.eval_expr(operand)?;
                match (operator, &operand) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Minus, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| RuntimeError::Custom("integer overflow".to_string())),
                    (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Minus, other) => Err(RuntimeError::TypeError(format!(
                        "cannot negate '{}'",
                        other.type_name()
                    ))),
                }
            }

            Expr::Call { callee, args, .. } => {
                if let Expr::Member {
                    object, property, ..
                } = &**callee
                {
                    let object = self.eval_expr(object)?;
                    let (args, kwargs) = self.eval_arguments(args)?;
                    if let Value::Native(native) = &object {
                        if !kwargs.is_empty() {
                            return Err(RuntimeError::ArgumentError(format!(
                                "method '{}' does not take named arguments",
                                property
                            )));
                        }
                        return native.call_method(property, args);
                    }
                    let method = member(&object, property)?;
                    return self.call_value(&method, args, kwargs);
                }

                let callee = self.eval_expr(callee)?;
                let (args, kwargs) = self.eval_arguments(args)?;
                self.call_value(&callee, args, kwargs)
            }

            Expr::Index { object, index, .. } => {
                let object = self.eval_expr(object)?;
                let index = self.eval_expr(index)?;
                index_value(&object, &index)
            }

            Expr::Member {
                object, property, ..
            } => {
                let object = self.eval_expr(object)?;
                member(&object, property)
            }
        }
    }

    fn eval_arguments(
        &mut self,
        args: &[Argument],
    ) -> Result<(Vec<Value>, Vec<(String, Value)>), RuntimeError> {
        let mut positional = Vec::new();
        let mut named = Vec::new();
        for arg in args {
            match arg {
                Argument::Positional(expr) => positional.push(self.eval_expr(expr)?),
                Argument::Named { name, value } => {
                    named.push((name.clone(), self.eval_expr(value)?))
                }
            }
        }
        Ok((positional, named))
    }

    //=============================================
    //            Section 5: Environment Management
    //=============================================

    fn push_scope(&mut self) {
        self.locals.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.locals.pop();
    }

    fn define_variable(&mut self, name: &str, value: Value) {
        match self.locals.last_mut() {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => self.module.define(name, value),
        }
    }

    fn assign_variable(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        for scope in self.locals.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return Ok(());
            }
        }
        if self.module.contains(name) {
            self.module.define(name, value);
            return Ok(());
        }
        Err(RuntimeError::VariableNotFound(name.to_string()))
    }

    fn get_variable(&self, name: &str) -> Result<Value, RuntimeError> {
        for scope in self.locals.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.module.get(name) {
            return Ok(value);
        }
        builtins::lookup(name)
            .map(Value::Builtin)
            .ok_or_else(|| RuntimeError::VariableNotFound(name.to_string()))
    }

    /// Snapshot of every visible local, inner scopes shadowing outer ones.
    fn capture_environment(&self) -> Environment {
        let mut captured = Environment::new();
        for scope in &self.locals {
            for (name, value) in scope {
                captured.insert(name.clone(), value.clone());
            }
        }
        captured
    }
}

//=============================================
//            Section 6: Operators & Access
//=============================================

fn list_index(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    let Value::Int(raw) = index else {
        return Err(RuntimeError::TypeError(format!(
            "list index must be an int, got {}",
            index.type_name()
        )));
    };
    let resolved = if *raw < 0 { *raw + len as i64 } else { *raw };
    if resolved < 0 || resolved as usize >= len {
        return Err(RuntimeError::IndexError(format!(
            "index {} out of range for length {}",
            raw, len
        )));
    }
    Ok(resolved as usize)
}

fn index_value(object: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match object {
        Value::List(items) => {
            let items = items.read();
            Ok(items[list_index(index, items.len())?].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[list_index(index, chars.len())?].to_string()))
        }
        Value::Dict(dict) => {
            let key = Key::from_value(index)?;
            dict.read()
                .get(&key)
                .cloned()
                .ok_or_else(|| RuntimeError::IndexError(format!("key {} not found", key)))
        }
        Value::Record(record) => match index {
            Value::Str(name) => record
                .get_by_name(name)
                .cloned()
                .ok_or_else(|| RuntimeError::IndexError(format!("no field named '{}'", name))),
            other => Ok(record.values()[list_index(other, record.len())?].clone()),
        },
        other => Err(RuntimeError::TypeError(format!(
            "'{}' is not indexable",
            other.type_name()
        ))),
    }
}

fn member(object: &Value, property: &str) -> Result<Value, RuntimeError> {
    match object {
        Value::Record(record) => record
            .get_by_name(property)
            .cloned()
            .ok_or_else(|| RuntimeError::IndexError(format!("no field named '{}'", property))),
        Value::Dict(dict) => dict
            .read()
            .get_str(property)
            .cloned()
            .ok_or_else(|| RuntimeError::IndexError(format!("key \"{}\" not found", property))),
        Value::Module(scope) => scope.get(property).ok_or_else(|| {
            RuntimeError::VariableNotFound(format!("{}.{}", scope.id(), property))
        }),
        other => Err(RuntimeError::TypeError(format!(
            "'{}' has no member '{}'",
            other.type_name(),
            property
        ))),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let overflow = || RuntimeError::Custom("integer overflow".to_string());
    let mismatch = || {
        RuntimeError::TypeError(format!(
            "unsupported operand types for {:?}: '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        ))
    };

    match op {
        BinaryOp::Equal => return Ok(Value::Bool(left == right)),
        BinaryOp::NotEqual => return Ok(Value::Bool(left != right)),
        _ => {}
    }

    match (left, right) {
        (Value::Int(a), Value::Int(b)) => match op {
            BinaryOp::Add => a.checked_add(*b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Subtract => a.checked_sub(*b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Multiply => a.checked_mul(*b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Divide if *b == 0 => Err(RuntimeError::DivisionByZero),
            BinaryOp::Divide => a.checked_div(*b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Modulo if *b == 0 => Err(RuntimeError::DivisionByZero),
            BinaryOp::Modulo => a.checked_rem(*b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Less => Ok(Value::Bool(a < b)),
            BinaryOp::Greater => Ok(Value::Bool(a > b)),
            BinaryOp::LessEqual => Ok(Value::Bool(a <= b)),
            BinaryOp::GreaterEqual => Ok(Value::Bool(a >= b)),
            _ => Err(mismatch()),
        },
        (Value::Str(a), Value::Str(b)) => match op {
            BinaryOp::Add => Ok(Value::Str(format!("{}{}", a, b))),
            BinaryOp::Less => Ok(Value::Bool(a < b)),
            BinaryOp::Greater => Ok(Value::Bool(a > b)),
            BinaryOp::LessEqual => Ok(Value::Bool(a <= b)),
            BinaryOp::GreaterEqual => Ok(Value::Bool(a >= b)),
            _ => Err(mismatch()),
        },
        (Value::List(a), Value::List(b)) if op == BinaryOp::Add => {
            let mut items = a.read().clone();
            items.extend(b.read().iter().cloned());
            Ok(Value::list(items))
        }
        _ => {
            let (Some(a), Some(b)) = (as_f64(left), as_f64(right)) else {
                return Err(mismatch());
            };
            match op {
                BinaryOp::Add => Ok(Value::Float(a + b)),
                BinaryOp::Subtract => Ok(Value::Float(a - b)),
                BinaryOp::Multiply => Ok(Value::Float(a * b)),
                BinaryOp::Divide if b == 0.0 => Err(RuntimeError::DivisionByZero),
                BinaryOp::Divide => Ok(Value::Float(a / b)),
                BinaryOp::Modulo if b == 0.0 => Err(RuntimeError::DivisionByZero),
                BinaryOp::Modulo => Ok(Value::Float(a % b)),
                BinaryOp::Less => Ok(Value::Bool(a < b)),
                BinaryOp::Greater => Ok(Value::Bool(a > b)),
                BinaryOp::LessEqual => Ok(Value::Bool(a <= b)),
                BinaryOp::GreaterEqual => Ok(Value::Bool(a >= b)),
                _ => Err(mismatch()),
            }
        }
    }
}
