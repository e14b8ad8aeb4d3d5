//=====================================================
// File: interpreter/builtins.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: SolvraScript native functions
// Objective: Provide the builtin table, including the decorators that tag user
//            functions with operator attributes
//=====================================================

use super::errors::RuntimeError;
use super::value::{Dict, Key, Partial, Value};
use crate::record::Record;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Script `log(...)` output goes to this tracing target.
pub const SCRIPT_LOG_TARGET: &str = "solvraflow::script";

pub type NativeFn = fn(&[Value], &[(String, Value)]) -> Result<Value, RuntimeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeArity {
    /// The function expects exactly this many arguments.
    Exact(usize),
    /// Inclusive minimum and optional maximum; `None` means no upper bound.
    Range { min: usize, max: Option<usize> },
}

impl NativeArity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            NativeArity::Exact(n) => *n == count,
            NativeArity::Range { min, max } => {
                if count < *min {
                    return false;
                }
                match max {
                    Some(max) => count <= *max,
                    None => true,
                }
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            NativeArity::Exact(n) => format!("{}", n),
            NativeArity::Range { min, max } => match max {
                Some(max) if min == max => format!("{}", min),
                Some(max) => format!("{}..={} arguments", min, max),
                None => {
                    if *min == 0 {
                        "any number of arguments".to_string()
                    } else {
                        format!("at least {} arguments", min)
                    }
                }
            },
        }
    }
}

#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: NativeArity,
    pub accepts_named: bool,
    func: NativeFn,
}

impl Builtin {
    pub fn call(
        &'static self,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Result<Value, RuntimeError> {
        if !self.arity.accepts(args.len()) {
            return Err(RuntimeError::ArgumentError(format!(
                "{}() expects {}, got {}",
                self.name,
                self.arity.describe(),
                args.len()
            )));
        }
        if !self.accepts_named && !kwargs.is_empty() {
            return Err(RuntimeError::ArgumentError(format!(
                "{}() does not take named arguments",
                self.name
            )));
        }
        (self.func)(args, kwargs)
    }
}

static BUILTINS: Lazy<HashMap<&'static str, Builtin>> = Lazy::new(|| {
    let mut table = HashMap::new();
    let mut register = |name: &'static str, arity: NativeArity, func: NativeFn| {
        table.insert(
            name,
            Builtin {
                name,
                arity,
                accepts_named: false,
                func,
            },
        );
    };

    register("len", NativeArity::Exact(1), builtin_len);
    register("str", NativeArity::Exact(1), |args, _| {
        Ok(Value::Str(args[0].to_string()))
    });
    register("int", NativeArity::Exact(1), builtin_int);
    register("float", NativeArity::Exact(1), builtin_float);
    register("type", NativeArity::Exact(1), |args, _| {
        Ok(Value::Str(args[0].type_name()))
    });
    register("push", NativeArity::Exact(2), builtin_push);
    register("keys", NativeArity::Exact(1), builtin_keys);
    register("values", NativeArity::Exact(1), builtin_values);
    register(
        "range",
        NativeArity::Range {
            min: 1,
            max: Some(2),
        },
        builtin_range,
    );
    register(
        "record",
        NativeArity::Range {
            min: 1,
            max: Some(2),
        },
        builtin_record,
    );
    register("fields", NativeArity::Exact(1), builtin_fields);
    register(
        "split",
        NativeArity::Range {
            min: 1,
            max: Some(2),
        },
        builtin_split,
    );
    register("lower", NativeArity::Exact(1), |args, _| {
        Ok(Value::Str(expect_str(&args[0], "lower")?.to_lowercase()))
    });
    register("upper", NativeArity::Exact(1), |args, _| {
        Ok(Value::Str(expect_str(&args[0], "upper")?.to_uppercase()))
    });
    register("strip", NativeArity::Exact(1), |args, _| {
        Ok(Value::Str(expect_str(&args[0], "strip")?.trim().to_string()))
    });
    register(
        "join",
        NativeArity::Range {
            min: 1,
            max: Some(2),
        },
        builtin_join,
    );
    register("contains", NativeArity::Exact(2), builtin_contains);
    register(
        "log",
        NativeArity::Range { min: 0, max: None },
        builtin_log,
    );

    let decorator = NativeArity::Range {
        min: 0,
        max: Some(1),
    };
    for (name, func) in [
        ("udf", decorator_udf as NativeFn),
        ("udf_map", decorator_udf_map),
        ("udf_filter", decorator_udf_filter),
        ("udf_buffer", decorator_udf_buffer),
        ("yields", decorator_yields),
        ("collects_output", decorator_collects_output),
        ("list_expected", decorator_list_expected),
        ("dict_expected", decorator_dict_expected),
        ("produces_list", decorator_produces_list),
        ("produces_records", decorator_produces_records),
    ] {
        table.insert(
            name,
            Builtin {
                name,
                arity: decorator,
                accepts_named: true,
                func,
            },
        );
    }
    table.insert(
        "numargs_expected",
        Builtin {
            name: "numargs_expected",
            arity: NativeArity::Range {
                min: 1,
                max: Some(2),
            },
            accepts_named: true,
            func: decorator_numargs_expected,
        },
    );
    table.insert(
        "with_args",
        Builtin {
            name: "with_args",
            arity: NativeArity::Range { min: 1, max: None },
            accepts_named: true,
            func: builtin_with_args,
        },
    );

    table
});

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.get(name)
}

fn expect_str<'a>(value: &'a Value, context: &str) -> Result<&'a str, RuntimeError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(RuntimeError::TypeError(format!(
            "{}() expects a string, got {}",
            context,
            other.type_name()
        ))),
    }
}

fn expect_int(value: &Value, context: &str) -> Result<i64, RuntimeError> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(RuntimeError::TypeError(format!(
            "{}() expects an int, got {}",
            context,
            other.type_name()
        ))),
    }
}

/// Elements of anything iterable by value: lists, records, dict keys, string characters.
pub fn iterable_items(value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::List(items) => Ok(items.read().clone()),
        Value::Record(record) => Ok(record.values().to_vec()),
        Value::Dict(dict) => Ok(dict.read().keys().map(Key::to_value).collect()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        other => Err(RuntimeError::TypeError(format!(
            "'{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn builtin_len(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.read().len(),
        Value::Dict(dict) => dict.read().len(),
        Value::Record(record) => record.len(),
        other => {
            return Err(RuntimeError::TypeError(format!(
                "len() not supported for {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(len as i64))
}

fn builtin_int(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| RuntimeError::ArgumentError(format!("invalid int literal: {:?}", s))),
        other => Err(RuntimeError::TypeError(format!(
            "int() not supported for {}",
            other.type_name()
        ))),
    }
}

fn builtin_float(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| RuntimeError::ArgumentError(format!("invalid float literal: {:?}", s))),
        other => Err(RuntimeError::TypeError(format!(
            "float() not supported for {}",
            other.type_name()
        ))),
    }
}

fn builtin_push(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::List(items) => {
            items.write().push(args[1].clone());
            Ok(Value::Null)
        }
        other => Err(RuntimeError::TypeError(format!(
            "push() expects a list, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_keys(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Dict(dict) => Ok(Value::list(
            dict.read().keys().map(Key::to_value).collect(),
        )),
        Value::Record(record) => Ok(Value::list(
            record.names().iter().cloned().map(Value::Str).collect(),
        )),
        other => Err(RuntimeError::TypeError(format!(
            "keys() expects a dict, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_values(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Dict(dict) => Ok(Value::list(dict.read().values().cloned().collect())),
        Value::Record(record) => Ok(Value::list(record.values().to_vec())),
        other => Err(RuntimeError::TypeError(format!(
            "values() expects a dict, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_range(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    let (start, end) = match args {
        [end] => (0, expect_int(end, "range")?),
        [start, end] => (expect_int(start, "range")?, expect_int(end, "range")?),
        _ => unreachable!("arity checked by Builtin::call"),
    };
    Ok(Value::list((start..end).map(Value::Int).collect()))
}

fn builtin_record(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    let values = iterable_items(&args[0])?;
    let names = match args.get(1) {
        None => Vec::new(),
        Some(names) => iterable_items(names)?
            .into_iter()
            .map(|name| expect_str(&name, "record").map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(Value::Record(Record::with_names(names, values)))
}

fn builtin_fields(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Record(record) => Ok(Value::list(
            record.names().iter().cloned().map(Value::Str).collect(),
        )),
        other => Err(RuntimeError::TypeError(format!(
            "fields() expects a record, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_split(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    let text = expect_str(&args[0], "split")?;
    let parts: Vec<Value> = match args.get(1) {
        Some(sep) => {
            let sep = expect_str(sep, "split")?;
            if sep.is_empty() {
                return Err(RuntimeError::ArgumentError(
                    "split() separator must not be empty".to_string(),
                ));
            }
            text.split(sep).map(Value::from).collect()
        }
        None => text.split_whitespace().map(Value::from).collect(),
    };
    Ok(Value::list(parts))
}

fn builtin_join(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    let sep = match args.get(1) {
        Some(sep) => expect_str(sep, "join")?,
        None => "",
    };
    let parts: Vec<String> = iterable_items(&args[0])?
        .iter()
        .map(Value::to_string)
        .collect();
    Ok(Value::Str(parts.join(sep)))
}

fn builtin_contains(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    let needle = &args[1];
    let found = match &args[0] {
        Value::Str(haystack) => haystack.contains(expect_str(needle, "contains")?),
        Value::List(items) => items.read().iter().any(|item| item == needle),
        Value::Record(record) => record.values().iter().any(|item| item == needle),
        Value::Dict(dict) => dict.read().contains(&Key::from_value(needle)?),
        other => {
            return Err(RuntimeError::TypeError(format!(
                "contains() not supported for {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::Bool(found))
}

fn builtin_log(args: &[Value], _: &[(String, Value)]) -> Result<Value, RuntimeError> {
    let message: Vec<String> = args.iter().map(Value::to_string).collect();
    info!(target: SCRIPT_LOG_TARGET, "{}", message.join(" "));
    Ok(Value::Null)
}

//=============================================
//            Decorators
//=============================================

pub const ATTR_FUNCTION: &str = "function";
pub const ATTR_TYPE: &str = "type";
pub const ATTR_INPUT_CONVERSION: &str = "input_conversion";
pub const ATTR_OUTPUT_METHOD: &str = "output_method";
pub const ATTR_OUTPUT_TYPE: &str = "output_type";
pub const ATTR_NUMARGS: &str = "numargs_expected";
pub const ATTR_PRODUCES: &str = "produces";
pub const ATTR_ARGS: &str = "args";
pub const ATTR_KWARGS: &str = "kwargs";

/// Adds `attributes` to a decorated value, wrapping a bare function first.
///
/// Stacked decorators update the same `decorators` mapping in place.
pub fn decorate(target: &Value, attributes: Vec<(String, Value)>) -> Value {
    if let Some(inner) = target.decorators() {
        let mut inner = inner.write();
        for (name, value) in attributes {
            inner.insert(Key::Str(name), value);
        }
        return target.clone();
    }

    let mut inner: Dict = [
        (ATTR_FUNCTION, target.clone()),
        (ATTR_TYPE, Value::from("auto")),
        (ATTR_INPUT_CONVERSION, Value::from("none")),
        (ATTR_OUTPUT_METHOD, Value::from("auto")),
        (ATTR_OUTPUT_TYPE, Value::from("auto")),
        (ATTR_ARGS, Value::Null),
        (ATTR_KWARGS, Value::Null),
    ]
    .into_iter()
    .map(|(name, value)| (Key::from(name), value))
    .collect();
    for (name, value) in attributes {
        inner.insert(Key::Str(name), value);
    }

    let mut outer = Dict::new();
    outer.insert(Key::from("decorators"), Value::dict(inner));
    Value::dict(outer)
}

/// Shared shape of every decorator builtin: applied directly to a function, or called
/// with only named arguments to produce a partial that is applied later.
fn apply_decorator(
    name: &'static str,
    args: &[Value],
    kwargs: &[(String, Value)],
    attribute: (&str, Value),
) -> Result<Value, RuntimeError> {
    match args {
        [] => {
            let builtin = lookup(name).ok_or_else(|| RuntimeError::VariableNotFound(name.into()))?;
            Ok(Value::Partial(Arc::new(Partial {
                builtin,
                args: Vec::new(),
                kwargs: kwargs.to_vec(),
            })))
        }
        [target] if target.is_callable() => {
            let mut attributes = vec![(attribute.0.to_string(), attribute.1)];
            attributes.extend(kwargs.iter().cloned());
            Ok(decorate(target, attributes))
        }
        [other] => Err(RuntimeError::TypeError(format!(
            "@{} can only decorate a function, got {}",
            name,
            other.type_name()
        ))),
        _ => Err(RuntimeError::ArgumentError(format!(
            "@{} takes a single function",
            name
        ))),
    }
}

fn decorator_udf(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, RuntimeError> {
    apply_decorator("udf", args, kwargs, (ATTR_TYPE, Value::from("auto")))
}

fn decorator_udf_map(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, RuntimeError> {
    apply_decorator("udf_map", args, kwargs, (ATTR_TYPE, Value::from("map")))
}

fn decorator_udf_filter(
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<Value, RuntimeError> {
    apply_decorator("udf_filter", args, kwargs, (ATTR_TYPE, Value::from("filter")))
}

fn decorator_udf_buffer(
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<Value, RuntimeError> {
    apply_decorator("udf_buffer", args, kwargs, (ATTR_TYPE, Value::from("buffer")))
}

fn decorator_yields(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, RuntimeError> {
    apply_decorator(
        "yields",
        args,
        kwargs,
        (ATTR_OUTPUT_METHOD, Value::from("yields")),
    )
}

fn decorator_collects_output(
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<Value, RuntimeError> {
    apply_decorator(
        "collects_output",
        args,
        kwargs,
        (ATTR_OUTPUT_METHOD, Value::from("collects")),
    )
}

fn decorator_list_expected(
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<Value, RuntimeError> {
    apply_decorator(
        "list_expected",
        args,
        kwargs,
        (ATTR_INPUT_CONVERSION, Value::from("list")),
    )
}

fn decorator_dict_expected(
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<Value, RuntimeError> {
    apply_decorator(
        "dict_expected",
        args,
        kwargs,
        (ATTR_INPUT_CONVERSION, Value::from("dict")),
    )
}

fn decorator_produces_list(
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<Value, RuntimeError> {
    apply_decorator(
        "produces_list",
        args,
        kwargs,
        (ATTR_OUTPUT_TYPE, Value::from("list")),
    )
}

fn decorator_produces_records(
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<Value, RuntimeError> {
    apply_decorator(
        "produces_records",
        args,
        kwargs,
        (ATTR_OUTPUT_TYPE, Value::from("records")),
    )
}

fn decorator_numargs_expected(
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<Value, RuntimeError> {
    let count = expect_int(&args[0], "numargs_expected")?;
    if count < 0 {
        return Err(RuntimeError::ArgumentError(
            "numargs_expected() needs a non-negative count".to_string(),
        ));
    }
    apply_decorator(
        "numargs_expected",
        &args[1..],
        kwargs,
        (ATTR_NUMARGS, Value::Int(count)),
    )
    .map(|value| match value {
        // A partial must remember the count it was created with.
        Value::Partial(partial) => Value::Partial(Arc::new(Partial {
            builtin: partial.builtin,
            args: vec![Value::Int(count)],
            kwargs: partial.kwargs.clone(),
        })),
        other => other,
    })
}

/// `with_args(f, a, b, key = v)`: context arguments passed after the per-call ones.
fn builtin_with_args(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, RuntimeError> {
    let target = &args[0];
    if !target.is_callable() {
        return Err(RuntimeError::TypeError(format!(
            "with_args() expects a function, got {}",
            target.type_name()
        )));
    }

    let mut attributes = Vec::new();
    if args.len() > 1 {
        attributes.push((ATTR_ARGS.to_string(), Value::list(args[1..].to_vec())));
    }
    if !kwargs.is_empty() {
        let named: Dict = kwargs
            .iter()
            .map(|(name, value)| (Key::Str(name.clone()), value.clone()))
            .collect();
        attributes.push((ATTR_KWARGS.to_string(), Value::dict(named)));
    }
    Ok(decorate(target, attributes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        lookup(name).unwrap().call(args, &[])
    }

    fn attribute(decorated: &Value, name: &str) -> Value {
        decorated
            .decorators()
            .unwrap()
            .read()
            .get_str(name)
            .cloned()
            .unwrap()
    }

    fn some_function() -> Value {
        Value::Builtin(lookup("len").unwrap())
    }

    #[test]
    fn arity_is_checked() {
        let err = call("len", &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::ArgumentError(_)));
        assert_eq!(
            NativeArity::Range { min: 1, max: None }.describe(),
            "at least 1 arguments"
        );
    }

    #[test]
    fn string_helpers() {
        let parts = call("split", &[Value::from("a b  c")]).unwrap();
        assert_eq!(parts.to_string(), "[\"a\", \"b\", \"c\"]");
        let joined = call("join", &[parts, Value::from("-")]).unwrap();
        assert_eq!(joined, Value::from("a-b-c"));
        assert_eq!(
            call("upper", &[Value::from("ab")]).unwrap(),
            Value::from("AB")
        );
        assert_eq!(
            call("contains", &[Value::from("hello"), Value::from("ell")]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn record_builtin_builds_named_records() {
        let values = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let names = Value::list(vec![Value::from("a"), Value::from("b")]);
        let record = call("record", &[values, names]).unwrap();
        let fields = call("fields", &[record.clone()]).unwrap();
        assert_eq!(fields.to_string(), "[\"a\", \"b\"]");
        assert_eq!(call("len", &[record]).unwrap(), Value::Int(2));
    }

    #[test]
    fn stacked_decorators_share_one_mapping() {
        let mapped = call("udf_map", &[some_function()]).unwrap();
        let both = call("yields", &[mapped.clone()]).unwrap();
        assert_eq!(both, mapped);
        assert_eq!(attribute(&both, ATTR_TYPE), Value::from("map"));
        assert_eq!(attribute(&both, ATTR_OUTPUT_METHOD), Value::from("yields"));
        assert_eq!(attribute(&both, ATTR_INPUT_CONVERSION), Value::from("none"));
        assert_eq!(both.undecorated(), Some(some_function()));
    }

    #[test]
    fn numargs_expected_returns_partial_without_function() {
        let partial = call("numargs_expected", &[Value::Int(2)]).unwrap();
        let Value::Partial(partial) = partial else {
            panic!("expected a partial");
        };
        let mut args = partial.args.clone();
        args.push(some_function());
        let decorated = partial.builtin.call(&args, &partial.kwargs).unwrap();
        assert_eq!(attribute(&decorated, ATTR_NUMARGS), Value::Int(2));
    }

    #[test]
    fn named_decorator_arguments_become_attributes() {
        let partial = lookup("udf_map")
            .unwrap()
            .call(&[], &[("produces".to_string(), Value::from("word"))])
            .unwrap();
        let Value::Partial(partial) = partial else {
            panic!("expected a partial");
        };
        let decorated = partial
            .builtin
            .call(&[some_function()], &partial.kwargs)
            .unwrap();
        assert_eq!(attribute(&decorated, ATTR_PRODUCES), Value::from("word"));
    }

    #[test]
    fn with_args_stores_context_arguments() {
        let decorated = lookup("with_args")
            .unwrap()
            .call(
                &[some_function(), Value::Int(5)],
                &[("scale".to_string(), Value::Int(2))],
            )
            .unwrap();
        assert_eq!(attribute(&decorated, ATTR_ARGS).to_string(), "[5]");
        assert_eq!(attribute(&decorated, ATTR_KWARGS).to_string(), "{\"scale\": 2}");
    }

    #[test]
    fn decorating_a_non_function_fails() {
        assert!(call("udf_filter", &[Value::Int(3)]).is_err());
    }
}
