#[path = "../src/tests/util.rs"]
mod util;

use solvraflow::{
    BindingKind, ConversionPolicy, FunctionHandle, Operation, OperatorConfiguration,
    OperatorKind, OutputMode, Record, RecordProducer, ScriptIntrospector, SourceIntrospector,
    Value, VecCollector, WireValue, resolve, wire,
};
use std::path::Path;
use std::sync::Arc;
use util::{MAIN_FILE, main_function, strings, worker_context, write_files, write_job};

const MAIN: &str = r#"
import text;

let greeting = "hello";

fn greet(r) {
    return [greeting + " " + r[0], text.shout(r[0])];
}

fn make_tagger() {
    fn tagger(r) {
        return [r[0], len(r[0])];
    }
    return tagger;
}

let tag = make_tagger();

let shout = text.shout;

fn whisper(s) {
    return lower(s) + "...";
}

fn combine(r, left, right = null) {
    return [left(r[0]), right(r[0])];
}
"#;

const TEXT: &str = r#"
fn shout(s) {
    return upper(s) + "!";
}
"#;

fn run(payload: &[u8], root: &Path, input: &[&str]) -> Vec<Record> {
    let context = worker_context(root);
    let mut producer = RecordProducer::new(payload.to_vec());
    producer.prepare(&context).unwrap();
    let mut out = VecCollector::new();
    for line in input.iter().copied() {
        producer.operate_record(&strings(&[line]), &mut out).unwrap();
    }
    out.into_records()
}

#[test]
fn independent_environments_resolve_identical_callables() {
    let job = write_job(&[(MAIN_FILE, MAIN), ("text.svs", TEXT)]);
    let first = worker_context(job.path()).environment().unwrap();
    let second = worker_context(job.path()).environment().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    let handle = FunctionHandle::global(MAIN_FILE, "greet");
    let input = vec![Value::list(vec![Value::from("ada")])];
    let outputs: Vec<Value> = [&first, &second]
        .iter()
        .map(|env| {
            let function = resolve(&handle, env).unwrap();
            env.interpreter(env.main_module().clone())
                .call_value(&function, input.clone(), Vec::new())
                .unwrap()
        })
        .collect();
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(
        outputs[0],
        Value::list(vec![Value::from("hello ada"), Value::from("ADA!")])
    );
}

#[test]
fn shipped_operator_matches_local_result() {
    let job = write_job(&[(MAIN_FILE, MAIN), ("text.svs", TEXT)]);
    let builder = worker_context(job.path());
    let config = OperatorConfiguration::new(OperatorKind::Map, main_function(&builder, "greet"))
        .with_conversion(ConversionPolicy::AsNativeList)
        .with_output_mode(OutputMode::Returns);
    let payload = config.encode(&ScriptIntrospector).unwrap();

    let local = run(&payload, job.path(), &["ada", "grace"]);

    let worker_root = tempfile::tempdir().unwrap();
    write_files(worker_root.path(), &[(MAIN_FILE, MAIN), ("text.svs", TEXT)]);
    let shipped = run(&payload, worker_root.path(), &["ada", "grace"]);

    assert_eq!(local, shipped);
    assert_eq!(local[1], strings(&["hello grace", "GRACE!"]));
}

#[test]
fn nested_functions_ship_as_closures() {
    let job = write_job(&[(MAIN_FILE, MAIN), ("text.svs", TEXT)]);
    let builder = worker_context(job.path());
    let tagger = main_function(&builder, "tag");

    let handle = ScriptIntrospector.handle_for(&tagger).unwrap();
    assert_eq!(handle.binding_kind, BindingKind::Closure);
    assert_eq!(handle.defining_source, MAIN_FILE);

    let config = OperatorConfiguration::new(OperatorKind::Map, tagger)
        .with_conversion(ConversionPolicy::AsNativeList);
    let payload = config.encode(&ScriptIntrospector).unwrap();
    let records = run(&payload, job.path(), &["abc"]);
    assert_eq!(records, vec![Record::new(vec![Value::from("abc"), Value::Int(3)])]);
}

#[test]
fn missing_function_on_worker_fails_prepare() {
    let job = write_job(&[(MAIN_FILE, MAIN), ("text.svs", TEXT)]);
    let builder = worker_context(job.path());
    let config = OperatorConfiguration::new(OperatorKind::Map, main_function(&builder, "greet"));
    let payload = config.encode(&ScriptIntrospector).unwrap();

    let other = write_job(&[(MAIN_FILE, "let unrelated = 1;")]);
    let mut producer = RecordProducer::new(payload);
    let err = producer.prepare(&worker_context(other.path())).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("greet"), "{message}");
    assert!(message.contains(MAIN_FILE), "{message}");
    assert!(!producer.is_prepared());
}

#[test]
fn function_arguments_ship_with_the_operator() {
    let job = write_job(&[(MAIN_FILE, MAIN), ("text.svs", TEXT)]);
    let builder = worker_context(job.path());
    let mut config =
        OperatorConfiguration::new(OperatorKind::Map, main_function(&builder, "combine"))
            .with_conversion(ConversionPolicy::AsNativeList);
    config.set_extra_positional(vec![main_function(&builder, "shout")]);
    config.set_extra_named(vec![("right".to_string(), main_function(&builder, "whisper"))]);

    let operator = config.to_wire(&ScriptIntrospector).unwrap();
    let payload = wire::encode(&operator).unwrap();
    let decoded = wire::decode(&payload).unwrap();

    let Some([WireValue::Function(left)]) = decoded.extra_positional.as_deref() else {
        panic!("expected one shipped function, got {:?}", decoded.extra_positional);
    };
    assert_eq!(left, &FunctionHandle::global("text", "shout"));
    let Some([(name, WireValue::Function(right))]) = decoded.extra_named.as_deref() else {
        panic!("expected one shipped named function, got {:?}", decoded.extra_named);
    };
    assert_eq!(name, "right");
    assert_eq!(right, &FunctionHandle::global(MAIN_FILE, "whisper"));

    let worker_root = tempfile::tempdir().unwrap();
    write_files(worker_root.path(), &[(MAIN_FILE, MAIN), ("text.svs", TEXT)]);
    let env = worker_context(worker_root.path()).environment().unwrap();
    let shout = resolve(left, &env).unwrap();
    let called = env
        .interpreter(env.main_module().clone())
        .call_value(&shout, vec![Value::from("ab")], Vec::new())
        .unwrap();
    assert_eq!(called, Value::from("AB!"));

    let records = run(&payload, worker_root.path(), &["Ada"]);
    assert_eq!(records, vec![strings(&["ADA!", "ada..."])]);
}
