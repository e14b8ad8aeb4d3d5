#[path = "../src/tests/util.rs"]
mod util;

use solvraflow::record::convert_input;
use solvraflow::{
    ConversionPolicy, FlowError, Operation, OperatorConfiguration, OperatorKind, OutputCollector,
    OutputMode, OutputShape, OutputTypeError, Record, RecordConsumer, RecordProducer,
    ScriptIntrospector, TaskContext, Value, VecCollector,
};
use solvraflow::interpreter::Key;
use util::{MAIN_FILE, main_function, record, strings, worker_context, write_job};

const MAIN: &str = r#"
fn shape_shifter(r) {
    if r[0] == "list" {
        return [r[0]];
    }
    return record([r[0]], ["kind"]);
}

fn maybe(r) {
    if r[0] == "skip" {
        return null;
    }
    return [r[0]];
}

fn with_gaps(r) {
    yield [r[0]];
    yield null;
    yield [r[0] + "!"];
}

let seen = [];

fn stepwise(r) {
    push(seen, 1);
    yield [1];
    push(seen, 2);
    yield [2];
}

fn fails_late(r) {
    yield [1];
    yield [1 / 0];
}

fn scalar(r) {
    return 42;
}

fn group_size(group, rows) {
    return [len(group), 0];
}

fn keep_all(r) {
    return true;
}

fn drop_all(r) {
    return false;
}
"#;

fn producer(
    context: &TaskContext,
    name: &str,
    kind: OperatorKind,
    mode: OutputMode,
) -> RecordProducer {
    let config = OperatorConfiguration::new(kind, main_function(context, name))
        .with_conversion(ConversionPolicy::AsNativeList)
        .with_output_mode(mode);
    let mut producer = RecordProducer::from_configuration(&config, &ScriptIntrospector).unwrap();
    producer.prepare(context).unwrap();
    producer
}

#[test]
fn output_shape_locks_on_first_value() {
    let job = write_job(&[(MAIN_FILE, MAIN)]);
    let context = worker_context(job.path());
    let mut producer = producer(&context, "shape_shifter", OperatorKind::Map, OutputMode::Returns);
    let mut out = VecCollector::new();

    producer.operate_record(&strings(&["list"]), &mut out).unwrap();
    producer.operate_record(&strings(&["list"]), &mut out).unwrap();
    assert_eq!(producer.coercion().unwrap().shape(), OutputShape::NativeList);

    let err = producer
        .operate_record(&strings(&["record"]), &mut out)
        .unwrap_err();
    match err {
        FlowError::OutputType(OutputTypeError::Mismatch { type_name, .. }) => {
            assert_eq!(type_name, "record");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(out.records().len(), 2);
}

#[test]
fn record_shape_passes_records_through() {
    let job = write_job(&[(MAIN_FILE, MAIN)]);
    let context = worker_context(job.path());
    let mut producer = producer(&context, "shape_shifter", OperatorKind::Map, OutputMode::AutoDetect);
    let mut out = VecCollector::new();

    producer.operate_record(&strings(&["rec"]), &mut out).unwrap();
    assert_eq!(producer.coercion().unwrap().shape(), OutputShape::NativeRecord);
    assert_eq!(out.records()[0].get_by_name("kind"), Some(&Value::from("rec")));
    assert!(producer.operate_record(&strings(&["list"]), &mut out).is_err());
}

#[test]
fn returning_null_emits_nothing() {
    let job = write_job(&[(MAIN_FILE, MAIN)]);
    let context = worker_context(job.path());
    let mut producer = producer(&context, "maybe", OperatorKind::Map, OutputMode::AutoDetect);
    let mut out = VecCollector::new();

    producer.operate_record(&strings(&["skip"]), &mut out).unwrap();
    assert!(out.records().is_empty());
    assert_eq!(producer.coercion().unwrap().mode(), OutputMode::AutoDetect);

    producer.operate_record(&strings(&["keep"]), &mut out).unwrap();
    assert_eq!(out.records(), &[strings(&["keep"])]);
    assert_eq!(producer.coercion().unwrap().mode(), OutputMode::Returns);
}

#[test]
fn yielded_nulls_are_skipped() {
    let job = write_job(&[(MAIN_FILE, MAIN)]);
    let context = worker_context(job.path());
    let mut producer = producer(&context, "with_gaps", OperatorKind::Map, OutputMode::Yields);
    let mut out = VecCollector::new();

    producer.operate_record(&strings(&["x"]), &mut out).unwrap();
    assert_eq!(out.into_records(), vec![strings(&["x"]), strings(&["x!"])]);
}

/// Records what a script list held each time a record was emitted.
struct SnapshotCollector {
    watched: Value,
    snapshots: Vec<String>,
}

impl OutputCollector for SnapshotCollector {
    fn add(&mut self, _record: Record) {
        self.snapshots.push(self.watched.to_string());
    }
}

#[test]
fn generator_bodies_advance_one_yield_per_record() {
    let job = write_job(&[(MAIN_FILE, MAIN)]);
    let context = worker_context(job.path());
    let mut producer = producer(&context, "stepwise", OperatorKind::Map, OutputMode::AutoDetect);
    let mut out = SnapshotCollector {
        watched: main_function(&context, "seen"),
        snapshots: Vec::new(),
    };

    producer.operate_record(&strings(&["x"]), &mut out).unwrap();
    assert_eq!(out.snapshots, vec!["[1]", "[1, 2]"]);
}

#[test]
fn records_yielded_before_a_failure_are_emitted() {
    let job = write_job(&[(MAIN_FILE, MAIN)]);
    let context = worker_context(job.path());
    let mut producer = producer(&context, "fails_late", OperatorKind::Map, OutputMode::Yields);
    let mut out = VecCollector::new();

    let err = producer.operate_record(&strings(&["x"]), &mut out).unwrap_err();
    assert!(err.to_string().contains("Division by zero"), "{err}");
    assert_eq!(out.into_records(), vec![record(vec![Value::Int(1)])]);
}

#[test]
fn scalar_results_name_their_type() {
    let job = write_job(&[(MAIN_FILE, MAIN)]);
    let context = worker_context(job.path());
    let mut producer = producer(&context, "scalar", OperatorKind::Map, OutputMode::AutoDetect);
    let mut out = VecCollector::new();

    let err = producer.operate_record(&strings(&["x"]), &mut out).unwrap_err();
    assert!(err.to_string().contains("int"), "{err}");
}

#[test]
fn empty_group_makes_no_call() {
    let job = write_job(&[(MAIN_FILE, MAIN)]);
    let context = worker_context(job.path());
    let mut producer = producer(&context, "group_size", OperatorKind::Buffer, OutputMode::AutoDetect);
    let mut out = VecCollector::new();

    producer
        .operate_group(&strings(&["k"]), Box::new(Vec::<Record>::new().into_iter()), &mut out)
        .unwrap();
    assert!(out.records().is_empty());
    assert_eq!(producer.coercion().unwrap().mode(), OutputMode::AutoDetect);
}

#[test]
fn filters_follow_truthiness() {
    let job = write_job(&[(MAIN_FILE, MAIN)]);
    let context = worker_context(job.path());
    let inputs = vec![strings(&["a"]), record(vec![Value::Int(1), Value::Null])];

    for (name, removed) in [("keep_all", false), ("drop_all", true)] {
        let config = OperatorConfiguration::new(OperatorKind::Filter, main_function(&context, name));
        let mut filter = RecordConsumer::from_configuration(&config, &ScriptIntrospector).unwrap();
        filter.prepare(&context).unwrap();
        for input in &inputs {
            assert_eq!(filter.remove_record(input).unwrap(), removed, "{name}");
        }
    }
}

#[test]
fn dict_conversion_keys() {
    let unnamed = record(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let Value::Dict(dict) = convert_input(&unnamed, ConversionPolicy::AsNativeDict) else {
        panic!("expected a dict");
    };
    let keys: Vec<Key> = dict.read().keys().cloned().collect();
    assert_eq!(keys, vec![Key::Int(0), Key::Int(1), Key::Int(2)]);

    let named = Record::with_names(
        vec!["a".to_string(), "b".to_string()],
        vec![Value::Int(1), Value::Int(2)],
    );
    let Value::Dict(dict) = convert_input(&named, ConversionPolicy::AsNativeDict) else {
        panic!("expected a dict");
    };
    let keys: Vec<Key> = dict.read().keys().cloned().collect();
    assert_eq!(keys, vec![Key::from("a"), Key::from("b")]);

    let names: Vec<String> = (0..5000).map(|i| format!("f{i}")).collect();
    let values: Vec<Value> = (0..5000).map(Value::Int).collect();
    let wide = Record::with_names(names[..4000].to_vec(), values);
    let Value::Dict(dict) = convert_input(&wide, ConversionPolicy::AsNativeDict) else {
        panic!("expected a dict");
    };
    let dict = dict.read();
    assert_eq!(dict.len(), 5000);
    assert_eq!(dict.get_str("f3999"), Some(&Value::Int(3999)));
    assert_eq!(dict.get(&Key::Int(4000)), Some(&Value::Int(4000)));
    assert_eq!(dict.keys().nth(4000), Some(&Key::Int(4000)));
}
