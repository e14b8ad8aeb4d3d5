#![allow(dead_code)]

use solvraflow::{EnvironmentCell, EnvironmentConfig, Record, TaskContext, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

pub const MAIN_FILE: &str = "main.svs";

/// Writes `files` into a fresh directory that acts as a local deployment root.
pub fn write_job(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().expect("create job directory");
    write_files(dir.path(), files);
    dir
}

pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (name, source) in files {
        fs::write(root.join(name), source).expect("write script fixture");
    }
}

/// Task context with its own environment cell, as if it ran in a separate worker.
pub fn worker_context(root: &Path) -> TaskContext {
    TaskContext::with_cell(
        Arc::new(EnvironmentCell::new()),
        EnvironmentConfig::local(MAIN_FILE, root),
    )
}

pub fn main_function(context: &TaskContext, name: &str) -> Value {
    context
        .environment()
        .expect("environment")
        .main_module()
        .get(name)
        .unwrap_or_else(|| panic!("{name} is not defined in {MAIN_FILE}"))
}

pub fn record(values: Vec<Value>) -> Record {
    Record::new(values)
}

pub fn strings(values: &[&str]) -> Record {
    Record::new(values.iter().map(|value| Value::from(*value)).collect())
}
