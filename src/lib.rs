//=====================================================
// File: lib.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: SolvraFlow crate root
// Objective: Run SolvraScript functions as map, filter and buffer operators on
//            workers that share nothing with the process that built the job
//=====================================================

pub mod ast;
pub mod environment;
pub mod error;
pub mod flow;
pub mod handle;
pub mod interpreter;
pub mod modules;
pub mod operator;
pub mod parser;
pub mod record;
pub mod scratch;
pub mod tokenizer;
pub mod wire;

pub use environment::{
    ConfigError, DeploymentMode, EnvironmentCell, EnvironmentConfig, EnvironmentError,
    ScriptEnvironment,
};
pub use error::FlowError;
pub use flow::{
    Buffer, BufferCall, Filter, FilterCall, FlowListener, Function, FunctionCall, Operation,
    OutputCollector, TaskContext, VecCollector, run_flow, stop_flow,
};
pub use handle::{
    BindingKind, FunctionHandle, ResolveError, ScriptIntrospector, SourceIntrospector, resolve,
};
pub use interpreter::{Interpreter, RuntimeError, ScriptError, Value};
pub use operator::{
    OperatorConfiguration, OperatorKind, OutputCoercion, OutputMode, OutputShape,
    OutputTypeError, RecordConsumer, RecordProducer,
};
pub use record::{ConversionPolicy, Record, convert_input};
pub use scratch::{ScratchError, ScratchSpace};
pub use wire::{WireError, WireOperator, WireValue};
