//=====================================================
// File: environment/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Per-process SolvraScript runtime for dataflow workers
// Objective: Create the script environment once, run the job's main file, and
//            hand the same environment to every operator in the process
//=====================================================

pub mod deployment;

pub use deployment::{ConfigError, DeploymentMode, EnvironmentConfig};

use crate::interpreter::{Interpreter, ScriptError};
use crate::modules::{ModuleError, ModuleLoader, ModuleRegistry, ModuleScope};
use crate::parser::parse_source;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Error)]
pub enum EnvironmentError {
    #[error("invalid environment configuration: {0}")]
    Config(String),
    #[error("failed to run main file {main_file}: {source}")]
    MainFile {
        main_file: String,
        source: ScriptError,
    },
}

/// Loaded modules and main-file globals of one worker process.
#[derive(Debug)]
pub struct ScriptEnvironment {
    config: EnvironmentConfig,
    registry: Arc<ModuleRegistry>,
    main: Arc<ModuleScope>,
}

impl ScriptEnvironment {
    /// Sets the module search path from the deployment and executes the main file.
    pub fn create(config: &EnvironmentConfig) -> Result<Self, EnvironmentError> {
        config
            .validate()
            .map_err(|error| EnvironmentError::Config(error.to_string()))?;

        let loader = ModuleLoader::with_paths(config.deployment.search_paths());
        let registry = ModuleRegistry::new(loader);
        let main = run_main_file(&registry, &config.main_file).map_err(|source| {
            EnvironmentError::MainFile {
                main_file: config.main_file.clone(),
                source,
            }
        })?;

        info!(
            main_file = %config.main_file,
            path = ?main.path(),
            local = config.deployment.is_local(),
            "script environment created"
        );
        Ok(Self {
            config: config.clone(),
            registry,
            main,
        })
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn main_module(&self) -> &Arc<ModuleScope> {
        &self.main
    }

    /// Globals of module `id`: the main file under its own name, anything else loaded
    /// through the search path on first use.
    pub fn module_scope(&self, id: &str) -> Result<Arc<ModuleScope>, ModuleError> {
        if id == self.main.id() {
            return Ok(self.main.clone());
        }
        self.registry.load(id)
    }

    /// Evaluator bound to `scope` and this environment's modules.
    pub fn interpreter(&self, scope: Arc<ModuleScope>) -> Interpreter {
        Interpreter::new(self.registry.clone(), scope)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.config.properties.get(name).map(String::as_str)
    }
}

fn run_main_file(
    registry: &Arc<ModuleRegistry>,
    main_file: &str,
) -> Result<Arc<ModuleScope>, ScriptError> {
    let path = registry.loader().resolve(main_file)?;
    let source = registry.loader().read_source(&path)?;
    let program = parse_source(&source).map_err(|error| ModuleError::Parse {
        path: path.clone(),
        error,
    })?;

    let scope = Arc::new(ModuleScope::new(main_file, Some(path)));
    let mut interpreter = Interpreter::new(registry.clone(), scope.clone());
    interpreter.execute_program(&program)?;
    Ok(scope)
}

/// Lazily created, never torn down environment slot.
///
/// The first `get_or_create` wins: its configuration is used and its outcome, success
/// or failure, is what every later call sees.
#[derive(Debug, Default)]
pub struct EnvironmentCell {
    cell: OnceCell<Result<Arc<ScriptEnvironment>, EnvironmentError>>,
}

static GLOBAL: EnvironmentCell = EnvironmentCell::new();

impl EnvironmentCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Process-wide cell used by production workers.
    pub fn global() -> &'static EnvironmentCell {
        &GLOBAL
    }

    pub fn get_or_create(
        &self,
        config: &EnvironmentConfig,
    ) -> Result<Arc<ScriptEnvironment>, EnvironmentError> {
        self.cell
            .get_or_init(|| ScriptEnvironment::create(config).map(Arc::new))
            .clone()
    }

    pub fn get(&self) -> Option<Arc<ScriptEnvironment>> {
        match self.cell.get() {
            Some(Ok(env)) => Some(env.clone()),
            _ => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}
