use crate::interpreter::{Interpreter, RuntimeError, Value};
use crate::parser::{ParseError, parse_source};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const SCRIPT_EXTENSION: &str = "svs";

#[derive(Debug)]
pub enum ModuleError {
    NotFound {
        name: String,
        searched: Vec<PathBuf>,
    },
    Io {
        path: PathBuf,
        error: io::Error,
    },
    Parse {
        path: PathBuf,
        error: ParseError,
    },
    Runtime {
        module: String,
        error: RuntimeError,
    },
    Cyclic {
        module: String,
    },
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleError::NotFound { name, searched } => {
                let searched: Vec<String> =
                    searched.iter().map(|p| p.display().to_string()).collect();
                write!(
                    f,
                    "Module '{}' could not be located (searched: {})",
                    name,
                    searched.join(", ")
                )
            }
            ModuleError::Io { path, error } => {
                write!(f, "Failed reading module '{}': {}", path.display(), error)
            }
            ModuleError::Parse { path, error } => {
                write!(
                    f,
                    "Parse error while loading '{}': {}",
                    path.display(),
                    error
                )
            }
            ModuleError::Runtime { module, error } => {
                write!(f, "Executing module '{}' failed: {}", module, error)
            }
            ModuleError::Cyclic { module } => {
                write!(f, "Cyclic module import detected for '{}'", module)
            }
        }
    }
}

impl std::error::Error for ModuleError {}

/// Locates module sources on an ordered search path.
#[derive(Debug, Clone, Default)]
pub struct ModuleLoader {
    script_paths: Vec<PathBuf>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut loader = Self::new();
        for path in paths {
            loader.add_script_path(path);
        }
        loader
    }

    pub fn add_script_path<P: Into<PathBuf>>(&mut self, path: P) {
        let path = path.into();
        if !self.script_paths.contains(&path) {
            self.script_paths.push(path);
        }
    }

    pub fn script_search_paths(&self) -> &[PathBuf] {
        &self.script_paths
    }

    /// Resolves a module identifier to a file. Identifiers without an extension get
    /// `.svs` appended; the first search path containing the file wins.
    pub fn resolve(&self, module: &str) -> Result<PathBuf, ModuleError> {
        let relative = file_name_for(module);
        if relative.is_absolute() && relative.is_file() {
            return Ok(relative);
        }

        let mut searched = Vec::new();
        for root in &self.script_paths {
            let candidate = root.join(&relative);
            if candidate.is_file() {
                debug!(module, path = %candidate.display(), "resolved module");
                return Ok(candidate);
            }
            searched.push(candidate);
        }

        Err(ModuleError::NotFound {
            name: module.to_string(),
            searched,
        })
    }

    pub fn read_source(&self, path: &Path) -> Result<String, ModuleError> {
        fs::read_to_string(path).map_err(|error| ModuleError::Io {
            path: path.to_path_buf(),
            error,
        })
    }
}

fn file_name_for(module: &str) -> PathBuf {
    let path = PathBuf::from(module);
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(SCRIPT_EXTENSION)
    }
}

/// Global bindings of one loaded module.
#[derive(Debug)]
pub struct ModuleScope {
    id: String,
    path: Option<PathBuf>,
    globals: RwLock<HashMap<String, Value>>,
}

impl ModuleScope {
    pub fn new(id: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path,
            globals: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.read().get(name).cloned()
    }

    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.globals.write().insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.globals.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.globals.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Loaded modules of one environment, keyed by module identifier.
///
/// Each module executes once. Loads are serialized on a re-entrant lock so nested
/// imports on the loading thread proceed while other threads wait.
#[derive(Debug)]
pub struct ModuleRegistry {
    loader: ModuleLoader,
    modules: RwLock<HashMap<String, Arc<ModuleScope>>>,
    loading: Mutex<HashSet<String>>,
    load_lock: ReentrantMutex<()>,
}

impl ModuleRegistry {
    pub fn new(loader: ModuleLoader) -> Arc<Self> {
        Arc::new(Self {
            loader,
            modules: RwLock::new(HashMap::new()),
            loading: Mutex::new(HashSet::new()),
            load_lock: ReentrantMutex::new(()),
        })
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn get(&self, module: &str) -> Option<Arc<ModuleScope>> {
        self.modules.read().get(module).cloned()
    }

    pub fn module_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.modules.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the module, loading and executing it on first use.
    pub fn load(self: &Arc<Self>, module: &str) -> Result<Arc<ModuleScope>, ModuleError> {
        if let Some(scope) = self.get(module) {
            return Ok(scope);
        }

        let _guard = self.load_lock.lock();
        if let Some(scope) = self.get(module) {
            return Ok(scope);
        }
        if !self.loading.lock().insert(module.to_string()) {
            return Err(ModuleError::Cyclic {
                module: module.to_string(),
            });
        }

        let result = self.load_uncached(module);
        self.loading.lock().remove(module);
        result
    }

    fn load_uncached(self: &Arc<Self>, module: &str) -> Result<Arc<ModuleScope>, ModuleError> {
        let path = self.loader.resolve(module)?;
        let source = self.loader.read_source(&path)?;
        let program = parse_source(&source).map_err(|error| ModuleError::Parse {
            path: path.clone(),
            error,
        })?;

        let scope = Arc::new(ModuleScope::new(module, Some(path.clone())));
        let mut interpreter = Interpreter::new(self.clone(), scope.clone());
        interpreter
            .execute_program(&program)
            .map_err(|error| ModuleError::Runtime {
                module: module.to_string(),
                error,
            })?;

        self.modules
            .write()
            .insert(module.to_string(), scope.clone());
        info!(module, path = %path.display(), "loaded script module");
        Ok(scope)
    }
}
