//=====================================================
// File: environment/deployment.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Job deployment configuration
// Objective: Read the main file, deployment mode and job properties from TOML
//            and derive the module search path
//=====================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid environment config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("main file name is empty")]
    EmptyMainFile,
    #[error("distributed deployment lists no archives")]
    NoArchives,
}

/// Where worker processes find the job's script sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Sources read straight from a filesystem root.
    Local { root: PathBuf },
    /// Sources unpacked from archives; earlier archives shadow later ones.
    Distributed { archives: Vec<PathBuf> },
}

impl DeploymentMode {
    pub fn search_paths(&self) -> Vec<PathBuf> {
        match self {
            DeploymentMode::Local { root } => vec![root.clone()],
            DeploymentMode::Distributed { archives } => archives.clone(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, DeploymentMode::Local { .. })
    }
}

/// Everything a worker needs to bring up its script environment.
///
/// ```toml
/// main_file = "main.svs"
///
/// [deployment]
/// mode = "distributed"
/// archives = ["/tmp/job/sources"]
///
/// [properties]
/// "job.name" = "wordcount"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub main_file: String,
    pub deployment: DeploymentMode,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl EnvironmentConfig {
    pub fn local(main_file: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            main_file: main_file.into(),
            deployment: DeploymentMode::Local { root: root.into() },
            properties: BTreeMap::new(),
        }
    }

    pub fn distributed<I, P>(main_file: impl Into<String>, archives: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            main_file: main_file.into(),
            deployment: DeploymentMode::Distributed {
                archives: archives.into_iter().map(Into::into).collect(),
            },
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EnvironmentConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main_file.trim().is_empty() {
            return Err(ConfigError::EmptyMainFile);
        }
        if let DeploymentMode::Distributed { archives } = &self.deployment {
            if archives.is_empty() {
                return Err(ConfigError::NoArchives);
            }
        }
        Ok(())
    }
}
