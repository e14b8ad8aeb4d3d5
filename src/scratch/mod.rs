//=====================================================
// File: scratch/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Temporary staging area for job sources
// Objective: Copy local files into a uniquely named directory for distribution
//            and remove it once when the flow stops, completes or fails
//=====================================================

use crate::error::FlowError;
use crate::flow::FlowListener;
use parking_lot::Mutex;
use rand::Rng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use thiserror::Error;
use tracing::{debug, warn};

pub const SCRATCH_PREFIX: &str = "solvraflow-";
const NAME_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum ScratchError {
    #[error("failed to create scratch directory under {base}: {source}")]
    Create {
        base: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy {path} into scratch directory: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("scratch directory already released")]
    Released,
}

fn random_name() -> String {
    let mut rng = rand::thread_rng();
    (0..NAME_LEN)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect()
}

/// Scratch directory whose contents ship with a job.
#[derive(Debug)]
pub struct ScratchSpace {
    path: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

impl ScratchSpace {
    pub fn create_in(base: &Path) -> Result<Self, ScratchError> {
        let dir = Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(base)
            .map_err(|source| ScratchError::Create {
                base: base.to_path_buf(),
                source,
            })?;
        debug!(path = %dir.path().display(), "scratch directory created");
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Mutex::new(Some(dir)),
        })
    }

    pub fn create() -> Result<Self, ScratchError> {
        Self::create_in(&std::env::temp_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.dir.lock().is_none()
    }

    /// Copies `source` in under a random lowercase name that keeps its extension and
    /// returns the new path.
    pub fn copy_from_local(&self, source: &Path) -> Result<PathBuf, ScratchError> {
        let guard = self.dir.lock();
        let Some(dir) = guard.as_ref() else {
            return Err(ScratchError::Released);
        };

        let mut name = random_name();
        if let Some(extension) = source.extension() {
            name.push('.');
            name.push_str(&extension.to_string_lossy());
        }
        let dest = dir.path().join(name);
        fs::copy(source, &dest).map_err(|error| ScratchError::Copy {
            path: source.to_path_buf(),
            source: error,
        })?;
        Ok(dest)
    }

    /// Removes the directory. Only the first call does anything; failures are logged.
    pub fn release(&self) {
        let Some(dir) = self.dir.lock().take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!(path = %path.display(), "scratch directory released"),
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to remove scratch directory")
            }
        }
    }
}

impl FlowListener for ScratchSpace {
    fn on_stopping(&self) {
        self.release();
    }

    fn on_completed(&self) {
        self.release();
    }

    fn on_throwable(&self, _error: &FlowError) -> bool {
        self.release();
        false
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn random_names_are_lowercase() {
        let name = random_name();
        assert_eq!(name.len(), NAME_LEN);
        assert!(name.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn copies_keep_extension() {
        let base = tempdir().unwrap();
        let source = base.path().join("job.svs");
        fs::write(&source, "let x = 1;").unwrap();

        let scratch = ScratchSpace::create_in(base.path()).unwrap();
        let name = scratch.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(SCRATCH_PREFIX));

        let copied = scratch.copy_from_local(&source).unwrap();
        assert_eq!(copied.extension().unwrap(), "svs");
        assert_eq!(copied.file_stem().unwrap().len(), NAME_LEN);
        assert_eq!(fs::read_to_string(&copied).unwrap(), "let x = 1;");

        let bare = base.path().join("LICENSE");
        fs::write(&bare, "dpl").unwrap();
        assert!(scratch.copy_from_local(&bare).unwrap().extension().is_none());
    }

    #[test]
    fn release_happens_once() {
        let base = tempdir().unwrap();
        let scratch = ScratchSpace::create_in(base.path()).unwrap();
        let path = scratch.path().to_path_buf();

        scratch.on_completed();
        assert!(!path.exists());
        assert!(scratch.is_released());
        scratch.on_stopping();
        assert!(matches!(
            scratch.copy_from_local(&base.path().join("x")),
            Err(ScratchError::Released)
        ));
    }

    #[test]
    fn drop_releases() {
        let base = tempdir().unwrap();
        let path = {
            let scratch = ScratchSpace::create_in(base.path()).unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
