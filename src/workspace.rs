//! Workspace directory layout
//!
//! A workspace is the single on-disk root shared by every pipeline run:
//!
//! | Directory | Contents |
//! |-----------|----------|
//! | `downloads/` | Provisioned toolchain components |
//! | `sources/` | Fetched runtime source trees |
//! | `cache/` | Installed runtime trees keyed by build input |
//! | `build/` | Out-of-tree build directories |
//! | `tmp/` | Staging slots and per-run scratch space |
//!
//! Staging lives next to the final slots so cache commits are same-filesystem
//! renames.

use crate::error::{RbwasmError, RbwasmResult};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Workspace root and its fixed subdirectories
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
    save_temps: bool,
}

impl Workspace {
    /// Open a workspace, creating the directory layout if needed
    pub fn create(dir: impl Into<PathBuf>, save_temps: bool) -> RbwasmResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| RbwasmError::io(format!("creating workspace {}", dir.display()), e))?;
        let dir = dir
            .canonicalize()
            .map_err(|e| RbwasmError::io(format!("resolving workspace {}", dir.display()), e))?;

        let space = Self { dir, save_temps };
        for sub in [
            space.downloads_dir(),
            space.sources_dir(),
            space.cache_dir(),
            space.build_dir(),
            space.temporary_dir(),
        ] {
            std::fs::create_dir_all(&sub)
                .map_err(|e| RbwasmError::io(format!("creating directory {}", sub.display()), e))?;
        }
        debug!("Workspace ready at {}", space.dir.display());
        Ok(space)
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.dir
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.dir.join("downloads")
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.dir.join("sources")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.join("cache")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.dir.join("build")
    }

    pub fn temporary_dir(&self) -> PathBuf {
        self.dir.join("tmp")
    }

    /// Whether generated intermediates survive the run
    pub fn save_temps(&self) -> bool {
        self.save_temps
    }

    /// Create a scratch directory for one pipeline run
    pub fn scratch(&self, prefix: &str) -> RbwasmResult<Scratch> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(self.temporary_dir())
            .map_err(|e| RbwasmError::io("creating scratch directory", e))?;
        if self.save_temps {
            let path = dir.keep();
            debug!("Keeping scratch directory {}", path.display());
            return Ok(Scratch { path, _dir: None });
        }
        Ok(Scratch {
            path: dir.path().to_path_buf(),
            _dir: Some(dir),
        })
    }
}

/// Scratch directory removed on drop unless temps are saved
#[derive(Debug)]
pub struct Scratch {
    path: PathBuf,
    _dir: Option<TempDir>,
}

impl Scratch {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write bytes to a file inside the scratch directory
    pub fn write(&self, name: &str, bytes: &[u8]) -> RbwasmResult<PathBuf> {
        let path = self.path.join(name);
        std::fs::write(&path, bytes)
            .map_err(|e| RbwasmError::io(format!("writing {}", path.display()), e))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_lays_out_directories() {
        let temp = TempDir::new().unwrap();
        let space = Workspace::create(temp.path().join(".rbwasm"), false).unwrap();

        assert!(space.downloads_dir().is_dir());
        assert!(space.sources_dir().is_dir());
        assert!(space.cache_dir().is_dir());
        assert!(space.build_dir().is_dir());
        assert!(space.temporary_dir().is_dir());
        assert!(space.root().is_absolute());
    }

    #[test]
    fn scratch_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let space = Workspace::create(temp.path(), false).unwrap();

        let scratch = space.scratch("run-").unwrap();
        let file = scratch.write("fs.c", b"int x;").unwrap();
        assert!(file.is_file());
        let dir = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!dir.exists());
    }

    #[test]
    fn scratch_kept_with_save_temps() {
        let temp = TempDir::new().unwrap();
        let space = Workspace::create(temp.path(), true).unwrap();

        let scratch = space.scratch("run-").unwrap();
        let dir = scratch.path().to_path_buf();
        drop(scratch);
        assert!(dir.is_dir());
    }
}
