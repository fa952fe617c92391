//! Artifact cache for toolchains, sources and installed runtimes
//!
//! Slots are immutable once finalized. An install always happens in a
//! private staging directory under the workspace `tmp/` and is published
//! with a single `rename` into the final slot, so a reader that observes the
//! slot path always sees a complete artifact.
//!
//! # Slot States
//!
//! | State | Slot path | Description |
//! |-------|-----------|-------------|
//! | Absent | missing | Will be installed on the next `ensure` |
//! | Installed | dir + manifest | Finalized, reused without any work |
//! | Corrupt | dir, no manifest | Not produced by rbwasm, needs manual repair |
//!
//! Concurrent runs racing on the same key both install into their own
//! staging directory; the first rename wins and the loser discards its copy.

pub mod entry;
pub mod key;

pub use entry::{format_bytes, CacheEntry, CacheState, EntryManifest, MANIFEST_FILE};
pub use key::{content_hash, CacheKey, EntryKind};

use crate::error::{RbwasmError, RbwasmResult};
use crate::workspace::Workspace;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of [`ArtifactCache::ensure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensured {
    /// Final slot path
    pub path: PathBuf,
    /// Whether the slot already existed and no work was done
    pub cached: bool,
}

/// Content/version addressed store rooted in a workspace
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    workspace: Workspace,
}

impl ArtifactCache {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Final path of a slot, whether or not it exists
    pub fn slot_path(&self, key: &CacheKey) -> PathBuf {
        key.kind.dir(&self.workspace).join(key.slot_name())
    }

    /// Current state of a slot
    pub fn state(&self, key: &CacheKey) -> CacheState {
        let path = self.slot_path(key);
        if !path.exists() {
            return CacheState::Absent;
        }
        match EntryManifest::read_from(&path) {
            Some(m) if m.kind == key.kind && m.version == key.version => CacheState::Installed,
            _ => CacheState::Corrupt,
        }
    }

    /// Return the slot path if it is installed
    pub fn lookup(&self, key: &CacheKey) -> RbwasmResult<Option<PathBuf>> {
        let path = self.slot_path(key);
        match self.state(key) {
            CacheState::Absent => Ok(None),
            CacheState::Installed => Ok(Some(path)),
            CacheState::Corrupt => Err(RbwasmError::CacheCorrupt {
                key: key.to_string(),
                path,
                reason: format!("missing or invalid {}", MANIFEST_FILE),
            }),
        }
    }

    /// Make sure the slot for `key` is installed, running `install` at most
    /// once per call and only when the slot is absent.
    ///
    /// `install` receives an empty staging directory and must populate it
    /// completely. If it fails the staging directory is removed and the
    /// slot stays absent.
    pub async fn ensure<F, Fut>(&self, key: &CacheKey, install: F) -> RbwasmResult<Ensured>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = RbwasmResult<()>>,
    {
        if let Some(path) = self.lookup(key)? {
            debug!("Cache hit: {}", key);
            return Ok(Ensured { path, cached: true });
        }

        info!("Cache miss: {}, installing", key);
        let staging = Staging::create(&self.workspace, key)?;
        install(staging.path().to_path_buf()).await?;
        let path = staging.commit(self, key)?;

        Ok(Ensured {
            path,
            cached: false,
        })
    }

    /// All slots currently present, in kind then name order
    pub fn entries(&self) -> RbwasmResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for kind in EntryKind::all() {
            let dir = kind.dir(&self.workspace);
            if !dir.is_dir() {
                continue;
            }
            let mut slots = Vec::new();
            let read = std::fs::read_dir(&dir)
                .map_err(|e| RbwasmError::io(format!("reading {}", dir.display()), e))?;
            for item in read {
                let item = item.map_err(|e| RbwasmError::io(format!("reading {}", dir.display()), e))?;
                if item.path().is_dir() {
                    slots.push(item.path());
                }
            }
            slots.sort();
            entries.extend(slots.iter().map(|p| CacheEntry::inspect(*kind, p)));
        }
        Ok(entries)
    }
}

/// Private directory an install is written to before publication
struct Staging {
    path: PathBuf,
    committed: bool,
}

impl Staging {
    fn create(workspace: &Workspace, key: &CacheKey) -> RbwasmResult<Self> {
        let path = workspace.temporary_dir().join(format!(
            ".tmp-{}-{}",
            key.slot_name(),
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::create_dir_all(&path)
            .map_err(|e| RbwasmError::provision(key.to_string(), format!("creating {}: {}", path.display(), e)))?;
        debug!("Staging {} in {}", key, path.display());
        Ok(Self {
            path,
            committed: false,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Write the manifest and atomically publish the staging directory
    fn commit(mut self, cache: &ArtifactCache, key: &CacheKey) -> RbwasmResult<PathBuf> {
        let target = cache.slot_path(key);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RbwasmError::provision(key.to_string(), e))?;
        }
        EntryManifest::for_key(key)
            .write_to(&self.path)
            .map_err(|e| RbwasmError::provision(key.to_string(), e))?;

        match std::fs::rename(&self.path, &target) {
            Ok(()) => {
                self.committed = true;
                info!("Installed {} into {}", key, target.display());
                Ok(target)
            }
            Err(e) => {
                // Another run published the same key first.
                if cache.state(key) == CacheState::Installed {
                    warn!("{} was installed concurrently, discarding local copy", key);
                    Ok(target)
                } else {
                    Err(RbwasmError::provision(
                        key.to_string(),
                        format!("rename {} -> {}: {}", self.path.display(), target.display(), e),
                    ))
                }
            }
        }
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("Failed to remove staging dir {}: {}", self.path.display(), e);
            }
        }
    }
}
