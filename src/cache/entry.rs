//! Cache entry state and manifests
//!
//! Every finalized slot carries a small JSON manifest written before the
//! slot is renamed into place. A slot without a readable manifest was not
//! produced by a completed install.

use crate::cache::key::{CacheKey, EntryKind};
use crate::error::{RbwasmError, RbwasmResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Manifest file name inside every finalized slot
pub const MANIFEST_FILE: &str = ".rbwasm-entry.json";

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// State of a cache slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Nothing at the slot path
    Absent,
    /// Slot finalized with a valid manifest
    Installed,
    /// Something occupies the slot but it has no valid manifest
    Corrupt,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Installed => write!(f, "installed"),
            Self::Corrupt => write!(f, "corrupt"),
        }
    }
}

/// Manifest persisted inside a finalized slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryManifest {
    pub kind: EntryKind,
    pub name: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
}

impl EntryManifest {
    pub fn for_key(key: &CacheKey) -> Self {
        Self {
            kind: key.kind,
            name: key.name.clone(),
            version: key.version.clone(),
            installed_at: Utc::now(),
        }
    }

    /// Write the manifest into a (staging) slot directory
    pub fn write_to(&self, slot: &Path) -> RbwasmResult<()> {
        let path = slot.join(MANIFEST_FILE);
        let content = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, content)
            .map_err(|e| RbwasmError::io(format!("writing {}", path.display()), e))
    }

    /// Read the manifest of a slot, `None` when it is missing or unreadable
    pub fn read_from(slot: &Path) -> Option<Self> {
        let content = std::fs::read(slot.join(MANIFEST_FILE)).ok()?;
        serde_json::from_slice(&content).ok()
    }
}

/// Information about one slot found in the cache
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Slot directory name
    pub slot: String,
    /// Kind directory the slot lives in
    pub kind: EntryKind,
    /// Absolute slot path
    pub path: PathBuf,
    /// Current state of the slot
    pub state: CacheState,
    /// When the slot was finalized (installed slots only)
    pub installed_at: Option<DateTime<Utc>>,
    /// Total size of regular files in bytes
    pub size_bytes: u64,
}

impl CacheEntry {
    /// Inspect a slot directory
    pub fn inspect(kind: EntryKind, path: &Path) -> Self {
        let manifest = EntryManifest::read_from(path);
        let state = match manifest {
            Some(ref m) if m.kind == kind => CacheState::Installed,
            _ => CacheState::Corrupt,
        };
        Self {
            slot: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            kind,
            path: path.to_path_buf(),
            state,
            installed_at: manifest.map(|m| m.installed_at),
            size_bytes: dir_size(path),
        }
    }
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
