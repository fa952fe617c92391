//! Cache keys and content hashing
//!
//! A key names one immutable slot in the artifact cache. Toolchain keys are
//! addressed by version, source and install keys by a hash of what produced
//! them. Same input = same slot.

use crate::error::RbwasmResult;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// What kind of artifact a cache slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Unpacked toolchain release (compiler, rewriter, support library)
    Toolchain,
    /// Fetched runtime source tree
    Source,
    /// Installed runtime tree produced by a cross-build
    Install,
}

impl EntryKind {
    /// Directory holding slots of this kind
    pub fn dir(&self, workspace: &Workspace) -> PathBuf {
        match self {
            Self::Toolchain => workspace.downloads_dir(),
            Self::Source => workspace.sources_dir(),
            Self::Install => workspace.cache_dir(),
        }
    }

    /// All kinds in listing order
    pub fn all() -> &'static [Self] {
        &[Self::Toolchain, Self::Source, Self::Install]
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Toolchain => "toolchain",
            Self::Source => "source",
            Self::Install => "install",
        };
        write!(f, "{}", name)
    }
}

/// Stable identifier of a cache slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: EntryKind,
    pub name: String,
    pub version: String,
}

impl CacheKey {
    /// Key for a versioned toolchain component
    pub fn toolchain(name: &str, version: &str) -> Self {
        Self {
            kind: EntryKind::Toolchain,
            name: sanitize(name),
            version: sanitize(version),
        }
    }

    /// Key for a fetched source tree, addressed by its locator
    pub fn source(name: &str, locator: &str) -> Self {
        Self {
            kind: EntryKind::Source,
            name: sanitize(name),
            version: content_hash(locator.as_bytes()),
        }
    }

    /// Key for an install tree, addressed by the serialized build input
    pub fn install<T: Serialize>(name: &str, input: &T) -> RbwasmResult<Self> {
        let bytes = serde_json::to_vec(input)?;
        Ok(Self {
            kind: EntryKind::Install,
            name: sanitize(name),
            version: content_hash(&bytes),
        })
    }

    /// Directory name of the slot
    pub fn slot_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.slot_name())
    }
}

/// SHA-256 of the input, first 16 hex chars
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();

    // Take first 16 hex characters (8 bytes)
    hex::encode(&result[..8])
}

/// Keep slot names to a single portable path component
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display() {
        assert_eq!(EntryKind::Toolchain.to_string(), "toolchain");
        assert_eq!(EntryKind::Install.to_string(), "install");
    }

    #[test]
    fn toolchain_slot_name() {
        let key = CacheKey::toolchain("wasi-sdk", "14.0");
        assert_eq!(key.slot_name(), "wasi-sdk-14.0");
        assert_eq!(key.to_string(), "toolchain/wasi-sdk-14.0");
    }

    #[test]
    fn slot_name_has_no_separators() {
        let key = CacheKey::toolchain("owner/repo", "../v1");
        assert!(!key.slot_name().contains('/'));
    }

    #[test]
    fn hash_deterministic() {
        let hash1 = content_hash(b"test content");
        let hash2 = content_hash(b"test content");

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 16);
        assert_ne!(hash1, content_hash(b"other content"));
    }

    #[test]
    fn install_key_follows_input() {
        #[derive(Serialize)]
        struct Input<'a> {
            exts: &'a [&'a str],
        }
        let a = CacheKey::install("ruby", &Input { exts: &["json"] }).unwrap();
        let b = CacheKey::install("ruby", &Input { exts: &["json"] }).unwrap();
        let c = CacheKey::install("ruby", &Input { exts: &["json", "date"] }).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.slot_name().starts_with("ruby-"));
    }
}
