//! Error types for rbwasm
//!
//! All modules use `RbwasmResult<T>` as their return type. Every error maps
//! to one stable process exit code.

use crate::external::StepOutput;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rbwasm operations
pub type RbwasmResult<T> = Result<T, RbwasmError>;

/// Exit codes reported by the `rbwasm` binary.
///
/// These values are part of the command-line contract and must not change.
pub mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL: u8 = 1;
    pub const PROVISION: u8 = 10;
    pub const FETCH: u8 = 11;
    pub const INTEGRITY: u8 = 12;
    pub const BUILD: u8 = 20;
    pub const VFS: u8 = 30;
    pub const LINK: u8 = 40;
    pub const TRANSFORM: u8 = 50;
}

/// All errors that can occur in rbwasm
#[derive(Error, Debug)]
pub enum RbwasmError {
    // Artifact cache errors
    #[error("Cache provisioning failed for {key}: {reason}")]
    Provision { key: String, reason: String },

    #[error("Cache entry {key} is corrupt at {path}: {reason}")]
    CacheCorrupt {
        key: String,
        path: PathBuf,
        reason: String,
    },

    // Acquisition errors
    #[error("Download failed: {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Integrity check failed for {what}: {reason}")]
    Integrity { what: String, reason: String },

    // Cross-build errors
    #[error("{step} failed ({status})\n{output}")]
    Build {
        step: String,
        status: String,
        output: String,
    },

    // Filesystem image errors
    #[error("Failed to build filesystem image from {path}: {reason}")]
    VfsBuild { path: PathBuf, reason: String },

    #[error("Conflicting guest path {guest}: {reason}")]
    VfsConflict { guest: String, reason: String },

    #[error("Invalid mount specification '{spec}': {reason}")]
    InvalidMountSpec { spec: String, reason: String },

    // Link and transform errors
    #[error("{step} failed ({status})\n{output}")]
    Link {
        step: String,
        status: String,
        output: String,
    },

    #[error("{step} failed ({status})\n{output}")]
    Transform {
        step: String,
        status: String,
        output: String,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid build source '{spec}': {reason}")]
    InvalidBuildSource { spec: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RbwasmError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a spawn error for an external program
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }

    /// Create a cache provisioning error
    pub fn provision(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Provision {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a transport error
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an unpack or checksum error
    pub fn integrity(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Integrity {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a filesystem image error
    pub fn vfs(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::VfsBuild {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Native build step exited unsuccessfully
    pub fn build(step: impl Into<String>, output: &StepOutput) -> Self {
        Self::Build {
            step: step.into(),
            status: output.status(),
            output: output.tail(),
        }
    }

    /// Linker or object generation exited unsuccessfully
    pub fn link(step: impl Into<String>, output: &StepOutput) -> Self {
        Self::Link {
            step: step.into(),
            status: output.status(),
            output: output.tail(),
        }
    }

    /// Binary rewriter exited unsuccessfully
    pub fn transform(step: impl Into<String>, output: &StepOutput) -> Self {
        Self::Transform {
            step: step.into(),
            status: output.status(),
            output: output.tail(),
        }
    }

    /// Stable process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Provision { .. } | Self::CacheCorrupt { .. } => exit_codes::PROVISION,
            Self::Fetch { .. } => exit_codes::FETCH,
            Self::Integrity { .. } => exit_codes::INTEGRITY,
            Self::Build { .. } => exit_codes::BUILD,
            Self::VfsBuild { .. } | Self::VfsConflict { .. } => exit_codes::VFS,
            Self::Link { .. } => exit_codes::LINK,
            Self::Transform { .. } => exit_codes::TRANSFORM,
            _ => exit_codes::GENERAL,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CacheCorrupt { .. } => {
                Some("Remove the reported directory and run the build again")
            }
            Self::Fetch { .. } => Some("Check network access or point the source at a local path: path:DIR"),
            Self::Build { .. } => Some("Set RBWASM_DEBUG=1 to stream the full build output"),
            Self::InvalidMountSpec { .. } => Some("Use --mapdir HOST_DIR::GUEST_DIR"),
            _ => None,
        }
    }
}
