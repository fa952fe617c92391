//! Mount specifications (`HOST::GUEST`)

use crate::error::{RbwasmError, RbwasmResult};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Prefix referring to the runtime install tree (host side) or the guest
/// runtime root (guest side)
pub const RUNTIME_ROOT_ALIAS: &str = "@ruby_root";

/// One host path exposed at a guest path inside the image
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountSpec {
    pub host: PathBuf,
    pub guest: PathBuf,
}

impl MountSpec {
    pub fn new(host: impl Into<PathBuf>, guest: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            guest: guest.into(),
        }
    }

    /// Whether either side refers to the runtime roots
    pub fn uses_runtime_root(&self) -> bool {
        self.host.starts_with(RUNTIME_ROOT_ALIAS) || self.guest.starts_with(RUNTIME_ROOT_ALIAS)
    }

    /// Replace the `@ruby_root` alias on either side
    pub fn expand(self, host_root: &Path, guest_root: &Path) -> Self {
        let expand_one = |path: PathBuf, root: &Path| match path.strip_prefix(RUNTIME_ROOT_ALIAS) {
            Ok(rest) => root.join(rest),
            Err(_) => path,
        };
        Self {
            host: expand_one(self.host, host_root),
            guest: expand_one(self.guest, guest_root),
        }
    }
}

impl FromStr for MountSpec {
    type Err = RbwasmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RbwasmError::InvalidMountSpec {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.split("::").collect();
        if parts.len() != 2 {
            return Err(invalid("must contain exactly one double colon ('::')"));
        }
        let (host, guest) = (parts[0], parts[1]);
        if host.is_empty() {
            return Err(invalid("host path is empty"));
        }
        if !guest.starts_with('/') && !Path::new(guest).starts_with(RUNTIME_ROOT_ALIAS) {
            return Err(invalid("guest path must be absolute"));
        }
        Ok(Self::new(host, guest))
    }
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.host.display(), self.guest.display())
    }
}

/// Split an absolute guest path into normalized components.
///
/// `.` components and repeated separators are dropped; `..` is rejected.
pub fn guest_components(guest: &Path) -> RbwasmResult<Vec<String>> {
    let conflict = |reason: &str| RbwasmError::VfsConflict {
        guest: guest.display().to_string(),
        reason: reason.to_string(),
    };
    if !guest.has_root() {
        return Err(conflict("guest path must be absolute"));
    }
    let mut out = Vec::new();
    for c in guest.components() {
        match c {
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => return Err(conflict("guest path must not contain '..'")),
            Component::Prefix(_) => return Err(conflict("guest path must not have a prefix")),
            Component::Normal(name) => {
                let name = name
                    .to_str()
                    .ok_or_else(|| conflict("guest path is not valid UTF-8"))?;
                out.push(name.to_string());
            }
        }
    }
    Ok(out)
}
