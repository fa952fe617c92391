//! Embedded virtual filesystem
//!
//! Host directories named by [`MountSpec`]s are packed into one
//! self-contained [`VfsImage`], which the link stage embeds into the module.
//! Images are rebuilt on every run and never cached.

pub mod builder;
pub mod embed;
pub mod image;
pub mod mount;

pub use builder::VfsImageBuilder;
pub use image::{NodeKind, VfsEntry, VfsImage};
pub use mount::{MountSpec, RUNTIME_ROOT_ALIAS};

use crate::error::{RbwasmError, RbwasmResult};
use regex::Regex;
use std::path::PathBuf;

/// Where the runtime's install tree lives on each side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRoots {
    /// Installed prefix on the host
    pub host: PathBuf,
    /// Directory it appears at in the image
    pub guest: PathBuf,
}

/// Compile exclude patterns for the builtin runtime mount
pub fn compile_excludes(patterns: &[String]) -> RbwasmResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| RbwasmError::ConfigInvalid {
                path: PathBuf::from("vfs.builtin_excludes"),
                reason: format!("invalid pattern '{}': {}", p, e),
            })
        })
        .collect()
}

/// Assemble the image builder for one run.
///
/// The runtime's own files come first (when `builtin` is set) so user
/// mounts can override them. `@ruby_root` in user mounts is expanded against
/// `roots`; it is an error to use it without them.
pub fn plan_mounts(
    user_mounts: &[MountSpec],
    roots: Option<&RuntimeRoots>,
    builtin: Option<Vec<Regex>>,
) -> RbwasmResult<VfsImageBuilder> {
    let mut builder = VfsImageBuilder::new();

    if let Some(excludes) = builtin {
        let roots = roots.ok_or_else(|| {
            RbwasmError::Internal("builtin files requested without an installed runtime".into())
        })?;
        builder = builder.mount_filtered(
            MountSpec::new(roots.host.clone(), roots.guest.clone()),
            excludes,
        );
    }

    for spec in user_mounts {
        let spec = match roots {
            Some(roots) => spec.clone().expand(&roots.host, &roots.guest),
            None if spec.uses_runtime_root() => {
                return Err(RbwasmError::InvalidMountSpec {
                    spec: spec.to_string(),
                    reason: format!("{} is not available for this build", RUNTIME_ROOT_ALIAS),
                })
            }
            None => spec.clone(),
        };
        builder = builder.mount(spec);
    }
    Ok(builder)
}

/// Whether the mount plan needs the runtime install tree
pub fn needs_runtime(user_mounts: &[MountSpec], builtin: bool) -> bool {
    builtin || user_mounts.iter().any(MountSpec::uses_runtime_root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn builtin_files_mounted_first_and_overridable() {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("install/embd-root/ruby");
        write(&install.join("bin/ruby"), "wasm");
        write(&install.join("lib/ruby/3.0.0/json.rb"), "builtin json");
        write(&temp.path().join("app/json.rb"), "patched json");
        write(&temp.path().join("app/main.rb"), "puts 1");

        let roots = RuntimeRoots {
            host: install.clone(),
            guest: PathBuf::from("/ruby"),
        };
        let excludes = compile_excludes(&[r".*/bin/ruby$".to_string()]).unwrap();
        let user = vec![
            MountSpec::new(temp.path().join("app"), "@ruby_root/lib/ruby/3.0.0"),
            MountSpec::new(temp.path().join("app"), "/app"),
        ];

        let image = plan_mounts(&user, Some(&roots), Some(excludes))
            .unwrap()
            .build()
            .unwrap();

        assert!(image.file("/ruby/bin/ruby").is_none());
        assert_eq!(image.file("/ruby/lib/ruby/3.0.0/json.rb"), Some(&b"patched json"[..]));
        assert_eq!(image.file("/app/main.rb"), Some(&b"puts 1"[..]));
    }

    #[test]
    fn runtime_alias_without_runtime_is_rejected() {
        let user = vec![MountSpec::new("@ruby_root/lib", "/lib")];
        assert!(needs_runtime(&user, false));
        let err = plan_mounts(&user, None, None).unwrap_err();
        assert!(matches!(err, RbwasmError::InvalidMountSpec { .. }));
    }

    #[test]
    fn plain_mounts_do_not_need_runtime() {
        let user = vec![MountSpec::new("./lib", "/lib")];
        assert!(!needs_runtime(&user, false));
        assert!(needs_runtime(&user, true));
        assert!(!plan_mounts(&user, None, None).unwrap().is_empty());
    }

    #[test]
    fn bad_exclude_pattern_is_config_error() {
        let err = compile_excludes(&["(".to_string()]).unwrap_err();
        assert!(matches!(err, RbwasmError::ConfigInvalid { .. }));
    }
}
