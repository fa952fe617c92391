//! Building a [`VfsImage`] from ordered mounts
//!
//! Mounts are applied in order onto one guest tree:
//!
//! - directories merge
//! - a file at a guest path already holding a file replaces it (last mount wins)
//! - a file where a directory exists, or a directory where a file exists, is a
//!   [`RbwasmError::VfsConflict`]
//!
//! Symlinks are followed and embedded as their target's content. A broken
//! link or one resolving outside its mount root fails the build.
//!
//! The tree is serialized in pre-order with siblings sorted by name, so the
//! image bytes only depend on the mounts and the host content.

use crate::error::{RbwasmError, RbwasmResult};
use crate::vfs::image::VfsImage;
use crate::vfs::mount::{guest_components, MountSpec};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// A mount plus the host paths it leaves out
#[derive(Debug, Clone)]
struct Mount {
    spec: MountSpec,
    excludes: Vec<Regex>,
}

enum Node {
    Dir(BTreeMap<String, Node>),
    File(PathBuf),
}

/// Collects mounts and produces the image
#[derive(Debug, Clone, Default)]
pub struct VfsImageBuilder {
    mounts: Vec<Mount>,
}

impl VfsImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mount; later mounts take precedence
    pub fn mount(mut self, spec: MountSpec) -> Self {
        self.mounts.push(Mount {
            spec,
            excludes: Vec::new(),
        });
        self
    }

    /// Add a mount skipping files whose host path matches any pattern
    pub fn mount_filtered(mut self, spec: MountSpec, excludes: Vec<Regex>) -> Self {
        self.mounts.push(Mount { spec, excludes });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Walk every mount and serialize the merged tree
    pub fn build(&self) -> RbwasmResult<VfsImage> {
        let mut root = BTreeMap::new();
        for mount in &self.mounts {
            debug!("Mounting {}", mount.spec);
            apply_mount(&mut root, mount)?;
        }

        let mut image = VfsImage::new();
        emit(&root, "", &mut image)?;
        info!(
            "Built filesystem image: {} entries, {} files, {} data bytes",
            image.entries().len(),
            image.file_count(),
            image.data().len()
        );
        Ok(image)
    }
}

fn apply_mount(root: &mut BTreeMap<String, Node>, mount: &Mount) -> RbwasmResult<()> {
    let host = &mount.spec.host;
    let guest = guest_components(&mount.spec.guest)?;

    let meta = std::fs::metadata(host)
        .map_err(|e| RbwasmError::vfs(host, format!("cannot read host path: {}", e)))?;
    if meta.is_file() {
        if guest.is_empty() {
            return Err(conflict(&guest, "cannot mount a file at the root"));
        }
        if !is_excluded(&mount.excludes, host) {
            insert_file(root, &guest, host.clone())?;
        }
        return Ok(());
    }

    let host_root = host
        .canonicalize()
        .map_err(|e| RbwasmError::vfs(host, format!("cannot resolve host path: {}", e)))?;
    ensure_dir(root, &guest)?;

    let walker = WalkDir::new(host)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| host.clone());
            RbwasmError::vfs(path, e.to_string())
        })?;
        let path = entry.path();

        if entry.path_is_symlink() {
            check_symlink(path, &host_root)?;
        }

        let rel = path
            .strip_prefix(host)
            .map_err(|e| RbwasmError::vfs(path, e.to_string()))?;
        let mut target = guest.clone();
        for c in rel.components() {
            let name = c
                .as_os_str()
                .to_str()
                .ok_or_else(|| RbwasmError::vfs(path, "file name is not valid UTF-8"))?;
            target.push(name.to_string());
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            ensure_dir(root, &target)?;
        } else if file_type.is_file() {
            if is_excluded(&mount.excludes, path) {
                debug!("vfs: excluded {}", path.display());
                continue;
            }
            insert_file(root, &target, path.to_path_buf())?;
        } else {
            debug!("vfs: skipping special file {}", path.display());
        }
    }
    Ok(())
}

fn check_symlink(path: &Path, host_root: &Path) -> RbwasmResult<()> {
    let resolved = path
        .canonicalize()
        .map_err(|e| RbwasmError::vfs(path, format!("broken symlink: {}", e)))?;
    if !resolved.starts_with(host_root) {
        return Err(RbwasmError::vfs(
            path,
            format!(
                "symlink escapes the mount root {} (points to {})",
                host_root.display(),
                resolved.display()
            ),
        ));
    }
    Ok(())
}

fn is_excluded(excludes: &[Regex], path: &Path) -> bool {
    let path = path.to_string_lossy();
    excludes.iter().any(|re| re.is_match(&path))
}

fn guest_string(components: &[String]) -> String {
    format!("/{}", components.join("/"))
}

fn conflict(components: &[String], reason: &str) -> RbwasmError {
    RbwasmError::VfsConflict {
        guest: guest_string(components),
        reason: reason.to_string(),
    }
}

/// Walk to the directory at `components`, creating missing directories
fn ensure_dir<'a>(
    root: &'a mut BTreeMap<String, Node>,
    components: &[String],
) -> RbwasmResult<&'a mut BTreeMap<String, Node>> {
    let mut dir = root;
    for (i, name) in components.iter().enumerate() {
        let node = dir
            .entry(name.clone())
            .or_insert_with(|| Node::Dir(BTreeMap::new()));
        dir = match node {
            Node::Dir(children) => children,
            Node::File(host) => {
                return Err(conflict(
                    &components[..=i],
                    &format!("already a file (from {}), cannot be a directory", host.display()),
                ))
            }
        };
    }
    Ok(dir)
}

fn insert_file(
    root: &mut BTreeMap<String, Node>,
    components: &[String],
    host: PathBuf,
) -> RbwasmResult<()> {
    let Some((name, parents)) = components.split_last() else {
        return Err(conflict(components, "cannot mount a file at the root"));
    };
    let dir = ensure_dir(root, parents)?;
    match dir.get(name) {
        Some(Node::Dir(_)) => Err(conflict(
            components,
            &format!("already a directory, cannot be the file {}", host.display()),
        )),
        Some(Node::File(previous)) => {
            debug!(
                "vfs: {} overrides {} at {}",
                host.display(),
                previous.display(),
                guest_string(components)
            );
            dir.insert(name.clone(), Node::File(host));
            Ok(())
        }
        None => {
            dir.insert(name.clone(), Node::File(host));
            Ok(())
        }
    }
}

/// Pre-order serialization, siblings in byte order of their names
fn emit(dir: &BTreeMap<String, Node>, prefix: &str, image: &mut VfsImage) -> RbwasmResult<()> {
    for (name, node) in dir {
        let path = format!("{}/{}", prefix, name);
        match node {
            Node::Dir(children) => {
                image.push_dir(path.as_str());
                emit(children, &path, image)?;
            }
            Node::File(host) => {
                let content = std::fs::read(host)
                    .map_err(|e| RbwasmError::vfs(host, format!("cannot read file: {}", e)))?;
                image.push_file(path, &content);
            }
        }
    }
    Ok(())
}
