//! Release tarball unpacking

use crate::error::{RbwasmError, RbwasmResult};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Unpack a `.tar.gz` archive into `out_dir`, dropping the first
/// `strip_components` path components of every entry.
///
/// Entries with absolute paths or `..` components are rejected. Entries
/// that vanish entirely after stripping (the top-level directory) are skipped.
pub fn unpack_tar_gz(archive: &Path, out_dir: &Path, strip_components: usize) -> RbwasmResult<()> {
    let file = File::open(archive)
        .map_err(|e| RbwasmError::io(format!("opening {}", archive.display()), e))?;
    unpack_tar_gz_reader(file, out_dir, strip_components)
        .map_err(|reason| RbwasmError::integrity(archive.display().to_string(), reason))
}

fn unpack_tar_gz_reader<R: Read>(
    reader: R,
    out_dir: &Path,
    strip_components: usize,
) -> Result<(), String> {
    let mut ar = tar::Archive::new(GzDecoder::new(reader));
    let entries = ar.entries().map_err(|e| format!("reading tar entries: {}", e))?;

    let mut count = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| format!("reading tar entry: {}", e))?;
        // GitHub tarballs carry a pax global header naming the commit.
        if entry.header().entry_type() == tar::EntryType::XGlobalHeader {
            continue;
        }
        let entry_path = entry
            .path()
            .map_err(|e| format!("invalid entry path: {}", e))?
            .to_path_buf();
        let rel = sanitize_rel_path(&entry_path)?;
        let rel: PathBuf = rel.components().skip(strip_components).collect();
        if rel.as_os_str().is_empty() {
            continue;
        }

        let out_path = out_dir.join(&rel);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("creating {}: {}", parent.display(), e))?;
        }
        entry
            .unpack(&out_path)
            .map_err(|e| format!("unpacking {}: {}", out_path.display(), e))?;
        count += 1;
    }

    if count == 0 {
        return Err("archive contains no entries".to_string());
    }
    debug!("Unpacked {} entries into {}", count, out_dir.display());
    Ok(())
}

fn sanitize_rel_path(path: &Path) -> Result<PathBuf, String> {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::Prefix(_) | Component::RootDir => {
                return Err(format!("invalid archive path (absolute): {}", path.display()))
            }
            Component::ParentDir => {
                return Err(format!("invalid archive path (..): {}", path.display()))
            }
            Component::CurDir => {}
            Component::Normal(p) => out.push(p),
        }
    }
    Ok(out)
}
