//! Downloading release tarballs

use crate::error::{RbwasmError, RbwasmResult};
use crate::toolchain::archive::unpack_tar_gz;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Transport used to download archives
///
/// Implementations are blocking; callers run them on the blocking pool.
pub trait Fetcher: Send + Sync {
    /// Download `url` into the file at `dest`
    fn fetch(&self, url: &str, dest: &Path) -> RbwasmResult<()>;
}

/// HTTPS fetcher backed by `ureq`
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher;

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> RbwasmResult<()> {
        info!("Downloading {}", url);
        let resp = ureq::get(url)
            .header("User-Agent", APP_USER_AGENT)
            .call()
            .map_err(|e| RbwasmError::fetch(url, e))?;
        let mut reader = resp.into_body().into_reader();

        let mut f = File::create(dest)
            .map_err(|e| RbwasmError::io(format!("creating {}", dest.display()), e))?;
        let mut buf = [0u8; 1024 * 64];
        let mut total = 0u64;
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| RbwasmError::fetch(url, format!("reading download stream: {}", e)))?;
            if n == 0 {
                break;
            }
            total += n as u64;
            f.write_all(&buf[..n])
                .map_err(|e| RbwasmError::io(format!("writing {}", dest.display()), e))?;
        }
        f.flush()
            .map_err(|e| RbwasmError::io(format!("writing {}", dest.display()), e))?;
        debug!("Downloaded {} bytes from {}", total, url);
        Ok(())
    }
}

/// A tarball to download and unpack into a cache staging directory
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub url: String,
    /// Expected SHA-256 (hex), unchecked when absent
    pub sha256: Option<String>,
    /// Leading path components dropped from every entry
    pub strip_components: usize,
}

/// Download, verify and unpack an archive into `dest` on the blocking pool
pub async fn install_archive(
    fetcher: Arc<dyn Fetcher>,
    request: ArchiveRequest,
    dest: PathBuf,
) -> RbwasmResult<()> {
    tokio::task::spawn_blocking(move || install_archive_blocking(fetcher.as_ref(), &request, &dest))
        .await
        .map_err(|e| RbwasmError::Internal(format!("download task failed: {}", e)))?
}

fn install_archive_blocking(
    fetcher: &dyn Fetcher,
    request: &ArchiveRequest,
    dest: &Path,
) -> RbwasmResult<()> {
    // Kept beside the staging directory so it never ends up in the slot.
    let archive = download_path(dest);
    let result = fetcher
        .fetch(&request.url, &archive)
        .and_then(|()| verify_sha256(&archive, &request.url, request.sha256.as_deref()))
        .and_then(|()| unpack_tar_gz(&archive, dest, request.strip_components));
    let _ = std::fs::remove_file(&archive);
    result
}

fn download_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".download");
    dest.with_file_name(name)
}

/// Check the file's SHA-256 against `expected`, if given
pub fn verify_sha256(path: &Path, url: &str, expected: Option<&str>) -> RbwasmResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = file_sha256(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(RbwasmError::integrity(
            url,
            format!("sha256 mismatch: expected {}, got {}", expected.trim(), actual),
        ));
    }
    debug!("Verified sha256 of {}", url);
    Ok(())
}

fn file_sha256(path: &Path) -> RbwasmResult<String> {
    let mut f =
        File::open(path).map_err(|e| RbwasmError::io(format!("opening {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 1024 * 64];
    loop {
        let n = f
            .read(&mut buf)
            .map_err(|e| RbwasmError::io(format!("reading {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
