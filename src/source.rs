//! Runtime source acquisition
//!
//! A build source is either a GitHub repository at a ref, fetched as a
//! tarball into a source cache slot, or a local directory used in place.
//! Either way the returned tree is ready for `configure`: when only
//! `autogen.sh` is present it is run first (inside the staging directory for
//! fetched trees, so cached slots never change after publication).

use crate::cache::{ArtifactCache, CacheKey};
use crate::error::{RbwasmError, RbwasmResult};
use crate::external::{ExternalStep, Invocation};
use crate::toolchain::{install_archive, ArchiveRequest, Fetcher};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Where the runtime source comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BuildSource {
    /// `github:OWNER/REPO@REF`
    GitHub {
        owner: String,
        repo: String,
        git_ref: String,
    },
    /// `path:DIR`
    Dir { path: PathBuf },
}

impl BuildSource {
    /// Tarball URL for remote sources
    pub fn archive_url(&self) -> Option<String> {
        match self {
            Self::GitHub {
                owner,
                repo,
                git_ref,
            } => Some(format!(
                "https://api.github.com/repos/{}/{}/tarball/{}",
                owner, repo, git_ref
            )),
            Self::Dir { .. } => None,
        }
    }

    /// Same source with a local tree resolved to its absolute path.
    ///
    /// A tree that cannot be resolved is returned as written.
    pub fn canonical(&self) -> Self {
        match self {
            Self::Dir { path } => Self::Dir {
                path: path.canonicalize().unwrap_or_else(|_| path.clone()),
            },
            other => other.clone(),
        }
    }
}

impl FromStr for BuildSource {
    type Err = RbwasmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RbwasmError::InvalidBuildSource {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected KIND:LOCATION"))?;
        match kind {
            "github" => {
                let (owner, repo_and_ref) = rest
                    .split_once('/')
                    .ok_or_else(|| invalid("expected github:OWNER/REPO@REF"))?;
                if repo_and_ref.contains('/') {
                    return Err(invalid("only one / should appear"));
                }
                let (repo, git_ref) = repo_and_ref
                    .split_once('@')
                    .ok_or_else(|| invalid("expected github:OWNER/REPO@REF"))?;
                if git_ref.contains('@') {
                    return Err(invalid("only one @ should appear"));
                }
                if owner.is_empty() || repo.is_empty() || git_ref.is_empty() {
                    return Err(invalid("owner, repo and ref must be non-empty"));
                }
                Ok(Self::GitHub {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    git_ref: git_ref.to_string(),
                })
            }
            "path" => {
                if rest.is_empty() {
                    return Err(invalid("empty path"));
                }
                Ok(Self::Dir { path: rest.into() })
            }
            other => Err(invalid(&format!("unknown build source kind: {}", other))),
        }
    }
}

impl fmt::Display for BuildSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitHub {
                owner,
                repo,
                git_ref,
            } => write!(f, "github:{}/{}@{}", owner, repo, git_ref),
            Self::Dir { path } => write!(f, "path:{}", path.display()),
        }
    }
}

/// A source tree ready for configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredSource {
    pub path: PathBuf,
    /// No download or bootstrap work was done
    pub cached: bool,
}

/// Resolves build sources to local trees
pub struct SourceAcquirer {
    cache: ArtifactCache,
    fetcher: Arc<dyn Fetcher>,
    step: Arc<dyn ExternalStep>,
}

impl SourceAcquirer {
    pub fn new(cache: ArtifactCache, fetcher: Arc<dyn Fetcher>, step: Arc<dyn ExternalStep>) -> Self {
        Self {
            cache,
            fetcher,
            step,
        }
    }

    pub async fn acquire(&self, source: &BuildSource) -> RbwasmResult<AcquiredSource> {
        match source {
            BuildSource::Dir { path } => {
                let path = path.canonicalize().map_err(|e| RbwasmError::InvalidBuildSource {
                    spec: source.to_string(),
                    reason: e.to_string(),
                })?;
                debug!("Using source tree in place: {}", path.display());
                let bootstrapped = bootstrap(self.step.as_ref(), &path, source).await?;
                Ok(AcquiredSource {
                    path,
                    cached: !bootstrapped,
                })
            }
            BuildSource::GitHub { repo, .. } => {
                let locator = source.to_string();
                let key = CacheKey::source(repo, &locator);
                let request = ArchiveRequest {
                    url: source.archive_url().unwrap_or_default(),
                    sha256: None,
                    strip_components: 1,
                };
                let fetcher = Arc::clone(&self.fetcher);
                let step = Arc::clone(&self.step);

                let ensured = self
                    .cache
                    .ensure(&key, move |staging| async move {
                        info!("Fetching {} into the source cache", locator);
                        install_archive(fetcher, request, staging.clone()).await?;
                        bootstrap(step.as_ref(), &staging, source).await?;
                        Ok(())
                    })
                    .await?;
                Ok(AcquiredSource {
                    path: ensured.path,
                    cached: ensured.cached,
                })
            }
        }
    }
}

/// Generate `configure` with `autogen.sh` when the tree lacks it.
///
/// Returns whether anything was run.
async fn bootstrap(step: &dyn ExternalStep, dir: &Path, source: &BuildSource) -> RbwasmResult<bool> {
    if dir.join("configure").is_file() {
        return Ok(false);
    }
    let autogen = dir.join("autogen.sh");
    if !autogen.is_file() {
        return Err(RbwasmError::InvalidBuildSource {
            spec: source.to_string(),
            reason: "source tree has neither configure nor autogen.sh".to_string(),
        });
    }

    let invocation = Invocation::new("./autogen.sh", autogen).current_dir(dir);
    let output = step.run(&invocation).await?;
    if !output.is_success() {
        return Err(RbwasmError::build("./autogen.sh", &output));
    }
    Ok(true)
}
