//! Pipeline stages and their reported outcome

use crate::error::RbwasmResult;
use std::fmt;
use std::path::PathBuf;

/// One step of a pipeline run, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Provision,
    Acquire,
    Build,
    ImageBuild,
    Link,
    Transform,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Provision,
        Stage::Acquire,
        Stage::Build,
        Stage::ImageBuild,
        Stage::Link,
        Stage::Transform,
    ];

    /// Progress line shown while the stage runs
    pub fn activity(&self) -> &'static str {
        match self {
            Self::Provision => "Provisioning toolchain",
            Self::Acquire => "Acquiring runtime source",
            Self::Build => "Building runtime",
            Self::ImageBuild => "Packing filesystem image",
            Self::Link => "Linking module",
            Self::Transform => "Applying asyncify transform",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Provision => "provision",
            Self::Acquire => "acquire",
            Self::Build => "build",
            Self::ImageBuild => "image-build",
            Self::Link => "link",
            Self::Transform => "transform",
        };
        write!(f, "{}", name)
    }
}

/// How a stage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Everything it would produce was already cached
    SkippedCached,
    Executed,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkippedCached => write!(f, "cached"),
            Self::Executed => write!(f, "ok"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Receives stage transitions as they happen.
///
/// Stages that run concurrently report from the same task, so calls for
/// different stages may interleave.
pub trait StageObserver: Send + Sync {
    fn stage_started(&self, stage: Stage);

    fn stage_finished(&self, stage: Stage, status: StageStatus);

    /// A started stage was dropped because a concurrent stage failed
    fn stage_cancelled(&self, _stage: Stage) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl StageObserver for Silent {
    fn stage_started(&self, _stage: Stage) {}

    fn stage_finished(&self, _stage: Stage, _status: StageStatus) {}
}

/// Outcome of one pipeline run
#[derive(Debug)]
pub struct PipelineResult {
    /// Finished stages in completion order. Stages cancelled by a
    /// concurrent failure are not listed.
    pub stages: Vec<(Stage, StageStatus)>,
    /// Stage that raised the error in `outcome`
    pub failed: Option<Stage>,
    /// Path of the final module, or the error that stopped the run
    pub outcome: RbwasmResult<PathBuf>,
}

impl PipelineResult {
    pub fn status(&self, stage: Stage) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, status)| *status)
    }

    /// The stage that stopped the run, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        self.failed
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Stages that were never reached
    pub fn not_run(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| self.status(*stage).is_none())
            .collect()
    }

    pub fn into_outcome(self) -> RbwasmResult<PathBuf> {
        self.outcome
    }
}
