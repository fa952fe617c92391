//! Pipeline orchestration
//!
//! One run goes through a fixed sequence of stages:
//!
//! ```text
//! Provision ─┐
//!            ├─> Build ─┐
//! Acquire  ──┘          ├─> Link ─> Transform
//!            ImageBuild ┘
//! ```
//!
//! Provision and Acquire run concurrently. ImageBuild runs concurrently with
//! Build unless the mounts refer to the installed runtime tree, in which case
//! it waits for Build. When the runtime install tree for the requested input
//! is already cached, Acquire and Build are skipped and no source is
//! fetched.
//!
//! The run stops at the first failing stage. A stage still running
//! concurrently with it is dropped. Cache slots written by earlier stages
//! stay valid for the next run; nothing is rolled back or retried.

mod stage;

pub use stage::{PipelineResult, Silent, Stage, StageObserver, StageStatus};

use crate::build::{BuildContext, BuildInput, BuildOutput, CrossBuildDriver};
use crate::cache::ArtifactCache;
use crate::config::{Config, ToolchainConfig};
use crate::error::{RbwasmError, RbwasmResult};
use crate::external::ExternalStep;
use crate::link::{LinkInput, LinkerDriver};
use crate::source::{AcquiredSource, BuildSource, SourceAcquirer};
use crate::toolchain::{Fetcher, ToolchainProvisioner};
use crate::transform::AsyncTransformDriver;
use crate::vfs::{compile_excludes, needs_runtime, plan_mounts, MountSpec, RuntimeRoots, VfsImage};
use crate::workspace::Workspace;
use regex::Regex;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Everything one run needs besides the workspace and toolchain
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub source: BuildSource,
    /// Final module path
    pub output: PathBuf,
    /// User mounts, in precedence order
    pub mounts: Vec<MountSpec>,
    /// Mount the installed runtime tree at `guest_runtime_root`
    pub builtin_files: bool,
    pub builtin_excludes: Vec<String>,
    pub guest_runtime_root: PathBuf,
    /// Default arguments embedded into the module
    pub preset_args: Vec<String>,
    pub install_prefix: PathBuf,
    pub stack_size: usize,
    pub asyncify_stack_size: usize,
    pub enabled_extensions: Vec<String>,
    pub extra_cc_args: Vec<String>,
    pub extra_linker_args: Vec<String>,
    pub transient_heap_total_size: Option<String>,
    /// Keep debug info through the transform
    pub debug_info: bool,
    /// Copy generated C sources into the workspace `tmp/`
    pub export_sources: bool,
}

impl PipelineOptions {
    /// Options taken from the configuration file, writing to `output`
    pub fn from_config(config: &Config, output: impl Into<PathBuf>) -> RbwasmResult<Self> {
        Ok(Self {
            source: config.build.runtime_source.parse()?,
            output: output.into(),
            mounts: Vec::new(),
            builtin_files: config.vfs.builtin_files,
            builtin_excludes: config.vfs.builtin_excludes.clone(),
            guest_runtime_root: config.vfs.guest_runtime_root.clone(),
            preset_args: Vec::new(),
            install_prefix: config.build.install_prefix.clone(),
            stack_size: config.build.stack_size,
            asyncify_stack_size: config.build.asyncify_stack_size,
            enabled_extensions: config.build.enabled_extensions.clone(),
            extra_cc_args: config.build.extra_cc_args.clone(),
            extra_linker_args: config.build.extra_linker_args.clone(),
            transient_heap_total_size: None,
            debug_info: false,
            export_sources: config.workspace.save_temps,
        })
    }

    /// The part of the options that determines the runtime install tree
    pub fn build_input(&self) -> BuildInput {
        BuildInput {
            source: self.source.clone(),
            prefix: self.install_prefix.clone(),
            asyncify_stack_size: self.asyncify_stack_size,
            extra_cc_args: self.extra_cc_args.clone(),
            enabled_extensions: self.enabled_extensions.clone(),
            transient_heap_total_size: self.transient_heap_total_size.clone(),
        }
    }
}

/// An error with the stage that raised it; `None` before any stage started
struct Halt {
    stage: Option<Stage>,
    error: RbwasmError,
}

impl From<RbwasmError> for Halt {
    fn from(error: RbwasmError) -> Self {
        Self { stage: None, error }
    }
}

/// Where the runtime comes from in this run
enum RuntimePlan {
    Cached(BuildOutput),
    FromSource(AcquiredSource),
}

/// Sequences the stage drivers over one workspace
pub struct Pipeline {
    cache: ArtifactCache,
    toolchain: ToolchainConfig,
    fetcher: Arc<dyn Fetcher>,
    step: Arc<dyn ExternalStep>,
    jobs: Option<usize>,
}

impl Pipeline {
    pub fn new(
        workspace: Workspace,
        toolchain: ToolchainConfig,
        fetcher: Arc<dyn Fetcher>,
        step: Arc<dyn ExternalStep>,
    ) -> Self {
        Self {
            cache: ArtifactCache::new(workspace),
            toolchain,
            fetcher,
            step,
            jobs: None,
        }
    }

    /// Override the number of parallel make jobs
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Run every stage, reporting transitions to `observer`
    pub async fn run(&self, options: &PipelineOptions, observer: &dyn StageObserver) -> PipelineResult {
        let tracker = Tracker::new(observer);
        let (failed, outcome) = match self.execute(options, &tracker).await {
            Ok(path) => {
                info!("Module written to {}", path.display());
                (None, Ok(path))
            }
            Err(Halt {
                stage: Some(stage),
                error,
            }) => {
                warn!("Stage {} failed: {}", stage, error);
                (Some(stage), Err(error))
            }
            Err(Halt { stage: None, error }) => {
                warn!("Pipeline failed before any stage ran: {}", error);
                (None, Err(error))
            }
        };

        PipelineResult {
            stages: tracker.into_stages(),
            failed,
            outcome,
        }
    }

    async fn execute(&self, options: &PipelineOptions, tracker: &Tracker<'_>) -> Result<PathBuf, Halt> {
        let builtin = if options.builtin_files {
            Some(compile_excludes(&options.builtin_excludes)?)
        } else {
            None
        };
        let input = options.build_input();
        let driver = self.build_driver();

        let (ctx, plan) = match driver.lookup(&input)? {
            Some(cached) => {
                debug!("Install tree for {} already cached", input.source);
                let ctx = tracker.run(Stage::Provision, self.provision(options)).await?;
                tracker.skip(Stage::Acquire);
                (ctx, RuntimePlan::Cached(cached))
            }
            None => {
                let (ctx, source) = tokio::try_join!(
                    tracker.run(Stage::Provision, self.provision(options)),
                    tracker.run(Stage::Acquire, self.acquire(&input.source)),
                )?;
                (ctx, RuntimePlan::FromSource(source))
            }
        };

        let build = self.build(&driver, &ctx, &input, plan, tracker);
        let (runtime, image) = if needs_runtime(&options.mounts, builtin.is_some()) {
            let runtime = build.await?;
            let roots = RuntimeRoots {
                host: runtime.installed_root(),
                guest: options.guest_runtime_root.clone(),
            };
            let image = tracker
                .run(
                    Stage::ImageBuild,
                    pack_image(options.mounts.clone(), Some(roots), builtin),
                )
                .await?;
            (runtime, image)
        } else {
            tokio::try_join!(
                build,
                tracker.run(
                    Stage::ImageBuild,
                    pack_image(options.mounts.clone(), None, None)
                ),
            )?
        };

        let linker = LinkerDriver::new(self.cache.workspace().clone(), Arc::clone(&self.step))
            .with_exported_sources(options.export_sources);
        let link_input = LinkInput {
            runtime: &runtime,
            image: image.as_ref(),
            preset_args: &options.preset_args,
            stack_size: options.stack_size,
            extra_args: &options.extra_linker_args,
        };
        let linked = tracker
            .run(Stage::Link, async {
                Ok((linker.link(&ctx, &link_input).await?, false))
            })
            .await?;

        let transformer = AsyncTransformDriver::new(&ctx.wasm_opt, Arc::clone(&self.step))
            .with_debug_info(options.debug_info);
        tracker
            .run(Stage::Transform, async {
                transformer.transform(linked.path(), &options.output).await?;
                Ok(((), false))
            })
            .await?;

        Ok(options.output.clone())
    }

    fn build_driver(&self) -> CrossBuildDriver {
        let driver = CrossBuildDriver::new(self.cache.clone(), Arc::clone(&self.step));
        match self.jobs {
            Some(jobs) => driver.with_jobs(jobs),
            None => driver,
        }
    }

    async fn provision(&self, options: &PipelineOptions) -> RbwasmResult<(BuildContext, bool)> {
        let provisioner = ToolchainProvisioner::new(
            self.cache.clone(),
            Arc::clone(&self.fetcher),
            self.toolchain.clone(),
        );
        let provisioned = provisioner.provision().await?;
        let ctx = BuildContext::new(&provisioned.toolchain, &options.install_prefix)?;
        Ok((ctx, provisioned.cached))
    }

    async fn acquire(&self, source: &BuildSource) -> RbwasmResult<(AcquiredSource, bool)> {
        let acquirer = SourceAcquirer::new(
            self.cache.clone(),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.step),
        );
        let acquired = acquirer.acquire(source).await?;
        let cached = acquired.cached;
        Ok((acquired, cached))
    }

    async fn build(
        &self,
        driver: &CrossBuildDriver,
        ctx: &BuildContext,
        input: &BuildInput,
        plan: RuntimePlan,
        tracker: &Tracker<'_>,
    ) -> Result<BuildOutput, Halt> {
        match plan {
            RuntimePlan::Cached(output) => {
                tracker.skip(Stage::Build);
                Ok(output)
            }
            RuntimePlan::FromSource(source) => {
                tracker
                    .run(Stage::Build, async {
                        let output = driver.build(ctx, &source.path, input).await?;
                        let cached = output.cached;
                        Ok((output, cached))
                    })
                    .await
            }
        }
    }
}

/// Build the image on the blocking pool; `None` when nothing is mounted
async fn pack_image(
    mounts: Vec<MountSpec>,
    roots: Option<RuntimeRoots>,
    builtin: Option<Vec<Regex>>,
) -> RbwasmResult<(Option<VfsImage>, bool)> {
    let builder = plan_mounts(&mounts, roots.as_ref(), builtin)?;
    if builder.is_empty() {
        debug!("Nothing mounted, omitting filesystem image");
        return Ok((None, false));
    }
    let image = tokio::task::spawn_blocking(move || builder.build())
        .await
        .map_err(|e| RbwasmError::Internal(format!("image build task failed: {}", e)))??;
    Ok((Some(image), false))
}

/// Records stage outcomes and forwards them to the observer
struct Tracker<'a> {
    observer: &'a dyn StageObserver,
    stages: Mutex<Vec<(Stage, StageStatus)>>,
}

impl<'a> Tracker<'a> {
    fn new(observer: &'a dyn StageObserver) -> Self {
        Self {
            observer,
            stages: Mutex::new(Vec::new()),
        }
    }

    /// Run one stage; the work reports its value and whether it was cached
    async fn run<T, F>(&self, stage: Stage, work: F) -> Result<T, Halt>
    where
        F: Future<Output = RbwasmResult<(T, bool)>>,
    {
        debug!("Stage {} started", stage);
        self.observer.stage_started(stage);
        let mut running = Running {
            observer: self.observer,
            stage,
            finished: false,
        };
        let result = work.await;
        running.finished = true;

        let status = match result {
            Ok((_, true)) => StageStatus::SkippedCached,
            Ok((_, false)) => StageStatus::Executed,
            Err(_) => StageStatus::Failed,
        };
        self.record(stage, status);
        result
            .map(|(value, _)| value)
            .map_err(|error| Halt {
                stage: Some(stage),
                error,
            })
    }

    fn skip(&self, stage: Stage) {
        debug!("Stage {} skipped, cached", stage);
        self.record(stage, StageStatus::SkippedCached);
    }

    fn record(&self, stage: Stage, status: StageStatus) {
        self.observer.stage_finished(stage, status);
        self.stages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((stage, status));
    }

    fn into_stages(self) -> Vec<(Stage, StageStatus)> {
        self.stages.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

/// Reports a stage whose future was dropped before finishing
struct Running<'a> {
    observer: &'a dyn StageObserver,
    stage: Stage,
    finished: bool,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Stage {} cancelled", self.stage);
            self.observer.stage_cancelled(self.stage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComponentConfig;
    use crate::error::exit_codes;
    use crate::external::{Invocation, StepOutput};
    use crate::toolchain::archive::tests::tar_gz;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeFetcher {
        calls: AtomicUsize,
        /// Downloads of matching URLs take this long
        slow: Option<(&'static str, Duration)>,
        /// Downloads of matching URLs fail
        fail: Option<&'static str>,
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> RbwasmResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((pattern, delay)) = self.slow {
                if url.contains(pattern) {
                    std::thread::sleep(delay);
                }
            }
            if self.fail.is_some_and(|pattern| url.contains(pattern)) {
                return Err(RbwasmError::fetch(url, "connection reset"));
            }
            let bytes = tar_gz(&[
                ("pkg/bin/clang", b"clang"),
                ("pkg/bin/wasm-opt", b"opt"),
                ("pkg/lib/librb_wasm_support.a", b"ar"),
            ]);
            std::fs::write(dest, bytes).map_err(|e| RbwasmError::io("write", e))
        }
    }

    /// Stands in for every external tool: make installs a runtime tree
    /// into the configured destdir, anything with `-o` writes its output.
    #[derive(Default)]
    struct FakeTools {
        runs: Mutex<Vec<Invocation>>,
        fail: Option<&'static str>,
        /// Step that takes long enough for a concurrent stage to finish first
        slow: Option<&'static str>,
    }

    impl FakeTools {
        fn failing(step: &'static str) -> Self {
            Self {
                fail: Some(step),
                ..Default::default()
            }
        }

        fn descriptions(&self) -> Vec<String> {
            self.runs
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.description.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ExternalStep for FakeTools {
        async fn run(&self, invocation: &Invocation) -> RbwasmResult<StepOutput> {
            self.runs.lock().unwrap().push(invocation.clone());
            if self.slow == Some(invocation.description.as_str()) {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            let runs = self.runs.lock().unwrap();
            if self.fail == Some(invocation.description.as_str()) {
                return Ok(StepOutput::failure(2, vec!["fake failure".to_string()]));
            }
            if invocation.description == "make install" {
                let destdir = runs
                    .iter()
                    .rev()
                    .find_map(|r| r.arg_value("--with-destdir="))
                    .unwrap()
                    .to_string();
                let root = Path::new(&destdir).join("embd-root/ruby");
                std::fs::create_dir_all(root.join("bin")).unwrap();
                std::fs::create_dir_all(root.join("lib/ruby/3.0.0")).unwrap();
                std::fs::write(root.join("bin/ruby"), b"\0asm").unwrap();
                std::fs::write(root.join("lib/ruby/3.0.0/set.rb"), b"class Set; end").unwrap();
            }
            if let Some(out) = invocation.arg_after("-o") {
                std::fs::write(out, b"\0asm").unwrap();
            }
            Ok(StepOutput::success())
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl StageObserver for RecordingObserver {
        fn stage_started(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {}", stage));
        }

        fn stage_finished(&self, stage: Stage, status: StageStatus) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{} {}", status, stage));
        }

        fn stage_cancelled(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("cancel {}", stage));
        }
    }

    fn toolchain() -> ToolchainConfig {
        let component = |name: &str| ComponentConfig {
            name: name.to_string(),
            version: "1".to_string(),
            url: format!("https://example.com/{}.tar.gz", name),
            sha256: None,
        };
        ToolchainConfig {
            wasi_sdk: component("wasi-sdk"),
            binaryen: component("binaryen"),
            runtime_support: component("rb-wasm-support"),
            wasm_opt: None,
        }
    }

    struct Fixture {
        temp: TempDir,
        fetcher: Arc<FakeFetcher>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let src = temp.path().join("ruby-src");
            std::fs::create_dir_all(&src).unwrap();
            std::fs::write(src.join("configure"), b"#!/bin/sh\n").unwrap();
            let app = temp.path().join("app");
            std::fs::create_dir_all(&app).unwrap();
            std::fs::write(app.join("main.rb"), b"puts 1").unwrap();
            Self {
                temp,
                fetcher: Arc::new(FakeFetcher::default()),
            }
        }

        fn with_fetcher(fetcher: FakeFetcher) -> Self {
            Self {
                fetcher: Arc::new(fetcher),
                ..Self::new()
            }
        }

        fn pipeline(&self, tools: Arc<FakeTools>) -> Pipeline {
            let workspace = Workspace::create(self.temp.path().join("ws"), false).unwrap();
            Pipeline::new(workspace, toolchain(), self.fetcher.clone(), tools).with_jobs(2)
        }

        fn options(&self) -> PipelineOptions {
            let mut config = Config::default();
            config.build.runtime_source =
                format!("path:{}", self.temp.path().join("ruby-src").display());
            let mut options =
                PipelineOptions::from_config(&config, self.temp.path().join("ruby.wasm")).unwrap();
            options.builtin_files = false;
            options.mounts = vec![MountSpec::new(self.temp.path().join("app"), "/app")];
            options
        }
    }

    fn position(runs: &[String], name: &str) -> usize {
        runs.iter()
            .position(|r| r == name)
            .unwrap_or_else(|| panic!("{} was not run: {:?}", name, runs))
    }

    #[tokio::test]
    async fn full_run_executes_stages_in_dependency_order() {
        let fixture = Fixture::new();
        let tools = Arc::new(FakeTools::default());
        let observer = RecordingObserver::default();

        let result = fixture
            .pipeline(tools.clone())
            .run(&fixture.options(), &observer)
            .await;

        let output = result.outcome.as_ref().unwrap();
        assert!(output.is_file());
        // A local source tree with `configure` needs no acquisition work
        assert_eq!(result.status(Stage::Acquire), Some(StageStatus::SkippedCached));
        for stage in [
            Stage::Provision,
            Stage::Build,
            Stage::ImageBuild,
            Stage::Link,
            Stage::Transform,
        ] {
            assert_eq!(
                result.status(stage),
                Some(StageStatus::Executed),
                "{}",
                stage
            );
        }

        let runs = tools.descriptions();
        assert!(position(&runs, "./configure") < position(&runs, "make install"));
        assert!(position(&runs, "make install") < position(&runs, "wasm-ld"));
        assert!(position(&runs, "compile fs.c") < position(&runs, "wasm-ld"));
        assert!(position(&runs, "wasm-ld") < position(&runs, "wasm-opt --asyncify"));

        let events = observer.events.lock().unwrap();
        assert_eq!(events.len(), 12);
        assert_eq!(events.last().unwrap(), "ok transform");
    }

    #[tokio::test]
    async fn cached_install_skips_acquire_and_build() {
        let fixture = Fixture::new();
        let options = fixture.options();

        let first = fixture
            .pipeline(Arc::new(FakeTools::default()))
            .run(&options, &Silent)
            .await;
        assert!(first.is_success());
        let fetches = fixture.fetcher.calls.load(Ordering::SeqCst);

        let tools = Arc::new(FakeTools::default());
        let second = fixture.pipeline(tools.clone()).run(&options, &Silent).await;
        assert!(second.is_success());
        assert_eq!(second.status(Stage::Provision), Some(StageStatus::SkippedCached));
        assert_eq!(second.status(Stage::Acquire), Some(StageStatus::SkippedCached));
        assert_eq!(second.status(Stage::Build), Some(StageStatus::SkippedCached));
        assert_eq!(second.status(Stage::Link), Some(StageStatus::Executed));
        assert_eq!(fixture.fetcher.calls.load(Ordering::SeqCst), fetches);

        let runs = tools.descriptions();
        assert!(!runs.iter().any(|r| r == "./configure" || r == "make install"));
    }

    #[tokio::test]
    async fn build_failure_halts_before_link() {
        let fixture = Fixture::new();
        let tools = Arc::new(FakeTools::failing("make install"));
        let options = fixture.options();

        let result = fixture.pipeline(tools.clone()).run(&options, &Silent).await;

        assert_eq!(result.failed_stage(), Some(Stage::Build));
        assert!(result.not_run().contains(&Stage::Link));
        assert!(result.not_run().contains(&Stage::Transform));
        assert!(!tools.descriptions().iter().any(|r| r == "wasm-ld"));
        assert!(!options.output.exists());

        let err = result.into_outcome().unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::BUILD);
        assert!(err.to_string().contains("fake failure"));
    }

    #[tokio::test]
    async fn transform_failure_leaves_no_module() {
        let fixture = Fixture::new();
        let tools = Arc::new(FakeTools::failing("wasm-opt --asyncify"));
        let options = fixture.options();

        let result = fixture.pipeline(tools).run(&options, &Silent).await;

        assert_eq!(result.failed_stage(), Some(Stage::Transform));
        assert_eq!(result.status(Stage::Link), Some(StageStatus::Executed));
        assert!(!options.output.exists());
    }

    #[tokio::test]
    async fn builtin_files_are_packed_after_build() {
        let fixture = Fixture::new();
        let mut options = fixture.options();
        options.builtin_files = true;

        let result = fixture
            .pipeline(Arc::new(FakeTools::default()))
            .run(&options, &Silent)
            .await;

        assert!(result.is_success());
        let order: Vec<Stage> = result.stages.iter().map(|(s, _)| *s).collect();
        let build = order.iter().position(|s| *s == Stage::Build).unwrap();
        let image = order.iter().position(|s| *s == Stage::ImageBuild).unwrap();
        assert!(build < image);
    }

    #[tokio::test]
    async fn missing_mount_fails_image_build() {
        let fixture = Fixture::new();
        let tools = Arc::new(FakeTools::default());
        let mut options = fixture.options();
        options.mounts = vec![MountSpec::new(fixture.temp.path().join("nope"), "/app")];

        let result = fixture.pipeline(tools.clone()).run(&options, &Silent).await;

        assert_eq!(result.failed_stage(), Some(Stage::ImageBuild));
        assert!(!tools.descriptions().iter().any(|r| r == "wasm-ld"));
        assert_eq!(
            result.into_outcome().unwrap_err().exit_code(),
            exit_codes::VFS
        );
    }

    #[tokio::test]
    async fn image_failure_cancels_running_build() {
        let fixture = Fixture::new();
        let tools = Arc::new(FakeTools {
            slow: Some("./configure"),
            ..Default::default()
        });
        let observer = RecordingObserver::default();
        let mut options = fixture.options();
        options.mounts = vec![MountSpec::new(fixture.temp.path().join("nope"), "/app")];

        let result = fixture.pipeline(tools.clone()).run(&options, &observer).await;

        assert_eq!(result.failed_stage(), Some(Stage::ImageBuild));
        assert_eq!(result.status(Stage::Build), None);
        assert!(!tools.descriptions().iter().any(|r| r == "make install"));
        assert!(observer
            .events
            .lock()
            .unwrap()
            .contains(&"cancel build".to_string()));
        assert_eq!(
            result.into_outcome().unwrap_err().exit_code(),
            exit_codes::VFS
        );
    }

    #[tokio::test]
    async fn acquire_failure_cancels_provision() {
        let fixture = Fixture::with_fetcher(FakeFetcher {
            slow: Some(("example.com", Duration::from_millis(300))),
            fail: Some("api.github.com"),
            ..Default::default()
        });
        let tools = Arc::new(FakeTools::default());
        let mut options = fixture.options();
        options.source = "github:ruby/ruby@v3_0_2".parse().unwrap();

        let result = fixture.pipeline(tools.clone()).run(&options, &Silent).await;

        assert_eq!(result.failed_stage(), Some(Stage::Acquire));
        assert_eq!(result.status(Stage::Provision), None);
        assert_eq!(result.status(Stage::Build), None);
        assert!(tools.descriptions().is_empty());
        assert_eq!(
            result.into_outcome().unwrap_err().exit_code(),
            exit_codes::FETCH
        );
    }

    #[tokio::test]
    async fn reported_stage_matches_returned_error() {
        // Provision fails late, Acquire fails at once
        let fixture = Fixture::with_fetcher(FakeFetcher {
            slow: Some(("example.com", Duration::from_millis(100))),
            fail: Some("example.com"),
            ..Default::default()
        });
        std::fs::remove_file(fixture.temp.path().join("ruby-src/configure")).unwrap();

        let result = fixture
            .pipeline(Arc::new(FakeTools::default()))
            .run(&fixture.options(), &Silent)
            .await;

        let failed: Vec<Stage> = result
            .stages
            .iter()
            .filter(|(_, status)| *status == StageStatus::Failed)
            .map(|(stage, _)| *stage)
            .collect();
        assert_eq!(failed, vec![Stage::Acquire]);
        assert_eq!(result.failed_stage(), Some(Stage::Acquire));
        let err = result.into_outcome().unwrap_err();
        assert!(matches!(err, RbwasmError::InvalidBuildSource { .. }));
        assert_eq!(err.exit_code(), exit_codes::GENERAL);
    }

    #[tokio::test]
    async fn no_mounts_links_without_image() {
        let fixture = Fixture::new();
        let tools = Arc::new(FakeTools::default());
        let mut options = fixture.options();
        options.mounts.clear();
        options.preset_args = vec!["/app/main.rb".to_string()];

        let result = fixture.pipeline(tools.clone()).run(&options, &Silent).await;

        assert!(result.is_success());
        let runs = tools.descriptions();
        assert!(!runs.iter().any(|r| r == "compile fs.c"));
        assert!(runs.iter().any(|r| r == "compile preset-args.c"));
    }

    #[test]
    fn build_input_follows_options() {
        let mut config = Config::default();
        config.build.runtime_source = "path:/src/ruby".to_string();
        let mut options = PipelineOptions::from_config(&config, "out.wasm").unwrap();
        options.transient_heap_total_size = Some("1024".to_string());

        let input = options.build_input();
        assert_eq!(input.prefix, PathBuf::from("/embd-root/ruby"));
        assert_eq!(input.asyncify_stack_size, 6144);
        assert_eq!(input.transient_heap_total_size.as_deref(), Some("1024"));
    }
}
