//! Pipeline properties through the public API, with fake tools

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use rbwasm::config::{ComponentConfig, Config, ToolchainConfig};
use rbwasm::external::{ExternalStep, Invocation, StepOutput};
use rbwasm::pipeline::{Pipeline, PipelineOptions, Silent, Stage, StageStatus};
use rbwasm::toolchain::Fetcher;
use rbwasm::vfs::{MountSpec, VfsImage};
use rbwasm::workspace::Workspace;
use rbwasm::{RbwasmError, RbwasmResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

struct ToolchainArchive;

impl Fetcher for ToolchainArchive {
    fn fetch(&self, _url: &str, dest: &Path) -> RbwasmResult<()> {
        let bytes = tar_gz(&[
            ("release/bin/clang", b"clang"),
            ("release/bin/wasm-opt", b"opt"),
            ("release/lib/librb_wasm_support.a", b"ar"),
        ]);
        std::fs::write(dest, bytes).map_err(|e| RbwasmError::io("writing archive", e))
    }
}

/// Records every invocation; `fs.c` sources are decoded back into images
#[derive(Default)]
struct FakeTools {
    runs: Mutex<Vec<Invocation>>,
    images: Mutex<Vec<Vec<u8>>>,
    fail: Option<&'static str>,
}

#[async_trait]
impl ExternalStep for FakeTools {
    async fn run(&self, invocation: &Invocation) -> RbwasmResult<StepOutput> {
        let mut runs = self.runs.lock().unwrap();
        runs.push(invocation.clone());
        if self.fail == Some(invocation.description.as_str()) {
            return Ok(StepOutput::failure(1, vec!["tool failed".to_string()]));
        }
        match invocation.description.as_str() {
            "make install" => {
                let destdir = runs
                    .iter()
                    .rev()
                    .find_map(|r| r.arg_value("--with-destdir="))
                    .unwrap()
                    .to_string();
                let bin = Path::new(&destdir).join("embd-root/ruby/bin");
                std::fs::create_dir_all(&bin).unwrap();
                std::fs::write(bin.join("ruby"), b"\0asm").unwrap();
            }
            "compile fs.c" => {
                let c_file = invocation.arg_after("-c").unwrap();
                let source = std::fs::read_to_string(c_file).unwrap();
                self.images.lock().unwrap().push(decode_c_bytes(&source));
            }
            _ => {}
        }
        if let Some(out) = invocation.arg_after("-o") {
            std::fs::write(out, b"\0asm").unwrap();
        }
        Ok(StepOutput::success())
    }
}

/// Inverse of the byte-array C rendering
fn decode_c_bytes(source: &str) -> Vec<u8> {
    let len: usize = source
        .lines()
        .find_map(|l| l.strip_prefix("const size_t rbwasm_vfs_image_len = "))
        .and_then(|v| v.trim_end_matches(';').parse().ok())
        .unwrap();
    let mut bytes: Vec<u8> = source
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter_map(|t| t.strip_prefix("0x"))
        .map(|h| u8::from_str_radix(h, 16).unwrap())
        .collect();
    bytes.truncate(len);
    bytes
}

fn toolchain() -> ToolchainConfig {
    let component = |name: &str| ComponentConfig {
        name: name.to_string(),
        version: "0".to_string(),
        url: format!("https://example.invalid/{}.tar.gz", name),
        sha256: None,
    };
    ToolchainConfig {
        wasi_sdk: component("wasi-sdk"),
        binaryen: component("binaryen"),
        runtime_support: component("support"),
        wasm_opt: None,
    }
}

fn setup(temp: &TempDir) -> PipelineOptions {
    let src = temp.path().join("ruby");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("configure"), b"#!/bin/sh\n").unwrap();

    let lib = temp.path().join("lib");
    std::fs::create_dir_all(lib.join("sub")).unwrap();
    std::fs::write(lib.join("a.txt"), b"hi").unwrap();
    std::fs::write(lib.join("sub/b.txt"), b"yo").unwrap();

    let mut config = Config::default();
    config.build.runtime_source = format!("path:{}", src.display());
    config.vfs.builtin_files = false;
    let mut options = PipelineOptions::from_config(&config, temp.path().join("out.wasm")).unwrap();
    options.mounts = vec![MountSpec::new(lib, "/lib")];
    options
}

fn pipeline(temp: &TempDir, tools: Arc<FakeTools>) -> Pipeline {
    let workspace = Workspace::create(temp.path().join("ws"), false).unwrap();
    Pipeline::new(workspace, toolchain(), Arc::new(ToolchainArchive), tools).with_jobs(1)
}

#[tokio::test]
async fn embedded_image_matches_mounts() {
    let temp = TempDir::new().unwrap();
    let options = setup(&temp);
    let tools = Arc::new(FakeTools::default());

    let result = pipeline(&temp, tools.clone()).run(&options, &Silent).await;
    assert_eq!(result.outcome.as_deref().ok(), Some(options.output.as_path()));

    let images = tools.images.lock().unwrap();
    assert_eq!(images.len(), 1);
    let image = VfsImage::parse(&images[0]).unwrap();
    let paths: Vec<&str> = image.entries().iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["/lib", "/lib/a.txt", "/lib/sub", "/lib/sub/b.txt"]);
    assert_eq!(image.data(), b"hiyo");
}

#[tokio::test]
async fn link_waits_for_build_and_image() {
    let temp = TempDir::new().unwrap();
    let options = setup(&temp);
    let tools = Arc::new(FakeTools::default());

    let result = pipeline(&temp, tools.clone()).run(&options, &Silent).await;
    assert!(result.is_success());

    let order: Vec<Stage> = result.stages.iter().map(|(stage, _)| *stage).collect();
    let index = |stage| order.iter().position(|s| *s == stage).unwrap();
    assert!(index(Stage::Build) < index(Stage::Link));
    assert!(index(Stage::ImageBuild) < index(Stage::Link));
    assert!(index(Stage::Link) < index(Stage::Transform));

    let runs = tools.runs.lock().unwrap();
    let names: Vec<&str> = runs.iter().map(|r| r.description.as_str()).collect();
    assert_eq!(
        &names[names.len() - 3..],
        ["compile fs.c", "wasm-ld", "wasm-opt --asyncify"]
    );
}

#[tokio::test]
async fn configure_failure_produces_no_module() {
    let temp = TempDir::new().unwrap();
    let options = setup(&temp);
    let tools = Arc::new(FakeTools {
        fail: Some("./configure"),
        ..Default::default()
    });

    let result = pipeline(&temp, tools.clone()).run(&options, &Silent).await;

    assert_eq!(result.failed_stage(), Some(Stage::Build));
    assert_eq!(result.status(Stage::Provision), Some(StageStatus::Executed));
    assert!(result.status(Stage::Link).is_none());
    assert!(!options.output.exists());
    let runs = tools.runs.lock().unwrap();
    assert!(!runs.iter().any(|r| r.description == "make install"));
    assert!(!runs.iter().any(|r| r.description == "wasm-ld"));
    drop(runs);

    let err = result.into_outcome().unwrap_err();
    assert_eq!(err.exit_code(), rbwasm::error::exit_codes::BUILD);
}

#[tokio::test]
async fn retry_after_link_failure_reuses_cache() {
    let temp = TempDir::new().unwrap();
    let options = setup(&temp);

    let failing = Arc::new(FakeTools {
        fail: Some("wasm-ld"),
        ..Default::default()
    });
    let first = pipeline(&temp, failing).run(&options, &Silent).await;
    assert_eq!(first.failed_stage(), Some(Stage::Link));
    assert!(!options.output.exists());

    let tools = Arc::new(FakeTools::default());
    let second = pipeline(&temp, tools.clone()).run(&options, &Silent).await;
    assert!(second.is_success());
    assert_eq!(second.status(Stage::Build), Some(StageStatus::SkippedCached));
    assert!(options.output.is_file());
    assert!(!tools
        .runs
        .lock()
        .unwrap()
        .iter()
        .any(|r| r.description == "./configure"));
}

#[tokio::test]
async fn preset_args_are_embedded() {
    let temp = TempDir::new().unwrap();
    let mut options = setup(&temp);
    options.preset_args = vec!["/lib/a.txt".to_string()];
    let tools = Arc::new(FakeTools::default());

    let result = pipeline(&temp, tools.clone()).run(&options, &Silent).await;
    assert!(result.is_success());

    let runs = tools.runs.lock().unwrap();
    let link = runs.iter().find(|r| r.description == "wasm-ld").unwrap();
    let objects: Vec<PathBuf> = link
        .args
        .iter()
        .filter(|a| a.ends_with(".o"))
        .map(PathBuf::from)
        .collect();
    let names: Vec<_> = objects
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["fs.o", "preset-args.o"]);
}
