//! Integration tests for rbwasm

mod pipeline;

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated from the user's config and workspace
    fn rbwasm(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("rbwasm");
        cmd.env("RBWASM_CONFIG", temp.path().join("config.toml"))
            .env("RBWASM_ROOT", temp.path().join("ws"))
            .env_remove("RBWASM_DEBUG");
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        rbwasm(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Ruby to WebAssembly"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        rbwasm(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("rbwasm"));
    }

    #[test]
    fn build_help_lists_mapdir() {
        let temp = TempDir::new().unwrap();
        rbwasm(&temp)
            .args(["build", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--mapdir"))
            .stdout(predicate::str::contains("HOST::GUEST"));
    }

    #[test]
    fn config_path_follows_env() {
        let temp = TempDir::new().unwrap();
        rbwasm(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let temp = TempDir::new().unwrap();
        rbwasm(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[build]"))
            .stdout(predicate::str::contains("stack_size = 16777216"));
    }

    #[test]
    fn config_init_creates_file() {
        let temp = TempDir::new().unwrap();
        rbwasm(&temp).args(["config", "init"]).assert().success();
        assert!(temp.path().join("config.toml").is_file());

        rbwasm(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--force"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[build\n").unwrap();
        rbwasm(&temp)
            .args(["config", "show"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn cache_list_empty() {
        let temp = TempDir::new().unwrap();
        rbwasm(&temp)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries"));
    }

    #[test]
    fn cache_list_json_empty() {
        let temp = TempDir::new().unwrap();
        rbwasm(&temp)
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("[]"));
    }

    #[test]
    fn build_rejects_malformed_mapdir() {
        let temp = TempDir::new().unwrap();
        rbwasm(&temp)
            .args(["build", "--mapdir", "./lib"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Invalid mount specification"));
    }

    #[test]
    fn build_rejects_unknown_source_in_config() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            "[build]\nruntime_source = \"svn:ruby\"\n",
        )
        .unwrap();
        rbwasm(&temp)
            .args(["build"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid build source"));
        assert!(!temp.path().join("ruby.wasm").exists());
    }
}
