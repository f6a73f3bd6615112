//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment with a scaffolded stack.
///
/// Each test gets its own state directory and local cloud.
pub struct TestEnv {
  pub temp: TempDir,
  pub stack_file: PathBuf,
}

impl TestEnv {
  /// Scaffold a stack with `sitestack init`.
  pub fn scaffolded() -> Self {
    let temp = TempDir::new().unwrap();
    let env = Self {
      stack_file: temp.path().join("site").join("stack.lua"),
      temp,
    };
    env.cmd().arg("init").arg(env.temp.path().join("site")).assert().success();
    env
  }

  /// Replace text in the stack file.
  pub fn edit_stack(&self, from: &str, to: &str) {
    let content = std::fs::read_to_string(&self.stack_file).unwrap();
    assert!(content.contains(from), "stack file does not contain {from:?}");
    std::fs::write(&self.stack_file, content.replace(from, to)).unwrap();
  }

  /// State directory root (snapshots, locks).
  pub fn data_path(&self) -> PathBuf {
    let p = self.temp.path().join("data");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Root of the local cloud.
  pub fn cloud_path(&self) -> PathBuf {
    let p = self.temp.path().join("cloud");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// A pre-configured command for the sitestack binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `SITESTACK_DATA`: isolated state directory
  /// - `SITESTACK_ROOT`: isolated local cloud
  pub fn cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("sitestack");
    cmd.env("SITESTACK_DATA", self.data_path());
    cmd.env("SITESTACK_ROOT", self.cloud_path());
    cmd.env_remove("SITESTACK_STACK");
    cmd.env_remove("SITESTACK_REGION");
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// Run `sitestack apply` on the stack file.
  pub fn apply(&self) -> assert_cmd::assert::Assert {
    self.cmd().arg("apply").arg(&self.stack_file).assert()
  }

  /// Parse JSON printed on stdout.
  pub fn json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).unwrap_or_else(|e| panic!("stdout is not JSON: {e}"))
  }
}
