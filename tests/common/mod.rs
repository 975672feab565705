#![allow(dead_code)]

//! Test harness for pgit integration tests.
//!
//! `TestRepo` creates an isolated git repository in a temporary directory
//! with deterministic configuration. Git commands run with a scrubbed
//! environment (no host `GIT_*` variables, no global or system config) so
//! tests are hermetic and thread-safe; the `pgit` binary is invoked the same
//! way via [`TestRepo::pgit`].

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// Deterministic epoch used for timestamps in assertions (2025-01-02T00:00:00Z).
pub const TEST_EPOCH: u64 = 1735776000;

/// Null device path, platform-appropriate. Used to disable global/system
/// git config in tests.
#[cfg(windows)]
const NULL_DEVICE: &str = "NUL";
#[cfg(not(windows))]
const NULL_DEVICE: &str = "/dev/null";

/// An isolated git repository for one test.
pub struct TestRepo {
    _dir: TempDir,
    path: PathBuf,
}

impl TestRepo {
    /// Fresh repository with one initial commit (`README.md` on `main`).
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        // Canonicalize so symlink-target assertions survive macOS /var -> /private/var
        let path = dunce::canonicalize(dir.path()).expect("canonicalize temp dir");

        let repo = Self { _dir: dir, path };
        repo.git(&["init", "--quiet", "-b", "main"]);
        repo.git(&["config", "user.name", "Test User"]);
        repo.git(&["config", "user.email", "test@example.com"]);
        repo.write_file("README.md", "# test repo\n");
        repo.git(&["add", "README.md"]);
        repo.git(&["commit", "--quiet", "-m", "Initial commit"]);
        repo
    }

    /// Repository root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scrub_environment(cmd: &mut Command) {
        for (key, _) in std::env::vars_os() {
            let name = key.to_string_lossy().into_owned();
            if name.starts_with("GIT_") || name.starts_with("PGIT_") {
                cmd.env_remove(&name);
            }
        }
        cmd.env("GIT_CONFIG_GLOBAL", NULL_DEVICE)
            .env("GIT_CONFIG_SYSTEM", NULL_DEVICE)
            .env("GIT_AUTHOR_NAME", "Test User")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test User")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .env("GIT_AUTHOR_DATE", "2025-01-02T00:00:00Z")
            .env("GIT_COMMITTER_DATE", "2025-01-02T00:00:00Z")
            .env("PGIT_TEST_EPOCH", TEST_EPOCH.to_string());
    }

    /// Run git in the repository, asserting success.
    pub fn git(&self, args: &[&str]) -> String {
        let output = self.git_output(args);
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// Run git in the repository, returning the raw output.
    pub fn git_output(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new("git");
        Self::scrub_environment(&mut cmd);
        cmd.args(args)
            .current_dir(&self.path)
            .output()
            .expect("spawn git")
    }

    /// Run git against the secondary (private) repository.
    pub fn private_git(&self, args: &[&str]) -> Output {
        let mut full: Vec<String> = vec![
            "--git-dir".into(),
            self.path.join(".git-private").to_string_lossy().into_owned(),
            "--work-tree".into(),
            self.path
                .join(".private-storage")
                .to_string_lossy()
                .into_owned(),
        ];
        full.extend(args.iter().map(|a| a.to_string()));
        let refs: Vec<&str> = full.iter().map(String::as_str).collect();
        self.git_output(&refs)
    }

    /// Build a `pgit` invocation rooted at this repository with the same
    /// scrubbed environment git gets.
    pub fn pgit(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_pgit"));
        Self::scrub_environment(&mut cmd);
        cmd.args(args).current_dir(&self.path);
        cmd
    }

    /// Run `pgit`, returning the raw output.
    pub fn run_pgit(&self, args: &[&str]) -> Output {
        self.pgit(args).output().expect("spawn pgit")
    }

    /// Run `pgit`, asserting a zero exit.
    pub fn run_pgit_ok(&self, args: &[&str]) -> Output {
        let output = self.run_pgit(args);
        assert!(
            output.status.success(),
            "pgit {args:?} failed\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        output
    }

    /// Write a file under the repository root, creating parents.
    pub fn write_file(&self, relative: &str, content: &str) {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parents");
        }
        std::fs::write(path, content).expect("write file");
    }

    /// Commit a file into the primary repository.
    pub fn commit_file(&self, relative: &str, content: &str, message: &str) {
        self.write_file(relative, content);
        self.git(&["add", relative]);
        self.git(&["commit", "--quiet", "-m", message]);
    }

    /// Content of `.git/info/exclude`, empty if missing.
    pub fn exclude_content(&self) -> String {
        std::fs::read_to_string(self.path.join(".git/info/exclude")).unwrap_or_default()
    }

    /// Parsed manifest JSON, if present.
    pub fn manifest_json(&self) -> Option<serde_json::Value> {
        let raw = std::fs::read_to_string(self.path.join(".private-config.json")).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Tracked paths recorded in the manifest.
    pub fn tracked_paths(&self) -> Vec<String> {
        self.manifest_json()
            .and_then(|json| {
                json["trackedPaths"].as_array().map(|paths| {
                    paths
                        .iter()
                        .filter_map(|p| p.as_str().map(str::to_string))
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    /// Rewrite one field of the manifest's `gitExclude` settings.
    pub fn set_git_exclude_setting(&self, field: &str, value: serde_json::Value) {
        let path = self.path.join(".private-config.json");
        let raw = std::fs::read_to_string(&path).expect("manifest exists");
        let mut json: serde_json::Value = serde_json::from_str(&raw).expect("manifest parses");
        json["settings"]["gitExclude"][field] = value;
        std::fs::write(&path, serde_json::to_string_pretty(&json).unwrap()).unwrap();
    }

    /// Whether `relative` is a symlink.
    pub fn is_symlink(&self, relative: &str) -> bool {
        self.path
            .join(relative)
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    /// Whether `relative` is a regular file.
    pub fn is_regular_file(&self, relative: &str) -> bool {
        self.path
            .join(relative)
            .symlink_metadata()
            .map(|m| m.is_file())
            .unwrap_or(false)
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Fresh repository fixture.
#[rstest::fixture]
pub fn repo() -> TestRepo {
    TestRepo::new()
}

/// Repository already initialized for private tracking (`pgit init`).
#[rstest::fixture]
pub fn initialized_repo(repo: TestRepo) -> TestRepo {
    repo.run_pgit_ok(&["init"]);
    repo
}
