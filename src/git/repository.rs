//! Repository - subprocess git bound to one working directory.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, bail};

use crate::errors::PgitError;
use crate::git::exclude::ExcludeSettings;

/// Reset modes the engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    Soft,
    Mixed,
    Hard,
}

impl ResetMode {
    fn as_flag(self) -> &'static str {
        match self {
            ResetMode::Soft => "--soft",
            ResetMode::Mixed => "--mixed",
            ResetMode::Hard => "--hard",
        }
    }
}

/// One `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub index: char,
    pub worktree: char,
    pub path: String,
}

impl StatusEntry {
    pub fn is_staged(&self) -> bool {
        self.index != ' ' && self.index != '?'
    }

    pub fn is_untracked(&self) -> bool {
        self.index == '?' && self.worktree == '?'
    }

    pub fn is_modified(&self) -> bool {
        self.worktree == 'M' || self.index == 'M'
    }
}

/// Structured summary of `git status --porcelain`.
#[derive(Debug, Clone, Default)]
pub struct GitStatus {
    pub entries: Vec<StatusEntry>,
}

impl GitStatus {
    pub fn entry_for(&self, path: &str) -> Option<&StatusEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Git repository state for engine operations.
///
/// Bound to one working directory for its whole life. The secondary (private)
/// repository uses [`Repository::storage`], which runs every command with an
/// explicit `--git-dir`/`--work-tree` pair so no `.git` directory ever nests
/// inside the storage tree.
#[derive(Debug, Clone)]
pub struct Repository {
    work_dir: PathBuf,
    /// Set for the storage-rooted secondary repository.
    detached_git_dir: Option<PathBuf>,
    exclude_settings: ExcludeSettings,
}

impl Repository {
    /// Adapter over the primary repository at `work_dir`.
    pub fn at(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            detached_git_dir: None,
            exclude_settings: ExcludeSettings::default(),
        }
    }

    /// Adapter over the secondary repository: git directory at `git_dir`,
    /// working tree at `work_tree`.
    pub fn storage(git_dir: impl Into<PathBuf>, work_tree: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_tree.into(),
            detached_git_dir: Some(git_dir.into()),
            exclude_settings: ExcludeSettings::default(),
        }
    }

    /// Replace the exclude settings this adapter consults.
    pub fn with_exclude_settings(mut self, settings: ExcludeSettings) -> Self {
        self.exclude_settings = settings;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub(super) fn exclude_settings(&self) -> &ExcludeSettings {
        &self.exclude_settings
    }

    // =========================================================================
    // Command execution
    // =========================================================================

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("git");
        if let Some(git_dir) = &self.detached_git_dir {
            cmd.arg("--git-dir").arg(git_dir);
            cmd.arg("--work-tree").arg(&self.work_dir);
        }
        cmd.current_dir(&self.work_dir);
        cmd
    }

    pub(super) fn run_command_output(
        &self,
        args: &[&str],
    ) -> anyhow::Result<std::process::Output> {
        log::debug!("$ git {} [{}]", args.join(" "), self.work_dir.display());
        self.base_command()
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute: git {}", args.join(" ")))
    }

    /// Run a git command, returning stdout on success and the trimmed
    /// stderr/stdout as the error message otherwise.
    pub fn run_command(&self, args: &[&str]) -> anyhow::Result<String> {
        let output = self.run_command_output(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Some git commands print errors to stdout (e.g., `commit` with
            // nothing to commit)
            let stdout = String::from_utf8_lossy(&output.stdout);
            let error_msg = [stderr.trim(), stdout.trim()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            bail!("{}", error_msg);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a git command and return whether it exited 0.
    pub fn run_command_check(&self, args: &[&str]) -> anyhow::Result<bool> {
        Ok(self.run_command_output(args)?.status.success())
    }

    // =========================================================================
    // Repository lifecycle
    // =========================================================================

    pub fn is_repository(&self) -> bool {
        self.run_command_check(&["rev-parse", "--git-dir"])
            .unwrap_or(false)
    }

    /// Raise [`PgitError::RepositoryNotFound`] unless this directory is a
    /// repository. Every index and exclude method calls through here.
    pub fn ensure_repository(&self) -> anyhow::Result<()> {
        if !self.is_repository() {
            return Err(PgitError::RepositoryNotFound {
                path: self.work_dir.clone(),
            }
            .into());
        }
        Ok(())
    }

    pub fn init_repository(&self) -> anyhow::Result<()> {
        if let Some(git_dir) = &self.detached_git_dir {
            if let Some(parent) = git_dir.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        self.run_command(&["init", "--quiet"])
            .map_err(|e| vcs_error("init", e))?;
        Ok(())
    }

    /// Resolve the git directory as an absolute path.
    pub fn git_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(git_dir) = &self.detached_git_dir {
            return Ok(git_dir.clone());
        }
        let stdout = self.run_command(&["rev-parse", "--git-dir"])?;
        let path = PathBuf::from(stdout.trim());
        let absolute = if path.is_relative() {
            self.work_dir.join(path)
        } else {
            path
        };
        dunce::canonicalize(&absolute).context("Failed to resolve git directory")
    }

    // =========================================================================
    // Status and index
    // =========================================================================

    pub fn status(&self) -> anyhow::Result<GitStatus> {
        self.ensure_repository()?;
        let stdout = self
            .run_command(&["status", "--porcelain"])
            .map_err(|e| vcs_error("status", e))?;
        Ok(parse_porcelain(&stdout))
    }

    pub fn add(&self, paths: &[&str]) -> anyhow::Result<()> {
        self.ensure_repository()?;
        let mut args = vec!["add", "--"];
        args.extend(paths);
        self.run_command(&args).map_err(|e| vcs_error("add", e))?;
        Ok(())
    }

    /// Remove paths from the index. With `keep_working_copy` the files stay
    /// on disk (`git rm --cached`); without it they are deleted too.
    pub fn remove_from_index(&self, paths: &[&str], keep_working_copy: bool) -> anyhow::Result<()> {
        self.ensure_repository()?;
        let mut args = vec!["rm", "-r", "-q"];
        if keep_working_copy {
            args.push("--cached");
        } else {
            args.push("-f");
        }
        args.push("--");
        args.extend(paths);
        if let Err(e) = self.run_command(&args) {
            return Err(PgitError::VcsIndex {
                paths: paths.iter().map(|p| p.to_string()).collect(),
                message: e.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn reset(&self, mode: ResetMode, commit: &str) -> anyhow::Result<()> {
        self.ensure_repository()?;
        self.run_command(&["reset", "--quiet", mode.as_flag(), commit])
            .map_err(|e| vcs_error("reset", e))?;
        Ok(())
    }

    pub fn is_tracked(&self, path: &str) -> anyhow::Result<bool> {
        self.ensure_repository()?;
        self.run_command_check(&["ls-files", "--error-unmatch", "--", path])
    }

    // =========================================================================
    // Commits
    // =========================================================================

    pub fn commit(&self, message: &str) -> anyhow::Result<String> {
        self.ensure_repository()?;
        self.run_command(&["commit", "--quiet", "-m", message])
            .map_err(|e| vcs_error("commit", e))?;
        let hash = self
            .run_command(&["rev-parse", "HEAD"])
            .map_err(|e| vcs_error("rev-parse", e))?;
        Ok(hash.trim().to_string())
    }

    /// Stage `paths` and commit them with a synthesized message.
    pub fn add_and_commit(&self, paths: &[&str], base_message: &str) -> anyhow::Result<String> {
        let owned: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        self.add(paths)?;
        self.commit(&build_commit_message(base_message, &owned))
    }
}

fn vcs_error(operation: &str, err: anyhow::Error) -> anyhow::Error {
    PgitError::VcsOperation {
        operation: operation.to_string(),
        message: err.to_string(),
    }
    .into()
}

fn parse_porcelain(stdout: &str) -> GitStatus {
    let mut entries = Vec::new();
    for line in stdout.lines() {
        if line.len() < 4 {
            continue;
        }
        let mut chars = line.chars();
        let index = chars.next().unwrap_or(' ');
        let worktree = chars.next().unwrap_or(' ');
        let rest = &line[3..];
        // Renames are reported as "old -> new"; the new path is the live one
        let path = rest
            .split_once(" -> ")
            .map(|(_, new)| new)
            .unwrap_or(rest)
            .trim_matches('"')
            .to_string();
        entries.push(StatusEntry {
            index,
            worktree,
            path,
        });
    }
    GitStatus { entries }
}

/// Synthesize the secondary-repository commit message.
///
/// A single path commits as `"<base>: <path>"`. A batch lists the files
/// grouped and sorted by parent directory (root entries bare, others as
/// `dir/name`) and closes with a `Total:` summary line.
pub fn build_commit_message(base: &str, paths: &[String]) -> String {
    if paths.len() == 1 {
        return format!("{base}: {}", paths[0]);
    }

    let mut keyed: Vec<(String, String, String)> = paths
        .iter()
        .map(|p| {
            let (dir, name) = match p.rsplit_once('/') {
                Some((dir, name)) => (dir.to_string(), name.to_string()),
                None => (String::new(), p.clone()),
            };
            let display = if dir.is_empty() {
                name.clone()
            } else {
                format!("{dir}/{name}")
            };
            (dir, name, display)
        })
        .collect();
    keyed.sort();

    let directories: std::collections::BTreeSet<&str> = keyed
        .iter()
        .filter(|(dir, _, _)| !dir.is_empty())
        .map(|(dir, _, _)| dir.as_str())
        .collect();

    let mut message = format!("{base}\n\nFiles added:\n");
    for (_, _, display) in &keyed {
        message.push_str(display);
        message.push('\n');
    }
    message.push('\n');
    message.push_str(&format!("Total: {} file(s)", paths.len()));
    if !directories.is_empty() {
        let n = directories.len();
        let noun = if n == 1 { "directory" } else { "directories" };
        message.push_str(&format!(", {n} {noun} affected"));
    }
    message
}
