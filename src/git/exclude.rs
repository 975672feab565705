//! Exclude-file manipulation over `<git-dir>/info/exclude`.
//!
//! Engine-managed entries live under a sentinel marker comment. Every write
//! integrity-checks the file before and after, goes through a temp file +
//! rename, and restores POSIX permissions where the platform honors them.
//! Multi-path operations never fail per-path: they partition results and
//! leave the decision to the caller, except when exclude integration is
//! disabled with `fallback_behavior = error`, which raises
//! [`PgitError::ExcludeDisabled`] for the orchestrator to pass through.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{PgitError, format_paths};
use crate::git::pattern;
use crate::git::repository::Repository;
use crate::styling::{eprintln, warning_message};
use crate::validate;

/// Hard ceiling on the exclude file size.
pub const MAX_EXCLUDE_FILE_SIZE: usize = 1024 * 1024;

/// Hard ceiling on a single exclude line.
pub const MAX_EXCLUDE_LINE_LENGTH: usize = 4096;

/// Hard ceiling on the exclude line count.
pub const MAX_EXCLUDE_LINES: usize = 10_000;

/// Marker comment used when the manifest does not override it.
pub const DEFAULT_MARKER_COMMENT: &str = "# pgit-cli managed exclusions";

/// Reaction when exclude work is requested while integration is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackBehavior {
    Silent,
    #[default]
    Warn,
    Error,
}

/// Manifest settings governing exclude-file behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludeSettings {
    pub enabled: bool,
    pub marker_comment: String,
    pub fallback_behavior: FallbackBehavior,
    pub validate_operations: bool,
}

impl Default for ExcludeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            marker_comment: DEFAULT_MARKER_COMMENT.to_string(),
            fallback_behavior: FallbackBehavior::default(),
            validate_operations: true,
        }
    }
}

/// Per-path outcome of a multi-path exclude operation.
#[derive(Debug, Default)]
pub struct ExcludePartition {
    pub successful: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl ExcludePartition {
    fn all_failed(paths: &[String], reason: &str) -> Self {
        Self {
            successful: Vec::new(),
            failed: paths
                .iter()
                .map(|p| (p.clone(), reason.to_string()))
                .collect(),
        }
    }
}

impl Repository {
    fn exclude_file_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.git_dir()?.join("info").join("exclude"))
    }

    /// Gate for every exclude mutation. Returns false when the operation
    /// should be skipped (disabled + silent/warn), raises when disabled with
    /// `fallback_behavior = error`.
    fn check_exclude_operation(&self, operation: &str, paths: &[String]) -> anyhow::Result<bool> {
        let settings = self.exclude_settings();
        if settings.enabled {
            return Ok(true);
        }
        match settings.fallback_behavior {
            FallbackBehavior::Silent => Ok(false),
            FallbackBehavior::Warn => {
                let reason = if paths.len() == 1 {
                    format!(
                        "Git exclude operation '{operation}' for '{}' skipped (exclude integration is disabled)",
                        paths[0]
                    )
                } else {
                    format!(
                        "Git exclude operation '{operation}' skipped (exclude integration is disabled) {}",
                        format_paths(paths)
                    )
                };
                eprintln!("{}", warning_message(format!("Warning: {reason}")));
                Ok(false)
            }
            FallbackBehavior::Error => Err(PgitError::ExcludeDisabled {
                operation: operation.to_string(),
                paths: paths.to_vec(),
            }
            .into()),
        }
    }

    /// Read the exclude file, integrity-checking its content. A missing file
    /// reads as empty.
    pub fn read_exclude_file(&self) -> anyhow::Result<String> {
        self.ensure_repository()?;
        Ok(self.try_read_exclude()?)
    }

    fn try_read_exclude(&self) -> Result<String, PgitError> {
        let path = self
            .exclude_file_path()
            .map_err(|e| PgitError::ExcludeGeneric {
                message: e.to_string(),
                paths: Vec::new(),
            })?;
        let content = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
            Err(e) => {
                return Err(PgitError::ExcludeAccess {
                    message: format!("cannot read {}: {e}", path.display()),
                    paths: Vec::new(),
                });
            }
        };
        let content = String::from_utf8(content).map_err(|_| PgitError::ExcludeCorruption {
            message: "exclude file contains non-UTF-8 bytes".to_string(),
        })?;
        integrity_check(&content)?;
        Ok(content)
    }

    /// Replace the exclude file content atomically, verifying integrity
    /// before and after the write. Empty content removes the file.
    pub fn write_exclude_file(&self, content: &str) -> anyhow::Result<()> {
        self.ensure_repository()?;
        Ok(self.try_write_exclude(content)?)
    }

    fn try_write_exclude(&self, content: &str) -> Result<(), PgitError> {
        integrity_check(content)?;
        let path = self
            .exclude_file_path()
            .map_err(|e| PgitError::ExcludeGeneric {
                message: e.to_string(),
                paths: Vec::new(),
            })?;

        if content.is_empty() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(PgitError::ExcludeAccess {
                        message: format!("cannot remove {}: {e}", path.display()),
                        paths: Vec::new(),
                    });
                }
            }
            return Ok(());
        }

        let info_dir = path.parent().expect("exclude path always has a parent");
        fs::create_dir_all(info_dir).map_err(|e| PgitError::ExcludeAccess {
            message: format!("cannot create {}: {e}", info_dir.display()),
            paths: Vec::new(),
        })?;
        set_permissions(info_dir, 0o755);

        let mut staged =
            tempfile::NamedTempFile::new_in(info_dir).map_err(|e| PgitError::ExcludeAccess {
                message: format!("cannot stage write in {}: {e}", info_dir.display()),
                paths: Vec::new(),
            })?;
        staged
            .write_all(content.as_bytes())
            .map_err(|e| PgitError::ExcludeAccess {
                message: format!("cannot write exclude content: {e}"),
                paths: Vec::new(),
            })?;
        staged.persist(&path).map_err(|e| PgitError::ExcludeAccess {
            message: format!("cannot replace {}: {}", path.display(), e.error),
            paths: Vec::new(),
        })?;
        set_permissions(&path, 0o644);

        // Post-write verification: what landed must pass the same checks
        let written = fs::read_to_string(&path).map_err(|e| PgitError::ExcludeAccess {
            message: format!("cannot re-read {}: {e}", path.display()),
            paths: Vec::new(),
        })?;
        integrity_check(&written)?;
        Ok(())
    }

    /// Add one path to the engine-managed exclude section.
    ///
    /// Returns whether the path is excluded afterwards (false when the
    /// operation was skipped or degraded).
    pub fn add_to_exclude(&self, path: &str) -> anyhow::Result<bool> {
        let partition = self.add_multiple_to_exclude(std::slice::from_ref(&path.to_string()))?;
        Ok(partition.successful.len() == 1)
    }

    /// Add several paths to the engine-managed exclude section.
    ///
    /// Per-path failures land in the partition; file-level access failures
    /// degrade the whole call into the failed set with a warning. Only
    /// integrity-check failures and `ExcludeDisabled` (fallback=error)
    /// propagate as errors.
    pub fn add_multiple_to_exclude(&self, paths: &[String]) -> anyhow::Result<ExcludePartition> {
        self.ensure_repository()?;
        if !self.check_exclude_operation("add", paths)? {
            return Ok(ExcludePartition::default());
        }

        let content = match self.try_read_exclude() {
            Ok(content) => content,
            Err(e @ PgitError::ExcludeCorruption { .. }) => return Err(e.into()),
            Err(e) => {
                warn_degraded(&e, paths);
                return Ok(ExcludePartition::all_failed(paths, &e.to_string()));
            }
        };

        let settings = self.exclude_settings();
        let existing: Vec<String> = non_comment_lines(&content).map(str::to_string).collect();

        let mut partition = ExcludePartition::default();
        let mut to_add: Vec<String> = Vec::new();
        for path in paths {
            if settings.validate_operations {
                if let Err(e) = validate::validate_path(self.work_dir(), path) {
                    partition.failed.push((path.clone(), e.to_string()));
                    continue;
                }
            }
            if existing.iter().any(|line| line == path) || to_add.contains(path) {
                // Already excluded; adding again must not duplicate the line
                partition.successful.push(path.clone());
                continue;
            }
            to_add.push(path.clone());
        }

        for warning in pattern::find_conflicts(&to_add, &existing)
            .into_iter()
            .chain(pattern::find_redundancies(&to_add, &existing))
        {
            log::warn!("exclude pattern overlap: {warning}");
        }

        if to_add.is_empty() {
            return Ok(partition);
        }

        let updated = append_entries(&content, &settings.marker_comment, &to_add);
        match self.try_write_exclude(&updated) {
            Ok(()) => partition.successful.extend(to_add),
            Err(e @ PgitError::ExcludeCorruption { .. }) => return Err(e.into()),
            Err(e) => {
                warn_degraded(&e, &to_add);
                let reason = e.to_string();
                partition
                    .failed
                    .extend(to_add.into_iter().map(|p| (p, reason.clone())));
            }
        }
        Ok(partition)
    }

    /// Remove one path from the exclude file. Removing an absent path is a
    /// no-op success.
    pub fn remove_from_exclude(&self, path: &str) -> anyhow::Result<bool> {
        let partition =
            self.remove_multiple_from_exclude(std::slice::from_ref(&path.to_string()))?;
        Ok(partition.successful.len() == 1)
    }

    /// Remove several paths. Drops the marker once no managed entries remain
    /// and removes the file entirely when it would become empty.
    pub fn remove_multiple_from_exclude(
        &self,
        paths: &[String],
    ) -> anyhow::Result<ExcludePartition> {
        self.ensure_repository()?;
        if !self.check_exclude_operation("remove", paths)? {
            return Ok(ExcludePartition::default());
        }

        let content = match self.try_read_exclude() {
            Ok(content) => content,
            Err(e @ PgitError::ExcludeCorruption { .. }) => return Err(e.into()),
            Err(e) => {
                warn_degraded(&e, paths);
                return Ok(ExcludePartition::all_failed(paths, &e.to_string()));
            }
        };

        let settings = self.exclude_settings();
        let updated = remove_entries(&content, &settings.marker_comment, paths);

        let mut partition = ExcludePartition::default();
        if updated == content {
            // Nothing to drop; removal of absent entries is a no-op
            partition.successful.extend(paths.iter().cloned());
            return Ok(partition);
        }

        match self.try_write_exclude(&updated) {
            Ok(()) => partition.successful.extend(paths.iter().cloned()),
            Err(e @ PgitError::ExcludeCorruption { .. }) => return Err(e.into()),
            Err(e) => {
                warn_degraded(&e, paths);
                let reason = e.to_string();
                partition
                    .failed
                    .extend(paths.iter().map(|p| (p.clone(), reason.clone())));
            }
        }
        Ok(partition)
    }

    /// Whether `path` appears as a literal entry in the exclude file.
    pub fn is_in_exclude(&self, path: &str) -> anyhow::Result<bool> {
        self.ensure_repository()?;
        let content = self.try_read_exclude()?;
        Ok(non_comment_lines(&content).any(|line| line == path))
    }

    /// All entries in the engine-managed section.
    pub fn pgit_managed_excludes(&self) -> anyhow::Result<Vec<String>> {
        self.ensure_repository()?;
        let content = self.try_read_exclude()?;
        Ok(managed_entries(
            &content,
            &self.exclude_settings().marker_comment,
        ))
    }
}

fn warn_degraded(err: &PgitError, paths: &[String]) {
    eprintln!(
        "{}",
        warning_message(format!("Warning: {err} {}", format_paths(paths)))
    );
}

#[cfg(unix)]
fn set_permissions(path: &std::path::Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        log::debug!("failed to set permissions on {}: {e}", path.display());
    }
}

#[cfg(not(unix))]
fn set_permissions(_path: &std::path::Path, _mode: u32) {}

/// Validate exclude-file content against the hard limits.
fn integrity_check(content: &str) -> Result<(), PgitError> {
    let corrupt = |message: String| PgitError::ExcludeCorruption { message };

    if content.len() > MAX_EXCLUDE_FILE_SIZE {
        return Err(corrupt(format!(
            "file exceeds {MAX_EXCLUDE_FILE_SIZE} bytes"
        )));
    }
    if content.contains('\0') {
        return Err(corrupt("file contains NUL bytes".to_string()));
    }
    let mut count = 0usize;
    for line in content.lines() {
        count += 1;
        let line = line.trim_end_matches('\r');
        if line.len() > MAX_EXCLUDE_LINE_LENGTH {
            return Err(corrupt(format!(
                "line {count} exceeds {MAX_EXCLUDE_LINE_LENGTH} bytes"
            )));
        }
        if line.chars().any(|c| c < '\u{20}' || c == '\u{7f}') {
            return Err(corrupt(format!("line {count} contains control characters")));
        }
    }
    if count > MAX_EXCLUDE_LINES {
        return Err(corrupt(format!("file exceeds {MAX_EXCLUDE_LINES} lines")));
    }
    Ok(())
}

fn non_comment_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Entries following the marker line (the engine-managed section).
fn managed_entries(content: &str, marker: &str) -> Vec<String> {
    let mut seen_marker = false;
    let mut entries = Vec::new();
    for line in content.lines().map(|l| l.trim_end_matches('\r')) {
        if line == marker {
            seen_marker = true;
            continue;
        }
        if seen_marker && !line.is_empty() && !line.starts_with('#') {
            entries.push(line.to_string());
        }
    }
    entries
}

/// Append entries under the marker, creating the marker if absent.
fn append_entries(content: &str, marker: &str, entries: &[String]) -> String {
    let mut updated = content.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    let has_marker = content
        .lines()
        .any(|line| line.trim_end_matches('\r') == marker);
    if !has_marker {
        updated.push_str(marker);
        updated.push('\n');
    }
    for entry in entries {
        updated.push_str(entry);
        updated.push('\n');
    }
    updated
}

/// Remove `targets` wherever they appear; drop the marker once its section
/// is empty; collapse to the empty string when nothing meaningful remains.
fn remove_entries(content: &str, marker: &str, targets: &[String]) -> String {
    let kept: Vec<&str> = content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !targets.iter().any(|t| t == line))
        .collect();

    let remaining_managed = {
        let rejoined = kept.join("\n");
        managed_entries(&rejoined, marker)
    };

    let mut lines: Vec<&str> = kept;
    if remaining_managed.is_empty() {
        lines.retain(|line| *line != marker);
    }

    if lines.iter().all(|line| line.trim().is_empty()) {
        return String::new();
    }
    let mut updated = lines.join("\n");
    updated.push('\n');
    updated
}
