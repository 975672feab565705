//! Per-path VCS state snapshots for rollback fidelity.

use crate::git::repository::Repository;
use crate::utils;

/// State of one path in the primary repository, captured at the start of an
/// orchestrated operation and replayed on rollback.
///
/// The engine guarantees that if rollback fires, the path's
/// `(is_tracked, is_staged, is_excluded)` triple is restored to what this
/// record held, modulo graceful-degradation warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVcsState {
    pub is_tracked: bool,
    pub is_staged: bool,
    pub is_modified: bool,
    pub is_untracked: bool,
    pub is_excluded: bool,
    pub original_path: String,
    pub timestamp: u64,
}

impl Repository {
    /// Capture the current VCS state of `path`.
    pub fn get_file_state(&self, path: &str) -> anyhow::Result<FileVcsState> {
        self.ensure_repository()?;

        let is_tracked = self.is_tracked(path)?;
        let status = self.status()?;
        let entry = status.entry_for(path);

        Ok(FileVcsState {
            is_tracked,
            is_staged: entry.map(|e| e.is_staged()).unwrap_or(false),
            is_modified: entry.map(|e| e.is_modified()).unwrap_or(false),
            is_untracked: entry.map(|e| e.is_untracked()).unwrap_or(false),
            is_excluded: self.is_in_exclude(path)?,
            original_path: path.to_string(),
            timestamp: utils::get_now(),
        })
    }

    /// Alias used at snapshot time; reads better at call sites that record
    /// state explicitly for later restoration.
    pub fn record_original_state(&self, path: &str) -> anyhow::Result<FileVcsState> {
        self.get_file_state(path)
    }

    /// Drive `path` back to the `(is_tracked, is_staged, is_excluded)` triple
    /// held in `state`.
    ///
    /// Exclude restoration degrades gracefully (the exclude methods partition
    /// failures); index restoration errors propagate so the rollback driver
    /// can log them against the original failure.
    pub fn restore_original_state(&self, path: &str, state: &FileVcsState) -> anyhow::Result<()> {
        self.ensure_repository()?;

        let current = self.get_file_state(path)?;

        // `is_tracked` probes the index itself, which is the reliable
        // discriminator here: a staged deletion reads as "staged" in
        // porcelain output while the entry is already gone from the index.
        let want_in_index = state.is_tracked || state.is_staged;
        if want_in_index && !current.is_tracked {
            // Forced: the path may sit in the just-restored exclude file, and
            // restoration must win over ignore rules
            self.run_command(&["add", "--force", "--", path])?;
        } else if !want_in_index && current.is_tracked {
            self.remove_from_index(&[path], true)?;
        }

        if state.is_excluded && !current.is_excluded {
            self.add_to_exclude(path)?;
        } else if !state.is_excluded && current.is_excluded {
            self.remove_from_exclude(path)?;
        }

        Ok(())
    }
}
