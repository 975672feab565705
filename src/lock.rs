//! Advisory per-working-directory operation lock.
//!
//! Two concurrent invocations on the same working tree are unsupported; the
//! lock turns the likeliest accident into a wait instead of interleaved
//! mutations. Released on drop, so every exit path (including unwinding)
//! releases it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use fs2::FileExt;

const LOCK_FILE_NAME: &str = "pgit-operation.lock";

/// Exclusive lock guard for one orchestrated operation.
#[derive(Debug)]
pub struct OperationLock {
    file: std::fs::File,
    path: PathBuf,
}

/// Acquire the exclusive operation lock for `working_dir`, blocking until
/// the current holder (if any) releases it.
///
/// The lock file lives under `.git/` when that is a directory so the
/// working tree stays clean; linked worktrees (where `.git` is a file) fall
/// back to the working directory itself.
pub fn acquire(working_dir: &Path) -> anyhow::Result<OperationLock> {
    let git_dir = working_dir.join(".git");
    let path = if git_dir.is_dir() {
        git_dir.join(LOCK_FILE_NAME)
    } else {
        working_dir.join(format!(".{LOCK_FILE_NAME}"))
    };

    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))?;

    file.lock_exclusive()
        .with_context(|| format!("Failed to acquire operation lock {}", path.display()))?;

    Ok(OperationLock { file, path })
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            log::debug!("failed to release lock {}: {e}", self.path.display());
        }
    }
}
