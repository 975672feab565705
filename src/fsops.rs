//! Filesystem service: atomic mutations with a short-lived rollback list.
//!
//! Every mutation is atomic-by-rename on the same filesystem, or
//! copy+fsync+rename+unlink across filesystems with a backup sidecar as the
//! rollback witness for that window. The service records compensating
//! actions for its own mutations; the orchestrator drains or clears them
//! between protocol steps via [`FsService::clear_rollback_actions`] so they
//! never double-fire with the orchestrator's journal.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::errors::PgitError;
use crate::utils;

/// Backup sidecar policy, sourced from manifest settings.
///
/// The original tool created sidecars unconditionally; here the manifest's
/// `createBackups`/`maxBackups` settings are honored, defaulting to enabled.
#[derive(Debug, Clone, Copy)]
pub struct BackupPolicy {
    pub enabled: bool,
    pub max_backups: usize,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_backups: 5,
        }
    }
}

/// What sits at a path, without following symlinks.
#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    pub exists: bool,
    pub is_symlink: bool,
    pub is_directory: bool,
    pub target: Option<PathBuf>,
}

/// A compensating action recorded by the service for one of its mutations.
#[derive(Debug)]
enum RollbackAction {
    MoveBack { from: PathBuf, to: PathBuf },
    RestoreBackup { backup: PathBuf, original: PathBuf },
    RemovePath { path: PathBuf },
}

/// Filesystem mutations with rollback recording.
#[derive(Debug, Default)]
pub struct FsService {
    backup_policy: BackupPolicy,
    rollback_actions: Vec<RollbackAction>,
}

fn fs_error(operation: &str, path: &Path, err: impl std::fmt::Display) -> PgitError {
    PgitError::FilesystemOperation {
        operation: operation.to_string(),
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

impl FsService {
    pub fn new(backup_policy: BackupPolicy) -> Self {
        Self {
            backup_policy,
            rollback_actions: Vec::new(),
        }
    }

    // =========================================================================
    // Probes
    // =========================================================================

    /// True if anything exists at `path`, including a dangling symlink.
    pub fn path_exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    pub fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    /// Inspect a path without following symlinks.
    pub fn get_link_stats(&self, path: &Path) -> LinkStats {
        let Ok(meta) = fs::symlink_metadata(path) else {
            return LinkStats::default();
        };
        let is_symlink = meta.file_type().is_symlink();
        LinkStats {
            exists: true,
            is_symlink,
            is_directory: meta.is_dir(),
            target: if is_symlink { fs::read_link(path).ok() } else { None },
        }
    }

    pub fn read_file(&self, path: &Path) -> Result<Vec<u8>, PgitError> {
        fs::read(path).map_err(|e| fs_error("read", path, e))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub fn create_directory(&self, path: &Path) -> Result<(), PgitError> {
        fs::create_dir_all(path).map_err(|e| fs_error("create directory", path, e))
    }

    /// Move `src` to `dst`, creating missing parent directories at `dst`.
    ///
    /// Same-filesystem moves are a single rename. Cross-filesystem moves fall
    /// back to copy+fsync+rename+unlink; in that window a backup sidecar of
    /// `src` is the rollback witness.
    pub fn move_atomic(&mut self, src: &Path, dst: &Path) -> Result<(), PgitError> {
        if !self.path_exists(src) {
            return Err(fs_error("move", src, "source does not exist"));
        }
        if let Some(parent) = dst.parent() {
            self.create_directory(parent)?;
        }

        match fs::rename(src, dst) {
            Ok(()) => {}
            Err(_) => self.move_by_copy(src, dst)?,
        }

        self.rollback_actions.push(RollbackAction::MoveBack {
            from: dst.to_path_buf(),
            to: src.to_path_buf(),
        });
        Ok(())
    }

    /// Copy-based fallback for moves that cross filesystems.
    fn move_by_copy(&mut self, src: &Path, dst: &Path) -> Result<(), PgitError> {
        let backup = if self.backup_policy.enabled && src.is_file() {
            Some(self.create_backup(src)?)
        } else {
            None
        };

        if src.is_dir() {
            copy_dir_recursive(src, dst).map_err(|e| fs_error("copy", src, e))?;
            fs::remove_dir_all(src).map_err(|e| fs_error("remove", src, e))?;
        } else {
            // Stage next to the destination so the final rename stays on one
            // filesystem.
            let parent = dst.parent().unwrap_or(Path::new("."));
            let staged = tempfile::NamedTempFile::new_in(parent)
                .map_err(|e| fs_error("stage copy", dst, e))?;
            fs::copy(src, staged.path()).map_err(|e| fs_error("copy", src, e))?;
            staged
                .as_file()
                .sync_all()
                .map_err(|e| fs_error("sync", dst, e))?;
            staged
                .persist(dst)
                .map_err(|e| fs_error("rename", dst, e.error))?;
            fs::remove_file(src).map_err(|e| fs_error("remove", src, e))?;
        }

        if let Some(backup) = backup {
            self.rollback_actions.push(RollbackAction::RestoreBackup {
                backup,
                original: src.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Write `bytes` to `path` atomically (temp file + rename).
    pub fn write_atomic(&mut self, path: &Path, bytes: &[u8]) -> Result<(), PgitError> {
        if let Some(parent) = path.parent() {
            self.create_directory(parent)?;
        }

        let existed = self.path_exists(path);
        if existed && self.backup_policy.enabled && path.is_file() {
            let backup = self.create_backup(path)?;
            self.rollback_actions.push(RollbackAction::RestoreBackup {
                backup,
                original: path.to_path_buf(),
            });
        } else if !existed {
            self.rollback_actions.push(RollbackAction::RemovePath {
                path: path.to_path_buf(),
            });
        }

        let parent = path.parent().unwrap_or(Path::new("."));
        let mut staged =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| fs_error("stage write", path, e))?;
        staged
            .write_all(bytes)
            .map_err(|e| fs_error("write", path, e))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|e| fs_error("sync", path, e))?;
        staged
            .persist(path)
            .map_err(|e| fs_error("rename", path, e.error))?;
        Ok(())
    }

    /// Remove a file, symlink, or directory tree.
    pub fn remove(&self, path: &Path) -> Result<(), PgitError> {
        let stats = self.get_link_stats(path);
        if !stats.exists {
            return Ok(());
        }
        let result = if stats.is_directory && !stats.is_symlink {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| fs_error("remove", path, e))
    }

    // =========================================================================
    // Backups
    // =========================================================================

    /// Create a `<original>.backup.<epoch-ms>.<hex-digest>` sidecar.
    fn create_backup(&self, original: &Path) -> Result<PathBuf, PgitError> {
        let millis = utils::epoch_millis();
        let mut hasher = Sha256::new();
        hasher.update(original.to_string_lossy().as_bytes());
        hasher.update(millis.to_le_bytes());
        let digest = hasher.finalize();
        let digest_hex: String = digest
            .iter()
            .take(4)
            .map(|b| format!("{b:02x}"))
            .collect();

        let name = format!(
            "{}.backup.{millis}.{digest_hex}",
            original
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        let backup = original.with_file_name(name);
        fs::copy(original, &backup).map_err(|e| fs_error("backup", original, e))?;
        self.prune_backups(original);
        Ok(backup)
    }

    /// Remove the oldest sidecars for `original` past `max_backups`.
    fn prune_backups(&self, original: &Path) {
        let Some(parent) = original.parent() else {
            return;
        };
        let Some(base) = original.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return;
        };
        let prefix = format!("{base}.backup.");

        let Ok(entries) = fs::read_dir(parent) else {
            return;
        };
        let mut backups: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .collect();
        if backups.len() <= self.backup_policy.max_backups {
            return;
        }
        // Sidecar names embed epoch millis, so lexicographic order is age order.
        backups.sort();
        let excess = backups.len() - self.backup_policy.max_backups;
        for stale in backups.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&stale) {
                log::debug!("failed to prune backup {}: {e}", stale.display());
            }
        }
    }

    // =========================================================================
    // Rollback list
    // =========================================================================

    /// Drop recorded compensating actions. The orchestrator calls this after
    /// a protocol step commits, once its own journal owns the compensation.
    pub fn clear_rollback_actions(&mut self) {
        self.rollback_actions.clear();
    }

    pub fn has_rollback_actions(&self) -> bool {
        !self.rollback_actions.is_empty()
    }

    /// Execute recorded actions in reverse order. Failures are collected, not
    /// raised, so a partial rollback reports everything it could not undo.
    pub fn rollback(&mut self) -> Vec<String> {
        let mut failures = Vec::new();
        while let Some(action) = self.rollback_actions.pop() {
            let result = match &action {
                RollbackAction::MoveBack { from, to } => {
                    if let Some(parent) = to.parent() {
                        let _ = fs::create_dir_all(parent);
                    }
                    fs::rename(from, to)
                }
                RollbackAction::RestoreBackup { backup, original } => {
                    fs::copy(backup, original).map(|_| ())
                }
                RollbackAction::RemovePath { path } => {
                    if fs::symlink_metadata(path).is_ok() {
                        fs::remove_file(path)
                    } else {
                        Ok(())
                    }
                }
            };
            if let Err(e) = result {
                failures.push(format!("{action:?}: {e}"));
            }
        }
        failures
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
