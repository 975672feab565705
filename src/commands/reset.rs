//! The `reset` orchestrator: restore every tracked path and dismantle the
//! private tracking layer.

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use walkdir::WalkDir;

use crate::config::{ConfigManager, DEFAULT_STORAGE_PATH, Manifest};
use crate::errors::PgitError;
use crate::fsops::{BackupPolicy, FsService};
use crate::git::Repository;
use crate::lock;
use crate::styling::{eprintln, println, warning_message};
use crate::symlink;

/// Passes over the working tree when sweeping leaked backup sidecars.
const SWEEP_ATTEMPTS: usize = 5;

/// Result summary of one `reset` invocation.
#[derive(Debug, Default)]
pub struct ResetOutcome {
    pub cancelled: bool,
    pub dry_run: bool,
    pub restored_files: usize,
    pub removed_symlinks: usize,
    pub removed_directories: Vec<String>,
    pub config_removed: bool,
    pub git_excludes_cleaned: bool,
    pub cleaned_backups: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ResetOutcome {
    /// Process exit code: 1 iff anything failed.
    pub fn exit_code(&self) -> i32 {
        if self.errors.is_empty() { 0 } else { 1 }
    }
}

/// Undo the tracking layer: move files back, drop exclude entries, remove
/// the secondary repository, the storage root, and the manifest, then sweep
/// leaked backup sidecars.
///
/// Without `force` (and outside dry-run) nothing is mutated and the result
/// reports cancellation.
pub fn handle_reset(working_dir: &Path, force: bool, dry_run: bool) -> anyhow::Result<ResetOutcome> {
    if !force && !dry_run {
        println!("Reset cancelled: pass --force to confirm, or --dry-run to preview");
        return Ok(ResetOutcome {
            cancelled: true,
            ..Default::default()
        });
    }

    let _lock = lock::acquire(working_dir)?;

    let mut manager = ConfigManager::new(working_dir);
    let manifest = load_manifest_lenient(working_dir, &mut manager)?;
    let storage_root = manifest.storage_root(working_dir);
    let private_root = manifest.private_repo_root(working_dir);

    println!(
        "Resetting private tracking for {} path(s)",
        manifest.tracked_paths.len()
    );

    if dry_run {
        return Ok(preview(working_dir, &manifest));
    }

    let mut outcome = ResetOutcome::default();
    let mut fsvc = FsService::new(BackupPolicy {
        enabled: false,
        max_backups: manifest.settings.max_backups,
    });

    // Restore each tracked path: drop the link, move the storage copy back
    for rel in &manifest.tracked_paths {
        let link = working_dir.join(rel);
        let storage_copy = storage_root.join(rel);

        let stats = fsvc.get_link_stats(&link);
        if stats.is_symlink {
            match symlink::remove(&link) {
                Ok(true) => outcome.removed_symlinks += 1,
                Ok(false) => {}
                Err(e) => outcome.errors.push(format!("remove link '{rel}': {e}")),
            }
        } else if stats.exists {
            let warning = format!("'{rel}' is no longer a symlink; leaving it in place");
            eprintln!("{}", warning_message(format!("Warning: {warning}")));
            outcome.warnings.push(warning);
            continue;
        }

        if fsvc.path_exists(&storage_copy) {
            if let Some(parent) = link.parent() {
                if let Err(e) = fsvc.create_directory(parent) {
                    outcome.errors.push(format!("restore '{rel}': {e}"));
                    continue;
                }
            }
            match fsvc.move_atomic(&storage_copy, &link) {
                Ok(()) => {
                    fsvc.clear_rollback_actions();
                    outcome.restored_files += 1;
                }
                Err(e) => outcome.errors.push(format!("restore '{rel}': {e}")),
            }
        } else {
            let warning = format!("no storage copy for '{rel}'; nothing to restore");
            eprintln!("{}", warning_message(format!("Warning: {warning}")));
            outcome.warnings.push(warning);
        }
    }

    // Drop engine-managed exclude entries (warnings only)
    let primary =
        Repository::at(working_dir).with_exclude_settings(manifest.settings.git_exclude.clone());
    for rel in &manifest.tracked_paths {
        if let Err(e) = primary.remove_from_exclude(rel) {
            let warning = format!("could not clean exclude entry '{rel}': {e}");
            eprintln!("{}", warning_message(format!("Warning: {warning}")));
            outcome.warnings.push(warning);
        }
    }
    outcome.git_excludes_cleaned = true;

    // Remove the secondary repository and the storage root
    for (root, name) in [
        (&private_root, &manifest.private_repo_path),
        (&storage_root, &manifest.storage_path),
    ] {
        if fsvc.path_exists(root) {
            match fsvc.remove(root) {
                Ok(()) => outcome.removed_directories.push(name.clone()),
                Err(e) => outcome.errors.push(format!("remove '{name}': {e}")),
            }
        }
    }

    // Remove the manifest itself
    let config_path = manager.config_path();
    if config_path.exists() {
        match std::fs::remove_file(&config_path) {
            Ok(()) => outcome.config_removed = true,
            Err(e) => outcome.errors.push(format!("remove manifest: {e}")),
        }
    }

    outcome.cleaned_backups = sweep_backup_sidecars(working_dir);

    Ok(outcome)
}

/// Reset works from whatever manifest it can get: a corrupt one degrades to
/// defaults (dirs and sidecars still get cleaned), a missing one is only an
/// error when the storage directory is missing too.
fn load_manifest_lenient(
    working_dir: &Path,
    manager: &mut ConfigManager,
) -> anyhow::Result<Manifest> {
    if manager.exists() {
        match manager.load() {
            Ok(manifest) => return Ok(manifest.clone()),
            Err(e) => {
                eprintln!(
                    "{}",
                    warning_message(format!(
                        "Warning: manifest is unreadable ({e}); resetting with defaults"
                    ))
                );
                return Ok(Manifest::new(working_dir));
            }
        }
    }
    if working_dir.join(DEFAULT_STORAGE_PATH).is_dir() {
        return Ok(Manifest::new(working_dir));
    }
    Err(PgitError::NotInitialized.into())
}

/// Dry run: list the actions a real reset would take, mutating nothing.
fn preview(working_dir: &Path, manifest: &Manifest) -> ResetOutcome {
    let storage_root = manifest.storage_root(working_dir);
    let mut outcome = ResetOutcome {
        dry_run: true,
        ..Default::default()
    };

    for rel in &manifest.tracked_paths {
        let link = working_dir.join(rel);
        let storage_copy = storage_root.join(rel);
        let validation = symlink::validate(&link, &storage_root);

        if validation.exists {
            println!("would remove symlink {rel}");
            outcome.removed_symlinks += 1;
        }
        if storage_copy.exists() {
            println!("would restore {rel}");
            outcome.restored_files += 1;
        } else {
            println!("would skip {rel} (no storage copy)");
            outcome
                .warnings
                .push(format!("no storage copy for '{rel}'"));
        }
    }
    println!(
        "would remove {}, {}, and the manifest",
        manifest.private_repo_path, manifest.storage_path
    );
    outcome
}

/// Delete leaked `<name>.backup.<epoch-ms>.<hex>` sidecars across the
/// working tree, skipping anything under `.git*` directories. Repeats with a
/// brief pause until a pass finds nothing, up to the attempt cap.
fn sweep_backup_sidecars(working_dir: &Path) -> usize {
    let sidecar = Regex::new(r"\.backup\.\d+\.[0-9a-f]+$").expect("static pattern compiles");
    let mut removed = 0;

    for attempt in 0..SWEEP_ATTEMPTS {
        if attempt > 0 {
            std::thread::sleep(Duration::from_millis(50));
        }

        let mut found = 0;
        let walker = WalkDir::new(working_dir).into_iter().filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry.file_name().to_string_lossy().starts_with(".git"))
        });
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if sidecar.is_match(&entry.file_name().to_string_lossy()) {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => found += 1,
                    Err(e) => log::debug!(
                        "could not remove sidecar {}: {e}",
                        entry.path().display()
                    ),
                }
            }
        }

        removed += found;
        if found == 0 {
            break;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sweep_removes_matching_sidecars_everywhere() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("f.txt.backup.1735776000000.a1b2c3d4"), b"x").unwrap();
        std::fs::write(
            dir.path().join("nested/g.bin.backup.42.00ff"),
            b"x",
        )
        .unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("not.backup.abc.zz"), b"x").unwrap();

        let removed = sweep_backup_sidecars(dir.path());
        assert_eq!(removed, 2);
        assert!(dir.path().join("keep.txt").exists());
        assert!(dir.path().join("not.backup.abc.zz").exists());
    }

    #[test]
    fn sweep_skips_git_directories() {
        let dir = TempDir::new().unwrap();
        let git = dir.path().join(".git/info");
        std::fs::create_dir_all(&git).unwrap();
        let protected = git.join("x.backup.1.ab");
        std::fs::write(&protected, b"x").unwrap();

        let removed = sweep_backup_sidecars(dir.path());
        assert_eq!(removed, 0);
        assert!(protected.exists());
    }

    #[test]
    fn reset_without_force_is_cancelled() {
        let dir = TempDir::new().unwrap();
        let outcome = handle_reset(dir.path(), false, false).unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.exit_code(), 0);
        // Nothing was created or removed
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn reset_on_uninitialized_directory_errors() {
        let dir = TempDir::new().unwrap();
        let err = handle_reset(dir.path(), true, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PgitError>(),
            Some(PgitError::NotInitialized)
        ));
    }

    #[test]
    fn exit_code_tracks_errors() {
        let mut outcome = ResetOutcome::default();
        assert_eq!(outcome.exit_code(), 0);
        outcome.errors.push("boom".to_string());
        assert_eq!(outcome.exit_code(), 1);
    }
}
