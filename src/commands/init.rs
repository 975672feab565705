//! Bootstrap a working directory for private tracking.

use std::path::Path;

use crate::config::{ConfigManager, Manifest};
use crate::fsops::{BackupPolicy, FsService};
use crate::git::Repository;
use crate::lock;
use crate::styling::{eprintln, hint_message, println, success_message};

/// Initialize the tracking layer: storage root, secondary repository, and a
/// fresh manifest. Refuses to run twice and requires the working directory
/// to already be a git repository.
pub fn handle_init(working_dir: &Path) -> anyhow::Result<()> {
    let _lock = lock::acquire(working_dir)?;

    let primary = Repository::at(working_dir);
    primary.ensure_repository()?;

    let mut manager = ConfigManager::new(working_dir);
    let manifest = Manifest::new(working_dir);

    let storage_root = manifest.storage_root(working_dir);
    let private_root = manifest.private_repo_root(working_dir);

    let fsvc = FsService::new(BackupPolicy::default());
    fsvc.create_directory(&storage_root)?;

    let secondary = Repository::storage(&private_root, &storage_root);
    if !secondary.is_repository() {
        secondary.init_repository()?;
    }

    // Written last so a half-finished init never claims to be initialized
    manager.create(working_dir)?;

    println!(
        "{}",
        success_message(format!(
            "Initialized private tracking ({} + {})",
            manifest.private_repo_path, manifest.storage_path
        ))
    );
    eprintln!(
        "{}",
        hint_message("Track files with 'pgit add <path>'")
    );
    Ok(())
}
