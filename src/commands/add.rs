//! The transactional `add` orchestrator.
//!
//! Composes the path validator, filesystem service, symlink service, VCS
//! adapters, and config manager under a staged protocol. Each mutating step
//! pushes a compensating action onto a [`RollbackJournal`]; any fatal
//! failure unwinds the journal in reverse so the working tree, both
//! repositories, and the manifest return to their pre-operation state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{ConfigManager, DEFAULT_STORAGE_PATH, Manifest};
use crate::errors::PgitError;
use crate::fsops::{BackupPolicy, FsService};
use crate::git::{Repository, ResetMode};
use crate::journal::RollbackJournal;
use crate::lock;
use crate::styling::{eprintln, warning_message};
use crate::symlink::{self, CreateOptions};
use crate::validate::{self, ValidatedPath};

/// Largest batch `add` accepts at all.
pub const MAX_BATCH_SIZE: usize = 100;

/// Paths per independent transaction chunk.
pub const CHUNK_SIZE: usize = 50;

/// Base line for secondary-repository commit messages.
const COMMIT_BASE_MESSAGE: &str = "Add private files";

/// What a successful `add` did.
#[derive(Debug)]
pub struct AddReport {
    pub added: Vec<String>,
    pub commit_hashes: Vec<String>,
}

/// Where the effective manifest came from.
///
/// A corrupt manifest degrades the run: settings fall back to defaults and
/// newly tracked paths are not persisted, because the corrupt file must not
/// be overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManifestSource {
    Persisted,
    StorageOnly,
    Corrupt,
}

/// Split `items` into runs of at most `size`, preserving order.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    assert!(size > 0, "chunk size must be positive");
    items.chunks(size).map(|c| c.to_vec()).collect()
}

/// The pre-mutation validation pass.
///
/// Deduplicates inputs (preserving order), runs every path through the
/// validator, probes existence on disk, and checks the manifest for paths
/// already under management. Raises [`PgitError::InvalidBatch`] or
/// [`PgitError::AlreadyTracked`] before anything has been mutated.
pub fn validate_batch(
    working_dir: &Path,
    manifest: &Manifest,
    inputs: &[String],
) -> anyhow::Result<Vec<ValidatedPath>> {
    let mut deduped: Vec<&String> = Vec::new();
    for input in inputs {
        if !deduped.iter().any(|seen| *seen == input) {
            deduped.push(input);
        }
    }

    if deduped.len() > MAX_BATCH_SIZE {
        return Err(PgitError::InvalidInput {
            message: format!(
                "batch of {} paths exceeds the limit of {MAX_BATCH_SIZE}",
                deduped.len()
            ),
        }
        .into());
    }

    let mut valid: Vec<ValidatedPath> = Vec::new();
    let mut invalid: Vec<(String, String)> = Vec::new();
    let mut already_tracked: Vec<String> = Vec::new();

    for input in deduped {
        let validated = match validate::validate_path(working_dir, input) {
            Ok(validated) => validated,
            Err(e) => {
                invalid.push((input.clone(), e.to_string()));
                continue;
            }
        };
        if std::fs::symlink_metadata(validated.absolute()).is_err() {
            invalid.push((
                input.clone(),
                PgitError::PathNotFound {
                    path: input.clone(),
                }
                .to_string(),
            ));
            continue;
        }
        if is_internal_path(validated.relative(), manifest) {
            invalid.push((
                input.clone(),
                format!("'{}' lies inside pgit's internal directories", input),
            ));
            continue;
        }
        if manifest
            .tracked_paths
            .iter()
            .any(|tracked| tracked == validated.relative())
        {
            already_tracked.push(validated.relative().to_string());
            continue;
        }
        valid.push(validated);
    }

    if !invalid.is_empty() {
        return Err(PgitError::InvalidBatch {
            invalid_paths: invalid,
            valid_paths: valid.iter().map(|v| v.relative().to_string()).collect(),
        }
        .into());
    }
    if !already_tracked.is_empty() {
        return Err(PgitError::AlreadyTracked {
            already_tracked,
            valid_paths: valid.iter().map(|v| v.relative().to_string()).collect(),
        }
        .into());
    }
    Ok(valid)
}

fn is_internal_path(relative: &str, manifest: &Manifest) -> bool {
    for root in [&manifest.storage_path, &manifest.private_repo_path] {
        if relative == root.as_str() || relative.starts_with(&format!("{root}/")) {
            return true;
        }
    }
    false
}

/// Track paths privately: detach from the primary index, move into storage,
/// link back, commit to the secondary repository, and record in the
/// manifest.
pub fn handle_add(working_dir: &Path, inputs: &[String]) -> anyhow::Result<AddReport> {
    let _lock = lock::acquire(working_dir)?;

    if !symlink::supports_symlinks() {
        return Err(PgitError::SymlinksUnsupported.into());
    }

    let mut manager = ConfigManager::new(working_dir);
    let (mut manifest, mut source) = resolve_manifest(working_dir, &mut manager)?;

    let primary = Repository::at(working_dir)
        .with_exclude_settings(manifest.settings.git_exclude.clone());
    primary.ensure_repository()?;

    let valid = validate_batch(working_dir, &manifest, inputs)?;
    if valid.is_empty() {
        return Ok(AddReport {
            added: Vec::new(),
            commit_hashes: Vec::new(),
        });
    }

    let storage_root = manifest.storage_root(working_dir);
    let private_root = manifest.private_repo_root(working_dir);
    let backup_policy = BackupPolicy {
        enabled: manifest.settings.create_backups,
        max_backups: manifest.settings.max_backups,
    };

    let fsvc = FsService::new(backup_policy);
    fsvc.create_directory(&storage_root)?;
    let secondary = Repository::storage(&private_root, &storage_root);
    if !secondary.is_repository() {
        secondary.init_repository()?;
    }

    let chunks = chunk(&valid, CHUNK_SIZE);
    let chatty = manifest.settings.verbose_output;
    let mut report = AddReport {
        added: Vec::new(),
        commit_hashes: Vec::new(),
    };

    for (index, paths) in chunks.iter().enumerate() {
        if chatty && chunks.len() > 1 {
            log::info!("processing chunk {}/{}", index + 1, chunks.len());
        }

        let mut journal = RollbackJournal::new();
        let outcome = run_chunk(
            working_dir,
            &primary,
            &secondary,
            &mut manager,
            &mut manifest,
            &mut source,
            backup_policy,
            paths,
            &mut journal,
        );

        match outcome {
            Ok(hash) => {
                journal.discard();
                report
                    .added
                    .extend(paths.iter().map(|p| p.relative().to_string()));
                report.commit_hashes.push(hash);
            }
            Err(e) => {
                // Earlier chunks stay committed; only this one unwinds
                for failure in journal.unwind() {
                    log::error!("rollback incomplete: {failure}");
                }
                return Err(e);
            }
        }
    }

    Ok(report)
}

/// Environment check: the system must be initialized, but the engine stays
/// usable when only the storage directory survives or the manifest is
/// corrupt.
fn resolve_manifest(
    working_dir: &Path,
    manager: &mut ConfigManager,
) -> anyhow::Result<(Manifest, ManifestSource)> {
    if manager.exists() {
        match manager.load() {
            Ok(manifest) => return Ok((manifest.clone(), ManifestSource::Persisted)),
            Err(e) => {
                eprintln!(
                    "{}",
                    warning_message(format!(
                        "Warning: manifest is unreadable ({e}); proceeding with defaults, the corrupt file is left untouched"
                    ))
                );
                return Ok((Manifest::new(working_dir), ManifestSource::Corrupt));
            }
        }
    }

    if working_dir.join(DEFAULT_STORAGE_PATH).is_dir() {
        eprintln!(
            "{}",
            warning_message(
                "Warning: manifest missing but storage directory exists; proceeding with defaults"
            )
        );
        return Ok((Manifest::new(working_dir), ManifestSource::StorageOnly));
    }

    Err(PgitError::NotInitialized.into())
}

/// One chunk of the staged mutation protocol. Every step pushes its
/// compensation before the next step runs.
#[allow(clippy::too_many_arguments)]
fn run_chunk(
    working_dir: &Path,
    primary: &Repository,
    secondary: &Repository,
    manager: &mut ConfigManager,
    manifest: &mut Manifest,
    source: &mut ManifestSource,
    backup_policy: BackupPolicy,
    paths: &[ValidatedPath],
    journal: &mut RollbackJournal,
) -> anyhow::Result<String> {
    let rels: Vec<String> = paths.iter().map(|p| p.relative().to_string()).collect();

    // Step 1: snapshot VCS state and the exclude file, arm their restoration
    let mut snapshots: BTreeMap<String, crate::git::FileVcsState> = BTreeMap::new();
    for path in paths {
        snapshots.insert(
            path.relative().to_string(),
            primary.record_original_state(path.relative())?,
        );
    }
    let exclude_buffer = primary.read_exclude_file()?;
    {
        let primary = primary.clone();
        let snapshots = snapshots.clone();
        let buffer = exclude_buffer;
        let rels = rels.clone();
        journal.push("restore exclude file and per-path index state", move || {
            if let Err(e) = primary.write_exclude_file(&buffer) {
                // Deliberate partial-recovery mode: the file may end up in a
                // state that is neither pre- nor post-operation
                log::error!(
                    "verbatim exclude restore failed ({e}); falling back to per-path removal — the exclude file may be left in a mixed state"
                );
                if let Err(e) = primary.remove_multiple_from_exclude(&rels) {
                    log::error!("per-path exclude fallback also failed: {e}");
                }
            }
            for (rel, state) in &snapshots {
                if let Err(e) = primary.restore_original_state(rel, state) {
                    log::warn!("could not restore VCS state for '{rel}': {e}");
                }
            }
            Ok(())
        });
    }

    // Step 2: detach from the primary VCS (degrades gracefully)
    let detach: Vec<String> = rels
        .iter()
        .filter(|rel| {
            snapshots
                .get(*rel)
                .map(|s| s.is_tracked || s.is_staged)
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    if !detach.is_empty() {
        let refs: Vec<&str> = detach.iter().map(String::as_str).collect();
        if let Err(batch_err) = primary.remove_from_index(&refs, true) {
            log::warn!("batch index removal failed ({batch_err}); retrying one path at a time");
            for rel in &detach {
                if let Err(e) = primary.remove_from_index(&[rel.as_str()], true) {
                    eprintln!(
                        "{}",
                        warning_message(format!(
                            "Warning: could not detach '{rel}' from the index: {e}"
                        ))
                    );
                }
            }
        }
    }

    // ExcludeDisabled (fallback=error) and corruption propagate from here;
    // everything else lands in the partition
    let partition = primary.add_multiple_to_exclude(&rels)?;
    for (path, reason) in &partition.failed {
        log::warn!("exclude degraded for '{path}': {reason}");
    }

    // Step 3: move originals into storage
    let storage_root = manifest.storage_root(working_dir);
    let mut fsvc = FsService::new(backup_policy);
    let mut planned: Vec<(PathBuf, PathBuf, bool)> = Vec::new();
    for path in paths {
        let src = path.absolute().to_path_buf();
        let dst = storage_root.join(path.relative_path());
        let was_dir = src.is_dir();

        fsvc.move_atomic(&src, &dst)?;
        fsvc.clear_rollback_actions();

        {
            let src = src.clone();
            let dst = dst.clone();
            journal.push(format!("move '{}' back from storage", path.relative()), move || {
                let mut fsvc = FsService::new(BackupPolicy::default());
                fsvc.move_atomic(&dst, &src)?;
                fsvc.clear_rollback_actions();
                Ok(())
            });
        }
        planned.push((src, dst, was_dir));
    }

    // Step 4: leave symlinks at the original locations
    for ((src, dst, was_dir), rel) in planned.iter().zip(&rels) {
        symlink::create(
            dst,
            src,
            CreateOptions {
                force: true,
                create_parents: true,
                is_directory: *was_dir,
            },
        )?;
        let link = src.clone();
        journal.push(format!("remove link '{rel}'"), move || {
            symlink::remove(&link)?;
            Ok(())
        });
    }

    // Step 5: commit the moved paths into the secondary repository
    let rel_refs: Vec<&str> = rels.iter().map(String::as_str).collect();
    let commit_hash = secondary.add_and_commit(&rel_refs, COMMIT_BASE_MESSAGE)?;
    {
        let secondary = secondary.clone();
        let rels = rels.clone();
        journal.push("reset secondary repository commit", move || {
            if let Err(e) = secondary.reset(ResetMode::Hard, "HEAD~1") {
                log::warn!(
                    "hard reset of secondary repository failed ({e}); removing paths from its index instead"
                );
                for rel in &rels {
                    if let Err(e) = secondary.remove_from_index(&[rel.as_str()], false) {
                        log::warn!("could not remove '{rel}' from secondary index: {e}");
                    }
                }
            }
            Ok(())
        });
    }

    // Step 6: persist the newly tracked paths
    match *source {
        ManifestSource::Persisted => manager.add_tracked_paths(&rels)?,
        ManifestSource::StorageOnly => {
            manifest.tracked_paths.extend(rels.iter().cloned());
            manager.save(manifest.clone())?;
            *source = ManifestSource::Persisted;
        }
        ManifestSource::Corrupt => {
            manifest.tracked_paths.extend(rels.iter().cloned());
            log::warn!(
                "manifest was unreadable; tracked paths from this run were not persisted and the corrupt file was left untouched"
            );
        }
    }
    {
        let persisted = matches!(*source, ManifestSource::Persisted);
        let working_dir = working_dir.to_path_buf();
        let rels = rels.clone();
        journal.push("remove tracked paths from manifest", move || {
            if persisted {
                let mut manager = ConfigManager::new(&working_dir);
                manager.remove_tracked_paths(&rels)?;
            }
            Ok(())
        });
    }

    Ok(commit_hash)
}
