//! Symbolic link creation, removal, and health checks.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::errors::PgitError;

/// Options for [`create`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    /// Remove an existing entry at the link location first.
    pub force: bool,
    /// Create missing parent directories of the link location.
    pub create_parents: bool,
    /// Hint that the target is a directory (matters on Windows).
    pub is_directory: bool,
}

/// Result of [`validate`].
#[derive(Debug)]
pub struct LinkValidation {
    pub exists: bool,
    /// The link resolves to something on disk.
    pub is_valid: bool,
    /// The resolved target sits inside the expected storage root.
    pub is_healthy: bool,
    pub link_path: PathBuf,
    pub target_path: Option<PathBuf>,
    pub issues: Vec<String>,
}

fn link_error(operation: &str, path: &Path, err: impl std::fmt::Display) -> PgitError {
    PgitError::FilesystemOperation {
        operation: operation.to_string(),
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Create a symbolic link at `link` pointing to `target`.
pub fn create(target: &Path, link: &Path, options: CreateOptions) -> Result<(), PgitError> {
    if options.create_parents {
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).map_err(|e| link_error("create parent", parent, e))?;
        }
    }

    if fs::symlink_metadata(link).is_ok() {
        if !options.force {
            return Err(link_error("create link", link, "link location already exists"));
        }
        remove_any(link)?;
    }

    platform_symlink(target, link, options.is_directory)
        .map_err(|e| link_error("create link", link, e))
}

#[cfg(unix)]
fn platform_symlink(target: &Path, link: &Path, _is_directory: bool) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn platform_symlink(target: &Path, link: &Path, is_directory: bool) -> std::io::Result<()> {
    if is_directory {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

fn remove_any(path: &Path) -> Result<(), PgitError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return Ok(()),
    };
    let result = if meta.is_dir() && !meta.file_type().is_symlink() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| link_error("remove", path, e))
}

/// Remove `link` only if it actually is a symbolic link. Never follows.
///
/// Returns whether a link was removed.
pub fn remove(link: &Path) -> Result<bool, PgitError> {
    let meta = match fs::symlink_metadata(link) {
        Ok(meta) => meta,
        Err(_) => return Ok(false),
    };
    if !meta.file_type().is_symlink() {
        return Err(link_error("remove link", link, "not a symbolic link"));
    }
    fs::remove_file(link).map_err(|e| link_error("remove link", link, e))?;
    Ok(true)
}

/// Inspect a link and report whether it resolves and whether its target is
/// inside `expected_root`.
pub fn validate(link: &Path, expected_root: &Path) -> LinkValidation {
    let mut validation = LinkValidation {
        exists: false,
        is_valid: false,
        is_healthy: false,
        link_path: link.to_path_buf(),
        target_path: None,
        issues: Vec::new(),
    };

    let Ok(meta) = fs::symlink_metadata(link) else {
        validation.issues.push("link does not exist".to_string());
        return validation;
    };
    validation.exists = true;

    if !meta.file_type().is_symlink() {
        validation
            .issues
            .push("path exists but is not a symbolic link".to_string());
        return validation;
    }

    let raw_target = match fs::read_link(link) {
        Ok(target) => target,
        Err(e) => {
            validation.issues.push(format!("unreadable link: {e}"));
            return validation;
        }
    };
    let absolute_target = if raw_target.is_absolute() {
        raw_target
    } else {
        link.parent().unwrap_or(Path::new(".")).join(raw_target)
    };

    match dunce::canonicalize(&absolute_target) {
        Ok(resolved) => {
            validation.is_valid = true;
            match dunce::canonicalize(expected_root) {
                Ok(root) => {
                    validation.is_healthy = resolved.starts_with(&root);
                    if !validation.is_healthy {
                        validation
                            .issues
                            .push("link target is outside the storage root".to_string());
                    }
                }
                Err(e) => {
                    validation
                        .issues
                        .push(format!("storage root unavailable: {e}"));
                }
            }
            validation.target_path = Some(resolved);
        }
        Err(e) => {
            validation.target_path = Some(absolute_target);
            validation.issues.push(format!("dangling link: {e}"));
        }
    }

    validation
}

/// Probe once per process whether the environment can create symbolic links.
///
/// On Unix this is effectively always true; on Windows it depends on
/// developer mode or privileges, so an actual creation attempt is the only
/// reliable answer.
pub fn supports_symlinks() -> bool {
    static SUPPORTED: OnceLock<bool> = OnceLock::new();
    *SUPPORTED.get_or_init(|| {
        let Ok(dir) = tempfile::tempdir() else {
            return false;
        };
        let target = dir.path().join("probe-target");
        if fs::write(&target, b"probe").is_err() {
            return false;
        }
        let link = dir.path().join("probe-link");
        platform_symlink(&target, &link, false).is_ok()
    })
}
