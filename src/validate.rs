//! User-path validation and normalization.
//!
//! Every path that enters the engine passes through [`validate_path`] before
//! anything touches the filesystem or the repositories. The checks run in a
//! fixed order so rejection messages are deterministic, and the output
//! carries both forms the engine needs: the normalized relative path (stored
//! in the manifest and the exclude file) and the absolute path (used for
//! filesystem probes).

use std::path::{Path, PathBuf};

use path_slash::PathBufExt;

use crate::errors::PgitError;

/// Maximum accepted path length in bytes.
pub const MAX_PATH_LENGTH: usize = 4096;

/// Maximum accepted nesting depth.
pub const MAX_PATH_DEPTH: usize = 50;

/// Base names Windows refuses regardless of extension.
const WINDOWS_RESERVED: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// A user path that passed all checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPath {
    relative: String,
    absolute: PathBuf,
}

impl ValidatedPath {
    /// The normalized relative form (forward slashes), as stored in the
    /// manifest and the exclude file.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// The relative form as a path, for joining against roots.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.relative)
    }

    /// The absolute form, rooted at the working directory.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }
}

fn invalid(message: impl Into<String>) -> PgitError {
    PgitError::InvalidInput {
        message: message.into(),
    }
}

/// Validate and normalize one user-supplied path against the working
/// directory.
///
/// Checks, in order: non-empty; not ending in space or dot; no embedded NUL
/// or C0 controls; length; no `..` segments; not absolute; not under
/// `.git/`; base name not Windows-reserved; depth.
pub fn validate_path(working_dir: &Path, input: &str) -> Result<ValidatedPath, PgitError> {
    if input.is_empty() {
        return Err(invalid("path is empty"));
    }
    if input.ends_with(' ') || input.ends_with('.') {
        return Err(invalid(format!("'{input}' ends with a space or dot")));
    }
    if input.chars().any(|c| c < '\u{20}') {
        return Err(invalid(format!("'{}' contains control characters", input.escape_debug())));
    }
    if input.len() > MAX_PATH_LENGTH {
        return Err(invalid(format!(
            "path exceeds {MAX_PATH_LENGTH} bytes"
        )));
    }
    if input.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(invalid(format!("'{input}' contains parent traversal")));
    }
    if Path::new(input).is_absolute() || input.starts_with('/') || input.starts_with('\\') {
        return Err(invalid(format!("'{input}' is absolute")));
    }

    let segments: Vec<&str> = input
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.is_empty() {
        return Err(invalid(format!("'{input}' has no path components")));
    }
    if segments[0].eq_ignore_ascii_case(".git") {
        return Err(invalid(format!("'{input}' is inside the .git directory")));
    }

    let base = segments.last().expect("segments checked non-empty");
    let stem = base.split('.').next().unwrap_or(base);
    if WINDOWS_RESERVED
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        return Err(invalid(format!("'{base}' is a reserved name on Windows")));
    }

    if segments.len() > MAX_PATH_DEPTH {
        return Err(invalid(format!(
            "path nests deeper than {MAX_PATH_DEPTH} components"
        )));
    }

    let relative = PathBuf::from(segments.join("/"));
    let absolute = working_dir.join(&relative);
    Ok(ValidatedPath {
        relative: relative.to_slash_lossy().into_owned(),
        absolute,
    })
}
