//! Error types and classification for the tracking engine.

use std::path::PathBuf;

/// Render a path list in the stable format used by warnings and errors.
///
/// The format is load-bearing: operators grep logs for `(paths: a, b, c)`.
pub fn format_paths(paths: &[String]) -> String {
    format!("(paths: {})", paths.join(", "))
}

/// Classified failures raised by the engine.
///
/// Variants map one-to-one onto the externally documented error kinds. The
/// exclude-file kinds (`ExcludeAccess`, `ExcludeValidation`, `ExcludeGeneric`)
/// are recoverable: batch operations collect them into partition results and
/// the orchestrator degrades gracefully. Everything else aborts the current
/// chunk and unwinds the journal.
#[derive(Debug)]
pub enum PgitError {
    /// The working directory has not been initialized for private tracking
    NotInitialized,
    /// User-supplied input was rejected (unsafe or malformed path)
    InvalidInput { message: String },
    /// A path passed to `add` does not exist on disk
    PathNotFound { path: String },
    /// Some input paths are already present in the manifest
    AlreadyTracked {
        already_tracked: Vec<String>,
        valid_paths: Vec<String>,
    },
    /// A batch failed validation; carries the failing and so-far-valid subsets
    InvalidBatch {
        invalid_paths: Vec<(String, String)>,
        valid_paths: Vec<String>,
    },
    /// The directory is not a git repository
    RepositoryNotFound { path: PathBuf },
    /// A repository-level git operation failed
    VcsOperation { operation: String, message: String },
    /// An index-level git operation failed
    VcsIndex { paths: Vec<String>, message: String },
    /// Permission or I/O denied on `info/exclude` or its parent
    ExcludeAccess { message: String, paths: Vec<String> },
    /// Pre- or post-write integrity check on the exclude file failed
    ExcludeCorruption { message: String },
    /// An input path was rejected by the exclude-file validation rules
    ExcludeValidation { path: String, message: String },
    /// Exclude integration is disabled and fallback behavior is `error`
    ExcludeDisabled {
        operation: String,
        paths: Vec<String>,
    },
    /// Any other failure while manipulating the exclude file
    ExcludeGeneric { message: String, paths: Vec<String> },
    /// A filesystem mutation failed
    FilesystemOperation {
        operation: String,
        path: PathBuf,
        message: String,
    },
    /// The platform or filesystem does not support symbolic links
    SymlinksUnsupported,
    /// The manifest failed schema validation
    ConfigValidation { errors: Vec<String> },
    /// The manifest could not be migrated to the current schema version
    ConfigMigration {
        from: String,
        to: String,
        message: String,
    },
}

impl PgitError {
    /// Whether the orchestrator may continue past this failure.
    ///
    /// Recoverable failures are collected into partition results and surfaced
    /// as warnings; everything else triggers rollback of the current chunk.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PgitError::ExcludeAccess { .. }
                | PgitError::ExcludeValidation { .. }
                | PgitError::ExcludeGeneric { .. }
        )
    }
}

impl std::fmt::Display for PgitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PgitError::NotInitialized => {
                write!(
                    f,
                    "Private tracking is not initialized in this directory (run 'pgit init' first)"
                )
            }

            PgitError::InvalidInput { message } => write!(f, "Invalid input: {message}"),

            PgitError::PathNotFound { path } => write!(f, "Path not found: {path}"),

            PgitError::AlreadyTracked {
                already_tracked, ..
            } => {
                write!(
                    f,
                    "Already tracked {}",
                    format_paths(already_tracked)
                )
            }

            PgitError::InvalidBatch {
                invalid_paths,
                valid_paths,
            } => {
                writeln!(f, "Batch validation failed:")?;
                for (path, error) in invalid_paths {
                    writeln!(f, "  {path}: {error}")?;
                }
                write!(
                    f,
                    "{} valid path(s) were not processed",
                    valid_paths.len()
                )
            }

            PgitError::RepositoryNotFound { path } => {
                write!(f, "Not a git repository: {}", path.display())
            }

            PgitError::VcsOperation { operation, message } => {
                write!(f, "Git {operation} failed: {message}")
            }

            PgitError::VcsIndex { paths, message } => {
                write!(f, "Git index operation failed: {message} {}", format_paths(paths))
            }

            PgitError::ExcludeAccess { message, paths } => {
                write!(f, "Cannot access git exclude file: {message}")?;
                if !paths.is_empty() {
                    write!(f, " {}", format_paths(paths))?;
                }
                Ok(())
            }

            PgitError::ExcludeCorruption { message } => {
                write!(f, "Git exclude file failed integrity check: {message}")
            }

            PgitError::ExcludeValidation { path, message } => {
                write!(f, "Rejected exclude entry '{path}': {message}")
            }

            PgitError::ExcludeDisabled { operation, paths } => {
                write!(
                    f,
                    "Git exclude operation '{operation}' refused: exclude integration is disabled"
                )?;
                if !paths.is_empty() {
                    write!(f, " {}", format_paths(paths))?;
                }
                Ok(())
            }

            PgitError::ExcludeGeneric { message, paths } => {
                write!(f, "Git exclude operation failed: {message}")?;
                if !paths.is_empty() {
                    write!(f, " {}", format_paths(paths))?;
                }
                Ok(())
            }

            PgitError::FilesystemOperation {
                operation,
                path,
                message,
            } => {
                write!(f, "Filesystem {operation} failed for {}: {message}", path.display())
            }

            PgitError::SymlinksUnsupported => {
                write!(
                    f,
                    "This filesystem does not support symbolic links; pgit cannot operate here"
                )
            }

            PgitError::ConfigValidation { errors } => {
                write!(f, "Manifest validation failed: {}", errors.join("; "))
            }

            PgitError::ConfigMigration { from, to, message } => {
                write!(f, "Manifest migration {from} -> {to} failed: {message}")
            }
        }
    }
}

impl std::error::Error for PgitError {}

/// Check whether an error chain bottoms out in [`PgitError::ExcludeDisabled`].
///
/// The orchestrator normally converts failures into rollback + a classified
/// result; this one variant must pass through untouched so the CLI exits
/// hard. Callers test with this instead of string-matching messages.
pub fn is_exclude_disabled(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PgitError>(),
        Some(PgitError::ExcludeDisabled { .. })
    )
}

/// Check whether an error chain bottoms out in a recoverable [`PgitError`].
pub fn is_recoverable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<PgitError>()
        .map(PgitError::is_recoverable)
        .unwrap_or(false)
}
