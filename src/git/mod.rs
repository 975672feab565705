//! Git operations over the primary and secondary repositories.
//!
//! The adapter is a narrow subprocess interface: a [`Repository`] is bound to
//! one working directory (optionally with a detached git directory for the
//! storage-rooted secondary repository) and exposes exactly the operations
//! the tracking engine needs. Exclude-file manipulation lives in
//! [`exclude`], per-path state snapshots in [`state`].

mod exclude;
mod pattern;
mod repository;
mod state;

pub use exclude::{
    ExcludePartition, ExcludeSettings, FallbackBehavior, MAX_EXCLUDE_FILE_SIZE, MAX_EXCLUDE_LINES,
    MAX_EXCLUDE_LINE_LENGTH,
};
pub use repository::{GitStatus, Repository, ResetMode, StatusEntry, build_commit_message};
pub use state::FileVcsState;
