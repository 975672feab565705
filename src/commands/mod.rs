//! Command orchestrators: the staged, reversible add/reset protocol plus the
//! init bootstrap.

mod add;
mod init;
mod reset;

pub use add::{AddReport, CHUNK_SIZE, MAX_BATCH_SIZE, chunk, handle_add, validate_batch};
pub use init::handle_init;
pub use reset::{ResetOutcome, handle_reset};
