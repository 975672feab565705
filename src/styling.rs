//! Terminal output styling.
//!
//! Uses the anstyle ecosystem: anstream for auto-detecting color support,
//! color-print's `cformat!` for HTML-like styling tags, and a small set of
//! semantic message helpers.
//!
//! ## stdout vs stderr principle
//!
//! - **stdout**: primary data output (summaries, dry-run listings)
//! - **stderr**: status messages (progress, warnings, errors, hints)
//!
//! Use `println!` for primary output, `eprintln!` for status messages.

// Re-exports from anstream (auto-detecting output)
pub use anstream::{eprint, eprintln, print, println};

use color_print::cformat;

/// Success emoji: `cformat!("{SUCCESS_EMOJI} <green>message</>")`
pub const SUCCESS_EMOJI: &str = "✅";

/// Error emoji: `cformat!("{ERROR_EMOJI} <red>message</>")`
pub const ERROR_EMOJI: &str = "❌";

/// Warning emoji: `cformat!("{WARNING_EMOJI} <yellow>message</>")`
pub const WARNING_EMOJI: &str = "🟡";

/// Hint emoji: `eprintln!("{}", hint_message("..."))`
pub const HINT_EMOJI: &str = "💡";

/// Format an error message with emoji and red styling.
///
/// Content can include inner styling like `<bold>`.
pub fn error_message(content: impl AsRef<str>) -> String {
    cformat!("{ERROR_EMOJI} <red>{}</>", content.as_ref())
}

/// Format a warning message with emoji and yellow styling.
pub fn warning_message(content: impl AsRef<str>) -> String {
    cformat!("{WARNING_EMOJI} <yellow>{}</>", content.as_ref())
}

/// Format a success message with emoji and green styling.
pub fn success_message(content: impl AsRef<str>) -> String {
    cformat!("{SUCCESS_EMOJI} <green>{}</>", content.as_ref())
}

/// Format a hint message with emoji and dim styling.
pub fn hint_message(content: impl AsRef<str>) -> String {
    cformat!("{HINT_EMOJI} <dim>{}</>", content.as_ref())
}
