//! Simplified exclude-pattern matching for conflict and redundancy warnings.
//!
//! This deliberately implements only the subset the warnings need: `*` maps
//! to any run of characters, `?` to a single character, `[…]` to a character
//! class, and `.` stays literal. Matches are anchored on both ends. Full
//! gitignore semantics (negation, leading-`/` anchoring, `**`, trailing
//! slash) are out of scope; the result only ever feeds warnings and must
//! never reject user input.

use regex::Regex;

/// Whether `entry` contains any wildcard metacharacter.
pub fn is_wildcard(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Compile a simplified exclude pattern to an anchored regex.
///
/// Returns `None` when the pattern does not compile (e.g. an unclosed
/// character class); callers treat that as "no match" rather than an error.
pub fn compile(pattern: &str) -> Option<Regex> {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '[' => {
                regex.push('[');
                for class_char in chars.by_ref() {
                    if class_char == ']' {
                        break;
                    }
                    if class_char == '\\' {
                        regex.push('\\');
                    }
                    regex.push(class_char);
                }
                regex.push(']');
            }
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }

    regex.push('$');
    Regex::new(&regex).ok()
}

/// Whether `pattern` matches `candidate` under the simplified semantics.
pub fn matches(pattern: &str, candidate: &str) -> bool {
    if !is_wildcard(pattern) {
        return pattern == candidate;
    }
    compile(pattern)
        .map(|re| re.is_match(candidate))
        .unwrap_or(false)
}

/// New literal entries that an existing wildcard pattern already covers.
pub fn find_conflicts(new_entries: &[String], existing: &[String]) -> Vec<String> {
    let mut conflicts = Vec::new();
    for entry in new_entries {
        if is_wildcard(entry) {
            continue;
        }
        for pattern in existing.iter().filter(|p| is_wildcard(p)) {
            if matches(pattern, entry) {
                conflicts.push(format!("'{entry}' is already covered by pattern '{pattern}'"));
            }
        }
    }
    conflicts
}

/// New wildcard entries that would shadow existing literal entries.
pub fn find_redundancies(new_entries: &[String], existing: &[String]) -> Vec<String> {
    let mut redundancies = Vec::new();
    for entry in new_entries.iter().filter(|e| is_wildcard(e)) {
        let covered: Vec<&str> = existing
            .iter()
            .filter(|line| !is_wildcard(line))
            .filter(|line| matches(entry, line))
            .map(|line| line.as_str())
            .collect();
        if !covered.is_empty() {
            redundancies.push(format!(
                "pattern '{entry}' also covers existing entries: {}",
                covered.join(", ")
            ));
        }
    }
    redundancies
}
