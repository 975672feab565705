//! General utilities.

use std::time::{SystemTime, UNIX_EPOCH};

/// Format a Unix timestamp (seconds) as ISO 8601 (e.g., "2025-01-01T00:00:00Z").
///
/// If the timestamp is out of range for chrono's date handling, returns an
/// explicit placeholder string rather than a misleading value.
pub fn format_timestamp_iso8601(timestamp: u64) -> String {
    let Ok(timestamp) = i64::try_from(timestamp) else {
        return format!("invalid-timestamp({timestamp})");
    };

    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| format!("invalid-timestamp({timestamp})"))
}

/// Format the current time as ISO 8601.
pub fn now_iso8601() -> String {
    format_timestamp_iso8601(get_now())
}

/// Current Unix timestamp in seconds.
///
/// When `PGIT_TEST_EPOCH` is set (by tests), returns that value instead of
/// the actual current time so manifests and backup names are deterministic.
/// All code that stamps times into persisted state should use this rather
/// than `SystemTime::now()` directly.
pub fn get_now() -> u64 {
    std::env::var("PGIT_TEST_EPOCH")
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before Unix epoch")
                .as_secs()
        })
}

/// Current Unix timestamp in milliseconds (backup sidecar names).
pub fn epoch_millis() -> u128 {
    if let Ok(val) = std::env::var("PGIT_TEST_EPOCH") {
        if let Ok(secs) = val.parse::<u128>() {
            return secs * 1000;
        }
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis()
}

/// Short platform identifier recorded in manifest metadata ("linux",
/// "macos", "windows", ...).
pub fn platform() -> &'static str {
    std::env::consts::OS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_now_returns_reasonable_timestamp() {
        let now = get_now();
        // Should be after 2020-01-01
        assert!(now > 1577836800, "get_now() should return current time");
    }

    #[test]
    fn test_format_timestamp_iso8601() {
        assert_eq!(format_timestamp_iso8601(1735776000), "2025-01-02T00:00:00Z");
    }

    #[test]
    fn test_format_timestamp_iso8601_u64_overflow() {
        let too_large = (i64::MAX as u64) + 1;
        let formatted = format_timestamp_iso8601(too_large);
        assert!(formatted.starts_with("invalid-timestamp("));
    }

    #[test]
    fn test_platform_nonempty() {
        assert!(!platform().is_empty());
    }
}
