//! Timestamp conversion helpers used by pipeline stage S3.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Render a raw millisecond UTC timestamp as a `YYYY-MM-DD HH:MM:SS` string in UTC+8.
///
/// Returns `None` for a missing, non-positive, or otherwise invalid timestamp — the record
/// is still emitted with a `null` field, per spec.md §4.5 (S3).
pub fn millis_to_utc8_string(millis: Option<i64>) -> Option<String> {
    utc8_from_millis(millis?).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Convert a raw millisecond UTC timestamp into a UTC+8 [`DateTime`], preserving the
/// invariant `parse(s, UTC+8) - 8h == utc_from_millis(raw_ms)` required by spec.md §8.
pub fn utc8_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    let utc = Utc.timestamp_millis_opt(millis).single()?;
    Some(utc + Duration::hours(8))
}
