//! Timestamp utilities
//!
//! Assessment timestamps are stored as fixed-width UTC text
//! (`2024-03-01T08:30:00.000Z`) so that SQL text ordering is chronological.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Storage form of a timestamp (millisecond precision, `Z` suffix)
pub fn to_storage(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp back
///
/// Accepts any RFC 3339 value plus SQLite's `CURRENT_TIMESTAMP` form, so rows
/// written by other tools still decode.
pub fn from_storage(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::Internal(format!("Unreadable stored timestamp: {}", value)))
}

/// Parse a date-only value (`YYYY-MM-DD`)
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").ok()
}

/// Parse a caller-supplied timestamp
///
/// Accepted forms:
/// - RFC 3339 with offset (`2024-03-01T08:30:00+08:00`, `...Z`)
/// - naive date-time, taken as UTC (`2024-03-01T08:30`, `2024-03-01 08:30:00`)
/// - date only, taken as UTC midnight (`2024-03-01`)
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Some(date) = parse_date(input) {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(Error::InvalidInput(format!("Unrecognized timestamp: {}", input)))
}

/// Offset used when rendering report timestamps
///
/// Out-of-range values (beyond ±24h) fall back to UTC.
pub fn report_offset(minutes_east: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes_east.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

/// Human-readable report form (`2024-03-01 16:30`)
pub fn format_for_report(ts: &DateTime<Utc>, offset: &FixedOffset) -> String {
    ts.with_timezone(offset)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}
