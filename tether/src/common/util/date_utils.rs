use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

use crate::common::DATETIME_FORMAT;
use crate::errors::{ErrorKind, TetherError, TetherResult};

#[inline]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Drops sub-millisecond precision from a timestamp. The storage format keeps
/// milliseconds only, so values are truncated before they are persisted to
/// make saved and fetched timestamps compare equal.
#[inline]
pub fn milli_trim(dt: DateTime<Utc>) -> DateTime<Utc> {
    let millis = dt.nanosecond() / 1_000_000;
    dt.with_nanosecond(millis * 1_000_000).unwrap_or(dt)
}

/// Parses a stored `%Y-%m-%d %H:%M:%S` string back into a UTC timestamp.
pub fn parse_datetime(raw: &str) -> TetherResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            TetherError::new(
                &format!("Invalid datetime string '{}': {}", raw, e),
                ErrorKind::Deserialization,
            )
        })
}

// Fast path: returns 0 on any error instead of double error handling
#[inline]
pub fn epoch_millis_or_zero() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
