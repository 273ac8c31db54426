use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::errors::{Error, Result};

/// Sentinel for a missing time value ("not a time").
pub const NAT: i64 = i64::MIN;

/// Parse a date or datetime string into epoch seconds (UTC).
///
/// Accepts RFC 3339 ("2011-01-01T00:00:00Z"), a bare datetime ("2011-01-01T00:00:00"), or a bare
/// date ("2011-01-01", taken as midnight UTC).
///
pub fn parse_date(text: &str) -> Result<i64> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Ok(stamp.timestamp());
    }
    if let Ok(when) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(when.and_utc().timestamp());
    }
    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(day.and_time(NaiveTime::MIN).and_utc().timestamp());
    }

    Err(Error::BadDate(text.to_string()))
}

/// Format epoch seconds as an RFC 3339 UTC datetime. NaT formats as "NaT".
///
pub fn format_date(stamp: i64) -> String {
    match DateTime::from_timestamp(stamp, 0) {
        Some(when) if stamp != NAT => when.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        _ => String::from("NaT"),
    }
}
