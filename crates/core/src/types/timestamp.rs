//! Lenient timestamp decoding.
//!
//! Order documents are written by more than one client, so the same logical
//! field may hold an RFC 3339 string, a Firestore timestamp (which the REST
//! codec surfaces as an RFC 3339 string), a bare `YYYY-MM-DD` date, or epoch
//! milliseconds. Values that fit none of these decode as `None`.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Interpret a JSON value as a point in time.
#[must_use]
pub fn parse_lenient(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_str(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                #[allow(clippy::cast_possible_truncation)]
                n.as_f64().map(|f| f as i64)
            })
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn parse_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Serde adapter for `Option<DateTime<Utc>>` fields using [`parse_lenient`].
///
/// Use together with `#[serde(default)]` so that a missing field is `None`.
///
/// # Errors
///
/// Only fails if the input is not valid JSON for the deserializer.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_lenient(&value))
}
