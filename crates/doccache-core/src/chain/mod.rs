//! Chain input types and timestamp handling.

pub mod model;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{ModelError, ModelResult};

/// Type tag of contents whose value is the hash of another document.
pub const CHECKSUM_TYPE: &str = "checksum256";

/// Normalize a chain timestamp to RFC 3339 in UTC.
///
/// The chain emits `2020-11-12T18:27:47.000` without a zone; those are UTC.
/// Values that already carry an offset are converted. Empty stays empty.
pub fn normalize_timestamp(field: &'static str, value: &str) -> ModelResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(String::new());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .map_err(|_| ModelError::timestamp(field, value))
}
