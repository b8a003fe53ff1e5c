use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::models::SystemStatus;

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} contains out-of-range value {value}"))
}

/// Canonical storage form: UTC, microseconds, `Z` suffix.
pub fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::microseconds((seconds * 1_000_000.0).round() as i64)
}

pub fn parse_status(value: &str) -> Result<SystemStatus> {
    match value {
        "STARTUP" => Ok(SystemStatus::Startup),
        "SHUTDOWN" => Ok(SystemStatus::Shutdown),
        "CTRL_C_SIGNAL" => Ok(SystemStatus::CtrlCSignal),
        "HOT_RELOAD_STARTED" => Ok(SystemStatus::HotReloadStarted),
        "HOT_RELOAD_CONCLUDED" => Ok(SystemStatus::HotReloadConcluded),
        "SLEEP" => Ok(SystemStatus::Sleep),
        "WAKE" => Ok(SystemStatus::Wake),
        other => Err(anyhow!("unknown system status {other}")),
    }
}

/// Maps a parse failure inside a `query_map` closure onto a rusqlite error.
pub fn conversion_error(err: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        err.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_datetimes_round_trip_and_sort_lexically() {
        let earlier = parse_datetime("2025-03-01T09:00:00.5+01:00", "t").unwrap();
        let later = parse_datetime("2025-03-01T08:00:01Z", "t").unwrap();

        let a = format_datetime(earlier);
        let b = format_datetime(later);

        assert_eq!(a, "2025-03-01T08:00:00.500000Z");
        assert!(a < b);
        assert_eq!(parse_datetime(&a, "t").unwrap(), earlier);
    }
}
