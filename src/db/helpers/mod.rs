use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::db::models::ReportStatus;

/// Fixed-width RFC 3339 so that stored timestamps sort lexicographically.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_status(value: &str) -> Result<ReportStatus> {
    match value {
        "pending" => Ok(ReportStatus::Pending),
        "in_progress" => Ok(ReportStatus::InProgress),
        "completed" => Ok(ReportStatus::Completed),
        other => Err(anyhow!("unknown report status {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn datetime_round_trips_through_storage_format() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        let stored = format_datetime(&ts);

        assert_eq!(stored, "2024-06-01T09:30:00.000000Z");
        assert_eq!(parse_datetime(&stored, "created_at").unwrap(), ts);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(parse_status("archived").is_err());
        assert_eq!(parse_status("in_progress").unwrap(), ReportStatus::InProgress);
    }
}
