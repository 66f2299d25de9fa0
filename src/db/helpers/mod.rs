use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::pose::AngleSeries;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} contains out-of-range value {value}"))
}

/// Fixed-width RFC 3339 so `ORDER BY` on the text column matches chronological order.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn encode_series(series: &AngleSeries) -> Result<String> {
    serde_json::to_string(series).context("failed to encode angle series")
}

pub fn decode_series(value: &str, field: &str) -> Result<AngleSeries> {
    serde_json::from_str(value).with_context(|| format!("failed to decode {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_formatted_datetimes_sort_chronologically() {
        let whole = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::milliseconds(500);
        assert!(format_datetime(&whole) < format_datetime(&fractional));
        assert_eq!(
            parse_datetime(&format_datetime(&fractional), "recorded_at").unwrap(),
            fractional
        );
    }

    #[test]
    fn test_series_gaps_survive_encoding() {
        let mut series = AngleSeries::new();
        series.left_elbow = vec![Some(91.25), None];
        let decoded = decode_series(&encode_series(&series).unwrap(), "angles_json").unwrap();
        assert_eq!(decoded, series);
    }

    #[test]
    fn test_to_u32_rejects_negative() {
        assert!(to_u32(-1, "duration_secs").is_err());
        assert_eq!(to_u32(120, "duration_secs").unwrap(), 120);
    }
}
