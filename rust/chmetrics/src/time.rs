//! Time helpers: request presets, literal parsing and the SQL time format.

use crate::error::{Result, ServiceError};
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};

/// Fixed-width literal accepted by ClickHouse `toDateTime`.
pub const SQL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeFilterSpec {
    RelativeHours(i64),
    RelativeDays(i64),
    Today,
    Yesterday,
    Absolute {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    AbsoluteOpenEnd {
        start: DateTime<Utc>,
    },
}

impl TimeFilterSpec {
    /// Resolves the preset against `now`. Ordering of absolute bounds is left
    /// to query validation so that reversed ranges report the same error no
    /// matter how they were supplied.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<TimeRange> {
        let range = match self {
            TimeFilterSpec::RelativeHours(hours) => TimeRange {
                start: lookback(now, Duration::try_hours(*hours))?,
                end: now,
            },
            TimeFilterSpec::RelativeDays(days) => TimeRange {
                start: lookback(now, Duration::try_days(*days))?,
                end: now,
            },
            TimeFilterSpec::Today => TimeRange {
                start: midnight(now.date_naive()),
                end: now,
            },
            TimeFilterSpec::Yesterday => {
                let today = now.date_naive();
                TimeRange {
                    start: midnight(today.pred_opt().unwrap_or(today)),
                    end: midnight(today),
                }
            }
            TimeFilterSpec::Absolute { start, end } => TimeRange {
                start: *start,
                end: *end,
            },
            TimeFilterSpec::AbsoluteOpenEnd { start } => TimeRange {
                start: *start,
                end: now,
            },
        };
        Ok(range)
    }
}

fn lookback(now: DateTime<Utc>, span: Option<Duration>) -> Result<DateTime<Utc>> {
    span.and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| {
            ServiceError::InvalidRequest("relative time window is out of range".into())
        })
}

fn midnight(date: chrono::NaiveDate) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(NaiveTime::MIN), Utc)
}

/// Renders a timestamp as the `YYYY-MM-DD HH:MM:SS` literal used in queries.
pub fn format_sql_time(value: &DateTime<Utc>) -> String {
    value.format(SQL_TIME_FORMAT).to_string()
}

pub fn parse_time_value(raw: &str) -> Result<TimeFilterSpec> {
    let value = raw
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_lowercase();

    if value.starts_with('[') && value.ends_with(']') {
        return parse_absolute_range(&value);
    }

    if let Some(spec) = parse_relative_keyword(&value) {
        return Ok(spec);
    }

    if value.contains("day") || value.contains("hour") {
        let cleaned: String = value.chars().filter(|ch| !ch.is_whitespace()).collect();
        if let Some(spec) = parse_numeric_suffix(&cleaned) {
            return Ok(spec);
        }
    }

    Err(ServiceError::InvalidRequest(format!(
        "unsupported time token '{raw}'"
    )))
}

fn parse_relative_keyword(value: &str) -> Option<TimeFilterSpec> {
    match value {
        "today" => return Some(TimeFilterSpec::Today),
        "yesterday" => return Some(TimeFilterSpec::Yesterday),
        _ => {}
    }

    let normalized = value.replace(['_', '-'], "");
    let stripped = normalized.strip_prefix("last").unwrap_or(&normalized);
    parse_numeric_suffix(stripped)
}

fn parse_numeric_suffix(value: &str) -> Option<TimeFilterSpec> {
    let split = value
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, suffix) = value.split_at(split);
    let amount: i64 = digits.parse().ok()?;

    match suffix.trim() {
        "h" | "hour" | "hours" => Some(TimeFilterSpec::RelativeHours(amount)),
        "d" | "day" | "days" => Some(TimeFilterSpec::RelativeDays(amount)),
        _ => None,
    }
}

fn parse_absolute_range(value: &str) -> Result<TimeFilterSpec> {
    let inner = value.trim_matches(['[', ']']);
    let (start_raw, end_raw) = inner
        .split_once(',')
        .ok_or_else(|| ServiceError::InvalidRequest("invalid time range".into()))?;
    let start_raw = start_raw.trim();
    let end_raw = end_raw.trim();

    if start_raw.is_empty() {
        return Err(ServiceError::InvalidRequest(
            "time range requires a start bound".into(),
        ));
    }

    let start = parse_datetime(start_raw)?;
    if end_raw.is_empty() {
        return Ok(TimeFilterSpec::AbsoluteOpenEnd { start });
    }
    let end = parse_datetime(end_raw)?;
    Ok(TimeFilterSpec::Absolute { start, end })
}

/// Accepts RFC 3339 or the bare `YYYY-MM-DD HH:MM:SS` form (read as UTC).
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let upper = value.to_uppercase();
    if let Ok(dt) = DateTime::parse_from_rfc3339(&upper) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, SQL_TIME_FORMAT) {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
    }
    Err(ServiceError::InvalidRequest(format!(
        "invalid time literal '{value}'"
    )))
}
