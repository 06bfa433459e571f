//! Structural checks before rendering and the keyword scan after it.

use crate::{
    error::{Result, ServiceError, ValidationError},
    query::QuerySpec,
    time::TimeRange,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

pub const MIN_INTERVAL_SECS: u32 = 60;

static DANGEROUS_STATEMENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(CREATE|INSERT|UPDATE|TRUNCATE|DROP|DELETE|;)\s")
        .expect("dangerous statement pattern must compile")
});

/// Bucket width and time bounds of a spec that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketWindow {
    pub interval: u32,
    pub range: TimeRange,
}

/// Checks the spec in a fixed order and reports the first violation.
pub fn validate(spec: &QuerySpec) -> std::result::Result<BucketWindow, ValidationError> {
    if spec.from_table.trim().is_empty() {
        return Err(ValidationError::MissingTable);
    }
    if spec.select_columns.is_empty() {
        return Err(ValidationError::MissingColumns);
    }
    if spec.metric_name.trim().is_empty() {
        return Err(ValidationError::MissingMetricName);
    }

    let interval = match spec.interval {
        None | Some(0) => return Err(ValidationError::MissingInterval),
        Some(secs) if secs < MIN_INTERVAL_SECS => {
            return Err(ValidationError::IntervalTooShort(secs))
        }
        Some(secs) => secs,
    };

    let start = spec.start.ok_or(ValidationError::MissingStart)?;
    let end = spec.end.ok_or(ValidationError::MissingEnd)?;
    if end <= start {
        return Err(ValidationError::InvalidRange);
    }

    for group in &spec.group_columns {
        if group.is_empty() {
            return Err(ValidationError::EmptyGroupColumn);
        }
        if !spec.select_columns.contains(group) {
            return Err(ValidationError::UnknownGroupColumn(group.clone()));
        }
    }

    Ok(BucketWindow {
        interval,
        range: TimeRange { start, end },
    })
}

/// Rejects rendered SQL containing a write/DDL keyword or a statement separator
/// followed by whitespace, wherever it came from.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    if let Some(found) = DANGEROUS_STATEMENTS.find(sql) {
        warn!(
            keyword = found.as_str().trim_end(),
            offset = found.start(),
            "rejecting rendered statement"
        );
        return Err(ServiceError::DangerousStatement);
    }
    Ok(())
}
