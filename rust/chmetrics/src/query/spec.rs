use super::{render, validate};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Aggregation semantics applied to the source rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateVariant {
    /// Monotonic counters: per-bucket increase with counter-reset handling.
    #[default]
    #[serde(alias = "sum")]
    Rate,
    /// Instantaneous values: per-bucket average scaled by 1e-6.
    Gauge,
}

/// Builder state for one metric query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    pub select_columns: Vec<String>,
    pub from_table: String,
    /// Raw filter fragments appended after the fixed filter, e.g. `AND Attributes['zone'] = 'a'`.
    pub where_clauses: Vec<String>,
    pub group_columns: Vec<String>,
    pub interval: Option<u32>,
    pub metric_name: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl QuerySpec {
    pub fn is_grouped(&self) -> bool {
        !self.group_columns.is_empty()
    }

    /// Columns the rendered query returns ahead of `UsageTime` and `Usage`.
    pub fn output_columns(&self) -> &[String] {
        if self.is_grouped() {
            &self.group_columns
        } else {
            &self.select_columns
        }
    }
}

/// Fluent builder over a [`QuerySpec`].
///
/// The builder is a plain single-owner value: share it across tasks only by
/// cloning, one instance per in-flight query.
#[derive(Debug, Clone)]
pub struct MetricQueryBuilder {
    variant: TemplateVariant,
    spec: QuerySpec,
}

impl MetricQueryBuilder {
    pub fn new(variant: TemplateVariant) -> Self {
        Self::from_spec(variant, QuerySpec::default())
    }

    pub fn rate() -> Self {
        Self::new(TemplateVariant::Rate)
    }

    pub fn gauge() -> Self {
        Self::new(TemplateVariant::Gauge)
    }

    pub fn from_spec(variant: TemplateVariant, spec: QuerySpec) -> Self {
        Self { variant, spec }
    }

    pub fn variant(&self) -> TemplateVariant {
        self.variant
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec
            .select_columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn from(&mut self, table: impl Into<String>) -> &mut Self {
        self.spec.from_table = table.into();
        self
    }

    /// Appends raw `WHERE` fragments, each carrying its own leading `AND`/`OR`.
    pub fn filter<I, S>(&mut self, clauses: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec
            .where_clauses
            .extend(clauses.into_iter().map(Into::into));
        self
    }

    pub fn group<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec
            .group_columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn clear_group(&mut self) -> &mut Self {
        self.spec.group_columns.clear();
        self
    }

    pub fn interval(&mut self, seconds: u32) -> &mut Self {
        self.spec.interval = Some(seconds);
        self
    }

    pub fn range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> &mut Self {
        self.spec.start = Some(start);
        self.spec.end = Some(end);
        self
    }

    pub fn metric_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.spec.metric_name = name.into();
        self
    }

    /// Validates, renders and scans the statement. Pure in the builder state.
    pub fn build(&self) -> Result<String> {
        let window = validate::validate(&self.spec)?;
        let sql = render::render(self.variant, &self.spec, &window);
        validate::ensure_read_only(&sql)?;

        debug!(
            variant = ?self.variant,
            metric = %self.spec.metric_name,
            grouped = self.spec.is_grouped(),
            "rendered metric query"
        );
        Ok(sql)
    }
}
