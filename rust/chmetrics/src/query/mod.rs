mod render;
mod spec;
mod validate;

pub use render::LOOKBACK_PADDING_SECS;
pub use spec::{MetricQueryBuilder, QuerySpec, TemplateVariant};
pub use validate::{ensure_read_only, validate, BucketWindow, MIN_INTERVAL_SECS};

use crate::{
    error::{Result, ServiceError},
    mapper::{self, RowShape},
    model::MetricSeries,
    rows::RowSource,
    time::{parse_datetime, parse_time_value},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, info};

/// Runs rendered SQL against the store.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Box<dyn RowSource>>;
}

#[derive(Clone)]
pub struct QueryEngine {
    executor: Arc<dyn SqlExecutor>,
    timeout: Duration,
}

impl QueryEngine {
    pub fn new(executor: Arc<dyn SqlExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    /// Builds, executes and maps one query into a single series.
    ///
    /// Execution and decoding share one deadline; when it expires nothing is
    /// returned but the timeout error.
    pub async fn query(&self, builder: &MetricQueryBuilder, shape: &RowShape) -> Result<MetricSeries> {
        let sql = builder.build()?;
        let metric_name = builder.spec().metric_name.as_str();
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.timeout, async {
            let mut rows = self.executor.execute(&sql).await?;
            mapper::map_series(rows.as_mut(), shape, metric_name)
        })
        .await;

        let series = match outcome {
            Ok(Ok(series)) => series,
            Ok(Err(err)) => {
                debug!(metric = %metric_name, error = %err, "metric query failed");
                return Err(err);
            }
            Err(_) => {
                debug!(metric = %metric_name, timeout = ?self.timeout, "metric query timed out");
                return Err(ServiceError::Timeout(self.timeout));
            }
        };

        info!(
            metric = %metric_name,
            samples = series.samples.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "metric query completed"
        );
        Ok(series)
    }

    pub async fn execute_query(&self, request: MetricQueryRequest) -> Result<QueryResponse> {
        let builder = request.into_builder(Utc::now())?;
        let shape = RowShape::for_spec(builder.spec());
        let series = self.query(&builder, &shape).await?;
        Ok(QueryResponse {
            metrics: vec![series],
        })
    }

    pub fn translate(&self, request: MetricQueryRequest) -> Result<TranslateResponse> {
        translate_request(request, Utc::now())
    }
}

pub fn translate_request(request: MetricQueryRequest, now: DateTime<Utc>) -> Result<TranslateResponse> {
    let builder = request.into_builder(now)?;
    Ok(TranslateResponse {
        sql: builder.build()?,
    })
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricQueryRequest {
    #[serde(default)]
    pub variant: TemplateVariant,
    #[serde(default)]
    pub metric_name: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default, rename = "where")]
    pub filters: Vec<String>,
    #[serde(default)]
    pub group: Vec<String>,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    /// Preset such as `last_24h` or `[2024-05-01 00:00:00,2024-05-02 00:00:00]`.
    #[serde(default)]
    pub time: Option<String>,
}

impl MetricQueryRequest {
    /// Explicit `start`/`end` take precedence over the `time` preset.
    pub fn into_builder(self, now: DateTime<Utc>) -> Result<MetricQueryBuilder> {
        let preset = self
            .time
            .as_deref()
            .map(parse_time_value)
            .transpose()?
            .map(|spec| spec.resolve(now))
            .transpose()?;
        let start = self
            .start
            .as_deref()
            .map(parse_datetime)
            .transpose()?
            .or(preset.map(|range| range.start));
        let end = self
            .end
            .as_deref()
            .map(parse_datetime)
            .transpose()?
            .or(preset.map(|range| range.end));

        let spec = QuerySpec {
            select_columns: self.select,
            from_table: self.from,
            where_clauses: self.filters,
            group_columns: self.group,
            interval: self.interval,
            metric_name: self.metric_name,
            start,
            end,
        };
        Ok(MetricQueryBuilder::from_spec(self.variant, spec))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub metrics: Vec<MetricSeries>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslateResponse {
    pub sql: String,
}
