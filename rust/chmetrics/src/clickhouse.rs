//! ClickHouse HTTP interface executor.

use crate::{
    config::AppConfig,
    error::{Result, ServiceError},
    query::SqlExecutor,
    rows::{JsonRows, RowSource},
};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";

#[derive(Clone)]
pub struct ClickHouseClient {
    client: Client,
    endpoint: Url,
    user: String,
    password: Option<String>,
    timeout: Duration,
}

impl ClickHouseClient {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build ClickHouse HTTP client")?;
        let endpoint = Url::parse_with_params(
            &config.clickhouse_url,
            &[
                ("database", config.clickhouse_database.as_str()),
                ("default_format", "JSONCompact"),
                ("date_time_output_format", "iso"),
            ],
        )
        .context("invalid ClickHouse URL")?;

        Ok(Self {
            client,
            endpoint,
            user: config.clickhouse_user.clone(),
            password: config.clickhouse_password.clone(),
            timeout: config.request_timeout,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout(self.timeout)
        } else {
            ServiceError::Execution(err.to_string())
        }
    }
}

#[async_trait]
impl SqlExecutor for ClickHouseClient {
    async fn execute(&self, sql: &str) -> Result<Box<dyn RowSource>> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(USER_HEADER, &self.user)
            .body(sql.to_owned());
        if let Some(password) = &self.password {
            request = request.header(KEY_HEADER, password);
        }

        let response = request
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "ClickHouse rejected query");
            return Err(ServiceError::Execution(format!(
                "ClickHouse returned status {status}: {}",
                body.trim()
            )));
        }

        let payload: CompactPayload = response
            .json()
            .await
            .map_err(|err| self.transport_error(err))?;
        debug!(
            columns = payload.meta.len(),
            rows = payload.data.len(),
            "ClickHouse query returned"
        );
        Ok(Box::new(payload.into_rows()))
    }
}

/// Body of a `JSONCompact` response.
#[derive(Debug, Deserialize)]
struct CompactPayload {
    meta: Vec<ColumnMeta>,
    #[serde(default)]
    data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ColumnMeta {
    name: String,
}

impl CompactPayload {
    fn into_rows(self) -> JsonRows {
        let columns = self.meta.into_iter().map(|column| column.name).collect();
        JsonRows::new(columns, self.data)
    }
}
