use crate::{
    clickhouse::ClickHouseClient,
    config::AppConfig,
    error::{Result, ServiceError},
    query::{MetricQueryRequest, QueryEngine, QueryResponse, TranslateResponse},
    state::AppState,
};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let executor = ClickHouseClient::new(&config)?;
        let query = QueryEngine::new(Arc::new(executor), config.request_timeout);
        Ok(Self::with_engine(config, query))
    }

    /// Serves `query` instead of a ClickHouse-backed engine.
    pub fn with_engine(config: AppConfig, query: QueryEngine) -> Self {
        let config = Arc::new(config);
        let state = AppState::new(Arc::clone(&config), query);
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(Self::health))
            .route("/api/query", post(Self::query))
            .route("/api/translate", post(Self::translate))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, database = %self.config.clickhouse_database, "chmetrics listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn health() -> Json<serde_json::Value> {
        Json(json!({ "status": "ok" }))
    }

    async fn query(
        State(state): State<AppState>,
        headers: HeaderMap,
        Json(request): Json<MetricQueryRequest>,
    ) -> Result<Json<QueryResponse>> {
        enforce_api_key(&headers, &state.config)?;
        let response = state.query.execute_query(request).await?;
        Ok(Json(response))
    }

    async fn translate(
        State(state): State<AppState>,
        headers: HeaderMap,
        Json(request): Json<MetricQueryRequest>,
    ) -> Result<Json<TranslateResponse>> {
        enforce_api_key(&headers, &state.config)?;
        let response = state.query.translate(request)?;
        Ok(Json(response))
    }
}

fn enforce_api_key(headers: &HeaderMap, config: &AppConfig) -> Result<()> {
    if let Some(expected) = &config.api_key {
        let provided = headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());

        if provided != Some(expected.as_str()) {
            return Err(ServiceError::Auth);
        }
    }

    Ok(())
}
