use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{self, Request, StatusCode},
    Router,
};
use chmetrics::{
    config::AppConfig,
    error::{Result, ServiceError},
    query::{QueryEngine, SqlExecutor},
    rows::{JsonRows, RowSource},
    server::Server,
};
use serde::Serialize;
use serde_json::Value;
use std::{
    sync::{Arc, Mutex, Once},
    time::Duration,
};
use tower::ServiceExt;

pub const API_KEY: &str = "test-api-key";

static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("chmetrics=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Executor returning canned `JSONCompact`-style rows and recording every statement.
#[derive(Default)]
pub struct StaticExecutor {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    statements: Mutex<Vec<String>>,
}

impl StaticExecutor {
    pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .expect("statement log should not be poisoned")
            .clone()
    }
}

#[async_trait]
impl SqlExecutor for StaticExecutor {
    async fn execute(&self, sql: &str) -> Result<Box<dyn RowSource>> {
        self.statements
            .lock()
            .expect("statement log should not be poisoned")
            .push(sql.to_string());
        Ok(Box::new(JsonRows::new(
            self.columns.clone(),
            self.rows.clone(),
        )))
    }
}

pub struct FailingExecutor(pub &'static str);

#[async_trait]
impl SqlExecutor for FailingExecutor {
    async fn execute(&self, _sql: &str) -> Result<Box<dyn RowSource>> {
        Err(ServiceError::Execution(self.0.to_string()))
    }
}

/// Never answers within any reasonable deadline.
pub struct StalledExecutor;

#[async_trait]
impl SqlExecutor for StalledExecutor {
    async fn execute(&self, _sql: &str) -> Result<Box<dyn RowSource>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Box::new(JsonRows::new(Vec::new(), Vec::new())))
    }
}

pub fn engine(executor: Arc<dyn SqlExecutor>, timeout: Duration) -> QueryEngine {
    QueryEngine::new(executor, timeout)
}

pub struct TestHarness {
    router: Router,
}

impl TestHarness {
    pub fn new(executor: Arc<dyn SqlExecutor>, api_key: Option<&str>) -> Self {
        init_tracing();
        let mut config = AppConfig::embedded("http://127.0.0.1:8123");
        config.api_key = api_key.map(str::to_string);
        let query = engine(executor, config.request_timeout);
        let router = Server::with_engine(config, query).router();
        Self { router }
    }

    pub async fn get(&self, path: &str) -> http::Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("failed to build harness request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should handle harness request")
    }

    pub async fn post<T>(&self, path: &str, payload: &T, include_api_key: bool) -> http::Response<Body>
    where
        T: Serialize,
    {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(http::header::CONTENT_TYPE, "application/json");

        if include_api_key {
            builder = builder.header("x-api-key", API_KEY);
        }

        let body = serde_json::to_vec(payload).expect("request payload should serialize");
        let request = builder
            .body(Body::from(body))
            .expect("failed to build harness request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should handle harness request")
    }
}

pub async fn read_json(response: http::Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("response body should deserialize");
    let value =
        serde_json::from_slice::<Value>(&bytes).expect("response body should be valid JSON");
    (status, value)
}
