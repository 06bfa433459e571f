use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Structural problems with a `QuerySpec`, reported before rendering.
///
/// Variants are listed in the order `validate` checks them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("FROM table is required")]
    MissingTable,

    #[error("SELECT columns are required")]
    MissingColumns,

    #[error("metric name is required")]
    MissingMetricName,

    #[error("interval is required")]
    MissingInterval,

    #[error("interval must be at least 60 seconds")]
    IntervalTooShort(u32),

    #[error("start time is required")]
    MissingStart,

    #[error("end time is required")]
    MissingEnd,

    #[error("range invalid, 'end' must be after 'start'")]
    InvalidRange,

    #[error("group column name can not be empty")]
    EmptyGroupColumn,

    #[error("group column {0} is not in SELECT columns")]
    UnknownGroupColumn(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("authentication failed")]
    Auth,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("SQL statement contains dangerous keywords")]
    DangerousStatement,

    #[error("query execution failed: {0}")]
    Execution(String),

    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("result mapping failed: {0}")]
    Mapping(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::Auth => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidRequest(_)
            | ServiceError::Validation(_)
            | ServiceError::DangerousStatement => StatusCode::BAD_REQUEST,
            ServiceError::Execution(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Mapping(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if !status.is_client_error() {
            error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
