//! ClickHouse metric queries: SQL rendering for counter-rate and gauge series,
//! row-to-sample mapping, and an HTTP front end over both.

pub mod clickhouse;
pub mod config;
pub mod error;
pub mod mapper;
pub mod model;
pub mod query;
pub mod rows;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod time;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the service using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config)?.run().await
}
