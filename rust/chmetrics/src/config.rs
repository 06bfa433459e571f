use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: String,
    pub clickhouse_password: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    chmetrics_listen_addr: Option<String>,
    #[serde(default)]
    chmetrics_listen_host: Option<String>,
    #[serde(default)]
    chmetrics_listen_port: Option<u16>,
    #[serde(default)]
    chmetrics_clickhouse_url: Option<String>,
    #[serde(default)]
    clickhouse_url: Option<String>,
    #[serde(default = "default_database")]
    chmetrics_clickhouse_database: String,
    #[serde(default = "default_user")]
    chmetrics_clickhouse_user: String,
    #[serde(default)]
    chmetrics_clickhouse_password: Option<String>,
    #[serde(default)]
    chmetrics_api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    chmetrics_request_timeout_secs: u64,
}

fn default_database() -> String {
    "otel".to_string()
}

fn default_user() -> String {
    "default".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse CHMETRICS_* environment variables")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let listen_addr = resolve_addr(
            raw.chmetrics_listen_addr,
            raw.chmetrics_listen_host,
            raw.chmetrics_listen_port,
        )?;

        let clickhouse_url = raw
            .chmetrics_clickhouse_url
            .or(raw.clickhouse_url)
            .filter(|url| !url.trim().is_empty())
            .context("CHMETRICS_CLICKHOUSE_URL or CLICKHOUSE_URL must be set")?;

        Ok(Self {
            listen_addr,
            clickhouse_url,
            clickhouse_database: raw.chmetrics_clickhouse_database,
            clickhouse_user: raw.chmetrics_clickhouse_user,
            clickhouse_password: raw.chmetrics_clickhouse_password.filter(|p| !p.is_empty()),
            api_key: raw.chmetrics_api_key.filter(|key| !key.is_empty()),
            request_timeout: Duration::from_secs(raw.chmetrics_request_timeout_secs.max(1)),
        })
    }

    /// Local configuration against `clickhouse_url`, listening on an ephemeral port.
    pub fn embedded(clickhouse_url: impl Into<String>) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            clickhouse_url: clickhouse_url.into(),
            clickhouse_database: default_database(),
            clickhouse_user: default_user(),
            clickhouse_password: None,
            api_key: None,
            request_timeout: Duration::from_secs(default_timeout_secs()),
        }
    }
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid CHMETRICS_LISTEN_ADDR value")?
            .next()
            .context("CHMETRICS_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8490);
    let combined = format!("{}:{}", host, port);
    combined
        .to_socket_addrs()
        .context("invalid listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(vars: &[(&str, &str)]) -> RawConfig {
        envy::from_iter(
            vars.iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        )
        .expect("raw config should parse")
    }

    #[test]
    fn applies_defaults() {
        let config = AppConfig::from_raw(raw(&[("CLICKHOUSE_URL", "http://ch:8123")])).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8490".parse().unwrap());
        assert_eq!(config.clickhouse_url, "http://ch:8123");
        assert_eq!(config.clickhouse_database, "otel");
        assert_eq!(config.clickhouse_user, "default");
        assert_eq!(config.clickhouse_password, None);
        assert_eq!(config.api_key, None);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn prefixed_values_win() {
        let config = AppConfig::from_raw(raw(&[
            ("CHMETRICS_CLICKHOUSE_URL", "http://primary:8123"),
            ("CLICKHOUSE_URL", "http://fallback:8123"),
            ("CHMETRICS_LISTEN_HOST", "127.0.0.1"),
            ("CHMETRICS_LISTEN_PORT", "9000"),
            ("CHMETRICS_API_KEY", "secret"),
            ("CHMETRICS_REQUEST_TIMEOUT_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.clickhouse_url, "http://primary:8123");
        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout, Duration::from_secs(1));
    }

    #[test]
    fn requires_clickhouse_url() {
        let err = AppConfig::from_raw(raw(&[])).unwrap_err();
        assert!(err.to_string().contains("CLICKHOUSE_URL"));
    }
}
