use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::query::{FluxDuration, QueryWindow};

/// Upper bound for `cache_ttl_secs`: one year.
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 3600;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub influx_url: String,
    pub influx_token: String,
    pub influx_org: String,
    pub influx_bucket: String,
    /// Shared cache backend. `None` keeps the cache in-process.
    pub redis_url: Option<String>,
    pub listen_addr: String,
    pub listen_port: u16,
    pub query_range: FluxDuration,
    pub aggregate_every: FluxDuration,
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub contact_message: String,
}

impl Default for Config {
    fn default() -> Self {
        let window = QueryWindow::default();
        Self {
            influx_url: "http://localhost:8086".to_string(),
            influx_token: String::new(),
            influx_org: String::new(),
            influx_bucket: String::new(),
            redis_url: None,
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            query_range: window.range,
            aggregate_every: window.every,
            cache_ttl_secs: 12 * 3600,
            cache_capacity: 10_000,
            request_timeout_secs: 600,
            retry_attempts: 3,
            retry_initial_delay_ms: 500,
            contact_message: "Database error. Please contact the service operator.".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file if one is given, then the environment.
    /// A given file that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("INFLUXDB_URL") {
            self.influx_url = v;
        }
        if let Some(v) = var("INFLUXDB_TOKEN") {
            self.influx_token = v;
        }
        if let Some(v) = var("INFLUXDB_ORG") {
            self.influx_org = v;
        }
        if let Some(v) = var("INFLUXDB_BUCKET") {
            self.influx_bucket = v;
        }
        if let Some(v) = var("REDIS_URL") {
            self.redis_url = Some(v).filter(|url| !url.trim().is_empty());
        }
        if let Some(v) = var("CHRONOPRICE_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = var("CHRONOPRICE_PORT") {
            self.listen_port = v.parse().context("CHRONOPRICE_PORT must be a port number")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.influx_url.trim().is_empty() {
            bail!("INFLUXDB_URL must be set");
        }
        if self.influx_bucket.trim().is_empty() {
            bail!("INFLUXDB_BUCKET must be set");
        }
        if self.retry_attempts == 0 {
            bail!("retry_attempts must be at least 1");
        }
        if self.cache_ttl_secs == 0 || self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            bail!("cache_ttl_secs must be between 1 and {}", MAX_CACHE_TTL_SECS);
        }
        Ok(())
    }

    pub fn window(&self) -> QueryWindow {
        QueryWindow {
            range: self.query_range.clone(),
            every: self.aggregate_every.clone(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
