use anyhow::Context;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::{decode_annotated_csv, FluxRow, SeriesStore};
use crate::config::Config;
use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
}

/// InfluxDB 2.x query API client.
#[derive(Clone)]
pub struct InfluxStore {
    client: Client,
    base_url: String,
    token: String,
    org: String,
    retry: RetryPolicy,
}

impl InfluxStore {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("building InfluxDB HTTP client")?;

        Ok(Self {
            client,
            base_url: config.influx_url.trim_end_matches('/').to_string(),
            token: config.influx_token.clone(),
            org: config.influx_org.clone(),
            retry: RetryPolicy {
                attempts: config.retry_attempts,
                initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
            },
        })
    }

    fn query_url(&self) -> String {
        format!("{}/api/v2/query?org={}", self.base_url, urlencoding::encode(&self.org))
    }

    /// Sends the request built by `build`, retrying transport failures and
    /// retryable statuses with exponential backoff.
    async fn send_with_retry<F>(&self, what: &str, build: F) -> Result<Response, AppError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut delay = self.retry.initial_delay;

        for attempt in 1..=self.retry.attempts {
            let last = attempt == self.retry.attempts;
            match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if last || !is_retryable(status) {
                        let body = response.text().await.unwrap_or_default();
                        return Err(AppError::Query(format!(
                            "{} returned {}: {}",
                            what,
                            status,
                            influx_message(&body)
                        )));
                    }
                    warn!("{} returned {}, retry {}/{} in {:?}", what, status, attempt, self.retry.attempts, delay);
                }
                Err(e) => {
                    if last {
                        return Err(e.into());
                    }
                    warn!("{} failed: {}, retry {}/{} in {:?}", what, e, attempt, self.retry.attempts, delay);
                }
            }

            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        Err(AppError::Internal(format!("{}: no attempts configured", what)))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// InfluxDB reports failures as `{"code": ..., "message": ...}`.
fn influx_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl SeriesStore for InfluxStore {
    async fn ping(&self) -> bool {
        let url = format!("{}/ping", self.base_url);
        match self.send_with_retry("ping", || self.client.get(&url)).await {
            Ok(_) => true,
            Err(e) => {
                warn!("InfluxDB ping failed: {}", e);
                false
            }
        }
    }

    async fn query(&self, flux: &str) -> Result<Vec<FluxRow>, AppError> {
        let url = self.query_url();
        let body = json!({
            "query": flux,
            "type": "flux",
            "dialect": {
                "header": true,
                "annotations": ["datatype", "group", "default"]
            }
        });

        debug!("Flux query:\n{}", flux);
        let response = self
            .send_with_retry("query", || {
                self.client
                    .post(&url)
                    .header(header::AUTHORIZATION, format!("Token {}", self.token))
                    .header(header::ACCEPT, "application/csv")
                    .json(&body)
            })
            .await?;

        let text = response.text().await?;
        decode_annotated_csv(&text)
    }
}
