use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::AppError;

mod annotated_csv;
mod influx;
#[cfg(test)]
pub mod fake;

pub use annotated_csv::decode_annotated_csv;
pub use influx::InfluxStore;

/// One decoded row of a Flux result, columns in response order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxRow(pub Map<String, Value>);

impl FluxRow {
    #[cfg(test)]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        let raw = self.0.get("_time")?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn value(&self) -> Option<f64> {
        self.0.get("_value").and_then(Value::as_f64)
    }
}

/// Backing time-series store. The only suspension point of a request.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Readiness probe. `false` covers both "not ready" and "unreachable".
    async fn ping(&self) -> bool;

    async fn query(&self, flux: &str) -> Result<Vec<FluxRow>, AppError>;
}
