//! Flux query construction.
//!
//! Only typed values reach the query text: the entity id is an integer, the
//! field comes from [`Field`], and window durations are validated
//! [`FluxDuration`]s. The bucket is configuration and is escaped as a string
//! literal.

use anyhow::{bail, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::models::Field;

/// Flux duration literal such as `12h`, `3y` or `1d12h`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FluxDuration(String);

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+(ns|us|µs|ms|mo|s|m|h|d|w|y))+$").expect("valid regex"))
}

impl FluxDuration {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if !duration_re().is_match(s) {
            bail!("invalid Flux duration literal: {:?}", s);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FluxDuration {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FluxDuration> for String {
    fn from(value: FluxDuration) -> Self {
        value.0
    }
}

impl fmt::Display for FluxDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trailing range and aggregation bucket applied to every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWindow {
    pub range: FluxDuration,
    pub every: FluxDuration,
}

impl Default for QueryWindow {
    fn default() -> Self {
        Self {
            range: FluxDuration("3y".to_string()),
            every: FluxDuration("12h".to_string()),
        }
    }
}

fn flux_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Single field of one entity, downsampled with a windowed mean.
pub fn field_query(bucket: &str, entity_id: u64, field: Field, window: &QueryWindow) -> String {
    format!(
        r#"from(bucket: {bucket})
    |> range(start: -{range})
    |> filter(fn: (r) => r["id_"] == "{id}")
    |> filter(fn: (r) => r["_field"] == "{field}")
    |> aggregateWindow(every: {every}, fn: mean, createEmpty: false)
"#,
        bucket = flux_string(bucket),
        range = window.range,
        id = entity_id,
        field = field.as_str(),
        every = window.every,
    )
}

/// All fields of one entity pivoted into columns, sorted by time.
pub fn wide_query(bucket: &str, entity_id: u64, window: &QueryWindow) -> String {
    format!(
        r#"import "influxdata/influxdb/schema"
from(bucket: {bucket})
    |> range(start: -{range})
    |> filter(fn: (r) => r["id_"] == "{id}")
    |> aggregateWindow(every: {every}, fn: mean, createEmpty: false)
    |> sort(columns: ["_time"])
    |> schema.fieldsAsCols()
"#,
        bucket = flux_string(bucket),
        range = window.range,
        id = entity_id,
        every = window.every,
    )
}
