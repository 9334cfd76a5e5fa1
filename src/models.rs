use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Tracked numeric attributes of a catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Price,
    Discount,
    OldPrice,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Price => "price",
            Field::Discount => "discount",
            Field::OldPrice => "old_price",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    Series,
    Wide,
}

impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryShape::Series => f.write_str("series"),
            QueryShape::Wide => f.write_str("wide"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub timestamp_ms: i64,
    pub value: f64,
}

/// Epoch milliseconds to averaged value. Serializes as a JSON object with
/// stringified integer keys.
pub type SeriesMap = BTreeMap<i64, f64>;

/// One timestamp of a multi-field result: `_time` plus whichever fields
/// were present at that instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WideRecord(pub Map<String, Value>);

impl WideRecord {
    #[cfg(test)]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }
}

/// Normalized response as held by the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Series(SeriesMap),
    Records(Vec<WideRecord>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity_id: u64,
    pub field: Option<Field>,
    pub shape: QueryShape,
}

impl CacheKey {
    pub fn series(entity_id: u64, field: Field) -> Self {
        Self {
            entity_id,
            field: Some(field),
            shape: QueryShape::Series,
        }
    }

    pub fn wide(entity_id: u64) -> Self {
        Self {
            entity_id,
            field: None,
            shape: QueryShape::Wide,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = self.field.map(|f| f.as_str()).unwrap_or("all");
        write!(f, "chronoprice:{}:{}:{}", self.shape, self.entity_id, field)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
}
