use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::models::{SeriesMap, SeriesPoint, WideRecord};
use crate::store::FluxRow;

/// Columns Flux adds to every row that carry no information for clients.
pub const BOOKKEEPING_COLUMNS: [&str; 6] = ["result", "table", "_measurement", "id_", "_start", "_stop"];

pub fn series_point(row: &FluxRow) -> Option<SeriesPoint> {
    Some(SeriesPoint {
        timestamp_ms: row.time()?.timestamp_millis(),
        value: row.value()?,
    })
}

/// `(_time, _value)` rows to an epoch-millisecond keyed map.
pub fn series_map(entity_id: u64, rows: &[FluxRow]) -> SeriesMap {
    let mut map = SeriesMap::new();
    for row in rows {
        match series_point(row) {
            Some(point) => {
                map.insert(point.timestamp_ms, point.value);
            }
            None => debug!("Skipping row without _time/_value: {:?}", row.0),
        }
    }
    if map.is_empty() {
        info!("Empty response on {}", entity_id);
    }
    map
}

/// Pivoted rows to one record per timestamp, bookkeeping columns removed.
///
/// Rows sharing a `_time` (several output tables) are merged. Null cells
/// are dropped, so records only hold the fields present at that instant.
pub fn wide_records(entity_id: u64, rows: &[FluxRow]) -> Vec<WideRecord> {
    if rows.is_empty() {
        info!("Empty response on {}", entity_id);
        return Vec::new();
    }

    let mut by_time: BTreeMap<DateTime<Utc>, Map<String, Value>> = BTreeMap::new();
    for row in rows {
        let Some(time) = row.time() else {
            debug!("Skipping row without _time: {:?}", row.0);
            continue;
        };
        let fields = by_time.entry(time).or_default();
        for (column, value) in &row.0 {
            if column == "_time" || value.is_null() || BOOKKEEPING_COLUMNS.contains(&column.as_str()) {
                continue;
            }
            fields.insert(column.clone(), value.clone());
        }
    }

    let records: Vec<WideRecord> = by_time
        .into_iter()
        .filter(|(_, fields)| !fields.is_empty())
        .map(|(time, fields)| {
            let mut record = Map::with_capacity(fields.len() + 1);
            record.insert(
                "_time".to_string(),
                Value::String(time.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            );
            record.extend(fields);
            WideRecord(record)
        })
        .collect();

    if records.is_empty() {
        info!("Empty response on {}", entity_id);
    } else {
        debug!("{}: returning {} records", entity_id, records.len());
    }
    records
}
