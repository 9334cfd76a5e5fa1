use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{FluxRow, SeriesStore};
use crate::error::AppError;

/// In-memory store for tests: canned rows, a readiness switch, and counters.
#[derive(Clone, Default)]
pub struct FakeStore {
    rows: Arc<Mutex<Vec<FluxRow>>>,
    not_ready: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
    queries: Arc<AtomicUsize>,
    last_query: Arc<Mutex<Option<String>>>,
}

impl FakeStore {
    pub fn with_rows(rows: Vec<FluxRow>) -> Self {
        let store = Self::default();
        *store.rows.lock().unwrap() = rows;
        store
    }

    pub fn set_ready(&self, ready: bool) {
        self.not_ready.store(!ready, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<String> {
        self.last_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl SeriesStore for FakeStore {
    async fn ping(&self) -> bool {
        !self.not_ready.load(Ordering::SeqCst)
    }

    async fn query(&self, flux: &str) -> Result<Vec<FluxRow>, AppError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(flux.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Query("store exploded".into()));
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}

/// Builds a row from `(column, value)` pairs.
pub fn row<const N: usize>(cells: [(&str, Value); N]) -> FluxRow {
    let mut map = Map::new();
    for (name, value) in cells {
        map.insert(name.to_string(), value);
    }
    FluxRow(map)
}
