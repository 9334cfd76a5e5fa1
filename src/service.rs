use log::{debug, error};
use std::sync::Arc;

use crate::cache::ReadThroughCache;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{CacheKey, Field, Payload, SeriesMap, WideRecord};
use crate::normalize;
use crate::query::{self, QueryWindow};
use crate::store::SeriesStore;

/// Price history for catalog entities, served through the response cache.
#[derive(Clone)]
pub struct PriceHistory {
    store: Arc<dyn SeriesStore>,
    cache: ReadThroughCache,
    bucket: String,
    window: QueryWindow,
    contact_message: String,
}

impl PriceHistory {
    pub fn new(store: Arc<dyn SeriesStore>, cache: ReadThroughCache, config: &Config) -> Self {
        Self {
            store,
            cache,
            bucket: config.influx_bucket.clone(),
            window: config.window(),
            contact_message: config.contact_message.clone(),
        }
    }

    pub async fn series(&self, entity_id: u64, field: Field) -> Result<SeriesMap, AppError> {
        let key = CacheKey::series(entity_id, field);
        let payload = self
            .cache
            .get_or_compute(&key, || self.fetch_series(entity_id, field))
            .await?;

        match payload {
            Payload::Series(map) => Ok(map),
            Payload::Records(_) => Err(AppError::Internal(format!("cached {} holds records", key))),
        }
    }

    pub async fn records(&self, entity_id: u64) -> Result<Vec<WideRecord>, AppError> {
        let key = CacheKey::wide(entity_id);
        let payload = self
            .cache
            .get_or_compute(&key, || self.fetch_records(entity_id))
            .await?;

        match payload {
            Payload::Records(records) => Ok(records),
            Payload::Series(_) => Err(AppError::Internal(format!("cached {} holds a series", key))),
        }
    }

    async fn ensure_ready(&self) -> Result<(), AppError> {
        if self.store.ping().await {
            Ok(())
        } else {
            error!("InfluxDB NOT READY");
            Err(AppError::UpstreamUnavailable(self.contact_message.clone()))
        }
    }

    async fn fetch_series(&self, entity_id: u64, field: Field) -> Result<Payload, AppError> {
        self.ensure_ready().await?;

        let flux = query::field_query(&self.bucket, entity_id, field, &self.window);
        let rows = self.store.query(&flux).await?;
        let map = normalize::series_map(entity_id, &rows);
        debug!("{} {}: {} points", entity_id, field, map.len());

        Ok(Payload::Series(map))
    }

    async fn fetch_records(&self, entity_id: u64) -> Result<Payload, AppError> {
        self.ensure_ready().await?;

        let flux = query::wide_query(&self.bucket, entity_id, &self.window);
        let rows = self.store.query(&flux).await?;

        Ok(Payload::Records(normalize::wide_records(entity_id, &rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use crate::store::fake::{row, FakeStore};
    use serde_json::json;

    fn service(store: &FakeStore) -> PriceHistory {
        let mut config = Config::default();
        config.influx_bucket = "prices".into();
        config.contact_message = "Ask ops".into();
        let cache = ReadThroughCache::new(
            Arc::new(MemoryBackend::new(100, config.cache_ttl())),
            config.cache_ttl(),
        );
        PriceHistory::new(Arc::new(store.clone()), cache, &config)
    }

    #[tokio::test]
    async fn series_queries_once_then_hits_cache() {
        let store = FakeStore::with_rows(vec![row([
            ("_time", json!("2024-01-01T00:00:00Z")),
            ("_value", json!(999.0)),
        ])]);
        let svc = service(&store);

        let first = svc.series(100044884, Field::Price).await.unwrap();
        let second = svc.series(100044884, Field::Price).await.unwrap();

        assert_eq!(store.query_count(), 1);
        assert_eq!(first, second);
        assert_eq!(first.get(&1_704_067_200_000), Some(&999.0));

        let flux = store.last_query().unwrap();
        assert!(flux.contains(r#"r["_field"] == "price""#));
        assert!(flux.contains(r#"r["id_"] == "100044884""#));
    }

    #[tokio::test]
    async fn fields_are_cached_separately() {
        let store = FakeStore::default();
        let svc = service(&store);

        svc.series(1, Field::Price).await.unwrap();
        svc.series(1, Field::OldPrice).await.unwrap();
        svc.records(1).await.unwrap();

        assert_eq!(store.query_count(), 3);
        assert!(store.last_query().unwrap().contains("schema.fieldsAsCols()"));
    }

    #[tokio::test]
    async fn empty_store_is_not_an_error() {
        let store = FakeStore::default();
        let svc = service(&store);

        assert!(svc.series(7, Field::Discount).await.unwrap().is_empty());
        assert!(svc.records(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn not_ready_store_is_never_queried() {
        let store = FakeStore::default();
        store.set_ready(false);
        let svc = service(&store);

        match svc.series(1, Field::Price).await {
            Err(AppError::UpstreamUnavailable(msg)) => assert_eq!(msg, "Ask ops"),
            other => panic!("expected upstream unavailable, got {:?}", other),
        }
        assert!(matches!(svc.records(1).await, Err(AppError::UpstreamUnavailable(_))));
        assert_eq!(store.query_count(), 0);

        // failure was not cached
        store.set_ready(true);
        assert!(svc.series(1, Field::Price).await.is_ok());
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn query_failures_propagate_and_are_retried_next_time() {
        let store = FakeStore::default();
        store.set_failing(true);
        let svc = service(&store);

        assert!(matches!(svc.records(1).await, Err(AppError::Query(_))));

        store.set_failing(false);
        assert!(svc.records(1).await.is_ok());
        assert_eq!(store.query_count(), 2);
    }
}
