//! Read-through response cache over a pluggable backend.
//!
//! There is no single-flight: concurrent misses on one key may all compute,
//! and the last write wins. Backend failures degrade to pass-through.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use moka::future::Cache;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{CacheKey, Payload};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: Payload,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.stored_at.checked_add_signed(ttl))
            .map_or(true, |expires_at| now < expires_at)
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<CacheEntry>>;

    async fn put(&self, key: &str, entry: CacheEntry, ttl: Duration) -> anyhow::Result<()>;
}

/// Process-local backend. Entries are also evicted by moka after the TTL.
pub struct MemoryBackend {
    entries: Cache<String, CacheEntry>,
}

impl MemoryBackend {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { entries }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> anyhow::Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).await)
    }

    async fn put(&self, key: &str, entry: CacheEntry, _ttl: Duration) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }
}

/// Shared backend for multi-instance deployments. Entries are stored as JSON
/// with a Redis-side expiry.
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("invalid REDIS_URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("connecting to Redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> anyhow::Result<Option<CacheEntry>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, entry: CacheEntry, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(&entry)?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(raw)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ReadThroughCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ReadThroughCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self::with_clock(backend, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Arc<dyn CacheBackend>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { backend, ttl, clock }
    }

    /// Returns the fresh cached payload for `key`, or runs `compute` and
    /// stores its result. Failed computations are not stored.
    pub async fn get_or_compute<F, Fut>(&self, key: &CacheKey, compute: F) -> Result<Payload, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Payload, AppError>>,
    {
        let key = key.to_string();

        match self.backend.get(&key).await {
            Ok(Some(entry)) if entry.is_fresh(self.clock.now(), self.ttl) => {
                debug!("Cache hit for {}", key);
                return Ok(entry.payload);
            }
            Ok(_) => debug!("Cache miss for {}", key),
            Err(e) => warn!("Cache read failed for {}: {:#}", key, e),
        }

        let payload = compute().await?;

        let entry = CacheEntry {
            payload: payload.clone(),
            stored_at: self.clock.now(),
        };
        if let Err(e) = self.backend.put(&key, entry, self.ttl).await {
            warn!("Cache write failed for {}: {:#}", key, e);
        }

        Ok(payload)
    }
}
