//! Time-to-live cache in front of a [`CrmSource`].
//!
//! Responses are memoized per request (kind plus every parameter) for a
//! fixed TTL. Failed requests are never cached.

use crate::crm::source::{CrmError, CrmSource, DealQuery};
use async_trait::async_trait;
use moka::sync::Cache;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Settings for the response cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 256,
        }
    }
}

/// A [`CrmSource`] that memoizes another source's responses.
pub struct CachedSource<S> {
    inner: S,
    responses: Cache<String, Value>,
}

impl<S: CrmSource> CachedSource<S> {
    /// Wrap `inner` with a cache built from `settings`.
    pub fn new(inner: S, settings: CacheSettings) -> Self {
        let responses = Cache::builder()
            .max_capacity(settings.max_entries)
            .time_to_live(settings.ttl)
            .build();

        Self { inner, responses }
    }

    /// Drop every cached response.
    #[allow(dead_code)] // Used by tests
    pub fn invalidate_all(&self) {
        self.responses.invalidate_all();
    }

    async fn cached<F>(&self, key: String, fetch: F) -> Result<Value, CrmError>
    where
        F: std::future::Future<Output = Result<Value, CrmError>>,
    {
        if let Some(hit) = self.responses.get(&key) {
            debug!("Cache hit: {}", key);
            return Ok(hit);
        }

        debug!("Cache miss: {}", key);
        let value = fetch.await?;
        self.responses.insert(key, value.clone());
        Ok(value)
    }
}

fn deals_key(query: &DealQuery) -> String {
    format!(
        "deals|{}|{}|{}|{}",
        query.start_date,
        query.end_date,
        query.limit,
        query.pipeline_id.as_deref().unwrap_or("*")
    )
}

fn stages_key(pipeline_id: Option<&str>) -> String {
    format!("stages|{}", pipeline_id.unwrap_or("*"))
}

#[async_trait]
impl<S: CrmSource> CrmSource for CachedSource<S> {
    async fn deals(&self, query: &DealQuery) -> Result<Value, CrmError> {
        self.cached(deals_key(query), self.inner.deals(query)).await
    }

    async fn stages(&self, pipeline_id: Option<&str>) -> Result<Value, CrmError> {
        self.cached(stages_key(pipeline_id), self.inner.stages(pipeline_id))
            .await
    }

    async fn pipelines(&self) -> Result<Value, CrmError> {
        self.cached("pipelines".to_string(), self.inner.pipelines())
            .await
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}
