//! Cached view of the currently usable endpoints
//!
//! Scanning the full configuration on every request is wasteful, so the
//! enabled/provider filter result is cached per provider for a short TTL. The
//! cooldown filter is never cached: health changes far more often than
//! configuration and is re-applied on every call.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::endpoint::EndpointConfig;
use super::health::HealthRegistry;
use crate::error::DispatchError;
use crate::store::ConfigStore;

/// Cache key used when no provider filter is given
pub const ALL_PROVIDERS_KEY: &str = "__all__";

pub const DEFAULT_VIEW_TTL: Duration = Duration::from_millis(1000);

pub const DEFAULT_VIEW_CAPACITY: u64 = 256;

type EndpointList = Arc<Vec<EndpointConfig>>;

pub struct ConfigView {
    store: Arc<dyn ConfigStore>,
    health: Arc<HealthRegistry>,
    /// Raw store snapshot, single entry
    raw: Cache<(), EndpointList>,
    /// Enabled endpoints per provider key
    filtered: Cache<String, EndpointList>,
    /// Bumped on every invalidation so in-flight loads never repopulate stale data
    generation: AtomicU64,
}

impl ConfigView {
    pub fn new(store: Arc<dyn ConfigStore>, health: Arc<HealthRegistry>) -> Self {
        Self::with_cache(store, health, DEFAULT_VIEW_TTL, DEFAULT_VIEW_CAPACITY)
    }

    pub fn with_cache(
        store: Arc<dyn ConfigStore>,
        health: Arc<HealthRegistry>,
        ttl: Duration,
        capacity: u64,
    ) -> Self {
        Self {
            store,
            health,
            raw: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            filtered: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            generation: AtomicU64::new(0),
        }
    }

    /// Enabled endpoints, optionally for one provider, minus those cooling down
    pub async fn enabled_endpoints(
        &self,
        provider: Option<&str>,
    ) -> Result<Vec<EndpointConfig>, DispatchError> {
        self.enabled_endpoints_at(provider, Utc::now()).await
    }

    pub async fn enabled_endpoints_at(
        &self,
        provider: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<EndpointConfig>, DispatchError> {
        let configured = self.configured_endpoints(provider).await?;
        Ok(self.without_cooling(&configured, now))
    }

    /// Enabled endpoints for a provider before the cooldown filter
    pub async fn configured_endpoints(
        &self,
        provider: Option<&str>,
    ) -> Result<EndpointList, DispatchError> {
        let key = provider.unwrap_or(ALL_PROVIDERS_KEY).to_string();
        if let Some(hit) = self.filtered.get(&key).await {
            tracing::trace!(cache_key = %key, "Endpoint view cache hit");
            return Ok(hit);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let raw = self.raw_endpoints(generation).await?;
        let filtered: EndpointList = Arc::new(
            raw.iter()
                .filter(|endpoint| endpoint.enabled)
                .filter(|endpoint| provider.map_or(true, |p| endpoint.provider == p))
                .cloned()
                .collect(),
        );
        if self.generation.load(Ordering::SeqCst) == generation {
            self.filtered.insert(key.clone(), filtered.clone()).await;
            // an invalidation may have landed between the check and the insert
            if self.generation.load(Ordering::SeqCst) != generation {
                self.filtered.invalidate(&key).await;
            }
        }
        tracing::debug!(
            cache_key = %key,
            enabled = filtered.len(),
            total = raw.len(),
            "Endpoint view rebuilt"
        );
        Ok(filtered)
    }

    async fn raw_endpoints(&self, generation: u64) -> Result<EndpointList, DispatchError> {
        if let Some(hit) = self.raw.get(&()).await {
            return Ok(hit);
        }
        let endpoints: EndpointList = Arc::new(self.store.load_endpoints().await?);
        if self.generation.load(Ordering::SeqCst) == generation {
            self.raw.insert((), endpoints.clone()).await;
            if self.generation.load(Ordering::SeqCst) != generation {
                self.raw.invalidate(&()).await;
            }
        }
        Ok(endpoints)
    }

    /// Every endpoint for a provider, disabled ones included, in store order
    pub async fn provider_endpoints(
        &self,
        provider: Option<&str>,
    ) -> Result<Vec<EndpointConfig>, DispatchError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let raw = self.raw_endpoints(generation).await?;
        Ok(raw
            .iter()
            .filter(|endpoint| provider.map_or(true, |p| endpoint.provider == p))
            .cloned()
            .collect())
    }

    fn without_cooling(
        &self,
        endpoints: &[EndpointConfig],
        now: DateTime<Utc>,
    ) -> Vec<EndpointConfig> {
        if !self.health.has_entries() {
            return endpoints.to_vec();
        }
        endpoints
            .iter()
            .filter(|endpoint| !self.health.is_on_cooldown(&endpoint.id, now))
            .cloned()
            .collect()
    }

    /// Drop every cached view; called on any configuration change
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.raw.invalidate_all();
        self.filtered.invalidate_all();
        tracing::debug!("Endpoint view cache invalidated");
    }
}
