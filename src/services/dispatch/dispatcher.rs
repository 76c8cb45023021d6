//! Dispatcher facade
//!
//! Wires the health registry, endpoint view, rotation cursor, key rotation and
//! diagnostics together and exposes the request flow used by the transport
//! layer: get a plan, attempt it, report the outcome.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::diagnostics::{DiagnosticsReporter, DispatchStatus};
use super::endpoint::EndpointConfig;
use super::failover::FailoverQueueBuilder;
use super::health::{FailureReport, HealthRegistry, DEFAULT_COOLDOWN};
use super::keys::{parse_keys, KeyRotationSelector, SelectedKey};
use super::rotation::RotationSelector;
use super::view::{ConfigView, DEFAULT_VIEW_CAPACITY, DEFAULT_VIEW_TTL};
use crate::error::DispatchError;
use crate::store::{ConfigChange, ConfigStore};

// ============================================================================
// Dispatcher Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Cooldown applied to an endpoint after a reported failure
    pub cooldown: Duration,
    /// Cooldown applied to a single key after a reported key failure
    pub key_cooldown: Duration,
    /// How long an enabled-endpoint view stays cached
    pub view_ttl: Duration,
    /// Maximum number of cached provider views
    pub view_capacity: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            key_cooldown: DEFAULT_COOLDOWN,
            view_ttl: DEFAULT_VIEW_TTL,
            view_capacity: DEFAULT_VIEW_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_key_cooldown(mut self, cooldown: Duration) -> Self {
        self.key_cooldown = cooldown;
        self
    }

    pub fn with_view_ttl(mut self, ttl: Duration) -> Self {
        self.view_ttl = ttl;
        self
    }

    pub fn with_view_capacity(mut self, capacity: u64) -> Self {
        self.view_capacity = capacity;
        self
    }
}

// ============================================================================
// Dispatch Plan
// ============================================================================

/// What to attempt for one logical request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    /// Full failover order, preferred endpoint first
    pub queue: Vec<EndpointConfig>,
    /// Position in `queue` of the endpoint to try now
    pub attempt: usize,
    /// Key to use, `None` for endpoints without credentials
    pub key: Option<SelectedKey>,
}

impl DispatchPlan {
    pub fn endpoint(&self) -> &EndpointConfig {
        &self.queue[self.attempt]
    }

    /// Endpoints left to fall back on after the current attempt
    pub fn fallbacks(&self) -> &[EndpointConfig] {
        &self.queue[self.attempt + 1..]
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct Dispatcher {
    store: Arc<dyn ConfigStore>,
    config: DispatcherConfig,
    health: Arc<HealthRegistry>,
    view: ConfigView,
    failover: FailoverQueueBuilder,
    keys: KeyRotationSelector,
    diagnostics: DiagnosticsReporter,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ConfigStore>, config: DispatcherConfig) -> Self {
        Self::with_rotation(store, config, Arc::new(RotationSelector::new()))
    }

    /// Build a dispatcher around an existing rotation cursor
    pub fn with_rotation(
        store: Arc<dyn ConfigStore>,
        config: DispatcherConfig,
        rotation: Arc<RotationSelector>,
    ) -> Self {
        let health = Arc::new(HealthRegistry::new());
        let view = ConfigView::with_cache(
            store.clone(),
            health.clone(),
            config.view_ttl,
            config.view_capacity,
        );
        Self {
            store,
            view,
            failover: FailoverQueueBuilder::new(rotation),
            keys: KeyRotationSelector::new(health.clone()),
            diagnostics: DiagnosticsReporter::new(health.clone()),
            health,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    pub fn view(&self) -> &ConfigView {
        &self.view
    }

    pub fn rotation(&self) -> &Arc<RotationSelector> {
        self.failover.rotation()
    }

    pub fn keys(&self) -> &KeyRotationSelector {
        &self.keys
    }

    /// Enabled endpoints that are not cooling down
    pub async fn candidates(
        &self,
        provider: Option<&str>,
    ) -> Result<Vec<EndpointConfig>, DispatchError> {
        self.view.enabled_endpoints(provider).await
    }

    pub async fn failover_queue(
        &self,
        provider: Option<&str>,
    ) -> Result<Vec<EndpointConfig>, DispatchError> {
        let candidates = self.candidates(provider).await?;
        Ok(self.failover.build(&candidates))
    }

    /// Build a queue and pick the first endpoint that has a usable key
    pub async fn plan(
        &self,
        provider: Option<&str>,
    ) -> Result<Option<DispatchPlan>, DispatchError> {
        let queue = self.failover_queue(provider).await?;
        let mut chosen = None;
        for (attempt, endpoint) in queue.iter().enumerate() {
            if let Some(key) = self.usable_key(endpoint) {
                tracing::debug!(
                    endpoint_id = %endpoint.id,
                    attempt,
                    key_index = key.as_ref().map(|k| k.index),
                    "Dispatch plan ready"
                );
                chosen = Some((attempt, key));
                break;
            }
        }

        match chosen {
            Some((attempt, key)) => Ok(Some(DispatchPlan {
                queue,
                attempt,
                key,
            })),
            None => {
                if !queue.is_empty() {
                    tracing::warn!(candidates = queue.len(), "No endpoint has an available key");
                }
                Ok(None)
            }
        }
    }

    /// Key to attempt `endpoint` with
    ///
    /// `Some(None)` for endpoints without credentials, `None` when every key of
    /// the endpoint is cooling down and it must be skipped. Advances the
    /// endpoint's key cursor.
    pub fn usable_key(&self, endpoint: &EndpointConfig) -> Option<Option<SelectedKey>> {
        if parse_keys(&endpoint.api_key_raw).is_empty() {
            return Some(None);
        }
        self.keys
            .next_available_key(&endpoint.id, &endpoint.api_key_raw)
            .map(Some)
    }

    // ------------------------------------------------------------------------
    // Outcome reporting
    // ------------------------------------------------------------------------

    pub fn report_success(&self, endpoint_id: &str) {
        self.health.report_success(endpoint_id);
    }

    pub fn report_failure(&self, endpoint_id: &str, error: FailureReport) {
        self.health
            .report_failure(endpoint_id, error, self.config.cooldown);
    }

    pub fn report_key_success(&self, endpoint_id: &str, key: &str) {
        self.keys.report_key_success(endpoint_id, key);
    }

    pub fn report_key_failure(&self, endpoint_id: &str, key: &str) {
        self.keys
            .report_key_failure(endpoint_id, key, self.config.key_cooldown);
    }

    // ------------------------------------------------------------------------
    // Configuration changes
    // ------------------------------------------------------------------------

    /// Single entry point for store notifications
    ///
    /// A bulk reload may drop any number of endpoints, so it resyncs health
    /// state against the store instead of trusting a single removed id.
    pub async fn on_config_changed(&self, change: &ConfigChange) -> Result<(), DispatchError> {
        self.view.invalidate();
        match change {
            ConfigChange::Reloaded => {
                self.prune_removed().await?;
            }
            _ => {
                if let Some(endpoint_id) = change.removed_id() {
                    self.health.remove(endpoint_id);
                    self.keys.forget(endpoint_id);
                }
            }
        }
        tracing::debug!(?change, "Applied configuration change");
        Ok(())
    }

    /// Drop health state for endpoints the store no longer knows about
    pub async fn prune_removed(&self) -> Result<usize, DispatchError> {
        let endpoints = self.store.load_endpoints().await?;
        let known: HashSet<&str> = endpoints.iter().map(|e| e.id.as_str()).collect();
        let pruned = self.health.retain(|id| known.contains(id));
        self.keys.retain(|id| known.contains(id));
        if pruned > 0 {
            tracing::info!(pruned, "Pruned health state for removed endpoints");
        }
        Ok(pruned)
    }

    /// Apply store notifications from a background task until the channel closes
    pub fn spawn_change_listener(
        self: &Arc<Self>,
        mut changes: broadcast::Receiver<ConfigChange>,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if let Err(e) = dispatcher.on_config_changed(&change).await {
                            tracing::error!(
                                error = %e,
                                ?change,
                                "Failed to apply configuration change"
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            skipped,
                            "Configuration change listener lagged, resyncing"
                        );
                        let resync = dispatcher.on_config_changed(&ConfigChange::Reloaded);
                        if let Err(e) = resync.await {
                            tracing::error!(error = %e, "Failed to resync after lag");
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Configuration change listener stopped");
        })
    }

    // ------------------------------------------------------------------------
    // Diagnostics and operator actions
    // ------------------------------------------------------------------------

    /// Status of every configured endpoint, disabled and cooling ones included
    pub async fn status(&self, provider: Option<&str>) -> Result<DispatchStatus, DispatchError> {
        let configured = self.view.provider_endpoints(provider).await?;
        let now = Utc::now();
        Ok(DispatchStatus {
            generated_at: now,
            rotation_cursor: self.rotation().peek(),
            endpoints: self.diagnostics.summarize_at(&configured, now),
        })
    }

    pub fn reset_rotation(&self) {
        self.rotation().reset();
    }

    /// Forget all health, key cursors and the rotation position
    pub fn reset_health(&self) {
        self.health.clear_all();
        self.keys.reset();
        self.rotation().reset();
    }
}
