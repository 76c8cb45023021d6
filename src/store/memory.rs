//! In-memory configuration store

use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

use super::{ConfigChange, ConfigStore, CHANGE_CHANNEL_CAPACITY};
use crate::error::StoreError;
use crate::services::dispatch::EndpointConfig;

/// Ordered endpoint list held in process memory
#[derive(Debug)]
pub struct InMemoryConfigStore {
    endpoints: RwLock<Vec<EndpointConfig>>,
    changes: broadcast::Sender<ConfigChange>,
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InMemoryConfigStore {
    pub fn new(endpoints: Vec<EndpointConfig>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            endpoints: RwLock::new(endpoints),
            changes,
        }
    }

    fn notify(&self, change: ConfigChange) {
        // no subscribers is fine
        let _ = self.changes.send(change);
    }

    pub fn add(&self, endpoint: EndpointConfig) -> Result<(), StoreError> {
        let id = endpoint.id.clone();
        {
            let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
            if endpoints.iter().any(|e| e.id == id) {
                return Err(StoreError::DuplicateId(id));
            }
            endpoints.push(endpoint);
        }
        tracing::debug!(endpoint_id = %id, "Endpoint added");
        self.notify(ConfigChange::Added(id));
        Ok(())
    }

    pub fn update(&self, endpoint: EndpointConfig) -> Result<(), StoreError> {
        let id = endpoint.id.clone();
        {
            let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
            let slot = endpoints
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| StoreError::UnknownId(id.clone()))?;
            *slot = endpoint;
        }
        tracing::debug!(endpoint_id = %id, "Endpoint updated");
        self.notify(ConfigChange::Updated(id));
        Ok(())
    }

    pub fn remove(&self, endpoint_id: &str) -> Option<EndpointConfig> {
        let removed = {
            let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
            let position = endpoints.iter().position(|e| e.id == endpoint_id)?;
            endpoints.remove(position)
        };
        tracing::debug!(endpoint_id, "Endpoint removed");
        self.notify(ConfigChange::Removed(endpoint_id.to_string()));
        Some(removed)
    }

    pub fn replace_all(&self, endpoints: Vec<EndpointConfig>) {
        *self.endpoints.write().unwrap_or_else(PoisonError::into_inner) = endpoints;
        self.notify(ConfigChange::Reloaded);
    }

    pub fn snapshot(&self) -> Vec<EndpointConfig> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load_endpoints(&self) -> Result<Vec<EndpointConfig>, StoreError> {
        Ok(self.snapshot())
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }
}
