//! Endpoint configuration stores
//!
//! The dispatch engine never owns configuration. A `ConfigStore` supplies the
//! ordered endpoint list on demand and broadcasts a `ConfigChange` whenever
//! that list is modified.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::services::dispatch::EndpointConfig;

pub use file::FileConfigStore;
pub use memory::InMemoryConfigStore;

/// Capacity of each store's change channel
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification emitted by a store after its configuration changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    Added(String),
    Updated(String),
    Removed(String),
    Reloaded,
}

impl ConfigChange {
    /// Endpoint id whose state must be purged, if any
    pub fn removed_id(&self) -> Option<&str> {
        match self {
            ConfigChange::Removed(id) => Some(id),
            _ => None,
        }
    }
}

/// Source of endpoint configuration
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the full ordered endpoint list
    async fn load_endpoints(&self) -> Result<Vec<EndpointConfig>, StoreError>;

    /// Subscribe to configuration changes
    fn subscribe(&self) -> broadcast::Receiver<ConfigChange>;
}
