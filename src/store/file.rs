//! JSON-file-backed configuration store
//!
//! The file holds a JSON array of endpoints. It is read once at open and again
//! on every `reload()`; a file that fails to parse leaves the previous
//! configuration in place.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

use super::{ConfigChange, ConfigStore, CHANGE_CHANNEL_CAPACITY};
use crate::error::StoreError;
use crate::services::dispatch::EndpointConfig;

#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    endpoints: RwLock<Vec<EndpointConfig>>,
    changes: broadcast::Sender<ConfigChange>,
}

impl FileConfigStore {
    /// Open and parse the endpoint file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let endpoints = read_endpoints(&path).await?;
        tracing::info!(path = %path.display(), endpoints = endpoints.len(), "Loaded endpoint file");
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            endpoints: RwLock::new(endpoints),
            changes,
        })
    }

    /// Re-read the file and broadcast `Reloaded` on success
    pub async fn reload(&self) -> Result<usize, StoreError> {
        let endpoints = read_endpoints(&self.path).await?;
        let count = endpoints.len();
        *self.endpoints.write().unwrap_or_else(PoisonError::into_inner) = endpoints;
        tracing::info!(path = %self.path.display(), endpoints = count, "Reloaded endpoint file");
        let _ = self.changes.send(ConfigChange::Reloaded);
        Ok(count)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn read_endpoints(path: &Path) -> Result<Vec<EndpointConfig>, StoreError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let endpoints: Vec<EndpointConfig> =
        serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut seen = std::collections::HashSet::new();
    for endpoint in &endpoints {
        if !seen.insert(endpoint.id.as_str()) {
            return Err(StoreError::DuplicateId(endpoint.id.clone()));
        }
    }
    Ok(endpoints)
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load_endpoints(&self) -> Result<Vec<EndpointConfig>, StoreError> {
        Ok(self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }
}
