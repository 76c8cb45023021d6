//! Endpoint configuration and the `Candidate` trait
//!
//! `EndpointConfig` is owned by the configuration store; the dispatch engine
//! only ever reads it.

use serde::{Deserialize, Serialize};

// ============================================================================
// Candidate Trait
// ============================================================================

/// Anything the rotation and failover logic can order and identify
pub trait Candidate {
    /// Stable, unique identifier
    fn id(&self) -> &str;

    /// Failover priority, lower sorts first
    fn priority(&self) -> i64 {
        0
    }
}

// ============================================================================
// Endpoint Configuration
// ============================================================================

/// One configured backend API target
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
    /// Raw credential string, possibly several keys separated by commas or newlines
    #[serde(default, alias = "apiKey")]
    pub api_key_raw: String,
}

fn default_enabled() -> bool {
    true
}

impl EndpointConfig {
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider: provider.into(),
            enabled: true,
            priority: 0,
            api_key_raw: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_keys(mut self, raw: impl Into<String>) -> Self {
        self.api_key_raw = raw.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl Candidate for EndpointConfig {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i64 {
        self.priority
    }
}
