//! Read-only health summaries for operators
//!
//! Nothing here mutates health state or the endpoint view. Key material never
//! leaves this module; keys are reported by position only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::endpoint::EndpointConfig;
use super::health::{HealthEntry, HealthRegistry};
use super::keys::parse_keys;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub code: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    pub index: usize,
    pub success_count: u64,
    pub failure_count: u64,
    pub on_cooldown: bool,
}

/// Status of one endpoint at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub enabled: bool,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub on_cooldown: bool,
    pub cooldown_remaining_ms: u64,
    pub last_error: Option<ErrorSummary>,
    pub key_count: usize,
    pub keys: Vec<KeyStatus>,
}

/// Full dispatcher snapshot: endpoint statuses plus the rotation cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStatus {
    pub generated_at: DateTime<Utc>,
    pub rotation_cursor: u64,
    pub endpoints: Vec<EndpointStatus>,
}

impl DispatchStatus {
    /// Endpoints that would be offered as candidates right now
    pub fn available_count(&self) -> usize {
        self.endpoints
            .iter()
            .filter(|e| e.enabled && !e.on_cooldown)
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticsReporter {
    health: Arc<HealthRegistry>,
}

impl DiagnosticsReporter {
    pub fn new(health: Arc<HealthRegistry>) -> Self {
        Self { health }
    }

    pub fn summarize(&self, candidates: &[EndpointConfig]) -> Vec<EndpointStatus> {
        self.summarize_at(candidates, Utc::now())
    }

    pub fn summarize_at(
        &self,
        candidates: &[EndpointConfig],
        now: DateTime<Utc>,
    ) -> Vec<EndpointStatus> {
        candidates
            .iter()
            .map(|endpoint| {
                let entry = self.health.stats(&endpoint.id).unwrap_or_default();
                endpoint_status(endpoint, &entry, now)
            })
            .collect()
    }
}

fn endpoint_status(
    endpoint: &EndpointConfig,
    entry: &HealthEntry,
    now: DateTime<Utc>,
) -> EndpointStatus {
    let keys = parse_keys(&endpoint.api_key_raw);
    let key_statuses = keys
        .iter()
        .enumerate()
        .map(|(index, key)| {
            let key_entry = entry.keys.get(key).cloned().unwrap_or_default();
            KeyStatus {
                index,
                success_count: key_entry.success_count,
                failure_count: key_entry.failure_count,
                on_cooldown: key_entry.is_on_cooldown(now),
            }
        })
        .collect();

    EndpointStatus {
        id: endpoint.id.clone(),
        name: endpoint.name.clone(),
        provider: endpoint.provider.clone(),
        enabled: endpoint.enabled,
        success_count: entry.success_count,
        failure_count: entry.failure_count,
        last_used_at: entry.last_used_at,
        on_cooldown: entry.is_on_cooldown(now),
        cooldown_remaining_ms: entry
            .cooldown_remaining(now)
            .map_or(0, |remaining| remaining.as_millis() as u64),
        last_error: entry.last_error.as_ref().map(|error| ErrorSummary {
            code: error.code.clone(),
            message: error.message.clone(),
            at: error.at,
        }),
        key_count: keys.len(),
        keys: key_statuses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dispatch::FailureReport;
    use std::time::Duration;

    #[test]
    fn test_summary_without_health() {
        let reporter = DiagnosticsReporter::new(Arc::new(HealthRegistry::new()));
        let endpoints = vec![EndpointConfig::new("ep", "openai")
            .with_name("Primary")
            .with_keys("a, b\nc")];
        let summary = reporter.summarize(&endpoints);

        assert_eq!(summary.len(), 1);
        let status = &summary[0];
        assert_eq!(status.name, "Primary");
        assert_eq!(status.key_count, 3);
        assert_eq!(status.success_count, 0);
        assert!(!status.on_cooldown);
        assert_eq!(status.cooldown_remaining_ms, 0);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn test_summary_reflects_health() {
        let health = Arc::new(HealthRegistry::new());
        let reporter = DiagnosticsReporter::new(health.clone());
        let now = Utc::now();
        health.report_success_at("ep", now);
        health.report_failure_at(
            "ep",
            FailureReport::new("429", "slow down"),
            Duration::from_millis(5_000),
            now,
        );
        health.report_key_failure_at("ep", "k2", Duration::from_secs(5), now);

        let endpoints = vec![EndpointConfig::new("ep", "openai").with_keys("k1,k2")];
        let status = &reporter.summarize_at(&endpoints, now + chrono::Duration::seconds(1))[0];

        assert_eq!(status.success_count, 1);
        assert_eq!(status.failure_count, 1);
        assert_eq!(status.last_used_at, Some(now));
        assert!(status.on_cooldown);
        assert_eq!(status.cooldown_remaining_ms, 4_000);
        assert_eq!(status.last_error.as_ref().unwrap().code, "429");
        assert!(!status.keys[0].on_cooldown);
        assert!(status.keys[1].on_cooldown);
        assert_eq!(status.keys[1].failure_count, 1);
    }

    #[test]
    fn test_summary_does_not_create_entries() {
        let health = Arc::new(HealthRegistry::new());
        let reporter = DiagnosticsReporter::new(health.clone());
        reporter.summarize(&[EndpointConfig::new("ep", "openai")]);
        assert!(health.is_empty());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let reporter = DiagnosticsReporter::new(Arc::new(HealthRegistry::new()));
        let summary = reporter.summarize(&[EndpointConfig::new("ep", "openai")]);
        let json = serde_json::to_value(&summary[0]).unwrap();
        assert!(json.get("keyCount").is_some());
        assert!(json.get("cooldownRemainingMs").is_some());
    }
}
