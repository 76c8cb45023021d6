//! Endpoint and key health tracking
//!
//! `HealthRegistry` records success/failure outcomes reported by callers and
//! derives cooldown state from them. A failure puts the endpoint (or key) on
//! cooldown until a deadline; the next success clears it. Nothing is ever
//! excluded permanently.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Cooldown applied when a caller does not supply one
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(60_000);

// ============================================================================
// Health Records
// ============================================================================

/// Opaque failure payload reported by the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub code: String,
    pub message: String,
}

impl FailureReport {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Most recent failure recorded for an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub code: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Health of a single credential key under an endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyHealthEntry {
    pub success_count: u64,
    pub failure_count: u64,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl KeyHealthEntry {
    pub fn is_on_cooldown(&self, now: DateTime<Utc>) -> bool {
        matches!(self.cooldown_until, Some(until) if now < until)
    }
}

/// Health of one endpoint, including its keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthEntry {
    pub success_count: u64,
    pub failure_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_error: Option<LastError>,
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Per-key health, keyed by the key string itself
    pub keys: HashMap<String, KeyHealthEntry>,
}

impl HealthEntry {
    pub fn is_on_cooldown(&self, now: DateTime<Utc>) -> bool {
        matches!(self.cooldown_until, Some(until) if now < until)
    }

    /// Time left until the cooldown expires, `None` when not cooling down
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.cooldown_until {
            Some(until) if now < until => (until - now).to_std().ok(),
            _ => None,
        }
    }
}

fn deadline(now: DateTime<Utc>, cooldown: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(cooldown)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ============================================================================
// Health Registry
// ============================================================================

/// Process-local health state for every endpoint that has reported an outcome
#[derive(Debug, Default)]
pub struct HealthRegistry {
    entries: RwLock<HashMap<String, HealthEntry>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, HealthEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, HealthEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn report_failure(&self, endpoint_id: &str, error: FailureReport, cooldown: Duration) {
        self.report_failure_at(endpoint_id, error, cooldown, Utc::now());
    }

    pub fn report_failure_at(
        &self,
        endpoint_id: &str,
        error: FailureReport,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) {
        let mut entries = self.write();
        let entry = entries.entry(endpoint_id.to_string()).or_default();
        entry.failure_count += 1;
        entry.cooldown_until = Some(deadline(now, cooldown));
        tracing::warn!(
            endpoint_id,
            code = %error.code,
            failures = entry.failure_count,
            cooldown_ms = cooldown.as_millis() as u64,
            "Endpoint failed, cooling down"
        );
        entry.last_error = Some(LastError {
            code: error.code,
            message: error.message,
            at: now,
        });
    }

    pub fn report_success(&self, endpoint_id: &str) {
        self.report_success_at(endpoint_id, Utc::now());
    }

    pub fn report_success_at(&self, endpoint_id: &str, now: DateTime<Utc>) {
        let mut entries = self.write();
        let entry = entries.entry(endpoint_id.to_string()).or_default();
        entry.success_count += 1;
        entry.last_used_at = Some(now);
        if entry.cooldown_until.take().is_some() {
            tracing::debug!(endpoint_id, "Endpoint readmitted after success");
        }
    }

    pub fn is_on_cooldown(&self, endpoint_id: &str, now: DateTime<Utc>) -> bool {
        self.read()
            .get(endpoint_id)
            .is_some_and(|entry| entry.is_on_cooldown(now))
    }

    pub fn cooldown_remaining(&self, endpoint_id: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.read()
            .get(endpoint_id)
            .and_then(|entry| entry.cooldown_remaining(now))
    }

    /// Snapshot of an endpoint's health, `None` if nothing was ever reported
    pub fn stats(&self, endpoint_id: &str) -> Option<HealthEntry> {
        self.read().get(endpoint_id).cloned()
    }

    /// Drop all state for an endpoint that no longer exists
    pub fn remove(&self, endpoint_id: &str) -> bool {
        let removed = self.write().remove(endpoint_id).is_some();
        if removed {
            tracing::info!(endpoint_id, "Removed endpoint health state");
        }
        removed
    }

    /// Keep only endpoints for which `keep` returns true, returning how many were dropped
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|id, _| keep(id));
        before - entries.len()
    }

    pub fn clear_all(&self) {
        let mut entries = self.write();
        let count = entries.len();
        entries.clear();
        tracing::info!(entries = count, "Cleared all health state");
    }

    pub fn has_entries(&self) -> bool {
        !self.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_entries()
    }

    // ------------------------------------------------------------------------
    // Key-scoped operations
    // ------------------------------------------------------------------------

    pub fn report_key_failure(&self, endpoint_id: &str, key: &str, cooldown: Duration) {
        self.report_key_failure_at(endpoint_id, key, cooldown, Utc::now());
    }

    pub fn report_key_failure_at(
        &self,
        endpoint_id: &str,
        key: &str,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) {
        let mut entries = self.write();
        let key_entry = entries
            .entry(endpoint_id.to_string())
            .or_default()
            .keys
            .entry(key.to_string())
            .or_default();
        key_entry.failure_count += 1;
        key_entry.cooldown_until = Some(deadline(now, cooldown));
        tracing::warn!(
            endpoint_id,
            failures = key_entry.failure_count,
            cooldown_ms = cooldown.as_millis() as u64,
            "Credential key failed, cooling down"
        );
    }

    pub fn report_key_success(&self, endpoint_id: &str, key: &str) {
        let mut entries = self.write();
        let key_entry = entries
            .entry(endpoint_id.to_string())
            .or_default()
            .keys
            .entry(key.to_string())
            .or_default();
        key_entry.success_count += 1;
        key_entry.cooldown_until = None;
    }

    pub fn is_key_on_cooldown(&self, endpoint_id: &str, key: &str, now: DateTime<Utc>) -> bool {
        self.read()
            .get(endpoint_id)
            .and_then(|entry| entry.keys.get(key))
            .is_some_and(|key_entry| key_entry.is_on_cooldown(now))
    }

    pub fn key_stats(&self, endpoint_id: &str, key: &str) -> Option<KeyHealthEntry> {
        self.read()
            .get(endpoint_id)
            .and_then(|entry| entry.keys.get(key))
            .cloned()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn err() -> FailureReport {
        FailureReport::new("503", "service unavailable")
    }

    #[test]
    fn test_failure_sets_cooldown_until_deadline() {
        let registry = HealthRegistry::new();
        let t0 = Utc::now();
        registry.report_failure_at("ep", err(), Duration::from_millis(1000), t0);

        assert!(registry.is_on_cooldown("ep", t0));
        assert!(registry.is_on_cooldown("ep", t0 + chrono::Duration::milliseconds(999)));
        assert!(!registry.is_on_cooldown("ep", t0 + chrono::Duration::milliseconds(1000)));
        assert!(!registry.is_on_cooldown("ep", t0 + chrono::Duration::milliseconds(5000)));
    }

    #[test]
    fn test_success_clears_cooldown_immediately() {
        let registry = HealthRegistry::new();
        let t0 = Utc::now();
        registry.report_failure_at("ep", err(), Duration::from_millis(1000), t0);
        registry.report_success_at("ep", t0 + chrono::Duration::milliseconds(10));

        assert!(!registry.is_on_cooldown("ep", t0 + chrono::Duration::milliseconds(20)));
        let stats = registry.stats("ep").unwrap();
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 1);
        assert!(stats.cooldown_until.is_none());
        // last error is kept for diagnostics
        assert_eq!(stats.last_error.unwrap().code, "503");
    }

    #[test]
    fn test_counters_and_last_error() {
        let registry = HealthRegistry::new();
        let t0 = Utc::now();
        registry.report_failure_at("ep", err(), DEFAULT_COOLDOWN, t0);
        registry.report_failure_at(
            "ep",
            FailureReport::new("429", "rate limited"),
            DEFAULT_COOLDOWN,
            t0,
        );

        let stats = registry.stats("ep").unwrap();
        assert_eq!(stats.failure_count, 2);
        let last = stats.last_error.as_ref().unwrap();
        assert_eq!(last.code, "429");
        assert_eq!(last.message, "rate limited");
        assert_eq!(last.at, t0);
        assert_eq!(
            stats.cooldown_remaining(t0),
            Some(Duration::from_millis(60_000))
        );
    }

    #[test]
    fn test_unknown_endpoint_is_not_cooling() {
        let registry = HealthRegistry::new();
        assert!(!registry.is_on_cooldown("missing", Utc::now()));
        assert!(registry.stats("missing").is_none());
        assert!(!registry.has_entries());
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = HealthRegistry::new();
        registry.report_success("a");
        registry.report_success("b");
        assert_eq!(registry.len(), 2);

        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(registry.stats("a").is_none());

        registry.clear_all();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_retain() {
        let registry = HealthRegistry::new();
        for id in ["a", "b", "c"] {
            registry.report_success(id);
        }
        assert_eq!(registry.retain(|id| id != "b"), 1);
        assert!(registry.stats("b").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_key_health_is_nested_and_independent() {
        let registry = HealthRegistry::new();
        let t0 = Utc::now();
        registry.report_key_failure_at("ep", "k1", Duration::from_secs(30), t0);

        assert!(registry.is_key_on_cooldown("ep", "k1", t0));
        assert!(!registry.is_key_on_cooldown("ep", "k2", t0));
        // key failures never cool the endpoint itself
        assert!(!registry.is_on_cooldown("ep", t0));

        let entry = registry.stats("ep").unwrap();
        assert_eq!(entry.failure_count, 0);
        assert_eq!(entry.keys.len(), 1);

        registry.report_key_success("ep", "k1");
        assert!(!registry.is_key_on_cooldown("ep", "k1", t0));
        let key = registry.key_stats("ep", "k1").unwrap();
        assert_eq!(key.success_count, 1);
        assert_eq!(key.failure_count, 1);
    }

    #[test]
    fn test_remove_drops_key_state() {
        let registry = HealthRegistry::new();
        registry.report_key_failure("ep", "k1", DEFAULT_COOLDOWN);
        registry.remove("ep");
        assert!(registry.key_stats("ep", "k1").is_none());
    }

    #[test]
    fn test_huge_cooldown_saturates() {
        let registry = HealthRegistry::new();
        let t0 = Utc::now();
        registry.report_failure_at("ep", err(), Duration::MAX, t0);
        assert!(registry.is_on_cooldown("ep", t0));
    }

    #[test]
    fn test_concurrent_reports_are_all_counted() {
        let registry = HealthRegistry::new();

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let registry = &registry;
                scope.spawn(move || {
                    for _ in 0..500 {
                        if worker % 2 == 0 {
                            registry.report_success("ep");
                        } else {
                            registry.report_failure("ep", err(), Duration::from_secs(60));
                        }
                        registry.report_key_failure("ep", "k1", Duration::from_secs(60));
                        let _ = registry.is_on_cooldown("ep", Utc::now());
                    }
                });
            }
        });

        let entry = registry.stats("ep").unwrap();
        assert_eq!(entry.success_count, 2_000);
        assert_eq!(entry.failure_count, 2_000);
        assert_eq!(registry.key_stats("ep", "k1").unwrap().failure_count, 4_000);
        assert_eq!(registry.len(), 1);
    }
}
