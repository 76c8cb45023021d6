//! Credential key parsing and per-endpoint key rotation

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::health::HealthRegistry;

/// Split a raw key string on commas and newlines, dropping blanks
pub fn parse_keys(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

/// A key picked for a request, with its position in the parsed list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedKey {
    pub index: usize,
    pub key: String,
}

/// Round-robin over one endpoint's keys, skipping keys on cooldown
#[derive(Debug)]
pub struct KeyRotationSelector {
    health: Arc<HealthRegistry>,
    cursors: Mutex<HashMap<String, usize>>,
}

impl KeyRotationSelector {
    pub fn new(health: Arc<HealthRegistry>) -> Self {
        Self {
            health,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn next_available_key(&self, endpoint_id: &str, raw_keys: &str) -> Option<SelectedKey> {
        self.next_available_key_at(endpoint_id, raw_keys, Utc::now())
    }

    pub fn next_available_key_at(
        &self,
        endpoint_id: &str,
        raw_keys: &str,
        now: DateTime<Utc>,
    ) -> Option<SelectedKey> {
        let mut keys = parse_keys(raw_keys);
        match keys.len() {
            0 => return None,
            // a lone key is only ever skipped at the endpoint level
            1 => {
                return keys.pop().map(|key| SelectedKey { index: 0, key });
            }
            _ => {}
        }

        let mut cursors = self.cursors.lock().unwrap_or_else(PoisonError::into_inner);
        let start = cursors.get(endpoint_id).copied().unwrap_or(0) % keys.len();
        for offset in 0..keys.len() {
            let index = (start + offset) % keys.len();
            if self.health.is_key_on_cooldown(endpoint_id, &keys[index], now) {
                continue;
            }
            cursors.insert(endpoint_id.to_string(), (index + 1) % keys.len());
            tracing::debug!(endpoint_id, key_index = index, "Selected credential key");
            return Some(SelectedKey {
                index,
                key: keys.swap_remove(index),
            });
        }

        tracing::warn!(
            endpoint_id,
            keys = keys.len(),
            "All credential keys are cooling down"
        );
        None
    }

    pub fn report_key_failure(&self, endpoint_id: &str, key: &str, cooldown: Duration) {
        self.health.report_key_failure(endpoint_id, key, cooldown);
    }

    pub fn report_key_success(&self, endpoint_id: &str, key: &str) {
        self.health.report_key_success(endpoint_id, key);
    }

    /// Stored rotation index for an endpoint (0 when never rotated)
    pub fn cursor(&self, endpoint_id: &str) -> usize {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn forget(&self, endpoint_id: &str) {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(endpoint_id);
    }

    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id, _| keep(id));
    }

    pub fn reset(&self) {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> (Arc<HealthRegistry>, KeyRotationSelector) {
        let health = Arc::new(HealthRegistry::new());
        let selector = KeyRotationSelector::new(health.clone());
        (health, selector)
    }

    fn pick(selector: &KeyRotationSelector, raw: &str, now: DateTime<Utc>) -> Option<String> {
        selector
            .next_available_key_at("ep", raw, now)
            .map(|selected| selected.key)
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!(parse_keys("a, b\nc,, d"), vec!["a", "b", "c", "d"]);
        assert_eq!(parse_keys("x\r\ny\r\n"), vec!["x", "y"]);
        assert!(parse_keys("").is_empty());
        assert!(parse_keys(" , \n ").is_empty());
    }

    #[test]
    fn test_no_keys() {
        let (_, selector) = selector();
        assert!(selector.next_available_key("ep", "").is_none());
    }

    #[test]
    fn test_single_key_ignores_cooldown() {
        let (health, selector) = selector();
        let now = Utc::now();
        health.report_key_failure_at("ep", "only", Duration::from_secs(60), now);
        assert_eq!(pick(&selector, " only ", now), Some("only".to_string()));
    }

    #[test]
    fn test_rotates_in_order() {
        let (_, selector) = selector();
        let now = Utc::now();
        let picks: Vec<String> = (0..4)
            .filter_map(|_| pick(&selector, "k1,k2,k3", now))
            .collect();
        assert_eq!(picks, vec!["k1", "k2", "k3", "k1"]);
    }

    #[test]
    fn test_skips_cooling_keys() {
        let (health, selector) = selector();
        let now = Utc::now();
        let raw = "k1,k2,k3";
        health.report_key_failure_at("ep", "k2", Duration::from_secs(60), now);

        assert_eq!(pick(&selector, raw, now), Some("k1".to_string()));
        health.report_key_failure_at("ep", "k1", Duration::from_secs(60), now);
        assert_eq!(pick(&selector, raw, now), Some("k3".to_string()));
        assert_eq!(selector.cursor("ep"), 0);
    }

    #[test]
    fn test_all_cooling_leaves_cursor_unchanged() {
        let (health, selector) = selector();
        let now = Utc::now();
        let raw = "k1,k2,k3";
        assert_eq!(pick(&selector, raw, now), Some("k1".to_string()));
        assert_eq!(selector.cursor("ep"), 1);

        for key in ["k1", "k2", "k3"] {
            health.report_key_failure_at("ep", key, Duration::from_secs(60), now);
        }
        assert!(pick(&selector, raw, now).is_none());
        assert_eq!(selector.cursor("ep"), 1);

        // cooldown elapses without any success report
        let later = now + chrono::Duration::seconds(61);
        assert_eq!(pick(&selector, raw, later), Some("k2".to_string()));
    }

    #[test]
    fn test_cursors_are_per_endpoint() {
        let (_, selector) = selector();
        let now = Utc::now();
        selector.next_available_key_at("a", "k1,k2", now);
        let other = selector.next_available_key_at("b", "k1,k2", now).unwrap();
        assert_eq!(other.index, 0);
        assert_eq!(selector.cursor("a"), 1);

        selector.forget("a");
        assert_eq!(selector.cursor("a"), 0);
    }

    #[test]
    fn test_report_delegates_to_registry() {
        let (health, selector) = selector();
        selector.report_key_failure("ep", "k1", Duration::from_secs(60));
        assert!(health.is_key_on_cooldown("ep", "k1", Utc::now()));
        selector.report_key_success("ep", "k1");
        assert!(!health.is_key_on_cooldown("ep", "k1", Utc::now()));
    }

    #[test]
    fn test_concurrent_selection_spreads_evenly() {
        let (_, selector) = selector();
        let mut counts = [0usize; 3];

        let selector = &selector;
        std::thread::scope(|scope| {
            let workers: Vec<_> = (0..6)
                .map(move |_| {
                    scope.spawn(move || {
                        (0..1_000)
                            .map(|_| selector.next_available_key("ep", "k0,k1,k2"))
                            .map(|selected| selected.unwrap().index)
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            for worker in workers {
                for index in worker.join().unwrap() {
                    counts[index] += 1;
                }
            }
        });

        assert_eq!(counts, [2_000; 3]);
    }
}
