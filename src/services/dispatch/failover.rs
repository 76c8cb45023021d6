//! Failover queue construction
//!
//! A queue is the ordered attempt sequence for one logical request: the
//! rotation pick first, then every other candidate by ascending priority.

use std::sync::Arc;

use super::endpoint::Candidate;
use super::rotation::RotationSelector;

#[derive(Debug, Clone)]
pub struct FailoverQueueBuilder {
    rotation: Arc<RotationSelector>,
}

impl FailoverQueueBuilder {
    pub fn new(rotation: Arc<RotationSelector>) -> Self {
        Self { rotation }
    }

    /// Build the attempt order; consumes one rotation step when non-empty
    pub fn build<T: Candidate + Clone>(&self, candidates: &[T]) -> Vec<T> {
        let Some(preferred) = self.rotation.next(candidates) else {
            return Vec::new();
        };

        let mut rest: Vec<T> = candidates
            .iter()
            .filter(|candidate| candidate.id() != preferred.id())
            .cloned()
            .collect();
        // sort_by_key is stable, equal priorities keep their relative order
        rest.sort_by_key(|candidate| candidate.priority());

        let mut queue = Vec::with_capacity(rest.len() + 1);
        queue.push(preferred.clone());
        queue.extend(rest);
        queue
    }

    pub fn rotation(&self) -> &Arc<RotationSelector> {
        &self.rotation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dispatch::EndpointConfig;

    fn ids(queue: &[EndpointConfig]) -> Vec<&str> {
        queue.iter().map(|e| e.id.as_str()).collect()
    }

    fn endpoints() -> Vec<EndpointConfig> {
        vec![
            EndpointConfig::new("a", "openai").with_priority(2),
            EndpointConfig::new("b", "openai").with_priority(0),
            EndpointConfig::new("c", "openai").with_priority(1),
            EndpointConfig::new("d", "openai").with_priority(0),
        ]
    }

    #[test]
    fn test_empty_input() {
        let builder = FailoverQueueBuilder::new(Arc::new(RotationSelector::new()));
        let empty: Vec<EndpointConfig> = Vec::new();
        assert!(builder.build(&empty).is_empty());
        assert_eq!(builder.rotation().peek(), 0);
    }

    #[test]
    fn test_preferred_first_then_priority() {
        let builder = FailoverQueueBuilder::new(Arc::new(RotationSelector::new()));
        let candidates = endpoints();

        assert_eq!(ids(&builder.build(&candidates)), vec!["a", "b", "d", "c"]);
        assert_eq!(ids(&builder.build(&candidates)), vec!["b", "d", "c", "a"]);
        assert_eq!(ids(&builder.build(&candidates)), vec!["c", "b", "d", "a"]);
        assert_eq!(ids(&builder.build(&candidates)), vec!["d", "b", "c", "a"]);
        assert_eq!(builder.rotation().peek(), 4);
    }

    #[test]
    fn test_queue_is_permutation() {
        let builder = FailoverQueueBuilder::new(Arc::new(RotationSelector::new()));
        let candidates = endpoints();
        let built = builder.build(&candidates);
        let mut queue = ids(&built);
        queue.sort();
        assert_eq!(queue, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_single_candidate() {
        let builder = FailoverQueueBuilder::new(Arc::new(RotationSelector::new()));
        let candidates = vec![EndpointConfig::new("only", "gemini")];
        assert_eq!(ids(&builder.build(&candidates)), vec!["only"]);
    }
}
