//! Endpoint dispatch engine
//!
//! Chooses which configured endpoint (and which of its credential keys)
//! services the next outbound request, and tracks health so that recently
//! failing endpoints and keys are skipped for a while.
//!
//! # Flow
//! 1. `ConfigView` yields the enabled endpoints that are not cooling down
//! 2. `FailoverQueueBuilder` puts the round-robin pick first, the rest by priority
//! 3. `KeyRotationSelector` picks a key on the endpoint being attempted
//! 4. The caller reports the outcome to `HealthRegistry`
//!
//! # Example
//! ```ignore
//! let store = Arc::new(InMemoryConfigStore::new(endpoints));
//! let dispatcher = Dispatcher::new(store, DispatcherConfig::default());
//!
//! if let Some(plan) = dispatcher.plan(Some("openai")).await? {
//!     match send(plan.endpoint(), plan.key.as_ref()).await {
//!         Ok(_) => dispatcher.report_success(&plan.endpoint().id),
//!         Err(e) => dispatcher.report_failure(&plan.endpoint().id, e.into()),
//!     }
//! }
//! ```

mod diagnostics;
mod dispatcher;
mod endpoint;
mod failover;
mod health;
mod keys;
mod rotation;
mod view;

pub use diagnostics::{
    DiagnosticsReporter, DispatchStatus, EndpointStatus, ErrorSummary, KeyStatus,
};
pub use dispatcher::{DispatchPlan, Dispatcher, DispatcherConfig};
pub use endpoint::{Candidate, EndpointConfig};
pub use failover::FailoverQueueBuilder;
pub use health::{
    FailureReport, HealthEntry, HealthRegistry, KeyHealthEntry, LastError, DEFAULT_COOLDOWN,
};
pub use keys::{parse_keys, KeyRotationSelector, SelectedKey};
pub use rotation::{RotationSelector, CURSOR_WRAP};
pub use view::{ConfigView, ALL_PROVIDERS_KEY, DEFAULT_VIEW_CAPACITY, DEFAULT_VIEW_TTL};
