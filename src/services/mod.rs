//! Services module
//!
//! Contains the dispatch engine.

pub mod dispatch;

pub use dispatch::{
    Candidate, ConfigView, DiagnosticsReporter, DispatchPlan, DispatchStatus, Dispatcher,
    DispatcherConfig, EndpointConfig, EndpointStatus, FailoverQueueBuilder, FailureReport,
    HealthEntry, HealthRegistry, KeyRotationSelector, RotationSelector,
};
