//! API dispatch library
//!
//! Health-aware endpoint and credential-key selection for outbound API calls.

// Public modules
pub mod config;
pub mod error;
pub mod logging;
pub mod services;
pub mod store;

// Re-export commonly used types
pub use config::DispatchSettings;
pub use error::{DispatchError, StoreError};
pub use services::dispatch::{Dispatcher, DispatcherConfig, EndpointConfig, FailureReport};
pub use store::{ConfigChange, ConfigStore};
