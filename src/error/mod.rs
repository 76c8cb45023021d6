//! Error types

mod types;

pub use types::{DispatchError, StoreError};
