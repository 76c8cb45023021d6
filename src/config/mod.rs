//! Configuration management module
//!
//! This module handles loading and validating runtime settings
//! from environment variables and .env files.

pub mod settings;

pub use settings::{DispatchSettings, Environment, LogFormat};
