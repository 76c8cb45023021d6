//! Application settings and configuration
//!
//! Settings are loaded from environment variables (and a `.env` file if one
//! exists) with sensible defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::dispatch::DispatcherConfig;

/// Application environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!(
                "Invalid environment: {}. Expected: development, staging, or production",
                s
            ),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format: {}. Expected: pretty or json", s),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchSettings {
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,
    pub log_format: LogFormat,

    // Dispatch tuning
    pub cooldown_ms: u64,
    pub key_cooldown_ms: u64,
    pub view_ttl_ms: u64,
    pub view_capacity: u64,

    /// JSON file holding the endpoint list
    pub endpoints_file: Option<PathBuf>,
}

impl DispatchSettings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Self {
            app_name: env_or_default("APP_NAME", "api-dispatch"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: env_or_default("ENVIRONMENT", "development")
                .parse()
                .unwrap_or_default(),
            log_level: env_or_default("LOG_LEVEL", "info"),
            log_format: env_or_default("LOG_FORMAT", "pretty")
                .parse()
                .unwrap_or_default(),

            cooldown_ms: env_or_default("DISPATCH_COOLDOWN_MS", "60000")
                .parse()
                .context("Invalid DISPATCH_COOLDOWN_MS value")?,
            key_cooldown_ms: env_or_default("DISPATCH_KEY_COOLDOWN_MS", "60000")
                .parse()
                .context("Invalid DISPATCH_KEY_COOLDOWN_MS value")?,
            view_ttl_ms: env_or_default("DISPATCH_VIEW_TTL_MS", "1000")
                .parse()
                .context("Invalid DISPATCH_VIEW_TTL_MS value")?,
            view_capacity: env_or_default("DISPATCH_VIEW_CAPACITY", "256")
                .parse()
                .context("Invalid DISPATCH_VIEW_CAPACITY value")?,

            endpoints_file: env::var("ENDPOINTS_FILE").ok().map(PathBuf::from),
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.cooldown_ms == 0 {
            anyhow::bail!("DISPATCH_COOLDOWN_MS must be > 0");
        }
        if self.key_cooldown_ms == 0 {
            anyhow::bail!("DISPATCH_KEY_COOLDOWN_MS must be > 0");
        }
        if self.view_ttl_ms == 0 {
            anyhow::bail!("DISPATCH_VIEW_TTL_MS must be > 0");
        }
        if self.view_capacity == 0 {
            anyhow::bail!("DISPATCH_VIEW_CAPACITY must be > 0");
        }

        if self.environment == Environment::Production && self.view_ttl_ms > 60_000 {
            tracing::warn!(
                view_ttl_ms = self.view_ttl_ms,
                "Long endpoint view TTL in production delays configuration changes that miss a notification"
            );
        }

        Ok(())
    }

    /// Engine configuration derived from these settings
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::default()
            .with_cooldown(Duration::from_millis(self.cooldown_ms))
            .with_key_cooldown(Duration::from_millis(self.key_cooldown_ms))
            .with_view_ttl(Duration::from_millis(self.view_ttl_ms))
            .with_view_capacity(self.view_capacity)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            app_name: "api-dispatch".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            cooldown_ms: 60_000,
            key_cooldown_ms: 60_000,
            view_ttl_ms: 1_000,
            view_capacity: 256,
            endpoints_file: None,
        }
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
