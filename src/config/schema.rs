//! Configuration schema definitions.
//!
//! All types derive Serde traits for (de)serialization from the TOML config
//! file. Every section has defaults so a minimal file is enough.

use serde::{Deserialize, Serialize};

use crate::rewrite::RewriteEntry;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Admin HTTP API settings.
    pub admin: AdminConfig,

    /// DNS filtering settings, including the rewrite list.
    pub filtering: FilteringConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Bind address (e.g., "127.0.0.1:3000").
    pub bind_address: String,

    /// API key for authentication (Bearer token). Required when enabled.
    pub api_key: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:3000".to_string(),
            api_key: String::new(),
            request_timeout_secs: 10,
        }
    }
}

/// Filtering configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct FilteringConfig {
    /// Administrator-defined DNS rewrites, in order.
    pub rewrites: Vec<RewriteEntry>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
