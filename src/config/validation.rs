//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, log level and timeouts
//! - Reject rewrites that would not compile into rule text
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::rewrite::check_field;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("observability.log_level: unknown level {0:?}")]
    InvalidLogLevel(String),

    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingApiKey,

    #[error("admin.request_timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("filtering.rewrites[{index}]: {reason}")]
    InvalidRewrite { index: usize, reason: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.admin.enabled {
        check_address("admin.bind_address", &config.admin.bind_address, &mut errors);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::MissingApiKey);
        }
    }
    if config.admin.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    let level = config.observability.log_level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(config.observability.log_level.clone()));
    }
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    for (index, rw) in config.filtering.rewrites.iter().enumerate() {
        if let Some(reason) = check_field("domain", &rw.domain) {
            errors.push(ValidationError::InvalidRewrite { index, reason });
        }
        if let Some(reason) = check_field("answer", &rw.answer) {
            errors.push(ValidationError::InvalidRewrite { index, reason });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::RewriteEntry;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "secret".into();
        config
    }

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_enabled_admin_requires_api_key() {
        let mut config = valid_config();
        config.admin.api_key = String::new();
        assert_eq!(validate_config(&config).unwrap_err(), vec![ValidationError::MissingApiKey]);

        config.admin.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid_config();
        config.admin.bind_address = "not-an-address".into();
        config.admin.request_timeout_secs = 0;
        config.observability.log_level = "loud".into();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "9090".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroTimeout));
        assert!(errors.contains(&ValidationError::InvalidLogLevel("loud".into())));
    }

    #[test]
    fn test_disabled_admin_skips_address_check() {
        let mut config = AppConfig::default();
        config.admin.enabled = false;
        config.admin.api_key = String::new();
        config.admin.bind_address = String::new();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_bad_rewrites() {
        let mut config = valid_config();
        config.filtering.rewrites = vec![
            RewriteEntry::new("ok.lan", "1.2.3.4"),
            RewriteEntry::new("", "1.2.3.4"),
            RewriteEntry::new("bad.lan", "host,junk"),
            RewriteEntry::new("sp ace.lan", "A"),
        ];

        let errors = validate_config(&config).unwrap_err();
        let indexes: Vec<usize> = errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::InvalidRewrite { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indexes, vec![1, 2, 3]);
    }
}
