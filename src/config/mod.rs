//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated)
//!     → filtering::DnsFilter (rewrites), admin API, observability
//!
//! On change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → DnsFilter::replace_all swaps in a new rewrite storage
//!
//! On rewrite add/delete:
//!     filtering::FilePersister → loader.rs save_config
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Derived rewrite fields are never persisted

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, save_config, ConfigError};
pub use schema::{AdminConfig, AppConfig, FilteringConfig, ObservabilityConfig};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
