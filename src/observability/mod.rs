//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! rewrite storage, admin API, config reload produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (rule gauge, mutation and lookup counters)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
