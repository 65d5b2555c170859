//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace + timeout layers)
//!     → admin::auth (bearer token)
//!     → admin::handlers (rewrite list/add/delete/check, status)
//!     → filtering::DnsFilter
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
