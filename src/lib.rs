//! DNS rewrites: administrator-defined DNS overrides compiled into filtering
//! rules and matched on every query.

pub mod admin;
pub mod config;
pub mod filtering;
pub mod http;
pub mod matching;
pub mod observability;
pub mod rewrite;

pub use config::schema::AppConfig;
pub use filtering::DnsFilter;
pub use http::HttpServer;
pub use rewrite::{DefaultStorage, Item, RewriteEntry, Storage};
