//! DNS rewrites subsystem.
//!
//! # Data Flow
//! ```text
//! RewriteEntry {domain, answer}
//!     → item.rs (normalize: lower-case domain, classify answer)
//!     → storage.rs (add/remove on a copy of the item list)
//!     → item.rs (to_rule for every item, joined into one rule list)
//!     → matching (RuleStorage → DnsEngine)
//!     → storage.rs (atomic swap of the new snapshot)
//!
//! Lookups:
//!     DnsRequest → committed snapshot → DnsEngine::match_request
//! ```
//!
//! # Design Decisions
//! - Kind and exception flag are derived, never stored independently
//! - Remove deletes every equal entry, not only the first one
//! - Removing an unknown entry succeeds

pub mod error;
pub mod item;
pub mod storage;

pub use error::{RewriteError, RewriteResult};
pub use item::{check_field, normalize, AnswerKind, Item, RecordKind, RewriteEntry};
pub use storage::{DefaultStorage, RewriteSnapshot, Storage};
