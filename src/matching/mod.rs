//! DNS rule matching subsystem.
//!
//! # Data Flow
//! ```text
//! Rule text (one rule per line)
//!     → list.rs (StringRuleList → RuleStorage, strict parsing)
//!     → rule.rs (NetworkRule: pattern + $dnstype + $dnsrewrite)
//!     → engine.rs (DnsEngine: host index + generic rules)
//!
//! Per request:
//!     DnsRequest (hostname, qtype)
//!     → engine.rs (candidate lookup, exception handling)
//!     → DnsResult → RewriteOutcome
//! ```
//!
//! # Design Decisions
//! - Engines are immutable; a changed rule set means a new engine
//! - A single bad line fails the whole build
//! - Only the modifiers needed for DNS rewrites are understood

pub mod engine;
pub mod list;
pub mod rule;

pub use engine::{DnsEngine, DnsRequest, DnsResult, RewriteOutcome};
pub use list::{FilterError, RuleStorage, StringRuleList};
pub use rule::{DnsRewrite, NetworkRule, RewriteValue, RuleError};
