//! Rewrite items: normalization and rule compilation.
//!
//! # Responsibilities
//! - Classify an answer as exception, address or canonical name
//! - Lower-case the domain pattern
//! - Render a normalized item as one line of rule text
//!
//! # Design Decisions
//! - Sentinels ("A", "AAAA") are checked before IP parsing
//! - The classification is decided once and stored as `AnswerKind`
//! - Rule metacharacters are rejected up front; compiled text is never escaped

use std::fmt;
use std::net::IpAddr;

use hickory_proto::rr::RecordType;
use serde::{Deserialize, Serialize};

use crate::rewrite::error::{RewriteError, RewriteResult};

/// Characters that carry meaning in rule syntax.
const RULE_METACHARACTERS: [char; 5] = ['$', ',', '|', '^', '@'];

/// The persisted and wire shape of a rewrite: just domain and answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RewriteEntry {
    /// Domain pattern the rewrite applies to.
    pub domain: String,

    /// IP address, canonical name, or one of "A" / "AAAA".
    pub answer: String,
}

impl RewriteEntry {
    pub fn new(domain: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            answer: answer.into(),
        }
    }
}

/// DNS record kind a rewrite produces or exempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    A,
    Aaaa,
    Cname,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::A => "A",
            RecordKind::Aaaa => "AAAA",
            RecordKind::Cname => "CNAME",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RecordKind> for RecordType {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::A => RecordType::A,
            RecordKind::Aaaa => RecordType::AAAA,
            RecordKind::Cname => RecordType::CNAME,
        }
    }
}

/// How an answer was classified during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKind {
    /// "A" or "AAAA": exempt the domain from blocking for that record kind.
    Exception(RecordKind),
    /// A literal address; IPv4-mapped IPv6 addresses are folded to IPv4.
    Address(IpAddr),
    /// Anything else, used as a CNAME target.
    Canonical,
}

impl AnswerKind {
    fn classify(answer: &str) -> Self {
        match answer {
            "AAAA" => return AnswerKind::Exception(RecordKind::Aaaa),
            "A" => return AnswerKind::Exception(RecordKind::A),
            _ => {}
        }

        match answer.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => match ip.to_ipv4_mapped() {
                Some(v4) => AnswerKind::Address(IpAddr::V4(v4)),
                None => AnswerKind::Address(IpAddr::V6(ip)),
            },
            Ok(ip) => AnswerKind::Address(ip),
            Err(_) => AnswerKind::Canonical,
        }
    }
}

/// A single normalized DNS rewrite.
///
/// The record kind and exception flag are derived from the answer and cannot
/// be set independently; the only ways to build an `Item` go through
/// normalization.
#[derive(Debug, Clone)]
pub struct Item {
    domain: String,
    answer: String,
    kind: AnswerKind,
}

/// Checks one entry field for text that cannot be placed into a rule.
/// Returns the reason when the field is unusable.
pub fn check_field(name: &str, value: &str) -> Option<String> {
    if value.is_empty() {
        return Some(format!("{} is empty", name));
    }
    let bad = value.chars().find(|c| c.is_whitespace() || RULE_METACHARACTERS.contains(c));
    bad.map(|c| format!("{} {:?} contains {:?}", name, value, c))
}

/// Normalizes a possibly absent entry.
pub fn normalize(entry: Option<RewriteEntry>) -> RewriteResult<Item> {
    let entry = entry.ok_or(RewriteError::MissingEntry)?;

    let fields = [("domain", &entry.domain), ("answer", &entry.answer)];
    if let Some(reason) = fields.iter().find_map(|(name, value)| check_field(name, value)) {
        return Err(RewriteError::InvalidEntry(reason));
    }

    Ok(Item::from(entry))
}

impl From<RewriteEntry> for Item {
    fn from(entry: RewriteEntry) -> Self {
        let kind = AnswerKind::classify(&entry.answer);
        Self {
            domain: entry.domain.to_lowercase(),
            answer: entry.answer,
            kind,
        }
    }
}

impl From<&Item> for RewriteEntry {
    fn from(item: &Item) -> Self {
        Self {
            domain: item.domain.clone(),
            answer: item.answer.clone(),
        }
    }
}

impl Item {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn answer_kind(&self) -> AnswerKind {
        self.kind
    }

    pub fn record_kind(&self) -> RecordKind {
        match self.kind {
            AnswerKind::Exception(kind) => kind,
            AnswerKind::Address(IpAddr::V4(_)) => RecordKind::A,
            AnswerKind::Address(IpAddr::V6(_)) => RecordKind::Aaaa,
            AnswerKind::Canonical => RecordKind::Cname,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self.kind, AnswerKind::Exception(_))
    }

    /// Renders this item as a single filtering rule.
    pub fn to_rule(&self) -> String {
        if self.is_exception() {
            return format!("@@||{}^$dnstype={},dnsrewrite", self.domain, self.record_kind());
        }

        format!("|{}^$dnsrewrite=NOERROR;{};{}", self.domain, self.record_kind(), self.answer)
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.answer == other.answer && self.domain.to_lowercase() == other.domain.to_lowercase()
    }
}

impl Eq for Item {}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.domain, self.answer)
    }
}
