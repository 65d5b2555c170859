//! Network rule parsing.
//!
//! # Responsibilities
//! - Split a rule line into exception marker, pattern and modifiers
//! - Compile the hostname pattern into an anchored glob
//! - Parse the `$dnstype` and `$dnsrewrite` modifiers
//!
//! # Design Decisions
//! - Modifiers start at the last `$` of the line
//! - Unknown modifiers are errors, not silently ignored
//! - Patterns are lower-cased at parse time; hostnames at match time

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;
use thiserror::Error;

/// Errors produced while parsing a single rule line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The pattern has no literal characters and would match everything.
    #[error("pattern is too wide: {0:?}")]
    TooWide(String),

    /// A modifier name that this engine does not implement.
    #[error("unknown modifier: {0}")]
    UnknownModifier(String),

    /// The same modifier appears twice.
    #[error("duplicate modifier: {0}")]
    DuplicateModifier(&'static str),

    /// `$dnstype` value is malformed.
    #[error("invalid dnstype: {0}")]
    InvalidDnsType(String),

    /// `$dnsrewrite` value is malformed.
    #[error("invalid dnsrewrite: {0}")]
    InvalidDnsRewrite(String),

    /// A bare `$dnsrewrite` outside of an exception rule.
    #[error("empty dnsrewrite is only allowed in exception rules")]
    EmptyDnsRewrite,
}

/// Where a pattern must start matching inside the hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAnchor {
    /// `||`: the hostname itself or any of its subdomains.
    Domain,
    /// `|`: the beginning of the hostname.
    Start,
    /// No anchor: anywhere inside the hostname.
    None,
}

/// A compiled hostname pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    anchor: StartAnchor,
    /// Literal core of the pattern, lower-cased, may contain `*`.
    core: String,
    end_anchored: bool,
}

impl Pattern {
    fn parse(raw: &str) -> Result<Self, RuleError> {
        let lowered = raw.to_lowercase();
        let (anchor, rest) = if let Some(rest) = lowered.strip_prefix("||") {
            (StartAnchor::Domain, rest)
        } else if let Some(rest) = lowered.strip_prefix('|') {
            (StartAnchor::Start, rest)
        } else {
            (StartAnchor::None, lowered.as_str())
        };

        let (core, end_anchored) = match rest.strip_suffix('^').or_else(|| rest.strip_suffix('|')) {
            Some(core) => (core, true),
            None => (rest, false),
        };

        if core.chars().all(|c| c == '*') {
            return Err(RuleError::TooWide(raw.to_string()));
        }

        Ok(Self {
            anchor,
            core: core.to_string(),
            end_anchored,
        })
    }

    /// Returns the host this pattern matches exactly, when it is a plain
    /// hostname anchored on both ends.
    pub fn exact_host(&self) -> Option<&str> {
        let anchored = matches!(self.anchor, StartAnchor::Domain | StartAnchor::Start);
        (anchored && self.end_anchored && !self.core.contains('*')).then_some(self.core.as_str())
    }

    pub fn anchor(&self) -> StartAnchor {
        self.anchor
    }

    /// Checks the pattern against an already lower-cased hostname.
    pub fn matches(&self, host: &str) -> bool {
        match self.anchor {
            StartAnchor::Start => glob_match(&self.core, host, false, self.end_anchored),
            StartAnchor::None => glob_match(&self.core, host, true, self.end_anchored),
            StartAnchor::Domain => {
                if glob_match(&self.core, host, false, self.end_anchored) {
                    return true;
                }
                host.match_indices('.')
                    .any(|(i, _)| glob_match(&self.core, &host[i + 1..], false, self.end_anchored))
            }
        }
    }
}

/// Matches `pattern` (with `*` wildcards) against `text`. `open_start` and
/// `!end_anchored` behave as implicit leading and trailing wildcards.
fn glob_match(pattern: &str, text: &str, open_start: bool, end_anchored: bool) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = if open_start { Some(usize::MAX) } else { None };
    let mut star_ti = 0usize;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            pi += 1;
            star_ti = ti;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if pi == p.len() && !end_anchored {
            return true;
        } else if let Some(s) = star {
            // usize::MAX marks the implicit leading wildcard.
            pi = if s == usize::MAX { 0 } else { s + 1 };
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == b'*')
}

/// The set of query types a `$dnstype` modifier admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsTypeFilter {
    allowed: Vec<RecordType>,
    excluded: Vec<RecordType>,
}

impl DnsTypeFilter {
    fn parse(value: &str) -> Result<Self, RuleError> {
        let mut allowed = Vec::new();
        let mut excluded = Vec::new();

        for part in value.split('|') {
            let (negated, name) = match part.strip_prefix('~') {
                Some(name) => (true, name),
                None => (false, part),
            };
            let rtype = parse_record_type(name)
                .ok_or_else(|| RuleError::InvalidDnsType(part.to_string()))?;
            if negated {
                excluded.push(rtype);
            } else {
                allowed.push(rtype);
            }
        }

        if !allowed.is_empty() && !excluded.is_empty() {
            return Err(RuleError::InvalidDnsType(value.to_string()));
        }

        Ok(Self { allowed, excluded })
    }

    /// Returns true if a request of type `qtype` passes this filter.
    pub fn permits(&self, qtype: RecordType) -> bool {
        if !self.allowed.is_empty() {
            return self.allowed.contains(&qtype);
        }
        !self.excluded.contains(&qtype)
    }
}

fn parse_record_type(name: &str) -> Option<RecordType> {
    if name.is_empty() {
        return None;
    }
    match RecordType::from_str(&name.to_uppercase()) {
        Ok(RecordType::Unknown(_)) | Err(_) => None,
        Ok(rtype) => Some(rtype),
    }
}

/// The payload of a `$dnsrewrite` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteValue {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    /// A domain name (CNAME or PTR target).
    Name(String),
    Text(String),
}

impl std::fmt::Display for RewriteValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RewriteValue::Ipv4(ip) => write!(f, "{}", ip),
            RewriteValue::Ipv6(ip) => write!(f, "{}", ip),
            RewriteValue::Name(name) | RewriteValue::Text(name) => f.write_str(name),
        }
    }
}

/// A parsed `$dnsrewrite` modifier.
///
/// An exception rule may carry an empty rewrite (no type, no value), which
/// disables every rewrite for the matched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRewrite {
    pub rcode: ResponseCode,
    pub rr_type: Option<RecordType>,
    pub value: Option<RewriteValue>,
}

impl DnsRewrite {
    pub fn is_empty(&self) -> bool {
        self.rcode == ResponseCode::NoError && self.rr_type.is_none() && self.value.is_none()
    }

    fn empty() -> Self {
        Self {
            rcode: ResponseCode::NoError,
            rr_type: None,
            value: None,
        }
    }

    fn parse(value: &str) -> Result<Self, RuleError> {
        let invalid = || RuleError::InvalidDnsRewrite(value.to_string());

        if value.is_empty() {
            return Ok(Self::empty());
        }

        let parts: Vec<&str> = value.split(';').collect();
        match parts.as_slice() {
            [short] => Self::parse_short(short).ok_or_else(invalid),
            [rcode, rr_type, payload] => {
                let rcode = parse_rcode(rcode).ok_or_else(invalid)?;
                if rcode != ResponseCode::NoError {
                    if !rr_type.is_empty() || !payload.is_empty() {
                        return Err(invalid());
                    }
                    return Ok(Self {
                        rcode,
                        rr_type: None,
                        value: None,
                    });
                }

                let rr_type = parse_record_type(rr_type).ok_or_else(invalid)?;
                let value = parse_value(rr_type, payload).ok_or_else(invalid)?;
                Ok(Self {
                    rcode,
                    rr_type: Some(rr_type),
                    value: Some(value),
                })
            }
            _ => Err(invalid()),
        }
    }

    fn parse_short(value: &str) -> Option<Self> {
        if let Some(rcode) = parse_rcode(value) {
            if rcode == ResponseCode::NoError {
                return Some(Self::empty());
            }
            return Some(Self {
                rcode,
                rr_type: None,
                value: None,
            });
        }

        let (rr_type, value) = match value.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => (RecordType::A, RewriteValue::Ipv4(ip)),
            Ok(IpAddr::V6(ip)) => (RecordType::AAAA, RewriteValue::Ipv6(ip)),
            Err(_) => (RecordType::CNAME, parse_value(RecordType::CNAME, value)?),
        };

        Some(Self {
            rcode: ResponseCode::NoError,
            rr_type: Some(rr_type),
            value: Some(value),
        })
    }
}

fn parse_rcode(name: &str) -> Option<ResponseCode> {
    match name {
        "NOERROR" => Some(ResponseCode::NoError),
        "NXDOMAIN" => Some(ResponseCode::NXDomain),
        "SERVFAIL" => Some(ResponseCode::ServFail),
        "REFUSED" => Some(ResponseCode::Refused),
        _ => None,
    }
}

/// Returns the canonical upper-case name of a supported rcode.
pub fn rcode_name(rcode: ResponseCode) -> &'static str {
    match rcode {
        ResponseCode::NoError => "NOERROR",
        ResponseCode::NXDomain => "NXDOMAIN",
        ResponseCode::ServFail => "SERVFAIL",
        ResponseCode::Refused => "REFUSED",
        _ => "UNKNOWN",
    }
}

fn parse_value(rr_type: RecordType, payload: &str) -> Option<RewriteValue> {
    match rr_type {
        RecordType::A => match payload.parse::<IpAddr>().ok()? {
            IpAddr::V4(ip) => Some(RewriteValue::Ipv4(ip)),
            IpAddr::V6(ip) => ip.to_ipv4_mapped().map(RewriteValue::Ipv4),
        },
        RecordType::AAAA => match payload.parse::<IpAddr>().ok()? {
            IpAddr::V6(ip) => Some(RewriteValue::Ipv6(ip)),
            IpAddr::V4(_) => None,
        },
        RecordType::CNAME | RecordType::PTR => {
            let name = payload.trim_end_matches('.');
            let valid = !name.is_empty() && !name.contains(char::is_whitespace);
            valid.then(|| RewriteValue::Name(name.to_lowercase()))
        }
        RecordType::TXT => (!payload.is_empty()).then(|| RewriteValue::Text(payload.to_string())),
        _ => None,
    }
}

/// A single parsed network rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRule {
    text: String,
    list_id: i32,
    exception: bool,
    pattern: Pattern,
    dns_type: Option<DnsTypeFilter>,
    dns_rewrite: Option<DnsRewrite>,
}

impl NetworkRule {
    /// Parses one rule line belonging to the list `list_id`.
    pub fn parse(line: &str, list_id: i32) -> Result<Self, RuleError> {
        let text = line.trim();
        let (exception, body) = match text.strip_prefix("@@") {
            Some(body) => (true, body),
            None => (false, text),
        };

        let (raw_pattern, raw_modifiers) = match body.rfind('$') {
            Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
            None => (body, None),
        };

        let pattern = Pattern::parse(raw_pattern)?;
        let mut dns_type = None;
        let mut dns_rewrite = None;

        for modifier in raw_modifiers.into_iter().flat_map(|m| m.split(',')) {
            let (name, value) = match modifier.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (modifier, None),
            };
            match name {
                "dnstype" => {
                    if dns_type.is_some() {
                        return Err(RuleError::DuplicateModifier("dnstype"));
                    }
                    let value = value.ok_or_else(|| RuleError::InvalidDnsType(String::new()))?;
                    dns_type = Some(DnsTypeFilter::parse(value)?);
                }
                "dnsrewrite" => {
                    if dns_rewrite.is_some() {
                        return Err(RuleError::DuplicateModifier("dnsrewrite"));
                    }
                    dns_rewrite = Some(DnsRewrite::parse(value.unwrap_or_default())?);
                }
                other => return Err(RuleError::UnknownModifier(other.to_string())),
            }
        }

        if !exception && dns_rewrite.as_ref().is_some_and(DnsRewrite::is_empty) {
            return Err(RuleError::EmptyDnsRewrite);
        }

        Ok(Self {
            text: text.to_string(),
            list_id,
            exception,
            pattern,
            dns_type,
            dns_rewrite,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn list_id(&self) -> i32 {
        self.list_id
    }

    /// Returns true for `@@` allowlist rules.
    pub fn is_exception(&self) -> bool {
        self.exception
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn dns_rewrite(&self) -> Option<&DnsRewrite> {
        self.dns_rewrite.as_ref()
    }

    /// Checks hostname and query type against this rule.
    pub fn matches(&self, host: &str, qtype: RecordType) -> bool {
        if let Some(filter) = &self.dns_type {
            if !filter.permits(qtype) {
                return false;
            }
        }
        self.pattern.matches(host)
    }
}
