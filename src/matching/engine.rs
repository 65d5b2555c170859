//! DNS request matching over compiled rule storage.
//!
//! # Responsibilities
//! - Index rules for hostname lookup
//! - Evaluate a request against every candidate rule
//! - Apply exception rules to the matched rewrites
//! - Resolve a match into a response decision
//!
//! # Design Decisions
//! - Plain hostnames anchored on both ends go into a hash index
//! - Everything else (wildcards, substrings) is scanned linearly
//! - Results keep rules in list order

use std::collections::HashMap;
use std::sync::Arc;

use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;

use crate::matching::list::RuleStorage;
use crate::matching::rule::{NetworkRule, RewriteValue, StartAnchor};

/// A DNS query as seen by the engine.
#[derive(Debug, Clone)]
pub struct DnsRequest {
    pub hostname: String,
    pub dns_type: RecordType,
}

impl DnsRequest {
    pub fn new(hostname: impl Into<String>, dns_type: RecordType) -> Self {
        Self {
            hostname: hostname.into(),
            dns_type,
        }
    }
}

/// The rules that matched a request.
#[derive(Debug, Clone, Default)]
pub struct DnsResult {
    /// Exception rule that disabled rewrites for this request, if any. A
    /// valued exception that matched but disabled nothing is not reported.
    pub exception: Option<Arc<NetworkRule>>,
    /// `$dnsrewrite` rules that survived exceptions, in list order.
    pub dns_rewrites: Vec<Arc<NetworkRule>>,
}

/// What a DNS server should answer for a matched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Rewrites are disabled; resolve normally.
    Exempt,
    /// Respond with this rcode and no answers.
    Rcode(ResponseCode),
    /// Respond with a CNAME to this target.
    Cname(String),
    /// Respond NOERROR with these values (empty means NODATA).
    Answers(Vec<RewriteValue>),
}

impl DnsResult {
    /// True when an exception disabled every rewrite: either a blanket
    /// exception, or valued exceptions that removed all matched rewrites.
    pub fn is_exempted(&self) -> bool {
        self.dns_rewrites.is_empty() && self.exception.is_some()
    }

    /// Resolves the matched rules into a response for a query of `qtype`.
    pub fn outcome(&self, qtype: RecordType) -> RewriteOutcome {
        if self.is_exempted() {
            return RewriteOutcome::Exempt;
        }

        let rewrites = || self.dns_rewrites.iter().filter_map(|rule| rule.dns_rewrite());

        if let Some(rewrite) = rewrites().find(|rw| rw.rcode != ResponseCode::NoError) {
            return RewriteOutcome::Rcode(rewrite.rcode);
        }

        if qtype != RecordType::CNAME {
            let cname = rewrites().find_map(|rw| match (&rw.rr_type, &rw.value) {
                (Some(RecordType::CNAME), Some(RewriteValue::Name(target))) => Some(target.clone()),
                _ => None,
            });
            if let Some(target) = cname {
                return RewriteOutcome::Cname(target);
            }
        }

        let answers = rewrites()
            .filter(|rw| rw.rr_type == Some(qtype))
            .filter_map(|rw| rw.value.clone())
            .collect();
        RewriteOutcome::Answers(answers)
    }
}

/// Matching engine built once from a rule storage and immutable afterwards.
#[derive(Debug, Default)]
pub struct DnsEngine {
    rules: Vec<Arc<NetworkRule>>,
    /// Exact host -> indexes into `rules`.
    by_host: HashMap<String, Vec<usize>>,
    /// Indexes of rules that need a full pattern check.
    generic: Vec<usize>,
}

impl DnsEngine {
    pub fn new(storage: &RuleStorage) -> Self {
        let mut by_host: HashMap<String, Vec<usize>> = HashMap::new();
        let mut generic = Vec::new();

        for (idx, rule) in storage.rules().iter().enumerate() {
            match rule.pattern().exact_host() {
                Some(host) => by_host.entry(host.to_string()).or_default().push(idx),
                None => generic.push(idx),
            }
        }

        Self {
            rules: storage.rules().to_vec(),
            by_host,
            generic,
        }
    }

    pub fn rules_count(&self) -> usize {
        self.rules.len()
    }

    /// Finds the rules matching `req`. Returns `None` when nothing matched.
    pub fn match_request(&self, req: &DnsRequest) -> Option<DnsResult> {
        let host = req.hostname.trim_end_matches('.').to_lowercase();
        if host.is_empty() {
            return None;
        }

        let mut candidates = self.generic.clone();
        candidates.extend(self.indexed_candidates(&host));
        candidates.sort_unstable();
        candidates.dedup();

        let (exceptions, rewrites): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .map(|idx| &self.rules[idx])
            .filter(|rule| rule.matches(&host, req.dns_type))
            .partition(|rule| rule.is_exception());

        if exceptions.is_empty() && rewrites.is_empty() {
            return None;
        }

        let blanket = exceptions
            .iter()
            .find(|rule| rule.dns_rewrite().is_some_and(|rw| rw.is_empty()));
        if let Some(rule) = blanket {
            return Some(DnsResult {
                exception: Some(Arc::clone(rule)),
                dns_rewrites: Vec::new(),
            });
        }

        let mut deciding = None;
        let mut surviving = Vec::with_capacity(rewrites.len());
        for rule in rewrites {
            let disabled_by = exceptions
                .iter()
                .find(|exc| exc.dns_rewrite().is_some() && exc.dns_rewrite() == rule.dns_rewrite());
            match disabled_by {
                Some(exc) => deciding = Some(Arc::clone(exc)),
                None => surviving.push(Arc::clone(rule)),
            }
        }

        if deciding.is_none() && surviving.is_empty() {
            return None;
        }

        Some(DnsResult {
            exception: deciding,
            dns_rewrites: surviving,
        })
    }

    /// Looks up the host and each parent domain in the exact-host index.
    fn indexed_candidates<'a>(&'a self, host: &'a str) -> impl Iterator<Item = usize> + 'a {
        let parents = host.match_indices('.').map(move |(i, _)| &host[i + 1..]);
        std::iter::once(host)
            .chain(parents)
            .enumerate()
            .flat_map(move |(depth, name)| {
                self.by_host
                    .get(name)
                    .into_iter()
                    .flatten()
                    .copied()
                    .filter(move |&idx| {
                        depth == 0 || self.rules[idx].pattern().anchor() == StartAnchor::Domain
                    })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::list::StringRuleList;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn engine(text: &str) -> DnsEngine {
        let list = StringRuleList {
            id: 1,
            rules_text: text.to_string(),
            ignore_cosmetic: true,
        };
        DnsEngine::new(&RuleStorage::new(&[list]).unwrap())
    }

    #[test]
    fn test_rewrite_match() {
        let engine = engine("|example.com^$dnsrewrite=NOERROR;A;1.2.3.4");
        assert_eq!(engine.rules_count(), 1);

        let res = engine.match_request(&DnsRequest::new("Example.COM.", RecordType::A)).unwrap();
        assert_eq!(res.dns_rewrites.len(), 1);
        assert_eq!(
            res.outcome(RecordType::A),
            RewriteOutcome::Answers(vec![RewriteValue::Ipv4(Ipv4Addr::new(1, 2, 3, 4))])
        );
        // Matched, but no AAAA payload: NODATA.
        assert_eq!(res.outcome(RecordType::AAAA), RewriteOutcome::Answers(vec![]));

        assert!(engine.match_request(&DnsRequest::new("www.example.com", RecordType::A)).is_none());
        assert!(engine.match_request(&DnsRequest::new("other.org", RecordType::A)).is_none());
    }

    #[test]
    fn test_exception_exempts_request() {
        let engine = engine(
            "|example.com^$dnsrewrite=NOERROR;A;1.2.3.4\n\
             @@||example.com^$dnstype=A,dnsrewrite",
        );

        let res = engine.match_request(&DnsRequest::new("example.com", RecordType::A)).unwrap();
        assert!(res.is_exempted());
        assert_eq!(res.outcome(RecordType::A), RewriteOutcome::Exempt);
        assert_eq!(res.exception.unwrap().text(), "@@||example.com^$dnstype=A,dnsrewrite");

        // The exception is scoped to A queries.
        let res = engine.match_request(&DnsRequest::new("example.com", RecordType::AAAA)).unwrap();
        assert!(!res.is_exempted());
    }

    #[test]
    fn test_valued_exception_disables_only_equal_rewrites() {
        let engine = engine(
            "|host.lan^$dnsrewrite=NOERROR;A;10.0.0.1\n\
             |host.lan^$dnsrewrite=NOERROR;A;10.0.0.2\n\
             @@|host.lan^$dnsrewrite=NOERROR;A;10.0.0.1",
        );
        let res = engine.match_request(&DnsRequest::new("host.lan", RecordType::A)).unwrap();
        assert_eq!(res.dns_rewrites.len(), 1);
        assert!(res.exception.is_some());
        assert_eq!(
            res.outcome(RecordType::A),
            RewriteOutcome::Answers(vec![RewriteValue::Ipv4(Ipv4Addr::new(10, 0, 0, 2))])
        );
    }

    #[test]
    fn test_valued_exception_without_effect_is_not_reported() {
        let engine = engine(
            "|host.lan^$dnsrewrite=NOERROR;A;10.0.0.2\n\
             @@|host.lan^$dnsrewrite=NOERROR;A;10.0.0.1\n\
             @@|lone.lan^$dnsrewrite=NOERROR;A;10.0.0.1",
        );

        // Nothing to disable and nothing to rewrite: no match at all.
        assert!(engine.match_request(&DnsRequest::new("lone.lan", RecordType::A)).is_none());

        let res = engine.match_request(&DnsRequest::new("host.lan", RecordType::A)).unwrap();
        assert!(res.exception.is_none());
        assert!(!res.is_exempted());
        assert_eq!(
            res.outcome(RecordType::A),
            RewriteOutcome::Answers(vec![RewriteValue::Ipv4(Ipv4Addr::new(10, 0, 0, 2))])
        );
    }

    #[test]
    fn test_valued_exception_disabling_everything_exempts() {
        let engine = engine(
            "|host.lan^$dnsrewrite=NOERROR;A;10.0.0.1\n\
             @@|host.lan^$dnsrewrite=NOERROR;A;10.0.0.1",
        );
        let res = engine.match_request(&DnsRequest::new("host.lan", RecordType::A)).unwrap();
        assert!(res.is_exempted());
        assert_eq!(res.outcome(RecordType::A), RewriteOutcome::Exempt);
    }

    #[test]
    fn test_cname_and_rcode_outcomes() {
        let engine = engine(
            "|alias.lan^$dnsrewrite=NOERROR;CNAME;target.lan\n\
             |dead.lan^$dnsrewrite=NXDOMAIN",
        );

        let res = engine.match_request(&DnsRequest::new("alias.lan", RecordType::AAAA)).unwrap();
        assert_eq!(res.outcome(RecordType::AAAA), RewriteOutcome::Cname("target.lan".into()));
        assert_eq!(
            res.outcome(RecordType::CNAME),
            RewriteOutcome::Answers(vec![RewriteValue::Name("target.lan".into())])
        );

        let res = engine.match_request(&DnsRequest::new("dead.lan", RecordType::A)).unwrap();
        assert_eq!(res.outcome(RecordType::A), RewriteOutcome::Rcode(ResponseCode::NXDomain));
    }

    #[test]
    fn test_wildcard_and_domain_rules() {
        let engine = engine(
            "|*.wild.lan^$dnsrewrite=NOERROR;AAAA;::1\n\
             ||corp.lan^$dnsrewrite=NOERROR;A;192.168.0.1",
        );

        let res = engine.match_request(&DnsRequest::new("a.b.wild.lan", RecordType::AAAA)).unwrap();
        assert_eq!(
            res.outcome(RecordType::AAAA),
            RewriteOutcome::Answers(vec![RewriteValue::Ipv6(Ipv6Addr::LOCALHOST)])
        );
        assert!(engine.match_request(&DnsRequest::new("wild.lan", RecordType::AAAA)).is_none());

        assert!(engine.match_request(&DnsRequest::new("corp.lan", RecordType::A)).is_some());
        assert!(engine.match_request(&DnsRequest::new("mail.corp.lan", RecordType::A)).is_some());
        assert!(engine.match_request(&DnsRequest::new("notcorp.lan", RecordType::A)).is_none());
    }

    #[test]
    fn test_start_anchored_rule_ignores_subdomains() {
        let engine = engine("|exact.lan^$dnsrewrite=NOERROR;A;1.1.1.1");
        assert!(engine.match_request(&DnsRequest::new("sub.exact.lan", RecordType::A)).is_none());
    }

    #[test]
    fn test_empty_engine() {
        let engine = DnsEngine::default();
        assert_eq!(engine.rules_count(), 0);
        assert!(engine.match_request(&DnsRequest::new("example.com", RecordType::A)).is_none());
        assert!(engine.match_request(&DnsRequest::new("", RecordType::A)).is_none());
    }
}
