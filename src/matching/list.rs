//! Rule lists and their combined storage.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use crate::matching::rule::{NetworkRule, RuleError};

/// Errors raised while loading rule lists into storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// A line could not be parsed as a network rule.
    #[error("list {list_id}, line {line}: {source}: {text:?}")]
    Rule {
        list_id: i32,
        line: usize,
        text: String,
        #[source]
        source: RuleError,
    },

    /// Two lists were registered under the same identifier.
    #[error("duplicate list id {0}")]
    DuplicateList(i32),
}

/// A rule list backed by an in-memory string.
#[derive(Debug, Clone)]
pub struct StringRuleList {
    /// Synthetic identifier reported back with every rule of this list.
    pub id: i32,
    /// Newline-separated rule text.
    pub rules_text: String,
    /// Skip cosmetic (element hiding) rules instead of failing on them.
    pub ignore_cosmetic: bool,
}

impl StringRuleList {
    fn parse(&self) -> Result<Vec<NetworkRule>, FilterError> {
        let mut rules = Vec::new();

        for (idx, raw) in self.rules_text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('!') || line.starts_with('#') {
                continue;
            }
            if self.ignore_cosmetic && is_cosmetic(line) {
                continue;
            }

            let rule = NetworkRule::parse(line, self.id).map_err(|source| FilterError::Rule {
                list_id: self.id,
                line: idx + 1,
                text: line.to_string(),
                source,
            })?;
            rules.push(rule);
        }

        Ok(rules)
    }
}

fn is_cosmetic(line: &str) -> bool {
    ["##", "#@#", "#$#", "#?#"].iter().any(|marker| line.contains(marker))
}

/// All rules of one or more lists, in list order.
#[derive(Debug, Clone, Default)]
pub struct RuleStorage {
    rules: Vec<Arc<NetworkRule>>,
}

impl RuleStorage {
    /// Parses every list. Any invalid line fails the whole storage.
    pub fn new(lists: &[StringRuleList]) -> Result<Self, FilterError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::new();

        for list in lists {
            if !seen.insert(list.id) {
                return Err(FilterError::DuplicateList(list.id));
            }
            rules.extend(list.parse()?.into_iter().map(Arc::new));
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Arc<NetworkRule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
