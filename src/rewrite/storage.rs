//! Rewrite storage with a synchronized matching engine.
//!
//! # Responsibilities
//! - Own the ordered list of rewrite items
//! - Recompile the whole list into rule text on every mutation
//! - Publish the (items, engine) pair as one snapshot
//!
//! # Design Decisions
//! - Snapshots are immutable and swapped atomically (ArcSwap)
//! - Readers never block and never see a half-applied mutation
//! - Writers are serialized by a mutex held across mutation and rebuild
//! - A failed rebuild publishes nothing, so the previous snapshot stays
//! - Full rebuild on every mutation; rewrite sets are administrator-sized

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;

use crate::matching::{DnsEngine, DnsRequest, DnsResult, RuleStorage, StringRuleList};
use crate::observability::metrics;
use crate::rewrite::error::RewriteResult;
use crate::rewrite::item::Item;

/// Storage for rewrite items that can answer DNS requests.
pub trait Storage: Send + Sync {
    /// Finds the matching rules for a request.
    fn match_request(&self, req: &DnsRequest) -> Option<DnsResult>;

    /// Appends an item.
    fn add(&self, item: Item) -> RewriteResult<()>;

    /// Deletes every item equal to `item`.
    fn remove(&self, item: &Item) -> RewriteResult<()>;

    /// Returns a copy of all items in insertion order.
    fn list(&self) -> Vec<Item>;
}

/// Items and the engine compiled from exactly those items.
#[derive(Debug)]
pub struct RewriteSnapshot {
    items: Vec<Item>,
    engine: DnsEngine,
}

impl RewriteSnapshot {
    fn build(list_id: i32, items: Vec<Item>) -> RewriteResult<Self> {
        let rules_text = items.iter().map(Item::to_rule).collect::<Vec<_>>().join("\n");

        let list = StringRuleList {
            id: list_id,
            rules_text,
            ignore_cosmetic: true,
        };
        let storage = RuleStorage::new(&[list])?;
        let engine = DnsEngine::new(&storage);

        tracing::info!("filter {}: reset {} rules", list_id, engine.rules_count());
        metrics::record_rewrite_rules(engine.rules_count());

        Ok(Self { items, engine })
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn engine(&self) -> &DnsEngine {
        &self.engine
    }
}

/// The default rewrite storage.
#[derive(Debug)]
pub struct DefaultStorage {
    /// Synthetic identifier of the compiled rule list.
    list_id: i32,

    /// Currently committed snapshot.
    current: ArcSwap<RewriteSnapshot>,

    /// Serializes writers; readers only touch `current`.
    write_lock: Mutex<()>,
}

impl DefaultStorage {
    /// Builds a storage from already normalized items. `list_id` tags the
    /// underlying rule list.
    pub fn new(list_id: i32, items: Vec<Item>) -> RewriteResult<Self> {
        let snapshot = RewriteSnapshot::build(list_id, items)?;

        Ok(Self {
            list_id,
            current: ArcSwap::from_pointee(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    pub fn list_id(&self) -> i32 {
        self.list_id
    }

    /// Returns the committed snapshot. Items and engine always belong together.
    pub fn snapshot(&self) -> Arc<RewriteSnapshot> {
        self.current.load_full()
    }

    /// Applies `mutate` to a copy of the current items, rebuilds and commits.
    fn update<F>(&self, mutate: F) -> RewriteResult<()>
    where
        F: FnOnce(&mut Vec<Item>),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut items = self.current.load().items.clone();
        mutate(&mut items);

        let snapshot = RewriteSnapshot::build(self.list_id, items)?;
        self.current.store(Arc::new(snapshot));

        Ok(())
    }
}

impl Storage for DefaultStorage {
    fn match_request(&self, req: &DnsRequest) -> Option<DnsResult> {
        let res = self.current.load().engine.match_request(req);
        metrics::record_match_request(res.is_some());
        res
    }

    fn add(&self, item: Item) -> RewriteResult<()> {
        let res = self.update(|items| items.push(item));
        metrics::record_rewrite_mutation("add", res.is_ok());
        res
    }

    fn remove(&self, item: &Item) -> RewriteResult<()> {
        let res = self.update(|items| {
            items.retain(|ent| {
                if ent == item {
                    tracing::debug!("rewrite: removed element: {}", ent);
                    return false;
                }
                true
            });
        });
        metrics::record_rewrite_mutation("remove", res.is_ok());
        res
    }

    fn list(&self) -> Vec<Item> {
        self.current.load().items.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{RewriteOutcome, RewriteValue};
    use crate::rewrite::error::RewriteError;
    use crate::rewrite::item::RewriteEntry;
    use hickory_proto::rr::RecordType;
    use std::net::Ipv4Addr;

    fn item(domain: &str, answer: &str) -> Item {
        Item::from(RewriteEntry::new(domain, answer))
    }

    fn storage(items: Vec<Item>) -> DefaultStorage {
        DefaultStorage::new(-1, items).unwrap()
    }

    #[test]
    fn test_new_storage() {
        let s = storage(vec![item("a.lan", "1.1.1.1"), item("b.lan", "A")]);
        assert_eq!(s.list_id(), -1);
        assert_eq!(s.list().len(), 2);
        assert_eq!(s.snapshot().engine().rules_count(), 2);

        let empty = storage(Vec::new());
        assert!(empty.list().is_empty());
        assert_eq!(empty.snapshot().engine().rules_count(), 0);
    }

    #[test]
    fn test_new_fails_atomically() {
        let items = vec![item("ok.lan", "1.1.1.1"), item("bad.lan", "x,y")];
        let err = DefaultStorage::new(-1, items).unwrap_err();
        assert!(matches!(err, RewriteError::Compile(_)));
    }

    #[test]
    fn test_add_keeps_insertion_order() {
        let s = storage(Vec::new());
        let added: Vec<Item> = (0..5)
            .map(|i| item(&format!("host{}.lan", i), &format!("10.0.0.{}", i)))
            .collect();
        for rw in &added {
            s.add(rw.clone()).unwrap();
        }

        assert_eq!(s.list(), added);
        assert_eq!(s.snapshot().engine().rules_count(), 5);
    }

    #[test]
    fn test_add_then_match() {
        let s = storage(Vec::new());
        s.add(item("example.com", "1.2.3.4")).unwrap();

        let res = s.match_request(&DnsRequest::new("example.com", RecordType::A)).unwrap();
        assert_eq!(
            res.outcome(RecordType::A),
            RewriteOutcome::Answers(vec![RewriteValue::Ipv4(Ipv4Addr::new(1, 2, 3, 4))])
        );
    }

    #[test]
    fn test_exception_item_exempts() {
        let s = storage(vec![item("example.com", "1.2.3.4")]);
        s.add(item("example.com", "A")).unwrap();

        let res = s.match_request(&DnsRequest::new("example.com", RecordType::A)).unwrap();
        assert!(res.is_exempted());

        let res = s.match_request(&DnsRequest::new("example.com", RecordType::AAAA)).unwrap();
        assert!(!res.is_exempted());
    }

    #[test]
    fn test_remove_all_duplicates() {
        let s = storage(vec![item("dup.lan", "1.1.1.1"), item("keep.lan", "2.2.2.2")]);
        s.add(item("dup.lan", "1.1.1.1")).unwrap();
        assert_eq!(s.list().len(), 3);

        s.remove(&item("DUP.lan", "1.1.1.1")).unwrap();
        assert_eq!(s.list(), vec![item("keep.lan", "2.2.2.2")]);
        assert_eq!(s.snapshot().engine().rules_count(), 1);
        assert!(s.match_request(&DnsRequest::new("dup.lan", RecordType::A)).is_none());
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let s = storage(vec![item("a.lan", "1.1.1.1")]);
        s.remove(&item("a.lan", "1.1.1.2")).unwrap();
        s.remove(&item("nothing.lan", "A")).unwrap();
        assert_eq!(s.list(), vec![item("a.lan", "1.1.1.1")]);
    }

    #[test]
    fn test_failed_add_rolls_back() {
        let s = storage(vec![item("a.lan", "1.1.1.1")]);
        let before = s.snapshot();

        let err = s.add(item("bad.lan", "host,junk")).unwrap_err();
        assert!(matches!(err, RewriteError::Compile(_)));

        let after = s.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(s.list(), vec![item("a.lan", "1.1.1.1")]);

        // An empty domain compiles into a pattern that is too wide.
        assert!(s.add(item("", "1.1.1.1")).is_err());
        assert_eq!(s.list().len(), 1);

        // The storage stays usable.
        s.add(item("b.lan", "2.2.2.2")).unwrap();
        assert_eq!(s.list().len(), 2);
    }

    #[test]
    fn test_list_returns_copy() {
        let s = storage(vec![item("a.lan", "1.1.1.1")]);
        let mut copy = s.list();
        copy.clear();
        copy.push(item("other.lan", "A"));
        assert_eq!(s.list(), vec![item("a.lan", "1.1.1.1")]);
    }
}
