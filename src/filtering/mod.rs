//! DNS filter front for the rewrite storage.
//!
//! # Data Flow
//! ```text
//! config.filtering.rewrites
//!     → prepare_rewrites (normalize every entry)
//!     → DefaultStorage (REWRITES_LIST_ID)
//!
//! admin add/delete
//!     → conf lock → storage add/remove → ConfigPersister::rewrites_modified
//!
//! config reload
//!     → conf lock → re-read config file → new DefaultStorage → swap
//! ```
//!
//! # Design Decisions
//! - The conf lock orders single-item edits against bulk replacement
//! - Persistence failures are logged; the in-memory state stays
//! - The storage itself is swapped as a whole on reload

pub mod persist;

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use hickory_proto::rr::RecordType;
use thiserror::Error;

use crate::config::ConfigError;
use crate::matching::{DnsRequest, DnsResult, RewriteOutcome};
use crate::rewrite::{
    normalize, DefaultStorage, Item, RewriteEntry, RewriteError, RewriteResult, Storage,
};

pub use persist::{ConfigPersister, FilePersister, NoopPersister};

/// Synthetic rule list identifier of the rewrites list.
pub const REWRITES_LIST_ID: i32 = -2;

/// Errors of a config-driven reload.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("reading config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

/// Result of checking a hostname against the rewrites.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub result: Option<DnsResult>,
    pub outcome: Option<RewriteOutcome>,
}

impl CheckResult {
    pub fn matched(&self) -> bool {
        self.result.is_some()
    }
}

/// Owns the rewrite storage on behalf of the DNS server.
pub struct DnsFilter {
    rewrites: ArcSwap<DefaultStorage>,
    conf_lock: Mutex<()>,
    persister: Arc<dyn ConfigPersister>,
}

impl std::fmt::Debug for DnsFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsFilter")
            .field("rewrites", &self.rewrites)
            .finish_non_exhaustive()
    }
}

/// Normalizes configured entries. Stored entries are already normalized,
/// but config files are edited by hand.
fn prepare_rewrites(entries: &[RewriteEntry]) -> Vec<Item> {
    entries.iter().cloned().map(Item::from).collect()
}

impl DnsFilter {
    pub fn new(
        rewrites: &[RewriteEntry],
        persister: Arc<dyn ConfigPersister>,
    ) -> RewriteResult<Self> {
        let storage = DefaultStorage::new(REWRITES_LIST_ID, prepare_rewrites(rewrites))?;

        Ok(Self {
            rewrites: ArcSwap::from_pointee(storage),
            conf_lock: Mutex::new(()),
            persister,
        })
    }

    /// Returns the current storage.
    pub fn storage(&self) -> Arc<DefaultStorage> {
        self.rewrites.load_full()
    }

    pub fn list(&self) -> Vec<RewriteEntry> {
        self.rewrites.load().list().iter().map(RewriteEntry::from).collect()
    }

    /// Normalizes and appends a rewrite, then notifies the persister.
    pub fn add(&self, entry: Option<RewriteEntry>) -> RewriteResult<Item> {
        let item = normalize(entry)?;

        let _guard = self.conf_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let storage = self.rewrites.load_full();
        storage.add(item.clone())?;

        tracing::debug!("rewrite: added element: {} [{}]", item, storage.snapshot().items().len());
        self.config_modified(&storage);

        Ok(item)
    }

    /// Removes every rewrite equal to the entry, then notifies the persister.
    pub fn remove(&self, entry: Option<RewriteEntry>) -> RewriteResult<Item> {
        let item = normalize(entry)?;

        let _guard = self.conf_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let storage = self.rewrites.load_full();
        storage.remove(&item)?;

        tracing::debug!("rewrite: removed element: {}", item);
        self.config_modified(&storage);

        Ok(item)
    }

    /// Replaces all rewrites, e.g. after a config reload. Returns false when
    /// the list was already identical and nothing was rebuilt.
    pub fn replace_all(&self, entries: &[RewriteEntry]) -> RewriteResult<bool> {
        let _guard = self.conf_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.replace_locked(entries)
    }

    /// Re-reads the config file behind `persister` and applies its rewrites.
    ///
    /// The file is read under the conf lock, so it always reflects the last
    /// admin save; a stale change notification cannot revert a newer edit.
    pub fn reload(&self, persister: &FilePersister) -> Result<bool, ReloadError> {
        let _guard = self.conf_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let config = persister.load()?;
        let rewrites = config.filtering.rewrites.clone();
        persister.set_config(config);

        Ok(self.replace_locked(&rewrites)?)
    }

    fn replace_locked(&self, entries: &[RewriteEntry]) -> RewriteResult<bool> {
        let items = prepare_rewrites(entries);
        if self.rewrites.load().list() == items {
            return Ok(false);
        }

        let storage = DefaultStorage::new(REWRITES_LIST_ID, items)?;
        self.rewrites.store(Arc::new(storage));
        tracing::info!(count = entries.len(), "rewrites replaced");

        Ok(true)
    }

    pub fn match_request(&self, req: &DnsRequest) -> Option<DnsResult> {
        self.rewrites.load().match_request(req)
    }

    /// Matches `host` for `qtype` and resolves the response decision.
    pub fn check(&self, host: &str, qtype: RecordType) -> CheckResult {
        let result = self.match_request(&DnsRequest::new(host, qtype));
        let outcome = result.as_ref().map(|res| res.outcome(qtype));
        CheckResult { result, outcome }
    }

    fn config_modified(&self, storage: &DefaultStorage) {
        let entries: Vec<RewriteEntry> = storage.list().iter().map(RewriteEntry::from).collect();
        if let Err(e) = self.persister.rewrites_modified(&entries) {
            tracing::error!(error = %e, "Failed to persist rewrites");
        }
    }
}
