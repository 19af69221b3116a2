//! # Verdict Cache
//!
//! Persistent mapping from `(address, check kind)` to the last verdict and
//! when it was produced. The store only answers "what do you have"; whether
//! an entry is still trusted is decided by the caller through [`Lookup`], so a
//! single TTL governs every check kind.

use std::net::IpAddr;

use exposr_common::scan::{CheckKind, Verdict};

use crate::error::CacheError;

mod sqlite;

pub use sqlite::SqliteCache;

pub trait VerdictCache: Send {
    /// Returns the stored verdict, if any. A missing key is not an error.
    fn lookup(&self, address: IpAddr, kind: CheckKind) -> Result<Option<Verdict>, CacheError>;

    /// Upserts `verdict`. Repeated stores for the same key leave one entry
    /// holding the latest value and timestamp.
    fn store(&mut self, verdict: &Verdict) -> Result<(), CacheError>;

    /// Deletes entries last checked before `cutoff` and returns how many went.
    fn prune(&mut self, cutoff: i64) -> Result<usize, CacheError>;

    fn lookup_at(
        &self,
        address: IpAddr,
        kind: CheckKind,
        now: i64,
        ttl_secs: u64,
    ) -> Result<Lookup, CacheError> {
        Ok(Lookup::classify(self.lookup(address, kind)?, now, ttl_secs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Fresh(Verdict),
    Stale(Verdict),
    Miss,
}

impl Lookup {
    pub fn classify(entry: Option<Verdict>, now: i64, ttl_secs: u64) -> Self {
        match entry {
            Some(verdict) if is_fresh(verdict.last_checked, now, ttl_secs) => Lookup::Fresh(verdict),
            Some(verdict) => Lookup::Stale(verdict),
            None => Lookup::Miss,
        }
    }
}

/// `(now - last_checked) < ttl`
pub fn is_fresh(last_checked: i64, now: i64, ttl_secs: u64) -> bool {
    let ttl: i64 = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
    now.saturating_sub(last_checked) < ttl
}
