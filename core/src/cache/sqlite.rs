//! SQLite-backed verdict store.

use std::net::IpAddr;
use std::path::Path;

use exposr_common::scan::{CheckKind, Verdict};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::VerdictCache;
use crate::error::CacheError;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS resolver_cache (
        ip TEXT NOT NULL,
        check_kind TEXT NOT NULL,
        is_open_resolver BOOLEAN NOT NULL,
        last_checked INTEGER NOT NULL,
        PRIMARY KEY (ip, check_kind)
    )";

// The address-only layout does not say which check wrote a row, and some
// rows were written without any probe at all. They are kept as `dns` rows
// with `last_checked = 0` so every one of them is stale and gets re-probed.
const MIGRATE_LEGACY: &str = "
    BEGIN;
    ALTER TABLE resolver_cache RENAME TO resolver_cache_legacy;
    CREATE TABLE resolver_cache (
        ip TEXT NOT NULL,
        check_kind TEXT NOT NULL,
        is_open_resolver BOOLEAN NOT NULL,
        last_checked INTEGER NOT NULL,
        PRIMARY KEY (ip, check_kind)
    );
    INSERT INTO resolver_cache (ip, check_kind, is_open_resolver, last_checked)
        SELECT ip, 'dns', COALESCE(is_open_resolver, 0), 0
        FROM resolver_cache_legacy;
    DROP TABLE resolver_cache_legacy;
    COMMIT;";

pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    /// Opens or creates the store at `path`, creating parent directories and
    /// migrating an address-keyed table if one is found.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let cache = Self {
            conn: Connection::open(path)?,
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        let cache = Self {
            conn: Connection::open_in_memory()?,
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Number of stored verdicts across every check kind.
    pub fn len(&self) -> Result<usize, CacheError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM resolver_cache", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn initialize_schema(&self) -> Result<(), CacheError> {
        if self.has_legacy_layout()? {
            info!("Migrating address-keyed resolver_cache to per-check entries");
            self.conn.execute_batch(MIGRATE_LEGACY)?;
        } else {
            self.conn.execute(CREATE_TABLE, [])?;
        }
        Ok(())
    }

    fn has_legacy_layout(&self) -> Result<bool, CacheError> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'resolver_cache'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Ok(false);
        }
        let kind_columns: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('resolver_cache') WHERE name = 'check_kind'",
            [],
            |row| row.get(0),
        )?;
        Ok(kind_columns == 0)
    }
}

impl VerdictCache for SqliteCache {
    fn lookup(&self, address: IpAddr, kind: CheckKind) -> Result<Option<Verdict>, CacheError> {
        let verdict = self
            .conn
            .query_row(
                "SELECT is_open_resolver, last_checked FROM resolver_cache
                 WHERE ip = ?1 AND check_kind = ?2",
                params![address.to_string(), kind.as_str()],
                |row| {
                    Ok(Verdict {
                        address,
                        kind,
                        is_exposed: row.get(0)?,
                        last_checked: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(verdict)
    }

    fn store(&mut self, verdict: &Verdict) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT INTO resolver_cache (ip, check_kind, is_open_resolver, last_checked)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(ip, check_kind) DO UPDATE SET
                 is_open_resolver = excluded.is_open_resolver,
                 last_checked = excluded.last_checked",
            params![
                verdict.address.to_string(),
                verdict.kind.as_str(),
                verdict.is_exposed,
                verdict.last_checked
            ],
        )?;
        debug!(address = %verdict.address, kind = %verdict.kind, exposed = verdict.is_exposed, "verdict stored");
        Ok(())
    }

    fn prune(&mut self, cutoff: i64) -> Result<usize, CacheError> {
        let removed = self.conn.execute(
            "DELETE FROM resolver_cache WHERE last_checked < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));

    fn verdict(kind: CheckKind, is_exposed: bool, last_checked: i64) -> Verdict {
        Verdict {
            address: HOST,
            kind,
            is_exposed,
            last_checked,
        }
    }

    #[test]
    fn missing_key_is_not_an_error() {
        let cache = SqliteCache::open_in_memory().unwrap();
        assert_eq!(cache.lookup(HOST, CheckKind::Dns).unwrap(), None);
        assert_eq!(cache.len().unwrap(), 0);
    }

    #[test]
    fn repeated_stores_keep_one_row_with_last_value() {
        let mut cache = SqliteCache::open_in_memory().unwrap();
        cache.store(&verdict(CheckKind::Dns, true, 100)).unwrap();
        cache.store(&verdict(CheckKind::Dns, false, 200)).unwrap();

        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(
            cache.lookup(HOST, CheckKind::Dns).unwrap(),
            Some(verdict(CheckKind::Dns, false, 200))
        );
    }

    #[test]
    fn check_kinds_do_not_share_entries() {
        let mut cache = SqliteCache::open_in_memory().unwrap();
        cache.store(&verdict(CheckKind::Dns, true, 100)).unwrap();

        assert_eq!(cache.lookup(HOST, CheckKind::Snmp).unwrap(), None);

        cache.store(&verdict(CheckKind::Snmp, false, 150)).unwrap();
        assert_eq!(cache.len().unwrap(), 2);
        assert!(cache.lookup(HOST, CheckKind::Dns).unwrap().unwrap().is_exposed);
    }

    #[test]
    fn ipv6_addresses_round_trip_through_text_keys() {
        let mut cache = SqliteCache::open_in_memory().unwrap();
        let address = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0x53));
        let stored = Verdict {
            address,
            kind: CheckKind::Dns,
            is_exposed: true,
            last_checked: 42,
        };
        cache.store(&stored).unwrap();
        assert_eq!(cache.lookup(address, CheckKind::Dns).unwrap(), Some(stored));
    }

    #[test]
    fn lookup_at_applies_ttl() {
        let mut cache = SqliteCache::open_in_memory().unwrap();
        cache.store(&verdict(CheckKind::Dns, true, 1_000)).unwrap();

        assert!(matches!(
            cache.lookup_at(HOST, CheckKind::Dns, 1_001, 3600).unwrap(),
            crate::cache::Lookup::Fresh(_)
        ));
        assert!(matches!(
            cache.lookup_at(HOST, CheckKind::Dns, 4_600, 3600).unwrap(),
            crate::cache::Lookup::Stale(_)
        ));
    }

    #[test]
    fn prune_removes_only_old_entries() {
        let mut cache = SqliteCache::open_in_memory().unwrap();
        cache.store(&verdict(CheckKind::Dns, true, 100)).unwrap();
        cache.store(&verdict(CheckKind::Snmp, true, 500)).unwrap();

        assert_eq!(cache.prune(300).unwrap(), 1);
        assert_eq!(cache.lookup(HOST, CheckKind::Dns).unwrap(), None);
        assert!(cache.lookup(HOST, CheckKind::Snmp).unwrap().is_some());
    }

    #[test]
    fn persists_across_reopen_and_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        {
            let mut cache = SqliteCache::open(&path).unwrap();
            cache.store(&verdict(CheckKind::Snmp, true, 77)).unwrap();
        }

        let cache = SqliteCache::open(&path).unwrap();
        assert_eq!(
            cache.lookup(HOST, CheckKind::Snmp).unwrap(),
            Some(verdict(CheckKind::Snmp, true, 77))
        );
    }

    #[test]
    fn migrates_address_keyed_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE resolver_cache (
                     ip TEXT PRIMARY KEY,
                     is_open_resolver BOOLEAN,
                     last_checked INTEGER
                 );
                 INSERT INTO resolver_cache VALUES ('1.2.3.4', 1, 1700000000);",
            )
            .unwrap();
        }

        let mut cache = SqliteCache::open(&path).unwrap();
        assert_eq!(
            cache.lookup(HOST, CheckKind::Dns).unwrap(),
            Some(verdict(CheckKind::Dns, true, 0))
        );
        assert_eq!(cache.lookup(HOST, CheckKind::Snmp).unwrap(), None);
        assert!(matches!(
            cache.lookup_at(HOST, CheckKind::Dns, 1_700_000_010, 3600).unwrap(),
            crate::cache::Lookup::Stale(_)
        ));

        cache.store(&verdict(CheckKind::Snmp, false, 1_700_000_100)).unwrap();
        assert!(cache.lookup(HOST, CheckKind::Snmp).unwrap().is_some());
        assert!(cache.lookup(HOST, CheckKind::Dns).unwrap().is_some());
    }
}
