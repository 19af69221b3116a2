use std::path::Path;

use anyhow::Context;
use exposr_common::config::Config;
use exposr_core::cache::{SqliteCache, VerdictCache};
use exposr_core::clock::{Clock, SystemClock};
use tracing::info;

/// Drops every verdict last checked more than `max_age` seconds ago. Only
/// the database path is needed, so the rest of the file is not validated.
pub fn prune(config_path: &Path, max_age: u64) -> anyhow::Result<usize> {
    let cfg: Config = Config::from_file(config_path)
        .with_context(|| format!("could not load {}", config_path.display()))?;
    let mut cache = SqliteCache::open(&cfg.database.path)
        .with_context(|| format!("could not open cache at {}", cfg.database.path.display()))?;

    let age: i64 = i64::try_from(max_age).unwrap_or(i64::MAX);
    let cutoff: i64 = SystemClock.now().saturating_sub(age);
    let removed: usize = cache.prune(cutoff).context("could not prune the cache")?;

    let remaining: usize = cache.len().context("could not count cached verdicts")?;

    info!("Removed {removed} cached verdicts older than {max_age}s, {remaining} remain");
    Ok(removed)
}
