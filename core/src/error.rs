use std::path::PathBuf;

use thiserror::Error;

/// Storage failures of the verdict cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to prepare cache directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Failures talking to the host intelligence source.
///
/// None of these abort a scan; the orchestrator abandons the current query
/// and moves on to the next one.
#[derive(Debug, Error)]
pub enum IntelError {
    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("query rejected: {0}")]
    Query(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
