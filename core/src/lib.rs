//! Verdict cache and verification engine.
//!
//! The [`orchestrator`] drives candidates from an [`intel`] source through
//! the [`cache`] and, on a miss, through the matching exposure [`checks`].

pub mod cache;
pub mod checks;
pub mod clock;
pub mod error;
pub mod intel;
pub mod network;
pub mod orchestrator;
