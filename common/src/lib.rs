//! Shared models and configuration for the exposr workspace.

pub mod config;
pub mod error;
pub mod scan;
