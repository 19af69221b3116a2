//! Host intelligence sources: where candidates come from.

use async_trait::async_trait;
use exposr_common::scan::{Candidate, Signature};

use crate::error::IntelError;

mod shodan;

pub use shodan::ShodanClient;

#[async_trait]
pub trait IntelligenceSource: Send + Sync {
    /// One page of hosts matching `signature`.
    async fn query(&self, signature: &Signature) -> Result<Vec<Candidate>, IntelError>;
}
