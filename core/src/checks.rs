//! # Exposure Checks
//!
//! A check performs the live protocol probe for one candidate and folds the
//! attempts into a single verdict. Checks are looked up by [`CheckKind`]
//! through a [`CheckRegistry`], which the orchestrator owns.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use exposr_common::config::{Config, SnmpProtocol};
use exposr_common::scan::CheckKind;
use exposr_protocols::snmp::SnmpVersion;

mod dns;
mod snmp;

pub use dns::{DnsProber, DnsResolverCheck, UdpDnsProber};
pub use snmp::{SnmpClient, SnmpCommunityCheck, UdpSnmpClient, interpret_response};

/// Folded result of a check: the verdict plus anything worth showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub is_exposed: bool,
    pub detail: Option<String>,
}

#[async_trait]
pub trait ExposureCheck: Send + Sync {
    fn kind(&self) -> CheckKind;

    async fn verify(&self, address: IpAddr) -> CheckReport;
}

#[derive(Default, Clone)]
pub struct CheckRegistry {
    checks: HashMap<CheckKind, Arc<dyn ExposureCheck>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `check` under its own kind, replacing any previous one.
    pub fn with(mut self, check: Arc<dyn ExposureCheck>) -> Self {
        self.checks.insert(check.kind(), check);
        self
    }

    pub fn get(&self, kind: CheckKind) -> Option<Arc<dyn ExposureCheck>> {
        self.checks.get(&kind).cloned()
    }

    /// Both checks wired to real UDP probes as configured.
    pub fn from_config(cfg: &Config) -> Self {
        let dns_prober = UdpDnsProber::new(cfg.dns.port, Duration::from_millis(cfg.dns.timeout_ms));
        let dns_check = DnsResolverCheck::new(
            Box::new(dns_prober),
            cfg.domains_to_test.clone(),
            cfg.success_threshold,
        );

        let version = match cfg.snmp.version {
            SnmpProtocol::V1 => SnmpVersion::V1,
            SnmpProtocol::V2c => SnmpVersion::V2c,
        };
        let snmp_client =
            UdpSnmpClient::new(cfg.snmp.port, Duration::from_millis(cfg.snmp.timeout_ms), version);
        let snmp_check = SnmpCommunityCheck::new(Box::new(snmp_client), cfg.snmp_communities.clone());

        Self::new()
            .with(Arc::new(dns_check))
            .with(Arc::new(snmp_check))
    }
}
