use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use exposr_common::scan::{CheckKind, ProbeOutcome};
use exposr_protocols::dns::{self, Resolution};
use tokio::time::timeout;
use tracing::debug;

use super::{CheckReport, ExposureCheck};
use crate::network::udp;

/// Resolves one name through one nameserver.
#[async_trait]
pub trait DnsProber: Send + Sync {
    async fn resolve(&self, nameserver: IpAddr, domain: &str) -> ProbeOutcome;
}

/// Flags a candidate as an open resolver when at least `success_threshold`
/// percent of the probe domains resolve through it.
///
/// One lucky answer proves little (the name may be cached upstream), so the
/// verdict rests on the share of independent domains that resolve. Filtered
/// probe domains can still cause false negatives.
pub struct DnsResolverCheck {
    prober: Box<dyn DnsProber>,
    probe_domains: Vec<String>,
    success_threshold: u32,
}

impl DnsResolverCheck {
    pub fn new(prober: Box<dyn DnsProber>, probe_domains: Vec<String>, success_threshold: u32) -> Self {
        Self {
            prober,
            probe_domains,
            success_threshold,
        }
    }
}

#[async_trait]
impl ExposureCheck for DnsResolverCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Dns
    }

    async fn verify(&self, address: IpAddr) -> CheckReport {
        let mut successes: usize = 0;
        for domain in &self.probe_domains {
            match self.prober.resolve(address, domain).await {
                ProbeOutcome::Success(_) => successes += 1,
                ProbeOutcome::NonSuccess(reason) => {
                    debug!(%address, %domain, "no resolution: {reason}");
                }
                ProbeOutcome::Error(reason) => {
                    debug!(%address, %domain, "resolution failed: {reason}");
                }
            }
        }

        let total: usize = self.probe_domains.len();
        CheckReport {
            is_exposed: meets_threshold(successes, total, self.success_threshold),
            detail: Some(format!("{successes}/{total} probe domains resolved")),
        }
    }
}

/// `successes / total * 100 >= threshold`, in integers.
fn meets_threshold(successes: usize, total: usize, threshold: u32) -> bool {
    if total == 0 {
        return false;
    }
    successes * 100 >= threshold as usize * total
}

/// Sends A queries over UDP with a per-attempt timeout and no retry.
pub struct UdpDnsProber {
    port: u16,
    timeout: Duration,
}

impl UdpDnsProber {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[async_trait]
impl DnsProber for UdpDnsProber {
    async fn resolve(&self, nameserver: IpAddr, domain: &str) -> ProbeOutcome {
        let id: u16 = rand::random();
        let packet: Vec<u8> = match dns::create_a_packet(domain, id) {
            Ok(packet) => packet,
            Err(err) => return ProbeOutcome::Error(format!("{err:#}")),
        };

        let target = SocketAddr::new(nameserver, self.port);
        let exchange = udp::request(target, &packet, |payload| dns::parse_resolution(payload, id));

        match timeout(self.timeout, exchange).await {
            Ok(Ok(Resolution::Answered(count))) => {
                ProbeOutcome::Success(Some(format!("{count} A records")))
            }
            Ok(Ok(Resolution::Empty)) => ProbeOutcome::NonSuccess(String::from("no answer")),
            Ok(Ok(Resolution::Rejected(rcode))) => {
                ProbeOutcome::NonSuccess(dns::rcode_name(rcode).to_string())
            }
            Ok(Err(err)) => ProbeOutcome::Error(format!("{err:#}")),
            Err(_) => ProbeOutcome::NonSuccess(String::from("timed out")),
        }
    }
}
