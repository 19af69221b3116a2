use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::ensure;
use async_trait::async_trait;
use exposr_common::scan::{CheckKind, ProbeOutcome};
use exposr_protocols::snmp::{self, Message, SYS_NAME_OID, SnmpVersion};
use tokio::time::timeout;
use tracing::debug;

use super::{CheckReport, ExposureCheck};
use crate::network::udp;

/// Issues a sysName.0 GET with one community string.
#[async_trait]
pub trait SnmpClient: Send + Sync {
    async fn get_sys_name(&self, address: IpAddr, community: &str) -> ProbeOutcome;
}

/// Tries community strings in order and stops at the first one the agent
/// accepts.
pub struct SnmpCommunityCheck {
    client: Box<dyn SnmpClient>,
    communities: Vec<String>,
}

impl SnmpCommunityCheck {
    pub fn new(client: Box<dyn SnmpClient>, communities: Vec<String>) -> Self {
        Self {
            client,
            communities,
        }
    }
}

#[async_trait]
impl ExposureCheck for SnmpCommunityCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Snmp
    }

    async fn verify(&self, address: IpAddr) -> CheckReport {
        for community in &self.communities {
            match self.client.get_sys_name(address, community).await {
                ProbeOutcome::Success(sys_name) => {
                    let detail = match sys_name {
                        Some(name) => format!("community '{community}', sysName: {name}"),
                        None => format!("community '{community}'"),
                    };
                    return CheckReport {
                        is_exposed: true,
                        detail: Some(detail),
                    };
                }
                ProbeOutcome::NonSuccess(reason) => {
                    debug!(%address, %community, "community not accepted: {reason}");
                }
                ProbeOutcome::Error(reason) => {
                    debug!(%address, %community, "snmp probe failed: {reason}");
                }
            }
        }

        CheckReport {
            is_exposed: false,
            detail: None,
        }
    }
}

/// A reply proves access when it carries sysName.0 without an error status.
pub fn interpret_response(response: &Message) -> ProbeOutcome {
    if response.error_status != 0 {
        return ProbeOutcome::NonSuccess(format!(
            "agent returned {}",
            snmp::error_status_name(response.error_status)
        ));
    }
    match response.varbinds.iter().find(|vb| vb.oid == SYS_NAME_OID) {
        Some(varbind) => ProbeOutcome::Success(Some(varbind.value.to_display_string())),
        None => ProbeOutcome::NonSuccess(String::from("response did not carry sysName.0")),
    }
}

/// One GET per attempt over UDP, short timeout, no retry.
pub struct UdpSnmpClient {
    port: u16,
    timeout: Duration,
    version: SnmpVersion,
}

impl UdpSnmpClient {
    pub fn new(port: u16, timeout: Duration, version: SnmpVersion) -> Self {
        Self {
            port,
            timeout,
            version,
        }
    }
}

#[async_trait]
impl SnmpClient for UdpSnmpClient {
    async fn get_sys_name(&self, address: IpAddr, community: &str) -> ProbeOutcome {
        let request_id: i32 = rand::random_range(1..i32::MAX);
        let packet: Vec<u8> =
            match snmp::create_get_packet(self.version, community, request_id, SYS_NAME_OID) {
                Ok(packet) => packet,
                Err(err) => return ProbeOutcome::Error(format!("{err:#}")),
            };

        let target = SocketAddr::new(address, self.port);
        let exchange = udp::request(target, &packet, |payload| {
            let response: Message = snmp::parse_get_response(payload)?;
            ensure!(response.request_id == request_id, "request id mismatch");
            Ok(response)
        });

        match timeout(self.timeout, exchange).await {
            Ok(Ok(response)) => interpret_response(&response),
            Ok(Err(err)) => ProbeOutcome::Error(format!("{err:#}")),
            Err(_) => ProbeOutcome::NonSuccess(String::from("timed out")),
        }
    }
}
