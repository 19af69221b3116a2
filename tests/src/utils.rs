use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use exposr_common::scan::{Candidate, Signature};
use exposr_core::error::IntelError;
use exposr_core::intel::IntelligenceSource;
use exposr_protocols::dns::DNS_HDR_LEN;
use exposr_protocols::snmp::{Message, PduType, SYS_NAME_OID, SnmpValue, VarBind};
use tokio::net::UdpSocket;

pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Nothing listens here, so probes are refused or time out.
pub const SILENT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2));

/// A UDP responder on 127.0.0.1 that counts every datagram it receives.
pub struct FakeServer {
    pub port: u16,
    received: Arc<AtomicUsize>,
}

impl FakeServer {
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }
}

/// Answers A queries for `answering` with one record and ignores the rest.
pub async fn spawn_dns_resolver(answering: &[&str]) -> FakeServer {
    let names: Vec<String> = answering.iter().map(|d| d.to_string()).collect();
    spawn_responder(move |request| {
        let name = query_name(request)?;
        names.contains(&name).then(|| dns_answer(request))
    })
    .await
}

/// Answers sysName.0 GETs only for `accepted` communities.
pub async fn spawn_snmp_agent(accepted: &[&str], sys_name: &str) -> FakeServer {
    let accepted: Vec<Vec<u8>> = accepted.iter().map(|c| c.as_bytes().to_vec()).collect();
    let sys_name: Vec<u8> = sys_name.as_bytes().to_vec();
    spawn_responder(move |request| {
        let mut message = Message::decode(request).ok()?;
        if !accepted.contains(&message.community) {
            return None;
        }
        message.pdu_type = PduType::GetResponse;
        message.varbinds = vec![VarBind {
            oid: SYS_NAME_OID.to_vec(),
            value: SnmpValue::OctetString(sys_name.clone()),
        }];
        message.encode().ok()
    })
    .await
}

async fn spawn_responder<F>(mut respond: F) -> FakeServer
where
    F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
{
    let socket = UdpSocket::bind(SocketAddr::new(LOOPBACK, 0)).await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();

    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(reply) = respond(&buf[..len]) {
                let _ = socket.send_to(&reply, peer).await;
            }
        }
    });

    FakeServer { port, received }
}

fn query_name(request: &[u8]) -> Option<String> {
    let mut labels: Vec<String> = Vec::new();
    let mut cursor = DNS_HDR_LEN;
    loop {
        let len = *request.get(cursor)? as usize;
        if len == 0 {
            return Some(labels.join("."));
        }
        let label = request.get(cursor + 1..cursor + 1 + len)?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        cursor += 1 + len;
    }
}

/// The request with QR set, one answer counted and an A record for
/// 192.0.2.1 appended.
fn dns_answer(request: &[u8]) -> Vec<u8> {
    let mut reply = request.to_vec();
    reply[2] |= 0x80;
    reply[3] = 0x80;
    reply[6..8].copy_from_slice(&1u16.to_be_bytes());
    reply.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01]);
    reply.extend_from_slice(&300u32.to_be_bytes());
    reply.extend_from_slice(&[0x00, 0x04, 192, 0, 2, 1]);
    reply
}

/// Returns a fixed host list per query and counts how often it is asked.
#[derive(Default)]
pub struct FakeSource {
    hosts: HashMap<Signature, Vec<IpAddr>>,
    queries: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn with(mut self, signature: Signature, hosts: &[IpAddr]) -> Self {
        self.hosts.insert(signature, hosts.to_vec());
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.queries.clone()
    }
}

#[async_trait]
impl IntelligenceSource for FakeSource {
    async fn query(&self, signature: &Signature) -> Result<Vec<Candidate>, IntelError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .hosts
            .get(signature)
            .map(|hosts| {
                hosts
                    .iter()
                    .map(|h| Candidate::new(*h, signature.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
