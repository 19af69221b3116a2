use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::Context;
use tokio::net::UdpSocket;
use tracing::trace;

const RECV_BUFFER_SIZE: usize = 4096;

/// Sends `payload` to `target` from an ephemeral port and waits for the first
/// datagram that `accept` takes.
///
/// Rejected datagrams (stale replies, foreign transaction ids) are dropped and
/// the wait continues, so callers bound this with a timeout.
pub async fn request<T, F>(target: SocketAddr, payload: &[u8], mut accept: F) -> anyhow::Result<T>
where
    F: FnMut(&[u8]) -> anyhow::Result<T>,
{
    let bind_addr: SocketAddr = match target {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket: UdpSocket = UdpSocket::bind(bind_addr)
        .await
        .context("binding udp socket")?;
    socket
        .connect(target)
        .await
        .with_context(|| format!("connecting udp socket to {target}"))?;
    socket.send(payload).await.context("sending request")?;

    let mut buffer: Vec<u8> = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let len: usize = socket.recv(&mut buffer).await.context("receiving response")?;
        match accept(&buffer[..len]) {
            Ok(value) => return Ok(value),
            Err(err) => trace!(%target, "discarding datagram: {err:#}"),
        }
    }
}
