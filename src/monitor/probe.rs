//! Per-device reachability checks.
//!
//! A probe returns a definite [`ProbeOutcome`]; any executor-level fault
//! (bad protocol/port combination, resolution failure, raw socket failure)
//! surfaces as a [`ProbeError`], which the run coordinator treats as
//! "reachability unknown" for this cycle.

use rand::random;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpStream, UdpSocket};
use tracing::debug;

use crate::db::models::{Device, Protocol, TriggerState};

/// How many echo requests an ICMP probe sends before giving up.
const ICMP_ATTEMPTS: u16 = 3;
/// Per-attempt reply timeout for ICMP echoes.
const ICMP_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);
/// Connect timeout for TCP probes.
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// How long a UDP probe waits for a response or an ICMP rejection.
const UDP_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable,
}

impl ProbeOutcome {
    /// The reachability state this outcome observes, for comparison against
    /// a device's trigger.
    pub fn state(self) -> TriggerState {
        match self {
            ProbeOutcome::Reachable => TriggerState::Online,
            ProbeOutcome::Unreachable => TriggerState::Offline,
        }
    }
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid probe target: {0}")]
    InvalidTarget(String),
    #[error("failed to resolve host {0}")]
    Resolve(String),
    #[error("probe socket error: {0}")]
    Socket(#[from] std::io::Error),
}

/// Tests whether a device is currently reachable using the probe strategy
/// its protocol selects.
pub async fn probe(device: &Device) -> Result<ProbeOutcome, ProbeError> {
    match (device.protocol, device.port) {
        (Protocol::Icmp, None) => {
            debug!(device = %device.name, "pinging address {}", device.identifier);
            icmp_probe(&device.identifier).await
        }
        (Protocol::Tcp, Some(port)) => {
            debug!(device = %device.name, "testing TCP port {port}");
            tcp_probe(&device.identifier, port).await
        }
        (Protocol::Udp, Some(port)) => {
            debug!(device = %device.name, "testing UDP port {port}");
            udp_probe(&device.identifier, port).await
        }
        (Protocol::Icmp, Some(port)) => Err(ProbeError::InvalidTarget(format!(
            "ICMP probes take no port, got {port}"
        ))),
        (proto, None) => Err(ProbeError::InvalidTarget(format!(
            "{proto} probes require a port"
        ))),
    }
}

/// Resolves a host name or address literal to an IP, off the async runtime.
async fn resolve_host(identifier: &str) -> Result<IpAddr, ProbeError> {
    let host = identifier.to_string();
    let resolved = tokio::task::spawn_blocking(move || {
        use std::net::ToSocketAddrs;
        format!("{host}:0")
            .to_socket_addrs()
            .map(|mut addrs| addrs.next())
    })
    .await
    .map_err(|_| ProbeError::Resolve(identifier.to_string()))?;

    match resolved {
        Ok(Some(addr)) => Ok(addr.ip()),
        _ => Err(ProbeError::Resolve(identifier.to_string())),
    }
}

async fn icmp_probe(identifier: &str) -> Result<ProbeOutcome, ProbeError> {
    let addr = resolve_host(identifier).await?;
    let config = match addr {
        IpAddr::V4(_) => surge_ping::Config::default(),
        IpAddr::V6(_) => surge_ping::Config::builder()
            .kind(surge_ping::ICMP::V6)
            .build(),
    };
    let client = surge_ping::Client::new(&config)?;
    let mut pinger = client
        .pinger(addr, surge_ping::PingIdentifier(random()))
        .await;
    pinger.timeout(ICMP_ATTEMPT_TIMEOUT);

    // Reachable as soon as any echo is answered.
    for seq in 0..ICMP_ATTEMPTS {
        if pinger
            .ping(surge_ping::PingSequence(seq), &[])
            .await
            .is_ok()
        {
            return Ok(ProbeOutcome::Reachable);
        }
    }
    Ok(ProbeOutcome::Unreachable)
}

async fn tcp_probe(identifier: &str, port: u16) -> Result<ProbeOutcome, ProbeError> {
    let addr = SocketAddr::new(resolve_host(identifier).await?, port);
    match tokio::time::timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(ProbeOutcome::Reachable),
        Ok(Err(_)) | Err(_) => Ok(ProbeOutcome::Unreachable),
    }
}

/// UDP has no handshake, so this mirrors `nc -zu`: send an empty datagram
/// and treat an ICMP port-unreachable rejection as the only definite "down"
/// signal. Silence within the timeout counts as reachable.
async fn udp_probe(identifier: &str, port: u16) -> Result<ProbeOutcome, ProbeError> {
    let addr = SocketAddr::new(resolve_host(identifier).await?, port);
    let bind_addr = match addr {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(addr).await?;
    if socket.send(&[]).await.is_err() {
        return Ok(ProbeOutcome::Unreachable);
    }

    let mut buf = [0u8; 1];
    match tokio::time::timeout(UDP_RESPONSE_TIMEOUT, socket.recv(&mut buf)).await {
        Ok(Ok(_)) => Ok(ProbeOutcome::Reachable),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            Ok(ProbeOutcome::Unreachable)
        }
        Ok(Err(e)) => Err(ProbeError::Socket(e)),
        Err(_elapsed) => Ok(ProbeOutcome::Reachable),
    }
}
