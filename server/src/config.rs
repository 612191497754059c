use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use shared::constants::DEFAULT_MAP;

/// Where the server listens and how it degrades outbound traffic for testing.
#[derive(Debug, Clone)]
pub struct ListenConfig {
    /// Signaling socket address. Peer links bind on the same IP.
    pub addr: SocketAddr,
    /// Address advertised in candidates. Defaults to the bind IP, or loopback
    /// when bound to an unspecified address.
    pub public_ip: Option<IpAddr>,
    /// Added to every outbound send on both channels.
    pub simulate_latency: Duration,
    /// Percentage (0-100) of outbound sends dropped before any delay.
    pub simulate_packet_loss: f32,
    /// Fixed seed for the loss draws, `None` for entropy.
    pub loss_seed: Option<u64>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            public_ip: None,
            simulate_latency: Duration::ZERO,
            simulate_packet_loss: 0.0,
            loss_seed: None,
        }
    }
}

impl ListenConfig {
    pub fn candidate_ip(&self, bound: IpAddr) -> IpAddr {
        if let Some(ip) = self.public_ip {
            return ip;
        }
        match bound {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: ListenConfig,
    /// Map sent in `Welcome` and loaded at startup.
    pub map: String,
    /// Idle wait between polls of the tick accumulator.
    pub poll_interval: Duration,
    /// Fixed seed for spawn choice, `None` for entropy.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            map: DEFAULT_MAP.to_string(),
            poll_interval: Duration::from_millis(1),
            seed: None,
        }
    }
}
