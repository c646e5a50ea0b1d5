//! Read-only snapshots of a session, as printed by the `status` command.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::registry::PeerId;
use crate::transport::TransportStats;

/// Which endpoints a session currently owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Neither hosting nor connected.
    None,
    /// Client endpoint only.
    Client,
    /// Server endpoint only.
    Server,
    /// A local server plus a client endpoint.
    Both,
}

impl Role {
    pub(crate) const fn from_flags(client: bool, server: bool) -> Self {
        match (client, server) {
            (false, false) => Self::None,
            (true, false) => Self::Client,
            (false, true) => Self::Server,
            (true, true) => Self::Both,
        }
    }
}

/// One connected peer in a [`SessionStatus`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerStatus {
    /// Assigned id.
    pub id: PeerId,
    /// Display name.
    pub name: String,
    /// Round-trip time, once measured.
    pub round_trip_time: Option<Duration>,
}

/// Snapshot of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStatus {
    /// Protocol version spoken.
    pub protocol_version: u32,
    /// Current role.
    pub role: Role,
    /// Address the local server listens on.
    pub listen_address: Option<SocketAddr>,
    /// Server the client is connected (or connecting) to.
    pub server_address: Option<SocketAddr>,
    /// Client round-trip time to its server.
    pub ping: Option<Duration>,
    /// Peers of the local server.
    pub peers: Vec<PeerStatus>,
    /// Counters of the server endpoint.
    pub server_stats: Option<TransportStats>,
}

fn millis(rtt: Option<Duration>) -> u128 {
    rtt.map_or(0, |rtt| rtt.as_millis())
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.role == Role::None {
            return write!(f, "Not connected to any server.");
        }
        writeln!(f, "version: {}", self.protocol_version)?;
        if let Some(address) = self.listen_address {
            writeln!(f, "udp/ip: {address}")?;
            for peer in &self.peers {
                writeln!(
                    f,
                    "# {} {} {}ms",
                    peer.id,
                    peer.name,
                    millis(peer.round_trip_time)
                )?;
            }
            if let Some(stats) = self.server_stats {
                writeln!(
                    f,
                    "sent: {} packets / {} bytes, received: {} packets / {} bytes",
                    stats.packets_sent, stats.bytes_sent, stats.packets_received, stats.bytes_received
                )?;
            }
        }
        if let Some(address) = self.server_address {
            writeln!(f, "server: {address}")?;
            writeln!(f, "ping: {}ms", millis(self.ping))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_flags() {
        assert_eq!(Role::from_flags(false, false), Role::None);
        assert_eq!(Role::from_flags(true, false), Role::Client);
        assert_eq!(Role::from_flags(false, true), Role::Server);
        assert_eq!(Role::from_flags(true, true), Role::Both);
    }

    #[test]
    fn test_display_lists_peers() {
        let status = SessionStatus {
            protocol_version: 1,
            role: Role::Server,
            listen_address: Some("0.0.0.0:7777".parse().unwrap()),
            server_address: None,
            ping: None,
            peers: vec![PeerStatus {
                id: PeerId(1),
                name: "alice".to_owned(),
                round_trip_time: Some(Duration::from_millis(42)),
            }],
            server_stats: None,
        };
        let text = status.to_string();
        assert!(text.contains("version: 1"));
        assert!(text.contains("udp/ip: 0.0.0.0:7777"));
        assert!(text.contains("# 1 alice 42ms"));
    }

    #[test]
    fn test_display_disconnected() {
        let status = SessionStatus {
            protocol_version: 1,
            role: Role::None,
            listen_address: None,
            server_address: None,
            ping: None,
            peers: Vec::new(),
            server_stats: None,
        };
        assert_eq!(status.to_string(), "Not connected to any server.");
    }
}
