//! # Transport Layer
//!
//! Connection-oriented peers over datagrams, modelled on ENet: a host owns
//! one socket and any number of peers, each with reliable ordered delivery,
//! unreliable delivery, keep-alive pings and a round-trip estimate.
//!
//! ## Design
//!
//! - [`Network`] creates endpoints ([`Host`]s) and resolves addresses
//! - [`Host::service`] is a zero-timeout poll returning one [`HostEvent`]
//! - [`host::PeerHost`] implements the peer protocol once, over any
//!   [`DatagramSocket`]: real UDP ([`udp`]) or an in-memory hub ([`loopback`])
//!
//! Nothing here spawns threads or blocks; the owner calls `service` every
//! tick until it returns `None`.

mod frame;
pub mod host;
pub mod loopback;
mod reliability;
pub mod udp;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::error::TransportResult;

/// Largest datagram a host will send or accept.
pub const MAX_DATAGRAM_SIZE: usize = 1200;

/// Largest payload [`Host::send`] accepts. Payloads that don't fit one
/// datagram are fragmented.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// First resend delay for an unacknowledged reliable frame (doubles per resend).
pub const RESEND_INTERVAL: Duration = Duration::from_millis(200);

/// Upper bound of the resend backoff.
pub const MAX_RESEND_INTERVAL: Duration = Duration::from_secs(2);

/// Idle interval after which a connected peer is pinged.
pub const PING_INTERVAL: Duration = Duration::from_millis(500);

/// A peer that stays silent (or leaves a frame unacknowledged) this long is
/// dropped with a [`HostEvent::Disconnect`].
pub const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle of a peer within one host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(pub u32);

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Delivery guarantee of a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Acknowledged, resent until acked, delivered in order.
    Reliable,
    /// Sent once, may be lost.
    Unreliable,
}

impl Delivery {
    /// Maps a `reliable` flag to a delivery mode.
    #[inline]
    #[must_use]
    pub const fn from_reliable(reliable: bool) -> Self {
        if reliable {
            Self::Reliable
        } else {
            Self::Unreliable
        }
    }
}

/// An event produced by [`Host::service`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// A peer finished connecting (outgoing or incoming).
    Connect(PeerHandle),
    /// A payload arrived from a connected peer.
    Receive {
        /// Sender.
        peer: PeerHandle,
        /// Payload bytes.
        data: Vec<u8>,
        /// How the payload was sent.
        delivery: Delivery,
    },
    /// A peer disconnected, gracefully or by timing out.
    Disconnect(PeerHandle),
}

impl HostEvent {
    /// Peer the event concerns.
    #[must_use]
    pub const fn peer(&self) -> PeerHandle {
        match self {
            Self::Connect(peer) | Self::Disconnect(peer) | Self::Receive { peer, .. } => *peer,
        }
    }
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Datagrams sent.
    pub packets_sent: u64,
    /// Datagrams received.
    pub packets_received: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Reliable frames sent again after a missing ack.
    pub resends: u64,
    /// Send errors.
    pub send_errors: u64,
    /// Datagrams discarded (malformed, unknown sender, oversized).
    pub dropped: u64,
}

/// One network endpoint and its peers.
pub trait Host: Send {
    /// Starts connecting to a remote host.
    ///
    /// Completion is reported by a later [`HostEvent::Connect`] (or
    /// [`HostEvent::Disconnect`] on refusal).
    ///
    /// # Errors
    ///
    /// Fails if the host has no free peer slot.
    fn connect(&mut self, address: SocketAddr, now: Instant) -> TransportResult<PeerHandle>;

    /// Queues a payload for a connected peer. Sends to unknown or
    /// unconnected peers are dropped, as are payloads over
    /// [`MAX_PAYLOAD_SIZE`]. A payload larger than one datagram is
    /// fragmented and always delivered reliably.
    fn send(&mut self, peer: PeerHandle, data: &[u8], delivery: Delivery);

    /// Transmits everything queued.
    fn flush(&mut self);

    /// Starts a graceful disconnect; a [`HostEvent::Disconnect`] follows once
    /// the remote acknowledges.
    fn disconnect(&mut self, peer: PeerHandle);

    /// Forgets a peer immediately, without notifying the remote or
    /// producing an event.
    fn reset(&mut self, peer: PeerHandle);

    /// Polls the socket and timers with a zero timeout.
    fn service(&mut self, now: Instant) -> Option<HostEvent>;

    /// Last time anything was received from the peer.
    fn last_receive_time(&self, peer: PeerHandle) -> Option<Instant>;

    /// Smoothed round-trip time of the peer, once measured.
    fn round_trip_time(&self, peer: PeerHandle) -> Option<Duration>;

    /// Address of the host's socket.
    fn local_addr(&self) -> SocketAddr;

    /// Transport counters.
    fn stats(&self) -> TransportStats;
}

/// Factory for endpoints.
pub trait Network: Send {
    /// Creates a single-peer client endpoint on an ephemeral port.
    ///
    /// # Errors
    ///
    /// Fails if no socket can be bound.
    fn create_client(&mut self, now: Instant) -> TransportResult<Box<dyn Host>>;

    /// Creates a server endpoint listening on `port`.
    ///
    /// # Errors
    ///
    /// Fails if the port can't be bound.
    fn create_server(
        &mut self,
        port: u16,
        max_clients: usize,
        now: Instant,
    ) -> TransportResult<Box<dyn Host>>;

    /// Resolves `"host"` or `"host:port"`; `default_port` fills in a missing port.
    ///
    /// # Errors
    ///
    /// [`crate::TransportError::Resolve`] if the host is unknown.
    fn resolve(&self, address: &str, default_port: u16) -> TransportResult<SocketAddr>;
}

/// Datagram I/O underneath a [`host::PeerHost`].
pub trait DatagramSocket: Send {
    /// Sends one datagram.
    ///
    /// # Errors
    ///
    /// Socket errors; the host counts them and carries on.
    fn send_to(&mut self, data: &[u8], to: SocketAddr) -> io::Result<()>;

    /// Receives one datagram if any is waiting.
    ///
    /// # Errors
    ///
    /// Socket errors other than "would block".
    fn recv_from(&mut self, buffer: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Address the socket is bound to.
    fn local_addr(&self) -> SocketAddr;
}

/// Splits `"host:port"` into its parts, falling back to `default_port`.
///
/// Bracketed IPv6 (`"[::1]:7777"`) is understood; a bare IPv6 address is
/// taken as a host without port.
#[must_use]
pub fn split_host_port(address: &str, default_port: u16) -> (&str, u16) {
    let address = address.trim();
    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|port| port.parse().ok())
                .unwrap_or(default_port);
            return (host, port);
        }
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            (host, port.parse().unwrap_or(default_port))
        }
        _ => (address, default_port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("localhost", 7777), ("localhost", 7777));
        assert_eq!(split_host_port("10.0.0.1:9000", 7777), ("10.0.0.1", 9000));
        assert_eq!(split_host_port(" example.org:1 ", 7777), ("example.org", 1));
        assert_eq!(split_host_port("[::1]:8000", 7777), ("::1", 8000));
        assert_eq!(split_host_port("[::1]", 7777), ("::1", 7777));
        assert_eq!(split_host_port("::1", 7777), ("::1", 7777));
        assert_eq!(split_host_port("host:notaport", 7777), ("host", 7777));
    }

    #[test]
    fn test_delivery_from_flag() {
        assert_eq!(Delivery::from_reliable(true), Delivery::Reliable);
        assert_eq!(Delivery::from_reliable(false), Delivery::Unreliable);
    }
}
