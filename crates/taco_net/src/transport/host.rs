//! # Peer Host
//!
//! The peer protocol, independent of how datagrams travel.
//!
//! ## Peer Lifecycle
//!
//! ```text
//!  connect()                          CONNECT received
//!     │                                     │
//!  Connecting ──VERIFY──> Connected <── Accepting
//!                            │
//!               disconnect() │  DISCONNECT received / timeout
//!                            v              │
//!                      Disconnecting ──ack──┴──> removed (Disconnect event)
//! ```
//!
//! Sequenced frames (CONNECT, VERIFY, DISCONNECT, PING, RELIABLE, FRAGMENT)
//! are acked and resent with backoff; payloads are released to the owner in
//! order. A payload that doesn't fit one datagram is split into FRAGMENT
//! frames and reassembled before delivery.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::frame::{self, FragmentHeader, FrameKind, FRAGMENT_HEADER_LEN};
use super::reliability::ReliabilityLayer;
use super::{
    DatagramSocket, Delivery, Host, HostEvent, PeerHandle, TransportStats, MAX_DATAGRAM_SIZE,
    MAX_PAYLOAD_SIZE, PING_INTERVAL, TRANSPORT_TIMEOUT,
};
use crate::error::{TransportError, TransportResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkState {
    /// We sent CONNECT and wait for VERIFY.
    Connecting,
    /// The remote sent CONNECT; the Connect event is emitted on processing.
    Accepting,
    Connected,
    /// We sent DISCONNECT and wait for its ack.
    Disconnecting,
}

/// Payload bytes carried by one FRAGMENT frame.
const FRAGMENT_CHUNK_LEN: usize = MAX_DATAGRAM_SIZE - frame::HEADER_LEN - FRAGMENT_HEADER_LEN;

/// Fragments of the largest payload.
const MAX_FRAGMENTS: usize = MAX_PAYLOAD_SIZE.div_ceil(FRAGMENT_CHUNK_LEN);

/// A fragmented payload being put back together.
#[derive(Debug)]
struct Assembly {
    start_sequence: u16,
    count: u16,
    next_index: u16,
    data: Vec<u8>,
}

#[derive(Debug)]
struct LinkPeer {
    address: SocketAddr,
    state: LinkState,
    reliability: ReliabilityLayer,
    assembly: Option<Assembly>,
    last_receive: Instant,
    last_ping: Instant,
    rtt: Option<Duration>,
}

impl LinkPeer {
    /// Appends one fragment and returns the payload once its last fragment
    /// is in. Fragments arrive in sequence order, so anything out of step
    /// discards the partial payload.
    fn reassemble(&mut self, body: &[u8]) -> Option<Vec<u8>> {
        let Some((header, chunk)) = FragmentHeader::decode(body) else {
            debug!("Malformed fragment from {}", self.address);
            return None;
        };
        if usize::from(header.count) > MAX_FRAGMENTS {
            debug!("Fragmented payload of {} parts from {} is too large", header.count, self.address);
            self.assembly = None;
            return None;
        }
        if header.index == 0 {
            self.assembly = Some(Assembly {
                start_sequence: header.start_sequence,
                count: header.count,
                next_index: 0,
                data: Vec::with_capacity(usize::from(header.count) * FRAGMENT_CHUNK_LEN),
            });
        }

        let assembly = self.assembly.as_mut()?;
        if assembly.start_sequence != header.start_sequence
            || assembly.count != header.count
            || assembly.next_index != header.index
        {
            debug!("Out of step fragment from {}, payload dropped", self.address);
            self.assembly = None;
            return None;
        }
        assembly.data.extend_from_slice(chunk);
        assembly.next_index += 1;
        if assembly.next_index < assembly.count {
            return None;
        }
        self.assembly.take().map(|assembly| assembly.data)
    }
}

/// A [`Host`] over any [`DatagramSocket`].
pub struct PeerHost<S> {
    socket: S,
    max_peers: usize,
    peers: HashMap<PeerHandle, LinkPeer>,
    by_address: HashMap<SocketAddr, PeerHandle>,
    next_handle: u32,
    events: VecDeque<HostEvent>,
    outbox: Vec<(SocketAddr, Vec<u8>)>,
    now: Instant,
    stats: TransportStats,
}

impl<S: DatagramSocket> PeerHost<S> {
    /// Creates a host accepting up to `max_peers` peers.
    #[must_use]
    pub fn new(socket: S, max_peers: usize, now: Instant) -> Self {
        Self {
            socket,
            max_peers,
            peers: HashMap::new(),
            by_address: HashMap::new(),
            next_handle: 1,
            events: VecDeque::new(),
            outbox: Vec::new(),
            now,
            stats: TransportStats::default(),
        }
    }

    /// Number of peers in any state.
    #[inline]
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn add_peer(&mut self, address: SocketAddr, state: LinkState) -> PeerHandle {
        let handle = PeerHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        self.peers.insert(
            handle,
            LinkPeer {
                address,
                state,
                reliability: ReliabilityLayer::new(),
                assembly: None,
                last_receive: self.now,
                last_ping: self.now,
                rtt: None,
            },
        );
        self.by_address.insert(address, handle);
        handle
    }

    fn remove_peer(&mut self, handle: PeerHandle) -> Option<LinkPeer> {
        let peer = self.peers.remove(&handle)?;
        self.by_address.remove(&peer.address);
        Some(peer)
    }

    fn drop_peer(&mut self, handle: PeerHandle) {
        if self.remove_peer(handle).is_some() {
            self.events.push_back(HostEvent::Disconnect(handle));
        }
    }

    fn queue_reliable(&mut self, handle: PeerHandle, kind: FrameKind, body: &[u8]) {
        let now = self.now;
        if let Some(peer) = self.peers.get_mut(&handle) {
            let datagram = peer.reliability.send_reliable(kind, body, now);
            self.outbox.push((peer.address, datagram));
        }
    }

    fn receive_datagrams(&mut self) {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            match self.socket.recv_from(&mut buffer) {
                Ok(Some((len, from))) => {
                    self.stats.packets_received += 1;
                    self.stats.bytes_received += len as u64;
                    self.handle_datagram(from, &buffer[..len]);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("Receive failed on {}: {}", self.socket.local_addr(), err);
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, from: SocketAddr, datagram: &[u8]) {
        let Some(frame) = frame::decode(datagram) else {
            self.stats.dropped += 1;
            return;
        };

        let known = self.by_address.get(&from).copied();
        let handle = match known {
            Some(handle) => handle,
            None if frame.kind == FrameKind::Connect => {
                if self.peers.len() >= self.max_peers {
                    debug!("Refusing connection from {}: host is full", from);
                    self.outbox
                        .push((from, frame::encode(FrameKind::Disconnect, 0, &[])));
                    return;
                }
                self.add_peer(from, LinkState::Accepting)
            }
            None => {
                self.stats.dropped += 1;
                return;
            }
        };

        let now = self.now;
        let Some(peer) = self.peers.get_mut(&handle) else {
            return;
        };
        peer.last_receive = now;

        match frame.kind {
            FrameKind::Ack => {
                let Some(acked) = peer.reliability.acknowledge(frame.sequence, now) else {
                    return;
                };
                if let Some(sample) = acked.rtt_sample {
                    peer.rtt = Some(match peer.rtt {
                        Some(rtt) => (rtt * 7 + sample) / 8,
                        None => sample,
                    });
                }
                if acked.kind == FrameKind::Disconnect && peer.state == LinkState::Disconnecting {
                    self.drop_peer(handle);
                }
            }
            FrameKind::Unreliable => {
                if peer.state == LinkState::Connected {
                    self.events.push_back(HostEvent::Receive {
                        peer: handle,
                        data: frame.body.to_vec(),
                        delivery: Delivery::Unreliable,
                    });
                }
            }
            kind => {
                // Refused frames stay unacked so the sender resends them.
                let Some(ready) = peer.reliability.receive(frame.sequence, kind, frame.body) else {
                    self.stats.dropped += 1;
                    return;
                };
                self.outbox.push((
                    peer.address,
                    frame::encode(FrameKind::Ack, frame.sequence, &[]),
                ));
                for (kind, body) in ready {
                    if !self.peers.contains_key(&handle) {
                        break;
                    }
                    self.handle_sequenced(handle, kind, body);
                }
            }
        }
    }

    fn handle_sequenced(&mut self, handle: PeerHandle, kind: FrameKind, body: Vec<u8>) {
        let Some(peer) = self.peers.get_mut(&handle) else {
            return;
        };
        match kind {
            FrameKind::Connect => {
                if peer.state == LinkState::Accepting {
                    peer.state = LinkState::Connected;
                    debug!("Peer {} connected from {}", handle, peer.address);
                    self.queue_reliable(handle, FrameKind::Verify, &[]);
                    self.events.push_back(HostEvent::Connect(handle));
                }
            }
            FrameKind::Verify => {
                if peer.state == LinkState::Connecting {
                    peer.state = LinkState::Connected;
                    self.events.push_back(HostEvent::Connect(handle));
                }
            }
            FrameKind::Disconnect => self.drop_peer(handle),
            FrameKind::Reliable => {
                if peer.state == LinkState::Connected {
                    self.events.push_back(HostEvent::Receive {
                        peer: handle,
                        data: body,
                        delivery: Delivery::Reliable,
                    });
                }
            }
            FrameKind::Fragment => {
                if peer.state != LinkState::Connected {
                    return;
                }
                if let Some(data) = peer.reassemble(&body) {
                    self.events.push_back(HostEvent::Receive {
                        peer: handle,
                        data,
                        delivery: Delivery::Reliable,
                    });
                }
            }
            FrameKind::Ping | FrameKind::Ack | FrameKind::Unreliable => {}
        }
    }

    /// Resends, pings and timeouts.
    fn maintain(&mut self) {
        let now = self.now;
        let mut expired = Vec::new();

        for (&handle, peer) in &mut self.peers {
            let silent = now.saturating_duration_since(peer.last_receive) > TRANSPORT_TIMEOUT;
            let stalled = peer
                .reliability
                .oldest_unacked()
                .is_some_and(|sent| now.saturating_duration_since(sent) > TRANSPORT_TIMEOUT);
            if silent || stalled {
                expired.push(handle);
                continue;
            }

            for datagram in peer.reliability.resends(now) {
                self.stats.resends += 1;
                self.outbox.push((peer.address, datagram));
            }

            if peer.state == LinkState::Connected
                && peer.reliability.is_idle()
                && now.saturating_duration_since(peer.last_ping) >= PING_INTERVAL
            {
                peer.last_ping = now;
                let datagram = peer.reliability.send_reliable(FrameKind::Ping, &[], now);
                self.outbox.push((peer.address, datagram));
            }
        }

        expired.sort_unstable();
        for handle in expired {
            debug!("Peer {} timed out", handle);
            self.drop_peer(handle);
        }
    }
}

impl<S: DatagramSocket> Host for PeerHost<S> {
    fn connect(&mut self, address: SocketAddr, now: Instant) -> TransportResult<PeerHandle> {
        if now > self.now {
            self.now = now;
        }
        if let Some(&handle) = self.by_address.get(&address) {
            return Ok(handle);
        }
        if self.peers.len() >= self.max_peers {
            return Err(TransportError::NoFreeSlot);
        }
        let handle = self.add_peer(address, LinkState::Connecting);
        self.queue_reliable(handle, FrameKind::Connect, &[]);
        Ok(handle)
    }

    fn send(&mut self, handle: PeerHandle, data: &[u8], delivery: Delivery) {
        if data.len() > MAX_PAYLOAD_SIZE {
            warn!(
                "Dropping {} byte payload for peer {}: larger than {} bytes",
                data.len(),
                handle,
                MAX_PAYLOAD_SIZE
            );
            self.stats.dropped += 1;
            return;
        }
        let now = self.now;
        let Some(peer) = self.peers.get_mut(&handle) else {
            debug!("Send to unknown peer {}", handle);
            return;
        };
        if peer.state != LinkState::Connected {
            debug!("Send to peer {} in state {:?} dropped", handle, peer.state);
            return;
        }

        if frame::HEADER_LEN + data.len() <= MAX_DATAGRAM_SIZE {
            let datagram = match delivery {
                Delivery::Reliable => peer.reliability.send_reliable(FrameKind::Reliable, data, now),
                Delivery::Unreliable => frame::encode(FrameKind::Unreliable, 0, data),
            };
            self.outbox.push((peer.address, datagram));
            return;
        }

        // Fragments are always reliable, whatever delivery was asked for.
        let Ok(count) = u16::try_from(data.len().div_ceil(FRAGMENT_CHUNK_LEN)) else {
            return;
        };
        let start_sequence = peer.reliability.next_sequence();
        for (index, chunk) in (0..count).zip(data.chunks(FRAGMENT_CHUNK_LEN)) {
            let header = FragmentHeader {
                start_sequence,
                index,
                count,
            };
            let datagram = peer
                .reliability
                .send_reliable(FrameKind::Fragment, &header.encode(chunk), now);
            self.outbox.push((peer.address, datagram));
        }
    }

    fn flush(&mut self) {
        for (address, datagram) in std::mem::take(&mut self.outbox) {
            match self.socket.send_to(&datagram, address) {
                Ok(()) => {
                    self.stats.packets_sent += 1;
                    self.stats.bytes_sent += datagram.len() as u64;
                }
                Err(err) => {
                    self.stats.send_errors += 1;
                    debug!("Send to {} failed: {}", address, err);
                }
            }
        }
    }

    fn disconnect(&mut self, handle: PeerHandle) {
        let Some(peer) = self.peers.get_mut(&handle) else {
            return;
        };
        match peer.state {
            LinkState::Connected | LinkState::Accepting => {
                peer.state = LinkState::Disconnecting;
                self.queue_reliable(handle, FrameKind::Disconnect, &[]);
            }
            LinkState::Connecting => self.drop_peer(handle),
            LinkState::Disconnecting => {}
        }
    }

    fn reset(&mut self, handle: PeerHandle) {
        self.remove_peer(handle);
        self.events.retain(|event| event.peer() != handle);
    }

    fn service(&mut self, now: Instant) -> Option<HostEvent> {
        if now > self.now {
            self.now = now;
        }
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        self.receive_datagrams();
        self.maintain();
        self.flush();
        self.events.pop_front()
    }

    fn last_receive_time(&self, handle: PeerHandle) -> Option<Instant> {
        self.peers.get(&handle).map(|peer| peer.last_receive)
    }

    fn round_trip_time(&self, handle: PeerHandle) -> Option<Duration> {
        self.peers.get(&handle).and_then(|peer| peer.rtt)
    }

    fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}
