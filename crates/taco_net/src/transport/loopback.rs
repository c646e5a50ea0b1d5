//! # Loopback Network
//!
//! An in-process datagram network. Every node gets its own IP on a shared
//! [`LoopbackHub`]; datagrams are delivered losslessly and in order the next
//! time the receiver polls. Used to run several sessions in one process
//! (tests, local play) with the exact peer protocol of the UDP transport.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::host::PeerHost;
use super::{split_host_port, DatagramSocket, Host, Network};
use crate::error::{TransportError, TransportResult};

/// First port handed out for ephemeral binds.
const EPHEMERAL_PORT_START: u16 = 49152;

type Inbox = VecDeque<(SocketAddr, Vec<u8>)>;

#[derive(Debug)]
struct HubState {
    inboxes: HashMap<SocketAddr, Inbox>,
    next_port: u16,
}

/// Shared medium of the loopback network.
#[derive(Clone, Debug)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                inboxes: HashMap::new(),
                next_port: EPHEMERAL_PORT_START,
            })),
        }
    }

    /// Binds a socket. Port 0 picks a free ephemeral port.
    ///
    /// # Errors
    ///
    /// [`TransportError::Bind`] if the address is taken.
    pub fn bind(&self, address: SocketAddr) -> TransportResult<LoopbackSocket> {
        let mut state = self.state.lock();
        let address = if address.port() == 0 {
            let mut candidate = address;
            loop {
                candidate.set_port(state.next_port);
                state.next_port = state.next_port.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
                if !state.inboxes.contains_key(&candidate) {
                    break candidate;
                }
            }
        } else {
            address
        };

        if state.inboxes.contains_key(&address) {
            return Err(TransportError::Bind {
                address,
                source: io::Error::from(io::ErrorKind::AddrInUse),
            });
        }
        state.inboxes.insert(address, VecDeque::new());
        Ok(LoopbackSocket {
            address,
            state: Arc::clone(&self.state),
        })
    }

    /// A [`Network`] for the node with the given IP.
    #[must_use]
    pub fn network(&self, ip: IpAddr) -> LoopbackNetwork {
        LoopbackNetwork {
            hub: self.clone(),
            ip,
        }
    }

    /// Datagrams sent but not yet received, across all sockets.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().inboxes.values().map(VecDeque::len).sum()
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A socket bound on a [`LoopbackHub`]. Unbinds on drop.
#[derive(Debug)]
pub struct LoopbackSocket {
    address: SocketAddr,
    state: Arc<Mutex<HubState>>,
}

impl DatagramSocket for LoopbackSocket {
    fn send_to(&mut self, data: &[u8], to: SocketAddr) -> io::Result<()> {
        // Like UDP, datagrams to nobody vanish.
        if let Some(inbox) = self.state.lock().inboxes.get_mut(&to) {
            inbox.push_back((self.address, data.to_vec()));
        }
        Ok(())
    }

    fn recv_from(&mut self, buffer: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let mut state = self.state.lock();
        let Some((from, datagram)) = state
            .inboxes
            .get_mut(&self.address)
            .and_then(VecDeque::pop_front)
        else {
            return Ok(None);
        };
        let len = datagram.len().min(buffer.len());
        buffer[..len].copy_from_slice(&datagram[..len]);
        Ok(Some((len, from)))
    }

    fn local_addr(&self) -> SocketAddr {
        self.address
    }
}

impl Drop for LoopbackSocket {
    fn drop(&mut self) {
        self.state.lock().inboxes.remove(&self.address);
    }
}

/// One node's view of a [`LoopbackHub`].
#[derive(Clone, Debug)]
pub struct LoopbackNetwork {
    hub: LoopbackHub,
    ip: IpAddr,
}

impl Network for LoopbackNetwork {
    fn create_client(&mut self, now: Instant) -> TransportResult<Box<dyn Host>> {
        let socket = self.hub.bind(SocketAddr::new(self.ip, 0))?;
        Ok(Box::new(PeerHost::new(socket, 1, now)))
    }

    fn create_server(
        &mut self,
        port: u16,
        max_clients: usize,
        now: Instant,
    ) -> TransportResult<Box<dyn Host>> {
        let socket = self.hub.bind(SocketAddr::new(self.ip, port))?;
        Ok(Box::new(PeerHost::new(socket, max_clients, now)))
    }

    fn resolve(&self, address: &str, default_port: u16) -> TransportResult<SocketAddr> {
        let (host, port) = split_host_port(address, default_port);
        let ip = if host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            host.parse()
                .map_err(|_| TransportError::Resolve(address.to_owned()))?
        };
        Ok(SocketAddr::new(ip, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datagrams_delivered_in_order() {
        let hub = LoopbackHub::new();
        let mut a = hub.bind("10.0.0.1:1000".parse().unwrap()).unwrap();
        let mut b = hub.bind("10.0.0.2:2000".parse().unwrap()).unwrap();

        a.send_to(b"first", b.local_addr()).unwrap();
        a.send_to(b"second", b.local_addr()).unwrap();
        assert_eq!(hub.in_flight(), 2);

        let mut buffer = [0u8; 64];
        let (len, from) = b.recv_from(&mut buffer).unwrap().unwrap();
        assert_eq!(&buffer[..len], b"first");
        assert_eq!(from, a.local_addr());
        let (len, _) = b.recv_from(&mut buffer).unwrap().unwrap();
        assert_eq!(&buffer[..len], b"second");
        assert!(b.recv_from(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_bind_conflict_and_release() {
        let hub = LoopbackHub::new();
        let address: SocketAddr = "10.0.0.1:7777".parse().unwrap();
        let socket = hub.bind(address).unwrap();
        assert!(matches!(hub.bind(address), Err(TransportError::Bind { .. })));

        drop(socket);
        assert!(hub.bind(address).is_ok());
    }

    #[test]
    fn test_ephemeral_ports_are_distinct() {
        let hub = LoopbackHub::new();
        let a = hub.bind("10.0.0.1:0".parse().unwrap()).unwrap();
        let b = hub.bind("10.0.0.1:0".parse().unwrap()).unwrap();
        assert_ne!(a.local_addr(), b.local_addr());
        assert_ne!(a.local_addr().port(), 0);
    }

    #[test]
    fn test_send_to_nobody_is_silent() {
        let hub = LoopbackHub::new();
        let mut a = hub.bind("10.0.0.1:1000".parse().unwrap()).unwrap();
        assert!(a.send_to(b"void", "10.9.9.9:1".parse().unwrap()).is_ok());
        assert_eq!(hub.in_flight(), 0);
    }

    #[test]
    fn test_resolve() {
        let hub = LoopbackHub::new();
        let network = hub.network(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));

        assert_eq!(
            network.resolve("localhost", 7777).unwrap(),
            "127.0.0.1:7777".parse().unwrap()
        );
        assert_eq!(
            network.resolve("10.0.0.1:9000", 7777).unwrap(),
            "10.0.0.1:9000".parse().unwrap()
        );
        assert!(matches!(
            network.resolve("no.such.host", 7777),
            Err(TransportError::Resolve(_))
        ));
    }
}
