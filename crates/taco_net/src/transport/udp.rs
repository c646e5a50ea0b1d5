//! # UDP Transport
//!
//! Non-blocking `std` UDP sockets under a [`PeerHost`].

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Instant;

use super::host::PeerHost;
use super::{split_host_port, DatagramSocket, Host, Network};
use crate::error::{TransportError, TransportResult};

/// UDP socket wrapper in non-blocking mode.
#[derive(Debug)]
pub struct UdpDatagrams {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpDatagrams {
    /// Creates a socket bound to the specified address.
    ///
    /// # Errors
    ///
    /// [`TransportError::Bind`] if the address can't be bound.
    pub fn bind(address: SocketAddr) -> TransportResult<Self> {
        let bind_error = |source| TransportError::Bind { address, source };
        let socket = UdpSocket::bind(address).map_err(bind_error)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;
        Ok(Self { socket, local_addr })
    }
}

impl DatagramSocket for UdpDatagrams {
    fn send_to(&mut self, data: &[u8], to: SocketAddr) -> io::Result<()> {
        self.socket.send_to(data, to).map(|_| ())
    }

    fn recv_from(&mut self, buffer: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buffer) {
            Ok(received) => Ok(Some(received)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            // ICMP port unreachable surfaces here on some platforms.
            Err(err) if err.kind() == io::ErrorKind::ConnectionReset => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// [`Network`] over real UDP sockets.
#[derive(Clone, Copy, Debug)]
pub struct UdpNetwork {
    bind_ip: IpAddr,
}

impl UdpNetwork {
    /// Binds endpoints on all IPv4 interfaces.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    /// Binds endpoints on one interface.
    #[must_use]
    pub const fn with_bind_ip(bind_ip: IpAddr) -> Self {
        Self { bind_ip }
    }
}

impl Default for UdpNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl Network for UdpNetwork {
    fn create_client(&mut self, now: Instant) -> TransportResult<Box<dyn Host>> {
        let socket = UdpDatagrams::bind(SocketAddr::new(self.bind_ip, 0))?;
        Ok(Box::new(PeerHost::new(socket, 1, now)))
    }

    fn create_server(
        &mut self,
        port: u16,
        max_clients: usize,
        now: Instant,
    ) -> TransportResult<Box<dyn Host>> {
        let socket = UdpDatagrams::bind(SocketAddr::new(self.bind_ip, port))?;
        Ok(Box::new(PeerHost::new(socket, max_clients, now)))
    }

    fn resolve(&self, address: &str, default_port: u16) -> TransportResult<SocketAddr> {
        let (host, port) = split_host_port(address, default_port);
        let resolve_error = || TransportError::Resolve(address.to_owned());
        let candidates: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|_| resolve_error())?
            .collect();
        candidates
            .iter()
            .find(|candidate| candidate.is_ipv4())
            .or_else(|| candidates.first())
            .copied()
            .ok_or_else(resolve_error)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::{Delivery, HostEvent};

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    fn poll_until<F>(hosts: &mut [&mut dyn Host], mut done: F) -> Vec<HostEvent>
    where
        F: FnMut(&[HostEvent]) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            for host in hosts.iter_mut() {
                while let Some(event) = host.service(Instant::now()) {
                    events.push(event);
                }
            }
            if done(&events) {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        events
    }

    #[test]
    fn test_udp_connect_and_exchange() {
        let now = Instant::now();
        let mut server = PeerHost::new(UdpDatagrams::bind(localhost()).unwrap(), 4, now);
        let mut client = PeerHost::new(UdpDatagrams::bind(localhost()).unwrap(), 1, now);

        let remote = client.connect(server.local_addr(), now).unwrap();
        client.flush();

        let mut hosts: [&mut dyn Host; 2] = [&mut server, &mut client];
        let events = poll_until(&mut hosts, |events| {
            events
                .iter()
                .filter(|event| matches!(event, HostEvent::Connect(_)))
                .count()
                == 2
        });
        assert_eq!(
            events
                .iter()
                .filter(|event| matches!(event, HostEvent::Connect(_)))
                .count(),
            2
        );

        client.send(remote, b"over udp", Delivery::Reliable);
        client.flush();
        let mut hosts: [&mut dyn Host; 2] = [&mut server, &mut client];
        let events = poll_until(&mut hosts, |events| {
            events
                .iter()
                .any(|event| matches!(event, HostEvent::Receive { .. }))
        });
        assert!(events.iter().any(|event| matches!(
            event,
            HostEvent::Receive { data, delivery: Delivery::Reliable, .. } if data == b"over udp"
        )));
    }

    #[test]
    fn test_bind_conflict() {
        let first = UdpDatagrams::bind(localhost()).unwrap();
        let taken = first.local_addr();
        assert!(matches!(
            UdpDatagrams::bind(taken),
            Err(TransportError::Bind { .. })
        ));
    }

    #[test]
    fn test_resolve_numeric() {
        let network = UdpNetwork::new();
        assert_eq!(
            network.resolve("127.0.0.1", 7777).unwrap(),
            "127.0.0.1:7777".parse().unwrap()
        );
        assert_eq!(
            network.resolve("127.0.0.1:9000", 7777).unwrap(),
            "127.0.0.1:9000".parse().unwrap()
        );
    }
}
