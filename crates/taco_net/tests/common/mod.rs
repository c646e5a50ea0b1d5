//! Shared harness for the session integration tests: loopback nodes on one
//! hub, a shared manual clock and a listener that records every callback.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use taco_net::transport::loopback::LoopbackHub;
use taco_net::{ManualClock, PeerId, Session, SessionConfig, SessionListener};

/// Tick used by [`Harness::pump`]; small enough that pings keep live peers
/// fresh and deadlines land within one step.
pub const STEP: Duration = Duration::from_millis(50);

/// One recorded callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenerEvent {
    ServerStarted,
    ServerStopped,
    Connected,
    Disconnected,
    PeerChanged {
        id: PeerId,
        name: String,
        connected: bool,
    },
    Chat {
        username: String,
        message: String,
    },
    ClientPacket {
        origin: PeerId,
        payload: Vec<u8>,
    },
    ServerPacket {
        peer: PeerId,
        payload: Vec<u8>,
    },
    RelayRequest {
        peer: PeerId,
        payload: Vec<u8>,
    },
    ClientInfoExtension {
        peer: PeerId,
        extension: Vec<u8>,
    },
    ServerInfoExtension(Vec<u8>),
}

/// Test handle onto a [`RecordingListener`]'s log.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<ListenerEvent>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn count(&self, wanted: &ListenerEvent) -> usize {
        self.events.lock().iter().filter(|event| *event == wanted).count()
    }

    pub fn contains(&self, wanted: &ListenerEvent) -> bool {
        self.count(wanted) > 0
    }

    pub fn chats(&self) -> Vec<(String, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ListenerEvent::Chat { username, message } => Some((username.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn peer_changes(&self) -> Vec<(PeerId, String, bool)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ListenerEvent::PeerChanged { id, name, connected } => Some((*id, name.clone(), *connected)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ListenerEvent) {
        self.events.lock().push(event);
    }
}

/// Records every callback and answers handshakes as configured.
#[derive(Debug)]
pub struct RecordingListener {
    recorder: Recorder,
    pub client_extension: Option<Vec<u8>>,
    pub server_extension: Option<Vec<u8>>,
    pub accept_server_info: bool,
    pub accept_client_info: bool,
    pub accept_relays: bool,
}

impl RecordingListener {
    pub fn new() -> (Self, Recorder) {
        let recorder = Recorder::default();
        (
            Self {
                recorder: recorder.clone(),
                client_extension: None,
                server_extension: None,
                accept_server_info: true,
                accept_client_info: true,
                accept_relays: true,
            },
            recorder,
        )
    }
}

impl SessionListener for RecordingListener {
    fn on_local_server_started(&mut self) {
        self.recorder.push(ListenerEvent::ServerStarted);
    }

    fn on_local_server_stopped(&mut self) {
        self.recorder.push(ListenerEvent::ServerStopped);
    }

    fn on_client_connected_to_server(&mut self) {
        self.recorder.push(ListenerEvent::Connected);
    }

    fn on_client_disconnected_from_server(&mut self) {
        self.recorder.push(ListenerEvent::Disconnected);
    }

    fn client_info_extension(&mut self) -> Option<Vec<u8>> {
        self.client_extension.clone()
    }

    fn server_info_extension(&mut self) -> Option<Vec<u8>> {
        self.server_extension.clone()
    }

    fn on_client_receive_server_info(&mut self, extension: &[u8]) -> bool {
        self.recorder
            .push(ListenerEvent::ServerInfoExtension(extension.to_vec()));
        self.accept_server_info
    }

    fn on_server_receive_client_info(&mut self, peer: PeerId, extension: &[u8]) -> bool {
        self.recorder.push(ListenerEvent::ClientInfoExtension {
            peer,
            extension: extension.to_vec(),
        });
        self.accept_client_info
    }

    fn on_client_receive_packet(&mut self, origin: PeerId, payload: &[u8]) -> bool {
        self.recorder.push(ListenerEvent::ClientPacket {
            origin,
            payload: payload.to_vec(),
        });
        true
    }

    fn on_server_receive_packet(&mut self, peer: PeerId, payload: &[u8]) -> bool {
        self.recorder.push(ListenerEvent::ServerPacket {
            peer,
            payload: payload.to_vec(),
        });
        true
    }

    fn on_server_relay_packet(&mut self, peer: PeerId, payload: &[u8]) -> bool {
        self.recorder.push(ListenerEvent::RelayRequest {
            peer,
            payload: payload.to_vec(),
        });
        self.accept_relays
    }

    fn on_server_peer_changed(&mut self, peer: PeerId, name: &str, connected: bool) {
        self.recorder.push(ListenerEvent::PeerChanged {
            id: peer,
            name: name.to_owned(),
            connected,
        });
    }

    fn on_chat_message(&mut self, username: &str, message: &str) {
        self.recorder.push(ListenerEvent::Chat {
            username: username.to_owned(),
            message: message.to_owned(),
        });
    }
}

/// A session under test plus its callback log.
pub struct Node {
    pub session: Session,
    pub recorder: Recorder,
}

/// A loopback hub and the clock every node shares.
pub struct Harness {
    pub hub: LoopbackHub,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            hub: LoopbackHub::new(),
            clock: ManualClock::new(),
        }
    }

    /// A node at `10.0.0.<host>` with a default recording listener.
    pub fn node(&self, host: u8, name: &str) -> Node {
        let (listener, recorder) = RecordingListener::new();
        self.node_with(host, name, listener, recorder)
    }

    pub fn node_with(&self, host: u8, name: &str, listener: RecordingListener, recorder: Recorder) -> Node {
        let config = SessionConfig {
            name: name.to_owned(),
            ..SessionConfig::default()
        };
        self.node_at(ip(host), config, listener, recorder)
    }

    pub fn node_at(&self, ip: IpAddr, config: SessionConfig, listener: RecordingListener, recorder: Recorder) -> Node {
        Node {
            session: Session::new(
                config,
                Box::new(self.hub.network(ip)),
                Box::new(self.clock.clone()),
                Box::new(listener),
            ),
            recorder,
        }
    }

    /// Advances time in [`STEP`]s for `duration`, ticking every node after
    /// each step.
    pub fn pump(&self, nodes: &mut [&mut Node], duration: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < duration {
            self.clock.advance(STEP);
            elapsed += STEP;
            for node in nodes.iter_mut() {
                node.session.update();
            }
        }
    }

    /// Ticks until `done` holds or `limit` elapses; returns the time taken.
    pub fn pump_until<F>(&self, nodes: &mut [&mut Node], limit: Duration, mut done: F) -> Option<Duration>
    where
        F: FnMut(&[&mut Node]) -> bool,
    {
        let mut elapsed = Duration::ZERO;
        while elapsed < limit {
            self.clock.advance(STEP);
            elapsed += STEP;
            for node in nodes.iter_mut() {
                node.session.update();
            }
            if done(nodes) {
                return Some(elapsed);
            }
        }
        None
    }
}

pub fn ip(host: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, host))
}

/// Address string of the server node at `10.0.0.<host>`.
pub fn server_address(host: u8) -> String {
    ip(host).to_string()
}

/// Hosts on `server`, connects every client and ticks until all handshakes
/// complete.
pub fn start_and_join(harness: &Harness, server: &mut Node, clients: &mut [&mut Node], server_host: u8) {
    server.session.host();
    assert!(server.session.is_server());
    for client in clients.iter_mut() {
        client.session.connect(&server_address(server_host));
    }

    let expected = clients.len();
    let mut nodes: Vec<&mut Node> = Vec::with_capacity(expected + 1);
    nodes.push(server);
    for client in clients.iter_mut() {
        nodes.push(&mut **client);
    }
    let joined = harness.pump_until(&mut nodes, Duration::from_secs(2), |nodes| {
        nodes[0]
            .recorder
            .peer_changes()
            .iter()
            .filter(|(_, _, connected)| *connected)
            .count()
            == expected
            && nodes[1..]
                .iter()
                .all(|node| node.recorder.contains(&ListenerEvent::Connected))
    });
    assert!(joined.is_some(), "clients did not join in time");
}
