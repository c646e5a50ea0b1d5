//! # Session Controller
//!
//! The top-level state machine an application talks to. One [`Session`]
//! owns at most one client endpoint and at most one server endpoint; both
//! are driven by [`Session::update`], called once per application tick.
//!
//! ## Client States
//!
//! ```text
//!               connect()                 ServerInfo accepted
//! Disconnected ──────────> ConnectPending ───────────────────> Connected
//!      ^                    │ deadline passed                     │
//!      │                    │ or disconnect()                     │ disconnect()
//!      │                    v                                     v
//!      └──── transport Disconnect / deadline ──── DisconnectPending
//! ```
//!
//! A `connect()` while connected queues the target, disconnects, and
//! reconnects on the first tick after reaching `Disconnected`.
//!
//! ## Server
//!
//! Peers get an id on transport connect and announce their name with
//! `ClientInfo`. Every tick the registry is swept for silent peers and due
//! kicks. Chat is rebroadcast verbatim; relay requests are re-tagged with
//! the sender's id and forwarded to every other peer.

mod client;
mod listener;
mod server;
mod status;

pub use listener::{NoopListener, SessionListener};
pub use status::{PeerStatus, Role, SessionStatus};

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::command::Command;
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{encode_chat, encode_client_to_server, encode_relay};
use crate::registry::{PeerId, PeerRegistry};
use crate::transport::{Delivery, Host, Network, PeerHandle};
use crate::{PROTOCOL_VERSION, SYSTEM_USERNAME};

/// Interval of the `debug_network_time` log line.
const DEBUG_TIME_INTERVAL: Duration = Duration::from_millis(500);

/// Chat notice sent to a kicked peer.
const KICK_NOTICE: &str = "You were kicked from the server, better luck next time";

/// Client side of the session state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// No client endpoint.
    Disconnected,
    /// Waiting for the transport connect and the server's `ServerInfo`.
    ConnectPending {
        /// Give up after this instant.
        deadline: Instant,
    },
    /// Handshake complete.
    Connected,
    /// Graceful disconnect sent, waiting for the transport to confirm.
    DisconnectPending {
        /// Force the disconnect after this instant.
        deadline: Instant,
    },
}

struct ClientLink {
    host: Box<dyn Host>,
    peer: PeerHandle,
    state: ClientState,
    /// Set once `Connected` was reached; gates the disconnected callback.
    handshake_done: bool,
}

struct ServerLink {
    host: Box<dyn Host>,
    registry: PeerRegistry,
}

/// A network session: optional client role, optional server role.
pub struct Session {
    config: SessionConfig,
    network: Box<dyn Network>,
    clock: Box<dyn Clock>,
    listener: Box<dyn SessionListener>,
    client: Option<ClientLink>,
    server: Option<ServerLink>,
    reconnect_target: Option<String>,
    local_client_id: PeerId,
    server_address: Option<SocketAddr>,
    rng: StdRng,
    started: Instant,
    next_debug_time: Instant,
}

impl Session {
    /// Creates an idle session.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        network: Box<dyn Network>,
        clock: Box<dyn Clock>,
        listener: Box<dyn SessionListener>,
    ) -> Self {
        let started = clock.now();
        Self {
            config,
            network,
            clock,
            listener,
            client: None,
            server: None,
            reconnect_target: None,
            local_client_id: PeerId::SERVER,
            server_address: None,
            rng: StdRng::from_entropy(),
            started,
            next_debug_time: started,
        }
    }

    /// The active configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs one tick: polls both endpoints, sweeps peers, enforces client
    /// deadlines and starts a queued reconnect.
    pub fn update(&mut self) {
        let now = self.clock.now();

        if self.client.is_some() {
            self.service_client(now);
        } else if let Some(target) = self.reconnect_target.take() {
            self.connect(&target);
        }

        if self.server.is_some() {
            self.service_server(now);
            self.sweep_peers(now);
        }

        self.check_client_deadlines(now);
        self.log_debug_time(now);
    }

    /// Starts the local server on the configured port, restarting it if it
    /// is already running.
    pub fn host(&mut self) {
        if self.server.is_some() {
            self.host_stop();
        }

        let now = self.clock.now();
        info!("SERVER: Starting local server on port {}...", self.config.port);
        match self
            .network
            .create_server(self.config.port, self.config.max_clients, now)
        {
            Ok(host) => {
                info!("SERVER: Local server is up and running on {}.", host.local_addr());
                self.server = Some(ServerLink {
                    host,
                    registry: PeerRegistry::new(),
                });
                self.listener.on_local_server_started();
            }
            Err(err) => error!("SERVER: {}", SessionError::TransportInit(err)),
        }
    }

    /// Stops the local server, disconnecting every peer.
    pub fn host_stop(&mut self) {
        let Some(mut server) = self.server.take() else {
            info!("SERVER: Not running.");
            return;
        };

        for peer in server.registry.drain() {
            server.host.disconnect(peer.handle);
            self.listener
                .on_server_peer_changed(peer.id, &peer.name, false);
        }
        server.host.flush();

        self.listener.on_local_server_stopped();
        info!("SERVER: Stopped local server.");
    }

    /// Connects to `address` (`"host"` or `"host:port"`, empty means
    /// localhost).
    ///
    /// Ignored while a connect is already pending. While connected (or
    /// disconnecting), the target is queued and reached after the current
    /// connection is closed.
    pub fn connect(&mut self, address: &str) {
        let address = match address.trim() {
            "" => "localhost",
            trimmed => trimmed,
        };

        if let Some(client) = &self.client {
            if let ClientState::ConnectPending { .. } = client.state {
                info!(
                    "CLIENT: Already trying to connect, ignoring connect to \"{}\".",
                    address
                );
                return;
            }
            info!("CLIENT: Will connect to \"{}\" once disconnected.", address);
            self.reconnect_target = Some(address.to_owned());
            self.disconnect();
            return;
        }

        let now = self.clock.now();
        if let Err(err) = self.open_client(address, now) {
            error!("CLIENT: Couldn't connect to \"{}\": {}", address, err);
        }
    }

    /// Starts a graceful disconnect of the client.
    pub fn disconnect(&mut self) {
        let now = self.clock.now();
        let timeout = self.config.disconnect_timeout();
        let Some(client) = self.client.as_mut() else {
            info!("CLIENT: Not connected.");
            return;
        };
        if let ClientState::DisconnectPending { .. } = client.state {
            debug!("CLIENT: Already disconnecting.");
            return;
        }

        client.host.disconnect(client.peer);
        client.host.flush();
        client.state = ClientState::DisconnectPending {
            deadline: now + timeout,
        };
        info!(
            "CLIENT: Trying to gently disconnect... ({:.1} second(s) timeout)",
            timeout.as_secs_f64()
        );
    }

    /// Sends a chat line. A server-only session speaks as the admin to all
    /// peers; a client needs a completed handshake.
    pub fn say(&mut self, message: &str) {
        if message.is_empty() {
            return;
        }

        if self.client.is_none() {
            if self.server.is_some() {
                let admin = self.config.admin_name.clone();
                self.broadcast_chat(&admin, message);
                info!("{}: {}", admin, message);
                self.listener.on_chat_message(&admin, message);
            } else {
                info!("CLIENT: Not connected to any server.");
            }
            return;
        }
        let Some(client) = self.client.as_mut() else {
            return;
        };

        match client.state {
            ClientState::Connected => {}
            ClientState::ConnectPending { .. } => {
                info!("CLIENT: Please wait until you are connected to the server!");
                return;
            }
            ClientState::Disconnected | ClientState::DisconnectPending { .. } => {
                info!("CLIENT: Not connected to any server.");
                return;
            }
        }

        let packet = encode_chat(&self.config.name, message);
        client.host.send(client.peer, &packet, Delivery::Reliable);
        client.host.flush();

        // A local server already logged it.
        if self.server.is_none() {
            info!("{}: {}", self.config.name, message);
        }
        self.listener.on_chat_message(&self.config.name, message);
    }

    /// Kicks the first peer named `username`: a notice now, a graceful
    /// disconnect after one second, a forced reset after two.
    pub fn kick(&mut self, username: &str) {
        if username.is_empty() {
            return;
        }
        let now = self.clock.now();
        let Some(server) = self.server.as_mut() else {
            info!("SERVER: Not running.");
            return;
        };
        let Some((id, handle)) = server
            .registry
            .by_name(username)
            .map(|peer| (peer.id, peer.handle))
        else {
            info!("SERVER: Couldn't find user \"{}\"", username);
            return;
        };

        if server.registry.schedule_kick(id, now) {
            let notice = encode_chat(SYSTEM_USERNAME, KICK_NOTICE);
            server.host.send(handle, &notice, Delivery::Reliable);
            server.host.flush();
            info!("SERVER: Kicking {} ({}).", username, id);
        } else {
            debug!("SERVER: {} is already being kicked.", username);
        }
    }

    /// Sends a payload to every peer, tagged with [`PeerId::SERVER`].
    pub fn broadcast_from_server(&mut self, payload: &[u8], reliable: bool) {
        let Some(server) = self.server.as_mut() else {
            debug!("SERVER: Not running, broadcast dropped.");
            return;
        };
        let packet = encode_relay(PeerId::SERVER.0, payload);
        for peer in server.registry.iter() {
            server
                .host
                .send(peer.handle, &packet, Delivery::from_reliable(reliable));
        }
        server.host.flush();
    }

    /// Sends a payload to one peer, tagged with [`PeerId::SERVER`].
    pub fn send_to_peer(&mut self, payload: &[u8], peer: PeerId, reliable: bool) {
        if let Err(err) = self.try_send_to_peer(payload, peer, reliable) {
            warn!("SERVER: {}", err);
        }
    }

    fn try_send_to_peer(&mut self, payload: &[u8], peer: PeerId, reliable: bool) -> SessionResult<()> {
        let Some(server) = self.server.as_mut() else {
            debug!("SERVER: Not running, send to {} dropped.", peer);
            return Ok(());
        };
        let handle = server
            .registry
            .get(peer)
            .map(|peer| peer.handle)
            .ok_or(SessionError::PeerNotFound(peer))?;
        let packet = encode_relay(PeerId::SERVER.0, payload);
        server
            .host
            .send(handle, &packet, Delivery::from_reliable(reliable));
        server.host.flush();
        Ok(())
    }

    /// Sends a payload to the server application (not relayed).
    pub fn send_to_server(&mut self, payload: &[u8], reliable: bool) {
        self.send_from_client(&encode_client_to_server(payload), reliable);
    }

    /// Asks the server to relay a payload to every other peer.
    pub fn relay_to_peers(&mut self, payload: &[u8], reliable: bool) {
        self.send_from_client(&encode_relay(PeerId::SERVER.0, payload), reliable);
    }

    fn send_from_client(&mut self, packet: &[u8], reliable: bool) {
        match self.client.as_mut() {
            Some(client) if client.state == ClientState::Connected => {
                client
                    .host
                    .send(client.peer, packet, Delivery::from_reliable(reliable));
                client.host.flush();
            }
            _ => debug!("CLIENT: Not connected, packet dropped."),
        }
    }

    /// A snapshot of the session.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            protocol_version: PROTOCOL_VERSION,
            role: self.role(),
            listen_address: self.server.as_ref().map(|server| server.host.local_addr()),
            server_address: self.client.as_ref().and(self.server_address),
            ping: self.ping(),
            peers: self.peers(),
            server_stats: self.server.as_ref().map(|server| server.host.stats()),
        }
    }

    /// Logs the [`status`](Self::status) snapshot, as the `status` command does.
    pub fn log_status(&self) {
        info!("\n{}", self.status());
    }

    /// Round-trip time from the client to its server.
    #[must_use]
    pub fn ping(&self) -> Option<Duration> {
        self.client
            .as_ref()
            .and_then(|client| client.host.round_trip_time(client.peer))
    }

    /// Peers of the local server.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerStatus> {
        self.server.as_ref().map_or_else(Vec::new, |server| {
            server
                .registry
                .iter()
                .map(|peer| PeerStatus {
                    id: peer.id,
                    name: peer.name.clone(),
                    round_trip_time: server.host.round_trip_time(peer.handle),
                })
                .collect()
        })
    }

    /// True while a client endpoint exists (pending, connected or
    /// disconnecting).
    #[inline]
    #[must_use]
    pub fn is_client(&self) -> bool {
        self.client.is_some()
    }

    /// True while the local server runs.
    #[inline]
    #[must_use]
    pub fn is_server(&self) -> bool {
        self.server.is_some()
    }

    /// Current role.
    #[must_use]
    pub fn role(&self) -> Role {
        Role::from_flags(self.is_client(), self.is_server())
    }

    /// Current client state.
    #[must_use]
    pub fn client_state(&self) -> ClientState {
        self.client
            .as_ref()
            .map_or(ClientState::Disconnected, |client| client.state)
    }

    /// Id the server assigned to this client ([`PeerId::SERVER`] when not
    /// connected).
    #[inline]
    #[must_use]
    pub fn local_client_id(&self) -> PeerId {
        self.local_client_id
    }

    /// Last server address the client targeted.
    #[inline]
    #[must_use]
    pub fn server_address(&self) -> Option<SocketAddr> {
        self.server_address
    }

    /// Display name used for handshakes and chat.
    #[inline]
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.config.name
    }

    /// Changes the display name; takes effect on the next connect.
    pub fn set_display_name(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            info!("Name must not be empty.");
            return;
        }
        self.config.name = name.to_owned();
        info!("Name set to \"{}\".", name);
    }

    /// Disconnects the client and stops the server.
    pub fn shutdown(&mut self) {
        if self.client.is_some() {
            self.disconnect();
        }
        if self.server.is_some() {
            self.host_stop();
        }
    }

    /// Runs a console command.
    pub fn execute(&mut self, command: Command) {
        match command {
            Command::Host => self.host(),
            Command::Stop => self.host_stop(),
            Command::Status => self.log_status(),
            Command::Connect(address) => self.connect(&address),
            Command::Disconnect => self.disconnect(),
            Command::Say(message) => self.say(&message),
            Command::Kick(username) => self.kick(&username),
            Command::Name(name) => self.set_display_name(&name),
            Command::Quit => self.shutdown(),
        }
    }

    fn log_debug_time(&mut self, now: Instant) {
        if !self.config.debug_network_time || now < self.next_debug_time {
            return;
        }
        self.next_debug_time = now + DEBUG_TIME_INTERVAL;
        let elapsed = now.saturating_duration_since(self.started).as_millis();
        if self.client.is_some() {
            info!("client time = {}", elapsed);
        } else if self.server.is_some() {
            info!("server time = {}", elapsed);
        }
    }
}
