//! Client half of the session: handshake, deadlines and incoming packets.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::{ClientLink, ClientState, Session};
use crate::error::{SessionError, SessionResult};
use crate::protocol::{decode, encode_client_info, Packet};
use crate::registry::PeerId;
use crate::transport::{Delivery, HostEvent};
use crate::PROTOCOL_VERSION;

impl Session {
    /// Resolves `address`, opens a client endpoint and starts connecting.
    pub(super) fn open_client(&mut self, address: &str, now: Instant) -> SessionResult<()> {
        let target = self.network.resolve(address, self.config.port)?;
        let mut host = self.network.create_client(now)?;
        let peer = host.connect(target, now)?;
        host.flush();

        let timeout = self.config.connect_timeout();
        self.client = Some(ClientLink {
            host,
            peer,
            state: ClientState::ConnectPending {
                deadline: now + timeout,
            },
            handshake_done: false,
        });
        self.server_address = Some(target);
        info!(
            "CLIENT: Trying to connect to \"{}\" ({})... ({:.1} second(s) timeout)",
            address,
            target,
            timeout.as_secs_f64()
        );
        Ok(())
    }

    pub(super) fn service_client(&mut self, now: Instant) {
        loop {
            let Some(client) = self.client.as_mut() else {
                return;
            };
            let Some(event) = client.host.service(now) else {
                return;
            };
            self.on_client_event(event);
        }
    }

    fn on_client_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Connect(_) => self.send_client_info(),
            HostEvent::Receive { data, .. } => {
                if self.config.debug_network {
                    info!("CLIENT: A packet of length {} was received.", data.len());
                }
                let result = decode(&data)
                    .map_err(SessionError::from)
                    .and_then(|packet| self.on_client_packet(packet));
                match result {
                    Ok(()) => {}
                    Err(err @ SessionError::Decode(_)) => debug!("CLIENT: Dropped packet: {}", err),
                    Err(err) => warn!("CLIENT: {}", err),
                }
            }
            HostEvent::Disconnect(_) => {
                let reason = match self.client_state() {
                    ClientState::ConnectPending { .. } => "connection refused",
                    ClientState::DisconnectPending { .. } => "disconnected",
                    ClientState::Connected | ClientState::Disconnected => "server disconnected",
                };
                info!("CLIENT: Disconnected from server ({}).", reason);
                self.finalize_client();
            }
        }
    }

    fn send_client_info(&mut self) {
        let extension = self.listener.client_info_extension();
        let packet = encode_client_info(PROTOCOL_VERSION, &self.config.name, extension.as_deref());
        let Some(client) = self.client.as_mut() else {
            return;
        };
        info!("CLIENT: Connected, sending client info...");
        client.host.send(client.peer, &packet, Delivery::Reliable);
        client.host.flush();
    }

    fn on_client_packet(&mut self, packet: Packet) -> SessionResult<()> {
        match packet {
            Packet::ServerInfo { client_id, extension } => {
                if !matches!(self.client_state(), ClientState::ConnectPending { .. }) {
                    debug!("CLIENT: Ignoring server info outside of a pending connect.");
                    return Ok(());
                }
                self.local_client_id = PeerId(client_id);
                info!("CLIENT: Received server info, our id is {}.", client_id);

                let accepted = extension.map_or(true, |extension| {
                    self.listener.on_client_receive_server_info(&extension)
                });
                if !accepted {
                    self.disconnect();
                    return Err(SessionError::ExtensionRejected);
                }

                if let Some(client) = self.client.as_mut() {
                    client.state = ClientState::Connected;
                    client.handshake_done = true;
                }
                self.listener.on_client_connected_to_server();
            }
            Packet::Chat { username, message } => {
                if self.server.is_none() {
                    info!("{}: {}", username, message);
                }
                self.listener.on_chat_message(&username, &message);
            }
            Packet::ClientBroadcastRelay { origin, payload } => {
                if !self
                    .listener
                    .on_client_receive_packet(PeerId(origin), &payload)
                {
                    debug!("CLIENT: Unhandled packet relayed from {}.", origin);
                }
            }
            other => debug!("CLIENT: Ignoring unexpected {:?} packet.", other.kind()),
        }
        Ok(())
    }

    /// Finalizes a client whose connect or disconnect deadline passed.
    pub(super) fn check_client_deadlines(&mut self, now: Instant) {
        let expired = match self.client_state() {
            ClientState::ConnectPending { deadline } if now > deadline => {
                Some("Connection attempt timed out.")
            }
            ClientState::DisconnectPending { deadline } if now > deadline => {
                Some("Server did not confirm the disconnect, forcing it.")
            }
            _ => None,
        };
        if let Some(reason) = expired {
            info!("CLIENT: {}", reason);
            self.finalize_client();
        }
    }

    /// Drops the client endpoint.
    pub(super) fn finalize_client(&mut self) {
        let Some(mut client) = self.client.take() else {
            return;
        };
        client.host.reset(client.peer);
        self.local_client_id = PeerId::SERVER;
        if client.handshake_done {
            self.listener.on_client_disconnected_from_server();
        }
    }
}
