//! Server half of the session: peer lifecycle, chat and relays.

use std::time::Instant;

use rand::Rng;
use tracing::{debug, info, warn};

use super::{ServerLink, Session};
use crate::error::{SessionError, SessionResult};
use crate::protocol::{decode, encode_chat, encode_relay, encode_server_info, Packet};
use crate::registry::{PeerId, SweepAction};
use crate::transport::{Delivery, HostEvent, PeerHandle};
use crate::{PROTOCOL_TIMEOUT, PROTOCOL_VERSION, ROLL_TRIGGER, SYSTEM_USERNAME};

impl Session {
    pub(super) fn service_server(&mut self, now: Instant) {
        loop {
            let Some(server) = self.server.as_mut() else {
                return;
            };
            let Some(event) = server.host.service(now) else {
                return;
            };
            self.on_server_event(event, now);
        }
    }

    fn on_server_event(&mut self, event: HostEvent, now: Instant) {
        match event {
            HostEvent::Connect(handle) => {
                let extension = self.listener.server_info_extension();
                let Some(server) = self.server.as_mut() else {
                    return;
                };
                let id = server.registry.add(handle);
                info!("SERVER: A new client connected ({}, {}).", id, handle);

                let packet = encode_server_info(id.0, extension.as_deref());
                server.host.send(handle, &packet, Delivery::Reliable);
                server.host.flush();
            }
            HostEvent::Receive {
                peer: handle,
                data,
                delivery,
            } => {
                if self.config.debug_network {
                    info!("SERVER: A packet of length {} was received from {}.", data.len(), handle);
                }
                let Some(id) = self
                    .server
                    .as_ref()
                    .and_then(|server| server.registry.by_handle(handle))
                    .map(|peer| peer.id)
                else {
                    debug!("SERVER: Packet from unregistered peer {}.", handle);
                    return;
                };

                let result = decode(&data)
                    .map_err(SessionError::from)
                    .and_then(|packet| self.on_server_packet(id, handle, packet, &data, delivery, now));
                match result {
                    Ok(()) => {}
                    Err(err @ SessionError::Decode(_)) => {
                        debug!("SERVER: Dropped packet from {}: {}", id, err);
                    }
                    Err(err) => warn!("SERVER: Peer {}: {}", id, err),
                }
            }
            HostEvent::Disconnect(handle) => {
                let Some(server) = self.server.as_mut() else {
                    return;
                };
                match server.registry.remove_by_handle(handle) {
                    Some(peer) => {
                        info!("SERVER: {} disconnected.", peer.name);
                        self.listener
                            .on_server_peer_changed(peer.id, &peer.name, false);
                    }
                    None => debug!("SERVER: Unregistered peer {} disconnected.", handle),
                }
            }
        }
    }

    fn on_server_packet(
        &mut self,
        id: PeerId,
        handle: PeerHandle,
        packet: Packet,
        raw: &[u8],
        delivery: Delivery,
        now: Instant,
    ) -> SessionResult<()> {
        match packet {
            Packet::ClientInfo {
                version,
                name,
                extension,
            } => return self.on_client_info(id, handle, version, name, extension.as_deref(), now),
            Packet::Chat { message, .. } => self.on_chat(id, &message, raw),
            Packet::ClientToServer { payload } => {
                if !self.listener.on_server_receive_packet(id, &payload) {
                    debug!("SERVER: Unhandled packet from {}.", id);
                }
            }
            Packet::ClientBroadcastRelay { payload, .. } => {
                self.relay(id, handle, &payload, delivery);
            }
            Packet::ServerInfo { .. } => debug!("SERVER: Ignoring server info from {}.", id),
        }
        Ok(())
    }

    fn on_client_info(
        &mut self,
        id: PeerId,
        handle: PeerHandle,
        version: u32,
        name: String,
        extension: Option<&[u8]>,
        now: Instant,
    ) -> SessionResult<()> {
        let Some(server) = self.server.as_mut() else {
            return Ok(());
        };
        let Some(peer) = server.registry.get_mut(id) else {
            return Ok(());
        };
        if peer.announced {
            debug!("SERVER: Ignoring repeated client info from {}.", id);
            return Ok(());
        }
        peer.announced = true;
        peer.name.clone_from(&name);

        if version != PROTOCOL_VERSION {
            let notice = format!(
                "Version mismatch: Server is running version {PROTOCOL_VERSION}, but you are running version {version}!"
            );
            server
                .host
                .send(handle, &encode_chat(SYSTEM_USERNAME, &notice), Delivery::Reliable);
            server.host.flush();
            server.registry.schedule_kick(id, now);
            return Err(SessionError::VersionMismatch {
                server: PROTOCOL_VERSION,
                client: version,
            });
        }

        let accepted = extension.map_or(true, |extension| {
            self.listener.on_server_receive_client_info(id, extension)
        });
        if !accepted {
            server.registry.schedule_kick(id, now);
            return Err(SessionError::ExtensionRejected);
        }

        info!("SERVER: {} joined ({}).", name, id);
        self.listener.on_server_peer_changed(id, &name, true);
        Ok(())
    }

    /// Rebroadcasts a chat line verbatim and answers the roll trigger.
    fn on_chat(&mut self, id: PeerId, message: &str, raw: &[u8]) {
        let Some(server) = self.server.as_mut() else {
            return;
        };
        let username = server
            .registry
            .get(id)
            .map(|peer| peer.name.clone())
            .unwrap_or_default();
        for peer in server.registry.iter().filter(|peer| peer.id != id) {
            server.host.send(peer.handle, raw, Delivery::Reliable);
        }
        server.host.flush();
        self.on_server_chat(&username, message);

        if message.contains(ROLL_TRIGGER) {
            let points: u32 = self.rng.gen_range(0..=100);
            let roll = format!("{username} rolls {points} point(s)");
            self.broadcast_chat(SYSTEM_USERNAME, &roll);
            self.on_server_chat(SYSTEM_USERNAME, &roll);
        }
    }

    /// Logs a chat line seen by the server. A local client reports it
    /// through its own copy instead.
    fn on_server_chat(&mut self, username: &str, message: &str) {
        info!("{}: {}", username, message);
        if self.client.is_none() {
            self.listener.on_chat_message(username, message);
        }
    }

    /// Sends a chat line to every peer.
    pub(super) fn broadcast_chat(&mut self, username: &str, message: &str) {
        let Some(server) = self.server.as_mut() else {
            return;
        };
        let packet = encode_chat(username, message);
        for peer in server.registry.iter() {
            server.host.send(peer.handle, &packet, Delivery::Reliable);
        }
        server.host.flush();
    }

    fn relay(&mut self, id: PeerId, from: PeerHandle, payload: &[u8], delivery: Delivery) {
        if !self.listener.on_server_relay_packet(id, payload) {
            debug!("SERVER: Relay from {} rejected.", id);
            return;
        }
        let Some(server) = self.server.as_mut() else {
            return;
        };
        let packet = encode_relay(id.0, payload);
        for peer in server.registry.iter().filter(|peer| peer.handle != from) {
            server.host.send(peer.handle, &packet, delivery);
        }
        server.host.flush();
    }

    /// Applies timeouts and kick deadlines.
    pub(super) fn sweep_peers(&mut self, now: Instant) {
        let Some(server) = self.server.as_mut() else {
            return;
        };
        let ServerLink { host, registry } = server;
        let actions = registry.sweep(now, PROTOCOL_TIMEOUT, |handle| host.last_receive_time(handle));

        for action in actions {
            match action {
                SweepAction::TimedOut(peer) => {
                    info!("SERVER: {} timed out.", peer.name);
                    host.reset(peer.handle);
                    self.listener
                        .on_server_peer_changed(peer.id, &peer.name, false);
                }
                SweepAction::Kick { handle, name, .. } => {
                    info!("SERVER: {} kicked.", name);
                    host.disconnect(handle);
                }
                SweepAction::Forced(peer) => {
                    info!("SERVER: {} forcefully disconnected.", peer.name);
                    host.reset(peer.handle);
                    self.listener
                        .on_server_peer_changed(peer.id, &peer.name, false);
                }
            }
        }
        host.flush();
    }
}
