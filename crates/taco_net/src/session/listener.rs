//! Application callbacks.
//!
//! Every method has a default, so an application overrides only the slots it
//! cares about. All callbacks run synchronously inside
//! [`crate::Session::update`] (or the operation that triggered them).

use crate::registry::PeerId;

/// Receives session events and supplies handshake extensions.
pub trait SessionListener: Send {
    /// The local server started listening.
    fn on_local_server_started(&mut self) {}

    /// The local server stopped.
    fn on_local_server_stopped(&mut self) {}

    /// The client completed the handshake.
    fn on_client_connected_to_server(&mut self) {}

    /// The client lost a connection that had completed the handshake.
    fn on_client_disconnected_from_server(&mut self) {}

    /// Extension bytes appended to the client's `ClientInfo`.
    fn client_info_extension(&mut self) -> Option<Vec<u8>> {
        None
    }

    /// Extension bytes appended to the server's `ServerInfo`.
    fn server_info_extension(&mut self) -> Option<Vec<u8>> {
        None
    }

    /// Validates the server's handshake extension. Returning false makes the
    /// client disconnect.
    fn on_client_receive_server_info(&mut self, _extension: &[u8]) -> bool {
        true
    }

    /// Validates a client's handshake extension. Returning false schedules a
    /// kick.
    fn on_server_receive_client_info(&mut self, _peer: PeerId, _extension: &[u8]) -> bool {
        true
    }

    /// A relayed payload arrived at the client. `origin` is the sending
    /// peer, or [`PeerId::SERVER`]. Returns whether it was handled.
    fn on_client_receive_packet(&mut self, _origin: PeerId, _payload: &[u8]) -> bool {
        false
    }

    /// A payload addressed to the server arrived. Returns whether it was
    /// handled.
    fn on_server_receive_packet(&mut self, _peer: PeerId, _payload: &[u8]) -> bool {
        false
    }

    /// Decides whether a relay request from `peer` is forwarded to the other
    /// peers.
    fn on_server_relay_packet(&mut self, _peer: PeerId, _payload: &[u8]) -> bool {
        true
    }

    /// A peer completed its handshake (`connected == true`) or left.
    fn on_server_peer_changed(&mut self, _peer: PeerId, _name: &str, _connected: bool) {}

    /// A chat line was received or said locally.
    fn on_chat_message(&mut self, _username: &str, _message: &str) {}
}

/// A listener that accepts everything and ignores all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl SessionListener for NoopListener {}
