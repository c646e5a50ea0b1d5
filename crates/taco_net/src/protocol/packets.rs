//! # Packet Definitions
//!
//! Kind tags and the decoded form of every session packet.

/// Maximum number of UTF-16 units carried by a text field.
pub const MAX_TEXT_UNITS: usize = 254;

/// Width of a text slot on the wire, in UTF-16 units (zero padded).
pub const TEXT_SLOT_UNITS: usize = 255;

/// Size of the kind tag.
pub(crate) const TAG_SIZE: usize = 4;

/// Size of an encoded text slot in bytes.
pub(crate) const TEXT_SLOT_BYTES: usize = TEXT_SLOT_UNITS * 2;

/// Types of packets in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketKind {
    /// Client -> Server: handshake with version and display name.
    ClientInfo = 0,
    /// Server -> Client: handshake reply with the assigned id.
    ServerInfo = 1,
    /// Bidirectional: chat line.
    Chat = 2,
    /// Client -> Server: opaque payload for the server application.
    ClientToServer = 3,
    /// Client -> Server: relay request. Server -> Client: relayed payload.
    ClientBroadcastRelay = 4,
}

impl PacketKind {
    /// Maps a wire tag to a kind.
    #[must_use]
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::ClientInfo),
            1 => Some(Self::ServerInfo),
            2 => Some(Self::Chat),
            3 => Some(Self::ClientToServer),
            4 => Some(Self::ClientBroadcastRelay),
            _ => None,
        }
    }

    /// Wire tag of this kind.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Smallest valid encoding of this kind, tag included.
    #[must_use]
    pub const fn min_size(self) -> usize {
        TAG_SIZE
            + match self {
                Self::ClientInfo => 4 + 4 + TEXT_SLOT_BYTES + 1,
                Self::ServerInfo => 4 + 1,
                Self::Chat => 4 + 4 + TEXT_SLOT_BYTES * 2,
                Self::ClientToServer => 0,
                Self::ClientBroadcastRelay => 4,
            }
    }
}

/// A decoded session packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    /// Handshake sent by a client once the transport connects.
    ClientInfo {
        /// Protocol version of the client.
        version: u32,
        /// Display name (at most 254 UTF-16 units).
        name: String,
        /// Application extension, present when the flag was set.
        extension: Option<Vec<u8>>,
    },
    /// Handshake reply carrying the id the server assigned.
    ServerInfo {
        /// Assigned peer id.
        client_id: u32,
        /// Application extension, present when the flag was set.
        extension: Option<Vec<u8>>,
    },
    /// Chat line.
    Chat {
        /// Sender name.
        username: String,
        /// Message text.
        message: String,
    },
    /// Payload addressed to the server application.
    ClientToServer {
        /// Opaque application bytes.
        payload: Vec<u8>,
    },
    /// Payload relayed between clients by the server.
    ClientBroadcastRelay {
        /// Peer id of the original sender (0 when the server itself sent it).
        origin: u32,
        /// Opaque application bytes.
        payload: Vec<u8>,
    },
}

impl Packet {
    /// Kind of this packet.
    #[must_use]
    pub const fn kind(&self) -> PacketKind {
        match self {
            Self::ClientInfo { .. } => PacketKind::ClientInfo,
            Self::ServerInfo { .. } => PacketKind::ServerInfo,
            Self::Chat { .. } => PacketKind::Chat,
            Self::ClientToServer { .. } => PacketKind::ClientToServer,
            Self::ClientBroadcastRelay { .. } => PacketKind::ClientBroadcastRelay,
        }
    }
}
