//! # Session Protocol
//!
//! Binary packets exchanged by sessions once the transport has connected.
//!
//! ## Packet Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Kind tag (u32, little-endian)                                │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Fixed body (layout per kind)                                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Trailer: extension bytes / opaque payload (optional)         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Kind                     | Fixed body                                         |
//! |--------------------------|----------------------------------------------------|
//! | `ClientInfo` (0)         | version u32, len u32, name [u16; 255], ext u8      |
//! | `ServerInfo` (1)         | id u32, ext u8                                     |
//! | `Chat` (2)               | ulen u32, mlen u32, user [u16; 255], msg [u16; 255] |
//! | `ClientToServer` (3)     | (none)                                             |
//! | `ClientBroadcastRelay` (4) | origin u32                                       |
//!
//! ## Text Policy
//!
//! Text is UTF-16 in a fixed 255-unit slot. At most 254 units are used;
//! longer strings are truncated (never rejected) at a character boundary,
//! so truncation is idempotent.

mod codec;
mod packets;

pub use codec::{
    decode, encode_chat, encode_client_info, encode_client_to_server, encode_relay,
    encode_server_info, truncate_text, PacketReader, PacketWriter,
};
pub use packets::{Packet, PacketKind, MAX_TEXT_UNITS, TEXT_SLOT_UNITS};
