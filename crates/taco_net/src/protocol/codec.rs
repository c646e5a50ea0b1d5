//! # Packet Serialization
//!
//! Explicit little-endian encoding of every packet kind. Nothing relies on
//! struct layout; each field is written and read in order.

use super::packets::{Packet, PacketKind, MAX_TEXT_UNITS, TAG_SIZE, TEXT_SLOT_UNITS};
use crate::error::DecodeError;

/// Packet writer - appends little-endian fields to a growable buffer.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buffer: Vec<u8>,
}

impl PacketWriter {
    /// Creates a writer whose first field is the kind tag.
    #[must_use]
    pub fn new(kind: PacketKind) -> Self {
        let mut writer = Self {
            buffer: Vec::with_capacity(kind.min_size()),
        };
        writer.write_u32(kind.tag());
        writer
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a text slot: the used units followed by zero padding.
    ///
    /// `units` must already be truncated to [`MAX_TEXT_UNITS`].
    pub fn write_text_slot(&mut self, units: &[u16]) {
        debug_assert!(units.len() <= MAX_TEXT_UNITS);
        for &unit in units {
            self.write_u16(unit);
        }
        for _ in units.len()..TEXT_SLOT_UNITS {
            self.write_u16(0);
        }
    }

    /// Writes an extension flag and, if present, the extension bytes.
    pub fn write_extension(&mut self, extension: Option<&[u8]>) {
        match extension {
            Some(bytes) => {
                self.write_u8(1);
                self.write_bytes(bytes);
            }
            None => self.write_u8(0),
        }
    }

    /// Consumes the writer and returns the encoded packet.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

/// Packet reader - reads little-endian fields from a buffer.
pub struct PacketReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketReader<'a> {
    /// Creates a new reader over a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    fn take(&mut self, count: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(count)?;
        let slice = self.buffer.get(self.position..end)?;
        self.position = end;
        Some(slice)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Option<u8> {
        self.take(1).map(|bytes| bytes[0])
    }

    /// Reads a u16 in little-endian format.
    #[inline]
    pub fn read_u16(&mut self) -> Option<u16> {
        self.take(2).map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> Option<u32> {
        self.take(4)
            .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a text slot holding `declared` units.
    ///
    /// A declared length above [`MAX_TEXT_UNITS`] is clamped, and invalid
    /// UTF-16 is replaced rather than rejected.
    pub fn read_text_slot(&mut self, declared: u32) -> Option<String> {
        let used = usize::try_from(declared).map_or(MAX_TEXT_UNITS, |n| n.min(MAX_TEXT_UNITS));
        let mut units = Vec::with_capacity(used);
        for index in 0..TEXT_SLOT_UNITS {
            let unit = self.read_u16()?;
            if index < used {
                units.push(unit);
            }
        }
        Some(String::from_utf16_lossy(&units))
    }

    /// Reads an extension flag and the trailing bytes it announces.
    pub fn read_extension(&mut self) -> Option<Option<Vec<u8>>> {
        let present = self.read_u8()? != 0;
        Some(present.then(|| self.read_rest()))
    }

    /// Reads everything that is left.
    pub fn read_rest(&mut self) -> Vec<u8> {
        let rest = self.buffer.get(self.position..).unwrap_or_default().to_vec();
        self.position = self.buffer.len();
        rest
    }
}

/// Truncates text to at most [`MAX_TEXT_UNITS`] UTF-16 units.
///
/// Cuts at a character boundary, so a surrogate pair is never split and
/// truncating twice gives the same result as truncating once.
#[must_use]
pub fn truncate_text(text: &str) -> &str {
    let mut units = 0;
    for (index, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > MAX_TEXT_UNITS {
            return &text[..index];
        }
    }
    text
}

fn text_units(text: &str) -> Vec<u16> {
    truncate_text(text).encode_utf16().collect()
}

fn unit_count(units: &[u16]) -> u32 {
    // Bounded by MAX_TEXT_UNITS.
    u32::try_from(units.len()).unwrap_or(u32::MAX)
}

/// Encodes the client handshake.
#[must_use]
pub fn encode_client_info(version: u32, name: &str, extension: Option<&[u8]>) -> Vec<u8> {
    let units = text_units(name);
    let mut writer = PacketWriter::new(PacketKind::ClientInfo);
    writer.write_u32(version);
    writer.write_u32(unit_count(&units));
    writer.write_text_slot(&units);
    writer.write_extension(extension);
    writer.finish()
}

/// Encodes the server handshake reply.
#[must_use]
pub fn encode_server_info(client_id: u32, extension: Option<&[u8]>) -> Vec<u8> {
    let mut writer = PacketWriter::new(PacketKind::ServerInfo);
    writer.write_u32(client_id);
    writer.write_extension(extension);
    writer.finish()
}

/// Encodes a chat line.
#[must_use]
pub fn encode_chat(username: &str, message: &str) -> Vec<u8> {
    let user_units = text_units(username);
    let message_units = text_units(message);
    let mut writer = PacketWriter::new(PacketKind::Chat);
    writer.write_u32(unit_count(&user_units));
    writer.write_u32(unit_count(&message_units));
    writer.write_text_slot(&user_units);
    writer.write_text_slot(&message_units);
    writer.finish()
}

/// Encodes a payload for the server application.
#[must_use]
pub fn encode_client_to_server(payload: &[u8]) -> Vec<u8> {
    let mut writer = PacketWriter::new(PacketKind::ClientToServer);
    writer.write_bytes(payload);
    writer.finish()
}

/// Encodes a relayed payload tagged with its origin peer id.
#[must_use]
pub fn encode_relay(origin: u32, payload: &[u8]) -> Vec<u8> {
    let mut writer = PacketWriter::new(PacketKind::ClientBroadcastRelay);
    writer.write_u32(origin);
    writer.write_bytes(payload);
    writer.finish()
}

/// Decodes a packet from the buffer.
///
/// # Errors
///
/// [`DecodeError::TooShort`] if the buffer can't hold the tag or the fixed
/// body of its kind, [`DecodeError::UnknownKind`] for an unrecognized tag.
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    let too_short = |needed| DecodeError::TooShort {
        needed,
        actual: bytes.len(),
    };

    let mut reader = PacketReader::new(bytes);
    let tag = reader.read_u32().ok_or_else(|| too_short(TAG_SIZE))?;
    let kind = PacketKind::from_tag(tag).ok_or(DecodeError::UnknownKind(tag))?;
    let needed = kind.min_size();
    if bytes.len() < needed {
        return Err(too_short(needed));
    }

    let packet = match kind {
        PacketKind::ClientInfo => {
            let version = reader.read_u32();
            let length = reader.read_u32();
            let name = length.and_then(|length| reader.read_text_slot(length));
            let extension = reader.read_extension();
            match (version, name, extension) {
                (Some(version), Some(name), Some(extension)) => Packet::ClientInfo {
                    version,
                    name,
                    extension,
                },
                _ => return Err(too_short(needed)),
            }
        }
        PacketKind::ServerInfo => {
            let client_id = reader.read_u32();
            let extension = reader.read_extension();
            match (client_id, extension) {
                (Some(client_id), Some(extension)) => Packet::ServerInfo {
                    client_id,
                    extension,
                },
                _ => return Err(too_short(needed)),
            }
        }
        PacketKind::Chat => {
            let lengths = reader.read_u32().zip(reader.read_u32());
            let text = lengths.and_then(|(user_len, message_len)| {
                let username = reader.read_text_slot(user_len)?;
                let message = reader.read_text_slot(message_len)?;
                Some((username, message))
            });
            let (username, message) = text.ok_or_else(|| too_short(needed))?;
            Packet::Chat { username, message }
        }
        PacketKind::ClientToServer => Packet::ClientToServer {
            payload: reader.read_rest(),
        },
        PacketKind::ClientBroadcastRelay => {
            let origin = reader.read_u32().ok_or_else(|| too_short(needed))?;
            Packet::ClientBroadcastRelay {
                origin,
                payload: reader.read_rest(),
            }
        }
    };
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_info_roundtrip() {
        let bytes = encode_client_info(1, "Tacotakedown", Some(&[7, 8, 9]));
        assert_eq!(bytes.len(), PacketKind::ClientInfo.min_size() + 3);

        let packet = decode(&bytes).unwrap();
        assert_eq!(
            packet,
            Packet::ClientInfo {
                version: 1,
                name: "Tacotakedown".to_owned(),
                extension: Some(vec![7, 8, 9]),
            }
        );
    }

    #[test]
    fn test_client_info_without_extension() {
        let bytes = encode_client_info(1, "bob", None);
        assert_eq!(bytes.len(), PacketKind::ClientInfo.min_size());
        if let Packet::ClientInfo { extension, .. } = decode(&bytes).unwrap() {
            assert_eq!(extension, None);
        } else {
            panic!("Expected ClientInfo packet");
        }
    }

    #[test]
    fn test_empty_extension_is_still_present() {
        let bytes = encode_server_info(3, Some(&[]));
        assert_eq!(
            decode(&bytes).unwrap(),
            Packet::ServerInfo {
                client_id: 3,
                extension: Some(Vec::new()),
            }
        );
    }

    #[test]
    fn test_wire_layout_is_little_endian() {
        let bytes = encode_server_info(0x0102_0304, None);
        assert_eq!(bytes, vec![1, 0, 0, 0, 4, 3, 2, 1, 0]);

        let relay = encode_relay(2, b"hi");
        assert_eq!(relay, vec![4, 0, 0, 0, 2, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn test_long_name_truncated_to_254_units() {
        let long = "x".repeat(300);
        let bytes = encode_client_info(1, &long, None);
        if let Packet::ClientInfo { name, .. } = decode(&bytes).unwrap() {
            assert_eq!(name.len(), MAX_TEXT_UNITS);
            assert_eq!(name, "x".repeat(254));
        } else {
            panic!("Expected ClientInfo packet");
        }
    }

    #[test]
    fn test_truncation_is_idempotent() {
        let long = "é".repeat(400);
        let once = truncate_text(&long);
        assert_eq!(truncate_text(once), once);

        let first = encode_client_info(1, &long, None);
        let decoded = match decode(&first).unwrap() {
            Packet::ClientInfo { name, .. } => name,
            other => panic!("unexpected packet {other:?}"),
        };
        assert_eq!(encode_client_info(1, &decoded, None), first);
    }

    #[test]
    fn test_truncation_never_splits_surrogate_pair() {
        // 253 ASCII units, then a character needing two units.
        let text = format!("{}{}", "a".repeat(253), '\u{1F32E}');
        let truncated = truncate_text(&text);
        assert_eq!(truncated, "a".repeat(253));
        assert_eq!(truncated.encode_utf16().count(), 253);
    }

    #[test]
    fn test_exact_limit_untouched() {
        let text = "z".repeat(MAX_TEXT_UNITS);
        assert_eq!(truncate_text(&text), text);
    }

    #[test]
    fn test_chat_roundtrip_non_ascii() {
        let bytes = encode_chat("Ünïcødé", "hello 🌮 world");
        assert_eq!(bytes.len(), PacketKind::Chat.min_size());
        assert_eq!(
            decode(&bytes).unwrap(),
            Packet::Chat {
                username: "Ünïcødé".to_owned(),
                message: "hello 🌮 world".to_owned(),
            }
        );
    }

    #[test]
    fn test_declared_length_clamped() {
        let mut bytes = encode_chat("ab", "cd");
        // Claim a 1000-unit username.
        bytes[4..8].copy_from_slice(&1000u32.to_le_bytes());
        if let Packet::Chat { username, message } = decode(&bytes).unwrap() {
            assert_eq!(username.encode_utf16().count(), MAX_TEXT_UNITS);
            assert!(username.starts_with("ab"));
            assert_eq!(message, "cd");
        } else {
            panic!("Expected Chat packet");
        }
    }

    #[test]
    fn test_client_to_server_payload() {
        let bytes = encode_client_to_server(b"ping");
        assert_eq!(
            decode(&bytes).unwrap(),
            Packet::ClientToServer {
                payload: b"ping".to_vec()
            }
        );
    }

    #[test]
    fn test_too_short_for_tag() {
        assert_eq!(
            decode(&[2, 0]),
            Err(DecodeError::TooShort {
                needed: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn test_too_short_for_body() {
        let bytes = encode_chat("a", "b");
        assert_eq!(
            decode(&bytes[..100]),
            Err(DecodeError::TooShort {
                needed: PacketKind::Chat.min_size(),
                actual: 100
            })
        );
        assert!(matches!(
            decode(&[4, 0, 0, 0, 1]),
            Err(DecodeError::TooShort { needed: 8, .. })
        ));
    }

    #[test]
    fn test_unknown_kind() {
        assert_eq!(
            decode(&[9, 0, 0, 0, 1, 2, 3]),
            Err(DecodeError::UnknownKind(9))
        );
    }

    #[test]
    fn test_reader_stops_at_end() {
        let mut reader = PacketReader::new(&[1, 2, 3]);
        assert_eq!(reader.read_u16(), Some(0x0201));
        assert_eq!(reader.remaining(), 1);
        assert_eq!(reader.read_u16(), None);
        assert_eq!(reader.read_u8(), Some(3));
        assert_eq!(reader.read_u8(), None);
    }
}
