//! Link-level framing under the session packets.
//!
//! ```text
//! magic u16 (0x5443) | kind u8 | sequence u16 | body
//! ```
//!
//! A reliable payload too large for one datagram travels as FRAGMENT
//! frames, each with its own sequence number and a fragment header in
//! front of its slice of the payload:
//!
//! ```text
//! start_sequence u16 | index u16 | count u16 | chunk
//! ```

/// Marks datagrams belonging to this protocol.
pub(crate) const MAGIC: u16 = 0x5443;

/// Bytes in front of every body.
pub(crate) const HEADER_LEN: usize = 5;

/// Bytes in front of every fragment chunk.
pub(crate) const FRAGMENT_HEADER_LEN: usize = 6;

/// Link frame kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum FrameKind {
    Connect = 1,
    Verify = 2,
    Disconnect = 3,
    Ping = 4,
    Ack = 5,
    Reliable = 6,
    Unreliable = 7,
    Fragment = 8,
}

impl FrameKind {
    pub(crate) const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Connect),
            2 => Some(Self::Verify),
            3 => Some(Self::Disconnect),
            4 => Some(Self::Ping),
            5 => Some(Self::Ack),
            6 => Some(Self::Reliable),
            7 => Some(Self::Unreliable),
            8 => Some(Self::Fragment),
            _ => None,
        }
    }
}

/// A borrowed, decoded frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Frame<'a> {
    pub(crate) kind: FrameKind,
    pub(crate) sequence: u16,
    pub(crate) body: &'a [u8],
}

pub(crate) fn encode(kind: FrameKind, sequence: u16, body: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(HEADER_LEN + body.len());
    datagram.extend_from_slice(&MAGIC.to_le_bytes());
    datagram.push(kind as u8);
    datagram.extend_from_slice(&sequence.to_le_bytes());
    datagram.extend_from_slice(body);
    datagram
}

pub(crate) fn decode(datagram: &[u8]) -> Option<Frame<'_>> {
    if datagram.len() < HEADER_LEN {
        return None;
    }
    if u16::from_le_bytes([datagram[0], datagram[1]]) != MAGIC {
        return None;
    }
    let kind = FrameKind::from_u8(datagram[2])?;
    let sequence = u16::from_le_bytes([datagram[3], datagram[4]]);
    Some(Frame {
        kind,
        sequence,
        body: &datagram[HEADER_LEN..],
    })
}

/// Position of one fragment within its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FragmentHeader {
    /// Sequence number of the payload's first fragment.
    pub(crate) start_sequence: u16,
    pub(crate) index: u16,
    pub(crate) count: u16,
}

impl FragmentHeader {
    pub(crate) fn encode(self, chunk: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(FRAGMENT_HEADER_LEN + chunk.len());
        body.extend_from_slice(&self.start_sequence.to_le_bytes());
        body.extend_from_slice(&self.index.to_le_bytes());
        body.extend_from_slice(&self.count.to_le_bytes());
        body.extend_from_slice(chunk);
        body
    }

    /// Splits a FRAGMENT body into its header and chunk.
    pub(crate) fn decode(body: &[u8]) -> Option<(Self, &[u8])> {
        if body.len() < FRAGMENT_HEADER_LEN {
            return None;
        }
        let header = Self {
            start_sequence: u16::from_le_bytes([body[0], body[1]]),
            index: u16::from_le_bytes([body[2], body[3]]),
            count: u16::from_le_bytes([body[4], body[5]]),
        };
        if header.count == 0 || header.index >= header.count {
            return None;
        }
        Some((header, &body[FRAGMENT_HEADER_LEN..]))
    }
}
