//! Per-peer reliability: sequencing, acknowledgement, resends and
//! in-order delivery of sequenced frames.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::frame::{self, FrameKind};
use super::{MAX_RESEND_INTERVAL, RESEND_INTERVAL};

/// Sequences ahead of the next expected one that are held back for in-order
/// delivery. Frames further ahead are refused and must be resent.
const RECEIVE_WINDOW: i16 = 256;

/// A frame sent but not yet acknowledged.
#[derive(Clone, Debug)]
struct PendingFrame {
    sequence: u16,
    kind: FrameKind,
    datagram: Vec<u8>,
    first_sent: Instant,
    sent_time: Instant,
    resends: u32,
}

/// Outcome of an acknowledgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Acked {
    pub(crate) kind: FrameKind,
    /// Only measured for frames acknowledged on their first transmission.
    pub(crate) rtt_sample: Option<Duration>,
}

/// Reliability state of one peer.
#[derive(Debug, Default)]
pub(crate) struct ReliabilityLayer {
    pending: Vec<PendingFrame>,
    held: HashMap<u16, (FrameKind, Vec<u8>)>,
    next_outgoing: u16,
    next_incoming: u16,
}

impl ReliabilityLayer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Assigns the next sequence number and returns the datagram to transmit.
    pub(crate) fn send_reliable(&mut self, kind: FrameKind, body: &[u8], now: Instant) -> Vec<u8> {
        let sequence = self.next_outgoing;
        self.next_outgoing = self.next_outgoing.wrapping_add(1);

        let datagram = frame::encode(kind, sequence, body);
        self.pending.push(PendingFrame {
            sequence,
            kind,
            datagram: datagram.clone(),
            first_sent: now,
            sent_time: now,
            resends: 0,
        });
        datagram
    }

    /// Sequence number the next reliable frame will get.
    pub(crate) const fn next_sequence(&self) -> u16 {
        self.next_outgoing
    }

    /// Acknowledges receipt of a frame. Unknown (already acked) sequences
    /// return `None`.
    pub(crate) fn acknowledge(&mut self, sequence: u16, now: Instant) -> Option<Acked> {
        let index = self.pending.iter().position(|p| p.sequence == sequence)?;
        let acked = self.pending.remove(index);
        Some(Acked {
            kind: acked.kind,
            rtt_sample: (acked.resends == 0).then(|| now.saturating_duration_since(acked.sent_time)),
        })
    }

    /// Accepts a sequenced frame and returns the frames now deliverable in
    /// order.
    ///
    /// `None` means the frame was refused (beyond the receive window) and
    /// must not be acknowledged. Duplicates and held frames yield an empty
    /// list and are acknowledged.
    pub(crate) fn receive(
        &mut self,
        sequence: u16,
        kind: FrameKind,
        body: &[u8],
    ) -> Option<Vec<(FrameKind, Vec<u8>)>> {
        // Signed distance from the expected sequence, wrapping.
        #[allow(clippy::cast_possible_wrap)]
        let distance = sequence.wrapping_sub(self.next_incoming) as i16;

        if distance < 0 {
            return Some(Vec::new());
        }
        if distance >= RECEIVE_WINDOW {
            return None;
        }
        if distance > 0 {
            self.held.entry(sequence).or_insert_with(|| (kind, body.to_vec()));
            return Some(Vec::new());
        }

        let mut ready = vec![(kind, body.to_vec())];
        self.next_incoming = self.next_incoming.wrapping_add(1);
        while let Some(next) = self.held.remove(&self.next_incoming) {
            ready.push(next);
            self.next_incoming = self.next_incoming.wrapping_add(1);
        }
        Some(ready)
    }

    /// Returns datagrams whose resend delay has elapsed, with exponential
    /// backoff per frame.
    pub(crate) fn resends(&mut self, now: Instant) -> Vec<Vec<u8>> {
        let mut resends = Vec::new();
        for pending in &mut self.pending {
            let exponent = pending.resends.min(4);
            let delay = (RESEND_INTERVAL * 2u32.pow(exponent)).min(MAX_RESEND_INTERVAL);
            if now.saturating_duration_since(pending.sent_time) >= delay {
                pending.sent_time = now;
                pending.resends += 1;
                resends.push(pending.datagram.clone());
            }
        }
        resends
    }

    /// Time the oldest unacknowledged frame was first sent.
    pub(crate) fn oldest_unacked(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.first_sent).min()
    }

    /// True when nothing is awaiting acknowledgement.
    pub(crate) fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliability_layer() {
        let now = Instant::now();
        let mut layer = ReliabilityLayer::new();

        let first = layer.send_reliable(FrameKind::Reliable, b"hello", now);
        let second = layer.send_reliable(FrameKind::Reliable, b"world", now);
        assert_eq!(frame::decode(&first).unwrap().sequence, 0);
        assert_eq!(frame::decode(&second).unwrap().sequence, 1);

        // Acknowledge first packet
        let acked = layer
            .acknowledge(0, now + Duration::from_millis(40))
            .unwrap();
        assert_eq!(acked.rtt_sample, Some(Duration::from_millis(40)));

        // Only second packet should be pending
        assert_eq!(layer.pending.len(), 1);
        assert!(layer.acknowledge(0, now).is_none());
    }

    #[test]
    fn test_in_order_delivery_with_reordering() {
        let mut layer = ReliabilityLayer::new();

        assert!(layer.receive(1, FrameKind::Reliable, b"b").unwrap().is_empty());
        assert!(layer.receive(2, FrameKind::Reliable, b"c").unwrap().is_empty());

        let ready = layer.receive(0, FrameKind::Reliable, b"a").unwrap();
        let bodies: Vec<Vec<u8>> = ready.into_iter().map(|(_, body)| body).collect();
        assert_eq!(bodies, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_duplicate_detection() {
        let mut layer = ReliabilityLayer::new();

        assert_eq!(layer.receive(0, FrameKind::Ping, b"").unwrap().len(), 1);
        assert_eq!(layer.receive(0, FrameKind::Ping, b""), Some(Vec::new()));
        assert_eq!(layer.receive(1, FrameKind::Ping, b"").unwrap().len(), 1);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut layer = ReliabilityLayer {
            next_incoming: u16::MAX,
            ..ReliabilityLayer::default()
        };

        assert_eq!(layer.receive(u16::MAX, FrameKind::Reliable, b"x").unwrap().len(), 1);
        assert_eq!(layer.receive(0, FrameKind::Reliable, b"y").unwrap().len(), 1);
        assert_eq!(layer.receive(u16::MAX, FrameKind::Reliable, b"x"), Some(Vec::new()));
    }

    #[test]
    fn test_frames_beyond_window_are_refused_until_resent() {
        let mut layer = ReliabilityLayer::new();

        // Frame 0 is lost; 1..=255 fit in the window, 256 and 257 don't.
        for sequence in 1..=255u16 {
            assert_eq!(layer.receive(sequence, FrameKind::Reliable, b"x"), Some(Vec::new()));
        }
        assert_eq!(layer.receive(256, FrameKind::Reliable, b"x"), None);
        assert_eq!(layer.receive(257, FrameKind::Reliable, b"x"), None);

        let mut delivered = layer.receive(0, FrameKind::Reliable, b"x").unwrap().len();
        assert_eq!(delivered, 256);

        // The refused frames were never acked, so the sender resends them.
        delivered += layer.receive(256, FrameKind::Reliable, b"x").unwrap().len();
        delivered += layer.receive(257, FrameKind::Reliable, b"x").unwrap().len();
        delivered += layer.receive(258, FrameKind::Reliable, b"x").unwrap().len();
        assert_eq!(delivered, 259);
        assert!(layer.held.is_empty());
    }

    #[test]
    fn test_resend_backoff() {
        let start = Instant::now();
        let mut layer = ReliabilityLayer::new();
        layer.send_reliable(FrameKind::Reliable, b"data", start);

        assert!(layer.resends(start + Duration::from_millis(100)).is_empty());
        assert_eq!(layer.resends(start + Duration::from_millis(200)).len(), 1);
        // Second resend waits twice as long.
        assert!(layer.resends(start + Duration::from_millis(500)).is_empty());
        assert_eq!(layer.resends(start + Duration::from_millis(600)).len(), 1);

        assert_eq!(layer.oldest_unacked(), Some(start));
        assert!(!layer.is_idle());

        // Resent frames give no RTT sample.
        let acked = layer.acknowledge(0, start + Duration::from_millis(700)).unwrap();
        assert_eq!(acked.rtt_sample, None);
        assert!(layer.is_idle());
    }
}
