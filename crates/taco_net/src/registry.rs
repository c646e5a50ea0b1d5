//! # Peer Registry
//!
//! Server-side bookkeeping of connected clients.
//!
//! ## Design
//!
//! - Ids are assigned from 1 upward; [`PeerId::SERVER`] (0) is reserved for
//!   the server's own identity
//! - A peer lives from the transport Connect event until its Disconnect
//!   event or until [`PeerRegistry::sweep`] removes it
//! - The sweep decides first and removes afterwards, so removal never
//!   disturbs iteration
//!
//! ## Kick Timeline
//!
//! ```text
//! kick()          +1s                        +2s
//!   |--------------|--------------------------|
//!   notice sent    graceful disconnect        forced reset + removal
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use crate::transport::PeerHandle;
use crate::KICK_GRACE;

/// Session-level identity of a connected client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl PeerId {
    /// The server's own identity (admin chat, server-originated relays).
    pub const SERVER: Self = Self(0);

    /// Returns true for the reserved server id.
    #[inline]
    #[must_use]
    pub const fn is_server(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected client as seen by the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    /// Assigned id.
    pub id: PeerId,
    /// Transport handle.
    pub handle: PeerHandle,
    /// Display name from the handshake (empty until `ClientInfo` arrives).
    pub name: String,
    /// Set by the first `ClientInfo`; later ones are ignored.
    pub announced: bool,
    /// When the graceful disconnect of a kick is due.
    pub kick_deadline: Option<Instant>,
    /// When the forced reset of a kick is due.
    pub force_deadline: Option<Instant>,
}

impl Peer {
    /// Returns true if a kick is in progress.
    #[inline]
    #[must_use]
    pub const fn is_being_kicked(&self) -> bool {
        self.kick_deadline.is_some() || self.force_deadline.is_some()
    }
}

/// What the sweep decided for one peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepAction {
    /// Silent longer than the protocol timeout; removed.
    TimedOut(Peer),
    /// Kick grace elapsed; the caller starts a graceful disconnect.
    Kick {
        /// Transport handle to disconnect.
        handle: PeerHandle,
        /// Peer id.
        id: PeerId,
        /// Display name.
        name: String,
    },
    /// Did not leave after the graceful disconnect; removed.
    Forced(Peer),
}

/// The set of connected peers.
#[derive(Debug)]
pub struct PeerRegistry {
    peers: Vec<Peer>,
    next_id: u32,
}

impl PeerRegistry {
    /// Creates an empty registry; the first peer gets id 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            peers: Vec::new(),
            next_id: 1,
        }
    }

    /// Registers a newly connected transport peer and returns its id.
    pub fn add(&mut self, handle: PeerHandle) -> PeerId {
        let id = PeerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.peers.push(Peer {
            id,
            handle,
            name: String::new(),
            announced: false,
            kick_deadline: None,
            force_deadline: None,
        });
        id
    }

    /// Looks up a peer by id.
    #[must_use]
    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.id == id)
    }

    /// Looks up a peer by id, mutably.
    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|peer| peer.id == id)
    }

    /// Looks up a peer by transport handle.
    #[must_use]
    pub fn by_handle(&self, handle: PeerHandle) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.handle == handle)
    }

    /// Looks up the first peer with the given display name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.name == name)
    }

    /// Removes a peer by id.
    pub fn remove(&mut self, id: PeerId) -> Option<Peer> {
        let index = self.peers.iter().position(|peer| peer.id == id)?;
        Some(self.peers.remove(index))
    }

    /// Removes a peer by transport handle.
    pub fn remove_by_handle(&mut self, handle: PeerHandle) -> Option<Peer> {
        let index = self.peers.iter().position(|peer| peer.handle == handle)?;
        Some(self.peers.remove(index))
    }

    /// Iterates peers in connection order.
    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    /// Number of peers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns true if no peer is connected.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Removes every peer, in connection order.
    pub fn drain(&mut self) -> Vec<Peer> {
        std::mem::take(&mut self.peers)
    }

    /// Schedules the graceful disconnect of a kick one grace period from now.
    ///
    /// Returns false if the peer is unknown or already being kicked.
    pub fn schedule_kick(&mut self, id: PeerId, now: Instant) -> bool {
        match self.get_mut(id) {
            Some(peer) if !peer.is_being_kicked() => {
                peer.kick_deadline = Some(now + KICK_GRACE);
                true
            }
            _ => false,
        }
    }

    /// Checks every peer for timeout, due kick and due forced reset, in that
    /// priority order.
    ///
    /// `last_receive` reports when the transport last heard from a handle.
    /// Timed-out and forced peers are removed before this returns.
    pub fn sweep<F>(&mut self, now: Instant, timeout: Duration, last_receive: F) -> Vec<SweepAction>
    where
        F: Fn(PeerHandle) -> Option<Instant>,
    {
        let mut actions = Vec::new();
        let mut removals = Vec::new();

        for peer in &mut self.peers {
            let silent_for = last_receive(peer.handle)
                .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
            if silent_for > timeout {
                removals.push((peer.id, false));
                continue;
            }

            if let Some(due) = peer.kick_deadline {
                if now >= due {
                    peer.kick_deadline = None;
                    peer.force_deadline = Some(due + KICK_GRACE);
                    actions.push(SweepAction::Kick {
                        handle: peer.handle,
                        id: peer.id,
                        name: peer.name.clone(),
                    });
                }
            }

            if peer.force_deadline.is_some_and(|due| now >= due) {
                removals.push((peer.id, true));
            }
        }

        for (id, forced) in removals {
            if let Some(peer) = self.remove(id) {
                actions.push(if forced {
                    SweepAction::Forced(peer)
                } else {
                    SweepAction::TimedOut(peer)
                });
            }
        }
        actions
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
