//! # TACO Net - Peer-to-Peer Session Protocol
//!
//! Client/server session manager for the TACO engine, built on an
//! ENet-style hybrid transport (reliable ordered + unreliable datagrams).
//!
//! ## Architecture
//!
//! ```text
//! application ──commands──> Session ──> Host (udp / loopback) ──> socket
//!      ^                       |              |
//!      |                       |          HostEvent
//!      |                       v              v
//!      └──SessionListener── PeerRegistry <── protocol::decode
//! ```
//!
//! - **Protocol**: fixed-layout binary packets (`ClientInfo`, `ServerInfo`,
//!   `Chat`, `ClientToServer`, `ClientBroadcastRelay`)
//! - **Transport**: connection-oriented peers over datagrams with acks,
//!   resends, pings and round-trip estimation
//! - **Registry**: server-side peers with timeout sweep and two-phase kick
//! - **Session**: the client state machine
//!   (`Disconnected -> ConnectPending -> Connected -> DisconnectPending`)
//!   plus the server role, both driven from one `update()` tick
//!
//! ## Concurrency Model
//!
//! Everything runs on the thread calling [`Session::update`]. All network
//! I/O is polled with a zero timeout; nothing blocks. Embedders that drive
//! the session from several threads wrap it in a [`SharedSession`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use taco_net::{Session, SessionConfig, SystemClock, NoopListener};
//! use taco_net::transport::udp::UdpNetwork;
//!
//! let mut session = Session::new(
//!     SessionConfig::default(),
//!     Box::new(UdpNetwork::new()),
//!     Box::new(SystemClock),
//!     Box::new(NoopListener),
//! );
//! session.host();
//! loop {
//!     session.update();
//!     std::thread::sleep(std::time::Duration::from_millis(15));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, CommandError};
pub use config::SessionConfig;
pub use error::{ConfigError, DecodeError, SessionError, TransportError};
pub use protocol::{Packet, PacketKind};
pub use registry::{Peer, PeerId, PeerRegistry};
pub use session::{
    ClientState, NoopListener, PeerStatus, Role, Session, SessionListener, SessionStatus,
};
pub use transport::{Delivery, Host, HostEvent, Network, PeerHandle};

/// Protocol version announced in the handshake.
///
/// A server drops (after a grace period) any client announcing another version.
pub const PROTOCOL_VERSION: u32 = 1;

/// A peer silent for longer than this is removed by the server sweep.
pub const PROTOCOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between `kick()` and the graceful disconnect, and again between the
/// graceful disconnect and the forced reset.
pub const KICK_GRACE: Duration = Duration::from_secs(1);

/// Default UDP port for hosting and connecting.
pub const DEFAULT_PORT: u16 = 7777;

/// Default server capacity.
pub const DEFAULT_MAX_CLIENTS: usize = 16;

/// Username used for server-generated chat (roll results, notices).
pub const SYSTEM_USERNAME: &str = "CONSOLE";

/// Chat token that makes the server roll a number between 0 and 100.
pub const ROLL_TRIGGER: &str = "!roll";

/// A session shared between the tick thread and other threads.
pub type SharedSession = Arc<parking_lot::Mutex<Session>>;
