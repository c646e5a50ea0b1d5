//! Error types for the session protocol.
//!
//! Errors never cross the session boundary as failures: the session logs
//! them and keeps running. They exist so that internal handlers can use `?`
//! and so that the log lines carry a precise cause.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::registry::PeerId;

/// Failures of the underlying datagram transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint could not be bound (port in use, permission denied).
    #[error("failed to bind endpoint on {address}: {source}")]
    Bind {
        /// Address the bind was attempted on.
        address: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The target address did not resolve.
    #[error("failed to resolve address \"{0}\"")]
    Resolve(String),

    /// Every peer slot of the host is taken.
    #[error("no free peer slot")]
    NoFreeSlot,

    /// Generic socket error.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failures while decoding a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer is shorter than the fixed body of its kind.
    #[error("packet too short: need {needed} bytes, got {actual}")]
    TooShort {
        /// Minimum size for the declared kind.
        needed: usize,
        /// Size actually received.
        actual: usize,
    },

    /// The leading kind tag is not a known packet kind.
    #[error("unknown packet kind {0}")]
    UnknownKind(u32),
}

/// Failures handled inside the session controller.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An endpoint could not be created; the session keeps its prior role.
    #[error("transport initialization failed: {0}")]
    TransportInit(#[from] TransportError),

    /// The remote announced a different protocol version.
    #[error("version mismatch: server is running version {server}, client is running version {client}")]
    VersionMismatch {
        /// Version of the server.
        server: u32,
        /// Version announced by the client.
        client: u32,
    },

    /// The application rejected the handshake extension payload.
    #[error("handshake extension rejected")]
    ExtensionRejected,

    /// A received packet was malformed.
    #[error("malformed packet: {0}")]
    Decode(#[from] DecodeError),

    /// An operation addressed a peer id that is not registered.
    #[error("no peer with id {0}")]
    PeerNotFound(PeerId),
}

/// Failures while loading a [`crate::SessionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid TOML for the config schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for session handlers.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
