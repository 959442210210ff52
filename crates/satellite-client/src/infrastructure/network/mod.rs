//! Network infrastructure for the satellite client.
//!
//! Owns the single connection to the Companion server and turns the line
//! protocol into [`ClientEvent`]s for the application layer.
//!
//! Architecture:
//! - [`transport`] opens either a TCP socket or a WebSocket and exposes both
//!   through one reader/writer pair that deals in raw chunks and lines.
//! - [`connection_manager::ConnectionManager`] runs the handshake, heartbeat
//!   and reconnect state machine on top of a transport, and implements
//!   [`SurfaceLink`](crate::application::surface_link::SurfaceLink) so
//!   surfaces can send commands without touching the socket.

pub mod connection_manager;
pub mod transport;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub use crate::application::events::ClientEvent;
pub use connection_manager::ConnectionManager;

/// Default TCP port of the Companion satellite API.
pub const DEFAULT_TCP_PORT: u16 = 16622;

/// Default WebSocket port of the Companion satellite API.
pub const DEFAULT_WS_PORT: u16 = 16623;

/// Errors that can occur in the client network layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `add_device` was called for a surface the server already accepted.
    #[error("surface {0} is already registered")]
    AlreadyRegistered(String),
    /// `add_device` was called again before the server answered the first one.
    #[error("surface {0} has a registration in progress")]
    RegistrationPending(String),
    /// A TCP I/O error occurred.
    #[error("transport I/O error: {0}")]
    Transport(#[from] std::io::Error),
    /// The WebSocket handshake or stream failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid websocket url: {0}")]
    InvalidUrl(String),
}

/// Where to connect.  Replacing the details tears down the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionDetails {
    Tcp { host: String, port: u16 },
    WebSocket { url: String },
}

impl ConnectionDetails {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        ConnectionDetails::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn websocket(url: impl Into<String>) -> Self {
        ConnectionDetails::WebSocket { url: url.into() }
    }
}

impl fmt::Display for ConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionDetails::Tcp { host, port } => write!(f, "{host}:{port}"),
            ConnectionDetails::WebSocket { url } => f.write_str(url),
        }
    }
}

/// Heartbeat, reconnect and registration timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTimings {
    /// Interval between outbound `PING`s.
    pub ping_interval: Duration,
    /// Unanswered `PING`s tolerated before the idle check applies.
    pub max_unacked_pings: u32,
    /// The connection is only dropped if nothing was received for this long.
    pub idle_timeout: Duration,
    pub reconnect_delay: Duration,
    /// Reconnect delay after the server announced an unsupported API version.
    pub unsupported_reconnect_delay: Duration,
    /// After this long an unanswered `ADD-DEVICE` may be retried.
    pub registration_timeout: Duration,
}

impl Default for ConnectionTimings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(100),
            max_unacked_pings: 15,
            idle_timeout: Duration::from_millis(1000),
            reconnect_delay: Duration::from_secs(1),
            unsupported_reconnect_delay: Duration::from_secs(30),
            registration_timeout: Duration::from_secs(10),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
