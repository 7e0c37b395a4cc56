//! Realtime client error types.
//!
//! [`RealtimeError`] is the central error type for the crate. Every variant
//! belongs to one [`ErrorKind`] category. None of these errors reach UI
//! listeners: they are logged where they are detected and the affected
//! connection either stalls, self-heals to idle, or drops the offending
//! input.

use std::fmt;

/// Failure category a [`RealtimeError`] belongs to.
///
/// | Kind            | Recovery                                       |
/// |-----------------|------------------------------------------------|
/// | `Connection`    | call `connect()` again                         |
/// | `Auth`          | call `connect()` again; never retried          |
/// | `Protocol`      | absorbed; the frame is dropped                 |
/// | `StateConflict` | absorbed; the stale input is discarded         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket open or socket I/O failure.
    Connection,
    /// Auth handshake failure or non-success response.
    Auth,
    /// Malformed or unrecognized frame.
    Protocol,
    /// Mutation attempted from a superseded socket or stale handshake.
    StateConflict,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connection => "connection",
            Self::Auth => "auth",
            Self::Protocol => "protocol",
            Self::StateConflict => "state_conflict",
        };
        f.write_str(name)
    }
}

/// Client-side error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category       |
/// |-----------|----------------|
/// | 1000–1999 | Connection     |
/// | 2000–2999 | Auth           |
/// | 3000–3999 | Protocol       |
/// | 4000–4999 | State conflict |
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// The socket could not be opened or failed while open.
    #[error("connection error: {0}")]
    Connection(String),

    /// The connection manager task is no longer running.
    #[error("connection manager is closed")]
    Closed,

    /// The configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The auth endpoint could not be reached or returned an unusable body.
    #[error("auth error: {0}")]
    Auth(String),

    /// The auth endpoint answered with a non-success HTTP status.
    #[error("auth endpoint returned status {status}")]
    AuthStatus {
        /// HTTP status code returned by the auth endpoint.
        status: u16,
    },

    /// No bearer token was available when one was required.
    #[error("no bearer token available")]
    MissingToken,

    /// A frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An input arrived for a socket or handshake that is no longer active.
    #[error("stale input discarded: {0}")]
    StateConflict(String),
}

impl RealtimeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Connection(_) => 1001,
            Self::Closed => 1002,
            Self::Config(_) => 1003,
            Self::Auth(_) => 2001,
            Self::AuthStatus { .. } => 2002,
            Self::MissingToken => 2003,
            Self::Protocol(_) => 3001,
            Self::StateConflict(_) => 4001,
        }
    }

    /// Returns the taxonomy category for this variant.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) | Self::Closed | Self::Config(_) => ErrorKind::Connection,
            Self::Auth(_) | Self::AuthStatus { .. } | Self::MissingToken => ErrorKind::Auth,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::StateConflict(_) => ErrorKind::StateConflict,
        }
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<reqwest::Error> for RealtimeError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::AuthStatus {
                status: status.as_u16(),
            },
            None => Self::Auth(err.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connection(err.to_string())
    }
}
