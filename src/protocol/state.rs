//! Connection state machine states.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of the single managed connection.
///
/// ```text
/// Idle ─connect─▶ Connecting ─open─▶ Open ─established─▶ Authenticating
///                                                          │ auth ok
///                                   Active ◀─succeeded─ Subscribed
/// ```
///
/// Any state returns to `Idle` on `disconnect()`, on socket close, or when
/// superseded by a connect to another conversation. `Closed` marks a
/// connection record that has been torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection exists.
    #[default]
    Idle,
    /// Socket requested, not yet open.
    Connecting,
    /// Socket open, waiting for the broker greeting.
    Open,
    /// Auth handshake in flight, or stalled after it failed.
    Authenticating,
    /// Subscribe frame sent, waiting for the acknowledgment.
    Subscribed,
    /// Subscribed and receiving presence and message events.
    Active,
    /// Torn down; the record is about to be discarded.
    Closed,
}

impl ConnectionState {
    /// Returns the state name as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Authenticating => "authenticating",
            Self::Subscribed => "subscribed",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
