//! Events published to application listeners.
//!
//! Every protocol frame that is relevant to the UI is turned into a
//! [`RealtimeEvent`] and published through the [`super::EventBus`] in the
//! order the broker emitted it.

use std::fmt;

use serde::Serialize;

use super::MemberId;

/// Discriminator used to register for one kind of [`RealtimeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An application chat message arrived.
    Message,
    /// A participant joined the channel.
    Join,
    /// A participant left the channel.
    Leave,
    /// The full member list changed.
    Users,
}

impl EventKind {
    /// Returns the event name as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Users => "users",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event observed by application code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RealtimeEvent {
    /// Application message payload, forwarded verbatim.
    Message {
        /// Decoded message payload.
        payload: serde_json::Value,
    },

    /// A member joined the conversation.
    Join {
        /// The member that joined.
        member: MemberId,
    },

    /// A member left the conversation.
    Leave {
        /// The member that left.
        member: MemberId,
    },

    /// The complete set of other members currently present.
    Users {
        /// Members sorted by id; never contains the local user.
        members: Vec<MemberId>,
    },
}

impl RealtimeEvent {
    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Message { .. } => EventKind::Message,
            Self::Join { .. } => EventKind::Join,
            Self::Leave { .. } => EventKind::Leave,
            Self::Users { .. } => EventKind::Users,
        }
    }
}
