//! The single managed connection record.

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::domain::ConversationId;
use crate::protocol::ConnectionState;
use crate::transport::{SocketHandle, SocketId};

/// Correlates an in-flight auth handshake with the connection that started
/// it. A completion is applied only if every field still matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingAuth {
    pub(crate) socket: SocketId,
    pub(crate) session_id: String,
    pub(crate) channel: String,
    pub(crate) conversation: ConversationId,
}

/// State of the one live connection.
///
/// The target conversation and channel are fixed at creation; switching
/// conversations replaces the whole record.
#[derive(Debug)]
pub(crate) struct Connection {
    pub(crate) socket: SocketHandle,
    pub(crate) conversation: ConversationId,
    pub(crate) channel: String,
    pub(crate) state: ConnectionState,
    pub(crate) session_id: Option<String>,
    pub(crate) is_connecting: bool,
    pub(crate) pending_auth: Option<PendingAuth>,
    pub(crate) bearer_token: String,
    pub(crate) auth_task: Option<JoinHandle<()>>,
    pub(crate) ack_timer: Option<JoinHandle<()>>,
    pub(crate) opened_at: Option<DateTime<Utc>>,
    pub(crate) last_frame_at: Option<DateTime<Utc>>,
}

impl Connection {
    pub(crate) fn new(
        socket: SocketHandle,
        conversation: ConversationId,
        channel: String,
        bearer_token: String,
    ) -> Self {
        Self {
            socket,
            conversation,
            channel,
            state: ConnectionState::Connecting,
            session_id: None,
            is_connecting: true,
            pending_auth: None,
            bearer_token,
            auth_task: None,
            ack_timer: None,
            opened_at: None,
            last_frame_at: None,
        }
    }

    pub(crate) fn socket_id(&self) -> SocketId {
        self.socket.id()
    }

    /// A stalled connection failed its only auth attempt and will never
    /// progress on its own.
    pub(crate) fn is_stalled(&self) -> bool {
        self.state == ConnectionState::Authenticating && self.pending_auth.is_none()
    }

    /// Live connections make a repeated `connect()` to the same target a
    /// no-op.
    pub(crate) fn is_live(&self) -> bool {
        match self.state {
            ConnectionState::Connecting
            | ConnectionState::Open
            | ConnectionState::Subscribed
            | ConnectionState::Active => true,
            ConnectionState::Authenticating => !self.is_stalled(),
            ConnectionState::Idle | ConnectionState::Closed => false,
        }
    }

    /// Stops background work tied to this connection and releases the
    /// socket.
    pub(crate) fn close(mut self) {
        self.state = ConnectionState::Closed;
        if let Some(task) = self.auth_task.take() {
            task.abort();
        }
        if let Some(timer) = self.ack_timer.take() {
            timer.abort();
        }
        self.pending_auth = None;
        self.socket.close();
    }
}
