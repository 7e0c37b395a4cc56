//! Public handle onto the connection driver.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use super::driver::{Command, Driver, DriverParts};
use crate::auth::{Authorizer, HttpAuthClient, TokenProvider};
use crate::config::RealtimeConfig;
use crate::domain::{ConversationId, EventBus, MemberId, PresenceTracker, PresenceView};
use crate::error::RealtimeError;
use crate::protocol::ConnectionState;
use crate::transport::{SocketId, Transport, WebSocketTransport};

/// Result of a [`ConnectionManager::connect`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectOutcome {
    /// A new socket is being opened.
    Started,
    /// A live connection to this conversation already exists.
    AlreadyConnected,
    /// A connect attempt to this conversation is still opening its socket.
    InProgress,
    /// No bearer token was available; nothing was opened.
    MissingToken,
}

/// Point-in-time view of the managed connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    /// Current state; `Idle` when no connection exists.
    pub state: ConnectionState,
    /// Target conversation.
    pub conversation: Option<ConversationId>,
    /// Presence channel name.
    pub channel: Option<String>,
    /// Broker-assigned session id, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Identity of the active socket.
    #[serde(skip)]
    pub socket: Option<SocketId>,
    /// Other members present, sorted by id.
    pub members: Vec<MemberId>,
    /// When the socket opened.
    pub opened_at: Option<DateTime<Utc>>,
    /// When the last frame arrived.
    pub last_frame_at: Option<DateTime<Utc>>,
}

/// Handle to the realtime connection manager.
///
/// Create one with [`ConnectionManager::builder`] and pass clones to every
/// part of the application that needs realtime events. All clones drive the
/// same single connection; at most one connection exists at any time. The
/// background task stops once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    commands: mpsc::Sender<Command>,
    bus: EventBus,
    presence: PresenceView,
    channel_prefix: Arc<str>,
}

impl ConnectionManager {
    /// Starts building a manager for the local user `self_id`.
    #[must_use]
    pub fn builder(
        config: RealtimeConfig,
        self_id: impl Into<MemberId>,
        tokens: impl TokenProvider,
    ) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            config,
            self_id: self_id.into(),
            tokens: Arc::new(tokens),
            transport: None,
            authorizer: None,
        }
    }

    /// Connects to the presence channel of `conversation`.
    ///
    /// Reuses a live connection to the same conversation, tears down a
    /// connection to any other conversation first, and returns
    /// [`ConnectOutcome::MissingToken`] without opening anything when no
    /// bearer token is available. Socket and auth failures are never
    /// returned; they are logged and observed as missing events.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Closed`] if the manager task has stopped.
    pub async fn connect(
        &self,
        conversation: impl Into<ConversationId>,
    ) -> Result<ConnectOutcome, RealtimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect {
            conversation: conversation.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| RealtimeError::Closed)
    }

    /// Closes the connection, if any, and clears presence state.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Closed`] if the manager task has stopped.
    pub async fn disconnect(&self) -> Result<(), RealtimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Disconnect { reply }).await?;
        rx.await.map_err(|_| RealtimeError::Closed)
    }

    /// Returns the current connection state.
    ///
    /// The snapshot reflects every socket signal delivered before the call.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Closed`] if the manager task has stopped.
    pub async fn snapshot(&self) -> Result<ConnectionSnapshot, RealtimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| RealtimeError::Closed)
    }

    /// Returns the bus that realtime events are published on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Returns a read-only view of presence state.
    #[must_use]
    pub fn presence(&self) -> &PresenceView {
        &self.presence
    }

    /// Returns the presence channel name used for `conversation`.
    #[must_use]
    pub fn channel_for(&self, conversation: &ConversationId) -> String {
        conversation.channel_name(&self.channel_prefix)
    }

    async fn send(&self, command: Command) -> Result<(), RealtimeError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RealtimeError::Closed)
    }
}

/// Wiring for a [`ConnectionManager`].
///
/// Defaults to [`WebSocketTransport`] and an [`HttpAuthClient`] pointed at
/// the configured auth endpoint.
#[derive(Debug)]
pub struct ConnectionManagerBuilder {
    config: RealtimeConfig,
    self_id: MemberId,
    tokens: Arc<dyn TokenProvider>,
    transport: Option<Arc<dyn Transport>>,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl ConnectionManagerBuilder {
    /// Replaces the socket transport.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replaces the auth handshake implementation.
    #[must_use]
    pub fn authorizer(mut self, authorizer: impl Authorizer) -> Self {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    /// Starts the manager task and returns its handle.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(self) -> ConnectionManager {
        let Self {
            config,
            self_id,
            tokens,
            transport,
            authorizer,
        } = self;

        let transport = transport.unwrap_or_else(|| Arc::new(WebSocketTransport::new()));
        let authorizer = authorizer
            .unwrap_or_else(|| Arc::new(HttpAuthClient::new(config.auth_endpoint.clone())));

        let (commands, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let bus = EventBus::new();
        let tracker = Arc::new(RwLock::new(PresenceTracker::new()));
        let handle = ConnectionManager {
            commands,
            bus: bus.clone(),
            presence: PresenceView::new(Arc::clone(&tracker)),
            channel_prefix: Arc::from(config.channel_prefix.as_str()),
        };

        Driver::spawn(
            DriverParts {
                config,
                self_id,
                transport,
                authorizer,
                tokens,
                bus,
                presence: tracker,
            },
            command_rx,
        );
        handle
    }
}
