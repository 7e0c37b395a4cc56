//! The connection driver: a single task that owns all connection state.
//!
//! Socket tasks, auth tasks and timers never mutate state themselves. They
//! push tagged inputs onto the driver's queues and the driver applies them
//! one at a time, in arrival order. Every input that could mutate state is
//! first checked against the active socket's identity; inputs from a
//! superseded socket or a stale handshake are discarded.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use super::connection::{Connection, PendingAuth};
use super::connection_manager::{ConnectOutcome, ConnectionSnapshot};
use crate::auth::{AuthRequest, Authorizer, ChannelAuth, TokenProvider};
use crate::config::RealtimeConfig;
use crate::domain::{ConversationId, EventBus, MemberId, PresenceTracker, RealtimeEvent};
use crate::error::RealtimeError;
use crate::protocol::{ConnectionState, FrameCodec, InboundEvent, OutboundFrame};
use crate::transport::{SocketEvent, SocketEvents, SocketId, SocketRequest, SocketSignal, Transport};

/// Requests from [`super::ConnectionManager`] handles.
#[derive(Debug)]
pub(crate) enum Command {
    Connect {
        conversation: ConversationId,
        reply: oneshot::Sender<ConnectOutcome>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<ConnectionSnapshot>,
    },
}

/// Completions from tasks the driver spawned.
#[derive(Debug)]
enum Internal {
    AuthCompleted {
        pending: PendingAuth,
        result: Result<ChannelAuth, RealtimeError>,
    },
    AckTimedOut {
        socket: SocketId,
    },
}

/// Collaborators the driver is wired with.
#[derive(Debug)]
pub(crate) struct DriverParts {
    pub(crate) config: RealtimeConfig,
    pub(crate) self_id: MemberId,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) authorizer: Arc<dyn Authorizer>,
    pub(crate) tokens: Arc<dyn TokenProvider>,
    pub(crate) bus: EventBus,
    pub(crate) presence: Arc<RwLock<PresenceTracker>>,
}

#[derive(Debug)]
pub(crate) struct Driver {
    codec: FrameCodec,
    parts: DriverParts,
    connection: Option<Connection>,
    next_socket: SocketId,
    socket_tx: mpsc::UnboundedSender<SocketSignal>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl Driver {
    /// Spawns the driver task. It runs until every command sender is gone.
    pub(crate) fn spawn(parts: DriverParts, commands: mpsc::Receiver<Command>) {
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let driver = Self {
            codec: FrameCodec::new(parts.config.message_event.clone()),
            parts,
            connection: None,
            next_socket: SocketId::new(1),
            socket_tx,
            internal_tx,
        };
        tokio::spawn(driver.run(socket_rx, internal_rx, commands));
    }

    async fn run(
        mut self,
        mut socket_rx: mpsc::UnboundedReceiver<SocketSignal>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(signal) = socket_rx.recv() => self.on_socket(signal),
                Some(internal) = internal_rx.recv() => self.on_internal(internal),
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
            }
        }
        self.teardown("connection manager dropped");
        tracing::debug!("connection driver stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect {
                conversation,
                reply,
            } => {
                let outcome = self.connect(conversation);
                let _ = reply.send(outcome);
            }
            Command::Disconnect { reply } => {
                self.teardown("disconnect requested");
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn on_internal(&mut self, internal: Internal) {
        match internal {
            Internal::AuthCompleted { pending, result } => self.on_auth_completed(pending, result),
            Internal::AckTimedOut { socket } => self.on_ack_timeout(socket),
        }
    }

    fn connect(&mut self, conversation: ConversationId) -> ConnectOutcome {
        if let Some(conn) = &self.connection
            && conn.conversation == conversation
        {
            if conn.is_connecting {
                return ConnectOutcome::InProgress;
            }
            if conn.is_live() {
                return ConnectOutcome::AlreadyConnected;
            }
        }

        if let Some(conn) = &self.connection {
            let reason = if conn.conversation == conversation {
                "replacing stalled connection"
            } else {
                "switching conversation"
            };
            self.teardown(reason);
        }

        let Some(bearer_token) = self.parts.tokens.bearer_token() else {
            let err = RealtimeError::MissingToken;
            tracing::warn!(%conversation, code = err.error_code(), error = %err, "not connecting");
            return ConnectOutcome::MissingToken;
        };

        let socket = self.next_socket;
        self.next_socket = socket.next();
        let channel = conversation.channel_name(&self.parts.config.channel_prefix);

        let handle = self.parts.transport.open(SocketRequest {
            socket,
            url: self.parts.config.broker_url.clone(),
            events: SocketEvents::new(socket, self.socket_tx.clone()),
        });
        self.presence().clear();

        tracing::info!(%socket, %conversation, %channel, "connecting");
        self.connection = Some(Connection::new(handle, conversation, channel, bearer_token));
        ConnectOutcome::Started
    }

    /// Closes the active connection, if any, and resets to idle.
    fn teardown(&mut self, reason: &str) {
        if let Some(conn) = self.connection.take() {
            if conn.state == ConnectionState::Active {
                let unsubscribe = OutboundFrame::Unsubscribe {
                    channel: conn.channel.clone(),
                };
                let _ = conn.socket.send(unsubscribe.encode());
            }
            tracing::info!(
                socket = %conn.socket_id(),
                conversation = %conn.conversation,
                state = %conn.state,
                reason,
                "connection closed"
            );
            conn.close();
        }
        self.presence().clear();
    }

    fn active_mut(&mut self, socket: SocketId) -> Option<&mut Connection> {
        self.connection
            .as_mut()
            .filter(|conn| conn.socket_id() == socket)
    }

    fn on_socket(&mut self, signal: SocketSignal) {
        let socket = signal.socket;
        let Some(conn) = self.active_mut(socket) else {
            tracing::debug!(%socket, event = ?signal.event, "ignoring signal from superseded socket");
            return;
        };

        match signal.event {
            SocketEvent::Opened => {
                conn.state = ConnectionState::Open;
                conn.is_connecting = false;
                conn.opened_at = Some(Utc::now());
                tracing::info!(%socket, conversation = %conn.conversation, "socket open");
            }
            SocketEvent::Frame(text) => {
                conn.last_frame_at = Some(Utc::now());
                self.on_frame(socket, &text);
            }
            SocketEvent::Error(reason) => {
                conn.is_connecting = false;
                let err = RealtimeError::Connection(reason);
                tracing::warn!(%socket, code = err.error_code(), error = %err, "socket error");
            }
            SocketEvent::Closed => self.teardown("socket closed"),
        }
    }

    fn on_frame(&mut self, socket: SocketId, text: &str) {
        let frame = match self.codec.decode(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(%socket, error = %err, "dropping malformed frame");
                return;
            }
        };

        let Some(conn) = self.active_mut(socket) else {
            return;
        };
        if let Some(channel) = &frame.channel
            && channel != &conn.channel
        {
            tracing::debug!(%socket, %channel, "ignoring frame for another channel");
            return;
        }

        match frame.event {
            InboundEvent::Ping => {
                if !conn.socket.send(OutboundFrame::Pong.encode()) {
                    tracing::debug!(%socket, "socket gone before pong was sent");
                }
            }
            InboundEvent::ConnectionEstablished {
                socket_id,
                activity_timeout,
            } => {
                tracing::debug!(%socket, session = %socket_id, ?activity_timeout, "connection established");
                self.begin_auth(socket, socket_id);
            }
            InboundEvent::SubscriptionSucceeded { snapshot } => {
                self.on_subscription_succeeded(socket, snapshot);
            }
            InboundEvent::MemberAdded { member } => self.on_member_added(socket, member),
            InboundEvent::MemberRemoved { member } => self.on_member_removed(socket, member),
            InboundEvent::MessageSent { payload } => {
                self.parts.bus.publish(&RealtimeEvent::Message { payload });
            }
            InboundEvent::BrokerError { code, message } => {
                tracing::warn!(%socket, ?code, %message, "broker reported an error");
            }
            InboundEvent::Unknown { event } => {
                tracing::trace!(%socket, %event, "ignoring unrecognized event");
            }
        }
    }

    fn begin_auth(&mut self, socket: SocketId, session_id: String) {
        let auth_timeout = self.parts.config.auth_timeout;
        let authorizer = Arc::clone(&self.parts.authorizer);
        let internal_tx = self.internal_tx.clone();
        let Some(conn) = self.active_mut(socket) else {
            return;
        };
        if conn.state != ConnectionState::Open {
            // One handshake per connection, ever.
            tracing::warn!(%socket, state = %conn.state, "ignoring repeated connection_established");
            return;
        }

        let pending = PendingAuth {
            socket,
            session_id: session_id.clone(),
            channel: conn.channel.clone(),
            conversation: conn.conversation.clone(),
        };
        let request = AuthRequest {
            socket_id: session_id.clone(),
            channel_name: conn.channel.clone(),
            bearer_token: conn.bearer_token.clone(),
        };

        conn.session_id = Some(session_id);
        conn.state = ConnectionState::Authenticating;
        conn.pending_auth = Some(pending.clone());
        tracing::info!(%socket, channel = %conn.channel, "authenticating channel");

        let handshake = authorizer.authorize(request);
        conn.auth_task = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(auth_timeout, handshake).await {
                Ok(result) => result,
                Err(_) => Err(RealtimeError::Auth(format!(
                    "handshake timed out after {}ms",
                    auth_timeout.as_millis()
                ))),
            };
            let _ = internal_tx.send(Internal::AuthCompleted { pending, result });
        }));
    }

    fn on_auth_completed(&mut self, pending: PendingAuth, result: Result<ChannelAuth, RealtimeError>) {
        let ack_timeout = self.parts.config.subscribe_timeout;
        let internal_tx = self.internal_tx.clone();
        let socket = pending.socket;
        let Some(conn) = self
            .active_mut(socket)
            .filter(|conn| conn.pending_auth.as_ref() == Some(&pending))
        else {
            let stale = RealtimeError::StateConflict(format!("auth response for socket {socket}"));
            tracing::debug!(conversation = %pending.conversation, error = %stale, "discarding");
            return;
        };
        conn.pending_auth = None;
        conn.auth_task = None;

        let auth = match result {
            Ok(auth) => auth,
            Err(err) => {
                tracing::warn!(
                    %socket,
                    channel = %conn.channel,
                    code = err.error_code(),
                    error = %err,
                    "auth handshake failed; connection stalled until the next connect()"
                );
                return;
            }
        };

        let subscribe = OutboundFrame::Subscribe {
            channel: conn.channel.clone(),
            auth: auth.auth,
            channel_data: auth.channel_data,
        };
        if !conn.socket.send(subscribe.encode()) {
            tracing::debug!(%socket, "socket gone before subscribe was sent");
        }
        conn.state = ConnectionState::Subscribed;
        conn.ack_timer = Some(spawn_ack_timer(socket, ack_timeout, internal_tx));
        tracing::info!(%socket, channel = %conn.channel, "subscribe sent");
    }

    fn on_ack_timeout(&mut self, socket: SocketId) {
        let still_waiting = self
            .active_mut(socket)
            .is_some_and(|conn| conn.state == ConnectionState::Subscribed);
        if still_waiting {
            tracing::warn!(%socket, "subscription was not acknowledged in time");
            self.teardown("subscribe acknowledgment timed out");
        }
    }

    fn on_subscription_succeeded(&mut self, socket: SocketId, snapshot: Vec<MemberId>) {
        let Some(conn) = self.active_mut(socket) else {
            return;
        };
        if !matches!(conn.state, ConnectionState::Subscribed | ConnectionState::Active) {
            tracing::debug!(%socket, state = %conn.state, "ignoring unexpected subscription ack");
            return;
        }
        if let Some(timer) = conn.ack_timer.take() {
            timer.abort();
        }
        conn.state = ConnectionState::Active;
        let channel = conn.channel.clone();
        tracing::info!(%socket, %channel, members = snapshot.len(), "channel active");

        self.presence()
            .seed(&channel, snapshot, &self.parts.self_id);
        self.publish_users(&channel);
    }

    /// Channel of the active socket, if it has sent its subscribe frame.
    /// Member frames arriving earlier are dropped.
    fn subscribed_channel(&mut self, socket: SocketId) -> Option<String> {
        let conn = self.active_mut(socket)?;
        if !matches!(conn.state, ConnectionState::Subscribed | ConnectionState::Active) {
            tracing::debug!(%socket, state = %conn.state, "ignoring member frame before subscribe");
            return None;
        }
        Some(conn.channel.clone())
    }

    fn on_member_added(&mut self, socket: SocketId, member: MemberId) {
        let Some(channel) = self.subscribed_channel(socket) else {
            return;
        };
        let added = self
            .presence()
            .add(&channel, member.clone(), &self.parts.self_id);
        if !added {
            tracing::debug!(%socket, %member, "ignoring own member_added");
            return;
        }
        tracing::debug!(%socket, %member, "member joined");
        self.parts.bus.publish(&RealtimeEvent::Join { member });
        self.publish_users(&channel);
    }

    fn on_member_removed(&mut self, socket: SocketId, member: MemberId) {
        let Some(channel) = self.subscribed_channel(socket) else {
            return;
        };
        self.presence().remove(&channel, &member);
        tracing::debug!(%socket, %member, "member left");
        self.parts.bus.publish(&RealtimeEvent::Leave { member });
        self.publish_users(&channel);
    }

    /// Publishes the current member list. The presence lock is released
    /// before listeners run so they may read the view.
    fn publish_users(&self, channel: &str) {
        let members = self
            .parts
            .presence
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .members(channel)
            .into_iter()
            .collect();
        self.parts.bus.publish(&RealtimeEvent::Users { members });
    }

    fn presence(&self) -> std::sync::RwLockWriteGuard<'_, PresenceTracker> {
        self.parts
            .presence
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        let Some(conn) = &self.connection else {
            return ConnectionSnapshot::default();
        };
        let members = self
            .parts
            .presence
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .members(&conn.channel)
            .into_iter()
            .collect();
        ConnectionSnapshot {
            state: conn.state,
            conversation: Some(conn.conversation.clone()),
            channel: Some(conn.channel.clone()),
            session_id: conn.session_id.clone(),
            socket: Some(conn.socket_id()),
            members,
            opened_at: conn.opened_at,
            last_frame_at: conn.last_frame_at,
        }
    }
}

fn spawn_ack_timer(
    socket: SocketId,
    timeout: Duration,
    internal_tx: mpsc::UnboundedSender<Internal>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = internal_tx.send(Internal::AckTimedOut { socket });
    })
}
