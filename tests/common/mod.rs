//! Shared fixtures: an in-memory transport, a controllable authorizer and a
//! harness wiring both into a `ConnectionManager`.

#![allow(dead_code, clippy::panic)]

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};

use presence_link::{
    AuthRequest, Authorizer, ChannelAuth, ConnectionManager, RealtimeConfig, RealtimeError,
    RealtimeEvent, SocketEvents, SocketHandle, SocketId, SocketRequest, StaticToken, Subscription,
    TokenProvider, Transport,
};

pub const WAIT: Duration = Duration::from_secs(2);

pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>, what: &str) -> T {
    match tokio::time::timeout(WAIT, rx.recv()).await {
        Ok(Some(value)) => value,
        Ok(None) => panic!("{what}: channel closed"),
        Err(_) => panic!("{what}: timed out"),
    }
}

/// One socket opened through [`FakeTransport`].
#[derive(Debug)]
pub struct FakeSocket {
    pub id: SocketId,
    pub url: String,
    pub events: SocketEvents,
    pub outbound: mpsc::UnboundedReceiver<String>,
}

impl FakeSocket {
    pub fn open(&self) {
        self.events.opened();
    }

    pub fn send(&self, frame: Value) {
        self.events.frame(frame.to_string());
    }

    pub fn send_raw(&self, text: &str) {
        self.events.frame(text);
    }

    pub fn establish(&self, socket_id: &str) {
        self.send(json!({
            "event": "pusher:connection_established",
            "data": json!({ "socket_id": socket_id, "activity_timeout": 30 }).to_string(),
        }));
    }

    pub fn subscription_succeeded(&self, channel: &str, ids: &[&str]) {
        let hash: serde_json::Map<String, Value> =
            ids.iter().map(|id| ((*id).to_string(), json!({}))).collect();
        self.send(json!({
            "event": "pusher_internal:subscription_succeeded",
            "channel": channel,
            "data": json!({ "presence": { "count": ids.len(), "ids": ids, "hash": hash } }).to_string(),
        }));
    }

    pub fn member_added(&self, channel: &str, id: &str) {
        self.send(json!({
            "event": "pusher_internal:member_added",
            "channel": channel,
            "data": json!({ "user_id": id, "user_info": {} }).to_string(),
        }));
    }

    pub fn member_removed(&self, channel: &str, id: &str) {
        self.send(json!({
            "event": "pusher_internal:member_removed",
            "channel": channel,
            "data": json!({ "user_id": id }).to_string(),
        }));
    }

    /// Next frame the manager wrote to this socket, decoded.
    pub async fn next_outbound(&mut self) -> Value {
        let text = recv(&mut self.outbound, "outbound frame").await;
        serde_json::from_str(&text).unwrap_or_else(|e| panic!("outbound frame is not json: {e}"))
    }

    /// `true` if nothing is queued and the socket is still held.
    pub fn is_quiet(&mut self) -> bool {
        matches!(
            self.outbound.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        )
    }

    /// Waits until the manager released this socket, returning any frames
    /// written before release.
    pub async fn released(&mut self) -> Vec<Value> {
        let mut written = Vec::new();
        loop {
            match tokio::time::timeout(WAIT, self.outbound.recv()).await {
                Ok(Some(text)) => written.push(serde_json::from_str(&text).unwrap_or(Value::Null)),
                Ok(None) => return written,
                Err(_) => panic!("socket {} was never released", self.id),
            }
        }
    }
}

/// Transport that hands every opened socket to the test.
#[derive(Debug, Clone)]
pub struct FakeTransport {
    opened: mpsc::UnboundedSender<FakeSocket>,
}

impl FakeTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeSocket>) {
        let (opened, rx) = mpsc::unbounded_channel();
        (Self { opened }, rx)
    }
}

impl Transport for FakeTransport {
    fn open(&self, request: SocketRequest) -> SocketHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.opened.send(FakeSocket {
            id: request.socket,
            url: request.url,
            events: request.events,
            outbound: rx,
        });
        SocketHandle::new(request.socket, tx)
    }
}

/// An auth handshake waiting for the test to answer it.
#[derive(Debug)]
pub struct AuthCall {
    pub request: AuthRequest,
    reply: oneshot::Sender<Result<ChannelAuth, RealtimeError>>,
}

impl AuthCall {
    pub fn succeed(self, auth: &str, channel_data: &str) {
        let _ = self.reply.send(Ok(ChannelAuth {
            auth: auth.to_string(),
            channel_data: channel_data.to_string(),
        }));
    }

    pub fn fail(self, err: RealtimeError) {
        let _ = self.reply.send(Err(err));
    }
}

/// Authorizer whose every call is answered by the test.
#[derive(Debug, Clone)]
pub struct FakeAuthorizer {
    calls: mpsc::UnboundedSender<AuthCall>,
}

impl FakeAuthorizer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AuthCall>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Self { calls }, rx)
    }
}

impl Authorizer for FakeAuthorizer {
    fn authorize(&self, request: AuthRequest) -> BoxFuture<'static, Result<ChannelAuth, RealtimeError>> {
        let (reply, rx) = oneshot::channel();
        let _ = self.calls.send(AuthCall { request, reply });
        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(RealtimeError::Auth("auth call dropped".to_string())))
        })
    }
}

pub fn test_config() -> RealtimeConfig {
    RealtimeConfig::new(
        "ws://broker.test/app/app-key?protocol=7",
        "http://api.test/broadcasting/auth",
    )
}

pub fn channel(conversation: u64) -> String {
    format!("presence-conversation.{conversation}")
}

/// A manager wired to fakes, plus a recorder of every published event.
#[derive(Debug)]
pub struct Harness {
    pub manager: ConnectionManager,
    pub sockets: mpsc::UnboundedReceiver<FakeSocket>,
    pub auth_calls: mpsc::UnboundedReceiver<AuthCall>,
    pub events: Arc<Mutex<Vec<RealtimeEvent>>>,
    _recorder: Subscription,
}

impl Harness {
    pub fn new(self_id: u64) -> Self {
        Self::with(test_config(), self_id, StaticToken::new("token"))
    }

    pub fn with(config: RealtimeConfig, self_id: u64, tokens: impl TokenProvider) -> Self {
        let (transport, sockets) = FakeTransport::new();
        let (authorizer, auth_calls) = FakeAuthorizer::new();
        let manager = ConnectionManager::builder(config, self_id, tokens)
            .transport(transport)
            .authorizer(authorizer)
            .spawn();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let recorder = manager.events().subscribe(move |event| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone());
        });

        Self {
            manager,
            sockets,
            auth_calls,
            events,
            _recorder: recorder,
        }
    }

    pub async fn next_socket(&mut self) -> FakeSocket {
        recv(&mut self.sockets, "opened socket").await
    }

    pub async fn next_auth_call(&mut self) -> AuthCall {
        recv(&mut self.auth_calls, "auth call").await
    }

    /// Drains the recorded events.
    pub fn take_events(&self) -> Vec<RealtimeEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Waits until the driver has applied every signal delivered so far.
    pub async fn settle(&self) -> presence_link::ConnectionSnapshot {
        match self.manager.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => panic!("snapshot failed: {err}"),
        }
    }

    /// Connects to `conversation` and drives it up to `Subscribed`,
    /// returning the socket with the subscribe frame already consumed.
    pub async fn subscribe(&mut self, conversation: u64, session: &str) -> FakeSocket {
        let outcome = self.manager.connect(conversation).await;
        assert!(matches!(outcome, Ok(presence_link::ConnectOutcome::Started)));
        let mut socket = self.next_socket().await;
        socket.open();
        socket.establish(session);
        self.next_auth_call().await.succeed("sig", "{\"user_id\":1}");
        let frame = socket.next_outbound().await;
        assert_eq!(frame["event"], "pusher:subscribe");
        socket
    }

    /// Drives `conversation` to `Active` with the given presence snapshot.
    pub async fn activate(&mut self, conversation: u64, ids: &[&str]) -> FakeSocket {
        let socket = self.subscribe(conversation, "100.1").await;
        socket.subscription_succeeded(&channel(conversation), ids);
        let snapshot = self.settle().await;
        assert_eq!(snapshot.state, presence_link::ConnectionState::Active);
        socket
    }
}
