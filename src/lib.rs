//! # presence-link
//!
//! Client-side realtime channel manager for Pusher-protocol brokers
//! (Pusher, Laravel Reverb, Soketi).
//!
//! The crate keeps one live socket to the broker, performs the
//! authenticated subscribe handshake for a presence-tracked conversation
//! channel, answers keepalive pings, tracks which other participants are
//! present, and fans inbound events out to application listeners in
//! arrival order.
//!
//! ## Architecture
//!
//! ```text
//! Application (UI, CLI)
//!     │  connect / disconnect / snapshot        ▲ message, join, leave, users
//!     ▼                                         │
//!     ├── ConnectionManager handle (service/)   EventBus (domain/)
//!     │        │ commands                       ▲
//!     │        ▼                                │
//!     ├── Driver task: state machine ───────────┤ PresenceTracker (domain/)
//!     │        ▲ socket signals   ▲ auth results
//!     │        │                  │
//!     ├── Transport (transport/)  Authorizer (auth/)
//!     │        │                  │
//!     └── Broker websocket        Broadcasting auth endpoint (HTTP)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use presence_link::{ConnectionManager, EventKind, RealtimeConfig, StaticToken};
//!
//! # async fn run() -> Result<(), presence_link::RealtimeError> {
//! let config = RealtimeConfig::new(
//!     "ws://localhost:8080/app/app-key?protocol=7&client=rust&version=0.1.0&flash=false",
//!     "http://localhost:8000/broadcasting/auth",
//! );
//! let manager = ConnectionManager::builder(config, 7u64, StaticToken::new("token")).spawn();
//!
//! let _users = manager.events().on(EventKind::Users, |event| {
//!     println!("{event:?}");
//! });
//! manager.connect(42u64).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;

pub use auth::{AuthRequest, Authorizer, ChannelAuth, HttpAuthClient, SharedToken, StaticToken, TokenProvider};
pub use config::RealtimeConfig;
pub use domain::{ConversationId, EventBus, EventKind, MemberId, PresenceView, RealtimeEvent, Subscription};
pub use error::{ErrorKind, RealtimeError};
pub use protocol::ConnectionState;
pub use service::{ConnectOutcome, ConnectionManager, ConnectionManagerBuilder, ConnectionSnapshot};
pub use transport::{SocketEvents, SocketHandle, SocketId, SocketRequest, Transport, WebSocketTransport};
