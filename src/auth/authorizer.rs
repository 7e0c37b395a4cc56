//! Channel auth handshake seam.
//!
//! Before subscribing to a presence channel the client must prove it is
//! allowed to join. An [`Authorizer`] performs that out-of-band call and
//! returns the signature plus presence member data for the subscribe frame.

use std::fmt;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::RealtimeError;

/// Input for one auth handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Broker session id from `pusher:connection_established`.
    pub socket_id: String,
    /// Channel the client wants to join.
    pub channel_name: String,
    /// Bearer token proving the user's identity.
    pub bearer_token: String,
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("socket_id", &self.socket_id)
            .field("channel_name", &self.channel_name)
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

/// Credentials returned by a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAuth {
    /// Signature to place in the subscribe frame.
    pub auth: String,
    /// JSON-encoded presence member data to place in the subscribe frame.
    pub channel_data: String,
}

/// Performs the auth handshake for a protected channel.
///
/// Implementations must not block: the returned future is driven on its own
/// task so frame dispatch continues while the handshake is in flight.
pub trait Authorizer: fmt::Debug + Send + Sync + 'static {
    /// Authorizes `request`.
    ///
    /// # Errors
    ///
    /// Returns an auth-kind [`RealtimeError`] when the endpoint is
    /// unreachable, rejects the request, or answers with an unusable body.
    fn authorize(&self, request: AuthRequest) -> BoxFuture<'static, Result<ChannelAuth, RealtimeError>>;
}
