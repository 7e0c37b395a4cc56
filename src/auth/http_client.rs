//! HTTP implementation of the auth handshake.

use futures_util::future::BoxFuture;
use reqwest::header::ACCEPT;
use serde::Serialize;

use super::{AuthRequest, Authorizer, ChannelAuth};
use crate::error::RealtimeError;

#[derive(Debug, Serialize)]
struct AuthBody<'a> {
    socket_id: &'a str,
    channel_name: &'a str,
}

/// Auth handshake against a broadcasting auth endpoint.
///
/// Sends `POST <endpoint>` with `Authorization: Bearer <token>` and the body
/// `{"socket_id": .., "channel_name": ..}`, expecting
/// `{"auth": .., "channel_data": ..}` back.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpAuthClient {
    /// Creates a client for `endpoint` with a default HTTP client.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Creates a client for `endpoint` reusing an existing HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Returns the auth endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Authorizer for HttpAuthClient {
    fn authorize(&self, request: AuthRequest) -> BoxFuture<'static, Result<ChannelAuth, RealtimeError>> {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            let response = http
                .post(&endpoint)
                .bearer_auth(&request.bearer_token)
                .header(ACCEPT, "application/json")
                .json(&AuthBody {
                    socket_id: &request.socket_id,
                    channel_name: &request.channel_name,
                })
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(RealtimeError::AuthStatus {
                    status: status.as_u16(),
                });
            }

            response
                .json::<ChannelAuth>()
                .await
                .map_err(|e| RealtimeError::Auth(format!("invalid auth response: {e}")))
        })
    }
}
