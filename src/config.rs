//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable values fall back
//! to defaults suited for a local Pusher-compatible broker.

use std::time::Duration;

use crate::error::RealtimeError;

/// Pusher protocol revision announced in the broker URL.
pub const PROTOCOL_VERSION: u8 = 7;

/// Top-level realtime client configuration.
///
/// Loaded once at startup via [`RealtimeConfig::from_env`], or assembled
/// programmatically with [`RealtimeConfig::new`] and the `with_*` setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Full websocket URL of the broker, including the app key path.
    pub broker_url: String,

    /// URL of the broadcasting auth endpoint (HTTP POST).
    pub auth_endpoint: String,

    /// Prefix prepended to a conversation id to form its channel name.
    pub channel_prefix: String,

    /// Name of the application event carrying chat messages.
    pub message_event: String,

    /// Upper bound on the auth handshake round trip.
    pub auth_timeout: Duration,

    /// Upper bound between sending Subscribe and the broker acknowledging it.
    pub subscribe_timeout: Duration,

    /// Capacity of the caller command queue.
    pub command_buffer: usize,
}

impl RealtimeConfig {
    /// Creates a configuration for the given broker and auth endpoint with
    /// default channel naming and timeouts.
    #[must_use]
    pub fn new(broker_url: impl Into<String>, auth_endpoint: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            auth_endpoint: auth_endpoint.into(),
            channel_prefix: "presence-conversation.".to_string(),
            message_event: "MessageSent".to_string(),
            auth_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(10),
            command_buffer: 64,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if `REALTIME_SCHEME` is set to
    /// something other than `ws` or `wss`, or if a duration or buffer
    /// setting is zero.
    pub fn from_env() -> Result<Self, RealtimeError> {
        dotenvy::dotenv().ok();

        let scheme = env_or("REALTIME_SCHEME", "ws");
        validate_scheme(&scheme)?;
        let host = env_or("REALTIME_HOST", "localhost");
        let port: u16 = parse_env("REALTIME_PORT", 8080);
        let app_key = env_or("REALTIME_APP_KEY", "app-key");

        let auth_endpoint = env_or(
            "REALTIME_AUTH_ENDPOINT",
            "http://localhost:8000/broadcasting/auth",
        );

        let auth_timeout_secs: u64 = parse_env("REALTIME_AUTH_TIMEOUT_SECS", 10);
        let subscribe_timeout_secs: u64 = parse_env("REALTIME_SUBSCRIBE_TIMEOUT_SECS", 10);
        let command_buffer: usize = parse_env("REALTIME_COMMAND_BUFFER", 64);
        validate_non_zero("REALTIME_AUTH_TIMEOUT_SECS", auth_timeout_secs)?;
        validate_non_zero("REALTIME_SUBSCRIBE_TIMEOUT_SECS", subscribe_timeout_secs)?;
        validate_non_zero("REALTIME_COMMAND_BUFFER", command_buffer)?;

        Ok(Self {
            broker_url: broker_url(&scheme, &host, port, &app_key),
            auth_endpoint,
            channel_prefix: env_or("REALTIME_CHANNEL_PREFIX", "presence-conversation."),
            message_event: env_or("REALTIME_MESSAGE_EVENT", "MessageSent"),
            auth_timeout: Duration::from_secs(auth_timeout_secs),
            subscribe_timeout: Duration::from_secs(subscribe_timeout_secs),
            command_buffer,
        })
    }

    /// Sets the channel name prefix.
    #[must_use]
    pub fn with_channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    /// Sets the application message event name.
    #[must_use]
    pub fn with_message_event(mut self, event: impl Into<String>) -> Self {
        self.message_event = event.into();
        self
    }

    /// Sets the auth handshake timeout.
    #[must_use]
    pub const fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Sets the subscribe acknowledgment timeout.
    #[must_use]
    pub const fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }
}

/// Builds a Pusher-protocol broker URL for the given app key.
#[must_use]
pub fn broker_url(scheme: &str, host: &str, port: u16, app_key: &str) -> String {
    format!(
        "{scheme}://{host}:{port}/app/{app_key}?protocol={PROTOCOL_VERSION}&client=rust&version={}&flash=false",
        env!("CARGO_PKG_VERSION")
    )
}

fn validate_scheme(scheme: &str) -> Result<(), RealtimeError> {
    match scheme {
        "ws" | "wss" => Ok(()),
        other => Err(RealtimeError::Config(format!(
            "REALTIME_SCHEME must be ws or wss, got {other}"
        ))),
    }
}

fn validate_non_zero<T: Default + PartialEq>(key: &str, value: T) -> Result<(), RealtimeError> {
    if value == T::default() {
        return Err(RealtimeError::Config(format!("{key} must be non-zero")));
    }
    Ok(())
}

/// Reads an environment variable, returning `default` when unset or empty.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
