//! Pusher-protocol frame codec.
//!
//! Frames are JSON text objects with an `event` name, an optional `channel`
//! and a `data` payload. Brokers frequently send `data` as a JSON-encoded
//! string, so the codec performs one further decode before interpreting it.
//! Decoding never aborts the stream: a malformed frame yields a
//! [`RealtimeError::Protocol`] and the caller moves on to the next frame.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::MemberId;
use crate::error::RealtimeError;

/// Broker keepalive probe.
pub const PING: &str = "pusher:ping";
/// Reply to [`PING`].
pub const PONG: &str = "pusher:pong";
/// Broker greeting carrying the session (socket) id.
pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
/// Broker-reported error.
pub const ERROR: &str = "pusher:error";
/// Channel subscription request.
pub const SUBSCRIBE: &str = "pusher:subscribe";
/// Channel unsubscription request.
pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";
/// Subscription acknowledgment carrying the presence snapshot.
pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
/// A member joined a presence channel.
pub const MEMBER_ADDED: &str = "pusher_internal:member_added";
/// A member left a presence channel.
pub const MEMBER_REMOVED: &str = "pusher_internal:member_removed";

/// Decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Keepalive probe; must be answered with a pong on the same socket.
    Ping,
    /// The broker accepted the socket and assigned it a session id.
    ConnectionEstablished {
        /// Broker-assigned session (socket) id.
        socket_id: String,
        /// Seconds of inactivity after which the broker expects a ping.
        activity_timeout: Option<u64>,
    },
    /// The subscribe frame was accepted.
    SubscriptionSucceeded {
        /// Ids of every member present at subscription time.
        snapshot: Vec<MemberId>,
    },
    /// A member joined.
    MemberAdded {
        /// Joining member.
        member: MemberId,
    },
    /// A member left.
    MemberRemoved {
        /// Leaving member.
        member: MemberId,
    },
    /// The application chat message event.
    MessageSent {
        /// Decoded payload, forwarded verbatim.
        payload: Value,
    },
    /// The broker reported an error.
    BrokerError {
        /// Pusher error code, when present.
        code: Option<u64>,
        /// Human-readable message.
        message: String,
    },
    /// Any other event name.
    Unknown {
        /// The unrecognized event name.
        event: String,
    },
}

/// Inbound frame: the decoded event plus the channel it was scoped to.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Channel name, for channel-scoped events.
    pub channel: Option<String>,
    /// Decoded event.
    pub event: InboundEvent,
}

/// Frames the client sends to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Reply to a broker ping.
    Pong,
    /// Join a channel using credentials from the auth handshake.
    Subscribe {
        /// Channel name.
        channel: String,
        /// Signature returned by the auth endpoint.
        auth: String,
        /// Presence member data returned by the auth endpoint.
        channel_data: String,
    },
    /// Leave a channel.
    Unsubscribe {
        /// Channel name.
        channel: String,
    },
}

impl OutboundFrame {
    /// Encodes the frame as JSON text.
    #[must_use]
    pub fn encode(&self) -> String {
        let value = match self {
            Self::Pong => json!({ "event": PONG, "data": {} }),
            Self::Subscribe {
                channel,
                auth,
                channel_data,
            } => json!({
                "event": SUBSCRIBE,
                "data": {
                    "channel": channel,
                    "auth": auth,
                    "channel_data": channel_data,
                },
            }),
            Self::Unsubscribe { channel } => json!({
                "event": UNSUBSCRIBE,
                "data": { "channel": channel },
            }),
        };
        value.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Decoder configured with the application message event name.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    message_event: String,
}

impl FrameCodec {
    /// Creates a codec that recognizes `message_event` as the chat message
    /// event. Namespaced names (`App\Events\MessageSent`) match on their
    /// final segment.
    #[must_use]
    pub fn new(message_event: impl Into<String>) -> Self {
        Self {
            message_event: message_event.into(),
        }
    }

    fn is_message_event(&self, name: &str) -> bool {
        name == self.message_event
            || name
                .rsplit('\\')
                .next()
                .is_some_and(|last| last == self.message_event)
    }

    /// Decodes one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Protocol`] if the text is not a JSON object
    /// with an `event` field, or if a recognized event lacks the fields it
    /// requires.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, RealtimeError> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let data = unwrap_data(raw.data);

        let event = match raw.event.as_str() {
            PING => InboundEvent::Ping,
            CONNECTION_ESTABLISHED => {
                let socket_id = data
                    .get("socket_id")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| missing(CONNECTION_ESTABLISHED, "socket_id"))?;
                InboundEvent::ConnectionEstablished {
                    socket_id: socket_id.to_string(),
                    activity_timeout: data.get("activity_timeout").and_then(Value::as_u64),
                }
            }
            SUBSCRIPTION_SUCCEEDED => InboundEvent::SubscriptionSucceeded {
                snapshot: presence_snapshot(&data)?,
            },
            MEMBER_ADDED => InboundEvent::MemberAdded {
                member: user_id(&data, MEMBER_ADDED)?,
            },
            MEMBER_REMOVED => InboundEvent::MemberRemoved {
                member: user_id(&data, MEMBER_REMOVED)?,
            },
            ERROR => InboundEvent::BrokerError {
                code: data.get("code").and_then(Value::as_u64),
                message: data
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| data.to_string()),
            },
            name if self.is_message_event(name) => InboundEvent::MessageSent { payload: data },
            name => InboundEvent::Unknown {
                event: name.to_string(),
            },
        };

        Ok(InboundFrame {
            channel: raw.channel,
            event,
        })
    }
}

/// Applies the one extra decode step for string-encoded payloads. Strings
/// that are not JSON are kept as-is.
fn unwrap_data(data: Value) -> Value {
    match data {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}

fn missing(event: &str, field: &str) -> RealtimeError {
    RealtimeError::Protocol(format!("{event} frame is missing {field}"))
}

fn user_id(data: &Value, event: &str) -> Result<MemberId, RealtimeError> {
    data.get("user_id")
        .and_then(MemberId::from_json)
        .ok_or_else(|| missing(event, "user_id"))
}

/// Extracts member ids from `{"presence":{"hash":{..}}}`, falling back to
/// `presence.ids` when the hash is absent.
fn presence_snapshot(data: &Value) -> Result<Vec<MemberId>, RealtimeError> {
    let presence = data
        .get("presence")
        .ok_or_else(|| missing(SUBSCRIPTION_SUCCEEDED, "presence"))?;

    if let Some(hash) = presence.get("hash").and_then(Value::as_object) {
        return Ok(hash.keys().map(|k| MemberId::new(k.clone())).collect());
    }
    if let Some(ids) = presence.get("ids").and_then(Value::as_array) {
        return Ok(ids.iter().filter_map(MemberId::from_json).collect());
    }
    Err(missing(SUBSCRIPTION_SUCCEEDED, "presence.hash"))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn codec() -> FrameCodec {
        FrameCodec::new("MessageSent")
    }

    fn decode(text: &str) -> InboundFrame {
        match codec().decode(text) {
            Ok(frame) => frame,
            Err(err) => panic!("decode failed for {text}: {err}"),
        }
    }

    #[test]
    fn pong_encoding_matches_wire_format() {
        let encoded: Value = serde_json::from_str(&OutboundFrame::Pong.encode()).unwrap_or_default();
        assert_eq!(encoded, json!({"event": "pusher:pong", "data": {}}));
    }

    #[test]
    fn subscribe_encoding_carries_auth_fields() {
        let frame = OutboundFrame::Subscribe {
            channel: "presence-conversation.42".to_string(),
            auth: "x".to_string(),
            channel_data: "y".to_string(),
        };
        let encoded: Value = serde_json::from_str(&frame.encode()).unwrap_or_default();
        assert_eq!(
            encoded,
            json!({
                "event": "pusher:subscribe",
                "data": {"channel": "presence-conversation.42", "auth": "x", "channel_data": "y"}
            })
        );
    }

    #[test]
    fn decodes_ping() {
        assert_eq!(decode(r#"{"event":"pusher:ping","data":{}}"#).event, InboundEvent::Ping);
    }

    #[test]
    fn decodes_string_encoded_connection_established() {
        let frame = decode(
            r#"{"event":"pusher:connection_established","data":"{\"socket_id\":\"123.456\",\"activity_timeout\":30}"}"#,
        );
        assert_eq!(
            frame.event,
            InboundEvent::ConnectionEstablished {
                socket_id: "123.456".to_string(),
                activity_timeout: Some(30),
            }
        );
    }

    #[test]
    fn connection_established_without_socket_id_is_protocol_error() {
        let result = codec().decode(r#"{"event":"pusher:connection_established","data":"{}"}"#);
        assert!(matches!(result, Err(RealtimeError::Protocol(_))));
    }

    #[test]
    fn decodes_presence_hash_snapshot() {
        let frame = decode(
            r#"{"event":"pusher_internal:subscription_succeeded","channel":"presence-conversation.42","data":"{\"presence\":{\"count\":2,\"ids\":[\"7\",\"9\"],\"hash\":{\"7\":{},\"9\":{\"name\":\"B\"}}}}"}"#,
        );
        assert_eq!(frame.channel.as_deref(), Some("presence-conversation.42"));
        let InboundEvent::SubscriptionSucceeded { mut snapshot } = frame.event else {
            panic!("expected subscription succeeded");
        };
        snapshot.sort();
        assert_eq!(snapshot, vec![MemberId::from(7), MemberId::from(9)]);
    }

    #[test]
    fn falls_back_to_presence_ids() {
        let frame = decode(
            r#"{"event":"pusher_internal:subscription_succeeded","data":{"presence":{"ids":[3,4]}}}"#,
        );
        assert_eq!(
            frame.event,
            InboundEvent::SubscriptionSucceeded {
                snapshot: vec![MemberId::from(3), MemberId::from(4)],
            }
        );
    }

    #[test]
    fn decodes_numeric_member_ids() {
        let frame = decode(
            r#"{"event":"pusher_internal:member_added","data":"{\"user_id\":9,\"user_info\":{\"name\":\"B\"}}"}"#,
        );
        assert_eq!(
            frame.event,
            InboundEvent::MemberAdded {
                member: MemberId::from(9)
            }
        );
        let frame = decode(r#"{"event":"pusher_internal:member_removed","data":{"user_id":"9"}}"#);
        assert_eq!(
            frame.event,
            InboundEvent::MemberRemoved {
                member: MemberId::from(9)
            }
        );
    }

    #[test]
    fn message_event_matches_namespaced_name() {
        let frame = decode(
            r#"{"event":"App\\Events\\MessageSent","channel":"presence-conversation.1","data":"{\"message\":{\"id\":5,\"body\":\"hi\"}}"}"#,
        );
        assert_eq!(
            frame.event,
            InboundEvent::MessageSent {
                payload: json!({"message": {"id": 5, "body": "hi"}})
            }
        );
    }

    #[test]
    fn non_json_string_payload_is_kept_verbatim() {
        let frame = decode(r#"{"event":"MessageSent","data":"plain text"}"#);
        assert_eq!(
            frame.event,
            InboundEvent::MessageSent {
                payload: Value::String("plain text".to_string())
            }
        );
    }

    #[test]
    fn decodes_broker_error() {
        let frame = decode(r#"{"event":"pusher:error","data":{"code":4009,"message":"Unauthorized"}}"#);
        assert_eq!(
            frame.event,
            InboundEvent::BrokerError {
                code: Some(4009),
                message: "Unauthorized".to_string()
            }
        );
    }

    #[test]
    fn unknown_event_is_not_an_error() {
        let frame = decode(r#"{"event":"client-typing","data":{}}"#);
        assert_eq!(
            frame.event,
            InboundEvent::Unknown {
                event: "client-typing".to_string()
            }
        );
    }

    #[test]
    fn malformed_json_is_protocol_error() {
        for text in ["{oops", "[]", r#"{"data":{}}"#, ""] {
            let result = codec().decode(text);
            assert!(matches!(result, Err(RealtimeError::Protocol(_))), "{text}");
        }
    }
}
