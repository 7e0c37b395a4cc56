//! WebSocket transport built on `tokio-tungstenite`.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::socket::{SocketEvents, SocketHandle, SocketRequest, Transport};

/// Production [`Transport`]: one tokio task per socket.
///
/// The task owns both halves of the split stream. Inbound text frames are
/// forwarded in arrival order; protocol-level pings are answered by
/// tungstenite itself. Dropping the [`SocketHandle`] sends a close frame and
/// ends the task.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, request: SocketRequest) -> SocketHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SocketHandle::new(request.socket, tx);
        tokio::spawn(run_socket(request.url, request.events, rx));
        handle
    }
}

/// Runs one socket until either side closes it.
async fn run_socket(url: String, events: SocketEvents, mut outbound: mpsc::UnboundedReceiver<String>) {
    let socket = events.socket();
    let stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((stream, _response)) => stream,
            Err(err) => {
                tracing::warn!(%socket, %url, error = %err, "websocket connect failed");
                events.error(err.to_string());
                events.closed();
                return;
            }
        },
        None = outbound.recv() => {
            tracing::debug!(%socket, "socket released before it opened");
            events.closed();
            return;
        }
    };

    events.opened();
    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => events.frame(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        events.error(err.to_string());
                        break;
                    }
                }
            }
            out = outbound.recv() => {
                match out {
                    Some(text) => {
                        if let Err(err) = ws_tx.send(Message::text(text)).await {
                            events.error(err.to_string());
                            break;
                        }
                    }
                    None => {
                        let _ = ws_tx.close().await;
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(%socket, "websocket closed");
    events.closed();
}
