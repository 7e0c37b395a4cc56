//! Socket transport: the seam between the connection manager and the
//! network.

pub mod socket;
pub mod websocket;

pub use socket::{
    SocketEvent, SocketEvents, SocketHandle, SocketId, SocketRequest, SocketSignal, Transport,
};
pub use websocket::WebSocketTransport;
