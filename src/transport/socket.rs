//! Socket identity, lifecycle signals and the transport seam.
//!
//! A [`Transport`] opens one socket per connect attempt. The socket task
//! reports its lifecycle through [`SocketEvents`], tagged with the
//! [`SocketId`] it was opened under, so the connection manager can tell the
//! active socket apart from superseded ones. The manager writes through the
//! returned [`SocketHandle`]; dropping the handle releases the socket.

use std::fmt;

use tokio::sync::mpsc;

/// Identity of one opened socket. Never reused within a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    /// Creates a `SocketId` from a raw sequence number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the id that follows this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle signal emitted by a socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The socket is open.
    Opened,
    /// One inbound text frame.
    Frame(String),
    /// The socket failed to open or failed while open.
    Error(String),
    /// The socket is gone. Always the last signal of a socket.
    Closed,
}

/// A [`SocketEvent`] tagged with the socket that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketSignal {
    /// Originating socket.
    pub socket: SocketId,
    /// What happened.
    pub event: SocketEvent,
}

/// Reporter handed to a socket task.
#[derive(Debug, Clone)]
pub struct SocketEvents {
    socket: SocketId,
    tx: mpsc::UnboundedSender<SocketSignal>,
}

impl SocketEvents {
    /// Creates a reporter for `socket` that forwards into `tx`.
    #[must_use]
    pub fn new(socket: SocketId, tx: mpsc::UnboundedSender<SocketSignal>) -> Self {
        Self { socket, tx }
    }

    /// Returns the socket this reporter is bound to.
    #[must_use]
    pub const fn socket(&self) -> SocketId {
        self.socket
    }

    fn emit(&self, event: SocketEvent) {
        // The manager may already be gone; nothing to report to then.
        let _ = self.tx.send(SocketSignal {
            socket: self.socket,
            event,
        });
    }

    /// Reports that the socket opened.
    pub fn opened(&self) {
        self.emit(SocketEvent::Opened);
    }

    /// Reports one inbound text frame.
    pub fn frame(&self, text: impl Into<String>) {
        self.emit(SocketEvent::Frame(text.into()));
    }

    /// Reports a socket failure.
    pub fn error(&self, reason: impl Into<String>) {
        self.emit(SocketEvent::Error(reason.into()));
    }

    /// Reports that the socket is gone.
    pub fn closed(&self) {
        self.emit(SocketEvent::Closed);
    }
}

/// Everything a transport needs to open one socket.
#[derive(Debug)]
pub struct SocketRequest {
    /// Identity assigned by the connection manager.
    pub socket: SocketId,
    /// Broker URL to connect to.
    pub url: String,
    /// Where to report lifecycle signals.
    pub events: SocketEvents,
}

/// Write side of an opened socket.
#[derive(Debug)]
pub struct SocketHandle {
    id: SocketId,
    outbound: mpsc::UnboundedSender<String>,
}

impl SocketHandle {
    /// Wraps the outbound text queue of socket `id`.
    #[must_use]
    pub fn new(id: SocketId, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self { id, outbound }
    }

    /// Returns the identity of this socket.
    #[must_use]
    pub const fn id(&self) -> SocketId {
        self.id
    }

    /// Queues one text frame. Returns `false` if the socket task is gone.
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }

    /// Releases the socket.
    pub fn close(self) {
        drop(self.outbound);
    }
}

/// Opens sockets to the broker.
pub trait Transport: fmt::Debug + Send + Sync + 'static {
    /// Starts opening a socket and returns its write side immediately. The
    /// outcome is reported through `request.events`.
    fn open(&self, request: SocketRequest) -> SocketHandle;
}
