//! Connection management: the single-connection state machine and the
//! handle callers use to drive it.

pub mod connection_manager;

mod connection;
mod driver;

pub use connection_manager::{
    ConnectOutcome, ConnectionManager, ConnectionManagerBuilder, ConnectionSnapshot,
};
