//! Wire protocol: frame codec and connection states.

pub mod frame;
pub mod state;

pub use frame::{FrameCodec, InboundEvent, InboundFrame, OutboundFrame};
pub use state::ConnectionState;
