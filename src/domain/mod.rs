//! Domain layer: identifiers, events, presence state and the event bus.
//!
//! These types carry no I/O. The connection manager owns the write side of
//! the presence tracker and publishes through the event bus; application
//! code only reads.

pub mod conversation_id;
pub mod event_bus;
pub mod member_id;
pub mod presence;
pub mod realtime_event;

pub use conversation_id::ConversationId;
pub use event_bus::{EventBus, Subscription};
pub use member_id::MemberId;
pub use presence::{PresenceTracker, PresenceView};
pub use realtime_event::{EventKind, RealtimeEvent};
