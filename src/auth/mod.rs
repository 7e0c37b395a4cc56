//! Auth handshake: bearer token sources and the channel authorizer.

pub mod authorizer;
pub mod http_client;
pub mod token;

pub use authorizer::{AuthRequest, Authorizer, ChannelAuth};
pub use http_client::HttpAuthClient;
pub use token::{SharedToken, StaticToken, TokenProvider};
