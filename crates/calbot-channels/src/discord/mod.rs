//! Discord Bot adapter: REST API for messages, Gateway WebSocket for events.

pub mod gateway;
pub mod rest;

pub use gateway::{DiscordGateway, GatewayStream, parse_event};
pub use rest::DiscordSink;
