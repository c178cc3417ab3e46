//! Platform adapters for calbot.
//!
//! - `discord`: REST message sink and Gateway event stream
//! - `render`: plain-text announcement and display rendering

pub mod discord;
pub mod render;

pub use discord::{DiscordGateway, DiscordSink, GatewayStream};
pub use render::TextRenderer;
