//! Chat platform contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Delivery, Fetch, MessageRef};

/// Delivers, edits and removes messages on the chat platform.
///
/// Calls are network round-trips; callers never hold entry state locks across them.
#[async_trait]
pub trait MessageSink: Send + Sync {
    fn name(&self) -> &str;

    /// Look up a display message. `Ok(Fetch::Missing)` means it is gone for
    /// good; `Err` means the lookup itself failed.
    async fn fetch(&self, message: &MessageRef) -> Result<Fetch>;

    /// Text channels in `community_id` whose name matches `name`, ignoring case.
    async fn channels_named(&self, community_id: &str, name: &str) -> Result<Vec<String>>;

    async fn send(&self, channel_id: &str, content: &str) -> Result<Delivery>;

    async fn edit(&self, message: &MessageRef, content: &str) -> Result<()>;

    async fn delete(&self, message: &MessageRef) -> Result<()>;

    /// Private message to a single user.
    async fn send_direct(&self, user_id: &str, content: &str) -> Result<Delivery>;

    async fn remove_reaction(&self, message: &MessageRef, emoji: &str, user_id: &str) -> Result<()>;
}
