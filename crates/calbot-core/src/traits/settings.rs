//! Channel settings and schedule ordering contracts.

use async_trait::async_trait;

use crate::config::{CalbotConfig, ChannelSettings};
use crate::error::Result;

/// Per-channel schedule configuration.
#[async_trait]
pub trait ChannelSettingsProvider: Send + Sync {
    async fn settings(&self, channel_id: &str) -> Result<ChannelSettings>;
}

#[async_trait]
impl ChannelSettingsProvider for CalbotConfig {
    async fn settings(&self, channel_id: &str) -> Result<ChannelSettings> {
        Ok(self.channel_settings(channel_id))
    }
}

/// Notified when an entry's start changed so the channel's display order
/// can be recomputed.
#[async_trait]
pub trait ScheduleOrdering: Send + Sync {
    async fn resort(&self, channel_id: &str) -> Result<()>;
}
