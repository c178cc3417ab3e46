//! Explicit collaborator bundle handed to every lifecycle component.

use calbot_core::config::LifecycleConfig;
use calbot_core::traits::{ChannelSettingsProvider, EntryStore, MessageSink, Renderer, ScheduleOrdering};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Source of "now" for the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One async lock per schedule channel.
///
/// Anything that reads an entry's display message and then acts on it holds
/// the channel's lock for the whole operation, so a resort cannot move
/// messages underneath it.
#[derive(Default)]
pub struct ChannelLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChannelLocks {
    pub async fn lock(&self, channel_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            // Unused locks are only referenced by the map
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(channel_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Everything the lifecycle engine talks to.
pub struct EngineContext {
    pub store: Arc<dyn EntryStore>,
    pub sink: Arc<dyn MessageSink>,
    pub renderer: Arc<dyn Renderer>,
    pub settings: Arc<dyn ChannelSettingsProvider>,
    pub ordering: Arc<dyn ScheduleOrdering>,
    pub clock: Arc<dyn Clock>,
    pub lifecycle: LifecycleConfig,
    /// Receives late-delivery alerts. Empty disables them.
    pub operator_id: String,
    /// The bot's own user; its messages in schedule channels are kept.
    pub bot_id: String,
    pub channel_locks: ChannelLocks,
}

impl EngineContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
