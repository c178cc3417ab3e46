//! Display ordering of a schedule channel.
//!
//! A channel shows one display message per entry. After a start instant
//! changes, entries are redistributed over the existing messages so the
//! earliest event sits in the oldest message. Callers hold the channel's
//! lock; the rebinding itself is a single store write.

use async_trait::async_trait;
use calbot_core::error::Result;
use calbot_core::traits::{ChannelSettingsProvider, EntryStore, MessageSink, Renderer, ScheduleOrdering};
use calbot_core::types::{Entry, EntryId, MessageRef};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::context::Clock;

pub struct DisplayOrdering {
    store: Arc<dyn EntryStore>,
    sink: Arc<dyn MessageSink>,
    renderer: Arc<dyn Renderer>,
    settings: Arc<dyn ChannelSettingsProvider>,
    clock: Arc<dyn Clock>,
}

impl DisplayOrdering {
    pub fn new(
        store: Arc<dyn EntryStore>,
        sink: Arc<dyn MessageSink>,
        renderer: Arc<dyn Renderer>,
        settings: Arc<dyn ChannelSettingsProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, sink, renderer, settings, clock }
    }
}

/// Platform message ids are snowflakes: numerically larger is newer.
fn message_order(a: &MessageRef, b: &MessageRef) -> Ordering {
    match (a.message_id.parse::<u64>(), b.message_id.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.message_id.cmp(&b.message_id),
    }
}

#[async_trait]
impl ScheduleOrdering for DisplayOrdering {
    async fn resort(&self, channel_id: &str) -> Result<()> {
        let mut entries = self.store.list_for_channel(channel_id).await?;
        if entries.len() < 2 {
            return Ok(());
        }
        let mut messages: Vec<MessageRef> = entries.iter().map(|e| e.message.clone()).collect();
        messages.sort_by(message_order);
        entries.sort_by_key(|e| (e.start, e.id));

        let mut moved: Vec<Entry> = Vec::new();
        for (mut entry, message) in entries.into_iter().zip(messages) {
            if entry.message != message {
                entry.message = message;
                moved.push(entry);
            }
        }
        if moved.is_empty() {
            return Ok(());
        }
        let moves: Vec<(EntryId, MessageRef)> = moved.iter().map(|e| (e.id, e.message.clone())).collect();
        self.store.set_messages(&moves).await?;
        tracing::info!("Channel {channel_id}: {} entries moved to keep start order", moved.len());

        let settings = self.settings.settings(channel_id).await?;
        let now = self.clock.now();
        for entry in &moved {
            let content = self.renderer.display(entry, &settings, now)?;
            if let Err(e) = self.sink.edit(&entry.message, &content).await {
                tracing::warn!("Could not redraw entry {} after resort: {e}", entry.id);
            }
        }
        Ok(())
    }
}
