//! Lifecycle of one scheduled entry: remind, start, end and display reload.
//!
//! Every operation holds its schedule channel's lock, re-reads the entry from
//! the store and then resolves the display message. A message that is gone for
//! good purges the entry and turns the call into a no-op; a lookup that keeps
//! failing is a no-op that leaves the entry for a later attempt.

use calbot_core::config::ChannelSettings;
use calbot_core::error::Result;
use calbot_core::types::{Announcement, Entry, EntryId, Fetch, MessageRef, Occurrence};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::audit;
use crate::context::EngineContext;

/// What a lifecycle call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The display message could not be resolved; nothing happened.
    Unresolved,
    /// Reminder sent to `delivered` destinations.
    Reminded { delivered: usize },
    Started,
    /// Repeating entry moved to its next occurrence.
    Advanced(Occurrence),
    /// Non-repeating entry finished and was removed.
    Ended,
    /// Display message re-rendered with this content.
    Reloaded(String),
}

/// An entry bound to the collaborators that act on it.
pub struct ScheduleEntry {
    entry: Entry,
    ctx: Arc<EngineContext>,
}

impl ScheduleEntry {
    pub fn new(entry: Entry, ctx: Arc<EngineContext>) -> Self {
        Self { entry, ctx }
    }

    /// Load an entry from the store.
    pub async fn load(id: EntryId, ctx: Arc<EngineContext>) -> Result<Option<Self>> {
        Ok(ctx.store.find(id).await?.map(|entry| Self::new(entry, ctx)))
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Send the reminder to every channel named like the reminder channel.
    pub async fn remind(&mut self) -> Result<Transition> {
        let _channel = self.lock_channel().await;
        if self.resolve().await?.is_none() {
            return Ok(Transition::Unresolved);
        }
        let settings = self.settings().await?;
        let now = self.ctx.now();
        let scheduled = self.entry.reminders.first().copied().unwrap_or(now);
        let delivered = self
            .announce(
                Announcement::Remind,
                &settings.reminder_channel,
                &settings.reminder_format,
                scheduled,
            )
            .await;
        tracing::info!("Entry {} reminded ({delivered} destinations)", self.entry.id);
        Ok(Transition::Reminded { delivered })
    }

    /// Announce the start. Instantaneous entries go straight to `end`.
    pub async fn start(&mut self) -> Result<Transition> {
        let _channel = self.lock_channel().await;
        let Some(message) = self.resolve().await? else {
            return Ok(Transition::Unresolved);
        };
        if self.entry.is_instantaneous() {
            return self.finish(message).await;
        }
        let settings = self.settings().await?;
        self.announce(
            Announcement::Start,
            &settings.announce_channel,
            &settings.announce_format,
            self.entry.start,
        )
        .await;

        let (id, start) = (self.entry.id, self.entry.start);
        self.ctx.store.set_started(id, true).await?;
        self.ctx.store.prune_reminders(id, start).await?;
        self.entry.has_started = true;
        self.entry.reminders.retain(|at| *at > start);
        tracing::info!("Entry {} started", self.entry.id);
        self.refresh_logged(&message, &settings).await;
        Ok(Transition::Started)
    }

    /// Announce the end, then advance a repeating entry or remove a one-off.
    pub async fn end(&mut self) -> Result<Transition> {
        let _channel = self.lock_channel().await;
        match self.resolve().await? {
            Some(message) => self.finish(message).await,
            None => Ok(Transition::Unresolved),
        }
    }

    /// Re-render the display message in place. Changes no state.
    pub async fn reload_display(&mut self) -> Result<Transition> {
        let _channel = self.lock_channel().await;
        let Some(message) = self.resolve().await? else {
            return Ok(Transition::Unresolved);
        };
        let settings = self.settings().await?;
        let content = self.refresh(&message, &settings).await?;
        Ok(Transition::Reloaded(content))
    }

    async fn finish(&mut self, message: MessageRef) -> Result<Transition> {
        let settings = self.settings().await?;
        self.announce(
            Announcement::End,
            &settings.announce_channel,
            &settings.announce_format,
            self.entry.end,
        )
        .await;

        let id = self.entry.id;
        match self.entry.next_occurrence(&settings.reminder_leads, self.ctx.now()) {
            Some(next) => {
                self.ctx.store.set_occurrence(id, &next).await?;
                self.entry.start = next.start;
                self.entry.end = next.end;
                self.entry.reminders = next.reminders.clone();
                self.entry.has_started = false;
                tracing::info!("Entry {id} ended, next occurrence at {}", next.start);

                self.refresh_logged(&message, &settings).await;
                if let Err(e) = self.ctx.ordering.resort(self.entry.channel_id()).await {
                    tracing::warn!("Resort of channel {} failed: {e}", self.entry.channel_id());
                }
                Ok(Transition::Advanced(next))
            }
            None => {
                self.ctx.store.delete(id).await?;
                if let Err(e) = self.ctx.sink.delete(&message).await {
                    tracing::warn!("Could not delete display message of entry {id}: {e}");
                }
                tracing::info!("Entry {id} ended and was removed");
                Ok(Transition::Ended)
            }
        }
    }

    async fn lock_channel(&self) -> tokio::sync::OwnedMutexGuard<()> {
        let channel_id = self.entry.channel_id().to_string();
        self.ctx.channel_locks.lock(&channel_id).await
    }

    /// Reload the entry, then look up its display message, retrying
    /// transient failures. Non-transient failures propagate.
    async fn resolve(&mut self) -> Result<Option<MessageRef>> {
        match self.ctx.store.find(self.entry.id).await? {
            Some(entry) => self.entry = entry,
            None => {
                tracing::debug!("Entry {} no longer stored, nothing to do", self.entry.id);
                return Ok(None);
            }
        }
        let lifecycle = &self.ctx.lifecycle;
        let mut attempt = 0;
        loop {
            match self.ctx.sink.fetch(&self.entry.message).await {
                Ok(Fetch::Found(message)) => return Ok(Some(message)),
                Ok(Fetch::Missing) => {
                    tracing::warn!(
                        "Display message of entry {} is gone, removing entry",
                        self.entry.id
                    );
                    self.ctx.store.delete(self.entry.id).await?;
                    return Ok(None);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt < lifecycle.fetch_retries => {
                    attempt += 1;
                    tracing::debug!(
                        "Fetch of entry {} display failed (attempt {attempt}): {e}",
                        self.entry.id
                    );
                    tokio::time::sleep(lifecycle.fetch_backoff() * attempt).await;
                }
                Err(e) => {
                    if lifecycle.purge_on_transient_fetch_error {
                        tracing::warn!("Fetch of entry {} display failed, removing entry: {e}", self.entry.id);
                        self.ctx.store.delete(self.entry.id).await?;
                    } else {
                        tracing::warn!("Fetch of entry {} display failed, skipping: {e}", self.entry.id);
                    }
                    return Ok(None);
                }
            }
        }
    }

    async fn settings(&self) -> Result<ChannelSettings> {
        self.ctx.settings.settings(self.entry.channel_id()).await
    }

    /// Render and deliver an announcement; returns how many destinations got it.
    /// Failures are logged and never abort the transition.
    async fn announce(
        &self,
        kind: Announcement,
        destination: &str,
        template: &str,
        scheduled: DateTime<Utc>,
    ) -> usize {
        let content = match self.ctx.renderer.announcement(kind, template, &self.entry, self.ctx.now()) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Could not render {kind} of entry {}: {e}", self.entry.id);
                return 0;
            }
        };
        let channels = match self
            .ctx
            .sink
            .channels_named(&self.entry.message.community_id, destination)
            .await
        {
            Ok(channels) => channels,
            Err(e) => {
                tracing::warn!("Could not list '{destination}' channels for entry {}: {e}", self.entry.id);
                return 0;
            }
        };
        if channels.is_empty() {
            tracing::debug!("No '{destination}' channel for {kind} of entry {}", self.entry.id);
        }

        let mut delivered = 0;
        for channel in channels {
            match self.ctx.sink.send(&channel, &content).await {
                Ok(delivery) => {
                    delivered += 1;
                    audit::check_delivery(&self.ctx, scheduled, &delivery).await;
                }
                Err(e) => tracing::warn!("{kind} of entry {} to {channel} failed: {e}", self.entry.id),
            }
        }
        delivered
    }

    async fn refresh(&self, message: &MessageRef, settings: &ChannelSettings) -> Result<String> {
        let content = self.ctx.renderer.display(&self.entry, settings, self.ctx.now())?;
        self.ctx.sink.edit(message, &content).await?;
        Ok(content)
    }

    async fn refresh_logged(&self, message: &MessageRef, settings: &ChannelSettings) {
        if let Err(e) = self.refresh(message, settings).await {
            tracing::warn!("Display refresh of entry {} failed: {e}", self.entry.id);
        }
    }
}
