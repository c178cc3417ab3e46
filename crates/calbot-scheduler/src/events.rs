//! Routes chat platform events into store and RSVP operations.

use calbot_core::config::ChannelSettings;
use calbot_core::error::Result;
use calbot_core::types::{EntryId, MessageRef, PlatformEvent, RsvpAction};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::context::EngineContext;
use crate::rsvp::RsvpService;

/// What handling an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Rsvp { entry: EntryId, action: RsvpAction },
    /// Reaction dropped by the per-user cooldown.
    Throttled,
    /// Event does not concern any schedule.
    Ignored,
    EntryRemoved(EntryId),
    /// Someone else's message deleted from a schedule channel.
    MessageRemoved,
    ChannelCleared(usize),
    CommunityCleared(usize),
}

/// Per-user cooldown between handled reactions.
pub struct ReactionLimiter {
    cooldown: Duration,
    last_seen: Mutex<HashMap<String, Instant>>,
}

impl ReactionLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// True if `user_id` acted within the cooldown. Otherwise records `now`.
    pub fn is_on_cooldown(&self, user_id: &str, now: Instant) -> bool {
        let mut last_seen = self.last_seen.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(at) = last_seen.get(user_id) {
            if now.saturating_duration_since(*at) < self.cooldown {
                return true;
            }
        }
        last_seen.retain(|_, at| now.saturating_duration_since(*at) < self.cooldown);
        last_seen.insert(user_id.to_string(), now);
        false
    }
}

/// Map a reaction glyph to an RSVP action using the channel's emoji.
pub fn rsvp_action(settings: &ChannelSettings, emoji: &str) -> Option<RsvpAction> {
    let matches = |glyph: &Option<String>| glyph.as_deref() == Some(emoji);
    if matches(&settings.yes_emoji) {
        Some(RsvpAction::Attending)
    } else if matches(&settings.no_emoji) {
        Some(RsvpAction::NotAttending)
    } else if matches(&settings.clear_emoji) {
        Some(RsvpAction::Clear)
    } else {
        None
    }
}

pub struct EventRouter {
    ctx: Arc<EngineContext>,
    rsvp: RsvpService,
    limiter: ReactionLimiter,
}

impl EventRouter {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let limiter = ReactionLimiter::new(ctx.lifecycle.reaction_cooldown());
        Self {
            rsvp: RsvpService::new(ctx.clone()),
            ctx,
            limiter,
        }
    }

    pub async fn handle(&self, event: PlatformEvent) -> Result<EventOutcome> {
        tracing::debug!("Platform event: {}", event.kind());
        match event {
            PlatformEvent::MessageCreated { message, author_id } => {
                self.on_message(message, &author_id).await
            }
            PlatformEvent::ReactionAdded { message, user_id, emoji } => {
                self.on_reaction(message, &user_id, &emoji).await
            }
            PlatformEvent::MessageDeleted { message_id, .. } => {
                match self.ctx.store.delete_by_message(&message_id).await? {
                    Some(id) => {
                        tracing::info!("Display message {message_id} deleted, removed entry {id}");
                        Ok(EventOutcome::EntryRemoved(id))
                    }
                    None => Ok(EventOutcome::Ignored),
                }
            }
            PlatformEvent::ChannelDeleted { channel_id } => {
                let removed = self.ctx.store.delete_all_for_channel(&channel_id).await?;
                if removed > 0 {
                    tracing::info!("Channel {channel_id} deleted, removed {removed} entries");
                }
                Ok(EventOutcome::ChannelCleared(removed))
            }
            PlatformEvent::CommunityLeft { community_id } => {
                let removed = self.ctx.store.delete_all_for_community(&community_id).await?;
                tracing::info!("Left community {community_id}, removed {removed} entries");
                Ok(EventOutcome::CommunityCleared(removed))
            }
        }
    }

    /// Schedule channels hold only the bot's display messages.
    async fn on_message(&self, message: MessageRef, author_id: &str) -> Result<EventOutcome> {
        if author_id == self.ctx.bot_id {
            return Ok(EventOutcome::Ignored);
        }
        if self.ctx.store.list_for_channel(&message.channel_id).await?.is_empty() {
            return Ok(EventOutcome::Ignored);
        }
        self.ctx.sink.delete(&message).await?;
        tracing::debug!(
            "Removed message {} of {author_id} from schedule channel {}",
            message.message_id,
            message.channel_id
        );
        Ok(EventOutcome::MessageRemoved)
    }

    async fn on_reaction(&self, message: MessageRef, user_id: &str, emoji: &str) -> Result<EventOutcome> {
        if self.limiter.is_on_cooldown(user_id, Instant::now()) {
            return Ok(EventOutcome::Throttled);
        }
        let settings = self.ctx.settings.settings(&message.channel_id).await?;
        if !settings.rsvp_enabled {
            return Ok(EventOutcome::Ignored);
        }
        let Some(entry) = self.ctx.store.find_by_message(&message.message_id).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let Some(action) = rsvp_action(&settings, emoji) else {
            return Ok(EventOutcome::Ignored);
        };

        self.rsvp.apply(entry.id, user_id, action).await?;
        if let Err(e) = self.ctx.sink.remove_reaction(&message, emoji, user_id).await {
            tracing::warn!("Could not remove reaction of {user_id} on entry {}: {e}", entry.id);
        }
        Ok(EventOutcome::Rsvp { entry: entry.id, action })
    }
}
