//! RSVP edits triggered by participants.

use calbot_core::error::Result;
use calbot_core::types::{EntryId, RsvpAction, RsvpLists};
use std::sync::Arc;

use crate::context::EngineContext;
use crate::entry::ScheduleEntry;

/// Applies RSVP edits atomically in the store and keeps the display tally current.
pub struct RsvpService {
    ctx: Arc<EngineContext>,
}

impl RsvpService {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub async fn mark_attending(&self, id: EntryId, participant: &str) -> Result<Option<RsvpLists>> {
        self.apply(id, participant, RsvpAction::Attending).await
    }

    pub async fn mark_not_attending(&self, id: EntryId, participant: &str) -> Result<Option<RsvpLists>> {
        self.apply(id, participant, RsvpAction::NotAttending).await
    }

    pub async fn clear(&self, id: EntryId, participant: &str) -> Result<Option<RsvpLists>> {
        self.apply(id, participant, RsvpAction::Clear).await
    }

    /// Apply one edit. `None` if the entry no longer exists.
    pub async fn apply(
        &self,
        id: EntryId,
        participant: &str,
        action: RsvpAction,
    ) -> Result<Option<RsvpLists>> {
        let Some(lists) = self.ctx.store.apply_rsvp(id, participant, action).await? else {
            tracing::debug!("RSVP for unknown entry {id} ignored");
            return Ok(None);
        };
        tracing::info!(
            "Entry {id}: {participant} -> {action} ({} yes, {} no)",
            lists.yes.len(),
            lists.no.len()
        );

        if let Some(mut entry) = ScheduleEntry::load(id, self.ctx.clone()).await? {
            if let Err(e) = entry.reload_display().await {
                tracing::warn!("Display reload after RSVP on entry {id} failed: {e}");
            }
        }
        Ok(Some(lists))
    }
}
