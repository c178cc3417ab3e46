//! Entry persistence contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Entry, EntryId, MessageRef, Occurrence, RsvpAction, RsvpLists};

/// Document store holding one record per entry.
///
/// Every update touches only the named fields of a single record.
#[async_trait]
pub trait EntryStore: Send + Sync {
    fn name(&self) -> &str;

    async fn find(&self, id: EntryId) -> Result<Option<Entry>>;

    /// Insert or fully replace an entry. Invalid entries are rejected.
    async fn upsert(&self, entry: &Entry) -> Result<()>;

    async fn delete(&self, id: EntryId) -> Result<()>;

    /// Remove every entry of a schedule channel; returns how many were removed.
    async fn delete_all_for_channel(&self, channel_id: &str) -> Result<usize>;

    async fn delete_all_for_community(&self, community_id: &str) -> Result<usize>;

    /// Remove the entry displayed by `message_id`, if any.
    async fn delete_by_message(&self, message_id: &str) -> Result<Option<EntryId>>;

    async fn find_by_message(&self, message_id: &str) -> Result<Option<Entry>>;

    async fn list(&self) -> Result<Vec<Entry>>;

    async fn list_for_channel(&self, channel_id: &str) -> Result<Vec<Entry>>;

    async fn set_started(&self, id: EntryId, started: bool) -> Result<()>;

    /// Rebind entries to display messages, all or nothing.
    async fn set_messages(&self, moves: &[(EntryId, MessageRef)]) -> Result<()>;

    /// Move an entry to its next occurrence and clear the started flag.
    async fn set_occurrence(&self, id: EntryId, occurrence: &Occurrence) -> Result<()>;

    /// Drop pending reminders at or before `through`.
    async fn prune_reminders(&self, id: EntryId, through: DateTime<Utc>) -> Result<()>;

    /// Atomically apply an RSVP edit against the stored lists.
    ///
    /// Returns the lists after the edit, or `None` if the entry is gone.
    async fn apply_rsvp(
        &self,
        id: EntryId,
        participant: &str,
        action: RsvpAction,
    ) -> Result<Option<RsvpLists>>;
}
