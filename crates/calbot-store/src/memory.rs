//! In-process entry store.

use async_trait::async_trait;
use calbot_core::error::Result;
use calbot_core::traits::EntryStore;
use calbot_core::types::{Entry, EntryId, MessageRef, Occurrence, RsvpAction, RsvpLists};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Entries kept in a map behind one lock; every call is a single critical
/// section, so RSVP edits never lose updates.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<EntryId, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    fn name(&self) -> &str { "memory" }

    async fn find(&self, id: EntryId) -> Result<Option<Entry>> {
        Ok(self.entries.lock().await.get(&id).cloned())
    }

    async fn upsert(&self, entry: &Entry) -> Result<()> {
        entry.validate()?;
        self.entries.lock().await.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn delete(&self, id: EntryId) -> Result<()> {
        self.entries.lock().await.remove(&id);
        Ok(())
    }

    async fn delete_all_for_channel(&self, channel_id: &str) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.message.channel_id != channel_id);
        Ok(before - entries.len())
    }

    async fn delete_all_for_community(&self, community_id: &str) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.message.community_id != community_id);
        Ok(before - entries.len())
    }

    async fn delete_by_message(&self, message_id: &str) -> Result<Option<EntryId>> {
        let mut entries = self.entries.lock().await;
        let id = entries
            .values()
            .find(|e| e.message.message_id == message_id)
            .map(|e| e.id);
        if let Some(id) = id {
            entries.remove(&id);
        }
        Ok(id)
    }

    async fn find_by_message(&self, message_id: &str) -> Result<Option<Entry>> {
        Ok(self
            .entries
            .lock()
            .await
            .values()
            .find(|e| e.message.message_id == message_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Entry>> {
        Ok(self.entries.lock().await.values().cloned().collect())
    }

    async fn list_for_channel(&self, channel_id: &str) -> Result<Vec<Entry>> {
        Ok(self
            .entries
            .lock()
            .await
            .values()
            .filter(|e| e.message.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn set_started(&self, id: EntryId, started: bool) -> Result<()> {
        if let Some(entry) = self.entries.lock().await.get_mut(&id) {
            entry.has_started = started;
        }
        Ok(())
    }

    async fn set_messages(&self, moves: &[(EntryId, MessageRef)]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        for (id, message) in moves {
            if let Some(entry) = entries.get_mut(id) {
                entry.message = message.clone();
            }
        }
        Ok(())
    }

    async fn set_occurrence(&self, id: EntryId, occurrence: &Occurrence) -> Result<()> {
        if let Some(entry) = self.entries.lock().await.get_mut(&id) {
            entry.start = occurrence.start;
            entry.end = occurrence.end;
            entry.reminders = occurrence.reminders.clone();
            entry.has_started = false;
        }
        Ok(())
    }

    async fn prune_reminders(&self, id: EntryId, through: DateTime<Utc>) -> Result<()> {
        if let Some(entry) = self.entries.lock().await.get_mut(&id) {
            entry.reminders.retain(|at| *at > through);
        }
        Ok(())
    }

    async fn apply_rsvp(
        &self,
        id: EntryId,
        participant: &str,
        action: RsvpAction,
    ) -> Result<Option<RsvpLists>> {
        let mut entries = self.entries.lock().await;
        Ok(entries.get_mut(&id).map(|entry| {
            entry.rsvp.apply(action, participant);
            entry.rsvp.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn entry(id: u32, channel: &str, message: &str) -> Entry {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).single().expect("date");
        Entry::new(
            EntryId(id),
            format!("event {id}"),
            start,
            start + chrono::Duration::hours(1),
            chrono_tz::Tz::UTC,
            MessageRef::new("g1", channel, message),
        )
        .expect("entry")
    }

    #[tokio::test]
    async fn test_upsert_find_delete() {
        let store = MemoryStore::new();
        store.upsert(&entry(1, "c1", "m1")).await.expect("upsert");
        assert!(store.find(EntryId(1)).await.expect("find").is_some());
        store.delete(EntryId(1)).await.expect("delete");
        assert!(store.find(EntryId(1)).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn test_channel_and_message_deletes() {
        let store = MemoryStore::new();
        store.upsert(&entry(1, "c1", "m1")).await.expect("upsert");
        store.upsert(&entry(2, "c1", "m2")).await.expect("upsert");
        store.upsert(&entry(3, "c2", "m3")).await.expect("upsert");

        assert_eq!(store.delete_by_message("m3").await.expect("delete"), Some(EntryId(3)));
        assert_eq!(store.delete_by_message("m3").await.expect("delete"), None);
        assert_eq!(store.delete_all_for_channel("c1").await.expect("delete"), 2);
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_rsvp_edits_keep_every_participant() {
        let store = Arc::new(MemoryStore::new());
        store.upsert(&entry(1, "c1", "m1")).await.expect("upsert");

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .apply_rsvp(EntryId(1), &format!("user{i}"), RsvpAction::Attending)
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("rsvp");
        }
        let stored = store.find(EntryId(1)).await.expect("find").expect("present");
        assert_eq!(stored.rsvp.yes.len(), 50);
    }

    #[tokio::test]
    async fn test_set_messages_swaps_displays() {
        let store = MemoryStore::new();
        store.upsert(&entry(1, "c1", "m1")).await.expect("upsert");
        store.upsert(&entry(2, "c1", "m2")).await.expect("upsert");
        store
            .set_messages(&[
                (EntryId(1), MessageRef::new("g1", "c1", "m2")),
                (EntryId(2), MessageRef::new("g1", "c1", "m1")),
            ])
            .await
            .expect("swap");
        let first = store.find_by_message("m1").await.expect("find").expect("present");
        assert_eq!(first.id, EntryId(2));
    }

    #[tokio::test]
    async fn test_rsvp_on_missing_entry() {
        let store = MemoryStore::new();
        let result = store.apply_rsvp(EntryId(9), "u", RsvpAction::Clear).await.expect("rsvp");
        assert!(result.is_none());
    }
}
