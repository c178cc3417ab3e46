//! SQLite entry store.
//!
//! Each entry is a JSON document in `entries.doc`; community, channel and
//! message ids are mirrored into indexed columns for the bulk deletes.
//! Field updates go through `json_set` so only the named fields change.

use async_trait::async_trait;
use calbot_core::error::{CalbotError, Result};
use calbot_core::traits::EntryStore;
use calbot_core::types::{Entry, EntryId, MessageRef, Occurrence, RsvpAction, RsvpLists};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS entries (
        id INTEGER PRIMARY KEY,
        community_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        message_id TEXT NOT NULL,
        doc TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_entries_channel ON entries(channel_id);
    CREATE INDEX IF NOT EXISTS idx_entries_community ON entries(community_id);
    CREATE INDEX IF NOT EXISTS idx_entries_message ON entries(message_id);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> CalbotError {
    CalbotError::Store(e.to_string())
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> CalbotError {
    CalbotError::Store(e.to_string())
}

fn decode(doc: &str) -> Result<Entry> {
    let mut entry: Entry = serde_json::from_str(doc)
        .map_err(|e| CalbotError::invalid_entry(format!("undecodable entry document: {e}")))?;
    entry.rsvp.normalize();
    entry.validate()?;
    Ok(entry)
}

fn json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        tracing::debug!("Entry store ready");
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn query_entries(&self, sql: &str, param: Option<&str>) -> Result<Vec<Entry>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(param.iter()), |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            let doc = row.map_err(db_err)?;
            match decode(&doc) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping stored entry: {e}"),
            }
        }
        Ok(entries)
    }

    /// Read-modify-write of one entry inside an immediate transaction.
    fn modify<T>(&self, id: EntryId, f: impl FnOnce(&mut Entry) -> T) -> Result<Option<(T, Entry)>> {
        let mut conn = self.conn.lock().map_err(lock_err)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let doc: Option<String> = tx
            .query_row("SELECT doc FROM entries WHERE id = ?1", params![id.0], |row| row.get(0))
            .optional()
            .map_err(db_err)?;
        let Some(doc) = doc else {
            return Ok(None);
        };
        let mut entry = decode(&doc)?;
        let out = f(&mut entry);
        tx.execute(
            "UPDATE entries SET doc = json_set(doc, '$.rsvp_yes', json(?2), '$.rsvp_no', json(?3), '$.reminders', json(?4)) WHERE id = ?1",
            params![id.0, json(&entry.rsvp.yes)?, json(&entry.rsvp.no)?, json(&entry.reminders)?],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(Some((out, entry)))
    }
}

#[async_trait]
impl EntryStore for SqliteStore {
    fn name(&self) -> &str { "sqlite" }

    async fn find(&self, id: EntryId) -> Result<Option<Entry>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM entries WHERE id = ?1", params![id.0], |row| row.get(0))
            .optional()
            .map_err(db_err)?;
        doc.as_deref().map(decode).transpose()
    }

    async fn upsert(&self, entry: &Entry) -> Result<()> {
        entry.validate()?;
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.execute(
            "INSERT OR REPLACE INTO entries (id, community_id, channel_id, message_id, doc) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id.0,
                entry.message.community_id,
                entry.message.channel_id,
                entry.message.message_id,
                json(entry)?,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete(&self, id: EntryId) -> Result<()> {
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.execute("DELETE FROM entries WHERE id = ?1", params![id.0])
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_all_for_channel(&self, channel_id: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.execute("DELETE FROM entries WHERE channel_id = ?1", params![channel_id])
            .map_err(db_err)
    }

    async fn delete_all_for_community(&self, community_id: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.execute("DELETE FROM entries WHERE community_id = ?1", params![community_id])
            .map_err(db_err)
    }

    async fn delete_by_message(&self, message_id: &str) -> Result<Option<EntryId>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let id: Option<u32> = conn
            .query_row(
                "DELETE FROM entries WHERE message_id = ?1 RETURNING id",
                params![message_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(id.map(EntryId))
    }

    async fn find_by_message(&self, message_id: &str) -> Result<Option<Entry>> {
        Ok(self
            .query_entries("SELECT doc FROM entries WHERE message_id = ?1", Some(message_id))?
            .into_iter()
            .next())
    }

    async fn list(&self) -> Result<Vec<Entry>> {
        self.query_entries("SELECT doc FROM entries ORDER BY id", None)
    }

    async fn list_for_channel(&self, channel_id: &str) -> Result<Vec<Entry>> {
        self.query_entries(
            "SELECT doc FROM entries WHERE channel_id = ?1 ORDER BY id",
            Some(channel_id),
        )
    }

    async fn set_started(&self, id: EntryId, started: bool) -> Result<()> {
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.execute(
            "UPDATE entries SET doc = json_set(doc, '$.has_started', json(?2)) WHERE id = ?1",
            params![id.0, if started { "true" } else { "false" }],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn set_messages(&self, moves: &[(EntryId, MessageRef)]) -> Result<()> {
        let mut conn = self.conn.lock().map_err(lock_err)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        for (id, message) in moves {
            tx.execute(
                "UPDATE entries SET community_id = ?2, channel_id = ?3, message_id = ?4,
                     doc = json_set(doc, '$.community_id', ?2, '$.channel_id', ?3, '$.message_id', ?4)
                 WHERE id = ?1",
                params![id.0, message.community_id, message.channel_id, message.message_id],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)
    }

    async fn set_occurrence(&self, id: EntryId, occurrence: &Occurrence) -> Result<()> {
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.execute(
            "UPDATE entries SET doc = json_set(doc,
                 '$.start', json(?2), '$.end', json(?3), '$.reminders', json(?4), '$.has_started', json('false'))
             WHERE id = ?1",
            params![
                id.0,
                json(&occurrence.start)?,
                json(&occurrence.end)?,
                json(&occurrence.reminders)?,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn prune_reminders(&self, id: EntryId, through: DateTime<Utc>) -> Result<()> {
        self.modify(id, |entry| entry.reminders.retain(|at| *at > through))?;
        Ok(())
    }

    async fn apply_rsvp(
        &self,
        id: EntryId,
        participant: &str,
        action: RsvpAction,
    ) -> Result<Option<RsvpLists>> {
        Ok(self
            .modify(id, |entry| entry.rsvp.apply(action, participant))?
            .map(|(_, entry)| entry.rsvp))
    }
}
