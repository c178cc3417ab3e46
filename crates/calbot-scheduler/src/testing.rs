//! In-process fakes for the engine's collaborators.

use async_trait::async_trait;
use calbot_core::config::{CalbotConfig, ChannelSettings};
use calbot_core::error::{CalbotError, Result};
use calbot_core::traits::{ChannelSettingsProvider, EntryStore, MessageSink, Renderer, ScheduleOrdering};
use calbot_core::types::{Announcement, Delivery, Entry, EntryId, Fetch, MessageRef};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::context::{ChannelLocks, Clock, EngineContext};
use crate::ordering::DisplayOrdering;

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().expect("valid date")
}

pub fn entry(id: u32, start: DateTime<Utc>, end: DateTime<Utc>) -> Entry {
    Entry::new(
        EntryId(id),
        format!("event {id}"),
        start,
        end,
        chrono_tz::Tz::UTC,
        MessageRef::new("g1", "sched", format!("{}", 1000 + id)),
    )
    .expect("valid entry")
}

/// What the next `fetch` should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Found,
    Missing,
    /// Transient network error.
    Fail,
    /// Credentials rejected.
    Refused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub channel_id: String,
    pub content: String,
}

/// Sink that records every call. Fetches answer `Found` for messages it has
/// not deleted, unless queued otherwise.
#[derive(Default)]
pub struct RecordingSink {
    pub fetch_queue: Mutex<VecDeque<FetchOutcome>>,
    pub fetches: AtomicUsize,
    pub sent: Mutex<Vec<Sent>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
    pub deleted: Mutex<Vec<MessageRef>>,
    pub direct: Mutex<Vec<(String, String)>>,
    pub removed_reactions: Mutex<Vec<(String, String, String)>>,
    /// Overrides the delivery timestamp reported by `send`.
    pub delivered_at: Mutex<Option<DateTime<Utc>>>,
}

impl RecordingSink {
    pub fn queue_fetch(&self, outcome: FetchOutcome) {
        self.fetch_queue.lock().expect("lock").push_back(outcome);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("lock").clone()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().expect("lock").clone()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().expect("lock").clone()
    }

    pub fn direct(&self) -> Vec<(String, String)> {
        self.direct.lock().expect("lock").clone()
    }

    fn delivery(&self, channel_id: &str) -> Delivery {
        let delivered_at = self.delivered_at.lock().expect("lock").unwrap_or_else(Utc::now);
        Delivery {
            channel_id: channel_id.to_string(),
            message_id: "sent".into(),
            delivered_at,
        }
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    fn name(&self) -> &str { "recording" }

    async fn fetch(&self, message: &MessageRef) -> Result<Fetch> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .fetch_queue
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| {
                if self.deleted().contains(message) {
                    FetchOutcome::Missing
                } else {
                    FetchOutcome::Found
                }
            });
        match outcome {
            FetchOutcome::Found => Ok(Fetch::Found(message.clone())),
            FetchOutcome::Missing => Ok(Fetch::Missing),
            FetchOutcome::Fail => Err(CalbotError::Http("connection reset".into())),
            FetchOutcome::Refused => Err(CalbotError::AuthFailed("401".into())),
        }
    }

    async fn channels_named(&self, _community_id: &str, name: &str) -> Result<Vec<String>> {
        Ok(vec![format!("#{name}")])
    }

    async fn send(&self, channel_id: &str, content: &str) -> Result<Delivery> {
        self.sent.lock().expect("lock").push(Sent {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
        });
        Ok(self.delivery(channel_id))
    }

    async fn edit(&self, message: &MessageRef, content: &str) -> Result<()> {
        self.edits.lock().expect("lock").push((message.clone(), content.to_string()));
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<()> {
        self.deleted.lock().expect("lock").push(message.clone());
        Ok(())
    }

    async fn send_direct(&self, user_id: &str, content: &str) -> Result<Delivery> {
        self.direct.lock().expect("lock").push((user_id.to_string(), content.to_string()));
        Ok(self.delivery(user_id))
    }

    async fn remove_reaction(&self, message: &MessageRef, emoji: &str, user_id: &str) -> Result<()> {
        self.removed_reactions.lock().expect("lock").push((
            message.message_id.clone(),
            emoji.to_string(),
            user_id.to_string(),
        ));
        Ok(())
    }
}

pub struct FixedClock(pub Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().expect("lock") = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().expect("lock")
    }
}

#[derive(Default)]
pub struct CountingOrdering {
    pub calls: Mutex<Vec<String>>,
}

impl CountingOrdering {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ScheduleOrdering for CountingOrdering {
    async fn resort(&self, channel_id: &str) -> Result<()> {
        self.calls.lock().expect("lock").push(channel_id.to_string());
        Ok(())
    }
}

/// Deterministic renderer: output depends only on its inputs.
pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn announcement(&self, kind: Announcement, template: &str, entry: &Entry, _now: DateTime<Utc>) -> Result<String> {
        Ok(format!("[{kind}] {template} {}", entry.title))
    }

    fn display(&self, entry: &Entry, _settings: &ChannelSettings, now: DateTime<Utc>) -> Result<String> {
        Ok(format!(
            "{} @ {} (started: {}) yes={} no={} now={}",
            entry.title,
            entry.start,
            entry.has_started,
            entry.rsvp.yes.len(),
            entry.rsvp.no.len(),
            now.format("%H:%M"),
        ))
    }
}

pub struct Harness {
    pub store: Arc<dyn EntryStore>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<FixedClock>,
    pub ordering: Arc<CountingOrdering>,
    pub ctx: Arc<EngineContext>,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_config(now, CalbotConfig::default())
    }

    pub fn with_config(now: DateTime<Utc>, config: CalbotConfig) -> Self {
        Self::assemble(now, config, false)
    }

    /// Wired to the real display ordering instead of the counting one.
    pub fn with_display_ordering(now: DateTime<Utc>) -> Self {
        Self::assemble(now, CalbotConfig::default(), true)
    }

    fn assemble(now: DateTime<Utc>, mut config: CalbotConfig, display_ordering: bool) -> Self {
        config.bot.admin_id = "operator".into();
        config.lifecycle.fetch_backoff_ms = 1;
        let store: Arc<dyn EntryStore> = Arc::new(calbot_store::MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        *sink.delivered_at.lock().expect("lock") = Some(now);
        let clock = Arc::new(FixedClock::at(now));
        let renderer: Arc<dyn Renderer> = Arc::new(PlainRenderer);
        let lifecycle = config.lifecycle.clone();
        let operator_id = config.bot.admin_id.clone();
        let settings: Arc<dyn ChannelSettingsProvider> = Arc::new(config);
        let counting = Arc::new(CountingOrdering::default());
        let ordering: Arc<dyn ScheduleOrdering> = if display_ordering {
            Arc::new(DisplayOrdering::new(
                store.clone(),
                sink.clone(),
                renderer.clone(),
                settings.clone(),
                clock.clone(),
            ))
        } else {
            counting.clone()
        };
        let ctx = Arc::new(EngineContext {
            store: store.clone(),
            sink: sink.clone(),
            renderer,
            settings,
            ordering,
            clock: clock.clone(),
            lifecycle,
            operator_id,
            bot_id: "bot".into(),
            channel_locks: ChannelLocks::default(),
        });
        Self { store, sink, clock, ordering: counting, ctx }
    }

    pub async fn insert(&self, entry: &Entry) {
        self.store.upsert(entry).await.expect("upsert");
    }

    pub async fn stored(&self, id: u32) -> Option<Entry> {
        self.store.find(EntryId(id)).await.expect("find")
    }
}
