//! Lifecycle driver. Polls the store and fires due transitions.

use calbot_core::error::Result;
use calbot_core::types::{Due, Entry, EntryId};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::context::EngineContext;
use crate::entry::{ScheduleEntry, Transition};

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reminded: usize,
    pub started: usize,
    pub advanced: usize,
    pub ended: usize,
    pub refreshed: usize,
    pub unresolved: usize,
    /// Entries already being processed by another tick.
    pub skipped: usize,
    pub failed: usize,
}

impl TickReport {
    /// Nothing beyond routine display refreshes happened.
    pub fn is_quiet(&self) -> bool {
        self.reminded + self.started + self.advanced + self.ended + self.unresolved + self.failed == 0
    }

    fn record(&mut self, transition: &Transition) {
        match transition {
            Transition::Unresolved => self.unresolved += 1,
            Transition::Reminded { .. } => self.reminded += 1,
            Transition::Started => self.started += 1,
            Transition::Advanced(_) => self.advanced += 1,
            Transition::Ended => self.ended += 1,
            Transition::Reloaded(_) => self.refreshed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Transition(Due),
    Refresh,
}

enum JobResult {
    Done(Transition),
    Skipped,
    Failed,
}

/// Decides which entries are due and runs them on a
/// bounded number of concurrent workers.
pub struct SchedulerEngine {
    ctx: Arc<EngineContext>,
    in_flight: Mutex<HashSet<EntryId>>,
    last_refresh: Mutex<HashMap<EntryId, DateTime<Utc>>>,
}

/// Releases an entry's in-flight claim when dropped.
struct Claim<'a> {
    engine: &'a SchedulerEngine,
    id: EntryId,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        lock(&self.engine.in_flight).remove(&self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SchedulerEngine {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            in_flight: Mutex::new(HashSet::new()),
            last_refresh: Mutex::new(HashMap::new()),
        }
    }

    /// Run ticks until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.ctx.lifecycle.tick());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            "⏰ Scheduler started (every {}s, {} workers)",
            self.ctx.lifecycle.tick().as_secs(),
            self.ctx.lifecycle.max_concurrent
        );

        loop {
            tokio::select! {
                _ = interval.tick() => match self.tick().await {
                    Ok(report) if !report.is_quiet() => tracing::info!("Tick: {report:?}"),
                    Ok(report) => tracing::debug!("Tick: {report:?}"),
                    Err(e) => tracing::error!("Scheduler tick failed: {e}"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Scheduler stopped");
    }

    /// One pass over the store.
    pub async fn tick(&self) -> Result<TickReport> {
        let now = self.ctx.now();
        let entries = self.ctx.store.list().await?;
        let jobs = self.plan(entries, now);

        let workers = self.ctx.lifecycle.max_concurrent.max(1);
        let results: Vec<JobResult> = futures::stream::iter(jobs)
            .map(|(entry, job)| self.run_job(entry, job, now))
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut report = TickReport::default();
        for result in results {
            match result {
                JobResult::Done(transition) => report.record(&transition),
                JobResult::Skipped => report.skipped += 1,
                JobResult::Failed => report.failed += 1,
            }
        }
        Ok(report)
    }

    /// Pick a job per entry: a due transition, else a display refresh once
    /// the refresh interval has passed.
    fn plan(&self, entries: Vec<Entry>, now: DateTime<Utc>) -> Vec<(Entry, Job)> {
        let refresh_every = self.ctx.lifecycle.display_refresh();
        let mut last_refresh = lock(&self.last_refresh);
        last_refresh.retain(|id, _| entries.iter().any(|e| e.id == *id));

        entries
            .into_iter()
            .filter_map(|entry| {
                let job = match entry.due(now) {
                    Some(due) => Job::Transition(due),
                    None => {
                        let stale = last_refresh
                            .get(&entry.id)
                            .is_none_or(|at| now - *at >= refresh_every);
                        if !stale {
                            return None;
                        }
                        last_refresh.insert(entry.id, now);
                        Job::Refresh
                    }
                };
                Some((entry, job))
            })
            .collect()
    }

    fn claim(&self, id: EntryId) -> Option<Claim<'_>> {
        let claimed = lock(&self.in_flight).insert(id);
        claimed.then(|| Claim { engine: self, id })
    }

    async fn run_job(&self, entry: Entry, job: Job, now: DateTime<Utc>) -> JobResult {
        let id = entry.id;
        let Some(_claim) = self.claim(id) else {
            tracing::debug!("Entry {id} still in flight, skipping");
            return JobResult::Skipped;
        };

        let mut scheduled = ScheduleEntry::new(entry, self.ctx.clone());
        let result = match job {
            Job::Transition(Due::Remind(_)) => self.remind(&mut scheduled, now).await,
            Job::Transition(Due::Start) => scheduled.start().await,
            Job::Transition(Due::End) => scheduled.end().await,
            Job::Refresh => scheduled.reload_display().await,
        };
        match result {
            Ok(transition) => JobResult::Done(transition),
            Err(e) => {
                tracing::error!("Entry {id}: {job:?} failed: {e}");
                JobResult::Failed
            }
        }
    }

    async fn remind(&self, scheduled: &mut ScheduleEntry, now: DateTime<Utc>) -> Result<Transition> {
        let transition = scheduled.remind().await?;
        if matches!(transition, Transition::Reminded { .. }) {
            self.ctx.store.prune_reminders(scheduled.entry().id, now).await?;
        }
        Ok(transition)
    }
}
