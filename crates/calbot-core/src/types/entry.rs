//! Schedule entry record.

use chrono::{DateTime, Datelike, Days, Months, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::recurrence::RecurrencePolicy;
use super::rsvp::RsvpLists;
use crate::error::{CalbotError, Result};

/// Identifier of an entry, unique within the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u32);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

/// Where an entry's display message lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub community_id: String,
    pub channel_id: String,
    pub message_id: String,
}

impl MessageRef {
    pub fn new(
        community_id: impl Into<String>,
        channel_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            community_id: community_id.into(),
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

/// One scheduled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Zone the start/end wall-clock times belong to.
    pub zone: Tz,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub repeat: RecurrencePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Pending reminder instants, ascending.
    #[serde(default)]
    pub reminders: Vec<DateTime<Utc>>,
    #[serde(flatten)]
    pub rsvp: RsvpLists,
    #[serde(flatten)]
    pub message: MessageRef,
    /// Linked external calendar event, if synchronised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub has_started: bool,
}

/// Start/end/reminders of one occurrence of a repeating entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reminders: Vec<DateTime<Utc>>,
}

/// The lifecycle transition an entry is waiting on at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    Remind(DateTime<Utc>),
    Start,
    End,
}

impl Entry {
    /// Build a non-repeating entry; rejects `start > end`.
    pub fn new(
        id: EntryId,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        zone: Tz,
        message: MessageRef,
    ) -> Result<Self> {
        let entry = Self {
            id,
            title: title.into(),
            start,
            end,
            zone,
            comments: Vec::new(),
            repeat: RecurrencePolicy::NONE,
            url: None,
            reminders: Vec::new(),
            rsvp: RsvpLists::default(),
            message,
            external_id: None,
            has_started: false,
        };
        entry.validate()?;
        Ok(entry)
    }

    pub fn with_repeat(mut self, repeat: RecurrencePolicy) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_comments(mut self, comments: Vec<String>) -> Self {
        self.comments = comments;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_reminders(mut self, mut reminders: Vec<DateTime<Utc>>) -> Self {
        reminders.sort();
        self.reminders = reminders;
        self
    }

    /// Invariants every stored entry must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(CalbotError::invalid_entry(format!(
                "entry {} starts after it ends ({} > {})",
                self.id, self.start, self.end
            )));
        }
        if self.rsvp.yes.iter().any(|p| self.rsvp.no.contains(p)) {
            return Err(CalbotError::invalid_entry(format!(
                "entry {} has a participant in both RSVP lists",
                self.id
            )));
        }
        Ok(())
    }

    pub fn local_start(&self) -> DateTime<Tz> {
        self.start.with_timezone(&self.zone)
    }

    pub fn local_end(&self) -> DateTime<Tz> {
        self.end.with_timezone(&self.zone)
    }

    /// Start and end coincide; the entry has no running phase.
    pub fn is_instantaneous(&self) -> bool {
        self.start == self.end
    }

    pub fn channel_id(&self) -> &str {
        &self.message.channel_id
    }

    /// Days until the next occurrence, 0 if the entry does not repeat.
    pub fn days_until_next(&self) -> u32 {
        self.repeat.days_until_next(self.local_start().weekday())
    }

    /// The next occurrence after the current one, with reminders placed
    /// `reminder_leads` minutes before the new start and dropped if already
    /// past at `now`. `None` if the entry does not repeat.
    pub fn next_occurrence(&self, reminder_leads: &[u32], now: DateTime<Utc>) -> Option<Occurrence> {
        let days = self.days_until_next();
        if days == 0 {
            return None;
        }
        let start = advance_days(&self.local_start(), days).with_timezone(&Utc);
        let end = advance_days(&self.local_end(), days).with_timezone(&Utc);
        Some(Occurrence {
            start,
            end,
            reminders: reminders_before(start, reminder_leads, now),
        })
    }

    /// Which transition, if any, is due at `now`. Start and end take
    /// precedence over reminders; a started entry is never reminded.
    pub fn due(&self, now: DateTime<Utc>) -> Option<Due> {
        if self.has_started {
            return (self.end <= now).then_some(Due::End);
        }
        if self.start <= now {
            return Some(Due::Start);
        }
        self.reminders
            .first()
            .filter(|at| **at <= now)
            .map(|at| Due::Remind(*at))
    }
}

/// Move `instant` forward by `days` calendar days in its own zone.
///
/// If the result does not land strictly after `instant`, one year is added.
/// An ambiguous local time (clocks set back) takes its earlier instant; one
/// that does not exist on the target day falls back to adding whole 24h days.
pub fn advance_days<Z: TimeZone>(instant: &DateTime<Z>, days: u32) -> DateTime<Z> {
    let moved = instant
        .naive_local()
        .checked_add_days(Days::new(u64::from(days)))
        .and_then(|naive| instant.timezone().from_local_datetime(&naive).earliest())
        .unwrap_or_else(|| instant.clone() + chrono::Duration::days(i64::from(days)));
    if moved > *instant {
        return moved;
    }
    moved
        .clone()
        .checked_add_months(Months::new(12))
        .unwrap_or_else(|| moved + chrono::Duration::days(365))
}

/// Reminder instants `leads` minutes before `start`, keeping only those after `now`.
pub fn reminders_before(start: DateTime<Utc>, leads: &[u32], now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut reminders: Vec<DateTime<Utc>> = leads
        .iter()
        .map(|lead| start - chrono::Duration::minutes(i64::from(*lead)))
        .filter(|at| *at > now)
        .collect();
    reminders.sort();
    reminders.dedup();
    reminders
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().expect("valid date")
    }

    fn entry(start: DateTime<Utc>, end: DateTime<Utc>) -> Entry {
        Entry::new(
            EntryId(7),
            "Raid night",
            start,
            end,
            Tz::UTC,
            MessageRef::new("g1", "c1", "m1"),
        )
        .expect("valid entry")
    }

    #[test]
    fn test_rejects_start_after_end() {
        let result = Entry::new(
            EntryId(1),
            "bad",
            utc(2026, 5, 2, 10, 0),
            utc(2026, 5, 1, 10, 0),
            Tz::UTC,
            MessageRef::new("g", "c", "m"),
        );
        assert!(matches!(result, Err(CalbotError::InvalidEntry(_))));
    }

    #[test]
    fn test_instantaneous() {
        let at = utc(2026, 5, 1, 10, 0);
        assert!(entry(at, at).is_instantaneous());
        assert!(!entry(at, utc(2026, 5, 1, 11, 0)).is_instantaneous());
    }

    #[test]
    fn test_year_wrap() {
        let start = utc(2026, 12, 30, 18, 0);
        let e = entry(start, utc(2026, 12, 30, 20, 0)).with_repeat(RecurrencePolicy::every_days(5));
        let next = e.next_occurrence(&[], start).expect("repeats");
        assert_eq!(next.start, utc(2027, 1, 4, 18, 0));
        assert_eq!(next.end, utc(2027, 1, 4, 20, 0));
        assert!(next.start > e.start);
    }

    #[test]
    fn test_advance_keeps_wall_clock_across_dst() {
        let zone: Tz = "Europe/Berlin".parse().expect("zone");
        // Saturday before the March 2026 switch to summer time
        let local = zone.with_ymd_and_hms(2026, 3, 28, 19, 0, 0).single().expect("local");
        let next = advance_days(&local, 7);
        assert_eq!(next.format("%H:%M").to_string(), "19:00");
        assert_eq!(next.weekday(), Weekday::Sat);
    }

    #[test]
    fn test_advance_into_ambiguous_hour_keeps_wall_clock() {
        let zone: Tz = "Europe/Berlin".parse().expect("zone");
        // 2026-10-25 02:30 happens twice in Berlin
        let local = zone.with_ymd_and_hms(2026, 10, 18, 2, 30, 0).single().expect("local");
        let next = advance_days(&local, 7);
        assert_eq!(next.format("%Y-%m-%d %H:%M %z").to_string(), "2026-10-25 02:30 +0200");
    }

    #[test]
    fn test_weekly_uses_local_weekday() {
        let zone: Tz = "America/Los_Angeles".parse().expect("zone");
        // Tuesday 20:00 in LA is Wednesday 03:00 UTC
        let local = zone.with_ymd_and_hms(2026, 6, 2, 20, 0, 0).single().expect("local");
        let start = local.with_timezone(&Utc);
        let mut e = entry(start, start + chrono::Duration::hours(1))
            .with_repeat(RecurrencePolicy::weekly(&[Weekday::Thu]));
        e.zone = zone;
        assert_eq!(e.days_until_next(), 2);
    }

    #[test]
    fn test_non_repeating_has_no_next() {
        let start = utc(2026, 5, 1, 10, 0);
        assert!(entry(start, start).next_occurrence(&[10], start).is_none());
    }

    #[test]
    fn test_next_occurrence_regenerates_reminders() {
        let start = utc(2026, 5, 1, 10, 0);
        let e = entry(start, start).with_repeat(RecurrencePolicy::every_days(1));
        let next = e.next_occurrence(&[60, 10, 60 * 48], start).expect("repeats");
        assert_eq!(next.reminders, vec![utc(2026, 5, 2, 9, 0), utc(2026, 5, 2, 9, 50)]);
    }

    #[test]
    fn test_due_order() {
        let start = utc(2026, 5, 1, 10, 0);
        let end = utc(2026, 5, 1, 12, 0);
        let mut e = entry(start, end).with_reminders(vec![utc(2026, 5, 1, 9, 0)]);

        assert_eq!(e.due(utc(2026, 5, 1, 8, 0)), None);
        assert_eq!(e.due(utc(2026, 5, 1, 9, 1)), Some(Due::Remind(utc(2026, 5, 1, 9, 0))));
        assert_eq!(e.due(utc(2026, 5, 1, 10, 0)), Some(Due::Start));

        e.has_started = true;
        // leftover reminder of a started entry is never due
        assert_eq!(e.due(utc(2026, 5, 1, 11, 0)), None);
        assert_eq!(e.due(utc(2026, 5, 1, 12, 0)), Some(Due::End));
    }

    #[test]
    fn test_json_shape() {
        let start = utc(2026, 5, 1, 10, 0);
        let mut e = entry(start, start);
        e.rsvp.mark_attending("u1");
        let json = serde_json::to_value(&e).expect("serialize");
        assert_eq!(json["rsvp_yes"][0], "u1");
        assert_eq!(json["channel_id"], "c1");
        assert_eq!(json["zone"], "UTC");
        assert!(json.get("url").is_none());
        let back: Entry = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, e);
    }
}
