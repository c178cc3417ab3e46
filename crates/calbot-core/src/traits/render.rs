//! Text rendering contract.

use chrono::{DateTime, Utc};

use crate::config::ChannelSettings;
use crate::error::Result;
use crate::types::{Announcement, Entry};

/// Turns entries into message text. Implementations must be pure: the same
/// inputs always produce the same text.
pub trait Renderer: Send + Sync {
    /// Fill an announce/reminder template for `entry`.
    fn announcement(&self, kind: Announcement, template: &str, entry: &Entry, now: DateTime<Utc>) -> Result<String>;

    /// Full display message: title, countdown, comments, reminders, RSVP tallies.
    fn display(&self, entry: &Entry, settings: &ChannelSettings, now: DateTime<Utc>) -> Result<String>;
}
