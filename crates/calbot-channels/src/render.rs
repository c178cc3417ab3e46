//! Plain-text rendering of announcements and entry displays.
//!
//! Announcement templates understand these placeholders:
//!
//! | Token | Expands to |
//! |-------|------------|
//! | `%a`  | what is happening ("**Raid** is starting now!") |
//! | `%t`  | title |
//! | `%u`  | title link, empty if none |
//! | `%s`  | local start time |
//! | `%e`  | local end time |
//! | `%c`  | comments, one per line |
//! | `%i`  | entry id |
//! | `%%`  | a literal `%` |

use calbot_core::config::ChannelSettings;
use calbot_core::error::Result;
use calbot_core::traits::Renderer;
use calbot_core::types::{Announcement, Entry};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt::Write;

const TIME_FORMAT: &str = "%a %b %-d, %H:%M %Z";

#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl TextRenderer {
    pub fn new() -> Self {
        Self
    }
}

fn local_time<Z: TimeZone>(at: &DateTime<Z>) -> String
where
    Z::Offset: std::fmt::Display,
{
    at.format(TIME_FORMAT).to_string()
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 { format!("1 {unit}") } else { format!("{n} {unit}s") }
}

/// Human countdown: the two largest non-zero units.
pub fn countdown(delta: Duration) -> String {
    let minutes = delta.num_minutes();
    if minutes < 1 {
        return "less than a minute".into();
    }
    let (days, hours, mins) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);
    let parts: Vec<String> = [(days, "day"), (hours, "hour"), (mins, "minute")]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .take(2)
        .map(|(n, unit)| plural(n, unit))
        .collect();
    parts.join(" ")
}

fn action(kind: Announcement, entry: &Entry, now: DateTime<Utc>) -> String {
    match kind {
        Announcement::Remind => {
            format!("**{}** begins in {}", entry.title, countdown(entry.start - now))
        }
        Announcement::Start => format!("**{}** is starting now!", entry.title),
        Announcement::End => format!("**{}** has ended.", entry.title),
    }
}

fn expand(template: &str, kind: Announcement, entry: &Entry, now: DateTime<Utc>) -> String {
    let mut out = String::with_capacity(template.len() + entry.title.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('a') => out.push_str(&action(kind, entry, now)),
            Some('t') => out.push_str(&entry.title),
            Some('u') => out.push_str(entry.url.as_deref().unwrap_or("")),
            Some('s') => out.push_str(&local_time(&entry.local_start())),
            Some('e') => out.push_str(&local_time(&entry.local_end())),
            Some('c') => out.push_str(&entry.comments.join("\n")),
            Some('i') => out.push_str(&entry.id.to_string()),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

impl Renderer for TextRenderer {
    fn announcement(&self, kind: Announcement, template: &str, entry: &Entry, now: DateTime<Utc>) -> Result<String> {
        Ok(expand(template, kind, entry, now))
    }

    fn display(&self, entry: &Entry, settings: &ChannelSettings, now: DateTime<Utc>) -> Result<String> {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = writeln!(out, "**{}**  `#{}`", entry.title, entry.id);
        if let Some(url) = &entry.url {
            let _ = writeln!(out, "<{url}>");
        }
        let _ = writeln!(out, "Start: {}", local_time(&entry.local_start()));
        if !entry.is_instantaneous() {
            let _ = writeln!(out, "End: {}", local_time(&entry.local_end()));
        }
        if entry.repeat.is_repeating() {
            let _ = writeln!(out, "Repeats: {}", entry.repeat);
        }
        for comment in &entry.comments {
            let _ = writeln!(out, "> {comment}");
        }
        if !entry.reminders.is_empty() {
            let times: Vec<String> = entry
                .reminders
                .iter()
                .map(|at| at.with_timezone(&entry.zone).format("%H:%M").to_string())
                .collect();
            let _ = writeln!(out, "Reminders: {}", times.join(", "));
        }

        let status = if now < entry.start {
            format!("Starts in {}", countdown(entry.start - now))
        } else if now < entry.end {
            format!("Ends in {}", countdown(entry.end - now))
        } else {
            "Ending".to_string()
        };
        let _ = writeln!(out, "{status}");

        if settings.rsvp_enabled {
            let yes = settings.yes_emoji.as_deref().unwrap_or("yes");
            let no = settings.no_emoji.as_deref().unwrap_or("no");
            let _ = write!(out, "{yes} {}   {no} {}", entry.rsvp.yes.len(), entry.rsvp.no.len());
        }
        Ok(out.trim_end().to_string())
    }
}
