//! Core data types.

pub mod entry;
pub mod event;
pub mod message;
pub mod recurrence;
pub mod rsvp;

pub use entry::{Due, Entry, EntryId, MessageRef, Occurrence, advance_days, reminders_before};
pub use event::PlatformEvent;
pub use message::{Announcement, Delivery, Fetch};
pub use recurrence::RecurrencePolicy;
pub use rsvp::{RsvpAction, RsvpLists};
