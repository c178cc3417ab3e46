//! # Calbot Scheduler
//!
//! Lifecycle engine for scheduled entries.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (tokio interval)
//!   ├── entry due to remind → ScheduleEntry::remind → prune reminders
//!   ├── entry due to start  → ScheduleEntry::start  (instantaneous → end)
//!   ├── entry due to end    → ScheduleEntry::end
//!   │                          ├── repeating → next occurrence + resort
//!   │                          └── one-off   → delete entry + message
//!   └── idle entries        → ScheduleEntry::reload_display
//!
//! Every ScheduleEntry operation runs under its channel's lock.
//!
//! EventRouter (gateway events)
//!   ├── reaction       → RsvpService → reload_display
//!   ├── message posted → delete it unless the bot wrote it
//!   ├── message delete → drop entry
//!   └── channel/community delete → drop entries
//! ```

pub mod audit;
pub mod context;
pub mod engine;
pub mod entry;
pub mod events;
pub mod ordering;
pub mod rsvp;

#[cfg(test)]
mod testing;

pub use context::{ChannelLocks, Clock, EngineContext, SystemClock};
pub use engine::{SchedulerEngine, TickReport};
pub use entry::{ScheduleEntry, Transition};
pub use events::{EventOutcome, EventRouter, ReactionLimiter};
pub use ordering::DisplayOrdering;
pub use rsvp::RsvpService;
