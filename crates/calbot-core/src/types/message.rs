//! Outbound message types exchanged with the message sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::MessageRef;

/// Confirmation that a message reached its destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub channel_id: String,
    pub message_id: String,
    pub delivered_at: DateTime<Utc>,
}

/// Result of looking up a display message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    /// The message exists and is reachable.
    Found(MessageRef),
    /// The message, its channel, or access to it is gone for good.
    Missing,
}

/// Which lifecycle announcement is being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Announcement {
    Remind,
    Start,
    End,
}

impl std::fmt::Display for Announcement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Announcement::Remind => write!(f, "remind"),
            Announcement::Start => write!(f, "start"),
            Announcement::End => write!(f, "end"),
        }
    }
}
