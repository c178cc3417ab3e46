//! Platform events the bot reacts to.

use serde::{Deserialize, Serialize};

use super::entry::MessageRef;

/// Something that happened on the chat platform and may affect stored entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// A message was posted in a community channel.
    MessageCreated {
        message: MessageRef,
        author_id: String,
    },
    /// A user reacted to a message.
    ReactionAdded {
        message: MessageRef,
        user_id: String,
        emoji: String,
    },
    MessageDeleted {
        channel_id: String,
        message_id: String,
    },
    ChannelDeleted {
        channel_id: String,
    },
    /// The bot was removed from a community.
    CommunityLeft {
        community_id: String,
    },
}

impl PlatformEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PlatformEvent::MessageCreated { .. } => "message_created",
            PlatformEvent::ReactionAdded { .. } => "reaction_added",
            PlatformEvent::MessageDeleted { .. } => "message_deleted",
            PlatformEvent::ChannelDeleted { .. } => "channel_deleted",
            PlatformEvent::CommunityLeft { .. } => "community_left",
        }
    }
}
