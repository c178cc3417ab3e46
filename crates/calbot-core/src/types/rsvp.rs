//! RSVP tracking: attending / not-attending participant lists.

use serde::{Deserialize, Serialize};

/// A participant's RSVP edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpAction {
    Attending,
    NotAttending,
    Clear,
}

impl std::fmt::Display for RsvpAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RsvpAction::Attending => write!(f, "attending"),
            RsvpAction::NotAttending => write!(f, "not attending"),
            RsvpAction::Clear => write!(f, "clear"),
        }
    }
}

/// The two RSVP lists of an entry. A participant is in at most one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsvpLists {
    #[serde(rename = "rsvp_yes", default)]
    pub yes: Vec<String>,
    #[serde(rename = "rsvp_no", default)]
    pub no: Vec<String>,
}

impl RsvpLists {
    pub fn mark_attending(&mut self, participant: &str) -> bool {
        let removed = remove(&mut self.no, participant);
        let added = insert(&mut self.yes, participant);
        removed || added
    }

    pub fn mark_not_attending(&mut self, participant: &str) -> bool {
        let removed = remove(&mut self.yes, participant);
        let added = insert(&mut self.no, participant);
        removed || added
    }

    pub fn clear(&mut self, participant: &str) -> bool {
        let yes = remove(&mut self.yes, participant);
        let no = remove(&mut self.no, participant);
        yes || no
    }

    /// Apply an edit; returns whether either list changed.
    pub fn apply(&mut self, action: RsvpAction, participant: &str) -> bool {
        match action {
            RsvpAction::Attending => self.mark_attending(participant),
            RsvpAction::NotAttending => self.mark_not_attending(participant),
            RsvpAction::Clear => self.clear(participant),
        }
    }

    /// Drop duplicates and resolve any participant listed twice in favour of "yes".
    /// Used when loading records written by older versions.
    pub fn normalize(&mut self) {
        dedup(&mut self.yes);
        dedup(&mut self.no);
        let yes = &self.yes;
        self.no.retain(|p| !yes.contains(p));
    }
}

fn insert(list: &mut Vec<String>, participant: &str) -> bool {
    if list.iter().any(|p| p == participant) {
        return false;
    }
    list.push(participant.to_string());
    true
}

fn remove(list: &mut Vec<String>, participant: &str) -> bool {
    let before = list.len();
    list.retain(|p| p != participant);
    list.len() != before
}

fn dedup(list: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    list.retain(|p| seen.insert(p.clone()));
}
