//! Participants and their lifecycle.

use crate::track::TrackId;
use serde::{Deserialize, Serialize};

uuid_id! {
    /// Identifier of a participant.
    ParticipantId
}

/// Lifecycle of a participant record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Lifecycle {
    /// Written, seat not yet confirmed
    Pending,
    /// Seat confirmed
    Active,
    /// Withdrawn; kept as a tombstone
    Released,
}

impl Lifecycle {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Released => "released",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "released" => Some(Self::Released),
            _ => None,
        }
    }
}

/// A participant record as held by the Enrollment Registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Participant id
    pub id: ParticipantId,
    /// Display name
    pub name: String,
    /// Referenced track (not owned)
    pub track_id: TrackId,
    /// Current lifecycle state
    pub lifecycle: Lifecycle,
}

impl Participant {
    /// A fresh `Pending` participant.
    #[must_use]
    pub fn pending(name: impl Into<String>, track_id: TrackId) -> Self {
        Self {
            id: ParticipantId::new(),
            name: name.into(),
            track_id,
            lifecycle: Lifecycle::Pending,
        }
    }

    /// Whether this record is a withdrawal tombstone.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.lifecycle == Lifecycle::Released
    }
}

/// Search filter over participants. Released tombstones never match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantFilter {
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    /// Exact track
    pub track_id: Option<TrackId>,
}

impl ParticipantFilter {
    /// Whether `participant` is visible and satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, participant: &Participant) -> bool {
        if participant.is_released() {
            return false;
        }
        if self.track_id.is_some_and(|t| t != participant.track_id) {
            return false;
        }
        self.name.as_ref().is_none_or(|name| {
            participant
                .name
                .to_lowercase()
                .contains(&name.to_lowercase())
        })
    }
}
