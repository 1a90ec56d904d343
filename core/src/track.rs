//! Tracks and the signed capacity adjustment.

use crate::participant::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fmt;

uuid_id! {
    /// Identifier of a capacity-limited track.
    TrackId
}

/// A capacity-limited track.
///
/// `remaining_capacity` is never written directly; it only moves through
/// [`crate::stores::TrackStore::adjust_capacity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Track id
    pub id: TrackId,
    /// Display name
    pub name: String,
    /// Seats still free
    pub remaining_capacity: u32,
    /// Seats fixed at creation
    pub total_capacity: u32,
}

impl Track {
    /// Create a track with all seats free.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            remaining_capacity: capacity,
            total_capacity: capacity,
        }
    }

    /// Remaining capacity after applying `delta`, or `None` when the result
    /// would drop below zero (or overflow).
    #[must_use]
    pub fn apply_delta(&self, delta: i32) -> Option<u32> {
        let next = i64::from(self.remaining_capacity) + i64::from(delta);
        u32::try_from(next).ok()
    }

    /// Whether at least one seat is free right now.
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.remaining_capacity > 0
    }
}

/// Request to create a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrack {
    /// Display name
    pub name: String,
    /// Initial (and total) capacity
    pub capacity: i64,
}

impl NewTrack {
    /// Validate the request and build the track.
    ///
    /// # Errors
    ///
    /// Returns a message when the name is blank or the capacity is negative
    /// or out of range.
    pub fn into_track(self) -> Result<Track, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("track name must not be empty".to_string());
        }
        let capacity = u32::try_from(self.capacity)
            .map_err(|_| format!("capacity must be between 0 and {}", u32::MAX))?;
        Ok(Track::new(name, capacity))
    }
}

/// Search filter over tracks. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackFilter {
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    /// Lower bound on remaining capacity (inclusive)
    pub min_capacity: Option<u32>,
    /// Upper bound on remaining capacity (inclusive)
    pub max_capacity: Option<u32>,
}

impl TrackFilter {
    /// Whether `track` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, track: &Track) -> bool {
        if let Some(name) = &self.name {
            if !track.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if self.min_capacity.is_some_and(|min| track.remaining_capacity < min) {
            return false;
        }
        if self.max_capacity.is_some_and(|max| track.remaining_capacity > max) {
            return false;
        }
        true
    }
}

/// Answer of the advisory capacity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    /// `remaining_capacity > 0` at read time
    pub available: bool,
}

/// Direction of a capacity adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentDirection {
    /// Take a seat (`-1`)
    Decrement,
    /// Give a seat back (`+1`)
    Increment,
}

impl AdjustmentDirection {
    /// Signed delta of this direction.
    #[must_use]
    pub const fn delta(self) -> i32 {
        match self {
            Self::Decrement => -1,
            Self::Increment => 1,
        }
    }

    /// Token suffix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decrement => "debit",
            Self::Increment => "credit",
        }
    }
}

/// Dedupe key for a capacity adjustment, derived from `(participant, direction)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentToken(String);

impl AdjustmentToken {
    /// Token for the adjustment made on behalf of `participant`.
    #[must_use]
    pub fn for_participant(participant: ParticipantId, direction: AdjustmentDirection) -> Self {
        Self(format!("{participant}:{}", direction.as_str()))
    }

    /// Wrap a raw token received over the wire.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdjustmentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed, token-guarded adjustment of one track's remaining capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityAdjustment {
    /// Track to adjust
    pub track_id: TrackId,
    /// Signed change
    pub delta: i32,
    /// Dedupe key
    pub token: AdjustmentToken,
}

impl CapacityAdjustment {
    /// Adjustment on behalf of `participant`.
    #[must_use]
    pub fn for_participant(
        track_id: TrackId,
        participant: ParticipantId,
        direction: AdjustmentDirection,
    ) -> Self {
        Self {
            track_id,
            delta: direction.delta(),
            token: AdjustmentToken::for_participant(participant, direction),
        }
    }
}

/// Result of an accepted adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustOutcome {
    /// Remaining capacity after the call
    pub remaining_capacity: u32,
    /// `true` when the token had already been applied and nothing changed
    pub replayed: bool,
}

/// Result of voiding an adjustment token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum VoidOutcome {
    /// The adjustment had been applied and was undone
    #[serde(rename_all = "camelCase")]
    Reverted {
        /// Remaining capacity after the revert
        remaining_capacity: u32,
    },
    /// The adjustment was never applied and now never will be
    #[serde(rename_all = "camelCase")]
    Barred {
        /// Remaining capacity (unchanged)
        remaining_capacity: u32,
    },
}

impl VoidOutcome {
    /// Remaining capacity after the void.
    #[must_use]
    pub const fn remaining_capacity(&self) -> u32 {
        match self {
            Self::Reverted { remaining_capacity } | Self::Barred { remaining_capacity } => {
                *remaining_capacity
            },
        }
    }
}
