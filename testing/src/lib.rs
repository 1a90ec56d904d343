//! # Enrollment Testing
//!
//! Testing utilities for the enrollment coordinator and both registries.
//!
//! This crate provides:
//! - In-memory implementations of every store trait
//! - Fault-injecting wrappers around those stores
//! - A Given-When-Then harness for reducers
//! - proptest strategies for random request sequences
//!
//! ## Example
//!
//! ```ignore
//! use enrollment_testing::{InMemoryTrackStore, faults::{Fault, FaultyTrackStore, TrackOp}};
//!
//! #[tokio::test]
//! async fn debit_survives_a_lost_reply() {
//!     let tracks = Arc::new(FaultyTrackStore::new(Arc::new(InMemoryTrackStore::new())));
//!     tracks.plan().inject(TrackOp::Adjust, Fault::ApplyThenTimeout);
//!     let coordinator = coordinator_with(tracks.clone());
//!     let outcome = coordinator.enroll("Ada", track_id).await;
//!     // ...
//! }
//! ```

use chrono::{DateTime, Utc};
use enrollment_core::environment::Clock;

pub mod faults;
pub mod in_memory;
pub mod reducer_test;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use enrollment_testing::mocks::FixedClock;
    /// use enrollment_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Fixed clock set to 2025-01-01 00:00:00 UTC.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }
}

/// Test helpers.
pub mod helpers {
    /// Route `tracing` output through the test harness. Safe to call repeatedly.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities.
pub mod properties {
    use proptest::prelude::*;

    /// One step of a random request sequence.
    ///
    /// Indices are taken modulo the number of tracks (or enrolled
    /// participants) when the sequence is replayed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Operation {
        /// Enroll a new participant into a track
        Enroll {
            /// Track index
            track: usize,
        },
        /// Withdraw a previously enrolled participant
        Withdraw {
            /// Participant index
            participant: usize,
        },
    }

    /// Enrolls and withdraws, roughly two enrolls for every withdraw.
    pub fn operation() -> impl Strategy<Value = Operation> {
        prop_oneof![
            2 => any::<usize>().prop_map(|track| Operation::Enroll { track }),
            1 => any::<usize>().prop_map(|participant| Operation::Withdraw { participant }),
        ]
    }

    /// Sequences of up to `max_len` operations.
    pub fn operations(max_len: usize) -> impl Strategy<Value = Vec<Operation>> {
        prop::collection::vec(operation(), 0..=max_len)
    }

    /// Capacities for `1..=max_tracks` tracks, each in `0..=max_capacity`.
    pub fn capacities(max_tracks: usize, max_capacity: u32) -> impl Strategy<Value = Vec<u32>> {
        prop::collection::vec(0..=max_capacity, 1..=max_tracks)
    }
}

pub use faults::{Fault, FaultyParticipantStore, FaultyReconciliationLog, FaultyTrackStore};
pub use in_memory::{InMemoryParticipantStore, InMemoryReconciliationLog, InMemoryTrackStore};
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
