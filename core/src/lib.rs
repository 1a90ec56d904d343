//! # Enrollment Core
//!
//! Core traits and domain types for capacity-bounded enrollment.
//!
//! Two independently deployed registries cooperate here: a Track Registry owns
//! the remaining capacity of each track, and an Enrollment Registry owns the
//! participant records. This crate holds everything both sides agree on:
//!
//! - **Reducer / Effect**: the functional core used by the enrollment coordinator
//! - **Domain model**: [`track::Track`], [`participant::Participant`],
//!   [`intent::EnrollmentIntent`], [`reconciliation::ReconciliationRecord`]
//! - **Storage seams**: [`stores::TrackStore`], [`stores::CapacityQuery`],
//!   [`stores::ParticipantStore`], [`stores::ReconciliationLog`]
//!
//! ## Capacity invariant
//!
//! For every track, once in-flight operations settle:
//!
//! ```text
//! remaining_capacity + count(active participants of the track) == total_capacity
//! ```
//!
//! The only way to change `remaining_capacity` is the atomic, floor-checked and
//! token-guarded [`stores::TrackStore::adjust_capacity`].

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

#[macro_use]
mod ids;

pub mod error;
pub mod intent;
pub mod participant;
pub mod reconciliation;
pub mod stores;
pub mod track;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for CoordinatorReducer {
    ///     type State = CoordinatorState;
    ///     type Action = CoordinatorAction;
    ///     type Environment = CoordinatorEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut CoordinatorState,
    ///         action: CoordinatorAction,
    ///         env: &CoordinatorEnvironment,
    ///     ) -> SmallVec<[Effect<CoordinatorAction>; 4]> {
    ///         match action {
    ///             CoordinatorAction::Enroll { .. } => {
    ///                 // Business logic here
    ///                 SmallVec::new()
    ///             }
    ///             _ => SmallVec::new(),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution): the Store runtime runs them.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap an async block that may feed an action back into the reducer.
        #[must_use]
        pub fn future<F>(fut: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use enrollment_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
