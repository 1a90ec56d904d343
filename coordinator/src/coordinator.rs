//! Request/response facade over the saga store.

use crate::action::{CoordinatorAction, EnrollOutcome, WithdrawOutcome};
use crate::environment::CoordinatorEnvironment;
use crate::error::EnrollmentError;
use crate::reducer::{CoordinatorReducer, CoordinatorState};
use enrollment_core::intent::IntentId;
use enrollment_core::participant::{Participant, ParticipantId};
use enrollment_core::track::TrackId;
use enrollment_runtime::metrics::EnrollmentMetrics;
use enrollment_runtime::{HealthCheck, Store, StoreError};
use std::time::Duration;

/// Store type driving the saga.
pub type CoordinatorStore =
    Store<CoordinatorState, CoordinatorAction, CoordinatorEnvironment, CoordinatorReducer>;

/// Store calls on the longest saga path (check, write, debit, void, delete, record).
const LONGEST_PATH_CALLS: u32 = 6;

/// Enroll / Withdraw entry point.
///
/// Every call opens a fresh intent, sends its command through the saga store
/// and waits for the terminal action carrying the same intent id.
///
/// # Example
///
/// ```ignore
/// let coordinator = Coordinator::new(env);
/// match coordinator.enroll("Ada", track_id).await? {
///     EnrollOutcome::Enrolled(participant) => println!("{}", participant.id),
///     EnrollOutcome::Degraded(notice) => println!("pending: {}", notice.reason),
/// }
/// ```
#[derive(Clone)]
pub struct Coordinator {
    store: CoordinatorStore,
    request_timeout: Duration,
}

impl Coordinator {
    /// Coordinator over `environment`.
    ///
    /// The request timeout covers every guarded call on the longest saga path
    /// with all retries spent, so a request never gives up while its saga is
    /// still running.
    #[must_use]
    pub fn new(environment: CoordinatorEnvironment) -> Self {
        let request_timeout = environment
            .guard
            .worst_case()
            .saturating_mul(LONGEST_PATH_CALLS)
            .saturating_add(Duration::from_secs(1));
        Self {
            store: Store::new(CoordinatorState::default(), CoordinatorReducer, environment),
            request_timeout,
        }
    }

    /// Enroll a new participant named `name` into `track_id`.
    ///
    /// # Errors
    ///
    /// - `Invalid`: blank name
    /// - `TrackNotFound`: unknown track
    /// - `CapacityExhausted`: no seat left; nothing was changed
    /// - `Unavailable`: the capacity check could not reach the Track Store
    /// - `StoreWriteFailed`: the participant record could not be written
    /// - `Coordinator`: the coordinator is shutting down
    #[tracing::instrument(skip(self), fields(intent_id))]
    pub async fn enroll(
        &self,
        name: &str,
        track_id: TrackId,
    ) -> Result<EnrollOutcome, EnrollmentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EnrollmentError::Invalid("participant name must not be empty".into()));
        }

        let intent_id = IntentId::new();
        tracing::Span::current().record("intent_id", tracing::field::display(intent_id));
        let command = CoordinatorAction::Enroll {
            intent_id,
            participant: Participant::pending(name, track_id),
        };

        let outcome = match self.run(intent_id, command).await? {
            CoordinatorAction::Enrolled { participant, .. } => Ok(EnrollOutcome::Enrolled(participant)),
            CoordinatorAction::Degraded { notice, .. } => Ok(EnrollOutcome::Degraded(notice)),
            CoordinatorAction::Rejected { error, .. } => Err(error),
            other => Err(unexpected(&other)),
        };

        EnrollmentMetrics::record_enroll(match &outcome {
            Ok(EnrollOutcome::Enrolled(_)) => "enrolled",
            Ok(EnrollOutcome::Degraded(_)) => "degraded",
            Err(err) => err.label(),
        });
        outcome
    }

    /// Withdraw `participant_id`. Withdrawing twice succeeds.
    ///
    /// # Errors
    ///
    /// - `ParticipantNotFound`: unknown participant
    /// - `Conflict`: the participant's enrollment is still in progress
    /// - `StoreWriteFailed`: the participant could not be released
    /// - `Unavailable`: the participant could not be read
    /// - `Coordinator`: the coordinator is shutting down
    #[tracing::instrument(skip(self), fields(intent_id))]
    pub async fn withdraw(
        &self,
        participant_id: ParticipantId,
    ) -> Result<WithdrawOutcome, EnrollmentError> {
        let intent_id = IntentId::new();
        tracing::Span::current().record("intent_id", tracing::field::display(intent_id));
        let command = CoordinatorAction::Withdraw {
            intent_id,
            participant_id,
        };

        let outcome = match self.run(intent_id, command).await? {
            CoordinatorAction::Withdrawn { participant, .. } => {
                Ok(WithdrawOutcome::Withdrawn(participant))
            },
            CoordinatorAction::Degraded { notice, .. } => Ok(WithdrawOutcome::Degraded(notice)),
            CoordinatorAction::Rejected { error, .. } => Err(error),
            other => Err(unexpected(&other)),
        };

        EnrollmentMetrics::record_withdraw(match &outcome {
            Ok(WithdrawOutcome::Withdrawn(_)) => "withdrawn",
            Ok(WithdrawOutcome::Degraded(_)) => "degraded",
            Err(err) => err.label(),
        });
        outcome
    }

    /// Number of requests in flight.
    pub async fn in_flight(&self) -> usize {
        self.store.state(CoordinatorState::in_flight).await
    }

    /// Health of the saga store.
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        self.store.health()
    }

    /// Stop accepting requests and wait for in-flight sagas to finish.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if sagas are still running
    /// when `timeout` expires.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }

    async fn run(
        &self,
        intent_id: IntentId,
        command: CoordinatorAction,
    ) -> Result<CoordinatorAction, EnrollmentError> {
        self.store
            .send_and_wait_for(
                command,
                move |action| action.is_terminal_for(intent_id),
                self.request_timeout,
            )
            .await
            .map_err(|err| {
                tracing::error!(%intent_id, error = %err, "Request did not reach a terminal action");
                EnrollmentError::from(err)
            })
    }
}

fn unexpected(action: &CoordinatorAction) -> EnrollmentError {
    EnrollmentError::Coordinator(format!("unexpected terminal action {action:?}"))
}
