//! # Enrollment Runtime
//!
//! Runtime that drives the enrollment coordinator's reducer.
//!
//! ## Core Components
//!
//! - **Store**: manages saga state and executes effects
//! - **Effect Executor**: runs effect descriptions on tokio and feeds resulting actions back
//! - **Waiters**: each caller of `send_and_wait_for` gets the terminal action of its own
//!   request on a dedicated oneshot channel
//!
//! ## Example
//!
//! ```ignore
//! use enrollment_runtime::Store;
//!
//! let store = Store::new(CoordinatorState::default(), CoordinatorReducer, env);
//!
//! let outcome = store
//!     .send_and_wait_for(action, |a| a.is_terminal_for(intent_id), timeout)
//!     .await?;
//!
//! let in_flight = store.state(|s| s.intents.len()).await;
//! ```

use enrollment_core::{effect::Effect, reducer::Reducer};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{RwLock, oneshot};

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// The result channel closed before a matching action arrived
        #[error("Result channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Health check status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but has work it could not finish
    /// (e.g. pending reconciliation records)
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is degraded
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Optional metadata (e.g., in-flight effects, pending records)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<(String, String)>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            metadata: Vec::new(),
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Aggregated health report
///
/// Combines multiple health checks into an overall system status.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall system status (worst of all checks)
    pub status: HealthStatus,

    /// Individual component checks
    pub checks: Vec<HealthCheck>,

    /// Timestamp when report was generated
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    /// Create a new health report from checks
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Self {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Check if overall system is healthy
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Check if overall system is degraded
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.status.is_degraded()
    }

    /// Check if overall system is unhealthy
    #[must_use]
    pub const fn is_unhealthy(&self) -> bool {
        self.status.is_unhealthy()
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
///
/// Keeps the counter honest even if the effect panics.
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Predicate picking out the result action a caller waits for.
type Matcher<A> = Box<dyn Fn(&A) -> bool + Send + Sync>;

/// One caller of [`Store::send_and_wait_for`].
struct Waiter<A> {
    id: u64,
    matches: Matcher<A>,
    sender: oneshot::Sender<A>,
}

/// Callers waiting for a result action, each on its own oneshot channel.
///
/// Every effect-produced action is offered to the waiters; the first one it
/// matches is removed and receives it. No caller can miss its action however
/// many other requests are in flight.
struct Waiters<A> {
    next_id: AtomicU64,
    pending: Mutex<Vec<Waiter<A>>>,
}

impl<A> Waiters<A> {
    const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Waiter<A>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, matches: Matcher<A>) -> (u64, oneshot::Receiver<A>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.lock().push(Waiter {
            id,
            matches,
            sender,
        });
        (id, receiver)
    }

    fn cancel(&self, id: u64) {
        self.lock().retain(|waiter| waiter.id != id);
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    /// Hand `action` to the first waiter it matches.
    fn notify(&self, action: A) {
        let waiter = {
            let mut pending = self.lock();
            match pending.iter().position(|waiter| (waiter.matches)(&action)) {
                Some(idx) => pending.swap_remove(idx),
                None => return,
            }
        };
        if waiter.sender.send(action).is_err() {
            tracing::debug!(waiter = waiter.id, "Waiter gave up before its action arrived");
        }
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, Duration, Effect, HealthCheck,
        Ordering, Reducer, RwLock, StoreError, Waiters,
    };

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`, held only while the reducer runs)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    /// 5. Callers waiting for a result action
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        pub(crate) waiters: Arc<Waiters<A>>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                waiters: Arc::new(Waiters::new()),
            }
        }

        /// Number of effects currently running.
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Number of callers waiting in [`Store::send_and_wait_for`].
        #[must_use]
        pub fn waiting(&self) -> usize {
            self.waiters.len()
        }

        /// Perform a health check on the Store
        ///
        /// Unhealthy once shutdown has started; reports in-flight effects and
        /// waiting callers.
        #[must_use]
        pub fn health(&self) -> HealthCheck {
            let check = if self.shutdown.load(Ordering::Acquire) {
                HealthCheck::unhealthy("store", "Store is shutting down")
            } else {
                HealthCheck::healthy("store")
            };

            check
                .with_metadata("pending_effects", self.pending_effects().to_string())
                .with_metadata("waiting_callers", self.waiting().to_string())
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Sets the shutdown flag (rejecting new actions from callers), then
        /// waits for pending effects to complete.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(50);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout: {} effects still running", pending
                    );
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tracing::debug!(
                    pending_effects = pending,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Waiting for effects to complete"
                );

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires the write lock on state
        /// 2. Calls the reducer with (state, action, environment)
        /// 3. Releases the lock and spawns the returned effects
        ///
        /// `send()` returns after starting effect execution, not completion.
        /// Concurrent `send()` calls serialize at the reducer only.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError>
        where
            R: Clone,
            E: Clone,
        {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            self.dispatch(action).await;
            Ok(())
        }

        /// Send an action and wait for a matching result action
        ///
        /// Registers the caller *before* sending, then returns the first
        /// effect-produced action matching `predicate`. Use an id carried by
        /// the action (the coordinator uses the intent id) to pick out this
        /// request's result among concurrent ones. The result is delivered on
        /// the caller's own channel, after the reducer has seen it.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: The result channel closed without an action
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            R: Clone,
            E: Clone,
            F: Fn(&A) -> bool + Send + Sync + 'static,
        {
            let (waiter, receiver) = self.waiters.register(Box::new(predicate));

            if let Err(err) = self.send(action).await {
                self.waiters.cancel(waiter);
                return Err(err);
            }

            match tokio::time::timeout(timeout, receiver).await {
                Ok(Ok(action)) => Ok(action),
                Ok(Err(_)) => Err(StoreError::ChannelClosed),
                Err(_) => {
                    self.waiters.cancel(waiter);
                    metrics::counter!("store.requests.timed_out").increment(1);
                    Err(StoreError::Timeout)
                },
            }
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let in_flight = store.state(|s| s.intents.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Run the reducer and start its effects.
        ///
        /// Feedback actions go through here directly so that effects already
        /// in flight can finish during shutdown.
        async fn dispatch(&self, action: A)
        where
            R: Clone,
            E: Clone,
        {
            tracing::debug!("Processing action");
            metrics::counter!("store.commands.total").increment(1);

            let effects = {
                let mut state = self.state.write().await;

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect(effect);
            }
        }

        /// Feed an effect-produced action back: reduce it, then offer it to
        /// the waiting callers.
        async fn feed_back(&self, action: A)
        where
            R: Clone,
            E: Clone,
        {
            let result = action.clone();
            self.dispatch(action).await;
            self.waiters.notify(result);
        }

        /// Execute an effect and feed any resulting action back into the store
        #[tracing::instrument(skip(self, effect), name = "execute_effect")]
        fn execute_effect(&self, effect: Effect<A>)
        where
            R: Clone,
            E: Clone,
        {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    let store = self.clone();

                    tokio::spawn(async move {
                        let _pending_guard = pending_guard;

                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            store.feed_back(action).await;
                        }
                    });
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                waiters: Arc::clone(&self.waiters),
            }
        }
    }
}

pub use store::Store;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Tests are allowed to panic on failures
mod tests {
    use super::*;
    use enrollment_core::{SmallVec, smallvec};

    #[derive(Debug, Clone, PartialEq)]
    enum CounterAction {
        Increment,
        Incremented(u32),
        Never,
    }

    #[derive(Debug, Default)]
    struct CounterState {
        value: u32,
        log: Vec<&'static str>,
    }

    #[derive(Clone)]
    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = CounterState;
        type Action = CounterAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut CounterState,
            action: CounterAction,
            _env: &(),
        ) -> SmallVec<[Effect<CounterAction>; 4]> {
            match action {
                CounterAction::Increment => {
                    state.value += 1;
                    let value = state.value;
                    smallvec![Effect::future(async move {
                        Some(CounterAction::Incremented(value))
                    })]
                },
                CounterAction::Incremented(_) => {
                    state.log.push("incremented");
                    smallvec![Effect::None]
                },
                CounterAction::Never => smallvec![Effect::future(async { None })],
            }
        }
    }

    fn store() -> Store<CounterState, CounterAction, (), CounterReducer> {
        Store::new(CounterState::default(), CounterReducer, ())
    }

    #[tokio::test]
    async fn test_send_runs_reducer() {
        let store = store();
        store.send(CounterAction::Increment).await.unwrap();

        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_send_and_wait_for_returns_matching_action() {
        let store = store();
        let result = store
            .send_and_wait_for(
                CounterAction::Increment,
                |a| matches!(a, CounterAction::Incremented(_)),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(result, CounterAction::Incremented(1));
        // The reducer has already seen the result when the caller gets it
        assert_eq!(store.state(|s| s.log.len()).await, 1);
        assert_eq!(store.waiting(), 0);
    }

    #[tokio::test]
    async fn test_send_and_wait_for_times_out_and_forgets_the_caller() {
        let store = store();
        let result = store
            .send_and_wait_for(
                CounterAction::Never,
                |a| matches!(a, CounterAction::Incremented(_)),
                Duration::from_millis(50),
            )
            .await;

        assert!(matches!(result, Err(StoreError::Timeout)));
        assert_eq!(store.waiting(), 0);
    }

    #[tokio::test]
    async fn test_each_action_reaches_one_waiter() {
        let store = store();
        let (_, first_rx) = store
            .waiters
            .register(Box::new(|a| matches!(a, CounterAction::Incremented(_))));
        let (_, second_rx) = store
            .waiters
            .register(Box::new(|a| matches!(a, CounterAction::Incremented(_))));

        store.waiters.notify(CounterAction::Incremented(1));
        store.waiters.notify(CounterAction::Incremented(2));

        assert_eq!(first_rx.await.unwrap(), CounterAction::Incremented(1));
        assert_eq!(second_rx.await.unwrap(), CounterAction::Incremented(2));
        assert_eq!(store.waiting(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_actions() {
        let store = store();
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = store
            .send_and_wait_for(CounterAction::Increment, |_| true, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
        assert_eq!(store.waiting(), 0);
        assert!(store.health().status.is_unhealthy());
    }

    #[test]
    fn test_health_status_worst() {
        assert_eq!(
            HealthStatus::Healthy.worst(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        let report = HealthReport::new(vec![
            HealthCheck::healthy("store"),
            HealthCheck::degraded("reconciliation", "2 records pending"),
        ]);
        assert!(report.is_degraded());
    }
}
