//! Given-When-Then testing for reducers
//!
//! The coordinator reducer is synchronous; its store calls live in
//! `Effect::Future` values. [`ReducerTest`] checks the state change and the
//! shape of the effects, and [`assertions::resolve_futures`] runs those effects
//! by hand so a saga can be stepped one action at a time.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use enrollment_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use enrollment_testing::ReducerTest;
///
/// ReducerTest::new(CoordinatorReducer)
///     .with_env(env)
///     .given_state(CoordinatorState::default())
///     .when_action(CoordinatorAction::Enroll { intent_id, participant_id, name, track_id })
///     .then_state(move |state| {
///         assert!(state.intents.contains_key(&intent_id));
///     })
///     .then_effects(|effects| {
///         assertions::assert_has_future_effect(effects);
///     })
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    setup_actions: Vec<A>,
    action: Option<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            setup_actions: Vec::new(),
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Reduce `actions` before the action under test; their effects are dropped.
    #[must_use]
    pub fn given_actions(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.setup_actions.extend(actions);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        for setup in self.setup_actions {
            let _ = self.reducer.reduce(&mut state, setup, &env);
        }

        let effects = self.reducer.reduce(&mut state, action, &env);

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use enrollment_core::effect::Effect;

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.is_empty() || effects.iter().all(|e| matches!(e, Effect::None)),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }

    /// Run every `Future` effect in order and collect the actions they produce.
    pub async fn resolve_futures<A>(effects: impl IntoIterator<Item = Effect<A>>) -> Vec<A> {
        let mut actions = Vec::new();
        for effect in effects {
            if let Effect::Future(fut) = effect {
                if let Some(action) = fut.await {
                    actions.push(action);
                }
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrollment_core::{SmallVec, smallvec};

    #[derive(Clone, Debug, PartialEq)]
    struct SeatState {
        remaining: u32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum SeatAction {
        Take,
        Taken(u32),
        Refused,
    }

    struct SeatReducer;

    impl Reducer for SeatReducer {
        type State = SeatState;
        type Action = SeatAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut SeatState,
            action: SeatAction,
            _env: &(),
        ) -> SmallVec<[Effect<SeatAction>; 4]> {
            match action {
                SeatAction::Take if state.remaining > 0 => {
                    state.remaining -= 1;
                    let remaining = state.remaining;
                    smallvec![Effect::future(async move { Some(SeatAction::Taken(remaining)) })]
                },
                SeatAction::Take => smallvec![Effect::future(async { Some(SeatAction::Refused) })],
                SeatAction::Taken(_) | SeatAction::Refused => smallvec![Effect::None],
            }
        }
    }

    #[test]
    fn test_given_actions_are_applied_first() {
        ReducerTest::new(SeatReducer)
            .with_env(())
            .given_state(SeatState { remaining: 2 })
            .given_actions([SeatAction::Take])
            .when_action(SeatAction::Take)
            .then_state(|state| assert_eq!(state.remaining, 0))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_terminal_action_has_no_effects() {
        ReducerTest::new(SeatReducer)
            .with_env(())
            .given_state(SeatState { remaining: 0 })
            .when_action(SeatAction::Refused)
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[tokio::test]
    async fn test_resolve_futures_skips_none() {
        let effects = vec![
            Effect::future(async { Some(SeatAction::Taken(1)) }),
            Effect::None,
            Effect::future(async { None }),
            Effect::future(async { Some(SeatAction::Refused) }),
        ];

        let actions = assertions::resolve_futures(effects).await;
        assert_eq!(actions, vec![SeatAction::Taken(1), SeatAction::Refused]);
    }
}
