//! # BloodBridge Core
//!
//! Core traits and types for the BloodBridge matching engine.
//!
//! The engine is written in the Reducer style: every change to a table of
//! records goes through a pure function that validates a command, applies the
//! resulting events to state, and returns *descriptions* of side effects.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for one logical table (donors, emergency requests)
//! - **Action**: All possible inputs to a reducer (commands and events)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions, executed by the runtime
//! - **Environment**: Injected dependencies (clock, id generator, collaborators)
//! - **Record store**: The keyed whole-table persistence collaborator
//!
//! ## Example
//!
//! ```ignore
//! use bloodbridge_core::{effect::Effect, reducer::Reducer, SmallVec};
//!
//! impl Reducer for DonorReducer {
//!     type State = DonorState;
//!     type Action = DonorAction;
//!     type Environment = DonorEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut DonorState,
//!         action: DonorAction,
//!         env: &DonorEnvironment,
//!     ) -> SmallVec<[Effect<DonorAction>; 4]> {
//!         // Business logic goes here
//!         SmallVec::new()
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

/// Record store collaborator (whole-table load/save)
pub mod record_store;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
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
        ///
        /// Most actions produce zero or one effect, so the result is a
        /// `SmallVec` that stays on the stack for up to four effects.
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
/// Effects are values, not execution. The runtime executes them after the
/// state change that produced them has been persisted.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap a future as an effect
        pub fn future<F>(future: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(future))
        }

        /// Whether this effect does nothing
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the reducer's Environment parameter.
pub mod environment {
    use chrono::{DateTime, NaiveDate, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Calendar date of `now()`, used for cooldown evaluation
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Produces fresh record identifiers.
    pub trait IdGenerator: Send + Sync {
        /// Return a new identifier, unique within the process lifetime
        fn next_id(&self) -> String;
    }

    /// Short random identifiers: the first 8 hex characters of a v4 UUID.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ShortIdGenerator;

    impl IdGenerator for ShortIdGenerator {
        fn next_id(&self) -> String {
            let mut id = uuid::Uuid::new_v4().simple().to_string();
            id.truncate(8);
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{IdGenerator, ShortIdGenerator};

    #[test]
    fn short_ids_are_eight_hex_chars() {
        let id = ShortIdGenerator.next_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, ShortIdGenerator.next_id());
    }

    #[test]
    fn only_the_none_effect_is_none() {
        assert!(Effect::<()>::None.is_none());
        assert!(!Effect::<()>::future(async { None }).is_none());
    }
}
