//! Policy status state machine and the coordinator that reacts to actor events.

mod coordinator;
pub mod transitions;

pub use coordinator::{CoordinatorDecision, LifecycleCoordinator};
pub use transitions::{
    allowed_targets, is_allowed, Precondition, TransitionError, TransitionOutcome,
    TransitionRequest,
};
