//! # Resumable Computations
//!
//! A saga body is an explicit state machine: the interpreter calls
//! [`Saga::advance`] with what the previous effect produced, and the body
//! answers with its next [`Step`]. Nothing here knows about scheduling; a body
//! can be driven by hand in tests exactly the way the interpreter drives it.

pub mod sequence;
pub mod watchers;

pub use sequence::Sequence;
pub use watchers::{TakeEvery, TakeLatest};

use crate::effects::Effect;
use crate::error::SagaError;
use serde_json::Value;

/// What a body is resumed with
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// First advance of a fresh task
    Start,
    /// Result of the effect the task was suspended on
    Value(Value),
    /// The effect failed, or a child escalated
    Error(SagaError),
}

/// What a body produces on each advance
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Yield(Effect),
    Done(Value),
    Error(SagaError),
}

impl Step {
    /// Completion without a result value
    pub fn done() -> Self {
        Self::Done(Value::Null)
    }

    pub fn is_yield(&self) -> bool {
        matches!(self, Self::Yield(_))
    }

    pub fn effect(&self) -> Option<&Effect> {
        match self {
            Self::Yield(effect) => Some(effect),
            _ => None,
        }
    }
}

impl From<Effect> for Step {
    fn from(effect: Effect) -> Self {
        Self::Yield(effect)
    }
}

/// Body of a task
pub trait Saga: Send {
    fn advance(&mut self, input: Input) -> Step;

    /// Resume as if the previous effect had failed
    fn inject_error(&mut self, err: SagaError) -> Step {
        self.advance(Input::Error(err))
    }

    /// Cleanup hook, run once when the task is cancelled
    fn on_cancel(&mut self) {}
}

impl<S: Saga + ?Sized> Saga for Box<S> {
    fn advance(&mut self, input: Input) -> Step {
        (**self).advance(input)
    }

    fn inject_error(&mut self, err: SagaError) -> Step {
        (**self).inject_error(err)
    }

    fn on_cancel(&mut self) {
        (**self).on_cancel()
    }
}
