//! Watch helpers built on the one-shot TAKE primitive.
//!
//! The bus removes a TAKE subscriber after its first match; watching every
//! match is a loop that subscribes again after each fork.

use super::{Input, Saga, Step};
use crate::effects::{cancel, fork, take, Pattern, SagaFn};
use crate::task::TaskHandle;
use serde_json::Value;
use std::mem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EveryPhase {
    Taking,
    Forking,
}

/// Forks `worker` with each matching action, forever
///
/// Workers run concurrently; a slow worker never delays the next TAKE.
pub struct TakeEvery {
    pattern: Pattern,
    worker: SagaFn,
    phase: EveryPhase,
}

impl TakeEvery {
    pub fn new(pattern: impl Into<Pattern>, worker: SagaFn) -> Self {
        Self {
            pattern: pattern.into(),
            worker,
            phase: EveryPhase::Taking,
        }
    }

    /// Factory form, for running the watcher as a root or forking it
    pub fn saga_fn(name: impl Into<String>, pattern: impl Into<Pattern>, worker: SagaFn) -> SagaFn {
        let pattern = pattern.into();
        SagaFn::new(name, move |_| TakeEvery::new(pattern.clone(), worker.clone()))
    }
}

impl Saga for TakeEvery {
    fn advance(&mut self, input: Input) -> Step {
        match input {
            Input::Start => {
                self.phase = EveryPhase::Taking;
                Step::Yield(take(self.pattern.clone()))
            }
            Input::Value(value) => match self.phase {
                EveryPhase::Taking => {
                    self.phase = EveryPhase::Forking;
                    Step::Yield(fork(self.worker.clone(), vec![value]))
                }
                EveryPhase::Forking => {
                    self.phase = EveryPhase::Taking;
                    Step::Yield(take(self.pattern.clone()))
                }
            },
            Input::Error(err) => Step::Error(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LatestPhase {
    Taking,
    Cancelling(Value),
    Forking,
}

/// Forks `worker` with each matching action, cancelling the previous worker
///
/// Only the most recent action's worker is allowed to finish; cancelling a
/// worker that already completed is a no-op.
pub struct TakeLatest {
    pattern: Pattern,
    worker: SagaFn,
    phase: LatestPhase,
    last: Option<TaskHandle>,
}

impl TakeLatest {
    pub fn new(pattern: impl Into<Pattern>, worker: SagaFn) -> Self {
        Self {
            pattern: pattern.into(),
            worker,
            phase: LatestPhase::Taking,
            last: None,
        }
    }

    pub fn saga_fn(name: impl Into<String>, pattern: impl Into<Pattern>, worker: SagaFn) -> SagaFn {
        let pattern = pattern.into();
        SagaFn::new(name, move |_| TakeLatest::new(pattern.clone(), worker.clone()))
    }

    fn fork_worker(&mut self, action: Value) -> Step {
        self.phase = LatestPhase::Forking;
        Step::Yield(fork(self.worker.clone(), vec![action]))
    }
}

impl Saga for TakeLatest {
    fn advance(&mut self, input: Input) -> Step {
        let value = match input {
            Input::Start => {
                self.phase = LatestPhase::Taking;
                return Step::Yield(take(self.pattern.clone()));
            }
            Input::Value(value) => value,
            Input::Error(err) => return Step::Error(err),
        };

        match mem::replace(&mut self.phase, LatestPhase::Taking) {
            LatestPhase::Taking => match self.last.take() {
                Some(previous) => {
                    self.phase = LatestPhase::Cancelling(value);
                    Step::Yield(cancel(previous))
                }
                None => self.fork_worker(value),
            },
            LatestPhase::Cancelling(action) => self.fork_worker(action),
            LatestPhase::Forking => {
                self.last = TaskHandle::from_value(&value);
                Step::Yield(take(self.pattern.clone()))
            }
        }
    }
}
