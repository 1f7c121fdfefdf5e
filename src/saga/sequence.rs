use super::{Input, Saga, Step};
use crate::effects::Effect;
use crate::error::SagaError;
use serde_json::Value;

type Continuation = Box<dyn FnMut(Value) -> Step + Send>;
type Recovery = Box<dyn FnMut(SagaError) -> Step + Send>;
type Cleanup = Box<dyn FnMut() + Send>;

/// Saga built from an ordered list of continuation closures
///
/// Each advance runs the next continuation with the value the task was
/// resumed with. After the last continuation the sequence completes with
/// `finish_with`'s step, or `Done(null)` when none was given.
///
/// ```rust
/// use saga_core::completion::delay;
/// use saga_core::effects::{call, put, Action};
/// use saga_core::saga::{Input, Saga, Sequence, Step};
/// use serde_json::json;
///
/// let mut saga = Sequence::new()
///     .effect(call(delay(), vec![json!(1000)]))
///     .effect(put(Action::new("INCREMENT")));
///
/// assert_eq!(saga.advance(Input::Start), Step::Yield(call(delay(), vec![json!(1000)])));
/// assert_eq!(saga.advance(Input::Value(json!(true))), Step::Yield(put(Action::new("INCREMENT"))));
/// assert_eq!(saga.advance(Input::Value(json!(null))), Step::done());
/// ```
#[derive(Default)]
pub struct Sequence {
    steps: Vec<Continuation>,
    cursor: usize,
    finish: Option<Continuation>,
    recover: Option<Recovery>,
    cleanup: Option<Cleanup>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a continuation receiving the previous result
    pub fn then(mut self, step: impl FnMut(Value) -> Step + Send + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Append a fixed effect
    pub fn effect(self, effect: Effect) -> Self {
        self.then(move |_| Step::Yield(effect.clone()))
    }

    /// Step produced once every continuation has run
    pub fn finish_with(mut self, finish: impl FnMut(Value) -> Step + Send + 'static) -> Self {
        self.finish = Some(Box::new(finish));
        self
    }

    /// Local recovery for injected errors
    ///
    /// A yielded effect from the handler is executed and the sequence then
    /// continues where it left off. Without a handler errors are re-raised.
    pub fn recover(mut self, handler: impl FnMut(SagaError) -> Step + Send + 'static) -> Self {
        self.recover = Some(Box::new(handler));
        self
    }

    /// Cleanup run once if the task is cancelled
    pub fn finally(mut self, cleanup: impl FnMut() + Send + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    pub fn remaining(&self) -> usize {
        self.steps.len().saturating_sub(self.cursor)
    }
}

impl Saga for Sequence {
    fn advance(&mut self, input: Input) -> Step {
        let value = match input {
            Input::Start => Value::Null,
            Input::Value(value) => value,
            Input::Error(err) => {
                return match self.recover.as_mut() {
                    Some(handler) => handler(err),
                    None => Step::Error(err),
                }
            }
        };

        match self.steps.get_mut(self.cursor) {
            Some(step) => {
                self.cursor += 1;
                step(value)
            }
            None => match self.finish.as_mut() {
                Some(finish) => finish(value),
                None => Step::done(),
            },
        }
    }

    fn on_cancel(&mut self) {
        if let Some(cleanup) = self.cleanup.as_mut() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{put, take, Action};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_empty_sequence_completes_immediately() {
        let mut saga = Sequence::new();
        assert_eq!(saga.advance(Input::Start), Step::done());
    }

    #[test]
    fn test_continuations_receive_previous_result() {
        let mut saga = Sequence::new()
            .effect(take("FETCH"))
            .then(|action| {
                let id = action["id"].clone();
                Step::Yield(put(Action::new("FETCHED").with("id", id)))
            })
            .finish_with(|_| Step::Done(json!("ok")));

        assert_eq!(saga.advance(Input::Start), Step::Yield(take("FETCH")));
        assert_eq!(
            saga.advance(Input::Value(json!({"type": "FETCH", "id": 3}))),
            Step::Yield(put(Action::new("FETCHED").with("id", 3)))
        );
        assert_eq!(saga.remaining(), 0);
        assert_eq!(saga.advance(Input::Value(Value::Null)), Step::Done(json!("ok")));
    }

    #[test]
    fn test_errors_reraise_without_recovery() {
        let mut saga = Sequence::new().effect(take("A")).effect(take("B"));
        saga.advance(Input::Start);
        assert_eq!(
            saga.inject_error(SagaError::failed("boom")),
            Step::Error(SagaError::failed("boom"))
        );
    }

    #[test]
    fn test_recovery_continues_sequence() {
        let mut saga = Sequence::new()
            .effect(take("A"))
            .effect(take("B"))
            .recover(|err| Step::Yield(put(Action::new("FAILED").with("reason", err.to_string()))));

        saga.advance(Input::Start);
        assert_eq!(
            saga.inject_error(SagaError::failed("boom")),
            Step::Yield(put(Action::new("FAILED").with("reason", "boom")))
        );
        assert_eq!(saga.advance(Input::Value(Value::Null)), Step::Yield(take("B")));
    }

    #[test]
    fn test_cleanup_runs_on_cancel() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleaned);
        let mut saga = Sequence::new()
            .effect(take("A"))
            .finally(move || flag.store(true, Ordering::SeqCst));

        saga.on_cancel();
        assert!(cleaned.load(Ordering::SeqCst));
    }
}
