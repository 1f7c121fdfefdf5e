//! Shared stores, timers and sagas for integration tests

use parking_lot::Mutex;
use saga_core::completion::{Deferred, DELAY};
use saga_core::effects::{call, put, take, Action, CallOutcome, CallTarget, SagaFn};
use saga_core::error::{SagaError, StoreError};
use saga_core::saga::{Sequence, Step};
use saga_core::store::ReducerStore;
use serde_json::{json, Value};
use std::sync::Arc;

/// `{"count": n}` store; FREEZE is always rejected
pub fn counter_store() -> ReducerStore {
    ReducerStore::new(json!({ "count": 0 }), |state, action| {
        let count = state["count"].as_i64().unwrap_or(0);
        match action.action_type.as_str() {
            "INCREMENT" => Ok(json!({ "count": count + 1 })),
            "DECREMENT" => Ok(json!({ "count": count - 1 })),
            "FREEZE" => Err(StoreError::new("FREEZE", "counter is frozen")),
            _ => Ok(state.clone()),
        }
    })
}

pub fn count(state: &Value) -> i64 {
    state["count"].as_i64().unwrap_or(0)
}

/// Stand-in for the `delay` target whose timers are fired by hand
///
/// Registered under the same name as the real target, so descriptors built
/// with either compare equal.
#[derive(Clone, Default)]
pub struct ManualTimers {
    timers: Arc<Mutex<Vec<Deferred>>>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self) -> CallTarget {
        let timers = Arc::clone(&self.timers);
        CallTarget::new(DELAY, move |_| {
            let timer = Deferred::new();
            timers.lock().push(timer.clone());
            CallOutcome::pending(timer)
        })
    }

    pub fn started(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn timer(&self, index: usize) -> Deferred {
        self.timers.lock()[index].clone()
    }

    /// Fire every timer that is still armed; returns how many fired
    pub fn fire_all(&self) -> usize {
        let timers: Vec<Deferred> = self.timers.lock().clone();
        timers
            .iter()
            .filter(|timer| timer.resolve(json!(true)))
            .count()
    }
}

/// Waits a second, then increments the counter
pub fn increment_async(delay: CallTarget) -> SagaFn {
    SagaFn::new("increment_async", move |_| {
        Sequence::new()
            .effect(call(delay.clone(), vec![json!(1000)]))
            .effect(put(Action::new("INCREMENT")))
    })
}

/// Parks on an action nobody dispatches
pub fn idle(name: &str) -> SagaFn {
    SagaFn::new(name, |_| Sequence::new().effect(take("NEVER")))
}

/// Raises as soon as it starts
pub fn failing(name: &str, message: &'static str) -> SagaFn {
    SagaFn::new(name, move |_| {
        Sequence::new().then(move |_| Step::Error(SagaError::failed(message)))
    })
}

/// Sync CALL target echoing its first argument
pub fn echo() -> CallTarget {
    CallTarget::sync("echo", |args| Ok(args.first().cloned().unwrap_or(Value::Null)))
}
