//! External store collaborator.
//!
//! The interpreter only needs `dispatch` (PUT) and `get_state` (SELECT). PUT
//! is the only effect that mutates the store, and it applies the mutation
//! before the action is published, so a task resumed by a TAKE on that action
//! observes the updated state.

use crate::effects::Action;
use crate::error::StoreError;
use serde_json::Value;

pub trait Store: Send {
    fn dispatch(&mut self, action: &Action) -> Result<(), StoreError>;

    fn get_state(&self) -> Value;
}

type Reducer = dyn Fn(&Value, &Action) -> Result<Value, StoreError> + Send;

/// In-memory store applying a reducer function to a JSON state
pub struct ReducerStore {
    state: Value,
    reducer: Box<Reducer>,
    dispatched: usize,
}

impl ReducerStore {
    pub fn new(
        initial: Value,
        reducer: impl Fn(&Value, &Action) -> Result<Value, StoreError> + Send + 'static,
    ) -> Self {
        Self {
            state: initial,
            reducer: Box::new(reducer),
            dispatched: 0,
        }
    }

    /// Store whose state never changes; useful when only the bus matters
    pub fn inert() -> Self {
        Self::new(Value::Null, |state, _| Ok(state.clone()))
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Number of actions the reducer accepted
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }
}

impl Store for ReducerStore {
    fn dispatch(&mut self, action: &Action) -> Result<(), StoreError> {
        self.state = (self.reducer)(&self.state, action)?;
        self.dispatched += 1;
        Ok(())
    }

    fn get_state(&self) -> Value {
        self.state.clone()
    }
}

impl std::fmt::Debug for ReducerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReducerStore")
            .field("state", &self.state)
            .field("dispatched", &self.dispatched)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counter() -> ReducerStore {
        ReducerStore::new(json!(0), |state, action| {
            let current = state.as_i64().unwrap_or(0);
            match action.action_type.as_str() {
                "INCREMENT" => Ok(json!(current + 1)),
                "FREEZE" => Err(StoreError::new("FREEZE", "counter is frozen")),
                _ => Ok(state.clone()),
            }
        })
    }

    #[test]
    fn test_reducer_applies_actions() {
        let mut store = counter();
        store.dispatch(&Action::new("INCREMENT")).unwrap();
        store.dispatch(&Action::new("INCREMENT")).unwrap();
        store.dispatch(&Action::new("NOOP")).unwrap();
        assert_eq!(store.get_state(), json!(2));
        assert_eq!(store.dispatched(), 3);
    }

    #[test]
    fn test_rejected_action_leaves_state_untouched() {
        let mut store = counter();
        store.dispatch(&Action::new("INCREMENT")).unwrap();
        assert!(store.dispatch(&Action::new("FREEZE")).is_err());
        assert_eq!(store.state(), &json!(1));
        assert_eq!(store.dispatched(), 1);
    }
}
