//! # Effect Descriptors
//!
//! Inert values describing what a task wants the interpreter to do. A task
//! never performs side effects itself; it yields one of these and is resumed
//! with the outcome.
//!
//! Descriptors compare structurally, which is what makes sagas testable
//! without running them:
//!
//! ```rust
//! use saga_core::completion::delay;
//! use saga_core::effects::{call, put, Action};
//! use serde_json::json;
//!
//! assert_eq!(call(delay(), vec![json!(1000)]), call(delay(), vec![json!(1000)]));
//! assert_ne!(put(Action::new("INCREMENT")), put(Action::new("DECREMENT")));
//! ```

pub mod action;
pub mod pattern;
pub mod targets;

pub use action::Action;
pub use pattern::{Pattern, Predicate, WILDCARD};
pub use targets::{CallOutcome, CallTarget, SagaFn, Selector};

use crate::task::TaskHandle;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Discriminant of an [`Effect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EffectKind {
    Call,
    Put,
    Take,
    Fork,
    Join,
    Cancel,
    All,
    Race,
    Select,
}

impl EffectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Put => "PUT",
            Self::Take => "TAKE",
            Self::Fork => "FORK",
            Self::Join => "JOIN",
            Self::Cancel => "CANCEL",
            Self::All => "ALL",
            Self::Race => "RACE",
            Self::Select => "SELECT",
        }
    }

    /// PUT, FORK, CANCEL and SELECT always resume without suspending
    pub fn never_suspends(&self) -> bool {
        matches!(self, Self::Put | Self::Fork | Self::Cancel | Self::Select)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named RACE branches, kept in declaration order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RaceBranches(pub Vec<(String, Effect)>);

impl RaceBranches {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for RaceBranches {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, effect) in &self.0 {
            map.serialize_entry(name, effect)?;
        }
        map.end()
    }
}

/// Declarative instruction yielded by a task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum Effect {
    /// Invoke a function; suspends only if it returns a pending completion
    Call {
        #[serde(rename = "fn")]
        target: CallTarget,
        args: Vec<Value>,
    },
    /// Dispatch to the store and publish on the action bus
    Put { action: Action },
    /// Wait for the next action matching the pattern
    Take { pattern: Pattern },
    /// Start a child task without blocking
    Fork {
        #[serde(rename = "fn")]
        saga: SagaFn,
        args: Vec<Value>,
    },
    /// Wait for another task to finish
    Join { task: TaskHandle },
    /// Cancel another task and its descendants
    Cancel { task: TaskHandle },
    /// Run nested effects concurrently, collecting every result
    All { effects: Vec<Effect> },
    /// Run nested effects concurrently, keeping only the first to settle
    Race { effects: RaceBranches },
    /// Read the store through a selector
    Select { selector: Selector, args: Vec<Value> },
}

impl Effect {
    pub fn kind(&self) -> EffectKind {
        match self {
            Self::Call { .. } => EffectKind::Call,
            Self::Put { .. } => EffectKind::Put,
            Self::Take { .. } => EffectKind::Take,
            Self::Fork { .. } => EffectKind::Fork,
            Self::Join { .. } => EffectKind::Join,
            Self::Cancel { .. } => EffectKind::Cancel,
            Self::All { .. } => EffectKind::All,
            Self::Race { .. } => EffectKind::Race,
            Self::Select { .. } => EffectKind::Select,
        }
    }

    /// Short label for logs: the kind plus the target it names
    pub fn label(&self) -> String {
        match self {
            Self::Call { target, .. } => format!("CALL {}", target.name()),
            Self::Put { action } => format!("PUT {}", action.action_type),
            Self::Take { pattern } => format!("TAKE {pattern}"),
            Self::Fork { saga, .. } => format!("FORK {}", saga.name()),
            Self::Join { task } => format!("JOIN {}", task.id),
            Self::Cancel { task } => format!("CANCEL {}", task.id),
            Self::All { effects } => format!("ALL x{}", effects.len()),
            Self::Race { effects } => format!("RACE x{}", effects.len()),
            Self::Select { selector, .. } => format!("SELECT {}", selector.name()),
        }
    }

    /// JSON wire shape, for comparisons and monitor payloads
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.label()))
    }
}

pub fn call(target: CallTarget, args: Vec<Value>) -> Effect {
    Effect::Call { target, args }
}

pub fn put(action: Action) -> Effect {
    Effect::Put { action }
}

pub fn take(pattern: impl Into<Pattern>) -> Effect {
    Effect::Take {
        pattern: pattern.into(),
    }
}

pub fn fork(saga: SagaFn, args: Vec<Value>) -> Effect {
    Effect::Fork { saga, args }
}

pub fn join(task: TaskHandle) -> Effect {
    Effect::Join { task }
}

pub fn cancel(task: TaskHandle) -> Effect {
    Effect::Cancel { task }
}

pub fn all(effects: Vec<Effect>) -> Effect {
    Effect::All { effects }
}

/// RACE over named branches; the result object carries the winner's name
pub fn race<N: Into<String>>(branches: Vec<(N, Effect)>) -> Effect {
    Effect::Race {
        effects: RaceBranches(
            branches
                .into_iter()
                .map(|(name, effect)| (name.into(), effect))
                .collect(),
        ),
    }
}

/// RACE whose branches are named by position: "0", "1", ...
pub fn race_indexed(effects: Vec<Effect>) -> Effect {
    race(
        effects
            .into_iter()
            .enumerate()
            .map(|(index, effect)| (index.to_string(), effect))
            .collect(),
    )
}

pub fn select(selector: Selector, args: Vec<Value>) -> Effect {
    Effect::Select { selector, args }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::delay;
    use crate::task::TaskId;
    use serde_json::json;

    #[test]
    fn test_descriptors_are_structurally_equal() {
        assert_eq!(call(delay(), vec![json!(1000)]), call(delay(), vec![json!(1000)]));
        assert_ne!(call(delay(), vec![json!(1000)]), call(delay(), vec![json!(500)]));
        assert_eq!(take("INCREMENT_ASYNC"), take("INCREMENT_ASYNC"));
        assert_ne!(take("INCREMENT_ASYNC"), take("*"));

        let handle = TaskHandle::new(TaskId(1), "worker");
        assert_eq!(join(handle.clone()), join(handle.clone()));
        assert_ne!(join(handle.clone()), cancel(handle));
    }

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            call(delay(), vec![json!(1000)]).to_json(),
            json!({"kind": "CALL", "fn": "delay", "args": [1000]})
        );
        assert_eq!(
            put(Action::new("INCREMENT")).to_json(),
            json!({"kind": "PUT", "action": {"type": "INCREMENT"}})
        );
        assert_eq!(
            take(vec!["A", "B"]).to_json(),
            json!({"kind": "TAKE", "pattern": ["A", "B"]})
        );
        assert_eq!(
            cancel(TaskHandle::new(TaskId(4), "poller")).to_json(),
            json!({"kind": "CANCEL", "task": {"id": 4, "name": "poller"}})
        );
        assert_eq!(
            race(vec![("response", take("DONE")), ("timeout", call(delay(), vec![json!(50)]))])
                .to_json(),
            json!({
                "kind": "RACE",
                "effects": {
                    "response": {"kind": "TAKE", "pattern": "DONE"},
                    "timeout": {"kind": "CALL", "fn": "delay", "args": [50]}
                }
            })
        );
    }

    #[test]
    fn test_kind_and_label() {
        let effect = all(vec![take("A"), put(Action::new("B"))]);
        assert_eq!(effect.kind(), EffectKind::All);
        assert_eq!(effect.label(), "ALL x2");
        assert!(EffectKind::Fork.never_suspends());
        assert!(!EffectKind::Take.never_suspends());
    }

    #[test]
    fn test_race_indexed_names_branches_by_position() {
        match race_indexed(vec![take("A"), take("B")]) {
            Effect::Race { effects } => {
                let names: Vec<_> = effects.0.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["0", "1"]);
            }
            other => panic!("expected race, got {other:?}"),
        }
    }
}
