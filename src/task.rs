use crate::error::SagaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Arena identity of a task; never reused within one interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Non-owning reference to a task, handed out by FORK and `Interpreter::run`
///
/// Handles travel through the JSON values tasks are resumed with, so they
/// serialize as `{"id": .., "name": ..}` and can be read back with
/// [`TaskHandle::from_value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: TaskId,
    pub name: String,
}

impl TaskHandle {
    pub fn new(id: TaskId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "id": self.id.0, "name": self.name })
    }

    /// Recover a handle from a FORK result value
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.name)
    }
}

/// Task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Queued for, or in the middle of, an advance
    Running,
    /// Parked on an effect that has not settled yet
    Suspended,
    /// Computation returned a result
    Done,
    /// Computation raised without recovering
    Errored,
    /// Stopped on purpose, by CANCEL, a parent, or `stop()`
    Cancelled,
}

impl TaskState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Errored | Self::Cancelled)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Suspended => write!(f, "suspended"),
            Self::Done => write!(f, "done"),
            Self::Errored => write!(f, "errored"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "suspended" => Ok(Self::Suspended),
            "done" => Ok(Self::Done),
            "errored" => Ok(Self::Errored),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Running
    }
}

/// Final outcome of a terminal task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum TaskOutcome {
    Done(Value),
    Errored(SagaError),
    Cancelled,
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            Self::Done(_) => TaskState::Done,
            Self::Errored(_) => TaskState::Errored,
            Self::Cancelled => TaskState::Cancelled,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Done(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SagaError> {
        match self {
            Self::Errored(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_terminal_check() {
        assert!(TaskState::Done.is_terminal());
        assert!(TaskState::Errored.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(!TaskState::Suspended.is_terminal());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(TaskState::Suspended.to_string(), "suspended");
        assert_eq!("cancelled".parse::<TaskState>().unwrap(), TaskState::Cancelled);
        assert!("paused".parse::<TaskState>().is_err());
    }

    #[test]
    fn test_handle_value_round_trip() {
        let handle = TaskHandle::new(TaskId(7), "worker");
        let value = handle.to_value();
        assert_eq!(value, serde_json::json!({"id": 7, "name": "worker"}));
        assert_eq!(TaskHandle::from_value(&value), Some(handle));
        assert_eq!(TaskHandle::from_value(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_outcome_accessors() {
        let done = TaskOutcome::Done(serde_json::json!(3));
        assert_eq!(done.state(), TaskState::Done);
        assert_eq!(done.value(), Some(&serde_json::json!(3)));
        assert!(done.error().is_none());

        let failed = TaskOutcome::Errored(SagaError::failed("nope"));
        assert_eq!(failed.state(), TaskState::Errored);
        assert_eq!(failed.error(), Some(&SagaError::failed("nope")));
    }
}
