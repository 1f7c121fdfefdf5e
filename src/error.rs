//! # Saga Errors
//!
//! Two families of errors flow through the runtime:
//!
//! - [`SagaError`] is delivered *into* tasks. It is what a computation sees when
//!   a CALL or PUT collaborator fails, when a joined task errored, or when a
//!   forked child escalates. Computations may recover from it locally.
//! - [`RuntimeError`] is returned *from* the interpreter's entry points. It
//!   signals an internal-consistency failure or misconfiguration and is never
//!   injected into a task.

use crate::effects::EffectKind;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recoverable error injected into a task at its next resumption
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "snake_case")]
pub enum SagaError {
    #[error("{kind} effect failed in {target}: {reason}")]
    EffectExecution {
        kind: EffectKind,
        target: String,
        reason: String,
    },

    #[error("child task {task_id} ({name}) failed: {reason}")]
    ChildFailed {
        task_id: TaskId,
        name: String,
        reason: Box<SagaError>,
    },

    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("{0}")]
    Failed(String),
}

impl SagaError {
    /// Error raised by a computation or collaborator with a plain message
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Error attributed to the collaborator behind an effect
    pub fn effect(kind: EffectKind, target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EffectExecution {
            kind,
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Walk `ChildFailed` wrappers down to the error that started the escalation
    pub fn root_cause(&self) -> &SagaError {
        match self {
            Self::ChildFailed { reason, .. } => reason.root_cause(),
            other => other,
        }
    }
}

/// Failure reported by the external store when applying an action
#[derive(Error, Debug, Clone, PartialEq)]
#[error("store rejected action '{action_type}': {reason}")]
pub struct StoreError {
    pub action_type: String,
    pub reason: String,
}

impl StoreError {
    pub fn new(action_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal runtime errors surfaced to whoever drives the interpreter
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Subscription {subscription} survived a one-shot match on '{action_type}'")]
    SubscriptionLeak {
        subscription: u64,
        action_type: String,
    },

    #[error("Step budget of {limit} exhausted without the runtime going idle")]
    StepBudgetExceeded { limit: usize },

    #[error("Task {0} has no computation attached")]
    MissingTaskBody(TaskId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, SagaError>;
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
