#![allow(clippy::doc_markdown)] // Allow technical terms like FIFO, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Saga Core
//!
//! Effect-based saga interpreter. Long-lived tasks are written as resumable
//! computations that never perform side effects themselves: they yield inert
//! effect descriptors (CALL, PUT, TAKE, FORK, JOIN, CANCEL, ALL, RACE, SELECT)
//! and the [`interpreter::Interpreter`] performs them, resuming each task with
//! the outcome.
//!
//! ## Overview
//!
//! - Task logic is testable without running it: step a body by hand and
//!   compare the descriptors it yields.
//! - Tasks form a tree. FORK attaches a child, cancellation cascades down the
//!   tree, and uncaught errors escalate up it.
//! - An in-process action bus connects PUT and external dispatches to
//!   TAKE-waiting tasks.
//!
//! ## Module Organization
//!
//! - [`effects`] - Effect descriptors, actions, patterns, named callables
//! - [`saga`] - The resumable computation trait and its builders
//! - [`interpreter`] - Scheduling, effect execution, cancellation, escalation
//! - [`bus`] - Action bus
//! - [`completion`] - Asynchronous CALL results
//! - [`store`] - External store collaborator
//! - [`monitor`] - Lifecycle event broadcasting
//! - [`config`] - Runtime configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use saga_core::effects::{put, take, Action, SagaFn};
//! use saga_core::interpreter::Interpreter;
//! use saga_core::saga::Sequence;
//! use saga_core::store::ReducerStore;
//! use saga_core::task::TaskState;
//!
//! let mut runtime = Interpreter::new(ReducerStore::inert());
//! let saga = SagaFn::new("relay", |_| {
//!     Sequence::new()
//!         .effect(take("PING"))
//!         .effect(put(Action::new("PONG")))
//! });
//!
//! let task = runtime.run(&saga, vec![]).unwrap();
//! assert_eq!(runtime.task_state(&task), Some(TaskState::Suspended));
//!
//! runtime.dispatch(Action::new("PING")).unwrap();
//! assert_eq!(runtime.task_state(&task), Some(TaskState::Done));
//! ```

pub mod bus;
pub mod completion;
pub mod config;
pub mod constants;
pub mod effects;
pub mod error;
pub mod interpreter;
pub mod logging;
pub mod monitor;
pub mod saga;
pub mod store;
pub mod task;

mod supervisor;

pub use bus::{ActionBus, Delivery, SubscriptionId};
pub use completion::{delay, from_future, AbortHandle, Completion, Deferred};
pub use config::RuntimeConfig;
pub use effects::{
    all, call, cancel, fork, join, put, race, race_indexed, select, take, Action, CallOutcome,
    CallTarget, Effect, EffectKind, Pattern, SagaFn, Selector,
};
pub use error::{Result, RuntimeError, RuntimeResult, SagaError, StoreError};
pub use interpreter::{Interpreter, UncaughtError};
pub use monitor::{MonitorEvent, SagaMonitor};
pub use saga::{Input, Saga, Sequence, Step, TakeEvery, TakeLatest};
pub use store::{ReducerStore, Store};
pub use task::{TaskHandle, TaskId, TaskOutcome, TaskState};
