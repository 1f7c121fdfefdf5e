//! Named callables referenced from effect descriptors.
//!
//! Descriptors must compare as data, so every callable carries a registered
//! name. Two targets with the same name are equal, and serialize to that name.

use crate::completion::Completion;
use crate::error::SagaError;
use crate::saga::Saga;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What a CALL target hands back to the interpreter
pub enum CallOutcome {
    /// Settled synchronously; the task resumes on the next tick
    Ready(Result<Value, SagaError>),
    /// Settles later through the completion's on-settle callback
    Pending(Box<dyn Completion>),
}

impl CallOutcome {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Ready(Ok(value.into()))
    }

    pub fn error(err: SagaError) -> Self {
        Self::Ready(Err(err))
    }

    pub fn pending(completion: impl Completion + 'static) -> Self {
        Self::Pending(Box::new(completion))
    }
}

impl fmt::Debug for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Pending(_) => write!(f, "Pending(<completion>)"),
        }
    }
}

type CallFn = dyn Fn(&[Value]) -> CallOutcome + Send + Sync;

/// Function invoked by a CALL effect
#[derive(Clone)]
pub struct CallTarget {
    name: Arc<str>,
    func: Arc<CallFn>,
}

impl CallTarget {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> CallOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    /// Target that always settles synchronously
    pub fn sync(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, SagaError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, move |args| CallOutcome::Ready(func(args)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: &[Value]) -> CallOutcome {
        (self.func)(args)
    }
}

type SagaFactory = dyn Fn(&[Value]) -> Box<dyn Saga> + Send + Sync;

/// Factory for resumable computations, referenced by FORK and root runs
#[derive(Clone)]
pub struct SagaFn {
    name: Arc<str>,
    factory: Arc<SagaFactory>,
}

impl SagaFn {
    pub fn new<S, F>(name: impl Into<String>, factory: F) -> Self
    where
        S: Saga + 'static,
        F: Fn(&[Value]) -> S + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            factory: Arc::new(move |args| Box::new(factory(args)) as Box<dyn Saga>),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a fresh computation for a new task
    pub fn instantiate(&self, args: &[Value]) -> Box<dyn Saga> {
        (self.factory)(args)
    }
}

type SelectorFn = dyn Fn(&Value, &[Value]) -> Value + Send + Sync;

/// Projection over store state, used by SELECT
#[derive(Clone)]
pub struct Selector {
    name: Arc<str>,
    select: Arc<SelectorFn>,
}

impl Selector {
    pub fn new(
        name: impl Into<String>,
        select: impl Fn(&Value, &[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Arc::from(name.into()),
            select: Arc::new(select),
        }
    }

    /// Selector reading a JSON pointer such as `/counter`
    pub fn pointer(pointer: impl Into<String>) -> Self {
        let pointer = pointer.into();
        let name = format!("pointer:{pointer}");
        Self::new(name, move |state, _| {
            state.pointer(&pointer).cloned().unwrap_or(Value::Null)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn select(&self, state: &Value, args: &[Value]) -> Value {
        (self.select)(state, args)
    }
}

macro_rules! named_callable {
    ($ty:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.name == other.name
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($ty)).field(&self.name).finish()
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.name)
            }
        }
    };
}

named_callable!(CallTarget);
named_callable!(SagaFn);
named_callable!(Selector);
