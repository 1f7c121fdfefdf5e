//! # Asynchronous Completions
//!
//! A CALL target that cannot answer immediately returns a [`Completion`]. The
//! only thing the interpreter ever does with one is register an on-settle
//! callback, which keeps suspension logic independent of any particular
//! executor:
//!
//! - [`Deferred`] is settled by hand. Tests use it to drive CALLs
//!   deterministically.
//! - [`from_future`] adapts a future by spawning it onto the current tokio
//!   runtime.
//! - [`delay`] is the stock `delay` CALL target built on `tokio::time::sleep`.

use crate::effects::{CallOutcome, CallTarget, EffectKind};
use crate::error::SagaError;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Name of the built-in delay target
pub const DELAY: &str = "delay";

/// Callback invoked exactly once with the settled result
pub type SettleFn = Box<dyn FnOnce(Result<Value, SagaError>) + Send>;

/// Promise-like value whose only primitive is "call me when settled"
pub trait Completion: Send {
    /// Register the callback; the returned handle abandons the wait
    fn on_settle(self: Box<Self>, callback: SettleFn) -> AbortHandle;
}

/// Abandons an outstanding completion; its eventual result is discarded
#[derive(Default)]
pub struct AbortHandle {
    abort: Option<Box<dyn FnOnce() + Send>>,
}

impl AbortHandle {
    pub fn new(abort: impl FnOnce() + Send + 'static) -> Self {
        Self {
            abort: Some(Box::new(abort)),
        }
    }

    /// Handle for completions that have nothing to release
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn abort(mut self) {
        if let Some(abort) = self.abort.take() {
            abort();
        }
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("armed", &self.abort.is_some())
            .finish()
    }
}

#[derive(Default)]
struct DeferredInner {
    result: Option<Result<Value, SagaError>>,
    callback: Option<SettleFn>,
    settled: bool,
    aborted: bool,
}

/// Manually settled completion
///
/// Clones share state, so a test can hand one clone to a CALL target and
/// settle another.
#[derive(Clone, Default)]
pub struct Deferred {
    inner: Arc<Mutex<DeferredInner>>,
}

impl Deferred {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if already settled or abandoned
    pub fn resolve(&self, value: impl Into<Value>) -> bool {
        self.settle(Ok(value.into()))
    }

    /// Returns false if already settled or abandoned
    pub fn reject(&self, err: SagaError) -> bool {
        self.settle(Err(err))
    }

    fn settle(&self, result: Result<Value, SagaError>) -> bool {
        let callback = {
            let mut inner = self.inner.lock();
            if inner.settled || inner.aborted {
                return false;
            }
            inner.settled = true;
            match inner.callback.take() {
                Some(callback) => Some((callback, result)),
                None => {
                    inner.result = Some(result);
                    None
                }
            }
        };

        // outside the lock: the callback may touch this deferred again
        if let Some((callback, result)) = callback {
            callback(result);
        }
        true
    }

    pub fn is_settled(&self) -> bool {
        self.inner.lock().settled
    }

    /// True once the interpreter abandoned the wait on this completion
    pub fn is_aborted(&self) -> bool {
        self.inner.lock().aborted
    }

    pub fn has_listener(&self) -> bool {
        self.inner.lock().callback.is_some()
    }

    /// CALL target that answers every invocation with this deferred
    pub fn as_target(&self, name: impl Into<String>) -> CallTarget {
        let deferred = self.clone();
        CallTarget::new(name, move |_| CallOutcome::pending(deferred.clone()))
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Deferred")
            .field("settled", &inner.settled)
            .field("aborted", &inner.aborted)
            .finish()
    }
}

impl Completion for Deferred {
    fn on_settle(self: Box<Self>, callback: SettleFn) -> AbortHandle {
        let mut inner = self.inner.lock();
        if let Some(result) = inner.result.take() {
            drop(inner);
            callback(result);
            return AbortHandle::noop();
        }
        inner.callback = Some(callback);
        drop(inner);

        let shared = Arc::clone(&self.inner);
        AbortHandle::new(move || {
            let mut inner = shared.lock();
            inner.aborted = true;
            inner.callback = None;
        })
    }
}

/// Completion backed by a future spawned on the ambient tokio runtime
pub struct FutureCompletion {
    future: BoxFuture<'static, Result<Value, SagaError>>,
}

/// Adapt a future into a [`Completion`]
pub fn from_future<F>(future: F) -> FutureCompletion
where
    F: Future<Output = Result<Value, SagaError>> + Send + 'static,
{
    FutureCompletion {
        future: future.boxed(),
    }
}

impl Completion for FutureCompletion {
    fn on_settle(self: Box<Self>, callback: SettleFn) -> AbortHandle {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let future = self.future;
                let handle = runtime.spawn(async move {
                    let result = future.await;
                    callback(result);
                });
                AbortHandle::new(move || handle.abort())
            }
            Err(err) => {
                callback(Err(SagaError::effect(
                    EffectKind::Call,
                    "from_future",
                    format!("no tokio runtime available: {err}"),
                )));
                AbortHandle::noop()
            }
        }
    }
}

/// The `delay` CALL target: `call(delay(), [millis])` or `[millis, value]`
///
/// Resumes with `value`, or `true` when none is given.
pub fn delay() -> CallTarget {
    CallTarget::new(DELAY, |args| {
        let Some(millis) = args.first().and_then(Value::as_u64) else {
            return CallOutcome::error(SagaError::effect(
                EffectKind::Call,
                DELAY,
                "expected a millisecond count as the first argument",
            ));
        };
        let value = args.get(1).cloned().unwrap_or(Value::Bool(true));
        CallOutcome::pending(from_future(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(value)
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;

    fn capture() -> (SettleFn, mpsc::Receiver<Result<Value, SagaError>>) {
        let (tx, rx) = mpsc::channel();
        let callback: SettleFn = Box::new(move |result| {
            let _ = tx.send(result);
        });
        (callback, rx)
    }

    #[test]
    fn test_deferred_settles_after_registration() {
        let deferred = Deferred::new();
        let (callback, rx) = capture();
        let _abort = Box::new(deferred.clone()).on_settle(callback);

        assert!(deferred.has_listener());
        assert!(rx.try_recv().is_err());
        assert!(deferred.resolve(json!(42)));
        assert_eq!(rx.try_recv().unwrap(), Ok(json!(42)));
        assert!(!deferred.resolve(json!(43)));
    }

    #[test]
    fn test_deferred_settled_before_registration() {
        let deferred = Deferred::new();
        assert!(deferred.reject(SagaError::failed("down")));

        let (callback, rx) = capture();
        let _abort = Box::new(deferred.clone()).on_settle(callback);
        assert_eq!(rx.try_recv().unwrap(), Err(SagaError::failed("down")));
    }

    #[test]
    fn test_abort_discards_late_result() {
        let deferred = Deferred::new();
        let (callback, rx) = capture();
        let abort = Box::new(deferred.clone()).on_settle(callback);

        abort.abort();
        assert!(deferred.is_aborted());
        assert!(!deferred.resolve(json!(1)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_delay_rejects_missing_duration() {
        match delay().invoke(&[]) {
            CallOutcome::Ready(Err(SagaError::EffectExecution { target, .. })) => {
                assert_eq!(target, DELAY)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_future_completion_without_runtime_fails_fast() {
        let (callback, rx) = capture();
        let _abort = Box::new(from_future(async { Ok(json!(1)) })).on_settle(callback);
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(SagaError::EffectExecution { .. })
        ));
    }

    #[test]
    fn test_future_completion_settles_on_runtime() {
        tokio_test::block_on(async {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let completion = Box::new(from_future(async { Ok(json!("done")) }));
            let _abort = completion.on_settle(Box::new(move |result| {
                let _ = tx.send(result);
            }));
            assert_eq!(rx.await.unwrap(), Ok(json!("done")));
        });
    }

    #[tokio::test]
    async fn test_delay_resolves_on_runtime() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let outcome = delay().invoke(&[json!(5), json!("tick")]);
        let CallOutcome::Pending(completion) = outcome else {
            panic!("delay should be pending");
        };
        let _abort = completion.on_settle(Box::new(move |result| {
            let _ = tx.send(result);
        }));

        assert_eq!(rx.await.unwrap(), Ok(json!("tick")));
    }
}
