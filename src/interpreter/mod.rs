//! # Effect Interpreter
//!
//! Drives every task's computation: advance the body, execute the effect it
//! yields, and resume it with the outcome once that outcome exists.
//!
//! ## Scheduling
//!
//! All execution happens on the thread that owns the [`Interpreter`]. Every
//! resumption, immediate or not, is appended to a FIFO ready queue and
//! performed by [`Interpreter::run_until_idle`]:
//!
//! - effects that settle synchronously resume their task on the next tick of
//!   the queue, in the order they settled;
//! - asynchronous completions settle into a shared inbox (they may fire on
//!   another thread) which is drained into the queue between ticks.
//!
//! Each task carries an epoch that is bumped whenever it is scheduled or
//! cancelled. A queued resumption or a settling wait remembers the epoch it
//! was created under; a mismatch means the task moved on and the result is
//! discarded. That is how a RACE loser or a cancelled CALL can never resume
//! anything.
//!
//! ## Waits
//!
//! A suspended task (or an ALL/RACE branch) is parked on exactly one wait.
//! The wait records how to release whatever it is parked on: abort the
//! completion, unsubscribe from the bus, leave a joined task's joiner list,
//! or abandon a whole group. Cancellation always goes through that release
//! path, so nothing outlives the task that was waiting for it.

mod groups;

use crate::bus::{ActionBus, Delivery, SubscriptionId};
use crate::completion::AbortHandle;
use crate::config::RuntimeConfig;
use crate::constants::events;
use crate::effects::{Action, CallOutcome, Effect, EffectKind, SagaFn};
use crate::error::{RuntimeError, RuntimeResult, SagaError};
use crate::logging::{log_effect_operation, log_error, log_task_operation};
use crate::monitor::SagaMonitor;
use crate::saga::{Input, Step};
use crate::store::Store;
use crate::supervisor::Supervisor;
use crate::task::{TaskHandle, TaskId, TaskOutcome, TaskState};
use chrono::{DateTime, Utc};
use groups::{Group, GroupId, GroupKind};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Identity of one outstanding effect wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct WaitId(pub u64);

/// Who continues once a wait settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resumer {
    Task { task: TaskId, epoch: u64 },
    Branch { group: GroupId, index: usize },
}

#[derive(Debug)]
enum WaitKind {
    Call { abort: Option<AbortHandle> },
    Take { subscription: Option<SubscriptionId> },
    Join { target: TaskId },
    Group(GroupId),
}

#[derive(Debug)]
struct Wait {
    resumer: Resumer,
    owner: TaskId,
    effect: EffectKind,
    kind: WaitKind,
}

/// How an effect settled, from the waiting side
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Value(Value),
    Error(SagaError),
    /// The awaited task was cancelled; cancels the waiter in turn
    Cancelled,
}

impl From<TaskOutcome> for Outcome {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Done(value) => Self::Value(value),
            TaskOutcome::Errored(err) => Self::Error(err),
            TaskOutcome::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug)]
struct Ready {
    task: TaskId,
    epoch: u64,
    input: Input,
}

#[derive(Debug)]
struct Settlement {
    wait: WaitId,
    result: Result<Value, SagaError>,
}

/// Settlements handed over by completion callbacks
#[derive(Debug, Default)]
struct Inbox {
    queue: Mutex<VecDeque<Settlement>>,
    notify: Notify,
}

impl Inbox {
    fn push(&self, settlement: Settlement) {
        self.queue.lock().push_back(settlement);
        self.notify.notify_one();
    }

    fn drain(&self) -> Vec<Settlement> {
        self.queue.lock().drain(..).collect()
    }

    fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Error that escaped every task up to and including a root
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncaughtError {
    /// Root of the tree the error escaped from
    pub root: TaskHandle,
    /// Task whose computation raised
    pub task: TaskHandle,
    pub error: SagaError,
    pub reported_at: DateTime<Utc>,
}

/// Single-threaded effect interpreter over a [`Store`]
pub struct Interpreter<S: Store> {
    id: Uuid,
    config: RuntimeConfig,
    store: S,
    tasks: Supervisor,
    bus: ActionBus<WaitId>,
    waits: HashMap<WaitId, Wait>,
    groups: HashMap<GroupId, Group>,
    ready: VecDeque<Ready>,
    inbox: Arc<Inbox>,
    roots: Vec<TaskId>,
    uncaught: Vec<UncaughtError>,
    monitor: SagaMonitor,
    next_wait: u64,
    next_group: u64,
}

impl<S: Store> Interpreter<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, RuntimeConfig::default())
    }

    pub fn with_config(store: S, config: RuntimeConfig) -> Self {
        let id = Uuid::new_v4();
        let monitor = SagaMonitor::new(config.monitor_capacity, id);
        let tasks = Supervisor::new(config.tombstone_capacity);
        info!(
            interpreter_id = %id,
            environment = %config.environment,
            max_steps_per_run = config.max_steps_per_run,
            tombstone_capacity = config.tombstone_capacity,
            "Saga interpreter created"
        );
        Self {
            id,
            config,
            store,
            tasks,
            bus: ActionBus::new(),
            waits: HashMap::new(),
            groups: HashMap::new(),
            ready: VecDeque::new(),
            inbox: Arc::new(Inbox::default()),
            roots: Vec::new(),
            uncaught: Vec::new(),
            monitor,
            next_wait: 1,
            next_group: 1,
        }
    }

    // =========================================================================
    // Driving
    // =========================================================================

    /// Start a root task and run until nothing more can happen synchronously
    pub fn run(&mut self, saga: &SagaFn, args: Vec<Value>) -> RuntimeResult<TaskHandle> {
        let handle = self.start_root(saga, args);
        self.run_until_idle()?;
        Ok(handle)
    }

    /// Start several independent roots before running any of them
    pub fn run_all(&mut self, sagas: &[(SagaFn, Vec<Value>)]) -> RuntimeResult<Vec<TaskHandle>> {
        let handles = sagas
            .iter()
            .map(|(saga, args)| self.start_root(saga, args.clone()))
            .collect();
        self.run_until_idle()?;
        Ok(handles)
    }

    /// External dispatch: apply to the store, wake matching TAKEs, run
    ///
    /// A store rejection is returned to the caller; no task is involved.
    pub fn dispatch(&mut self, action: Action) -> RuntimeResult<usize> {
        self.store.dispatch(&action)?;
        self.publish(&action, None)?;
        self.run_until_idle()
    }

    /// Advance tasks until the ready queue and the completion inbox are empty
    ///
    /// Returns the number of advances performed.
    pub fn run_until_idle(&mut self) -> RuntimeResult<usize> {
        let limit = self.config.max_steps_per_run;
        let mut steps = 0;

        loop {
            self.drain_inbox();
            let Some(ready) = self.ready.pop_front() else {
                break;
            };
            if steps >= limit {
                self.ready.push_front(ready);
                warn!(limit, "Step budget exhausted before the runtime went idle");
                return Err(RuntimeError::StepBudgetExceeded { limit });
            }
            if self.step(ready)? {
                steps += 1;
            }
        }

        Ok(steps)
    }

    /// Run, then keep waiting for asynchronous completions until none remain
    ///
    /// Tasks parked only on TAKE or JOIN do not keep this alive.
    pub async fn run_to_completion(&mut self) -> RuntimeResult<usize> {
        let mut steps = self.run_until_idle()?;
        while self.has_outstanding_calls() {
            let inbox = Arc::clone(&self.inbox);
            if inbox.is_empty() {
                inbox.notify.notified().await;
            }
            steps += self.run_until_idle()?;
        }
        Ok(steps)
    }

    /// Cancel every root task and, through them, everything they forked
    pub fn stop(&mut self) {
        let roots = self.roots.clone();
        for root in roots {
            self.cancel_task(root);
        }
        info!(interpreter_id = %self.id, "Saga interpreter stopped");
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn monitor(&self) -> &SagaMonitor {
        &self.monitor
    }

    pub fn task_state(&self, task: &TaskHandle) -> Option<TaskState> {
        self.tasks.state(task.id)
    }

    pub fn task_outcome(&self, task: &TaskHandle) -> Option<TaskOutcome> {
        self.tasks.outcome(task.id).cloned()
    }

    /// Attached children that have not been reclaimed yet
    pub fn children(&self, task: &TaskHandle) -> Vec<TaskHandle> {
        self.handles(self.tasks.children(task.id))
    }

    /// Children the task forked whose record or tombstone is still kept
    pub fn forked(&self, task: &TaskHandle) -> Vec<TaskHandle> {
        self.handles(self.tasks.forked(task.id))
    }

    pub fn roots(&self) -> Vec<TaskHandle> {
        self.handles(self.roots.clone())
    }

    pub fn live_task_count(&self) -> usize {
        self.tasks.live_count()
    }

    /// Task records not yet reclaimed
    pub fn retained_task_count(&self) -> usize {
        self.tasks.record_count()
    }

    /// Reclaimed tasks still answering lookups and late JOINs
    pub fn tombstone_count(&self) -> usize {
        self.tasks.tombstone_count()
    }

    pub fn pending_wait_count(&self) -> usize {
        self.waits.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.len()
    }

    pub fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.inbox.is_empty()
    }

    pub fn uncaught_errors(&self) -> &[UncaughtError] {
        &self.uncaught
    }

    pub fn take_uncaught_errors(&mut self) -> Vec<UncaughtError> {
        std::mem::take(&mut self.uncaught)
    }

    fn handles(&self, ids: Vec<TaskId>) -> Vec<TaskHandle> {
        ids.into_iter().filter_map(|id| self.tasks.handle(id)).collect()
    }

    fn has_outstanding_calls(&self) -> bool {
        self.waits
            .values()
            .any(|wait| matches!(wait.kind, WaitKind::Call { .. }))
    }

    // =========================================================================
    // Task lifecycle
    // =========================================================================

    fn start_root(&mut self, saga: &SagaFn, args: Vec<Value>) -> TaskHandle {
        let body = saga.instantiate(&args);
        let handle = self.tasks.spawn(saga.name(), body, None);
        self.roots.push(handle.id);
        self.task_started(&handle, None);
        self.schedule(handle.id, Input::Start);
        handle
    }

    fn task_started(&self, handle: &TaskHandle, parent: Option<TaskId>) {
        debug!(task = %handle, parent = ?parent, "Task started");
        self.monitor.publish(
            events::TASK_STARTED,
            Some(handle.id),
            json!({ "name": handle.name, "parent": parent }),
        );
    }

    /// Queue `input` for the task under a fresh epoch
    fn schedule(&mut self, task: TaskId, input: Input) {
        let Some(record) = self.tasks.get_mut(task) else {
            return;
        };
        if record.state.is_terminal() {
            return;
        }
        record.epoch += 1;
        record.state = TaskState::Running;
        self.ready.push_back(Ready {
            task,
            epoch: record.epoch,
            input,
        });
    }

    /// Perform one queued resumption; false when it turned out to be stale
    fn step(&mut self, ready: Ready) -> RuntimeResult<bool> {
        let Ready { task, epoch, input } = ready;
        let Some(record) = self.tasks.get_mut(task) else {
            return Ok(false);
        };
        if record.epoch != epoch || record.state.is_terminal() {
            trace!(task = %task, "Discarding stale resumption");
            return Ok(false);
        }

        let mut body = record
            .body
            .take()
            .ok_or(RuntimeError::MissingTaskBody(task))?;
        let step = match input {
            Input::Error(err) => body.inject_error(err),
            input => body.advance(input),
        };
        if let Some(record) = self.tasks.get_mut(task) {
            record.body = Some(body);
        }

        match step {
            Step::Yield(effect) => {
                self.effect_triggered(task, &effect);
                self.execute(task, effect, Resumer::Task { task, epoch })?;
            }
            Step::Done(value) => self.finish(task, TaskOutcome::Done(value)),
            Step::Error(err) => self.finish(task, TaskOutcome::Errored(err)),
        }
        Ok(true)
    }

    /// Record a Done or Errored outcome and propagate it
    fn finish(&mut self, task: TaskId, outcome: TaskOutcome) {
        let Some(handle) = self.tasks.get(task).map(|r| r.handle.clone()) else {
            return;
        };
        if !self.tasks.is_live(task) {
            return;
        }
        self.tasks.on_terminal(task, outcome.clone());

        match &outcome {
            TaskOutcome::Done(value) => {
                log_task_operation("finish", &handle, "done", None);
                self.monitor.publish(
                    events::TASK_DONE,
                    Some(task),
                    json!({ "name": handle.name, "result": value }),
                );
            }
            TaskOutcome::Errored(err) => {
                log_task_operation("finish", &handle, "errored", Some(&err.to_string()));
                self.monitor.publish(
                    events::TASK_ERRORED,
                    Some(task),
                    json!({ "name": handle.name, "error": err }),
                );
            }
            TaskOutcome::Cancelled => {}
        }

        self.notify_joiners(task, &outcome);

        if let TaskOutcome::Errored(err) = outcome {
            // an errored task takes its subtree with it
            for child in self.tasks.children(task) {
                self.cancel_task(child);
            }
            self.escalate(&handle, err);
        }

        self.reclaim(task);
    }

    /// Deliver a task's uncaught error up the tree
    fn escalate(&mut self, handle: &TaskHandle, err: SagaError) {
        for sibling in self.tasks.live_siblings(handle.id) {
            self.cancel_task(sibling);
        }

        match self.tasks.escalation_target(handle.id) {
            Some(target) => {
                debug!(task = %handle, target = %target, "Escalating child failure");
                let error = SagaError::ChildFailed {
                    task_id: handle.id,
                    name: handle.name.clone(),
                    reason: Box::new(err),
                };
                self.inject_error(target, error);
            }
            None => {
                let root_id = self.tasks.root_of(handle.id);
                let root = self
                    .tasks
                    .handle(root_id)
                    .unwrap_or_else(|| handle.clone());
                log_error(
                    "interpreter",
                    "escalate",
                    &err.to_string(),
                    Some(&format!("root {root}")),
                );
                self.monitor.publish(
                    events::ROOT_UNCAUGHT_ERROR,
                    Some(root.id),
                    json!({ "root": root.name, "task": handle.name, "error": err }),
                );
                self.uncaught.push(UncaughtError {
                    root,
                    task: handle.clone(),
                    error: err,
                    reported_at: Utc::now(),
                });
            }
        }
    }

    /// Abandon whatever the task is waiting on and resume it with `err`
    fn inject_error(&mut self, task: TaskId, err: SagaError) {
        if !self.tasks.is_live(task) {
            return;
        }
        let wait = self.tasks.get_mut(task).and_then(|r| r.wait.take());
        if let Some(wait) = wait {
            self.abandon_wait(wait);
        }
        self.schedule(task, Input::Error(err));
    }

    /// Cancel `task` and its live descendants, innermost first
    ///
    /// A no-op for tasks that are already terminal.
    fn cancel_task(&mut self, task: TaskId) {
        let order = self.tasks.cancellation_order(task);
        for id in &order {
            self.cancel_one(*id);
        }
        for id in order {
            self.reclaim(id);
        }
    }

    fn cancel_one(&mut self, task: TaskId) {
        let Some(record) = self.tasks.get_mut(task) else {
            return;
        };
        if record.state.is_terminal() {
            return;
        }
        let handle = record.handle.clone();
        let wait = record.wait.take();
        let mut body = record.body.take();

        if let Some(wait) = wait {
            self.abandon_wait(wait);
        }
        self.tasks.on_terminal(task, TaskOutcome::Cancelled);
        if let Some(body) = body.as_mut() {
            body.on_cancel();
        }
        if let Some(record) = self.tasks.get_mut(task) {
            record.body = body;
        }

        log_task_operation("cancel", &handle, "cancelled", None);
        self.monitor.publish(
            events::TASK_CANCELLED,
            Some(task),
            json!({ "name": handle.name }),
        );
        self.notify_joiners(task, &TaskOutcome::Cancelled);
    }

    fn notify_joiners(&mut self, task: TaskId, outcome: &TaskOutcome) {
        let joiners = self
            .tasks
            .get_mut(task)
            .map(|r| std::mem::take(&mut r.joiners))
            .unwrap_or_default();
        for id in joiners {
            if let Some(wait) = self.waits.remove(&id) {
                self.resolve_wait(wait, Outcome::from(outcome.clone()));
            }
        }
    }

    fn reclaim(&mut self, task: TaskId) {
        let reclaimed = self.tasks.try_reclaim(task);
        if reclaimed.is_empty() {
            return;
        }
        for handle in &reclaimed {
            trace!(task = %handle, "Task reclaimed");
            self.monitor
                .publish(events::TASK_RECLAIMED, Some(handle.id), json!({ "name": handle.name }));
        }
        // roots are forgotten along with their evicted tombstones
        let tasks = &self.tasks;
        self.roots.retain(|root| tasks.contains(*root));
    }

    // =========================================================================
    // Effects
    // =========================================================================

    fn execute(&mut self, owner: TaskId, effect: Effect, resumer: Resumer) -> RuntimeResult<()> {
        let kind = effect.kind();
        match effect {
            Effect::Call { target, args } => match target.invoke(&args) {
                CallOutcome::Ready(Ok(value)) => self.settle(resumer, Outcome::Value(value)),
                CallOutcome::Ready(Err(err)) => self.settle(resumer, Outcome::Error(err)),
                CallOutcome::Pending(completion) => {
                    let wait = self.open_wait(resumer, owner, kind, WaitKind::Call { abort: None });
                    let inbox = Arc::clone(&self.inbox);
                    let abort = completion
                        .on_settle(Box::new(move |result| inbox.push(Settlement { wait, result })));
                    if let Some(Wait {
                        kind: WaitKind::Call { abort: slot },
                        ..
                    }) = self.waits.get_mut(&wait)
                    {
                        *slot = Some(abort);
                    }
                    self.park(resumer, wait);
                }
            },

            Effect::Put { action } => match self.store.dispatch(&action) {
                Ok(()) => {
                    self.publish(&action, Some(owner))?;
                    self.settle(resumer, Outcome::Value(Value::Null));
                }
                Err(err) => {
                    let error = SagaError::effect(kind, "store", err.to_string());
                    self.settle(resumer, Outcome::Error(error));
                }
            },

            Effect::Take { pattern } => {
                let wait = self.open_wait(
                    resumer,
                    owner,
                    kind,
                    WaitKind::Take { subscription: None },
                );
                let subscription = self.bus.subscribe(pattern, Delivery::Once, wait);
                if let Some(Wait {
                    kind: WaitKind::Take { subscription: slot },
                    ..
                }) = self.waits.get_mut(&wait)
                {
                    *slot = Some(subscription);
                }
                self.park(resumer, wait);
            }

            Effect::Fork { saga, args } => {
                let body = saga.instantiate(&args);
                let child = self.tasks.spawn(saga.name(), body, Some(owner));
                self.task_started(&child, Some(owner));
                // the child's first advance is queued ahead of the parent's resumption
                self.schedule(child.id, Input::Start);
                self.settle(resumer, Outcome::Value(child.to_value()));
            }

            Effect::Join { task } => {
                if task.id == owner {
                    let error = SagaError::effect(kind, task.id.to_string(), "a task cannot join itself");
                    self.settle(resumer, Outcome::Error(error));
                } else if let Some(outcome) = self.tasks.outcome(task.id).cloned() {
                    self.settle(resumer, outcome.into());
                } else if self.tasks.contains(task.id) {
                    let wait = self.open_wait(resumer, owner, kind, WaitKind::Join { target: task.id });
                    if let Some(record) = self.tasks.get_mut(task.id) {
                        record.joiners.push(wait);
                    }
                    self.park(resumer, wait);
                } else {
                    self.settle(resumer, Outcome::Error(SagaError::UnknownTask(task.id)));
                }
            }

            Effect::Cancel { task } => {
                if self.tasks.contains(task.id) {
                    self.cancel_task(task.id);
                    self.settle(resumer, Outcome::Value(Value::Null));
                } else {
                    self.settle(resumer, Outcome::Error(SagaError::UnknownTask(task.id)));
                }
            }

            Effect::All { effects } => {
                let branches = effects
                    .into_iter()
                    .enumerate()
                    .map(|(index, effect)| (index.to_string(), effect))
                    .collect();
                self.execute_group(owner, resumer, GroupKind::All, branches)?;
            }

            Effect::Race { effects } => {
                self.execute_group(owner, resumer, GroupKind::Race, effects.0)?;
            }

            Effect::Select { selector, args } => {
                let value = selector.select(&self.store.get_state(), &args);
                self.settle(resumer, Outcome::Value(value));
            }
        }
        Ok(())
    }

    fn execute_group(
        &mut self,
        owner: TaskId,
        resumer: Resumer,
        kind: GroupKind,
        branches: Vec<(String, Effect)>,
    ) -> RuntimeResult<()> {
        if branches.is_empty() {
            self.settle(resumer, Outcome::Value(kind.empty_result()));
            return Ok(());
        }

        let group = GroupId(self.next_group);
        self.next_group += 1;
        let effect_kind = match kind {
            GroupKind::All => EffectKind::All,
            GroupKind::Race => EffectKind::Race,
        };
        let wait = self.open_wait(resumer, owner, effect_kind, WaitKind::Group(group));
        let (names, effects): (Vec<String>, Vec<Effect>) = branches.into_iter().unzip();
        self.groups.insert(group, Group::new(kind, wait, names));
        self.park(resumer, wait);

        for (index, effect) in effects.into_iter().enumerate() {
            // a branch that settled immediately may already have decided the group
            if !self.groups.contains_key(&group) {
                break;
            }
            self.execute(owner, effect, Resumer::Branch { group, index })?;
        }
        Ok(())
    }

    /// Publish on the bus and resume every TAKE that matched, in order
    fn publish(&mut self, action: &Action, source: Option<TaskId>) -> RuntimeResult<()> {
        let matched = self.bus.publish(action);
        debug!(
            action_type = %action.action_type,
            source = ?source,
            matched = matched.len(),
            "Action dispatched"
        );
        self.monitor.publish(
            events::ACTION_DISPATCHED,
            source,
            json!({ "action": action.to_value(), "matched": matched.len() }),
        );

        let value = action.to_value();
        for (subscription, id) in matched {
            // a wait abandoned earlier in this same delivery is simply gone
            let Some(wait) = self.waits.remove(&id) else {
                continue;
            };
            // the wait must have been parked on the subscription that matched
            if let WaitKind::Take {
                subscription: Some(owned),
            } = &wait.kind
            {
                if *owned != subscription && self.bus.contains(*owned) {
                    return Err(RuntimeError::SubscriptionLeak {
                        subscription: owned.0,
                        action_type: action.action_type.clone(),
                    });
                }
            }
            self.resolve_wait(wait, Outcome::Value(value.clone()));
        }
        Ok(())
    }

    fn drain_inbox(&mut self) {
        for Settlement { wait, result } in self.inbox.drain() {
            let Some(wait) = self.waits.remove(&wait) else {
                trace!(wait = ?wait, "Discarding settlement for an abandoned wait");
                continue;
            };
            let outcome = match result {
                Ok(value) => Outcome::Value(value),
                Err(err) => Outcome::Error(err),
            };
            self.resolve_wait(wait, outcome);
        }
    }

    // =========================================================================
    // Waits
    // =========================================================================

    fn open_wait(&mut self, resumer: Resumer, owner: TaskId, effect: EffectKind, kind: WaitKind) -> WaitId {
        let id = WaitId(self.next_wait);
        self.next_wait += 1;
        self.waits.insert(
            id,
            Wait {
                resumer,
                owner,
                effect,
                kind,
            },
        );
        id
    }

    fn park(&mut self, resumer: Resumer, wait: WaitId) {
        match resumer {
            Resumer::Task { task, .. } => {
                if let Some(record) = self.tasks.get_mut(task) {
                    record.wait = Some(wait);
                    record.state = TaskState::Suspended;
                }
            }
            Resumer::Branch { group, index } => {
                if let Some(group) = self.groups.get_mut(&group) {
                    group.park(index, wait);
                }
            }
        }
    }

    /// A wait that was already removed from the table settled
    fn resolve_wait(&mut self, wait: Wait, outcome: Outcome) {
        let (name, status) = match &outcome {
            Outcome::Value(_) => (events::EFFECT_RESOLVED, "resolved"),
            Outcome::Error(_) => (events::EFFECT_REJECTED, "rejected"),
            Outcome::Cancelled => (events::EFFECT_CANCELLED, "cancelled"),
        };
        if self.config.trace_effects {
            log_effect_operation(wait.effect, wait.owner, status);
        }
        self.monitor.publish(name, Some(wait.owner), json!({ "effect": wait.effect }));
        self.settle(wait.resumer, outcome);
    }

    /// Release a wait without resuming anyone
    fn abandon_wait(&mut self, id: WaitId) {
        let Some(wait) = self.waits.remove(&id) else {
            return;
        };
        match wait.kind {
            WaitKind::Call { abort } => {
                if let Some(abort) = abort {
                    abort.abort();
                }
            }
            WaitKind::Take { subscription } => {
                if let Some(subscription) = subscription {
                    self.bus.unsubscribe(subscription);
                }
            }
            WaitKind::Join { target } => {
                if let Some(record) = self.tasks.get_mut(target) {
                    record.joiners.retain(|joiner| *joiner != id);
                }
            }
            WaitKind::Group(group) => {
                if let Some(group) = self.groups.remove(&group) {
                    for branch in group.pending_waits() {
                        self.abandon_wait(branch);
                    }
                }
            }
        }
        trace!(owner = %wait.owner, effect = %wait.effect, "Wait abandoned");
        self.monitor.publish(
            events::EFFECT_CANCELLED,
            Some(wait.owner),
            json!({ "effect": wait.effect }),
        );
    }

    /// Hand an outcome to whoever is waiting on it
    fn settle(&mut self, resumer: Resumer, outcome: Outcome) {
        match resumer {
            Resumer::Task { task, epoch } => {
                let Some(record) = self.tasks.get_mut(task) else {
                    return;
                };
                if record.epoch != epoch || record.state.is_terminal() {
                    trace!(task = %task, "Discarding stale settlement");
                    return;
                }
                record.wait = None;
                match outcome {
                    Outcome::Value(value) => self.schedule(task, Input::Value(value)),
                    Outcome::Error(err) => self.schedule(task, Input::Error(err)),
                    Outcome::Cancelled => self.cancel_task(task),
                }
            }
            Resumer::Branch { group, index } => {
                let Some(decided) = self
                    .groups
                    .get_mut(&group)
                    .and_then(|g| g.record(index, outcome))
                else {
                    return;
                };
                self.complete_group(group, decided);
            }
        }
    }

    /// Abandon the undecided branches, then resume the group's owner
    fn complete_group(&mut self, id: GroupId, outcome: Outcome) {
        let Some(group) = self.groups.remove(&id) else {
            return;
        };
        for branch in group.pending_waits() {
            self.abandon_wait(branch);
        }
        if let Some(wait) = self.waits.remove(&group.wait) {
            self.resolve_wait(wait, outcome);
        }
    }

    fn effect_triggered(&self, task: TaskId, effect: &Effect) {
        if self.config.trace_effects {
            log_effect_operation(effect.kind(), task, "triggered");
            debug!(task = %task, effect = %effect.label(), "Effect triggered");
        }
        if self.monitor.subscriber_count() > 0 {
            self.monitor
                .publish(events::EFFECT_TRIGGERED, Some(task), json!({ "effect": effect.to_json() }));
        }
    }
}

impl<S: Store> std::fmt::Debug for Interpreter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("id", &self.id)
            .field("live_tasks", &self.tasks.live_count())
            .field("waits", &self.waits.len())
            .field("ready", &self.ready.len())
            .finish()
    }
}
