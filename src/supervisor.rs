//! # Task Supervisor
//!
//! Owns every task record in an arena keyed by [`TaskId`] and the parent/child
//! tree over it. JOIN and CANCEL only ever hold ids, so cross-links never own
//! anything.
//!
//! The supervisor decides *which* tasks are affected by a cancellation or an
//! escalation and in what order; the interpreter carries the decisions out,
//! since only it can release the waits a task is parked on.
//!
//! A task is reclaimed once it is terminal and all of its children have been
//! reclaimed. Reclaiming drops the computation and keeps a tombstone with the
//! outcome, so late JOINs and lookups still resolve. Tombstones are bounded:
//! past the configured capacity the oldest is evicted and its id is forgotten
//! everywhere, including its parent's fork history.

use crate::interpreter::WaitId;
use crate::saga::Saga;
use crate::task::{TaskHandle, TaskId, TaskOutcome, TaskState};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

pub(crate) struct TaskRecord {
    pub handle: TaskHandle,
    pub state: TaskState,
    pub body: Option<Box<dyn Saga>>,
    pub parent: Option<TaskId>,
    /// Owned children not yet reclaimed, in fork order
    pub children: Vec<TaskId>,
    /// Forked children still known as records or tombstones, in fork order
    pub forked: Vec<TaskId>,
    /// The effect wait this task is suspended on
    pub wait: Option<WaitId>,
    /// Bumped on every scheduling and on cancellation; stale resumptions
    /// carry an older epoch and are discarded
    pub epoch: u64,
    /// JOIN waits parked on this task
    pub joiners: Vec<WaitId>,
    pub outcome: Option<TaskOutcome>,
}

#[derive(Debug, Clone)]
struct Tombstone {
    handle: TaskHandle,
    parent: Option<TaskId>,
    forked: Vec<TaskId>,
    outcome: TaskOutcome,
}

pub(crate) struct Supervisor {
    tasks: HashMap<TaskId, TaskRecord>,
    reclaimed: HashMap<TaskId, Tombstone>,
    /// Tombstone ids, oldest first
    burial_order: VecDeque<TaskId>,
    tombstone_capacity: usize,
    next_id: u64,
}

impl Supervisor {
    pub fn new(tombstone_capacity: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            reclaimed: HashMap::new(),
            burial_order: VecDeque::new(),
            tombstone_capacity,
            next_id: 1,
        }
    }

    /// Register a new task, attached under `parent` when given
    pub fn spawn(
        &mut self,
        name: &str,
        body: Box<dyn Saga>,
        parent: Option<TaskId>,
    ) -> TaskHandle {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let handle = TaskHandle::new(id, name);

        self.tasks.insert(
            id,
            TaskRecord {
                handle: handle.clone(),
                state: TaskState::Running,
                body: Some(body),
                parent: None,
                children: Vec::new(),
                forked: Vec::new(),
                wait: None,
                epoch: 0,
                joiners: Vec::new(),
                outcome: None,
            },
        );
        if let Some(parent) = parent {
            self.attach(id, parent);
        }
        handle
    }

    pub fn attach(&mut self, child: TaskId, parent: TaskId) {
        if let Some(record) = self.tasks.get_mut(&child) {
            record.parent = Some(parent);
        }
        if let Some(record) = self.tasks.get_mut(&parent) {
            record.children.push(child);
            record.forked.push(child);
        }
        debug!(child = %child, parent = %parent, "attached child task");
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id) || self.reclaimed.contains_key(&id)
    }

    /// Present and not yet terminal
    pub fn is_live(&self, id: TaskId) -> bool {
        self.tasks.get(&id).is_some_and(|r| !r.state.is_terminal())
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        match self.tasks.get(&id) {
            Some(record) => Some(record.state),
            None => self.reclaimed.get(&id).map(|t| t.outcome.state()),
        }
    }

    pub fn outcome(&self, id: TaskId) -> Option<&TaskOutcome> {
        match self.tasks.get(&id) {
            Some(record) => record.outcome.as_ref(),
            None => self.reclaimed.get(&id).map(|t| &t.outcome),
        }
    }

    pub fn handle(&self, id: TaskId) -> Option<TaskHandle> {
        match self.tasks.get(&id) {
            Some(record) => Some(record.handle.clone()),
            None => self.reclaimed.get(&id).map(|t| t.handle.clone()),
        }
    }

    pub fn parent(&self, id: TaskId) -> Option<TaskId> {
        match self.tasks.get(&id) {
            Some(record) => record.parent,
            None => self.reclaimed.get(&id).and_then(|t| t.parent),
        }
    }

    pub fn children(&self, id: TaskId) -> Vec<TaskId> {
        self.tasks
            .get(&id)
            .map(|r| r.children.clone())
            .unwrap_or_default()
    }

    pub fn forked(&self, id: TaskId) -> Vec<TaskId> {
        match self.tasks.get(&id) {
            Some(record) => record.forked.clone(),
            None => self
                .reclaimed
                .get(&id)
                .map(|t| t.forked.clone())
                .unwrap_or_default(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.tasks.values().filter(|r| !r.state.is_terminal()).count()
    }

    pub fn record_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn tombstone_count(&self) -> usize {
        self.reclaimed.len()
    }

    /// Non-terminal descendants of `id` in post-order, followed by `id` itself
    /// if it is still live
    ///
    /// Terminal tasks are walked through, so a finished parent's live
    /// grandchildren are still reached.
    pub fn cancellation_order(&self, id: TaskId) -> Vec<TaskId> {
        let mut order = Vec::new();
        self.collect_post_order(id, &mut order);
        order
    }

    fn collect_post_order(&self, id: TaskId, order: &mut Vec<TaskId>) {
        let Some(record) = self.tasks.get(&id) else {
            return;
        };
        for child in &record.children {
            self.collect_post_order(*child, order);
        }
        if !record.state.is_terminal() {
            order.push(id);
        }
    }

    /// Live children of `id`'s parent other than `id`
    pub fn live_siblings(&self, id: TaskId) -> Vec<TaskId> {
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        self.children(parent)
            .into_iter()
            .filter(|sibling| *sibling != id && self.is_live(*sibling))
            .collect()
    }

    /// Nearest live ancestor, which receives `id`'s uncaught error
    pub fn escalation_target(&self, id: TaskId) -> Option<TaskId> {
        let mut current = self.parent(id);
        while let Some(ancestor) = current {
            if self.is_live(ancestor) {
                return Some(ancestor);
            }
            current = self.parent(ancestor);
        }
        None
    }

    pub fn root_of(&self, id: TaskId) -> TaskId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Record the terminal state; the computation stays until reclaim
    pub fn on_terminal(&mut self, id: TaskId, outcome: TaskOutcome) {
        if let Some(record) = self.tasks.get_mut(&id) {
            record.state = outcome.state();
            record.outcome = Some(outcome);
            record.wait = None;
            record.epoch += 1;
        }
    }

    /// Reclaim `id` and then any terminal ancestors it was holding open
    ///
    /// Returns the reclaimed handles, innermost first.
    pub fn try_reclaim(&mut self, id: TaskId) -> Vec<TaskHandle> {
        let mut reclaimed = Vec::new();
        let mut current = Some(id);

        while let Some(candidate) = current {
            let reclaimable = self.tasks.get(&candidate).is_some_and(|r| {
                r.state.is_terminal() && r.children.is_empty() && r.joiners.is_empty()
            });
            if !reclaimable {
                break;
            }

            let Some(record) = self.tasks.remove(&candidate) else {
                break;
            };
            let parent = record.parent;
            if let Some(parent_record) = parent.and_then(|p| self.tasks.get_mut(&p)) {
                parent_record.children.retain(|child| *child != candidate);
            }

            let outcome = record.outcome.unwrap_or(TaskOutcome::Cancelled);
            self.bury(
                candidate,
                Tombstone {
                    handle: record.handle.clone(),
                    parent,
                    forked: record.forked,
                    outcome,
                },
            );
            reclaimed.push(record.handle);
            current = parent;
        }

        reclaimed
    }

    fn bury(&mut self, id: TaskId, tombstone: Tombstone) {
        self.reclaimed.insert(id, tombstone);
        self.burial_order.push_back(id);

        while self.reclaimed.len() > self.tombstone_capacity {
            let Some(oldest) = self.burial_order.pop_front() else {
                break;
            };
            let Some(evicted) = self.reclaimed.remove(&oldest) else {
                continue;
            };
            if let Some(parent) = evicted.parent {
                if let Some(record) = self.tasks.get_mut(&parent) {
                    record.forked.retain(|child| *child != oldest);
                } else if let Some(grave) = self.reclaimed.get_mut(&parent) {
                    grave.forked.retain(|child| *child != oldest);
                }
            }
            debug!(task = %oldest, "evicted task tombstone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saga::Sequence;
    use serde_json::json;

    fn body() -> Box<dyn Saga> {
        Box::new(Sequence::new())
    }

    fn tree() -> (Supervisor, TaskId, TaskId, TaskId, TaskId) {
        let mut supervisor = Supervisor::new(16);
        let root = supervisor.spawn("root", body(), None).id;
        let a = supervisor.spawn("a", body(), Some(root)).id;
        let b = supervisor.spawn("b", body(), Some(root)).id;
        let a1 = supervisor.spawn("a1", body(), Some(a)).id;
        (supervisor, root, a, b, a1)
    }

    #[test]
    fn test_cancellation_order_is_post_order() {
        let (supervisor, root, a, b, a1) = tree();
        assert_eq!(supervisor.cancellation_order(root), vec![a1, a, b, root]);
        assert_eq!(supervisor.cancellation_order(a), vec![a1, a]);
    }

    #[test]
    fn test_cancellation_order_walks_through_terminal_tasks() {
        let (mut supervisor, root, a, b, a1) = tree();
        supervisor.on_terminal(a, TaskOutcome::Done(json!(null)));
        assert_eq!(supervisor.cancellation_order(root), vec![a1, b, root]);
    }

    #[test]
    fn test_siblings_and_escalation_target() {
        let (mut supervisor, root, a, b, a1) = tree();
        assert_eq!(supervisor.live_siblings(a), vec![b]);
        assert_eq!(supervisor.escalation_target(a1), Some(a));

        supervisor.on_terminal(a, TaskOutcome::Done(json!(1)));
        assert_eq!(supervisor.escalation_target(a1), Some(root));
        assert_eq!(supervisor.escalation_target(root), None);
        assert_eq!(supervisor.root_of(a1), root);
    }

    #[test]
    fn test_reclaim_waits_for_children() {
        let (mut supervisor, root, a, _b, a1) = tree();

        supervisor.on_terminal(a, TaskOutcome::Done(json!(1)));
        assert!(supervisor.try_reclaim(a).is_empty());

        supervisor.on_terminal(a1, TaskOutcome::Cancelled);
        let reclaimed: Vec<TaskId> = supervisor.try_reclaim(a1).iter().map(|h| h.id).collect();
        assert_eq!(reclaimed, vec![a1, a]);

        assert_eq!(supervisor.state(a), Some(TaskState::Done));
        assert_eq!(supervisor.outcome(a1), Some(&TaskOutcome::Cancelled));
        assert_eq!(supervisor.children(root).len(), 1);
        assert_eq!(supervisor.forked(root).len(), 2);
    }

    #[test]
    fn test_oldest_tombstones_are_evicted() {
        let mut supervisor = Supervisor::new(2);
        let root = supervisor.spawn("root", body(), None).id;
        let children: Vec<TaskId> = (0..5)
            .map(|i| supervisor.spawn(&format!("child{i}"), body(), Some(root)).id)
            .collect();

        for child in &children {
            supervisor.on_terminal(*child, TaskOutcome::Done(json!(null)));
            supervisor.try_reclaim(*child);
        }

        assert_eq!(supervisor.tombstone_count(), 2);
        assert_eq!(supervisor.forked(root), children[3..].to_vec());
        assert!(!supervisor.contains(children[0]));
        assert_eq!(supervisor.state(children[4]), Some(TaskState::Done));
    }
}
