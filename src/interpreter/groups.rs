//! ALL / RACE bookkeeping.
//!
//! A group is a single wait from its owner's point of view. Each branch is
//! executed with a branch resumer pointing back here; the group decides when
//! the owner resumes and which branch waits must be abandoned.

use super::{Outcome, WaitId};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct GroupId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GroupKind {
    All,
    Race,
}

impl GroupKind {
    /// Result for a group with no branches
    pub fn empty_result(&self) -> Value {
        match self {
            Self::All => Value::Array(Vec::new()),
            Self::Race => Value::Object(Map::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    /// Not executed yet
    Pending,
    Waiting(WaitId),
    Settled,
}

#[derive(Debug)]
pub(crate) struct Group {
    kind: GroupKind,
    /// The wait the owner is parked on for this group
    pub wait: WaitId,
    names: Vec<String>,
    branches: Vec<Branch>,
    results: Vec<Value>,
    remaining: usize,
}

impl Group {
    pub fn new(kind: GroupKind, wait: WaitId, names: Vec<String>) -> Self {
        let size = names.len();
        Self {
            kind,
            wait,
            names,
            branches: vec![Branch::Pending; size],
            results: vec![Value::Null; size],
            remaining: size,
        }
    }

    pub fn park(&mut self, index: usize, wait: WaitId) {
        if let Some(branch) = self.branches.get_mut(index) {
            *branch = Branch::Waiting(wait);
        }
    }

    /// Record a branch outcome; returns the group's outcome once decided
    ///
    /// ALL decides on the last value (results in input order) or the first
    /// failure. RACE decides on the first branch to settle, producing
    /// `{winner_name: value}`.
    pub fn record(&mut self, index: usize, outcome: Outcome) -> Option<Outcome> {
        match self.branches.get(index) {
            Some(Branch::Settled) | None => return None,
            _ => {}
        }
        self.branches[index] = Branch::Settled;

        match (self.kind, outcome) {
            (_, Outcome::Error(err)) => Some(Outcome::Error(err)),
            (_, Outcome::Cancelled) => Some(Outcome::Cancelled),
            (GroupKind::All, Outcome::Value(value)) => {
                self.results[index] = value;
                self.remaining -= 1;
                if self.remaining == 0 {
                    Some(Outcome::Value(Value::Array(std::mem::take(&mut self.results))))
                } else {
                    None
                }
            }
            (GroupKind::Race, Outcome::Value(value)) => {
                let mut winner = Map::new();
                winner.insert(self.names[index].clone(), value);
                Some(Outcome::Value(Value::Object(winner)))
            }
        }
    }

    /// Branch waits still outstanding; these are abandoned when the group settles
    pub fn pending_waits(&self) -> Vec<WaitId> {
        self.branches
            .iter()
            .filter_map(|branch| match branch {
                Branch::Waiting(wait) => Some(*wait),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SagaError;
    use serde_json::json;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_all_collects_in_input_order() {
        let mut group = Group::new(GroupKind::All, WaitId(1), names(3));
        group.park(0, WaitId(2));
        group.park(1, WaitId(3));
        group.park(2, WaitId(4));

        assert!(group.record(2, Outcome::Value(json!("c"))).is_none());
        assert!(group.record(0, Outcome::Value(json!("a"))).is_none());
        assert_eq!(group.pending_waits(), vec![WaitId(3)]);

        match group.record(1, Outcome::Value(json!("b"))) {
            Some(Outcome::Value(value)) => assert_eq!(value, json!(["a", "b", "c"])),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_all_fails_fast() {
        let mut group = Group::new(GroupKind::All, WaitId(1), names(2));
        group.park(0, WaitId(2));
        group.park(1, WaitId(3));
        match group.record(1, Outcome::Error(SagaError::failed("x"))) {
            Some(Outcome::Error(err)) => assert_eq!(err, SagaError::failed("x")),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(group.pending_waits(), vec![WaitId(2)]);
    }

    #[test]
    fn test_race_names_the_winner() {
        let mut group = Group::new(
            GroupKind::Race,
            WaitId(1),
            vec!["response".to_string(), "timeout".to_string()],
        );
        group.park(0, WaitId(2));
        group.park(1, WaitId(3));

        match group.record(1, Outcome::Value(json!(true))) {
            Some(Outcome::Value(value)) => assert_eq!(value, json!({"timeout": true})),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(group.pending_waits(), vec![WaitId(2)]);
        assert!(group.record(1, Outcome::Value(json!(false))).is_none());
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(GroupKind::All.empty_result(), json!([]));
        assert_eq!(GroupKind::Race.empty_result(), json!({}));
    }
}
