//! # Action Bus
//!
//! In-process publish/subscribe over [`Action`]s. Subscribers are matched in
//! registration order and `publish` returns the matched targets instead of
//! calling back into them, so a caller resuming those targets can publish or
//! subscribe again without disturbing a delivery in progress.

use crate::effects::{Action, Pattern};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Whether a subscriber survives its first match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Once,
    Every,
}

#[derive(Debug)]
struct Subscriber<T> {
    id: SubscriptionId,
    pattern: Pattern,
    delivery: Delivery,
    target: T,
}

/// Subscriber registry keyed by pattern, generic over what gets resumed
#[derive(Debug)]
pub struct ActionBus<T> {
    subscribers: Vec<Subscriber<T>>,
    next_id: u64,
}

impl<T> Default for ActionBus<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 1,
        }
    }
}

impl<T: Clone> ActionBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, pattern: Pattern, delivery: Delivery, target: T) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        trace!(subscription = %id, pattern = %pattern, ?delivery, "bus subscribe");
        self.subscribers.push(Subscriber {
            id,
            pattern,
            delivery,
            target,
        });
        id
    }

    /// Remove a subscriber, returning its target if it was still registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Option<T> {
        let index = self.subscribers.iter().position(|s| s.id == id)?;
        Some(self.subscribers.remove(index).target)
    }

    /// Match `action` against the subscribers registered right now
    ///
    /// Returns matched targets in registration order. One-shot subscribers
    /// that matched are gone when this returns.
    pub fn publish(&mut self, action: &Action) -> Vec<(SubscriptionId, T)> {
        let matched: Vec<(SubscriptionId, Delivery, T)> = self
            .subscribers
            .iter()
            .filter(|s| s.pattern.matches(action))
            .map(|s| (s.id, s.delivery, s.target.clone()))
            .collect();

        let consumed: Vec<SubscriptionId> = matched
            .iter()
            .filter(|(_, delivery, _)| *delivery == Delivery::Once)
            .map(|(id, _, _)| *id)
            .collect();
        self.subscribers.retain(|s| !consumed.contains(&s.id));

        trace!(
            action_type = %action.action_type,
            matched = matched.len(),
            remaining = self.subscribers.len(),
            "bus publish"
        );
        matched.into_iter().map(|(id, _, target)| (id, target)).collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.subscribers.iter().any(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_subscriber_fires_once() {
        let mut bus = ActionBus::new();
        let id = bus.subscribe(Pattern::from("INCREMENT_ASYNC"), Delivery::Once, "taker");

        assert!(bus.publish(&Action::new("DECREMENT")).is_empty());
        assert!(bus.contains(id));

        let matched = bus.publish(&Action::new("INCREMENT_ASYNC"));
        assert_eq!(matched, vec![(id, "taker")]);
        assert!(!bus.contains(id));

        assert!(bus.publish(&Action::new("INCREMENT_ASYNC")).is_empty());
    }

    #[test]
    fn test_every_subscriber_is_retained() {
        let mut bus = ActionBus::new();
        let id = bus.subscribe(Pattern::Any, Delivery::Every, 7);

        for tag in ["A", "B", "C"] {
            assert_eq!(bus.publish(&Action::new(tag)), vec![(id, 7)]);
        }
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_delivery_follows_registration_order() {
        let mut bus = ActionBus::new();
        let first = bus.subscribe(Pattern::from("X"), Delivery::Once, 1);
        let skipped = bus.subscribe(Pattern::from("Y"), Delivery::Once, 2);
        let second = bus.subscribe(Pattern::Any, Delivery::Every, 3);
        let third = bus.subscribe(Pattern::from("X"), Delivery::Once, 4);

        let matched = bus.publish(&Action::new("X"));
        assert_eq!(matched, vec![(first, 1), (second, 3), (third, 4)]);
        assert!(bus.contains(skipped));
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn test_subscribers_added_after_publish_see_only_later_actions() {
        let mut bus = ActionBus::new();
        bus.subscribe(Pattern::from("X"), Delivery::Once, 1);

        let matched = bus.publish(&Action::new("X"));
        // a resumed taker re-subscribing mid-delivery must not see the same action
        let again = bus.subscribe(Pattern::from("X"), Delivery::Once, 1);
        assert_eq!(matched.len(), 1);
        assert!(bus.contains(again));

        assert_eq!(bus.publish(&Action::new("X")), vec![(again, 1)]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = ActionBus::new();
        let id = bus.subscribe(Pattern::from("X"), Delivery::Once, "t");
        assert_eq!(bus.unsubscribe(id), Some("t"));
        assert_eq!(bus.unsubscribe(id), None);
        assert!(bus.is_empty());
    }
}
