use super::action::Action;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Wildcard tag matching every action
pub const WILDCARD: &str = "*";

type PredicateFn = dyn Fn(&Action) -> bool + Send + Sync;

/// Named predicate over actions
///
/// Compared and serialized by name so that TAKE descriptors stay plain data.
#[derive(Clone)]
pub struct Predicate {
    name: Arc<str>,
    test: Arc<PredicateFn>,
}

impl Predicate {
    pub fn new(
        name: impl Into<String>,
        test: impl Fn(&Action) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Arc::from(name.into()),
            test: Arc::new(test),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.name).finish()
    }
}

/// What a TAKE (or a bus subscriber) is waiting for
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Any,
    Type(String),
    OneOf(Vec<String>),
    Predicate(Predicate),
}

impl Pattern {
    pub fn predicate(
        name: impl Into<String>,
        test: impl Fn(&Action) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate(Predicate::new(name, test))
    }

    pub fn matches(&self, action: &Action) -> bool {
        match self {
            Self::Any => true,
            Self::Type(tag) => *tag == action.action_type,
            Self::OneOf(tags) => tags.iter().any(|tag| *tag == action.action_type),
            Self::Predicate(predicate) => (predicate.test)(action),
        }
    }
}

impl From<&str> for Pattern {
    fn from(tag: &str) -> Self {
        if tag == WILDCARD {
            Self::Any
        } else {
            Self::Type(tag.to_string())
        }
    }
}

impl From<String> for Pattern {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<Vec<&str>> for Pattern {
    fn from(tags: Vec<&str>) -> Self {
        Self::OneOf(tags.into_iter().map(str::to_string).collect())
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Any => serializer.serialize_str(WILDCARD),
            Self::Type(tag) => serializer.serialize_str(tag),
            Self::OneOf(tags) => tags.serialize(serializer),
            Self::Predicate(predicate) => serializer.serialize_str(predicate.name()),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "{WILDCARD}"),
            Self::Type(tag) => write!(f, "{tag}"),
            Self::OneOf(tags) => write!(f, "[{}]", tags.join(", ")),
            Self::Predicate(predicate) => write!(f, "<{}>", predicate.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        let increment = Action::new("INCREMENT");
        let decrement = Action::new("DECREMENT");

        assert!(Pattern::from("*").matches(&increment));
        assert!(Pattern::from("INCREMENT").matches(&increment));
        assert!(!Pattern::from("INCREMENT").matches(&decrement));
        assert!(Pattern::from(vec!["DECREMENT", "RESET"]).matches(&decrement));
        assert!(!Pattern::from(vec!["DECREMENT", "RESET"]).matches(&increment));

        let large = Pattern::predicate("large_increment", |action| {
            action.get("by").and_then(|v| v.as_i64()).unwrap_or(0) > 10
        });
        assert!(large.matches(&Action::new("INCREMENT").with("by", 11)));
        assert!(!large.matches(&increment));
    }

    #[test]
    fn test_predicates_compare_by_name() {
        let a = Pattern::predicate("is_fetch", |a| a.action_type == "FETCH");
        let b = Pattern::predicate("is_fetch", |_| false);
        let c = Pattern::predicate("is_other", |a| a.action_type == "FETCH");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
