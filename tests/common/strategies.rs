use proptest::prelude::*;
use serde_json::json;

/// Strategy for generating action type tags
pub fn action_type_strategy() -> impl Strategy<Value = String> {
    "[A-Z][A-Z_]{0,15}"
}

/// Strategy for generating small JSON argument lists
pub fn args_strategy() -> impl Strategy<Value = Vec<serde_json::Value>> {
    prop::collection::vec(
        prop_oneof![
            Just(json!(null)),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,8}".prop_map(|s| json!(s)),
            any::<bool>().prop_map(|b| json!(b)),
        ],
        0..4,
    )
}

/// Strategy for a sequence of publishes drawn from a small tag alphabet
pub fn publish_sequence_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop_oneof![Just("A".to_string()), Just("B".to_string()), Just("C".to_string())],
        0..24,
    )
}
