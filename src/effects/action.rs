use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tagged payload dispatched through the store and the action bus
///
/// Serializes flat, `{"type": "INCREMENT", "by": 2}`, which is also the value
/// a TAKE resumes its task with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Action {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: Map::new(),
        }
    }

    /// Add a payload field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.payload.len() + 1);
        object.insert("type".to_string(), Value::String(self.action_type.clone()));
        for (key, value) in &self.payload {
            if key != "type" {
                object.insert(key.clone(), value.clone());
            }
        }
        Value::Object(object)
    }

    /// Read an action back out of a TAKE result
    pub fn from_value(value: &Value) -> Option<Self> {
        let mut object = value.as_object()?.clone();
        let action_type = match object.remove("type")? {
            Value::String(tag) => tag,
            _ => return None,
        };
        Some(Self {
            action_type,
            payload: object,
        })
    }
}
