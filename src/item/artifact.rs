use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// A completed unit of extracted data on its way to the sinks
///
/// The scheduler keeps no state for artifacts: once delivered, each accepting
/// sink receives its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Label shown in sink log lines
    #[serde(default)]
    pub name: String,

    /// The extracted data
    pub payload: Value,

    /// Side channel for routing hints such as an output path
    #[serde(default)]
    pub tags: HashMap<String, Value>,

    /// Identity of the producer that emitted it, filled in at submission
    #[serde(default)]
    pub producer: Option<String>,
}

impl Artifact {
    pub fn new(payload: Value) -> Self {
        Self {
            name: String::new(),
            payload,
            tags: HashMap::new(),
            producer: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Returns the tag under `key` if it holds a string
    pub fn tag_str(&self, key: &str) -> Option<&str> {
        self.tags.get(key).and_then(Value::as_str)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.payload)
    }
}
