use crate::{Value, ValueKind};

/// One `{key, type, value}` triple of a serialized [`crate::Context`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContextEntry {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    pub value: String,
}

impl ContextEntry {
    #[must_use]
    pub fn new(key: &str, value: &Value) -> Self {
        Self {
            key: key.to_string(),
            kind: value.kind(),
            value: value.to_literal(),
        }
    }
}
