mod context;
mod wire;

pub use context::Context;
pub use wire::ContextEntry;

/// Tag carried next to every value on the wire.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Int,
    Int64,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Int(i32),
    Int64(i64),
    Bool(bool),
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::Int(_) => ValueKind::Int,
            Self::Int64(_) => ValueKind::Int64,
            Self::Bool(_) => ValueKind::Bool,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Textual form used on the wire. Strings are kept byte-for-byte.
    #[must_use]
    pub fn to_literal(&self) -> String {
        match self {
            Self::String(v) => v.clone(),
            Self::Int(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
        }
    }

    pub fn parse(key: &str, kind: ValueKind, literal: &str) -> Result<Self, ValueError> {
        let invalid = || ValueError::InvalidLiteral {
            key: key.to_string(),
            kind,
            literal: literal.to_string(),
        };

        match kind {
            ValueKind::String => Ok(Self::String(literal.to_string())),
            ValueKind::Int => literal.parse().map(Self::Int).map_err(|_| invalid()),
            ValueKind::Int64 => literal.parse().map(Self::Int64).map_err(|_| invalid()),
            ValueKind::Bool => literal.parse().map(Self::Bool).map_err(|_| invalid()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("context key `{key}`: `{literal}` is not a valid {kind}")]
    InvalidLiteral {
        key: String,
        kind: ValueKind,
        literal: String,
    },

    #[error("context key `{0}` appears more than once")]
    DuplicateKey(String),

    #[error("malformed context payload: {0}")]
    Json(#[from] serde_json::Error),
}
