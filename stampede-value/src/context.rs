use crate::wire::ContextEntry;
use crate::{Value, ValueError};

/// Ordered, typed key/value store handed to every step of an iteration.
///
/// Lookups never fail: a missing key (or a key holding another type) reads as the zero value of
/// the requested type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    entries: Vec<(String, Value)>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites `key`. An overwritten key keeps its original position.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key, Value::String(value.into()));
    }

    pub fn put_int(&mut self, key: impl Into<String>, value: i32) {
        self.put(key, Value::Int(value));
    }

    pub fn put_int64(&mut self, key: impl Into<String>, value: i64) {
        self.put(key, Value::Int64(value));
    }

    pub fn put_bool(&mut self, key: impl Into<String>, value: bool) {
        self.put(key, Value::Bool(value));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> &str {
        self.get(key).and_then(Value::as_str).unwrap_or("")
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> i32 {
        self.get(key).and_then(Value::as_i32).unwrap_or(0)
    }

    #[must_use]
    pub fn get_int64(&self, key: &str) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or(0)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    #[must_use]
    pub fn check_exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn to_wire(&self) -> Vec<ContextEntry> {
        self.iter().map(|(k, v)| ContextEntry::new(k, v)).collect()
    }

    pub fn from_wire(entries: Vec<ContextEntry>) -> Result<Self, ValueError> {
        let mut out = Self {
            entries: Vec::with_capacity(entries.len()),
        };
        for entry in entries {
            if out.check_exists(&entry.key) {
                return Err(ValueError::DuplicateKey(entry.key));
            }
            let value = Value::parse(&entry.key, entry.kind, &entry.value)?;
            out.entries.push((entry.key, value));
        }
        Ok(out)
    }

    /// Encodes the context as a JSON array of `{key, type, value}` entries.
    pub fn encode(&self) -> Result<String, ValueError> {
        Ok(serde_json::to_string(&self.to_wire())?)
    }

    pub fn decode(payload: &str) -> Result<Self, ValueError> {
        let entries: Vec<ContextEntry> = serde_json::from_str(payload)?;
        Self::from_wire(entries)
    }
}

impl serde::Serialize for Context {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_wire())
    }
}

impl<'de> serde::Deserialize<'de> for Context {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<ContextEntry>::deserialize(deserializer)?;
        Self::from_wire(entries).map_err(serde::de::Error::custom)
    }
}
