use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExtractError;

/// A named value in the payload.
///
/// `name` is the predicate written to the graph, `key` is where the value
/// lives in the payload. `key` falls back to `name` when omitted or empty and
/// is fixed once the accessor is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FieldSpec")]
pub struct FieldAccessor {
    name: String,
    key: String,
}

#[derive(Deserialize)]
struct FieldSpec {
    name: String,
    #[serde(default)]
    key: Option<String>,
}

impl From<FieldSpec> for FieldAccessor {
    fn from(spec: FieldSpec) -> Self {
        match spec.key {
            Some(key) => Self::with_key(spec.name, key),
            None => Self::new(spec.name),
        }
    }
}

impl FieldAccessor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
        }
    }

    pub fn with_key(name: impl Into<String>, key: impl Into<String>) -> Self {
        let key = key.into();
        if key.is_empty() {
            return Self::new(name);
        }
        Self {
            name: name.into(),
            key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Look the value up in `payload`.
    ///
    /// An exact top-level key wins. Otherwise a dotted key is walked through
    /// nested objects, so `person.email` reads `payload["person"]["email"]`.
    pub fn resolve<'a>(&self, payload: &'a Map<String, Value>) -> Result<&'a Value, ExtractError> {
        if let Some(value) = payload.get(&self.key) {
            return Ok(value);
        }

        if self.key.contains('.') {
            let mut segments = self.key.split('.');
            let root = segments.next().and_then(|s| payload.get(s));
            let found = segments.fold(root, |current, segment| current.and_then(|v| v.get(segment)));
            if let Some(value) = found {
                return Ok(value);
            }
        }

        Err(ExtractError::MissingKey {
            field: self.name.clone(),
            key: self.key.clone(),
        })
    }
}
