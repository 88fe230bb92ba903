//! Form data submitted for a poster.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

/// Placeholder names understood by the poster templates.
pub const PLACEHOLDERS: &[&str] = &[
    "prenom",
    "nom",
    "age",
    "lieu",
    "date",
    "time",
    "description",
    "contact",
    "contact1",
    "contact2",
    "photo_url",
];

/// Name of the field carrying the photo reference.
pub const PHOTO_FIELD: &str = "photo_url";

/// Field name to value mapping collected from the request body.
///
/// Missing fields read as the empty string. Values are free-form text and are
/// not validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PosterFields {
    values: HashMap<String, String>,
}

impl PosterFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `name`, or `""` when it was never supplied.
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    /// Value for `name` only when present and non-empty.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Build fields from a JSON object. Strings are taken verbatim, numbers
    /// and booleans are stringified, anything else counts as absent.
    pub fn from_json_object(map: serde_json::Map<String, Value>) -> Self {
        let values = map
            .into_iter()
            .filter_map(|(k, v)| {
                let s = match v {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((k, s))
            })
            .collect();
        Self { values }
    }
}

impl<'de> Deserialize<'de> for PosterFields {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_json_object(map))
    }
}
