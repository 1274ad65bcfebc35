//! Raw search parameters and search options.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Raw, uninterpreted search parameters (`q`, `page`, `size`, `sort`, facets).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    values: Map<String, Value>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds params from a JSON object; any other JSON value yields no params.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    /// Sets one parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Overlays `other` on top of these params.
    pub fn merge(mut self, other: SearchParams) -> Self {
        self.values.extend(other.values);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|value| !value.is_null())
    }

    /// Returns a string parameter; numbers and booleans are rendered.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    /// Returns every string value of a parameter given as string or list.
    pub fn get_all_str(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.clone()),
                    Value::Number(number) => Some(number.to_string()),
                    Value::Bool(flag) => Some(flag.to_string()),
                    _ => None,
                })
                .collect(),
            Some(_) => self.get_str(key).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// Search behavior knobs shared by the builder and interpreters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Upper bound for `offset + limit`.
    pub max_result_window: u32,
    /// Fields accepted by the `sort` parameter.
    pub sort_fields: Vec<String>,
    /// Sort applied when no `sort` parameter and no text query is given.
    pub default_sort: Option<String>,
    /// Fields exposed as facets (aggregated and filterable by name).
    pub facets: Vec<String>,
    pub facet_size: u32,
    /// Major version of the search backend protocol; `>= 7` needs explicit
    /// total-hit tracking.
    pub backend_major_version: u32,
    /// Bind a per-identity preference token to search requests.
    pub preference: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            max_page_size: 100,
            max_result_window: 10_000,
            sort_fields: vec!["created".to_string(), "updated".to_string()],
            default_sort: Some("-updated".to_string()),
            facets: Vec::new(),
            facet_size: 10,
            backend_major_version: 7,
            preference: true,
        }
    }
}

impl SearchOptions {
    /// Loads options from JSON; missing keys keep their defaults.
    pub fn from_json_str(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }

    /// Whether the backend needs total-hit tracking requested explicitly.
    pub fn requires_explicit_total_hits(&self) -> bool {
        self.backend_major_version >= 7
    }
}
