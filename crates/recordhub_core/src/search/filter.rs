//! Query-level filter predicates.
//!
//! # Responsibility
//! - Represent permission and facet filters independently of the backend.
//! - Evaluate filters against JSON documents for backends without SQL.
//!
//! # Invariants
//! - `any([])` matches nothing; `all([])` matches everything.
//! - Field paths are dot-separated identifiers (`owners`, `meta.kind`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt::{Display, Formatter};

static FIELD_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("valid field path regex")
});

/// Returns whether `field` is a safe dot-separated document path.
pub fn is_valid_field_path(field: &str) -> bool {
    field.len() <= 128 && FIELD_PATH_RE.is_match(field)
}

/// Scalar value compared by a term filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Bool(bool),
    /// Matches any scalar whose facet bucket key equals the string:
    /// text as is, integers in decimal, booleans as `true`/`false`.
    Keyword(String),
}

impl FilterValue {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Text(expected), Value::String(actual)) => expected == actual,
            (Self::Integer(expected), Value::Number(actual)) => actual.as_i64() == Some(*expected),
            (Self::Bool(expected), Value::Bool(actual)) => expected == actual,
            (Self::Keyword(expected), Value::String(actual)) => expected == actual,
            (Self::Keyword(expected), Value::Number(actual)) => {
                (actual.is_i64() || actual.is_u64()) && actual.to_string() == *expected
            }
            (Self::Keyword(expected), Value::Bool(actual)) => actual.to_string() == *expected,
            _ => false,
        }
    }
}

impl Display for FilterValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Keyword(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Boolean predicate over indexed documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    MatchAll,
    MatchNone,
    /// Field equals value, or a list field contains value.
    Term { field: String, value: FilterValue },
    Any(Vec<QueryFilter>),
    All(Vec<QueryFilter>),
}

impl QueryFilter {
    pub fn term(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Term compared on facet bucket keys, whatever the stored scalar type.
    pub fn keyword(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Term {
            field: field.into(),
            value: FilterValue::Keyword(value.into()),
        }
    }

    /// Disjunction with constant folding.
    pub fn any(filters: impl IntoIterator<Item = QueryFilter>) -> Self {
        let mut kept = Vec::new();
        for filter in filters {
            match filter {
                Self::MatchAll => return Self::MatchAll,
                Self::MatchNone => {}
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::MatchNone,
            1 => kept.remove(0),
            _ => Self::Any(kept),
        }
    }

    /// Conjunction with constant folding.
    pub fn all(filters: impl IntoIterator<Item = QueryFilter>) -> Self {
        let mut kept = Vec::new();
        for filter in filters {
            match filter {
                Self::MatchNone => return Self::MatchNone,
                Self::MatchAll => {}
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::MatchAll,
            1 => kept.remove(0),
            _ => Self::All(kept),
        }
    }

    /// Evaluates this filter against one JSON document.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Self::MatchAll => true,
            Self::MatchNone => false,
            Self::Term { field, value } => match lookup_path(document, field) {
                Some(Value::Array(items)) => items.iter().any(|item| value.matches(item)),
                Some(found) => value.matches(found),
                None => false,
            },
            Self::Any(filters) => filters.iter().any(|filter| filter.matches(document)),
            Self::All(filters) => filters.iter().all(|filter| filter.matches(document)),
        }
    }

    /// Returns the first field path that fails [`is_valid_field_path`].
    pub fn invalid_field(&self) -> Option<&str> {
        match self {
            Self::MatchAll | Self::MatchNone => None,
            Self::Term { field, .. } => (!is_valid_field_path(field)).then_some(field.as_str()),
            Self::Any(filters) | Self::All(filters) => {
                filters.iter().find_map(QueryFilter::invalid_field)
            }
        }
    }
}

fn lookup_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}
