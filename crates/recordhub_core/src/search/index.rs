//! Search index client contract.
//!
//! # Invariants
//! - `total` is always the exact number of matching documents.
//! - Index writes are revision-guarded: an older revision never replaces a
//!   newer document.

use crate::db::DbError;
use crate::model::record::{Record, RecordData, RecordId, OWNERS_FIELD};
use crate::search::request::SearchRequest;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type IndexResult<T> = Result<T, IndexError>;

/// Index-layer error for document writes, query compilation and decoding.
#[derive(Debug)]
pub enum IndexError {
    /// Full-text query rejected by the backend parser.
    InvalidQuery {
        query: String,
        message: String,
    },
    /// Filter, sort or aggregation names an invalid field path.
    InvalidField(String),
    Db(DbError),
    InvalidData(String),
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuery { query, message } => {
                write!(f, "invalid full-text query `{query}`: {message}")
            }
            Self::InvalidField(field) => write!(f, "invalid index field `{field}`"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid index document: {message}"),
        }
    }
}

impl Error for IndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidQuery { .. } | Self::InvalidField(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for IndexError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for IndexError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One matching document.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub pid: RecordId,
    pub document: RecordData,
    /// Document revision, present when the request asked for versions.
    pub revision: Option<i64>,
    /// Relevance score, present for full-text queries. Higher is better.
    pub score: Option<f64>,
}

/// One terms aggregation bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub key: String,
    pub doc_count: u64,
}

/// Raw search response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchHits {
    pub total: u64,
    pub hits: Vec<SearchHit>,
    pub aggregations: BTreeMap<String, Vec<Bucket>>,
}

/// Index client used by the record service.
pub trait SearchIndex {
    /// Writes (or replaces) the document of a committed record.
    fn index(&self, record: &Record) -> IndexResult<()>;

    /// Removes the document of a record. Missing documents are not an error.
    fn delete(&self, record: &Record) -> IndexResult<()>;

    /// Runs a search request.
    fn execute(&self, request: &SearchRequest) -> IndexResult<SearchHits>;
}

/// Document fields owned by the index mapping.
pub const DOCUMENT_ID_FIELD: &str = "id";
pub const DOCUMENT_CREATED_FIELD: &str = "created";
pub const DOCUMENT_UPDATED_FIELD: &str = "updated";
pub const DOCUMENT_REVISION_FIELD: &str = "revision_id";

/// Maps a record to its index document.
///
/// Record payload fields come first; mapping fields override them.
pub fn record_to_document(record: &Record) -> RecordData {
    let mut document = record.data.clone();
    document.insert(
        DOCUMENT_ID_FIELD.to_string(),
        Value::from(record.pid.to_string()),
    );
    document.insert(
        DOCUMENT_CREATED_FIELD.to_string(),
        Value::from(record.created_at),
    );
    document.insert(
        DOCUMENT_UPDATED_FIELD.to_string(),
        Value::from(record.updated_at),
    );
    document.insert(
        DOCUMENT_REVISION_FIELD.to_string(),
        Value::from(record.revision),
    );
    document
}

/// Concatenates every string in the record payload for full-text matching.
///
/// Owner ids and `hidden` top-level fields stay out of the full-text content.
pub fn record_to_content(record: &Record, hidden: &BTreeSet<String>) -> String {
    let mut parts = Vec::new();
    for (key, value) in &record.data {
        if key != OWNERS_FIELD && !hidden.contains(key) {
            collect_text(value, &mut parts);
        }
    }
    parts.join(" ")
}

fn collect_text<'a>(value: &'a Value, parts: &mut Vec<&'a str>) {
    match value {
        Value::String(text) if !text.trim().is_empty() => parts.push(text.as_str()),
        Value::Array(items) => items.iter().for_each(|item| collect_text(item, parts)),
        Value::Object(map) => map.values().for_each(|item| collect_text(item, parts)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::{record_to_content, record_to_document};
    use crate::model::record::Record;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn document_carries_mapping_fields_over_payload() {
        let mut record = Record::allocate("record");
        record.data.insert("title".to_string(), json!("Dune"));
        record.data.insert("id".to_string(), json!("spoofed"));
        record.revision = 3;

        let document = record_to_document(&record);
        assert_eq!(document.get("title"), Some(&json!("Dune")));
        assert_eq!(document.get("id"), Some(&json!(record.pid.to_string())));
        assert_eq!(document.get("revision_id"), Some(&json!(3)));
        assert_eq!(document.get("created"), Some(&json!(record.created_at)));
    }

    #[test]
    fn content_collects_nested_strings() {
        let mut record = Record::allocate("record");
        record.data.insert("title".to_string(), json!("Dune"));
        record
            .data
            .insert("meta".to_string(), json!({"author": "Herbert", "pages": 412}));
        record.data.insert("tags".to_string(), json!(["scifi", " "]));
        record.data.insert("owners".to_string(), json!(["alice"]));

        assert_eq!(
            record_to_content(&record, &BTreeSet::new()),
            "Herbert scifi Dune"
        );

        record.data.insert("note".to_string(), json!("zanzibar"));
        let hidden = BTreeSet::from(["note".to_string(), "meta".to_string()]);
        assert_eq!(record_to_content(&record, &hidden), "scifi Dune");
    }
}
