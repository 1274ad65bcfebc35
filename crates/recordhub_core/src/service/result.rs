//! Per-call result wrappers.
//!
//! # Invariants
//! - Payloads are masked for the wrapped identity before they are stored.
//! - Wrappers are immutable once built.

use crate::model::identity::Identity;
use crate::model::record::{Record, RecordData, RecordId};
use crate::search::index::{
    Bucket, SearchHit, DOCUMENT_CREATED_FIELD, DOCUMENT_ID_FIELD, DOCUMENT_REVISION_FIELD,
    DOCUMENT_UPDATED_FIELD,
};
use crate::search::params::SearchParams;
use crate::service::config::LinksConfig;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// One record as seen by one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordItem {
    record: Record,
    data: RecordData,
    identity: Identity,
    links: Option<LinksConfig>,
}

impl RecordItem {
    pub(crate) fn new(
        record: Record,
        data: RecordData,
        identity: Identity,
        links: Option<LinksConfig>,
    ) -> Self {
        Self {
            record,
            data,
            identity,
            links,
        }
    }

    pub fn id(&self) -> RecordId {
        self.record.pid
    }

    pub fn revision(&self) -> i64 {
        self.record.revision
    }

    /// Stored record, unmasked.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Payload visible to the wrapped identity.
    pub fn data(&self) -> &RecordData {
        &self.data
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// `self` link, when links are configured.
    pub fn links(&self) -> BTreeMap<String, String> {
        let mut links = BTreeMap::new();
        if let Some(config) = &self.links {
            links.insert(
                "self".to_string(),
                format!("{}/{}", config.base_url(), self.record.pid),
            );
        }
        links
    }

    /// Renders the item as a JSON object.
    pub fn to_json(&self) -> Value {
        let mut output = self.data.clone();
        output.insert(
            DOCUMENT_ID_FIELD.to_string(),
            Value::from(self.record.pid.to_string()),
        );
        output.insert(
            DOCUMENT_CREATED_FIELD.to_string(),
            Value::from(self.record.created_at),
        );
        output.insert(
            DOCUMENT_UPDATED_FIELD.to_string(),
            Value::from(self.record.updated_at),
        );
        output.insert(
            DOCUMENT_REVISION_FIELD.to_string(),
            Value::from(self.record.revision),
        );
        let links = self.links();
        if !links.is_empty() {
            output.insert("links".to_string(), json!(links));
        }
        Value::Object(output)
    }
}

/// One page of search hits as seen by one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordList {
    total: u64,
    hits: Vec<SearchHit>,
    aggregations: BTreeMap<String, Vec<Bucket>>,
    offset: u32,
    limit: u32,
    params: SearchParams,
    identity: Identity,
    links: Option<LinksConfig>,
}

impl RecordList {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        total: u64,
        hits: Vec<SearchHit>,
        aggregations: BTreeMap<String, Vec<Bucket>>,
        offset: u32,
        limit: u32,
        params: SearchParams,
        identity: Identity,
        links: Option<LinksConfig>,
    ) -> Self {
        Self {
            total,
            hits,
            aggregations,
            offset,
            limit,
            params,
            identity,
            links,
        }
    }

    /// Exact number of matching records across all pages.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.hits.iter().map(|hit| hit.pid).collect()
    }

    pub fn aggregations(&self) -> &BTreeMap<String, Vec<Bucket>> {
        &self.aggregations
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// 1-based page number of this result.
    pub fn page(&self) -> u32 {
        if self.limit == 0 {
            1
        } else {
            self.offset / self.limit + 1
        }
    }

    pub fn size(&self) -> u32 {
        self.limit
    }

    /// `self`, `prev` and `next` links, when links are configured.
    pub fn links(&self) -> BTreeMap<String, String> {
        let mut links = BTreeMap::new();
        let Some(config) = &self.links else {
            return links;
        };

        let page = self.page();
        links.insert("self".to_string(), self.page_url(config, page));
        if page > 1 {
            links.insert("prev".to_string(), self.page_url(config, page - 1));
        }
        if u64::from(self.offset) + u64::from(self.limit) < self.total && self.limit > 0 {
            links.insert("next".to_string(), self.page_url(config, page + 1));
        }
        links
    }

    fn page_url(&self, config: &LinksConfig, page: u32) -> String {
        let mut query = vec![format!("page={page}"), format!("size={}", self.limit)];
        for (key, value) in self.params.as_map() {
            if key == "page" || key == "size" {
                continue;
            }
            let values = match value {
                Value::Array(items) => items.iter().filter_map(query_value).collect(),
                other => query_value(other).into_iter().collect::<Vec<_>>(),
            };
            for value in values {
                query.push(format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(&value)
                ));
            }
        }
        format!("{}?{}", config.base_url(), query.join("&"))
    }

    /// Renders the page as a JSON object.
    pub fn to_json(&self) -> Value {
        let hits = self
            .hits
            .iter()
            .map(|hit| Value::Object(hit.document.clone()))
            .collect::<Vec<_>>();

        let mut output = Map::new();
        output.insert(
            "hits".to_string(),
            json!({ "hits": hits, "total": self.total }),
        );
        if !self.aggregations.is_empty() {
            let aggregations = self
                .aggregations
                .iter()
                .map(|(name, buckets)| {
                    let buckets = buckets
                        .iter()
                        .map(|bucket| json!({"key": bucket.key, "doc_count": bucket.doc_count}))
                        .collect::<Vec<_>>();
                    (name.clone(), json!({ "buckets": buckets }))
                })
                .collect::<Map<_, _>>();
            output.insert("aggregations".to_string(), Value::Object(aggregations));
        }
        let links = self.links();
        if !links.is_empty() {
            output.insert("links".to_string(), json!(links));
        }
        Value::Object(output)
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
