//! Record domain model.
//!
//! # Responsibility
//! - Define the persistent record shape shared by store, index and service.
//! - Provide payload helpers used by the update path (`apply`, `clear_none`).
//!
//! # Invariants
//! - `pid` is assigned once at allocation and never reused.
//! - `RecordState::Deleted` is terminal; deleted records are tombstones.
//! - `revision` increases by one on every store commit.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Persistent identifier (PID) addressing one record across its lifetime.
pub type RecordId = Uuid;

/// JSON object payload carried by every record.
pub type RecordData = Map<String, Value>;

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Allocated inside an open unit of work, not yet committed.
    Draft,
    /// Committed and visible.
    Active,
    /// Tombstoned. Never resolvable again.
    Deleted,
}

impl RecordState {
    /// Stable storage string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }

    /// Parses a storage string back into a state.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Persistent record owned by the store.
///
/// The service only ever holds a transient copy for the duration of one
/// operation; the component chain receives it by value and hands it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub pid: RecordId,
    /// Logical record type name, e.g. `record`.
    pub record_type: String,
    pub data: RecordData,
    pub state: RecordState,
    /// Number of committed writes. `0` until the first commit.
    pub revision: i64,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl Record {
    /// Creates a draft record with a freshly generated PID and empty payload.
    pub fn allocate(record_type: impl Into<String>) -> Self {
        let now = now_epoch_ms();
        Self {
            pid: Uuid::new_v4(),
            record_type: record_type.into(),
            data: RecordData::new(),
            state: RecordState::Draft,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns whether this record is committed and not tombstoned.
    pub fn is_active(&self) -> bool {
        self.state == RecordState::Active
    }

    /// Returns a top-level payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Merges `data` into the payload, replacing top-level keys.
    pub fn apply(&mut self, data: &RecordData) {
        for (key, value) in data {
            self.data.insert(key.clone(), value.clone());
        }
    }

    /// Removes explicit `null` values from the payload, recursively.
    ///
    /// Objects left empty by the removal are kept; lists keep their
    /// non-null elements in order.
    pub fn clear_none(&mut self) {
        clear_none_map(&mut self.data);
    }

    /// Returns the owner ids recorded in the `owners` payload field.
    pub fn owners(&self) -> Vec<&str> {
        match self.data.get(OWNERS_FIELD) {
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(value)) => vec![value.as_str()],
            _ => Vec::new(),
        }
    }
}

/// Payload field holding record owner ids.
pub const OWNERS_FIELD: &str = "owners";

fn clear_none_map(map: &mut Map<String, Value>) {
    map.retain(|_, value| !value.is_null());
    for value in map.values_mut() {
        clear_none_value(value);
    }
}

fn clear_none_value(value: &mut Value) {
    match value {
        Value::Object(map) => clear_none_map(map),
        Value::Array(items) => {
            items.retain(|item| !item.is_null());
            for item in items.iter_mut() {
                clear_none_value(item);
            }
        }
        _ => {}
    }
}

/// Current wall clock in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
