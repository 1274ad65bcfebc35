//! Record store contract and SQLite implementation.
//!
//! # Responsibility
//! - Allocate PIDs, resolve records and persist payload/state changes.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Every write runs inside a caller-provided [`UnitOfWork`].
//! - Tombstoned records resolve as [`StoreError::Deleted`], never as data.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::{DbError, UnitOfWork};
use crate::model::record::{now_epoch_ms, Record, RecordData, RecordId, RecordState};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const RECORD_SELECT_SQL: &str = "SELECT
    pid,
    record_type,
    state,
    data,
    revision,
    created_at,
    updated_at
FROM records";

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence error for record store operations.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// No record with this identifier exists for the record type.
    NotFound(String),
    /// The record existed and has been tombstoned.
    Deleted(RecordId),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::Deleted(pid) => write!(f, "record deleted: {pid}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::Deleted(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistent store contract used by the record service.
pub trait RecordStore {
    /// Opens the unit of work every write of one operation runs in.
    fn begin(&self, label: &'static str) -> StoreResult<UnitOfWork<'_>>;

    /// Allocates a draft record with a new PID and an empty payload.
    fn allocate(&self, uow: &UnitOfWork<'_>, record_type: &str) -> StoreResult<Record>;

    /// Resolves an identifier outside any unit of work.
    fn resolve(&self, record_type: &str, id: &str) -> StoreResult<Record>;

    /// Resolves an identifier inside an open unit of work.
    fn resolve_in(&self, uow: &UnitOfWork<'_>, record_type: &str, id: &str)
        -> StoreResult<Record>;

    /// Persists payload changes, activates drafts and bumps the revision.
    fn commit_record(&self, uow: &UnitOfWork<'_>, record: Record) -> StoreResult<Record>;

    /// Tombstones the record and bumps the revision.
    fn delete_record(&self, uow: &UnitOfWork<'_>, record: Record) -> StoreResult<Record>;
}

/// SQLite-backed record store.
pub struct SqliteRecordStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn begin(&self, label: &'static str) -> StoreResult<UnitOfWork<'_>> {
        Ok(UnitOfWork::begin(self.conn, label)?)
    }

    fn allocate(&self, uow: &UnitOfWork<'_>, record_type: &str) -> StoreResult<Record> {
        let record = Record::allocate(record_type);
        uow.connection().execute(
            "INSERT INTO records (
                pid,
                record_type,
                state,
                data,
                revision,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, '{}', ?4, ?5, ?6);",
            params![
                record.pid.to_string(),
                record.record_type.as_str(),
                record.state.as_str(),
                record.revision,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(record)
    }

    fn resolve(&self, record_type: &str, id: &str) -> StoreResult<Record> {
        resolve_with(self.conn, record_type, id)
    }

    fn resolve_in(
        &self,
        uow: &UnitOfWork<'_>,
        record_type: &str,
        id: &str,
    ) -> StoreResult<Record> {
        resolve_with(uow.connection(), record_type, id)
    }

    fn commit_record(&self, uow: &UnitOfWork<'_>, mut record: Record) -> StoreResult<Record> {
        let data = encode_data(&record.data)?;
        let next_state = match record.state {
            RecordState::Draft | RecordState::Active => RecordState::Active,
            RecordState::Deleted => return Err(StoreError::Deleted(record.pid)),
        };
        let updated_at = now_epoch_ms().max(record.updated_at);

        let changed = uow.connection().execute(
            "UPDATE records
             SET
                state = ?1,
                data = ?2,
                revision = revision + 1,
                updated_at = ?3
             WHERE pid = ?4
               AND record_type = ?5
               AND state != 'deleted';",
            params![
                next_state.as_str(),
                data,
                updated_at,
                record.pid.to_string(),
                record.record_type.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(record.pid.to_string()));
        }

        record.state = next_state;
        record.revision += 1;
        record.updated_at = updated_at;
        Ok(record)
    }

    fn delete_record(&self, uow: &UnitOfWork<'_>, mut record: Record) -> StoreResult<Record> {
        let updated_at = now_epoch_ms().max(record.updated_at);
        let changed = uow.connection().execute(
            "UPDATE records
             SET
                state = 'deleted',
                revision = revision + 1,
                updated_at = ?1
             WHERE pid = ?2
               AND record_type = ?3
               AND state = 'active';",
            params![
                updated_at,
                record.pid.to_string(),
                record.record_type.as_str()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(record.pid.to_string()));
        }

        record.state = RecordState::Deleted;
        record.revision += 1;
        record.updated_at = updated_at;
        Ok(record)
    }
}

fn resolve_with(conn: &Connection, record_type: &str, id: &str) -> StoreResult<Record> {
    let Ok(pid) = Uuid::parse_str(id.trim()) else {
        return Err(StoreError::NotFound(id.to_string()));
    };

    let record = conn
        .query_row(
            &format!("{RECORD_SELECT_SQL} WHERE pid = ?1 AND record_type = ?2;"),
            params![pid.to_string(), record_type],
            |row| Ok(parse_record_row(row)),
        )
        .optional()?
        .transpose()?;

    match record {
        None => Err(StoreError::NotFound(id.to_string())),
        Some(record) if record.state == RecordState::Deleted => {
            Err(StoreError::Deleted(record.pid))
        }
        // Drafts only exist inside uncommitted units of work.
        Some(record) if record.state == RecordState::Draft => {
            Err(StoreError::NotFound(id.to_string()))
        }
        Some(record) => Ok(record),
    }
}

fn parse_record_row(row: &Row<'_>) -> StoreResult<Record> {
    let pid_text: String = row.get("pid")?;
    let pid = Uuid::parse_str(&pid_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid pid value `{pid_text}` in records.pid"))
    })?;

    let state_text: String = row.get("state")?;
    let state = RecordState::parse(&state_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid state `{state_text}` in records.state"))
    })?;

    let data_text: String = row.get("data")?;
    let data = match serde_json::from_str::<serde_json::Value>(&data_text) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => {
            return Err(StoreError::InvalidData(format!(
                "records.data for `{pid}` is not a JSON object"
            )));
        }
        Err(err) => {
            return Err(StoreError::InvalidData(format!(
                "records.data for `{pid}` is not valid JSON: {err}"
            )));
        }
    };

    Ok(Record {
        pid,
        record_type: row.get("record_type")?,
        data,
        state,
        revision: row.get("revision")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn encode_data(data: &RecordData) -> StoreResult<String> {
    serde_json::to_string(data)
        .map_err(|err| StoreError::InvalidData(format!("record payload not serializable: {err}")))
}
