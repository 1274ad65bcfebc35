//! Record domain model.
//!
//! # Responsibility
//! - Define the record and identity types every layer exchanges.
//!
//! # Invariants
//! - Every record is addressed by a stable `RecordId` (PID).
//! - Deletion is a terminal tombstone state, not a row removal.

pub mod identity;
pub mod record;
