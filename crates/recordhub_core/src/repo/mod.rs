//! Persistent store abstractions and SQLite implementation.
//!
//! # Responsibility
//! - Define the store contract the record service orchestrates.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Writes only happen inside an explicit unit of work.
//! - Store APIs return semantic errors (`NotFound`, `Deleted`) in addition to
//!   DB transport errors.

pub mod record_repo;
