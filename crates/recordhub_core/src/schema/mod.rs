//! Record schema and schema adapter.
//!
//! # Responsibility
//! - Declare the fields a record payload may carry.
//! - Validate caller input before any persistent state changes.
//!
//! # Invariants
//! - Validation failure never reaches the store.

pub mod adapter;
pub mod definition;
