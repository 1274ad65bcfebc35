//! Component hook protocol.
//!
//! # Responsibility
//! - Let configured extensions take part in every record operation.
//! - Ship the built-in payload and ownership components.
//!
//! # Invariants
//! - Components run in configured order; each hook receives the output of
//!   the previous one.
//! - A hook error aborts the operation before anything is persisted.

pub mod builtin;
pub mod hook;
