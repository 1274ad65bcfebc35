//! Permission engine contracts.
//!
//! # Responsibility
//! - Decide whether an identity may perform an action, optionally on a record.
//! - Render decisions as query filters for search-time scoping.
//!
//! # Invariants
//! - Actions without declared generators are denied.
//! - Search scoping never post-filters; unauthorized documents are excluded by
//!   the query itself.

pub mod policy;
