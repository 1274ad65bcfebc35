//! Search request model, interpreter chain and index backends.
//!
//! # Responsibility
//! - Build permission-scoped [`request::SearchRequest`] values.
//! - Execute them against a [`index::SearchIndex`], by default the SQLite
//!   FTS5 backend in [`fts`].
//!
//! # Invariants
//! - Search callers cannot drop the permission filter of a request.

pub mod builder;
pub mod filter;
pub mod fts;
pub mod index;
pub mod interpreter;
pub mod params;
pub mod request;
