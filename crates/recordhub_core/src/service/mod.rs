//! Record service façade.
//!
//! # Responsibility
//! - Expose search/create/read/update/delete as use-case level APIs.
//! - Keep hosts decoupled from store, index and policy details.

pub mod config;
pub mod error;
pub mod record_service;
pub mod result;
