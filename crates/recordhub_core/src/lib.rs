//! Core domain logic for RecordHub.
//!
//! The record service is the single place where permission checks, schema
//! validation, components, storage and index sync are composed.

pub mod component;
pub mod db;
pub mod logging;
pub mod model;
pub mod permission;
pub mod repo;
pub mod schema;
pub mod search;
pub mod service;

pub use component::builtin::{default_components, DataComponent, OwnersComponent};
pub use component::hook::{component_factory, Component, ComponentError, ComponentFactory};
pub use db::{open_db, open_db_in_memory, DbError, UnitOfWork};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::identity::Identity;
pub use model::record::{Record, RecordData, RecordId, RecordState};
pub use permission::policy::{
    Action, Decision, Generator, PermissionPolicy, RecordPermissionPolicy,
};
pub use repo::record_repo::{RecordStore, SqliteRecordStore, StoreError, StoreResult};
pub use schema::adapter::{FieldError, SchemaAdapter, ValidationError};
pub use schema::definition::{FieldDef, FieldKind, RecordSchema};
pub use search::filter::{FilterValue, QueryFilter};
pub use search::fts::SqliteSearchIndex;
pub use search::index::{Bucket, IndexError, IndexResult, SearchHit, SearchHits, SearchIndex};
pub use search::interpreter::{
    FacetsInterpreter, PaginationInterpreter, ParamInterpreter, QueryStrInterpreter,
    SortInterpreter,
};
pub use search::params::{SearchOptions, SearchParams};
pub use search::request::{SearchRequest, SortField, SortOrder};
pub use service::config::{
    default_interpreters, ConfigError, LinksConfig, RecordServiceConfig, RecordType,
};
pub use service::error::{ServiceError, ServiceResult};
pub use service::record_service::RecordService;
pub use service::result::{RecordItem, RecordList};

/// Crate version and the database schema version this build migrates to,
/// as `recordhub_core/<crate> schema/<user_version>`.
pub fn version_info() -> String {
    format!(
        "recordhub_core/{} schema/{}",
        env!("CARGO_PKG_VERSION"),
        db::migrations::latest_version()
    )
}

#[cfg(test)]
mod tests {
    use super::version_info;
    use crate::db::migrations::latest_version;

    #[test]
    fn version_info_reports_crate_and_schema() {
        let info = version_info();
        assert!(info.starts_with(concat!("recordhub_core/", env!("CARGO_PKG_VERSION"))));
        assert!(info.ends_with(&format!(" schema/{}", latest_version())));
    }
}
