//! Record service orchestrator.
//!
//! # Responsibility
//! - Compose permission checks, schema validation, components, store writes
//!   and index sync for search, create, read, update and delete.
//!
//! # Invariants
//! - Exactly one permission check runs before any store or index mutation.
//! - Create and update validate the payload exactly once, before persistence.
//! - Store writes of one operation share one unit of work; any failure before
//!   its commit rolls everything back.
//! - The index is written only after the unit of work commits. An index
//!   failure at that point is reported as `index_error` and logged with
//!   `error_code=index_diverged`; the committed record is kept.

use crate::component::hook::Component;
use crate::model::identity::Identity;
use crate::model::record::Record;
use crate::permission::policy::Action;
use crate::repo::record_repo::{RecordStore, SqliteRecordStore, StoreError};
use crate::schema::adapter::SchemaAdapter;
use crate::search::builder::SearchRequestBuilder;
use crate::search::fts::SqliteSearchIndex;
use crate::search::index::{IndexResult, SearchIndex};
use crate::search::params::SearchParams;
use crate::service::config::{LinksConfig, RecordServiceConfig};
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::result::{RecordItem, RecordList};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// CRUD and search façade for one record type.
pub struct RecordService<S: RecordStore, X: SearchIndex> {
    config: Arc<RecordServiceConfig>,
    store: S,
    index: X,
    schema: SchemaAdapter,
    components: Vec<Box<dyn Component>>,
}

impl<'conn> RecordService<SqliteRecordStore<'conn>, SqliteSearchIndex<'conn>> {
    /// Service backed by the SQLite store and index on one connection.
    pub fn sqlite(conn: &'conn Connection, config: Arc<RecordServiceConfig>) -> Self {
        let index = SqliteSearchIndex::new(conn, config.record_type.index_name())
            .with_hidden_fields(config.schema.restricted_fields());
        Self::new(config, SqliteRecordStore::new(conn), index)
    }
}

impl<S: RecordStore, X: SearchIndex> RecordService<S, X> {
    /// Builds the schema adapter and every configured component once.
    pub fn new(config: Arc<RecordServiceConfig>, store: S, index: X) -> Self {
        let schema = SchemaAdapter::new(config.schema.clone());
        let components = config
            .components
            .iter()
            .map(|factory| factory(config.as_ref()))
            .collect::<Vec<_>>();
        info!(
            "event=service_init module=service status=ok record_type={} components={} interpreters={}",
            config.record_type.name(),
            components.len(),
            config.search_params_interpreters.len()
        );
        Self {
            config,
            store,
            index,
            schema,
            components,
        }
    }

    pub fn config(&self) -> &RecordServiceConfig {
        &self.config
    }

    pub fn schema(&self) -> &SchemaAdapter {
        &self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &X {
        &self.index
    }

    /// Searches records visible to `identity`.
    ///
    /// # Errors
    /// - `permission_denied` without the `search` permission.
    /// - `validation_error` for malformed params.
    /// - `component_error` / `index_error` from hooks or the index.
    pub fn search(
        &self,
        identity: &Identity,
        params: &SearchParams,
        links: Option<&LinksConfig>,
    ) -> ServiceResult<RecordList> {
        let started_at = self.start("search", identity);
        let result = self.search_inner(identity, params, links);
        self.observe("search", identity, started_at, result)
    }

    fn search_inner(
        &self,
        identity: &Identity,
        params: &SearchParams,
        links: Option<&LinksConfig>,
    ) -> ServiceResult<RecordList> {
        self.require(Action::Search, identity, None)?;

        let options = &self.config.search;
        let builder = SearchRequestBuilder::new(
            self.config.record_type.search_alias(),
            self.config.permission_policy.as_ref(),
            &self.config.search_params_interpreters,
            options,
        );
        let mut request = builder.search_request(identity, params, options.preference)?;
        for component in &self.components {
            request = component
                .search(identity, request, params)
                .map_err(|err| ServiceError::component(component.name(), err))?;
        }

        let mut hits = self.index.execute(&request)?;
        for hit in &mut hits.hits {
            hit.document = self.schema.mask(identity, &hit.document);
        }

        Ok(RecordList::new(
            hits.total,
            hits.hits,
            hits.aggregations,
            request.offset(),
            request.limit(),
            params.clone(),
            identity.clone(),
            self.links(links),
        ))
    }

    /// Creates a record from a caller payload.
    ///
    /// # Errors
    /// - `permission_denied` without the `create` permission.
    /// - `validation_error` when the payload fails the schema.
    /// - `component_error` / `store_error` before commit (nothing persisted).
    /// - `index_error` after commit (record persisted, index behind).
    pub fn create(
        &self,
        identity: &Identity,
        data: &Value,
        links: Option<&LinksConfig>,
    ) -> ServiceResult<RecordItem> {
        let started_at = self.start("create", identity);
        let result = self.create_inner(identity, data, links);
        self.observe("create", identity, started_at, result)
    }

    fn create_inner(
        &self,
        identity: &Identity,
        data: &Value,
        links: Option<&LinksConfig>,
    ) -> ServiceResult<RecordItem> {
        self.require(Action::Create, identity, None)?;
        let data = self.schema.load(identity, data, None, None)?;

        let uow = self.store.begin("create")?;
        let mut record = self
            .store
            .allocate(&uow, self.config.record_type.name())?;
        for component in &self.components {
            record = component
                .create(identity, &data, record)
                .map_err(|err| ServiceError::component(component.name(), err))?;
        }
        let record = self.store.commit_record(&uow, record)?;
        uow.commit().map_err(StoreError::from)?;

        self.sync_index("create", &record, self.index.index(&record))?;
        Ok(self.item(identity, record, links))
    }

    /// Reads one live record.
    ///
    /// # Errors
    /// - `not_found` for unknown, unparsable or deleted ids.
    /// - `permission_denied` without the `read` permission on the record.
    pub fn read(
        &self,
        identity: &Identity,
        id: &str,
        links: Option<&LinksConfig>,
    ) -> ServiceResult<RecordItem> {
        let started_at = self.start("read", identity);
        let result = self.read_inner(identity, id, links);
        self.observe("read", identity, started_at, result)
    }

    fn read_inner(
        &self,
        identity: &Identity,
        id: &str,
        links: Option<&LinksConfig>,
    ) -> ServiceResult<RecordItem> {
        let mut record = self.store.resolve(self.config.record_type.name(), id)?;
        self.require(Action::Read, identity, Some(&record))?;
        for component in &self.components {
            record = component
                .read(identity, record)
                .map_err(|err| ServiceError::component(component.name(), err))?;
        }
        Ok(self.item(identity, record, links))
    }

    /// Merges a caller payload into one live record.
    ///
    /// Top-level keys of `data` replace stored keys; `null` removes them.
    ///
    /// # Errors
    /// Same classes as [`RecordService::create`], plus `not_found`.
    pub fn update(
        &self,
        identity: &Identity,
        id: &str,
        data: &Value,
        links: Option<&LinksConfig>,
    ) -> ServiceResult<RecordItem> {
        let started_at = self.start("update", identity);
        let result = self.update_inner(identity, id, data, links);
        self.observe("update", identity, started_at, result)
    }

    fn update_inner(
        &self,
        identity: &Identity,
        id: &str,
        data: &Value,
        links: Option<&LinksConfig>,
    ) -> ServiceResult<RecordItem> {
        let uow = self.store.begin("update")?;
        let mut record = self
            .store
            .resolve_in(&uow, self.config.record_type.name(), id)?;
        self.require(Action::Update, identity, Some(&record))?;
        let data = self
            .schema
            .load(identity, data, Some(&record.pid), Some(&record))?;

        for component in &self.components {
            record = component
                .update(identity, &data, record)
                .map_err(|err| ServiceError::component(component.name(), err))?;
        }
        record.apply(&data);
        record.clear_none();

        let record = self.store.commit_record(&uow, record)?;
        uow.commit().map_err(StoreError::from)?;

        self.sync_index("update", &record, self.index.index(&record))?;
        Ok(self.item(identity, record, links))
    }

    /// Tombstones one live record and removes it from the index.
    ///
    /// # Errors
    /// Same classes as [`RecordService::update`].
    pub fn delete(
        &self,
        identity: &Identity,
        id: &str,
        _links: Option<&LinksConfig>,
    ) -> ServiceResult<bool> {
        let started_at = self.start("delete", identity);
        let result = self.delete_inner(identity, id);
        self.observe("delete", identity, started_at, result)
    }

    fn delete_inner(&self, identity: &Identity, id: &str) -> ServiceResult<bool> {
        let uow = self.store.begin("delete")?;
        let mut record = self
            .store
            .resolve_in(&uow, self.config.record_type.name(), id)?;
        self.require(Action::Delete, identity, Some(&record))?;

        for component in &self.components {
            record = component
                .delete(identity, record)
                .map_err(|err| ServiceError::component(component.name(), err))?;
        }
        let tombstone = self.store.delete_record(&uow, record)?;
        uow.commit().map_err(StoreError::from)?;

        self.sync_index("delete", &tombstone, self.index.delete(&tombstone))?;
        Ok(true)
    }

    fn require(
        &self,
        action: Action,
        identity: &Identity,
        record: Option<&Record>,
    ) -> ServiceResult<()> {
        let decision = self
            .config
            .permission_policy
            .decide(action, identity, record);
        if decision.allows() {
            return Ok(());
        }
        warn!(
            "event=permission_check module=service status=denied action={} actor={} pid={}",
            action,
            identity.actor_key(),
            record.map_or_else(|| "-".to_string(), |record| record.pid.to_string())
        );
        Err(ServiceError::PermissionDenied { action })
    }

    fn sync_index(&self, op: &str, record: &Record, result: IndexResult<()>) -> ServiceResult<()> {
        result.map_err(|err| {
            error!(
                "event=index_sync module=service status=error op={} pid={} revision={} error_code=index_diverged error={}",
                op, record.pid, record.revision, err
            );
            ServiceError::Index(err)
        })
    }

    fn links(&self, links: Option<&LinksConfig>) -> Option<LinksConfig> {
        links.or(self.config.links.as_ref()).cloned()
    }

    fn item(&self, identity: &Identity, record: Record, links: Option<&LinksConfig>) -> RecordItem {
        let data = self.schema.dump(identity, &record);
        RecordItem::new(record, data, identity.clone(), self.links(links))
    }

    fn start(&self, op: &str, identity: &Identity) -> Instant {
        debug!(
            "event=record_{op} module=service status=start record_type={} actor={}",
            self.config.record_type.name(),
            identity.actor_key()
        );
        Instant::now()
    }

    fn observe<T>(
        &self,
        op: &str,
        identity: &Identity,
        started_at: Instant,
        result: ServiceResult<T>,
    ) -> ServiceResult<T> {
        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(_) => info!(
                "event=record_{op} module=service status=ok record_type={} actor={} duration_ms={duration_ms}",
                self.config.record_type.name(),
                identity.actor_key()
            ),
            Err(err) => warn!(
                "event=record_{op} module=service status=error record_type={} actor={} error_code={} duration_ms={duration_ms}",
                self.config.record_type.name(),
                identity.actor_key(),
                err.code()
            ),
        }
        result
    }
}
