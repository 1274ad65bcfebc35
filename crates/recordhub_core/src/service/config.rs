//! Record service configuration.
//!
//! # Invariants
//! - A configuration is immutable once handed to a service.
//! - `RecordType::index_name` is the search alias itself or starts with
//!   `<search_alias>-`.

use crate::component::builtin::default_components;
use crate::component::hook::ComponentFactory;
use crate::permission::policy::PermissionPolicy;
use crate::schema::definition::RecordSchema;
use crate::search::filter::is_valid_field_path;
use crate::search::interpreter::{
    FacetsInterpreter, PaginationInterpreter, ParamInterpreter, QueryStrInterpreter,
    SortInterpreter,
};
use crate::search::params::SearchOptions;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Invalid service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidName(String),
    InvalidIndexName {
        index_name: String,
        search_alias: String,
    },
    /// Facet or sort field that is not a valid path or is role-restricted.
    InvalidSearchField {
        field: String,
        reason: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid record type name `{name}`"),
            Self::InvalidIndexName {
                index_name,
                search_alias,
            } => write!(
                f,
                "index `{index_name}` is not covered by search alias `{search_alias}`"
            ),
            Self::InvalidSearchField { field, reason } => {
                write!(f, "search field `{field}` {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Logical record type and its index naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    name: String,
    search_alias: String,
    index_name: String,
}

impl RecordType {
    /// Record type with alias `<name>s` and index `<name>s-v1`.
    pub fn named(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        let alias = format!("{name}s");
        let index_name = format!("{alias}-v1");
        Self::new(name, alias, index_name)
    }

    pub fn new(
        name: impl Into<String>,
        search_alias: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let search_alias = search_alias.into();
        let index_name = index_name.into();

        for candidate in [&name, &search_alias, &index_name] {
            if !is_valid_type_name(candidate) {
                return Err(ConfigError::InvalidName(candidate.clone()));
            }
        }
        let covered = index_name == search_alias
            || index_name
                .strip_prefix(search_alias.as_str())
                .is_some_and(|rest| rest.starts_with('-'));
        if !covered {
            return Err(ConfigError::InvalidIndexName {
                index_name,
                search_alias,
            });
        }

        Ok(Self {
            name,
            search_alias,
            index_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn search_alias(&self) -> &str {
        &self.search_alias
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }
}

fn is_valid_type_name(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 64
        && value
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-')
}

/// Base URL used to render result links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinksConfig {
    base_url: String,
}

impl LinksConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Collection URL, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Service configuration shared across requests.
#[derive(Clone)]
pub struct RecordServiceConfig {
    pub record_type: RecordType,
    pub schema: RecordSchema,
    pub permission_policy: Arc<dyn PermissionPolicy>,
    /// Component factories, in hook order.
    pub components: Vec<ComponentFactory>,
    /// Parameter interpreters, in chain order.
    pub search_params_interpreters: Vec<Arc<dyn ParamInterpreter>>,
    pub search: SearchOptions,
    /// Default links configuration when an operation passes none.
    pub links: Option<LinksConfig>,
}

impl RecordServiceConfig {
    /// Configuration with default components, interpreters and options.
    pub fn new(
        record_type: RecordType,
        schema: RecordSchema,
        permission_policy: Arc<dyn PermissionPolicy>,
    ) -> Self {
        Self {
            record_type,
            schema,
            permission_policy,
            components: default_components(),
            search_params_interpreters: default_interpreters(),
            search: SearchOptions::default(),
            links: None,
        }
    }

    pub fn with_components(mut self, components: Vec<ComponentFactory>) -> Self {
        self.components = components;
        self
    }

    /// Appends one component after the configured ones.
    pub fn add_component(mut self, component: ComponentFactory) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_interpreters(mut self, interpreters: Vec<Arc<dyn ParamInterpreter>>) -> Self {
        self.search_params_interpreters = interpreters;
        self
    }

    /// Replaces search options.
    ///
    /// # Errors
    /// - `InvalidSearchField` when a facet or sort field is not a valid
    ///   document path or is restricted to a role in the schema.
    pub fn with_search_options(mut self, options: SearchOptions) -> Result<Self, ConfigError> {
        for field in options.facets.iter().chain(options.sort_fields.iter()) {
            let reason = if !is_valid_field_path(field) {
                "is not a valid document path"
            } else if self
                .schema
                .get(field)
                .is_some_and(|def| def.restricted_to.is_some())
            {
                "is restricted to a role"
            } else {
                continue;
            };
            return Err(ConfigError::InvalidSearchField {
                field: field.clone(),
                reason,
            });
        }
        self.search = options;
        Ok(self)
    }

    pub fn with_links(mut self, links: LinksConfig) -> Self {
        self.links = Some(links);
        self
    }
}

impl Debug for RecordServiceConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordServiceConfig")
            .field("record_type", &self.record_type)
            .field("schema", &self.schema)
            .field("permission_policy", &self.permission_policy)
            .field("components", &self.components.len())
            .field("search_params_interpreters", &self.search_params_interpreters)
            .field("search", &self.search)
            .field("links", &self.links)
            .finish()
    }
}

/// Interpreters installed by default, in order.
pub fn default_interpreters() -> Vec<Arc<dyn ParamInterpreter>> {
    vec![
        Arc::new(QueryStrInterpreter),
        Arc::new(PaginationInterpreter),
        Arc::new(SortInterpreter),
        Arc::new(FacetsInterpreter),
    ]
}
