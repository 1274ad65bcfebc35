//! Record service error taxonomy.

use crate::component::hook::ComponentError;
use crate::permission::policy::Action;
use crate::repo::record_repo::StoreError;
use crate::schema::adapter::ValidationError;
use crate::search::index::IndexError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors returned by record service operations.
#[derive(Debug)]
pub enum ServiceError {
    /// The identity lacks the permission for `action`.
    PermissionDenied { action: Action },
    /// No live record matches the identifier.
    NotFound(String),
    Validation(ValidationError),
    /// A component hook aborted the operation.
    Component {
        component: String,
        source: ComponentError,
    },
    Store(StoreError),
    Index(IndexError),
}

impl ServiceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Component { .. } => "component_error",
            Self::Store(_) => "store_error",
            Self::Index(_) => "index_error",
        }
    }

    pub(crate) fn component(component: &str, source: ComponentError) -> Self {
        Self::Component {
            component: component.to_string(),
            source,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied { action } => write!(f, "permission denied for `{action}`"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Component { component, source } => {
                write!(f, "component `{component}` failed: {source}")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::Index(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PermissionDenied { .. } | Self::NotFound(_) => None,
            Self::Validation(err) => Some(err),
            Self::Component { source, .. } => Some(source),
            Self::Store(err) => Some(err),
            Self::Index(err) => Some(err),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Deleted(pid) => Self::NotFound(pid.to_string()),
            other => Self::Store(other),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<IndexError> for ServiceError {
    fn from(value: IndexError) -> Self {
        Self::Index(value)
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceError;
    use crate::permission::policy::Action;
    use crate::repo::record_repo::StoreError;
    use crate::schema::adapter::ValidationError;
    use uuid::Uuid;

    #[test]
    fn store_lookup_failures_map_to_not_found() {
        let pid = Uuid::new_v4();
        let err = ServiceError::from(StoreError::Deleted(pid));
        assert!(matches!(&err, ServiceError::NotFound(id) if id == &pid.to_string()));
        assert_eq!(err.code(), "not_found");

        let err = ServiceError::from(StoreError::InvalidData("bad".to_string()));
        assert_eq!(err.code(), "store_error");
    }

    #[test]
    fn codes_and_messages_are_stable() {
        let err = ServiceError::PermissionDenied {
            action: Action::Delete,
        };
        assert_eq!(err.code(), "permission_denied");
        assert_eq!(err.to_string(), "permission denied for `delete`");

        let err = ServiceError::from(ValidationError::single("title", "missing required field"));
        assert_eq!(err.code(), "validation_error");
        assert_eq!(
            err.to_string(),
            "validation failed: title: missing required field"
        );
    }
}
