//! Component trait, hook errors and factories.

use crate::model::identity::Identity;
use crate::model::record::{Record, RecordData};
use crate::search::params::SearchParams;
use crate::search::request::SearchRequest;
use crate::service::config::RecordServiceConfig;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Error raised by a component hook.
#[derive(Debug)]
pub struct ComponentError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ComponentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ComponentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ComponentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn Error + 'static))
    }
}

pub type ComponentResult<T> = Result<T, ComponentError>;

/// Extension invoked at fixed stages of record operations.
///
/// Every hook defaults to a pass-through. Record hooks take the record by
/// value and hand back the (possibly modified) record.
pub trait Component: Send + Sync {
    /// Name used in errors and log events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn search(
        &self,
        _identity: &Identity,
        request: SearchRequest,
        _params: &SearchParams,
    ) -> ComponentResult<SearchRequest> {
        Ok(request)
    }

    /// Runs on a freshly allocated record; `data` is the validated payload.
    fn create(
        &self,
        _identity: &Identity,
        _data: &RecordData,
        record: Record,
    ) -> ComponentResult<Record> {
        Ok(record)
    }

    fn read(&self, _identity: &Identity, record: Record) -> ComponentResult<Record> {
        Ok(record)
    }

    /// Runs before `data` is applied to the stored record.
    fn update(
        &self,
        _identity: &Identity,
        _data: &RecordData,
        record: Record,
    ) -> ComponentResult<Record> {
        Ok(record)
    }

    fn delete(&self, _identity: &Identity, record: Record) -> ComponentResult<Record> {
        Ok(record)
    }
}

/// Builds one component instance from the service configuration.
pub type ComponentFactory =
    Arc<dyn Fn(&RecordServiceConfig) -> Box<dyn Component> + Send + Sync + 'static>;

/// Wraps a closure as a [`ComponentFactory`].
pub fn component_factory<F>(factory: F) -> ComponentFactory
where
    F: Fn(&RecordServiceConfig) -> Box<dyn Component> + Send + Sync + 'static,
{
    Arc::new(factory)
}

#[cfg(test)]
mod tests {
    use super::{Component, ComponentError};
    use crate::model::identity::Identity;
    use crate::model::record::Record;
    use std::error::Error;

    struct Passthrough;

    impl Component for Passthrough {}

    #[test]
    fn default_hooks_pass_values_through() {
        let component = Passthrough;
        let record = Record::allocate("record");
        let identity = Identity::anonymous();

        let read = component.read(&identity, record.clone()).unwrap();
        assert_eq!(read, record);
        let deleted = component.delete(&identity, record.clone()).unwrap();
        assert_eq!(deleted, record);
        assert!(component.name().ends_with("Passthrough"));
    }

    #[test]
    fn component_error_keeps_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = ComponentError::new("quota check failed").with_source(cause);
        assert_eq!(err.to_string(), "quota check failed");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("disk full"));
    }
}
