//! Built-in components.

use crate::component::hook::{component_factory, Component, ComponentFactory, ComponentResult};
use crate::model::identity::Identity;
use crate::model::record::{Record, RecordData, OWNERS_FIELD};
use serde_json::Value;

/// Copies the validated payload into a newly created record.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataComponent;

impl DataComponent {
    pub fn factory() -> ComponentFactory {
        component_factory(|_| Box::new(DataComponent))
    }
}

impl Component for DataComponent {
    fn name(&self) -> &str {
        "data"
    }

    fn create(
        &self,
        _identity: &Identity,
        data: &RecordData,
        mut record: Record,
    ) -> ComponentResult<Record> {
        record.apply(data);
        record.clear_none();
        Ok(record)
    }
}

/// Adds the creating user to the record's `owners` field.
///
/// System identities create records without owners.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnersComponent;

impl OwnersComponent {
    pub fn factory() -> ComponentFactory {
        component_factory(|_| Box::new(OwnersComponent))
    }
}

impl Component for OwnersComponent {
    fn name(&self) -> &str {
        "owners"
    }

    fn create(
        &self,
        identity: &Identity,
        _data: &RecordData,
        mut record: Record,
    ) -> ComponentResult<Record> {
        if identity.is_system() {
            return Ok(record);
        }
        let Some(user_id) = identity.user_id() else {
            return Ok(record);
        };

        let mut owners = record
            .owners()
            .into_iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        if !owners.iter().any(|owner| owner == user_id) {
            owners.push(user_id.to_string());
        }
        record.data.insert(
            OWNERS_FIELD.to_string(),
            Value::Array(owners.into_iter().map(Value::String).collect()),
        );
        Ok(record)
    }
}

/// Components installed by default, in order.
pub fn default_components() -> Vec<ComponentFactory> {
    vec![DataComponent::factory(), OwnersComponent::factory()]
}
