//! Declarative record schema.

use serde::Deserialize;

/// Payload keys owned by the service and rejected in caller input.
pub const RESERVED_FIELDS: &[&str] = &["id", "created", "updated", "revision_id"];

/// Value kind of one schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    StringList,
    /// Free-form JSON object.
    Object,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::StringList => "string_list",
            Self::Object => "object",
        }
    }
}

/// One field definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Maximum char count for strings and string list items.
    #[serde(default)]
    pub max_len: Option<usize>,
    /// Settable on create, unchangeable on update.
    #[serde(default)]
    pub immutable: bool,
    /// Only identities holding this role may write or see the field.
    #[serde(default)]
    pub restricted_to: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            max_len: None,
            immutable: false,
            restricted_to: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn restricted_to(mut self, role: impl Into<String>) -> Self {
        self.restricted_to = Some(role.into());
        self
    }
}

/// Ordered field set validated by the schema adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordSchema {
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Keep unknown payload keys instead of rejecting them.
    #[serde(default)]
    pub allow_unknown: bool,
}

impl RecordSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field definition.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.retain(|existing| existing.name != field.name);
        self.fields.push(field);
        self
    }

    pub fn allow_unknown(mut self, allow: bool) -> Self {
        self.allow_unknown = allow;
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Names of fields restricted to a role.
    pub fn restricted_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|field| field.restricted_to.is_some())
            .map(|field| field.name.as_str())
    }

    /// Loads a schema from its JSON declaration.
    pub fn from_json_str(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldDef, FieldKind, RecordSchema};

    #[test]
    fn field_replaces_existing_definition() {
        let schema = RecordSchema::new()
            .field(FieldDef::new("title", FieldKind::String))
            .field(FieldDef::new("title", FieldKind::String).required());
        assert_eq!(schema.fields.len(), 1);
        assert!(schema.get("title").unwrap().required);
    }

    #[test]
    fn parses_json_declaration() {
        let schema = RecordSchema::from_json_str(
            r#"{
                "fields": [
                    {"name": "title", "kind": "string", "required": true, "max_len": 10},
                    {"name": "tags", "kind": "string_list"},
                    {"name": "note", "kind": "string", "restricted_to": "curator"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.get("title").unwrap().max_len, Some(10));
        assert_eq!(schema.get("tags").unwrap().kind, FieldKind::StringList);
        assert_eq!(
            schema.get("note").unwrap().restricted_to.as_deref(),
            Some("curator")
        );
        assert!(!schema.allow_unknown);
    }
}
