//! Schema adapter: validates caller payloads and renders stored payloads.
//!
//! # Responsibility
//! - Coerce and validate payloads against [`RecordSchema`].
//! - Apply identity-aware masking and record-aware rules.
//!
//! # Invariants
//! - `load` either returns a fully valid payload or every violation found.
//! - `load` never mutates the record it is given.
//! - Output of `load` never contains reserved keys.

use crate::model::identity::Identity;
use crate::model::record::{Record, RecordData, RecordId};
use crate::schema::definition::{FieldDef, FieldKind, RecordSchema, RESERVED_FIELDS};
use log::debug;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Pseudo field name used for payload-level violations.
pub const PAYLOAD_FIELD: &str = "_payload";

/// One field-level violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Aggregated validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldError::new(field, message)])
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Returns whether any violation names `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|error| error.field == field)
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed")?;
        for (index, error) in self.errors.iter().enumerate() {
            let separator = if index == 0 { ": " } else { "; " };
            write!(f, "{separator}{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl Error for ValidationError {}

pub type SchemaResult<T> = Result<T, ValidationError>;

/// Validation/serialization engine bound to one record schema.
#[derive(Debug, Clone)]
pub struct SchemaAdapter {
    schema: RecordSchema,
}

impl SchemaAdapter {
    pub fn new(schema: RecordSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Validates and normalizes a caller payload.
    ///
    /// `pid` and `record` are `None` on create and set on update.
    ///
    /// # Errors
    /// - Non-object payloads, unknown or reserved keys, type mismatches,
    ///   missing required fields and changed immutable fields.
    pub fn load(
        &self,
        identity: &Identity,
        data: &Value,
        pid: Option<&RecordId>,
        record: Option<&Record>,
    ) -> SchemaResult<RecordData> {
        let Some(input) = data.as_object() else {
            return Err(ValidationError::single(
                PAYLOAD_FIELD,
                "payload must be a JSON object",
            ));
        };

        let mut output = RecordData::new();
        let mut errors = Vec::new();

        for (key, value) in input {
            if key == "id" {
                match pid {
                    None => errors.push(FieldError::new(key, "id is assigned by the service")),
                    Some(pid) if value.as_str() != Some(pid.to_string().as_str()) => {
                        errors.push(FieldError::new(key, "id does not match the record"));
                    }
                    Some(_) => {}
                }
                continue;
            }
            if RESERVED_FIELDS.contains(&key.as_str()) {
                errors.push(FieldError::new(key, "field is read-only"));
                continue;
            }

            let Some(def) = self.schema.get(key) else {
                if self.schema.allow_unknown {
                    output.insert(key.clone(), value.clone());
                } else {
                    errors.push(FieldError::new(key, "unknown field"));
                }
                continue;
            };

            if !can_access(identity, def) {
                debug!(
                    "event=schema_mask module=schema status=ok field={} actor={}",
                    key,
                    identity.actor_key()
                );
                continue;
            }

            if value.is_null() {
                if def.required {
                    errors.push(FieldError::new(key, "field may not be null"));
                } else if def.immutable && holds_value(record, key) {
                    errors.push(FieldError::new(key, "field is immutable"));
                } else {
                    output.insert(key.clone(), Value::Null);
                }
                continue;
            }

            let coerced = match coerce(def, value) {
                Ok(coerced) => coerced,
                Err(message) => {
                    errors.push(FieldError::new(key, message));
                    continue;
                }
            };

            if def.immutable {
                if let Some(existing) = record.and_then(|record| record.get(key)) {
                    if existing != &coerced {
                        errors.push(FieldError::new(key, "field is immutable"));
                        continue;
                    }
                }
            }

            output.insert(key.clone(), coerced);
        }

        for def in &self.schema.fields {
            if !def.required || !can_access(identity, def) || errors_contain(&errors, &def.name) {
                continue;
            }
            let in_payload = output.get(&def.name).is_some_and(|value| !value.is_null());
            let in_record = holds_value(record, &def.name);
            if !in_payload && !in_record {
                errors.push(FieldError::new(&def.name, "missing required field"));
            }
        }

        if errors.is_empty() {
            Ok(output)
        } else {
            Err(ValidationError::new(errors))
        }
    }

    /// Renders a stored payload for `identity`, hiding restricted fields.
    pub fn dump(&self, identity: &Identity, record: &Record) -> RecordData {
        self.mask(identity, &record.data)
    }

    /// Drops fields `identity` may not see from a payload or index document.
    pub fn mask(&self, identity: &Identity, data: &RecordData) -> RecordData {
        data.iter()
            .filter(|(key, _)| {
                self.schema
                    .get(key)
                    .map_or(true, |def| can_access(identity, def))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

fn can_access(identity: &Identity, def: &FieldDef) -> bool {
    match def.restricted_to.as_deref() {
        None => true,
        Some(role) => identity.is_system() || identity.has_role(role),
    }
}

fn errors_contain(errors: &[FieldError], field: &str) -> bool {
    errors.iter().any(|error| error.field == field)
}

fn holds_value(record: Option<&Record>, key: &str) -> bool {
    record
        .and_then(|record| record.get(key))
        .is_some_and(|value| !value.is_null())
}

fn coerce(def: &FieldDef, value: &Value) -> Result<Value, String> {
    match def.kind {
        FieldKind::String => match value {
            Value::String(text) => check_len(def, text.trim()).map(Value::from),
            _ => Err("not a valid string".to_string()),
        },
        FieldKind::Integer => coerce_integer(value)
            .map(Value::from)
            .ok_or_else(|| "not a valid integer".to_string()),
        FieldKind::Float => coerce_float(value)
            .map(Value::from)
            .ok_or_else(|| "not a valid number".to_string()),
        FieldKind::Boolean => match value {
            Value::Bool(flag) => Ok(Value::Bool(*flag)),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err("not a valid boolean".to_string()),
            },
            _ => Err("not a valid boolean".to_string()),
        },
        FieldKind::StringList => match value {
            Value::String(text) => Ok(Value::Array(vec![Value::from(check_len(
                def,
                text.trim(),
            )?)])),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::String(text) => check_len(def, text.trim()).map(Value::from),
                    _ => Err(format!("item {index} is not a string")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Err("not a valid list of strings".to_string()),
        },
        FieldKind::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err("not a valid object".to_string()),
        },
    }
}

fn check_len(def: &FieldDef, text: &str) -> Result<String, String> {
    match def.max_len {
        Some(max_len) if text.chars().count() > max_len => {
            Err(format!("longer than {max_len} characters"))
        }
        _ => Ok(text.to_string()),
    }
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < 9.0e15)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<f64> {
    let float = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    float.is_finite().then_some(float)
}
