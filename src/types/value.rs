//! The value model: everything a policy expression can produce or consume.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use thiserror::Error;

use super::EntityUid;
use crate::error::EvaluationError;
use crate::extensions::{EXTENSIONS, ExtensionValue};

/// Errors raised while turning external data into values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("unknown extension `{0}`")]
    UnknownExtension(String),

    #[error("invalid argument for extension `{name}`: {message}")]
    InvalidExtension { name: String, message: String },

    #[error("invalid entity reference: {0}")]
    InvalidEntity(String),

    #[error("unsupported value: {0}")]
    Unsupported(String),
}

/// A tagged authorization value.
///
/// Sets and records are backed by ordered collections, so two values built
/// from the same elements in a different order compare equal and hash alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "JsonValue", into = "JsonValue")]
pub enum Value {
    Bool(bool),
    Long(i64),
    String(String),
    EntityRef(EntityUid),
    Set(BTreeSet<Value>),
    Record(BTreeMap<String, Value>),
    Extension(ExtensionValue),
}

impl Value {
    pub fn set(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(values.into_iter().collect())
    }

    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn empty_record() -> Self {
        Value::Record(BTreeMap::new())
    }

    /// Name of the value's type as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Long(_) => "long",
            Value::String(_) => "string",
            Value::EntityRef(_) => "entity",
            Value::Set(_) => "set",
            Value::Record(_) => "record",
            Value::Extension(ext) => ext.tag(),
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvaluationError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(EvaluationError::type_mismatch("bool", other.type_name())),
        }
    }

    pub fn as_long(&self) -> Result<i64, EvaluationError> {
        match self {
            Value::Long(n) => Ok(*n),
            other => Err(EvaluationError::type_mismatch("long", other.type_name())),
        }
    }

    pub fn as_string(&self) -> Result<&str, EvaluationError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(EvaluationError::type_mismatch("string", other.type_name())),
        }
    }

    pub fn as_entity_ref(&self) -> Result<&EntityUid, EvaluationError> {
        match self {
            Value::EntityRef(uid) => Ok(uid),
            other => Err(EvaluationError::type_mismatch("entity", other.type_name())),
        }
    }

    pub fn as_set(&self) -> Result<&BTreeSet<Value>, EvaluationError> {
        match self {
            Value::Set(values) => Ok(values),
            other => Err(EvaluationError::type_mismatch("set", other.type_name())),
        }
    }

    pub fn as_record(&self) -> Result<&BTreeMap<String, Value>, EvaluationError> {
        match self {
            Value::Record(fields) => Ok(fields),
            other => Err(EvaluationError::type_mismatch("record", other.type_name())),
        }
    }

    pub fn as_extension(&self) -> Result<&ExtensionValue, EvaluationError> {
        match self {
            Value::Extension(ext) => Ok(ext),
            other => Err(EvaluationError::type_mismatch("extension", other.type_name())),
        }
    }

    /// Convert from the JSON value format, where entity references are
    /// escaped as `{"__entity": ..}` and extension values as
    /// `{"__extn": {"fn": .., "arg": ..}}`.
    pub fn from_json(json: JsonValue) -> Result<Self, ValueError> {
        match json {
            JsonValue::Bool(b) => Ok(Value::Bool(b)),
            JsonValue::Number(n) => n
                .as_i64()
                .map(Value::Long)
                .ok_or_else(|| ValueError::Unsupported(format!("number `{n}` is not a long"))),
            JsonValue::String(s) => Ok(Value::String(s)),
            JsonValue::Array(items) => items
                .into_iter()
                .map(Value::from_json)
                .collect::<Result<BTreeSet<_>, _>>()
                .map(Value::Set),
            JsonValue::Null => Err(ValueError::Unsupported("null".to_string())),
            JsonValue::Object(mut fields) => {
                if fields.len() == 1 {
                    if let Some(entity) = fields.remove("__entity") {
                        return serde_json::from_value::<EntityUid>(entity)
                            .map(Value::EntityRef)
                            .map_err(|e| ValueError::InvalidEntity(e.to_string()));
                    }
                    if let Some(extn) = fields.remove("__extn") {
                        return extension_from_json(extn);
                    }
                }
                fields
                    .into_iter()
                    .map(|(k, v)| Value::from_json(v).map(|v| (k, v)))
                    .collect::<Result<BTreeMap<_, _>, _>>()
                    .map(Value::Record)
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Long(n) => JsonValue::from(*n),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::EntityRef(uid) => json!({ "__entity": { "type": uid.type_name(), "id": uid.id() } }),
            Value::Set(values) => JsonValue::Array(values.iter().map(Value::to_json).collect()),
            Value::Record(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            Value::Extension(ext) => {
                json!({ "__extn": { "fn": ext.constructor(), "arg": ext.to_string() } })
            }
        }
    }
}

fn extension_from_json(extn: JsonValue) -> Result<Value, ValueError> {
    let name = extn
        .get("fn")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ValueError::Unsupported("`__extn` without a `fn` name".to_string()))?;
    let arg = extn
        .get("arg")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ValueError::Unsupported(format!("`__extn` `{name}` without an `arg`")))?;
    EXTENSIONS.construct(name, arg).map(Value::Extension)
}

impl TryFrom<JsonValue> for Value {
    type Error = ValueError;

    fn try_from(json: JsonValue) -> Result<Self, Self::Error> {
        Value::from_json(json)
    }
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<EntityUid> for Value {
    fn from(uid: EntityUid) -> Self {
        Value::EntityRef(uid)
    }
}

impl From<ExtensionValue> for Value {
    fn from(ext: ExtensionValue) -> Self {
        Value::Extension(ext)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::EntityRef(uid) => write!(f, "{uid}"),
            Value::Set(values) => write!(f, "[{}]", values.iter().join(", ")),
            Value::Record(fields) => write!(
                f,
                "{{{}}}",
                fields.iter().map(|(k, v)| format!("{k:?}: {v}")).join(", ")
            ),
            Value::Extension(ext) => write!(f, "{}(\"{ext}\")", ext.constructor()),
        }
    }
}
