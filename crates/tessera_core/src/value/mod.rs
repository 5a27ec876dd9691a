//! The value model: a JSON-like tree with entity references, an
//! explicit "absent" state, and per-field staleness metadata.

mod hash;
mod share;

pub use hash::stable_hash;
pub use share::replace_equal_deep;

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::types::NO_EXPIRY;

/// Per-field staleness metadata carried next to an object's fields.
///
/// Every field key of a stored object has an entry in both maps; maps
/// on plain (non-stored) objects are absent entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// Field expiration timestamps, [`NO_EXPIRY`] meaning none.
    pub expires_at: BTreeMap<String, i64>,
    /// Field invalidation flags.
    pub invalidated: BTreeMap<String, bool>,
}

impl FieldMeta {
    /// Stamp a field with an expiration and clear its invalidation.
    pub fn stamp(&mut self, field: &str, expires_at: i64) {
        self.expires_at.insert(field.to_owned(), expires_at);
        self.invalidated.insert(field.to_owned(), false);
    }

    /// The expiration recorded for a field, [`NO_EXPIRY`] if none.
    #[must_use]
    pub fn expires_at(&self, field: &str) -> i64 {
        self.expires_at.get(field).copied().unwrap_or(NO_EXPIRY)
    }

    /// Whether a field is flagged invalidated.
    #[must_use]
    pub fn is_invalidated(&self, field: &str) -> bool {
        self.invalidated.get(field).copied().unwrap_or(false)
    }

    /// Drop the metadata entries for a field.
    pub fn remove(&mut self, field: &str) {
        self.expires_at.remove(field);
        self.invalidated.remove(field);
    }

    fn merged_under(&self, base: &FieldMeta) -> FieldMeta {
        let mut merged = base.clone();
        merged.expires_at.extend(self.expires_at.iter().map(|(k, v)| (k.clone(), *v)));
        merged.invalidated.extend(self.invalidated.iter().map(|(k, v)| (k.clone(), *v)));
        merged
    }
}

/// An object value: named fields plus optional staleness metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectValue {
    /// The object's fields, including fields whose value is
    /// [`Value::Absent`].
    pub fields: BTreeMap<String, Value>,
    /// Per-field staleness metadata; present on stored objects only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<FieldMeta>,
}

impl ObjectValue {
    /// A plain object without metadata.
    #[must_use]
    pub fn plain(fields: BTreeMap<String, Value>) -> Self {
        Self { fields, meta: None }
    }

    /// An empty stored object with metadata maps.
    #[must_use]
    pub fn with_meta() -> Self {
        Self { fields: BTreeMap::new(), meta: Some(FieldMeta::default()) }
    }

    /// Merge `self` over `base`: base fields are kept unless
    /// overwritten, metadata maps are unioned the same way.
    #[must_use]
    pub(crate) fn merged_over(&self, base: &ObjectValue) -> ObjectValue {
        let mut fields = base.fields.clone();
        for (name, value) in &self.fields {
            fields.insert(name.clone(), value.clone());
        }
        let meta = match (&self.meta, &base.meta) {
            (Some(own), Some(other)) => Some(own.merged_under(other)),
            (Some(own), None) => Some(own.clone()),
            (None, other) => other.clone(),
        };
        ObjectValue { fields, meta }
    }
}

/// A value stored in or read from the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// A field that is present but has no value. Distinct from `Null`:
    /// writing an absent field records the field key without data.
    Absent,
    /// JSON null.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A string.
    String(Rc<str>),
    /// An array; elements share one allocation.
    Array(Rc<Vec<Value>>),
    /// An object, optionally carrying field metadata.
    Object(Rc<ObjectValue>),
    /// A reference to another entity.
    Ref(EntityId),
}

impl Value {
    /// A string value.
    #[must_use]
    pub fn string(value: impl Into<Rc<str>>) -> Self {
        Value::String(value.into())
    }

    /// An array value.
    #[must_use]
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    /// An object value.
    #[must_use]
    pub fn object(object: ObjectValue) -> Self {
        Value::Object(Rc::new(object))
    }

    /// A reference to the given entity.
    #[must_use]
    pub fn entity_ref(id: impl Into<EntityId>) -> Self {
        Value::Ref(id.into())
    }

    /// Whether this is [`Value::Absent`].
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Whether this is `Null` or `Absent`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Absent | Value::Null)
    }

    /// The object payload, if this is an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The array elements, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// The numeric payload, if this is a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// The referenced entity, if this is a reference.
    #[must_use]
    pub fn as_entity_ref(&self) -> Option<&EntityId> {
        match self {
            Value::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// Look up a field on an object value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_object().and_then(|object| object.fields.get(name))
    }

    /// Whether this is an object carrying field metadata, i.e. a value
    /// produced by a write rather than plain data.
    #[must_use]
    pub fn is_object_with_meta(&self) -> bool {
        matches!(self, Value::Object(object) if object.meta.is_some())
    }

    /// Shallow identity: composite values compare by allocation,
    /// scalars by value. This is the equality used for structural
    /// sharing and change detection.
    #[must_use]
    pub fn ptr_eq(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Absent, Value::Absent) | (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
            (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
            (Value::Ref(x), Value::Ref(y)) => x == y,
            _ => false,
        }
    }

    /// Render as plain JSON for display and assertions.
    ///
    /// Mirrors `JSON.stringify` conventions: absent object fields are
    /// dropped, absent array elements become null, references render as
    /// `{"___ref": id}`, and metadata is not included.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Absent | Value::Null => serde_json::Value::Null,
            Value::Bool(value) => serde_json::Value::Bool(*value),
            Value::Number(value) => {
                // Integral numbers render as JSON integers.
                if value.fract() == 0.0 && value.is_finite() && value.abs() < 9e15 {
                    serde_json::Value::from(*value as i64)
                } else {
                    serde_json::Number::from_f64(*value)
                        .map_or(serde_json::Value::Null, serde_json::Value::Number)
                }
            }
            Value::String(value) => serde_json::Value::String(value.to_string()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(object) => {
                let mut map = serde_json::Map::new();
                for (name, value) in &object.fields {
                    if !value.is_absent() {
                        map.insert(name.clone(), value.to_json());
                    }
                }
                serde_json::Value::Object(map)
            }
            Value::Ref(id) => {
                let mut map = serde_json::Map::new();
                map.insert(REF_KEY.to_owned(), serde_json::Value::String(id.to_string()));
                serde_json::Value::Object(map)
            }
        }
    }
}

/// The key marking an object as an entity reference in plain JSON.
pub const REF_KEY: &str = "___ref";

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if Value::ptr_eq(self, other) {
            return true;
        }
        match (self, other) {
            (Value::Array(x), Value::Array(y)) => x == y,
            (Value::Object(x), Value::Object(y)) => x == y,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Rc::from(value.as_str()))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Value::String(Rc::from(s.as_str())),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(serde_json::Value::String(id)) = map.get(REF_KEY) {
                        return Value::entity_ref(id.as_str());
                    }
                }
                let fields = map.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
                Value::object(ObjectValue::plain(fields))
            }
        }
    }
}
