//! Entities: the unit of storage and identity in the cache.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::types::NO_EXPIRY;
use crate::value::Value;

/// A stable entity key.
///
/// Singleton entities are keyed by their bare type name (`"Settings"`),
/// identified entities by `TypeName:stableHash(id)` (`"Post:1"`,
/// `"Search:{\"page\":1}"`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Rc<str>);

impl EntityId {
    /// Wrap an existing key string.
    #[must_use]
    pub fn new(id: impl Into<Rc<str>>) -> Self {
        Self(id.into())
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(Rc::from(id))
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(Rc::from(id.as_str()))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

/// A stored entity: its key, value tree, and staleness state.
///
/// The value tree contains [`Value::Ref`] nodes wherever nested
/// entities were normalized out during a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// The entity key.
    pub id: EntityId,
    /// The stored value.
    pub value: Value,
    /// Entity-level expiration timestamp, [`NO_EXPIRY`] if unset.
    pub expires_at: i64,
    /// Entity-level invalidation flag.
    pub invalidated: bool,
}

impl Entity {
    /// A fresh, never-written entity shell.
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self { id, value: Value::Absent, expires_at: NO_EXPIRY, invalidated: false }
    }
}
