//! Common types shared across the cache: paths into traversed data and
//! the field reports produced by reads and writes.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Sentinel expiration timestamp meaning "never expires".
pub const NO_EXPIRY: i64 = -1;

/// Milliseconds since the Unix epoch.
#[must_use]
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// One step of a path into traversed data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// An object field name.
    Field(String),
    /// An array index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => f.write_str(name),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(name.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(name: String) -> Self {
        PathSegment::Field(name)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// A path into traversed data, from the operation root.
pub type Path = Vec<PathSegment>;

/// A selected field that was not present in the cached data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    /// Where the field was expected.
    pub path: Path,
}

impl MissingField {
    /// A missing field at the given path.
    #[must_use]
    pub fn at(path: impl IntoIterator<Item = impl Into<PathSegment>>) -> Self {
        Self { path: path.into_iter().map(Into::into).collect() }
    }
}

/// A value that did not match the schema type declared for its position.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidField {
    /// Where the value was encountered.
    pub path: Path,
    /// The offending value.
    pub value: Value,
}
