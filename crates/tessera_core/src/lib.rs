//! An in-process, normalized object cache with a selector language.
//!
//! Data written under a schema type is normalized into a flat graph of
//! identifiable entities; selectors read arbitrary subsets of that
//! graph back out, with per-field expiration and invalidation,
//! optimistic overlays, change notification, and reference-counted
//! garbage collection.
//!
//! ```
//! use tessera_core::{schema, Cache, CacheConfig, ReadRequest, WriteRequest};
//! use serde_json::json;
//!
//! # fn main() -> tessera_core::CacheResult<()> {
//! let author = schema::object("Author").field("name", schema::string()).build();
//! let book = schema::object("Book")
//!     .field("title", schema::string())
//!     .field("author", schema::TypeRef::from(&author))
//!     .build();
//! let cache = Cache::new(CacheConfig::new().types([author, book.clone()]));
//!
//! cache.write(&WriteRequest::new(
//!     schema::TypeRef::from(&book),
//!     json!({ "id": 1, "title": "Walden", "author": { "id": 7, "name": "Thoreau" } }),
//! ))?;
//!
//! let result = cache
//!     .read(&ReadRequest::new("Book").id(1).select("{ title author { name } }"))?
//!     .ok_or(tessera_core::CacheError::UnidentifiedData)?;
//! assert_eq!(
//!     result.data.to_json(),
//!     json!({ "title": "Walden", "author": { "name": "Thoreau" } }),
//! );
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod entity;
mod error;
mod identify;
mod operations;
mod store;
mod types;

pub mod schema;
pub mod value;

pub use cache::{
    Cache, CacheConfig, ModifyRequest, ModifyResult, OverlayEntry, ReadRequest, ReadResult,
    RetainGuard, Select, Snapshot, WatchHandle, WriteRequest, WriteResult,
};
pub use entity::{Entity, EntityId};
pub use error::{CacheError, CacheResult};
pub use types::{InvalidField, MissingField, Path, PathSegment, NO_EXPIRY};
pub use value::{FieldMeta, ObjectValue, Value};

pub use tessera_language::{Selector, SelectorError};
