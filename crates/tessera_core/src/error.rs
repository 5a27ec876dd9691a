//! Error types for the cache.

use thiserror::Error;

use tessera_language::SelectorError;

/// Errors returned by cache operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The requested type name is not registered in the cache schema.
    #[error("type \"{name}\" not found")]
    TypeNotFound {
        /// The unresolved type name.
        name: String,
    },

    /// A fragment's type condition does not match the schema type it is
    /// applied to.
    #[error("the fragment type \"{fragment}\" does not match the schema type \"{schema}\"")]
    SelectorMismatch {
        /// The fragment's type condition.
        fragment: String,
        /// The schema type the selector was resolved against.
        schema: String,
    },

    /// A fragment spread references a fragment that is not defined in
    /// the selector document.
    #[error("fragment \"{name}\" not found")]
    FragmentNotFound {
        /// The spread fragment name.
        name: String,
    },

    /// The selector source could not be parsed.
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// Non-entity data containing a reference cycle cannot be written.
    #[error("cannot write non-entity data with circular references")]
    CircularData,

    /// The written data could not be resolved to an entity id: the
    /// type is unnamed and the data carries no usable identity.
    #[error("unable to identify an entity for the written data")]
    UnidentifiedData,
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
