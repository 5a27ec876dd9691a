//! Traversal operations over the store: reading, writing, and the
//! selector-guided modification walk behind delete and invalidate.

pub(crate) mod modify;
pub(crate) mod read;
pub(crate) mod shared;
pub(crate) mod write;
