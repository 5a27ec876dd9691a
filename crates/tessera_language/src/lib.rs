//! # Tessera Selector Language
//!
//! The selector language describes the shape of data to read from or
//! traverse in a normalized cache. Its grammar is a small subset of
//! GraphQL selection sets:
//!
//! - fields, with optional aliases: `alias: field`
//! - quoted field names: `{ "fiel d" }`
//! - nested selection sets: `{ author { name } }`
//! - the star selection `*`, meaning "every stored field"
//! - inline fragments: `... on Post { title }`
//! - named fragments: `...postFields` plus
//!   `fragment postFields on Post { title }`
//!
//! ## Usage
//!
//! ```
//! use tessera_language::Selector;
//!
//! let selector = Selector::parse("{ title author { name } }").unwrap();
//! assert_eq!(selector.to_string(), "{ title author { name } }");
//!
//! // Parsing is memoized: equal source yields the same document.
//! let again = Selector::parse("  { title author { name } }  ").unwrap();
//! assert!(selector.same_document(&again));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ast;
mod error;
mod parser;
mod selector;
mod serializer;

pub use ast::{
    Definition, Document, Field, FragmentDefinition, FragmentSpread, InlineFragment, Selection,
    SelectionSet,
};
pub use error::{SelectorError, SelectorResult};
pub use parser::parse_document;
pub use selector::Selector;
