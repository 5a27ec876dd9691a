//! The memoized `Selector` handle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::{Document, SelectionSet};
use crate::error::SelectorResult;
use crate::parser::parse_document;

thread_local! {
    static PARSE_CACHE: RefCell<HashMap<String, Selector>> = RefCell::new(HashMap::new());
}

/// A parsed selector: a shared document plus the source text it was
/// parsed from.
///
/// `Selector` is a cheap handle (`Rc` internally). Parsing is memoized
/// per thread by trimmed source text, so the same text always yields a
/// pointer-identical document; this makes selectors usable as cheap map
/// keys and enables pointer-based result caching downstream.
#[derive(Clone)]
pub struct Selector {
    document: Rc<Document>,
    source: Rc<str>,
}

impl Selector {
    /// Parse a selector, reusing a previously parsed document for the
    /// same (trimmed) source text.
    pub fn parse(source: &str) -> SelectorResult<Self> {
        let trimmed = source.trim();
        if let Some(cached) =
            PARSE_CACHE.with(|cache| cache.borrow().get(trimmed).cloned())
        {
            return Ok(cached);
        }
        let document = parse_document(trimmed)?;
        let selector =
            Self { document: Rc::new(document), source: Rc::from(trimmed) };
        PARSE_CACHE.with(|cache| {
            cache.borrow_mut().insert(trimmed.to_owned(), selector.clone());
        });
        Ok(selector)
    }

    /// Wrap an already-built document, rendering it for the source text.
    ///
    /// Used for selectors synthesized programmatically (for example the
    /// write shape recorded during normalization). The result is not
    /// memoized.
    #[must_use]
    pub fn from_document(document: Document) -> Self {
        let source: Rc<str> = Rc::from(document.to_string().as_str());
        Self { document: Rc::new(document), source }
    }

    /// The parsed document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The selection set of the first definition.
    #[must_use]
    pub fn root(&self) -> &SelectionSet {
        self.document.root()
    }

    /// The canonicalized source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether two selectors share the same parsed document.
    #[must_use]
    pub fn same_document(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.document, &other.document)
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.same_document(other) || self.source == other.source
    }
}

impl Eq for Selector {}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.source).finish()
    }
}
