//! Errors produced while parsing selectors.

use thiserror::Error;

/// Errors produced while parsing a selector document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// The source could not be parsed.
    #[error("invalid selector at byte {position}: {message}")]
    Parse {
        /// Byte offset into the trimmed source where parsing failed.
        position: usize,
        /// What the parser expected at that position.
        message: &'static str,
    },

    /// The source contained no definitions.
    #[error("selector document is empty")]
    Empty,

    /// Unconsumed input remained after the last definition.
    #[error("unexpected trailing input at byte {position}")]
    TrailingInput {
        /// Byte offset of the first unconsumed character.
        position: usize,
    },
}

/// Result alias for selector parsing.
pub type SelectorResult<T> = Result<T, SelectorError>;
