//! Canonical rendering of selector documents.
//!
//! Rendering is single-line and deterministic, so serialized selectors
//! can serve as map keys. Parsing the rendered text yields an equivalent
//! document.

use std::fmt;

use crate::ast::{
    Definition, Document, Field, FragmentDefinition, FragmentSpread, InlineFragment, Selection,
    SelectionSet,
};

fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_plain_name(name) {
        f.write_str(name)
    } else {
        f.write_str("\"")?;
        for c in name.chars() {
            if c == '"' || c == '\\' {
                f.write_str("\\")?;
            }
            write!(f, "{c}")?;
        }
        f.write_str("\"")
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, definition) in self.definitions.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            definition.fmt(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Definition::Selection(set) => set.fmt(f),
            Definition::Fragment(fragment) => fragment.fmt(f),
        }
    }
}

impl fmt::Display for FragmentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fragment {} on {} {}", self.name, self.type_condition, self.selection_set)
    }
}

impl fmt::Display for SelectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.selections.is_empty() {
            return f.write_str("{}");
        }
        f.write_str("{ ")?;
        for (index, selection) in self.selections.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            selection.fmt(f)?;
        }
        f.write_str(" }")
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Field(field) => field.fmt(f),
            Selection::Star => f.write_str("*"),
            Selection::InlineFragment(fragment) => fragment.fmt(f),
            Selection::FragmentSpread(spread) => spread.fmt(f),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{alias}: ")?;
        }
        write_name(f, &self.name)?;
        if let Some(set) = &self.selection_set {
            write!(f, " {set}")?;
        }
        Ok(())
    }
}

impl fmt::Display for InlineFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_condition {
            Some(type_condition) => write!(f, "... on {type_condition} {}", self.selection_set),
            None => write!(f, "... {}", self.selection_set),
        }
    }
}

impl fmt::Display for FragmentSpread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "...{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse_document;

    #[test]
    fn renders_canonical_text() {
        let doc = parse_document("  {a  b:c{d *}\"e e\" ... on T { f } ...frag}  ").unwrap();
        assert_eq!(doc.to_string(), r#"{ a b: c { d * } "e e" ... on T { f } ...frag }"#);
    }

    #[test]
    fn renders_empty_selection_set() {
        let doc = parse_document("{}").unwrap();
        assert_eq!(doc.to_string(), "{}");
    }

    #[test]
    fn renders_fragment_definitions() {
        let doc = parse_document("{ ...f } fragment f on T { a }").unwrap();
        assert_eq!(doc.to_string(), "{ ...f } fragment f on T { a }");
    }

    #[test]
    fn anonymous_inline_fragments_round_trip() {
        let doc = parse_document("{ ... { a } b }").unwrap();
        assert_eq!(doc.to_string(), "{ ... { a } b }");
        assert_eq!(parse_document(&doc.to_string()).unwrap(), doc);
    }

    #[test]
    fn round_trips_through_the_parser() {
        let doc = parse_document(r#"{ x: "quo \"ted\"" nested { a ... on U {} } }"#).unwrap();
        let rendered = doc.to_string();
        let reparsed = parse_document(&rendered).unwrap();
        assert_eq!(doc, reparsed);
        assert_eq!(reparsed.to_string(), rendered);
    }
}
