//! Recursive-descent parser for selector documents.

use crate::ast::{
    Definition, Document, Field, FragmentDefinition, FragmentSpread, InlineFragment, Selection,
    SelectionSet,
};
use crate::error::{SelectorError, SelectorResult};

/// Parse a selector document from source text.
///
/// The whole input must be consumed; trailing non-whitespace input is an
/// error, as is an input with no definitions.
pub fn parse_document(src: &str) -> SelectorResult<Document> {
    let mut parser = Parser { src, pos: 0 };
    parser.skip_ws();

    let mut definitions = Vec::new();
    while !parser.at_end() {
        if !definitions.is_empty() && !parser.at_definition_start() {
            return Err(SelectorError::TrailingInput { position: parser.pos });
        }
        definitions.push(parser.definition()?);
        parser.skip_ws();
    }

    if definitions.is_empty() {
        return Err(SelectorError::Empty);
    }
    Ok(Document { definitions })
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.src[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn fail<T>(&self, message: &'static str) -> SelectorResult<T> {
        Err(SelectorError::Parse { position: self.pos, message })
    }

    /// Whether the cursor sits on something a definition can start
    /// with: a selection set or the `fragment` keyword.
    fn at_definition_start(&self) -> bool {
        self.peek() == Some('{') || self.src[self.pos..].starts_with("fragment")
    }

    /// A bare name: `[_A-Za-z][_0-9A-Za-z]*`.
    fn name(&mut self) -> Option<&'a str> {
        let start = self.pos;
        let mut chars = self.src[self.pos..].char_indices();
        match chars.next() {
            Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {}
            _ => return None,
        }
        let mut end = self.src.len();
        for (offset, c) in chars {
            if c != '_' && !c.is_ascii_alphanumeric() {
                end = self.pos + offset;
                break;
            }
        }
        self.pos = end.min(self.src.len());
        Some(&self.src[start..self.pos])
    }

    /// A double-quoted name with `\"` and `\\` escapes.
    fn quoted_name(&mut self) -> SelectorResult<Option<String>> {
        if !self.eat("\"") {
            return Ok(None);
        }
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return self.fail("unterminated quoted name"),
                Some('"') => {
                    self.pos += 1;
                    return Ok(Some(value));
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c @ ('"' | '\\')) => {
                            value.push(c);
                            self.pos += 1;
                        }
                        Some(c) => {
                            value.push('\\');
                            value.push(c);
                            self.pos += c.len_utf8();
                        }
                        None => return self.fail("unterminated quoted name"),
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn definition(&mut self) -> SelectorResult<Definition> {
        let start = self.pos;
        if let Some(keyword) = self.name() {
            if keyword == "fragment" {
                return self.fragment_definition().map(Definition::Fragment);
            }
            self.pos = start;
        }
        if self.peek() == Some('{') {
            return self.selection_set().map(Definition::Selection);
        }
        self.fail("expected a selection set or fragment definition")
    }

    fn fragment_definition(&mut self) -> SelectorResult<FragmentDefinition> {
        self.skip_ws();
        let Some(name) = self.name() else {
            return self.fail("expected a fragment name");
        };
        let name = name.to_owned();
        self.skip_ws();
        if self.name() != Some("on") {
            return self.fail("expected `on` in fragment definition");
        }
        self.skip_ws();
        let Some(type_condition) = self.name() else {
            return self.fail("expected a type name after `on`");
        };
        let type_condition = type_condition.to_owned();
        self.skip_ws();
        let selection_set = self.selection_set()?;
        Ok(FragmentDefinition { name, type_condition, selection_set })
    }

    fn selection_set(&mut self) -> SelectorResult<SelectionSet> {
        if !self.eat("{") {
            return self.fail("expected `{`");
        }
        let mut selections = Vec::new();
        loop {
            self.skip_ws();
            if self.eat("}") {
                return Ok(SelectionSet { selections });
            }
            if self.at_end() {
                return self.fail("expected `}`");
            }
            selections.push(self.selection()?);
        }
    }

    fn selection(&mut self) -> SelectorResult<Selection> {
        if self.eat("*") {
            return Ok(Selection::Star);
        }
        if self.eat("...") {
            return self.fragment_selection();
        }
        self.field().map(Selection::Field)
    }

    /// After `...`: `... on T { ... }`, `... { ... }`, or `...name`.
    fn fragment_selection(&mut self) -> SelectorResult<Selection> {
        self.skip_ws();
        if self.peek() == Some('{') {
            let selection_set = self.selection_set()?;
            return Ok(Selection::InlineFragment(InlineFragment {
                type_condition: None,
                selection_set,
            }));
        }
        let Some(name) = self.name() else {
            return self.fail("expected a fragment name or `on` after `...`");
        };
        if name != "on" {
            return Ok(Selection::FragmentSpread(FragmentSpread { name: name.to_owned() }));
        }
        self.skip_ws();
        let Some(type_condition) = self.name() else {
            return self.fail("expected a type name after `on`");
        };
        let type_condition = type_condition.to_owned();
        self.skip_ws();
        let selection_set = self.selection_set()?;
        Ok(Selection::InlineFragment(InlineFragment {
            type_condition: Some(type_condition),
            selection_set,
        }))
    }

    fn field(&mut self) -> SelectorResult<Field> {
        // An alias is a bare name directly followed by a colon.
        let start = self.pos;
        let mut alias = None;
        if let Some(candidate) = self.name() {
            if self.eat(":") {
                alias = Some(candidate.to_owned());
                self.skip_ws();
            } else {
                self.pos = start;
            }
        }

        let name = if let Some(quoted) = self.quoted_name()? {
            quoted
        } else if let Some(name) = self.name() {
            name.to_owned()
        } else {
            return self.fail("expected a field name");
        };

        let after_name = self.pos;
        self.skip_ws();
        let selection_set = if self.peek() == Some('{') {
            Some(self.selection_set()?)
        } else {
            self.pos = after_name;
            None
        };

        Ok(Field { alias, name, selection_set })
    }
}
