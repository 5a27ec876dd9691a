//! AST nodes for the selector language.

/// A parsed selector document: one or more definitions.
///
/// The first definition is the entry point of the selector. Additional
/// definitions are named fragments referenced by spreads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Definitions in source order.
    pub definitions: Vec<Definition>,
}

impl Document {
    /// The selection set of the first definition.
    #[must_use]
    pub fn root(&self) -> &SelectionSet {
        match &self.definitions[0] {
            Definition::Selection(set) => set,
            Definition::Fragment(fragment) => &fragment.selection_set,
        }
    }

    /// Look up a fragment definition by name.
    #[must_use]
    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.definitions.iter().find_map(|definition| match definition {
            Definition::Fragment(fragment) if fragment.name == name => Some(fragment),
            _ => None,
        })
    }
}

/// A top-level definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    /// A bare selection set: `{ a b }`.
    Selection(SelectionSet),
    /// A named fragment: `fragment f on T { a }`.
    Fragment(FragmentDefinition),
}

/// A named fragment definition with a type condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentDefinition {
    /// Fragment name, referenced by `...name` spreads.
    pub name: String,
    /// The schema type this fragment applies to.
    pub type_condition: String,
    /// The selected shape.
    pub selection_set: SelectionSet,
}

/// A braced list of selections.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionSet {
    /// Selections in source order.
    pub selections: Vec<Selection>,
}

impl SelectionSet {
    /// Whether the set selects nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

/// A single selection inside a selection set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A named field, optionally aliased and optionally nested.
    Field(Field),
    /// The star selection `*`: every stored field of the object.
    Star,
    /// An inline fragment: `... on T { a }`.
    InlineFragment(InlineFragment),
    /// A spread of a named fragment: `...name`.
    FragmentSpread(FragmentSpread),
}

/// A field selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Output name override: `alias: field`.
    pub alias: Option<String>,
    /// The stored field name.
    pub name: String,
    /// Nested selections, if any.
    pub selection_set: Option<SelectionSet>,
}

impl Field {
    /// A leaf field with no alias and no nested selections.
    #[must_use]
    pub fn leaf(name: impl Into<String>) -> Self {
        Self { alias: None, name: name.into(), selection_set: None }
    }

    /// The name this field appears under in results.
    #[must_use]
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// An inline fragment.
///
/// The type condition is required by the grammar but optional in the
/// tree, because selectors synthesized during writes may wrap selections
/// for anonymous object types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineFragment {
    /// The schema type the fragment applies to.
    pub type_condition: Option<String>,
    /// The selected shape.
    pub selection_set: SelectionSet,
}

/// A spread of a named fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentSpread {
    /// The name of the fragment being spread.
    pub name: String,
}
