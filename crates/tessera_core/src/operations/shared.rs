//! Selection-set resolution shared by the traversal operations.

use std::collections::HashMap;

use tessera_language::{Definition, Document, Field, Selection, SelectionSet};

use crate::error::{CacheError, CacheResult};
use crate::schema::{ObjectType, SchemaType};
use crate::value::ObjectValue;

/// Resolve a selector document to the selection set applying to the
/// given type. The first definition wins; a fragment definition only
/// applies when its type condition matches the type's name.
pub(crate) fn resolve_selection_set<'a>(
    document: &'a Document,
    ty: Option<&SchemaType>,
) -> CacheResult<&'a SelectionSet> {
    match document.definitions.first() {
        Some(Definition::Selection(selection_set)) => Ok(selection_set),
        Some(Definition::Fragment(fragment)) => {
            let matches = match ty {
                Some(ty) => ty.name() == Some(fragment.type_condition.as_str()),
                None => true,
            };
            if matches {
                Ok(&fragment.selection_set)
            } else {
                Err(CacheError::SelectorMismatch {
                    fragment: fragment.type_condition.clone(),
                    schema: ty.and_then(SchemaType::name).unwrap_or_default().to_owned(),
                })
            }
        }
        None => {
            static EMPTY: SelectionSet = SelectionSet { selections: Vec::new() };
            Ok(&EMPTY)
        }
    }
}

/// Flatten a selection set into the ordered list of fields that apply
/// to an object of the given type. Fragments are expanded in place, a
/// star or an absent selection expands to every field present in the
/// data plus every declared field, and a later selection of an
/// already-collected name replaces it while keeping its position.
pub(crate) fn selection_fields(
    document: Option<&Document>,
    selection_set: Option<&SelectionSet>,
    type_name: Option<&str>,
    object_type: Option<&ObjectType>,
    data: Option<&ObjectValue>,
) -> CacheResult<Vec<Field>> {
    let mut fields = FieldCollector::default();
    match selection_set {
        Some(selection_set) => {
            collect(document, selection_set, type_name, object_type, data, &mut fields)?;
        }
        None => fields.add_all(object_type, data),
    }
    Ok(fields.into_fields())
}

fn collect(
    document: Option<&Document>,
    selection_set: &SelectionSet,
    type_name: Option<&str>,
    object_type: Option<&ObjectType>,
    data: Option<&ObjectValue>,
    fields: &mut FieldCollector,
) -> CacheResult<()> {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => fields.add(field.clone()),
            Selection::Star => fields.add_all(object_type, data),
            Selection::InlineFragment(fragment) => {
                let included = match &fragment.type_condition {
                    Some(condition) => type_name == Some(condition.as_str()),
                    None => true,
                };
                if included {
                    collect(document, &fragment.selection_set, type_name, object_type, data, fields)?;
                }
            }
            Selection::FragmentSpread(spread) => {
                let fragment = document
                    .and_then(|document| document.fragment(&spread.name))
                    .ok_or_else(|| CacheError::FragmentNotFound { name: spread.name.clone() })?;
                if type_name == Some(fragment.type_condition.as_str()) {
                    collect(document, &fragment.selection_set, type_name, object_type, data, fields)?;
                }
            }
        }
    }
    Ok(())
}

#[derive(Default)]
struct FieldCollector {
    order: Vec<Field>,
    index: HashMap<String, usize>,
}

impl FieldCollector {
    fn add(&mut self, field: Field) {
        match self.index.get(&field.name) {
            Some(&position) => self.order[position] = field,
            None => {
                self.index.insert(field.name.clone(), self.order.len());
                self.order.push(field);
            }
        }
    }

    fn add_all(&mut self, object_type: Option<&ObjectType>, data: Option<&ObjectValue>) {
        if let Some(data) = data {
            for name in data.fields.keys() {
                self.add_if_absent(name);
            }
        }
        if let Some(object_type) = object_type {
            for name in object_type.fields.keys() {
                self.add_if_absent(name);
            }
        }
    }

    fn add_if_absent(&mut self, name: &str) {
        if !self.index.contains_key(name) {
            self.add(Field::leaf(name));
        }
    }

    fn into_fields(self) -> Vec<Field> {
        self.order
    }
}
