//! The write traversal: normalizes incoming data into entities,
//! stamps per-field metadata, and derives the write-shape selector.

use std::collections::HashMap;
use std::rc::Rc;

use tessera_language::{
    Definition, Document, Field, InlineFragment, Selection, SelectionSet, Selector,
};

use crate::entity::{Entity, EntityId};
use crate::error::{CacheError, CacheResult};
use crate::identify::identify_by_data;
use crate::schema::{is_valid, resolve_wrapped_type, ObjectType, SchemaType, TypeRef, TypeRegistry};
use crate::store::EntityStore;
use crate::types::{InvalidField, PathSegment, NO_EXPIRY};
use crate::value::{ObjectValue, Value};

/// The outcome of a write traversal, before the drafts are committed
/// to the live store.
#[derive(Debug)]
pub(crate) struct WriteOutcome {
    /// The normalized entities, in the order the traversal first
    /// touched them.
    pub drafts: Vec<Entity>,
    /// Values that failed validation against their declared type.
    pub invalid_fields: Vec<InvalidField>,
    /// A selector describing exactly the written fields, usable to
    /// read back precisely what this write stored.
    pub selector: Option<Selector>,
}

pub(crate) fn execute_write(
    store: &EntityStore,
    registry: &TypeRegistry,
    root_type: Option<&TypeRef>,
    root_id: &EntityId,
    data: &Value,
    expires_at: i64,
    optimistic: bool,
    only_known_fields: bool,
) -> CacheResult<WriteOutcome> {
    let mut ctx = WriteCtx {
        store,
        registry,
        expires_at,
        optimistic,
        only_known_fields,
        entities: HashMap::new(),
        order: Vec::new(),
        invalid_fields: Vec::new(),
        ancestors: Vec::new(),
        path: Vec::new(),
    };
    let mut root_set = SelectionSet::default();
    ctx.traverse_value(data, &Value::Absent, root_type, &mut root_set, Some(root_id))?;

    let selector = if root_set.is_empty() {
        None
    } else {
        Some(Selector::from_document(Document {
            definitions: vec![Definition::Selection(root_set)],
        }))
    };

    let mut drafts = Vec::with_capacity(ctx.order.len());
    for id in &ctx.order {
        if let Some(draft) = ctx.entities.remove(id) {
            drafts.push(Entity {
                id: id.clone(),
                value: draft.value,
                expires_at: draft.expires_at,
                invalidated: draft.invalidated,
            });
        }
    }
    Ok(WriteOutcome {
        drafts,
        invalid_fields: ctx.invalid_fields,
        selector,
    })
}

struct EntityDraft {
    expires_at: i64,
    invalidated: bool,
    value: Value,
}

struct WriteCtx<'a> {
    store: &'a EntityStore,
    registry: &'a TypeRegistry,
    expires_at: i64,
    optimistic: bool,
    only_known_fields: bool,
    entities: HashMap<EntityId, EntityDraft>,
    order: Vec<EntityId>,
    invalid_fields: Vec<InvalidField>,
    // Pointers of incoming composite values currently being descended,
    // for cycle detection in the input data.
    ancestors: Vec<*const ()>,
    path: Vec<PathSegment>,
}

fn composite_ptr(value: &Value) -> Option<*const ()> {
    match value {
        Value::Object(object) => Some(Rc::as_ptr(object).cast()),
        Value::Array(items) => Some(Rc::as_ptr(items).cast()),
        _ => None,
    }
}

impl WriteCtx<'_> {
    fn touch_entity(&mut self, id: &EntityId, incoming_is_object: bool) {
        if !self.entities.contains_key(id) {
            let draft = match self.store.get(id, self.optimistic) {
                Some(existing) => EntityDraft {
                    expires_at: existing.expires_at,
                    invalidated: existing.invalidated,
                    value: existing.value.clone(),
                },
                None => EntityDraft {
                    expires_at: NO_EXPIRY,
                    invalidated: false,
                    value: Value::Absent,
                },
            };
            self.order.push(id.clone());
            self.entities.insert(id.clone(), draft);
        }
        if let Some(draft) = self.entities.get_mut(id) {
            draft.invalidated = false;
            // Object writes track expiration per field instead.
            if !incoming_is_object {
                draft.expires_at = self.expires_at;
            }
        }
    }

    fn draft_value(&self, id: &EntityId) -> Value {
        self.entities.get(id).map_or(Value::Absent, |draft| draft.value.clone())
    }

    fn set_draft_value(&mut self, id: &EntityId, value: Value) {
        if let Some(draft) = self.entities.get_mut(id) {
            draft.value = value;
        }
    }

    fn traverse_value(
        &mut self,
        incoming: &Value,
        existing: &Value,
        ty: Option<&TypeRef>,
        selection: &mut SelectionSet,
        entity_hint: Option<&EntityId>,
    ) -> CacheResult<Value> {
        let resolved = match ty {
            Some(ty) => {
                if !is_valid(Some(ty), incoming, self.registry)? {
                    self.invalid_fields.push(InvalidField {
                        path: self.path.clone(),
                        value: incoming.clone(),
                    });
                }
                Some(resolve_wrapped_type(ty.clone(), incoming, self.registry)?)
            }
            None => None,
        };

        // Named object types contribute an inline fragment so the
        // write-shape selector records which concrete type each level
        // was written as.
        if matches!(incoming, Value::Object(_)) {
            if let Some(name) = resolved.as_deref().and_then(SchemaType::name) {
                if resolved.as_deref().and_then(SchemaType::as_object).is_some() {
                    let mut fragment_set = SelectionSet::default();
                    let result = self.process_value(
                        incoming,
                        existing,
                        ty,
                        resolved.as_ref(),
                        &mut fragment_set,
                        entity_hint,
                    )?;
                    if !fragment_set.is_empty() {
                        selection.selections.push(Selection::InlineFragment(InlineFragment {
                            type_condition: Some(name.to_owned()),
                            selection_set: fragment_set,
                        }));
                    }
                    return Ok(result);
                }
            }
        }
        self.process_value(incoming, existing, ty, resolved.as_ref(), selection, entity_hint)
    }

    fn process_value(
        &mut self,
        incoming: &Value,
        existing: &Value,
        ty: Option<&TypeRef>,
        resolved: Option<&Rc<SchemaType>>,
        selection: &mut SelectionSet,
        entity_hint: Option<&EntityId>,
    ) -> CacheResult<Value> {
        match incoming {
            Value::Object(object) => {
                let entity_id = match entity_hint {
                    Some(id) => Some(id.clone()),
                    None => match ty {
                        Some(ty) => identify_by_data(ty, incoming, self.registry)?,
                        None => None,
                    },
                };
                if let Some(ptr) = composite_ptr(incoming) {
                    if self.ancestors.contains(&ptr) {
                        // The same object is its own ancestor: legal
                        // for entities, fatal for plain data.
                        return match entity_id {
                            Some(id) => Ok(Value::Ref(id)),
                            None => Err(CacheError::CircularData),
                        };
                    }
                    self.ancestors.push(ptr);
                }
                let result = self.process_object(
                    object,
                    existing,
                    resolved.map(Rc::as_ref).and_then(SchemaType::as_object),
                    entity_id,
                    selection,
                );
                self.ancestors.pop();
                result
            }
            Value::Array(items) => {
                if let Some(ptr) = composite_ptr(incoming) {
                    if self.ancestors.contains(&ptr) {
                        return Err(CacheError::CircularData);
                    }
                    self.ancestors.push(ptr);
                }
                let result = self.process_array(items, existing, resolved, selection);
                self.ancestors.pop();
                result
            }
            _ => {
                if let Some(id) = entity_hint {
                    self.touch_entity(id, false);
                    self.set_draft_value(id, incoming.clone());
                    return Ok(Value::Ref(id.clone()));
                }
                Ok(incoming.clone())
            }
        }
    }

    fn process_object(
        &mut self,
        incoming: &ObjectValue,
        existing: &Value,
        object_type: Option<&ObjectType>,
        entity_id: Option<EntityId>,
        selection: &mut SelectionSet,
    ) -> CacheResult<Value> {
        if let Some(id) = &entity_id {
            self.touch_entity(id, true);
        }
        let mut result = ObjectValue::with_meta();
        for (name, field_incoming) in &incoming.fields {
            if self.only_known_fields
                && object_type.is_some_and(|object_type| {
                    !object_type.fields.is_empty() && object_type.field(name).is_none()
                })
            {
                continue;
            }
            // Re-fetch each round: an entity can be nested inside
            // itself and change under the traversal.
            let current_existing = match &entity_id {
                Some(id) => self.draft_value(id),
                None => existing.clone(),
            };
            let existing_field =
                current_existing.field(name).cloned().unwrap_or(Value::Absent);
            let field_def = object_type.and_then(|object_type| object_type.field(name));
            if let Some(meta) = result.meta.as_mut() {
                meta.stamp(name, self.expires_at);
            }
            let mut field_set = SelectionSet::default();
            self.path.push(PathSegment::Field(name.clone()));
            let traversed = self.traverse_value(
                field_incoming,
                &existing_field,
                field_def.and_then(|def| def.ty.as_ref()),
                &mut field_set,
                None,
            );
            self.path.pop();
            let mut new_value = traversed?;
            if let Some(write) = field_def.and_then(|def| def.write.clone()) {
                new_value = write(new_value, &existing_field);
            }
            result.fields.insert(name.clone(), new_value);
            selection.selections.push(Selection::Field(Field {
                alias: None,
                name: name.clone(),
                selection_set: if field_set.is_empty() { None } else { Some(field_set) },
            }));
        }
        let Some(id) = entity_id else {
            return Ok(Value::object(result));
        };
        let current_existing = self.draft_value(&id);
        let merged = match object_type.and_then(|object_type| object_type.write.clone()) {
            Some(write) => write(&result, &current_existing),
            None => match current_existing.as_object() {
                Some(existing_object) => Value::object(result.merged_over(existing_object)),
                None => Value::object(result),
            },
        };
        self.set_draft_value(&id, merged);
        Ok(Value::Ref(id))
    }

    // Arrays are replaced wholesale unless the array type supplies a
    // write hook; the element selection sets merge into one set
    // describing every element shape written.
    fn process_array(
        &mut self,
        items: &[Value],
        existing: &Value,
        resolved: Option<&Rc<SchemaType>>,
        selection: &mut SelectionSet,
    ) -> CacheResult<Value> {
        let array_type = resolved.and_then(|ty| match &**ty {
            SchemaType::Array(array) => Some(array),
            _ => None,
        });
        let element_type = array_type.and_then(|array| array.of_type.as_deref());
        let existing_items = existing.as_array().unwrap_or(&[]);
        let mut result = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let existing_item = existing_items.get(index).cloned().unwrap_or(Value::Absent);
            let mut element_set = SelectionSet::default();
            self.path.push(PathSegment::Index(index));
            let element =
                self.traverse_value(item, &existing_item, element_type, &mut element_set, None);
            self.path.pop();
            result.push(element?);
            extend_selection_set(selection, &element_set);
        }
        let assembled = Value::array(result);
        Ok(match array_type.and_then(|array| array.write.clone()) {
            Some(write) => write(assembled, existing),
            None => assembled,
        })
    }
}

/// Merge `addition` into `target`: fields match by name, inline
/// fragments by type condition, and matched pairs merge recursively.
fn extend_selection_set(target: &mut SelectionSet, addition: &SelectionSet) {
    for selection in &addition.selections {
        match selection {
            Selection::Field(field) => {
                let found = target.selections.iter_mut().find_map(|existing| {
                    match existing {
                        Selection::Field(existing) if existing.name == field.name => {
                            Some(existing)
                        }
                        _ => None,
                    }
                });
                match found {
                    Some(existing) => match (&mut existing.selection_set, &field.selection_set) {
                        (Some(existing_set), Some(addition_set)) => {
                            extend_selection_set(existing_set, addition_set);
                        }
                        (None, Some(addition_set)) => {
                            existing.selection_set = Some(addition_set.clone());
                        }
                        _ => {}
                    },
                    None => target.selections.push(Selection::Field(field.clone())),
                }
            }
            Selection::InlineFragment(fragment) => {
                let found = target.selections.iter_mut().find_map(|existing| {
                    match existing {
                        Selection::InlineFragment(existing)
                            if existing.type_condition == fragment.type_condition =>
                        {
                            Some(existing)
                        }
                        _ => None,
                    }
                });
                match found {
                    Some(existing) => {
                        extend_selection_set(&mut existing.selection_set, &fragment.selection_set);
                    }
                    None => {
                        target.selections.push(Selection::InlineFragment(fragment.clone()));
                    }
                }
            }
            other => {
                if !target.selections.contains(other) {
                    target.selections.push(other.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extends_selection_sets_by_name_and_condition() {
        let a = Selector::parse("{ x { a } ... on T { y } }").unwrap();
        let b = Selector::parse("{ x { b } z ... on T { w } }").unwrap();
        let mut target = a.root().clone();
        extend_selection_set(&mut target, b.root());
        let rendered = format!("{target}");
        assert_eq!(rendered, "{ x { a b } ... on T { y w } z }");
    }
}
