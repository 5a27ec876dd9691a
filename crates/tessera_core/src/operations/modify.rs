//! The selector-guided modification walk shared by delete and
//! invalidate: both visit the same nodes and differ only in the
//! terminal action applied at leaf selections.

use std::collections::HashMap;
use std::rc::Rc;

use tessera_language::{Document, SelectionSet};

use crate::entity::{Entity, EntityId};
use crate::error::CacheResult;
use crate::schema::{resolve_named_type, resolve_wrapped_type, SchemaType, TypeRef, TypeRegistry};
use crate::store::EntityStore;
use crate::value::{ObjectValue, Value};

/// What to do when the walk bottoms out at a leaf selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModifyMode {
    /// Remove the field, or the whole entity when unselected.
    Delete,
    /// Flag the field, or the whole entity, as invalidated.
    Invalidate,
}

/// The outcome of a delete or invalidate traversal, before the edits
/// are committed to the live store. A `None` entity removes the id.
#[derive(Debug)]
pub(crate) struct ModifyOutcome {
    /// Edited entities in visit order.
    pub edits: Vec<(EntityId, Option<Entity>)>,
}

pub(crate) fn execute_modify(
    store: &EntityStore,
    registry: &TypeRegistry,
    document: Option<&Document>,
    root_id: &EntityId,
    root_type: Option<&TypeRef>,
    optimistic: bool,
    mode: ModifyMode,
) -> CacheResult<Option<ModifyOutcome>> {
    if !store.contains(root_id, optimistic) {
        return Ok(None);
    }
    let mut ctx = ModifyCtx {
        store,
        registry,
        document,
        optimistic,
        mode,
        edits: HashMap::new(),
        order: Vec::new(),
    };
    ctx.visit_entity(root_id, root_type, None)?;

    let mut edits = Vec::with_capacity(ctx.order.len());
    for id in &ctx.order {
        let Some(edit) = ctx.edits.remove(id) else { continue };
        if edit.removed {
            edits.push((id.clone(), None));
        } else {
            edits.push((
                id.clone(),
                Some(Entity {
                    id: id.clone(),
                    value: edit.value,
                    expires_at: edit.expires_at,
                    invalidated: edit.invalidated,
                }),
            ));
        }
    }
    Ok(Some(ModifyOutcome { edits }))
}

struct EntityEdit {
    removed: bool,
    invalidated: bool,
    expires_at: i64,
    value: Value,
}

struct ModifyCtx<'a> {
    store: &'a EntityStore,
    registry: &'a TypeRegistry,
    document: Option<&'a Document>,
    optimistic: bool,
    mode: ModifyMode,
    edits: HashMap<EntityId, EntityEdit>,
    order: Vec<EntityId>,
}

impl ModifyCtx<'_> {
    fn visit_entity(
        &mut self,
        id: &EntityId,
        ty: Option<&TypeRef>,
        selection_override: Option<&SelectionSet>,
    ) -> CacheResult<()> {
        if !self.edits.contains_key(id) {
            let Some(entity) = self.store.get(id, self.optimistic) else {
                return Ok(());
            };
            self.order.push(id.clone());
            self.edits.insert(
                id.clone(),
                EntityEdit {
                    removed: false,
                    invalidated: entity.invalidated,
                    expires_at: entity.expires_at,
                    value: entity.value.clone(),
                },
            );
        }

        let selection_set = match selection_override {
            Some(selection_set) => Some(selection_set),
            None => match self.document {
                Some(document) => {
                    let named = match ty {
                        Some(ty) => resolve_named_type(ty, self.registry)?,
                        None => None,
                    };
                    Some(super::shared::resolve_selection_set(document, named.as_deref())?)
                }
                None => None,
            },
        };

        match selection_set {
            None => {
                // The whole entity is addressed.
                if let Some(edit) = self.edits.get_mut(id) {
                    match self.mode {
                        ModifyMode::Delete => edit.removed = true,
                        ModifyMode::Invalidate => edit.invalidated = true,
                    }
                }
                Ok(())
            }
            Some(selection_set) => {
                let value = self.edits.get(id).map_or(Value::Absent, |edit| edit.value.clone());
                let selection_set = selection_set.clone();
                let edited = self.edit_value(&value, Some(&selection_set), ty)?;
                if let Some(edit) = self.edits.get_mut(id) {
                    edit.value = edited;
                }
                Ok(())
            }
        }
    }

    fn edit_value(
        &mut self,
        value: &Value,
        selection_set: Option<&SelectionSet>,
        ty: Option<&TypeRef>,
    ) -> CacheResult<Value> {
        let resolved = match ty {
            Some(ty) => Some(resolve_wrapped_type(ty.clone(), value, self.registry)?),
            None => None,
        };
        match value {
            Value::Ref(id) => {
                // References are only followed with type information
                // to traverse the target entity under.
                if ty.is_some() {
                    let id = id.clone();
                    self.visit_entity(&id, ty, selection_set)?;
                }
                Ok(value.clone())
            }
            Value::Object(object) if object.meta.is_some() => {
                self.edit_object(object, selection_set, resolved.as_ref())
            }
            Value::Array(items) => {
                let element_type = resolved.as_deref().and_then(|ty| match ty {
                    SchemaType::Array(array) => array.of_type.as_deref(),
                    _ => None,
                });
                let mut result = Vec::with_capacity(items.len());
                for item in items.iter() {
                    result.push(self.edit_value(item, selection_set, element_type)?);
                }
                Ok(Value::array(result))
            }
            _ => Ok(value.clone()),
        }
    }

    fn edit_object(
        &mut self,
        object: &Rc<ObjectValue>,
        selection_set: Option<&SelectionSet>,
        resolved: Option<&Rc<SchemaType>>,
    ) -> CacheResult<Value> {
        let object_type = resolved.map(Rc::as_ref).and_then(SchemaType::as_object);
        let type_name = resolved.map(Rc::as_ref).and_then(SchemaType::name);
        let fields = super::shared::selection_fields(
            self.document,
            selection_set,
            type_name,
            object_type,
            Some(object),
        )?;
        let mut edited = (**object).clone();
        for field in &fields {
            if !edited.fields.contains_key(&field.name) {
                continue;
            }
            let field_def = object_type.and_then(|object_type| object_type.field(&field.name));
            match &field.selection_set {
                None => {
                    match self.mode {
                        ModifyMode::Delete => {
                            edited.fields.remove(&field.name);
                            if let Some(meta) = edited.meta.as_mut() {
                                meta.remove(&field.name);
                            }
                        }
                        ModifyMode::Invalidate => {
                            if let Some(meta) = edited.meta.as_mut() {
                                meta.invalidated.insert(field.name.clone(), true);
                            }
                        }
                    }
                }
                Some(child_set) => {
                    let field_ty = field_def.and_then(|def| def.ty.as_ref());
                    let current = edited.fields.get(&field.name).cloned().unwrap_or(Value::Absent);
                    let replacement = self.edit_value(&current, Some(child_set), field_ty)?;
                    edited.fields.insert(field.name.clone(), replacement);
                }
            }
        }
        Ok(Value::object(edited))
    }
}
