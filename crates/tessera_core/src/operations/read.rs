//! The read traversal: denormalizes stored entities back into plain
//! data along a selector, collecting staleness and missing fields.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use tessera_language::{Document, SelectionSet};

use crate::entity::EntityId;
use crate::error::CacheResult;
use crate::schema::{
    is_valid, resolve_named_type, resolve_wrapped_type, FieldReadContext, SchemaType, TypeRef,
    TypeRegistry,
};
use crate::store::EntityStore;
use crate::types::{InvalidField, MissingField, PathSegment, NO_EXPIRY};
use crate::value::{ObjectValue, Value};

/// The raw outcome of a read traversal, before result caching and
/// staleness evaluation at the cache layer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReadOutcome {
    /// The assembled data, `None` when the root entity is missing.
    pub data: Option<Value>,
    /// Selected fields with no stored value.
    pub missing_fields: Vec<MissingField>,
    /// Stored values that fail their declared type.
    pub invalid_fields: Vec<InvalidField>,
    /// The earliest field expiration seen, [`NO_EXPIRY`] if none.
    pub expires_at: i64,
    /// Whether any visited entity or field was invalidated.
    pub invalidated: bool,
}

impl ReadOutcome {
    /// Whether the result is stale at the given time.
    pub fn is_stale(&self, now: i64) -> bool {
        self.invalidated || (self.expires_at != NO_EXPIRY && self.expires_at <= now)
    }
}

pub(crate) fn execute_read(
    store: &EntityStore,
    registry: &TypeRegistry,
    document: Option<&Document>,
    root_id: &EntityId,
    root_type: Option<&TypeRef>,
    optimistic: bool,
    only_known_fields: bool,
) -> CacheResult<ReadOutcome> {
    let mut ctx = ReadCtx {
        store,
        registry,
        document,
        optimistic,
        only_known_fields,
        full_entity_results: HashMap::new(),
        in_progress: HashSet::new(),
        missing_fields: Vec::new(),
        invalid_fields: Vec::new(),
        expires_at: NO_EXPIRY,
        invalidated: false,
        path: Vec::new(),
    };
    let data = if store.contains(root_id, optimistic) {
        let named = match root_type {
            Some(ty) => resolve_named_type(ty, registry)?,
            None => None,
        };
        let selection_set = match document {
            Some(document) => {
                Some(super::shared::resolve_selection_set(document, named.as_deref())?)
            }
            None => None,
        };
        Some(ctx.traverse_entity(root_id, selection_set, root_type)?)
    } else {
        None
    };
    Ok(ReadOutcome {
        data,
        missing_fields: ctx.missing_fields,
        invalid_fields: ctx.invalid_fields,
        expires_at: ctx.expires_at,
        invalidated: ctx.invalidated,
    })
}

struct ReadCtx<'a> {
    store: &'a EntityStore,
    registry: &'a TypeRegistry,
    document: Option<&'a Document>,
    optimistic: bool,
    only_known_fields: bool,
    // Full-entity traversals are shared between the places an entity
    // appears, which also keeps cyclic entity graphs bounded.
    full_entity_results: HashMap<EntityId, Value>,
    in_progress: HashSet<EntityId>,
    missing_fields: Vec<MissingField>,
    invalid_fields: Vec<InvalidField>,
    expires_at: i64,
    invalidated: bool,
    path: Vec<PathSegment>,
}

impl ReadCtx<'_> {
    fn note_expires_at(&mut self, expires_at: i64) {
        if expires_at != NO_EXPIRY && (self.expires_at == NO_EXPIRY || expires_at < self.expires_at)
        {
            self.expires_at = expires_at;
        }
    }

    fn add_missing(&mut self) {
        self.missing_fields.push(MissingField { path: self.path.clone() });
    }

    fn traverse_entity(
        &mut self,
        id: &EntityId,
        selection_set: Option<&SelectionSet>,
        ty: Option<&TypeRef>,
    ) -> CacheResult<Value> {
        let Some(entity) = self.store.get(id, self.optimistic) else {
            self.add_missing();
            return Ok(Value::Absent);
        };
        if selection_set.is_none() {
            if let Some(result) = self.full_entity_results.get(id) {
                return Ok(result.clone());
            }
        }
        self.note_expires_at(entity.expires_at);
        if entity.invalidated {
            self.invalidated = true;
        }
        if !self.in_progress.insert(id.clone()) {
            // Entity cycle: reference the entity instead of recursing.
            return Ok(Value::Ref(id.clone()));
        }
        let result = self.traverse_value(&entity.value, selection_set, ty);
        self.in_progress.remove(id);
        let result = result?;
        if selection_set.is_none() {
            self.full_entity_results.insert(id.clone(), result.clone());
        }
        Ok(result)
    }

    fn traverse_value(
        &mut self,
        value: &Value,
        selection_set: Option<&SelectionSet>,
        ty: Option<&TypeRef>,
    ) -> CacheResult<Value> {
        // References dereference before validation; the target
        // entity's value is what gets checked against the type.
        if let Value::Ref(id) = value {
            return self.traverse_entity(id, selection_set, ty);
        }
        let resolved = self.check_validity(value, ty)?;
        if let Value::Array(items) = value {
            let element_type = resolved.as_deref().and_then(|ty| match ty {
                SchemaType::Array(array) => array.of_type.as_deref(),
                _ => None,
            });
            let mut result = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                self.path.push(PathSegment::Index(index));
                let element = self.traverse_value(item, selection_set, element_type);
                self.path.pop();
                result.push(element?);
            }
            return Ok(Value::array(result));
        }
        if let Value::Object(object) = value {
            // Plain objects (stored raw, without field meta) still
            // honor an explicit selection.
            if object.meta.is_some() || selection_set.is_some() {
                return self.traverse_object(object, selection_set, resolved);
            }
        }
        Ok(value.clone())
    }

    // Invalid values are collected but traversal continues, so a read
    // still assembles everything it can around the bad value.
    fn check_validity(
        &mut self,
        value: &Value,
        ty: Option<&TypeRef>,
    ) -> CacheResult<Option<Rc<SchemaType>>> {
        let Some(ty) = ty else { return Ok(None) };
        if is_valid(Some(ty), value, self.registry)? {
            Ok(Some(resolve_wrapped_type(ty.clone(), value, self.registry)?))
        } else {
            self.invalid_fields.push(InvalidField {
                path: self.path.clone(),
                value: value.clone(),
            });
            Ok(None)
        }
    }

    fn traverse_object(
        &mut self,
        object: &Rc<ObjectValue>,
        selection_set: Option<&SelectionSet>,
        resolved: Option<Rc<SchemaType>>,
    ) -> CacheResult<Value> {
        let object_type = resolved.as_deref().and_then(SchemaType::as_object);
        let type_name = resolved.as_deref().and_then(SchemaType::name);
        let fields = super::shared::selection_fields(
            self.document,
            selection_set,
            type_name,
            object_type,
            Some(object),
        )?;
        let mut result = BTreeMap::new();
        for field in &fields {
            let field_def = object_type.and_then(|object_type| object_type.field(&field.name));
            if self.only_known_fields
                && field_def.is_none()
                && object_type.is_some_and(|object_type| !object_type.fields.is_empty())
            {
                continue;
            }
            let (found, field_value) = match field_def.and_then(|def| def.read.clone()) {
                Some(read) => {
                    let registry = self.registry;
                    let to_ref = |type_name: &str, id: &Value| {
                        registry
                            .get(type_name)
                            .and_then(|ty| ty.name())
                            .map(|name| Value::Ref(crate::identify::entity_id(name, Some(id))))
                    };
                    let ctx = FieldReadContext::new(&to_ref);
                    (true, read(object, &ctx))
                }
                None => match object.fields.get(&field.name) {
                    Some(value) => (true, value.clone()),
                    None => (false, Value::Absent),
                },
            };
            if !found {
                self.path.push(PathSegment::Field(field.name.clone()));
                self.add_missing();
                self.path.pop();
                result.insert(field.output_name().to_owned(), Value::Absent);
                continue;
            }
            if let Some(meta) = &object.meta {
                self.note_expires_at(meta.expires_at(&field.name));
                if meta.is_invalidated(&field.name) {
                    self.invalidated = true;
                }
            }
            self.path.push(PathSegment::Field(field.name.clone()));
            let traversed = self.traverse_value(
                &field_value,
                field.selection_set.as_ref(),
                field_def.and_then(|def| def.ty.as_ref()),
            );
            self.path.pop();
            result.insert(field.output_name().to_owned(), traversed?);
        }
        Ok(Value::object(ObjectValue::plain(result)))
    }
}
