//! Entity identification: mapping typed data to stable entity ids.

use crate::entity::EntityId;
use crate::error::CacheResult;
use crate::schema::{resolve_named_type, unwrap_type, TypeRef, TypeRegistry};
use crate::value::{stable_hash, Value};

/// Build an entity id from a type name and an optional identity value.
/// Without an identity the type names a singleton entity.
#[must_use]
pub fn entity_id(type_name: &str, id: Option<&Value>) -> EntityId {
    match id {
        Some(id) => EntityId::from(format!("{type_name}:{}", stable_hash(id))),
        None => EntityId::from(type_name),
    }
}

/// Identify an entity from an explicit identity value.
pub fn identify_by_id(
    ty: &TypeRef,
    id: &Value,
    registry: &TypeRegistry,
) -> CacheResult<Option<EntityId>> {
    let Some(named) = resolve_named_type(ty, registry)? else {
        return Ok(None);
    };
    let Some(name) = named.name() else {
        return Ok(None);
    };
    Ok(Some(entity_id(name, Some(id))))
}

/// Identify an entity from incoming data, unwrapping non-nullables and
/// unions until a named type that can extract an identity is found.
/// Data that no reachable type identifies is not an entity.
pub fn identify_by_data(
    ty: &TypeRef,
    data: &Value,
    registry: &TypeRegistry,
) -> CacheResult<Option<EntityId>> {
    let resolved = registry.resolve(ty)?;
    if let Some(name) = resolved.name() {
        if let Some(id) = resolved.id_of(data) {
            return Ok(Some(entity_id(name, Some(&id))));
        }
    }
    match unwrap_type(ty, Some(data), registry)? {
        Some(inner) => identify_by_data(&inner, data, registry),
        None => Ok(None),
    }
}

/// Identify the singleton entity of a named type.
pub fn identify_by_type(ty: &TypeRef, registry: &TypeRegistry) -> CacheResult<Option<EntityId>> {
    let Some(named) = resolve_named_type(ty, registry)? else {
        return Ok(None);
    };
    Ok(named.name().map(|name| entity_id(name, None)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{self, TypeRef};
    use serde_json::json;

    #[test]
    fn identifies_by_explicit_id() {
        let ty = schema::object("Parent").build();
        let registry = TypeRegistry::new(&[ty.clone()]);
        let id = identify_by_id(&TypeRef::from(&ty), &Value::from(1), &registry).unwrap();
        assert_eq!(id.unwrap().as_str(), "Parent:1");
    }

    #[test]
    fn identifies_by_data_through_default_id() {
        let ty = schema::object("Parent").build();
        let registry = TypeRegistry::new(&[ty.clone()]);
        let data = Value::from(json!({ "id": "a", "name": "x" }));
        let id = identify_by_data(&TypeRef::from(&ty), &data, &registry).unwrap();
        assert_eq!(id.unwrap().as_str(), "Parent:a");
    }

    #[test]
    fn data_without_identity_is_not_an_entity() {
        let ty = schema::object("Parent").build();
        let registry = TypeRegistry::new(&[ty.clone()]);
        let data = Value::from(json!({ "name": "x" }));
        let id = identify_by_data(&TypeRef::from(&ty), &data, &registry).unwrap();
        assert!(id.is_none());
    }

    #[test]
    fn composite_ids_hash_deterministically() {
        let ty = schema::object("Row")
            .id(|value| {
                match (value.field("x"), value.field("y")) {
                    (Some(x), Some(y)) => {
                        Some(Value::array(vec![x.clone(), y.clone()]))
                    }
                    _ => None,
                }
            })
            .build();
        let registry = TypeRegistry::new(&[ty.clone()]);
        let data = Value::from(json!({ "x": 1, "y": 2 }));
        let id = identify_by_data(&TypeRef::from(&ty), &data, &registry).unwrap();
        assert_eq!(id.unwrap().as_str(), "Row:[1,2]");
    }

    #[test]
    fn singleton_types_identify_by_name() {
        let ty = schema::object("Query").build();
        let registry = TypeRegistry::new(&[ty.clone()]);
        let id = identify_by_type(&TypeRef::from(&ty), &registry).unwrap();
        assert_eq!(id.unwrap().as_str(), "Query");
    }
}
