//! Name-based type resolution.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{CacheError, CacheResult};

use super::{SchemaType, TypeRef};

/// The set of named types reachable from a configuration's roots.
/// Type references by name resolve through this registry, which is
/// what makes recursive type definitions possible.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Rc<SchemaType>>,
}

impl TypeRegistry {
    /// Collect every named type reachable from the given roots.
    #[must_use]
    pub fn new(roots: &[Rc<SchemaType>]) -> Self {
        let mut registry = Self::default();
        for root in roots {
            registry.collect(root);
        }
        registry
    }

    fn collect(&mut self, ty: &Rc<SchemaType>) {
        if let Some(name) = ty.name() {
            if self.types.contains_key(name) {
                return;
            }
            self.types.insert(name.to_owned(), Rc::clone(ty));
        }
        match &**ty {
            SchemaType::Object(object) => {
                for field in object.fields.values() {
                    if let Some(TypeRef::Inline(inner)) = &field.ty {
                        self.collect(inner);
                    }
                }
            }
            SchemaType::Array(array) => {
                if let Some(of_type) = &array.of_type {
                    if let TypeRef::Inline(inner) = &**of_type {
                        self.collect(inner);
                    }
                }
            }
            SchemaType::Union(union) => {
                for member in &union.types {
                    if let TypeRef::Inline(inner) = member {
                        self.collect(inner);
                    }
                }
            }
            SchemaType::NonNullable(inner) => {
                if let TypeRef::Inline(inner) = &**inner {
                    self.collect(inner);
                }
            }
            SchemaType::String(_)
            | SchemaType::Number(_)
            | SchemaType::Boolean(_)
            | SchemaType::Null(_) => {}
        }
    }

    /// Look up a named type.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rc<SchemaType>> {
        self.types.get(name)
    }

    /// Look up a named type, failing when it is not registered.
    pub fn require(&self, name: &str) -> CacheResult<Rc<SchemaType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::TypeNotFound { name: name.to_owned() })
    }

    /// Resolve a type reference to a type handle.
    pub fn resolve(&self, type_ref: &TypeRef) -> CacheResult<Rc<SchemaType>> {
        match type_ref {
            TypeRef::Inline(ty) => Ok(Rc::clone(ty)),
            TypeRef::Named(name) => self.require(name),
        }
    }
}
