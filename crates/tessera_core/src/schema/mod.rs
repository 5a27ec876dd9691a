//! Schema types: the optional type layer that drives normalization,
//! validation and read/write hooks.

mod registry;

pub use registry::TypeRegistry;

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::CacheResult;
use crate::value::{ObjectValue, Value};

/// Extracts an identity value from incoming data.
pub type IdFn = Rc<dyn Fn(&Value) -> Option<Value>>;

/// Custom membership test used by unions and abstract object types.
pub type IsOfTypeFn = Rc<dyn Fn(&Value) -> bool>;

/// Custom union discriminator; returns the member type for a value.
pub type ResolveTypeFn = Rc<dyn Fn(&Value) -> Option<TypeRef>>;

/// Field-level write hook: `(incoming, existing)` to the stored value.
pub type FieldWriteHook = Rc<dyn Fn(Value, &Value) -> Value>;

/// Object-level write hook: `(assembled, existing)` to the stored
/// entity value, replacing the default field merge.
pub type ObjectWriteHook = Rc<dyn Fn(&ObjectValue, &Value) -> Value>;

/// Array-level write hook: `(assembled, existing)` to the stored
/// array value, applied after the elements are processed.
pub type ArrayWriteHook = Rc<dyn Fn(Value, &Value) -> Value>;

/// Field-level read hook: derives a field value from the parent's
/// stored data instead of looking the field up.
pub type FieldReadHook = Rc<dyn Fn(&ObjectValue, &FieldReadContext<'_>) -> Value>;

/// Context passed to field read hooks.
pub struct FieldReadContext<'a> {
    to_ref: &'a dyn Fn(&str, &Value) -> Option<Value>,
}

impl<'a> FieldReadContext<'a> {
    pub(crate) fn new(to_ref: &'a dyn Fn(&str, &Value) -> Option<Value>) -> Self {
        Self { to_ref }
    }

    /// Build a reference to the entity of the named type with the
    /// given identity value, if that entity can be identified.
    #[must_use]
    pub fn to_reference(&self, type_name: &str, id: &Value) -> Option<Value> {
        (self.to_ref)(type_name, id)
    }
}

/// A reference to a schema type: either a direct handle or a name
/// resolved through the [`TypeRegistry`]. Named references allow
/// recursive and mutually-recursive type definitions.
#[derive(Clone)]
pub enum TypeRef {
    /// A direct handle to a type.
    Inline(Rc<SchemaType>),
    /// A by-name reference resolved at traversal time.
    Named(String),
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Inline(ty) => write!(f, "TypeRef::Inline({ty:?})"),
            TypeRef::Named(name) => write!(f, "TypeRef::Named({name:?})"),
        }
    }
}

impl From<Rc<SchemaType>> for TypeRef {
    fn from(ty: Rc<SchemaType>) -> Self {
        TypeRef::Inline(ty)
    }
}

impl From<&Rc<SchemaType>> for TypeRef {
    fn from(ty: &Rc<SchemaType>) -> Self {
        TypeRef::Inline(Rc::clone(ty))
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        TypeRef::Named(name.to_owned())
    }
}

impl From<String> for TypeRef {
    fn from(name: String) -> Self {
        TypeRef::Named(name)
    }
}

/// A field declaration on an object type.
#[derive(Clone, Default)]
pub struct FieldDef {
    /// The field's declared type, if any.
    pub ty: Option<TypeRef>,
    /// Whether selector fields with an argument suffix, written as
    /// `name({...})`, resolve to this field.
    pub arguments: bool,
    /// Read hook, consulted before the stored field value.
    pub read: Option<FieldReadHook>,
    /// Write hook, applied to the incoming value before storage.
    pub write: Option<FieldWriteHook>,
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("ty", &self.ty)
            .field("arguments", &self.arguments)
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .finish()
    }
}

impl FieldDef {
    /// A field with only a declared type.
    #[must_use]
    pub fn of(ty: impl Into<TypeRef>) -> Self {
        Self { ty: Some(ty.into()), ..Self::default() }
    }

    /// Enable argument-suffix matching for this field.
    #[must_use]
    pub fn with_arguments(mut self) -> Self {
        self.arguments = true;
        self
    }

    /// Attach a read hook.
    #[must_use]
    pub fn with_read(mut self, read: impl Fn(&ObjectValue, &FieldReadContext<'_>) -> Value + 'static) -> Self {
        self.read = Some(Rc::new(read));
        self
    }

    /// Attach a write hook.
    #[must_use]
    pub fn with_write(mut self, write: impl Fn(Value, &Value) -> Value + 'static) -> Self {
        self.write = Some(Rc::new(write));
        self
    }
}

/// An object type with named fields.
#[derive(Clone, Default)]
pub struct ObjectType {
    /// The type name; named object types are normalized into entities.
    pub name: Option<String>,
    /// Identity extraction, defaulting to the value's `id` field.
    pub id: Option<IdFn>,
    /// Custom membership test; the default accepts any object.
    pub is_of_type: Option<IsOfTypeFn>,
    /// Object-level write hook replacing the default field merge.
    pub write: Option<ObjectWriteHook>,
    /// Declared fields.
    pub fields: BTreeMap<String, FieldDef>,
}

impl ObjectType {
    /// Look up a field by a selector field name. An exact match wins;
    /// otherwise a `name({...})` suffix is stripped and matched
    /// against fields declared with argument support.
    #[must_use]
    pub fn field(&self, selector_name: &str) -> Option<&FieldDef> {
        if let Some(field) = self.fields.get(selector_name) {
            return Some(field);
        }
        let base = selector_name.split('(').next()?;
        if base == selector_name {
            return None;
        }
        self.fields.get(base).filter(|field| field.arguments)
    }

    fn extract_id(&self, value: &Value) -> Option<Value> {
        match &self.id {
            Some(id) => id(value),
            None => value.field("id").filter(|id| !id.is_absent()).cloned(),
        }
    }
}

/// An array type.
#[derive(Clone, Default)]
pub struct ArrayType {
    /// Optional type name.
    pub name: Option<String>,
    /// The element type, if declared.
    pub of_type: Option<Box<TypeRef>>,
    /// Write hook replacing the wholesale array replacement.
    pub write: Option<ArrayWriteHook>,
}

/// A union of member types discriminated by value.
#[derive(Clone)]
pub struct UnionType {
    /// Optional type name.
    pub name: Option<String>,
    /// The member types.
    pub types: Vec<TypeRef>,
    /// Custom discriminator, consulted before the member scan.
    pub resolve_type: Option<ResolveTypeFn>,
}

/// A scalar type, optionally constrained to one constant value.
#[derive(Clone, Default)]
pub struct ScalarType {
    /// Optional type name.
    pub name: Option<String>,
    /// When set, only this exact value is of the type.
    pub const_value: Option<Value>,
}

/// A schema type.
#[derive(Clone)]
pub enum SchemaType {
    /// An object with named fields.
    Object(ObjectType),
    /// An array.
    Array(ArrayType),
    /// A union of member types.
    Union(UnionType),
    /// A wrapper rejecting null and absent values.
    NonNullable(Box<TypeRef>),
    /// A string scalar.
    String(ScalarType),
    /// A numeric scalar.
    Number(ScalarType),
    /// A boolean scalar.
    Boolean(ScalarType),
    /// The null scalar, matching exactly `Value::Null`.
    Null(ScalarType),
}

impl fmt::Debug for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            SchemaType::Object(_) => "Object",
            SchemaType::Array(_) => "Array",
            SchemaType::Union(_) => "Union",
            SchemaType::NonNullable(_) => "NonNullable",
            SchemaType::String(_) => "String",
            SchemaType::Number(_) => "Number",
            SchemaType::Boolean(_) => "Boolean",
            SchemaType::Null(_) => "Null",
        };
        match self.name() {
            Some(name) => write!(f, "{kind}({name})"),
            None => write!(f, "{kind}"),
        }
    }
}

impl SchemaType {
    /// The type's name, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            SchemaType::Object(object) => object.name.as_deref(),
            SchemaType::Array(array) => array.name.as_deref(),
            SchemaType::Union(union) => union.name.as_deref(),
            SchemaType::NonNullable(_) => None,
            SchemaType::String(scalar)
            | SchemaType::Number(scalar)
            | SchemaType::Boolean(scalar)
            | SchemaType::Null(scalar) => scalar.name.as_deref(),
        }
    }

    /// The object payload, if this is an object type.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            SchemaType::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Extract an identity value from incoming data, if this type can
    /// identify values.
    #[must_use]
    pub fn id_of(&self, value: &Value) -> Option<Value> {
        match self {
            SchemaType::Object(object) => object.extract_id(value),
            _ => None,
        }
    }

    /// Whether a value belongs to this type.
    pub fn is_of_type(&self, value: &Value, registry: &TypeRegistry) -> CacheResult<bool> {
        Ok(match self {
            SchemaType::Object(object) => match &object.is_of_type {
                Some(test) => test(value),
                None => matches!(value, Value::Object(_) | Value::Ref(_)),
            },
            SchemaType::Array(_) => matches!(value, Value::Array(_)),
            SchemaType::Union(union) => {
                let mut found = false;
                for member in &union.types {
                    let member = registry.resolve(member)?;
                    if member.is_of_type(value, registry)? {
                        found = true;
                        break;
                    }
                }
                found
            }
            SchemaType::NonNullable(inner) => {
                !value.is_nullish() && registry.resolve(inner)?.is_of_type(value, registry)?
            }
            SchemaType::String(scalar) => match &scalar.const_value {
                Some(expected) => value == expected,
                None => matches!(value, Value::String(_)),
            },
            SchemaType::Number(scalar) => match &scalar.const_value {
                Some(expected) => value == expected,
                None => matches!(value, Value::Number(_)),
            },
            SchemaType::Boolean(scalar) => match &scalar.const_value {
                Some(expected) => value == expected,
                None => matches!(value, Value::Bool(_)),
            },
            SchemaType::Null(_) => matches!(value, Value::Null),
        })
    }
}

/// Whether a value is acceptable for an optional declared type.
/// Untyped slots accept everything, and null or absent values pass
/// unless the type is wrapped in a non-nullable.
pub fn is_valid(
    ty: Option<&TypeRef>,
    value: &Value,
    registry: &TypeRegistry,
) -> CacheResult<bool> {
    let Some(ty) = ty else { return Ok(true) };
    let resolved = registry.resolve(ty)?;
    if value.is_nullish() && !matches!(*resolved, SchemaType::NonNullable(_)) {
        return Ok(true);
    }
    resolved.is_of_type(value, registry)
}

/// Unwrap one wrapper layer: a non-nullable yields its inner type, a
/// union yields the member matching the value. Anything else is
/// already unwrapped.
pub fn unwrap_type(
    ty: &TypeRef,
    value: Option<&Value>,
    registry: &TypeRegistry,
) -> CacheResult<Option<TypeRef>> {
    let resolved = registry.resolve(ty)?;
    Ok(match &*resolved {
        SchemaType::NonNullable(inner) => Some((**inner).clone()),
        SchemaType::Union(union) => match value {
            Some(value) => resolve_union(union, value, registry)?,
            None => None,
        },
        _ => None,
    })
}

fn resolve_union(
    union: &UnionType,
    value: &Value,
    registry: &TypeRegistry,
) -> CacheResult<Option<TypeRef>> {
    if let Some(resolve) = &union.resolve_type {
        if let Some(member) = resolve(value) {
            return Ok(Some(member));
        }
    }
    for member in &union.types {
        if registry.resolve(member)?.is_of_type(value, registry)? {
            return Ok(Some(member.clone()));
        }
    }
    Ok(None)
}

/// Fully unwrap a type against a value, resolving through unions and
/// non-nullables to the concrete type the value belongs to.
pub fn resolve_wrapped_type(
    ty: TypeRef,
    value: &Value,
    registry: &TypeRegistry,
) -> CacheResult<Rc<SchemaType>> {
    let mut current = ty;
    loop {
        match unwrap_type(&current, Some(value), registry)? {
            Some(inner) => current = inner,
            None => return registry.resolve(&current),
        }
    }
}

/// Resolve to the nearest named type, unwrapping non-nullables.
/// Returns `None` when no named type is reachable without a value.
pub fn resolve_named_type(
    ty: &TypeRef,
    registry: &TypeRegistry,
) -> CacheResult<Option<Rc<SchemaType>>> {
    let resolved = registry.resolve(ty)?;
    if resolved.name().is_some() {
        return Ok(Some(resolved));
    }
    match unwrap_type(ty, None, registry)? {
        Some(inner) => resolve_named_type(&inner, registry),
        None => Ok(None),
    }
}

/// Builder for [`ObjectType`] values.
#[must_use]
pub struct ObjectTypeBuilder {
    inner: ObjectType,
}

/// Start building a named object type.
pub fn object(name: impl Into<String>) -> ObjectTypeBuilder {
    ObjectTypeBuilder { inner: ObjectType { name: Some(name.into()), ..ObjectType::default() } }
}

/// Start building an anonymous object type.
pub fn anonymous_object() -> ObjectTypeBuilder {
    ObjectTypeBuilder { inner: ObjectType::default() }
}

impl ObjectTypeBuilder {
    /// Declare a field with a type.
    pub fn field(mut self, name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        self.inner.fields.insert(name.into(), FieldDef::of(ty));
        self
    }

    /// Declare a field from a full definition.
    pub fn field_def(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.inner.fields.insert(name.into(), def);
        self
    }

    /// Replace the default identity extraction.
    pub fn id(mut self, id: impl Fn(&Value) -> Option<Value> + 'static) -> Self {
        self.inner.id = Some(Rc::new(id));
        self
    }

    /// Attach a custom membership test.
    pub fn is_of_type(mut self, test: impl Fn(&Value) -> bool + 'static) -> Self {
        self.inner.is_of_type = Some(Rc::new(test));
        self
    }

    /// Attach an object-level write hook.
    pub fn write(mut self, write: impl Fn(&ObjectValue, &Value) -> Value + 'static) -> Self {
        self.inner.write = Some(Rc::new(write));
        self
    }

    /// Finish building.
    pub fn build(self) -> Rc<SchemaType> {
        Rc::new(SchemaType::Object(self.inner))
    }
}

/// An array of the given element type.
#[must_use]
pub fn array_of(of_type: impl Into<TypeRef>) -> Rc<SchemaType> {
    Rc::new(SchemaType::Array(ArrayType {
        name: None,
        of_type: Some(Box::new(of_type.into())),
        write: None,
    }))
}

/// An array of the given element type with a write hook merging the
/// assembled elements into the existing stored value.
#[must_use]
pub fn array_of_with_write(
    of_type: impl Into<TypeRef>,
    write: impl Fn(Value, &Value) -> Value + 'static,
) -> Rc<SchemaType> {
    Rc::new(SchemaType::Array(ArrayType {
        name: None,
        of_type: Some(Box::new(of_type.into())),
        write: Some(Rc::new(write)),
    }))
}

/// An untyped array.
#[must_use]
pub fn array() -> Rc<SchemaType> {
    Rc::new(SchemaType::Array(ArrayType::default()))
}

/// A union of the given member types.
#[must_use]
pub fn union(types: impl IntoIterator<Item = TypeRef>) -> Rc<SchemaType> {
    Rc::new(SchemaType::Union(UnionType {
        name: None,
        types: types.into_iter().collect(),
        resolve_type: None,
    }))
}

/// A union with a custom discriminator.
#[must_use]
pub fn union_with(
    types: impl IntoIterator<Item = TypeRef>,
    resolve_type: impl Fn(&Value) -> Option<TypeRef> + 'static,
) -> Rc<SchemaType> {
    Rc::new(SchemaType::Union(UnionType {
        name: None,
        types: types.into_iter().collect(),
        resolve_type: Some(Rc::new(resolve_type)),
    }))
}

/// A wrapper rejecting null and absent values.
#[must_use]
pub fn non_nullable(of_type: impl Into<TypeRef>) -> Rc<SchemaType> {
    Rc::new(SchemaType::NonNullable(Box::new(of_type.into())))
}

/// The string scalar.
#[must_use]
pub fn string() -> Rc<SchemaType> {
    Rc::new(SchemaType::String(ScalarType::default()))
}

/// A string scalar accepting exactly one value.
#[must_use]
pub fn string_const(value: impl Into<Rc<str>>) -> Rc<SchemaType> {
    Rc::new(SchemaType::String(ScalarType {
        name: None,
        const_value: Some(Value::String(value.into())),
    }))
}

/// The number scalar.
#[must_use]
pub fn number() -> Rc<SchemaType> {
    Rc::new(SchemaType::Number(ScalarType::default()))
}

/// A number scalar accepting exactly one value.
#[must_use]
pub fn number_const(value: f64) -> Rc<SchemaType> {
    Rc::new(SchemaType::Number(ScalarType {
        name: None,
        const_value: Some(Value::Number(value)),
    }))
}

/// The boolean scalar.
#[must_use]
pub fn boolean() -> Rc<SchemaType> {
    Rc::new(SchemaType::Boolean(ScalarType::default()))
}

/// The null scalar.
#[must_use]
pub fn null() -> Rc<SchemaType> {
    Rc::new(SchemaType::Null(ScalarType::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_object_id_extracts_id_field() {
        let parent = object("Parent").field("id", number()).build();
        let id = parent.id_of(&Value::from(json!({ "id": 1 })));
        assert_eq!(id, Some(Value::from(1)));
        assert_eq!(parent.id_of(&Value::from(json!({ "name": "x" }))), None);
    }

    #[test]
    fn non_nullable_rejects_nullish() {
        let ty = non_nullable(string());
        let registry = TypeRegistry::new(&[Rc::clone(&ty)]);
        let type_ref = TypeRef::from(&ty);
        assert!(!is_valid(Some(&type_ref), &Value::Null, &registry).unwrap());
        assert!(!is_valid(Some(&type_ref), &Value::Absent, &registry).unwrap());
        assert!(is_valid(Some(&type_ref), &Value::from("x"), &registry).unwrap());
    }

    #[test]
    fn nullable_accepts_nullish() {
        let ty = string();
        let registry = TypeRegistry::new(&[]);
        let type_ref = TypeRef::from(&ty);
        assert!(is_valid(Some(&type_ref), &Value::Null, &registry).unwrap());
        assert!(!is_valid(Some(&type_ref), &Value::from(1), &registry).unwrap());
    }

    #[test]
    fn null_scalar_matches_only_null() {
        let ty = null();
        let registry = TypeRegistry::new(&[]);
        assert!(ty.is_of_type(&Value::Null, &registry).unwrap());
        assert!(!ty.is_of_type(&Value::from("x"), &registry).unwrap());
        assert!(!ty.is_of_type(&Value::Absent, &registry).unwrap());
    }

    #[test]
    fn union_resolves_by_const_discriminator() {
        let a = object("A")
            .field_def("kind", FieldDef::of(string_const("a")))
            .is_of_type(|value| value.field("kind").and_then(Value::as_str) == Some("a"))
            .build();
        let b = object("B")
            .field_def("kind", FieldDef::of(string_const("b")))
            .is_of_type(|value| value.field("kind").and_then(Value::as_str) == Some("b"))
            .build();
        let both = union([TypeRef::from(&a), TypeRef::from(&b)]);
        let registry = TypeRegistry::new(&[a, b]);
        let resolved = resolve_wrapped_type(
            TypeRef::from(&both),
            &Value::from(json!({ "kind": "b" })),
            &registry,
        )
        .unwrap();
        assert_eq!(resolved.name(), Some("B"));
    }

    #[test]
    fn field_lookup_strips_argument_suffix() {
        let ty = object("Query")
            .field_def("items", FieldDef::of(array()).with_arguments())
            .field("plain", string())
            .build();
        let object = ty.as_object().unwrap();
        assert!(object.field(r#"items({"first":10})"#).is_some());
        assert!(object.field(r#"plain({"x":1})"#).is_none());
        assert!(object.field("plain").is_some());
    }
}
