//! Reading through selectors.

use std::rc::Rc;

use serde_json::json;
use tessera_core::schema::{self, FieldDef, SchemaType, TypeRef};
use tessera_core::{
    Cache, CacheConfig, CacheError, MissingField, ReadRequest, Value, WriteRequest,
};

fn cache_with_book() -> Cache {
    let author = schema::object("Author")
        .field("id", schema::number())
        .field("name", schema::string())
        .build();
    let book = schema::object("Book")
        .field("id", schema::number())
        .field("title", schema::string())
        .field("author", TypeRef::from(&author))
        .build();
    let cache = Cache::new(CacheConfig::new().types([book, author]));
    cache
        .write(&WriteRequest::new(
            "Book",
            json!({ "id": 1, "title": "Walden", "author": { "id": 7, "name": "Thoreau" } }),
        ))
        .unwrap();
    cache
}

#[test]
fn selects_subsets_of_stored_data() {
    let cache = cache_with_book();
    let result = cache
        .read(&ReadRequest::new("Book").id(1).select("{ title }"))
        .unwrap()
        .unwrap();
    assert_eq!(result.data.to_json(), json!({ "title": "Walden" }));
    assert!(result.missing_fields.is_empty());
}

#[test]
fn follows_references_through_nested_selections() {
    let cache = cache_with_book();
    let result = cache
        .read(&ReadRequest::new("Book").id(1).select("{ title author { name } }"))
        .unwrap()
        .unwrap();
    assert_eq!(
        result.data.to_json(),
        json!({ "title": "Walden", "author": { "name": "Thoreau" } })
    );
}

#[test]
fn reads_everything_without_a_selector() {
    let cache = cache_with_book();
    let result = cache.read(&ReadRequest::new("Book").id(1)).unwrap().unwrap();
    assert_eq!(
        result.data.to_json(),
        json!({ "id": 1, "title": "Walden", "author": { "id": 7, "name": "Thoreau" } })
    );
}

#[test]
fn missing_root_entity_reads_as_none() {
    let cache = cache_with_book();
    assert!(cache.read(&ReadRequest::new("Book").id(2)).unwrap().is_none());
}

#[test]
fn records_missing_fields_with_their_paths() {
    let cache = cache_with_book();
    let result = cache
        .read(&ReadRequest::new("Book").id(1).select("{ title subtitle author { age } }"))
        .unwrap()
        .unwrap();
    assert_eq!(
        result.missing_fields,
        vec![MissingField::at(["subtitle"]), MissingField::at(["author", "age"])]
    );
    assert_eq!(
        result.data.to_json(),
        json!({ "title": "Walden", "author": {} })
    );
}

#[test]
fn aliases_rename_output_fields() {
    let cache = cache_with_book();
    let result = cache
        .read(&ReadRequest::new("Book").id(1).select("{ t: title }"))
        .unwrap()
        .unwrap();
    assert_eq!(result.data.to_json(), json!({ "t": "Walden" }));
}

#[test]
fn star_selects_all_stored_fields() {
    let author = schema::object("Author")
        .field("id", schema::number())
        .field("name", schema::string())
        .build();
    let cache = Cache::new(CacheConfig::new().types([author]));
    cache
        .write(&WriteRequest::new("Author", json!({ "id": 7, "name": "Thoreau" })))
        .unwrap();
    let result = cache
        .read(&ReadRequest::new("Author").id(7).select("{ * }"))
        .unwrap()
        .unwrap();
    assert_eq!(result.data.to_json(), json!({ "id": 7, "name": "Thoreau" }));
}

#[test]
fn quoted_field_names_round_trip() {
    let note = schema::object("Note").field("id", schema::number()).build();
    let cache = Cache::new(CacheConfig::new().types([note]));
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "weird name": "x" })))
        .unwrap();
    let result = cache
        .read(&ReadRequest::new("Note").id(1).select("{ \"weird name\" }"))
        .unwrap()
        .unwrap();
    assert_eq!(result.data.to_json(), json!({ "weird name": "x" }));
}

#[test]
fn fragment_spreads_expand_against_the_entity_type() {
    let cache = cache_with_book();
    let result = cache
        .read(
            &ReadRequest::new("Book")
                .id(1)
                .select("{ ...titled } fragment titled on Book { title }"),
        )
        .unwrap()
        .unwrap();
    assert_eq!(result.data.to_json(), json!({ "title": "Walden" }));
}

#[test]
fn fragment_definition_with_wrong_type_condition_fails() {
    let cache = cache_with_book();
    let error = cache
        .read(&ReadRequest::new("Book").id(1).select("fragment a on Author { name }"))
        .unwrap_err();
    assert!(matches!(error, CacheError::SelectorMismatch { .. }));
}

#[test]
fn inline_fragments_apply_only_to_matching_types() {
    let cache = cache_with_book();
    let result = cache
        .read(
            &ReadRequest::new("Book")
                .id(1)
                .select("{ ... on Book { title } ... on Author { name } }"),
        )
        .unwrap()
        .unwrap();
    assert_eq!(result.data.to_json(), json!({ "title": "Walden" }));
}

#[test]
fn read_hooks_derive_fields_from_stored_data() {
    let person = schema::object("Person")
        .field("id", schema::number())
        .field("first", schema::string())
        .field("last", schema::string())
        .field_def(
            "fullName",
            FieldDef::of(schema::string()).with_read(|parent, _ctx| {
                let first = parent.fields.get("first").and_then(Value::as_str).unwrap_or("");
                let last = parent.fields.get("last").and_then(Value::as_str).unwrap_or("");
                Value::from(format!("{first} {last}"))
            }),
        )
        .build();
    let cache = Cache::new(CacheConfig::new().types([person]));
    cache
        .write(&WriteRequest::new(
            "Person",
            json!({ "id": 1, "first": "Henry", "last": "Thoreau" }),
        ))
        .unwrap();
    let result = cache
        .read(&ReadRequest::new("Person").id(1).select("{ fullName }"))
        .unwrap()
        .unwrap();
    assert_eq!(result.data.to_json(), json!({ "fullName": "Henry Thoreau" }));
}

#[test]
fn read_hooks_can_build_references() {
    let person: Rc<SchemaType> = schema::object("Person")
        .field("id", schema::number())
        .field("name", schema::string())
        .field("bestFriendId", schema::number())
        .field_def(
            "bestFriend",
            FieldDef::of("Person").with_read(|parent, ctx| {
                parent
                    .fields
                    .get("bestFriendId")
                    .and_then(|id| ctx.to_reference("Person", id))
                    .unwrap_or(Value::Null)
            }),
        )
        .build();
    let cache = Cache::new(CacheConfig::new().types([person]));
    cache
        .write(&WriteRequest::new("Person", json!({ "id": 1, "name": "A", "bestFriendId": 2 })))
        .unwrap();
    cache
        .write(&WriteRequest::new("Person", json!({ "id": 2, "name": "B" })))
        .unwrap();
    let result = cache
        .read(&ReadRequest::new("Person").id(1).select("{ bestFriend { name } }"))
        .unwrap()
        .unwrap();
    assert_eq!(result.data.to_json(), json!({ "bestFriend": { "name": "B" } }));
}

#[test]
fn repeated_reads_share_result_data() {
    let cache = cache_with_book();
    let request = ReadRequest::new("Book").id(1).select("{ title }");
    let first = cache.read(&request).unwrap().unwrap();
    let second = cache.read(&request).unwrap().unwrap();
    assert!(Value::ptr_eq(&first.data, &second.data));

    // An unrelated write invalidates the cached result, but the
    // re-executed read shares unchanged structure with the old data.
    cache
        .write(&WriteRequest::new("Author", json!({ "id": 7, "name": "H. D. Thoreau" })))
        .unwrap();
    let third = cache.read(&request).unwrap().unwrap();
    assert!(Value::ptr_eq(&first.data, &third.data));
}

#[test]
fn cyclic_entity_graphs_read_back_with_references() {
    let parent = schema::object("Parent")
        .field("id", schema::number())
        .field("child", TypeRef::from("Child"))
        .build();
    let child = schema::object("Child")
        .field("id", schema::number())
        .field("parent", TypeRef::from("Parent"))
        .build();
    let cache = Cache::new(CacheConfig::new().types([parent, child]));
    cache
        .write(&WriteRequest::new(
            "Parent",
            json!({ "id": 1, "child": { "id": 1, "parent": { "___ref": "Parent:1" } } }),
        ))
        .unwrap();
    let result = cache.read(&ReadRequest::new("Parent").id(1)).unwrap().unwrap();
    assert_eq!(
        result.data.to_json(),
        json!({ "id": 1, "child": { "id": 1, "parent": { "___ref": "Parent:1" } } })
    );
}

#[test]
fn only_known_fields_skips_undeclared_selections() {
    let cache = cache_with_book();
    cache
        .write(&WriteRequest::new("Book", json!({ "id": 1, "genre": "memoir" })))
        .unwrap();

    let unfiltered = cache
        .read(&ReadRequest::new("Book").id(1).select("{ title genre }"))
        .unwrap()
        .unwrap();
    assert_eq!(
        unfiltered.data.to_json(),
        json!({ "title": "Walden", "genre": "memoir" })
    );

    let filtered = cache
        .read(
            &ReadRequest::new("Book")
                .id(1)
                .select("{ title genre }")
                .only_known_fields(true),
        )
        .unwrap()
        .unwrap();
    assert_eq!(filtered.data.to_json(), json!({ "title": "Walden" }));
    // Skipped fields are not reported missing.
    assert!(filtered.missing_fields.is_empty());
}

#[test]
fn only_known_fields_keeps_everything_on_fieldless_types() {
    let blob = schema::object("Blob").build();
    let cache = Cache::new(CacheConfig::new().types([blob]));
    cache
        .write(&WriteRequest::new("Blob", json!({ "id": 1, "anything": "x" })))
        .unwrap();
    let result = cache
        .read(&ReadRequest::new("Blob").id(1).select("{ anything }").only_known_fields(true))
        .unwrap()
        .unwrap();
    assert_eq!(result.data.to_json(), json!({ "anything": "x" }));
}
