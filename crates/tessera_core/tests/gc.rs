//! Garbage collection and retain pins.

use serde_json::json;
use tessera_core::schema::{self, TypeRef};
use tessera_core::{Cache, CacheConfig, EntityId, ReadRequest, WriteRequest};

fn tree_cache() -> Cache {
    let leaf = schema::object("Leaf")
        .field("id", schema::number())
        .field("label", schema::string())
        .build();
    let node = schema::object("Node")
        .field("id", schema::number())
        .field("leaf", TypeRef::from(&leaf))
        .build();
    Cache::new(CacheConfig::new().types([node, leaf]))
}

fn seed(cache: &Cache) {
    cache
        .write(
            &WriteRequest::new(
                "Node",
                json!({ "id": 1, "leaf": { "id": 10, "label": "kept" } }),
            ),
        )
        .unwrap();
    cache
        .write(&WriteRequest::new("Leaf", json!({ "id": 99, "label": "loose" })))
        .unwrap();
}

#[test]
fn unretained_entities_are_swept() {
    let cache = tree_cache();
    seed(&cache);
    let mut removed = cache.gc();
    removed.sort();
    assert_eq!(
        removed,
        vec![
            EntityId::from("Leaf:10"),
            EntityId::from("Leaf:99"),
            EntityId::from("Node:1"),
        ]
    );
    assert!(cache.read(&ReadRequest::new("Node").id(1)).unwrap().is_none());
}

#[test]
fn retained_entities_keep_everything_they_reference() {
    let cache = tree_cache();
    seed(&cache);
    let pin = cache.retain("Node:1");
    let removed = cache.gc();
    assert_eq!(removed, vec![EntityId::from("Leaf:99")]);

    // The referenced leaf survived through the pin on its parent.
    let read = cache
        .read(&ReadRequest::new("Leaf").id(10).select("{ label }"))
        .unwrap()
        .unwrap();
    assert_eq!(read.data.to_json(), json!({ "label": "kept" }));
    pin.release();
}

#[test]
fn released_pins_no_longer_protect() {
    let cache = tree_cache();
    seed(&cache);
    let pin = cache.retain("Leaf:99");
    assert_eq!(cache.gc().len(), 2);
    pin.release();
    assert_eq!(cache.gc(), vec![EntityId::from("Leaf:99")]);
}

#[test]
fn releasing_twice_counts_once() {
    let cache = tree_cache();
    cache
        .write(&WriteRequest::new("Leaf", json!({ "id": 99, "label": "loose" })))
        .unwrap();
    let first = cache.retain("Leaf:99");
    let second = cache.retain("Leaf:99");
    first.release();
    first.release();
    // The second pin still holds.
    assert!(cache.gc().is_empty());
    second.release();
    assert_eq!(cache.gc(), vec![EntityId::from("Leaf:99")]);
}

#[test]
fn dropping_a_guard_keeps_the_pin() {
    let cache = tree_cache();
    cache
        .write(&WriteRequest::new("Leaf", json!({ "id": 99, "label": "loose" })))
        .unwrap();
    {
        let _pin = cache.retain("Leaf:99");
    }
    assert!(cache.gc().is_empty());
}

#[test]
fn watched_entities_are_roots() {
    let cache = tree_cache();
    seed(&cache);
    let handle = cache
        .watch(ReadRequest::new("Node").id(1).select("{ leaf { label } }"), |_, _| {})
        .unwrap();
    let removed = cache.gc();
    assert_eq!(removed, vec![EntityId::from("Leaf:99")]);

    handle.unsubscribe();
    let mut removed = cache.gc();
    removed.sort();
    assert_eq!(removed, vec![EntityId::from("Leaf:10"), EntityId::from("Node:1")]);
}
