//! Optimistic overlay and rebase behavior.

use serde_json::json;
use tessera_core::schema;
use tessera_core::{Cache, CacheConfig, ReadRequest, WriteRequest};

fn note_cache() -> Cache {
    let note = schema::object("Note")
        .field("id", schema::number())
        .field("text", schema::string())
        .field("pending", schema::boolean())
        .build();
    Cache::new(CacheConfig::new().types([note]))
}

fn read_text(cache: &Cache, optimistic: bool) -> serde_json::Value {
    cache
        .read(&ReadRequest::new("Note").id(1).select("{ text }").optimistic(optimistic))
        .unwrap()
        .unwrap()
        .data
        .to_json()
}

#[test]
fn optimistic_writes_overlay_the_committed_data() {
    let cache = note_cache();
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "text": "draft" })))
        .unwrap();
    cache
        .write(
            &WriteRequest::new("Note", json!({ "id": 1, "text": "edited" })).optimistic(true),
        )
        .unwrap();

    assert_eq!(read_text(&cache, true), json!({ "text": "edited" }));
    assert_eq!(read_text(&cache, false), json!({ "text": "draft" }));
}

#[test]
fn update_functions_apply_immediately() {
    let cache = note_cache();
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "text": "draft" })))
        .unwrap();
    cache.add_optimistic_update(|cache| {
        cache.write(&WriteRequest::new("Note", json!({ "id": 1, "pending": true })))?;
        Ok(())
    });

    let optimistic = cache
        .read(&ReadRequest::new("Note").id(1).select("{ text pending }"))
        .unwrap()
        .unwrap();
    assert_eq!(optimistic.data.to_json(), json!({ "text": "draft", "pending": true }));
    // The write inside the update function defaulted to optimistic.
    let committed = cache
        .read(&ReadRequest::new("Note").id(1).select("{ pending }").optimistic(false))
        .unwrap()
        .unwrap();
    assert_eq!(committed.data.to_json(), json!({}));
}

#[test]
fn update_functions_are_replayed_over_later_committed_writes() {
    let cache = note_cache();
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "text": "draft" })))
        .unwrap();
    cache.add_optimistic_update(|cache| {
        cache.write(&WriteRequest::new("Note", json!({ "id": 1, "pending": true })))?;
        Ok(())
    });
    // A committed write rebases: the overlay is rebuilt on top of it.
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "text": "final" })))
        .unwrap();

    let read = cache
        .read(&ReadRequest::new("Note").id(1).select("{ text pending }"))
        .unwrap()
        .unwrap();
    assert_eq!(read.data.to_json(), json!({ "text": "final", "pending": true }));
}

#[test]
fn later_update_functions_observe_earlier_overlay_state() {
    let cache = note_cache();
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "text": "a" })))
        .unwrap();
    cache.add_optimistic_update(|cache| {
        cache.write(&WriteRequest::new("Note", json!({ "id": 1, "text": "ab" })))?;
        Ok(())
    });
    cache.add_optimistic_update(|cache| {
        let current = cache
            .read(&ReadRequest::new("Note").id(1).select("{ text }"))?
            .and_then(|result| result.data.field("text").and_then(|v| v.as_str().map(String::from)))
            .unwrap_or_default();
        cache.write(&WriteRequest::new("Note", json!({ "id": 1, "text": format!("{current}c") })))?;
        Ok(())
    });

    assert_eq!(read_text(&cache, true), json!({ "text": "abc" }));
}

#[test]
fn removing_an_update_restores_the_committed_view() {
    let cache = note_cache();
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "text": "draft" })))
        .unwrap();
    let keep = cache.add_optimistic_update(|cache| {
        cache.write(&WriteRequest::new("Note", json!({ "id": 1, "pending": true })))?;
        Ok(())
    });
    let revert = cache.add_optimistic_update(|cache| {
        cache.write(&WriteRequest::new("Note", json!({ "id": 1, "text": "edited" })))?;
        Ok(())
    });

    cache.remove_optimistic_update(revert);
    let read = cache
        .read(&ReadRequest::new("Note").id(1).select("{ text pending }"))
        .unwrap()
        .unwrap();
    assert_eq!(read.data.to_json(), json!({ "text": "draft", "pending": true }));

    cache.remove_optimistic_update(keep);
    let read = cache
        .read(&ReadRequest::new("Note").id(1).select("{ text pending }"))
        .unwrap()
        .unwrap();
    assert_eq!(read.data.to_json(), json!({ "text": "draft" }));
}

#[test]
fn removing_all_updates_clears_the_overlay() {
    let cache = note_cache();
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "text": "draft" })))
        .unwrap();
    cache.add_optimistic_update(|cache| {
        cache.write(&WriteRequest::new("Note", json!({ "id": 1, "text": "x" })))?;
        Ok(())
    });
    cache.add_optimistic_update(|cache| {
        cache.write(&WriteRequest::new("Note", json!({ "id": 1, "text": "y" })))?;
        Ok(())
    });

    cache.remove_optimistic_updates();
    assert_eq!(read_text(&cache, true), json!({ "text": "draft" }));
}

#[test]
fn bare_optimistic_writes_do_not_survive_a_rebase() {
    let cache = note_cache();
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "text": "draft" })))
        .unwrap();
    // A direct optimistic write has no update function backing it.
    cache
        .write(
            &WriteRequest::new("Note", json!({ "id": 1, "text": "edited" })).optimistic(true),
        )
        .unwrap();
    assert_eq!(read_text(&cache, true), json!({ "text": "edited" }));

    // Any committed write rebuilds the overlay from update functions
    // alone, dropping the bare write.
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 2, "text": "other" })))
        .unwrap();
    assert_eq!(read_text(&cache, true), json!({ "text": "draft" }));
}

#[test]
fn failing_update_functions_are_skipped() {
    let cache = note_cache();
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "text": "draft" })))
        .unwrap();
    cache.add_optimistic_update(|cache| {
        cache.write(&WriteRequest::new("Unknown", json!({ "id": 1 })))?;
        Ok(())
    });
    cache.add_optimistic_update(|cache| {
        cache.write(&WriteRequest::new("Note", json!({ "id": 1, "text": "edited" })))?;
        Ok(())
    });

    assert_eq!(read_text(&cache, true), json!({ "text": "edited" }));
    assert_eq!(read_text(&cache, false), json!({ "text": "draft" }));
}

#[test]
fn optimistic_write_mode_changes_the_default_target() {
    let cache = note_cache();
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "text": "draft" })))
        .unwrap();

    cache.set_optimistic_write_mode(true);
    cache
        .write(&WriteRequest::new("Note", json!({ "id": 1, "text": "edited" })))
        .unwrap();
    cache.set_optimistic_write_mode(false);

    assert_eq!(read_text(&cache, true), json!({ "text": "edited" }));
    assert_eq!(read_text(&cache, false), json!({ "text": "draft" }));

    // An explicit flag still overrides the ambient mode.
    cache.set_optimistic_write_mode(true);
    cache
        .write(
            &WriteRequest::new("Note", json!({ "id": 1, "text": "final" })).optimistic(false),
        )
        .unwrap();
    cache.set_optimistic_write_mode(false);
    assert_eq!(read_text(&cache, false), json!({ "text": "final" }));
}
