//! Property tests over value hashing, structural sharing, and the
//! write/read round trip.

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::json;
use tessera_core::schema;
use tessera_core::value::{replace_equal_deep, stable_hash, Value};
use tessera_core::{Cache, CacheConfig, ReadRequest, WriteRequest};

fn scalar_json() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        any::<i32>().prop_map(serde_json::Value::from),
        any::<bool>().prop_map(serde_json::Value::from),
        "[a-z]{0,12}".prop_map(serde_json::Value::from),
    ]
}

fn field_map() -> impl Strategy<Value = BTreeMap<String, serde_json::Value>> {
    prop::collection::btree_map("[a-hj-z][a-z]{0,7}", scalar_json(), 0..6)
}

proptest! {
    #[test]
    fn equal_values_hash_equally(fields in field_map()) {
        let object = serde_json::Value::Object(fields.into_iter().collect());
        let a = Value::from(object.clone());
        let b = Value::from(object);
        prop_assert_eq!(stable_hash(&a), stable_hash(&b));
    }

    #[test]
    fn scalar_ids_hash_to_their_text(id in "[a-z0-9]{1,16}") {
        prop_assert_eq!(stable_hash(&Value::from(id.as_str())), id);
    }

    #[test]
    fn replace_equal_deep_preserves_the_new_value(
        prev in field_map(),
        next in field_map(),
    ) {
        let prev = Value::from(serde_json::Value::Object(prev.into_iter().collect()));
        let next = Value::from(serde_json::Value::Object(next.into_iter().collect()));
        let shared = replace_equal_deep(&prev, &next);
        prop_assert_eq!(&shared, &next);
        // Re-sharing against itself changes nothing.
        let again = replace_equal_deep(&shared, &next);
        prop_assert!(Value::ptr_eq(&shared, &again));
    }

    #[test]
    fn written_scalars_read_back_verbatim(fields in field_map()) {
        let record = schema::object("Record").build();
        let cache = Cache::new(CacheConfig::new().types([record]));
        let mut data: serde_json::Map<String, serde_json::Value> =
            fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        data.insert("id".to_owned(), json!(1));
        cache
            .write(&WriteRequest::new("Record", serde_json::Value::Object(data.clone())))
            .unwrap();
        let read = cache.read(&ReadRequest::new("Record").id(1)).unwrap().unwrap();
        prop_assert_eq!(read.data.to_json(), serde_json::Value::Object(data));
    }
}
