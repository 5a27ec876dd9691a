//! Structural sharing between successive versions of a value.

use std::rc::Rc;

use super::{ObjectValue, Value};

/// Replace `next` with `prev` wherever the two are deeply equal,
/// reusing `prev`'s allocations for unchanged subtrees. Values read
/// back-to-back therefore keep allocation identity for the parts that
/// did not change, which makes change detection a pointer comparison.
#[must_use]
pub fn replace_equal_deep(prev: &Value, next: &Value) -> Value {
    if Value::ptr_eq(prev, next) {
        return prev.clone();
    }
    match (prev, next) {
        (Value::Array(prev_items), Value::Array(next_items)) => {
            let mut equal = prev_items.len() == next_items.len();
            let mut items = Vec::with_capacity(next_items.len());
            for (index, next_item) in next_items.iter().enumerate() {
                let item = match prev_items.get(index) {
                    Some(prev_item) => replace_equal_deep(prev_item, next_item),
                    None => next_item.clone(),
                };
                if equal && !Value::ptr_eq(&item, &prev_items[index]) {
                    equal = false;
                }
                items.push(item);
            }
            if equal {
                prev.clone()
            } else {
                Value::Array(Rc::new(items))
            }
        }
        (Value::Object(prev_object), Value::Object(next_object)) => {
            let mut equal = prev_object.fields.len() == next_object.fields.len()
                && prev_object.meta == next_object.meta;
            let mut fields = std::collections::BTreeMap::new();
            for (name, next_field) in &next_object.fields {
                let field = match prev_object.fields.get(name) {
                    Some(prev_field) => {
                        let shared = replace_equal_deep(prev_field, next_field);
                        if equal && !Value::ptr_eq(&shared, prev_field) {
                            equal = false;
                        }
                        shared
                    }
                    None => {
                        equal = false;
                        next_field.clone()
                    }
                };
                fields.insert(name.clone(), field);
            }
            if equal {
                prev.clone()
            } else {
                Value::Object(Rc::new(ObjectValue {
                    fields,
                    meta: next_object.meta.clone(),
                }))
            }
        }
        _ => next.clone(),
    }
}
