//! The normalized entity store: a base map of committed entities plus
//! an optimistic overlay that shadows it.

use std::collections::HashMap;
use std::rc::Rc;

use crate::entity::{Entity, EntityId};
use crate::value::{replace_equal_deep, Value};

/// Entity storage with two layers. The base layer holds committed
/// entities; the overlay holds optimistic state, where `None` marks an
/// entity deleted optimistically. Optimistic lookups consult the
/// overlay first and fall through to the base.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    base: HashMap<EntityId, Rc<Entity>>,
    overlay: HashMap<EntityId, Option<Rc<Entity>>>,
}

impl EntityStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entity, overlay-first when `optimistic`.
    #[must_use]
    pub fn get(&self, id: &EntityId, optimistic: bool) -> Option<Rc<Entity>> {
        if optimistic {
            if let Some(entry) = self.overlay.get(id) {
                return entry.clone();
            }
        }
        self.base.get(id).cloned()
    }

    /// Whether an entity exists in the given view.
    #[must_use]
    pub fn contains(&self, id: &EntityId, optimistic: bool) -> bool {
        self.get(id, optimistic).is_some()
    }

    /// Store an entity, sharing unchanged structure with the previous
    /// version. Returns the stored entity and whether it differs from
    /// what the same view held before.
    pub fn set(&mut self, entity: Entity, optimistic: bool) -> (Rc<Entity>, bool) {
        let previous = self.get(&entity.id, optimistic);
        let stored = match &previous {
            Some(previous) => {
                let value = replace_equal_deep(&previous.value, &entity.value);
                let unchanged = Value::ptr_eq(&value, &previous.value)
                    && previous.expires_at == entity.expires_at
                    && previous.invalidated == entity.invalidated;
                if unchanged {
                    Rc::clone(previous)
                } else {
                    Rc::new(Entity { value, ..entity })
                }
            }
            None => Rc::new(entity),
        };
        let changed = previous.as_ref().map_or(true, |previous| !Rc::ptr_eq(previous, &stored));
        if optimistic {
            self.overlay.insert(stored.id.clone(), Some(Rc::clone(&stored)));
        } else {
            self.base.insert(stored.id.clone(), Rc::clone(&stored));
        }
        (stored, changed)
    }

    /// Delete an entity. Optimistic deletes tombstone the overlay so
    /// the base entity stays hidden; committed deletes remove from the
    /// base. Returns whether the entity was visible beforehand.
    pub fn delete(&mut self, id: &EntityId, optimistic: bool) -> bool {
        let existed = self.contains(id, optimistic);
        if optimistic {
            self.overlay.insert(id.clone(), None);
        } else {
            self.base.remove(id);
        }
        existed
    }

    /// Drop the optimistic overlay. Returns whether it held anything.
    pub fn clear_overlay(&mut self) -> bool {
        let had_entries = !self.overlay.is_empty();
        self.overlay.clear();
        had_entries
    }

    /// Whether the overlay currently holds any entries.
    #[must_use]
    pub fn has_overlay(&self) -> bool {
        !self.overlay.is_empty()
    }

    /// The committed entities.
    pub fn base_entries(&self) -> impl Iterator<Item = (&EntityId, &Rc<Entity>)> {
        self.base.iter()
    }

    /// The overlay entries, tombstones included.
    pub fn overlay_entries(&self) -> impl Iterator<Item = (&EntityId, Option<&Rc<Entity>>)> {
        self.overlay.iter().map(|(id, entry)| (id, entry.as_ref()))
    }

    /// Remove a committed entity without touching the overlay.
    pub fn remove_base(&mut self, id: &EntityId) {
        self.base.remove(id);
    }

    /// Ids of all committed entities.
    #[must_use]
    pub fn base_ids(&self) -> Vec<EntityId> {
        self.base.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(id: &str, value: serde_json::Value) -> Entity {
        Entity { value: Value::from(value), ..Entity::new(EntityId::from(id)) }
    }

    #[test]
    fn overlay_shadows_base() {
        let mut store = EntityStore::new();
        store.set(entity("Item:1", json!({ "a": 1 })), false);
        store.set(entity("Item:1", json!({ "a": 2 })), true);
        let committed = store.get(&EntityId::from("Item:1"), false).unwrap();
        let optimistic = store.get(&EntityId::from("Item:1"), true).unwrap();
        assert_eq!(committed.value.to_json(), json!({ "a": 1 }));
        assert_eq!(optimistic.value.to_json(), json!({ "a": 2 }));
    }

    #[test]
    fn tombstone_hides_base_entity() {
        let mut store = EntityStore::new();
        store.set(entity("Item:1", json!({ "a": 1 })), false);
        store.delete(&EntityId::from("Item:1"), true);
        assert!(store.get(&EntityId::from("Item:1"), true).is_none());
        assert!(store.get(&EntityId::from("Item:1"), false).is_some());
        store.clear_overlay();
        assert!(store.get(&EntityId::from("Item:1"), true).is_some());
    }

    #[test]
    fn unchanged_set_reuses_stored_entity() {
        let mut store = EntityStore::new();
        let (first, changed) = store.set(entity("Item:1", json!({ "a": [1, 2] })), false);
        assert!(changed);
        let (second, changed) = store.set(entity("Item:1", json!({ "a": [1, 2] })), false);
        assert!(!changed);
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn partially_changed_set_shares_subtrees() {
        let mut store = EntityStore::new();
        store.set(entity("Item:1", json!({ "a": { "x": 1 }, "b": 2 })), false);
        let first = store.get(&EntityId::from("Item:1"), false).unwrap();
        let (second, changed) =
            store.set(entity("Item:1", json!({ "a": { "x": 1 }, "b": 3 })), false);
        assert!(changed);
        let first_a = first.value.field("a").unwrap();
        let second_a = second.value.field("a").unwrap();
        assert!(Value::ptr_eq(first_a, second_a));
    }
}
