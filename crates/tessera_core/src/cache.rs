//! The cache facade tying the store, traversals, optimistic overlay,
//! watches, and garbage collection together behind one handle.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tessera_language::Selector;

use crate::entity::{Entity, EntityId};
use crate::error::{CacheError, CacheResult};
use crate::identify::{identify_by_data, identify_by_id, identify_by_type};
use crate::operations::modify::{execute_modify, ModifyMode};
use crate::operations::read::execute_read;
use crate::operations::write::execute_write;
use crate::schema::{SchemaType, TypeRef, TypeRegistry};
use crate::store::EntityStore;
use crate::types::{now_millis, InvalidField, MissingField, NO_EXPIRY};
use crate::value::{replace_equal_deep, Value};

/// Cache construction options.
#[derive(Default)]
#[must_use]
pub struct CacheConfig {
    types: Vec<Rc<SchemaType>>,
    strict_writes: bool,
}

impl CacheConfig {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register schema types; every named type reachable from these
    /// roots becomes resolvable by name.
    pub fn types(mut self, types: impl IntoIterator<Item = Rc<SchemaType>>) -> Self {
        self.types.extend(types);
        self
    }

    /// Make writes with invalid fields persist nothing by default.
    pub fn strict_writes(mut self, strict: bool) -> Self {
        self.strict_writes = strict;
        self
    }
}

/// A selector argument: already parsed or source text.
#[derive(Debug, Clone)]
pub enum Select {
    /// A parsed selector.
    Selector(Selector),
    /// Selector source, parsed (memoized) on use.
    Source(String),
}

impl Select {
    fn resolve(&self) -> CacheResult<Selector> {
        match self {
            Select::Selector(selector) => Ok(selector.clone()),
            Select::Source(source) => Ok(Selector::parse(source)?),
        }
    }
}

impl From<Selector> for Select {
    fn from(selector: Selector) -> Self {
        Select::Selector(selector)
    }
}

impl From<&str> for Select {
    fn from(source: &str) -> Self {
        Select::Source(source.to_owned())
    }
}

impl From<String> for Select {
    fn from(source: String) -> Self {
        Select::Source(source)
    }
}

/// A read request.
#[derive(Clone)]
#[must_use]
pub struct ReadRequest {
    ty: TypeRef,
    id: Option<Value>,
    select: Option<Select>,
    optimistic: Option<bool>,
    only_known_fields: bool,
}

impl ReadRequest {
    /// Read the entity of the given type.
    pub fn new(ty: impl Into<TypeRef>) -> Self {
        Self {
            ty: ty.into(),
            id: None,
            select: None,
            optimistic: None,
            only_known_fields: false,
        }
    }

    /// Address the entity by identity value.
    pub fn id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Restrict the read to a selector.
    pub fn select(mut self, select: impl Into<Select>) -> Self {
        self.select = Some(select.into());
        self
    }

    /// Override the optimistic default (reads default to optimistic).
    pub fn optimistic(mut self, optimistic: bool) -> Self {
        self.optimistic = Some(optimistic);
        self
    }

    /// Skip selected fields a typed object does not declare. Objects
    /// whose type declares no fields at all keep everything.
    pub fn only_known_fields(mut self, only_known_fields: bool) -> Self {
        self.only_known_fields = only_known_fields;
        self
    }
}

/// A write request.
#[derive(Clone)]
#[must_use]
pub struct WriteRequest {
    ty: TypeRef,
    id: Option<Value>,
    data: Value,
    expires_at: Option<i64>,
    optimistic: Option<bool>,
    strict: Option<bool>,
    only_known_fields: bool,
}

impl WriteRequest {
    /// Write data under the given type.
    pub fn new(ty: impl Into<TypeRef>, data: impl Into<Value>) -> Self {
        Self {
            ty: ty.into(),
            id: None,
            data: data.into(),
            expires_at: None,
            optimistic: None,
            strict: None,
            only_known_fields: false,
        }
    }

    /// Address the root entity by identity value instead of deriving
    /// the identity from the data.
    pub fn id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Stamp written fields with an absolute expiration time.
    pub fn expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Override the optimistic default (writes default to committed).
    pub fn optimistic(mut self, optimistic: bool) -> Self {
        self.optimistic = Some(optimistic);
        self
    }

    /// Override strict validation for this write.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    /// Drop incoming fields a typed object does not declare. Objects
    /// whose type declares no fields at all keep everything.
    pub fn only_known_fields(mut self, only_known_fields: bool) -> Self {
        self.only_known_fields = only_known_fields;
        self
    }
}

/// A delete or invalidate request.
#[derive(Clone)]
#[must_use]
pub struct ModifyRequest {
    ty: TypeRef,
    id: Option<Value>,
    select: Option<Select>,
    optimistic: Option<bool>,
}

impl ModifyRequest {
    /// Address the entity of the given type.
    pub fn new(ty: impl Into<TypeRef>) -> Self {
        Self { ty: ty.into(), id: None, select: None, optimistic: None }
    }

    /// Address the entity by identity value.
    pub fn id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Restrict the operation to a selector; without one the whole
    /// entity is addressed.
    pub fn select(mut self, select: impl Into<Select>) -> Self {
        self.select = Some(select.into());
        self
    }

    /// Override the optimistic default.
    pub fn optimistic(mut self, optimistic: bool) -> Self {
        self.optimistic = Some(optimistic);
        self
    }
}

/// The result of a read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    /// The assembled data.
    pub data: Value,
    /// The earliest expiration among visited fields, [`NO_EXPIRY`] if
    /// nothing expires.
    pub expires_at: i64,
    /// Whether any visited entity or field was invalidated.
    pub invalidated: bool,
    /// Whether the result was stale when it was produced.
    pub stale: bool,
    /// Selected fields with no stored value.
    pub missing_fields: Vec<MissingField>,
    /// Stored values failing their declared type.
    pub invalid_fields: Vec<InvalidField>,
    /// The selector the read was restricted to.
    pub selector: Option<Selector>,
}

/// The result of a write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    /// Entities whose stored value changed.
    pub updated_entity_ids: Vec<EntityId>,
    /// Values failing their declared type.
    pub invalid_fields: Vec<InvalidField>,
    /// A selector describing exactly what was written.
    pub selector: Option<Selector>,
}

/// The result of a delete or invalidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyResult {
    /// Entities whose stored state changed.
    pub updated_entity_ids: Vec<EntityId>,
}

/// A serializable image of the stored entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Committed entities, ordered by id.
    pub entities: Vec<Entity>,
    /// Optimistic overlay entries, tombstones included.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optimistic: Vec<OverlayEntry>,
}

/// One optimistic overlay entry in a [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayEntry {
    /// The entity id.
    pub id: EntityId,
    /// The overlaid entity, `None` for an optimistic delete.
    pub entity: Option<Entity>,
}

type UpdateFn = Rc<dyn Fn(&Cache) -> CacheResult<()>>;
type WatchCallback = Rc<dyn Fn(Option<&ReadResult>, Option<&ReadResult>)>;

#[derive(Clone)]
struct OptimisticUpdate {
    id: u64,
    update: UpdateFn,
}

struct WatchEntry {
    id: u64,
    request: ReadRequest,
    callback: WatchCallback,
    prev: RefCell<Option<ReadResult>>,
}

struct CachedRead {
    result: Option<ReadResult>,
    invalidated: bool,
}

struct CacheState {
    registry: TypeRegistry,
    strict_writes: bool,
    store: RefCell<EntityStore>,
    read_results: RefCell<HashMap<String, CachedRead>>,
    watches: RefCell<Vec<Rc<WatchEntry>>>,
    next_watch_id: Cell<u64>,
    optimistic_updates: RefCell<Vec<OptimisticUpdate>>,
    next_update_id: Cell<u64>,
    retained: RefCell<HashMap<EntityId, u64>>,
    transaction_depth: Cell<u32>,
    dirty: Cell<bool>,
    silent_depth: Cell<u32>,
    optimistic_write_mode: Cell<bool>,
}

// Forces optimistic writes for the duration of a rebase and restores
// the previous mode even if an update function errors out early.
struct WriteModeGuard<'a> {
    cell: &'a Cell<bool>,
    prev: bool,
}

impl<'a> WriteModeGuard<'a> {
    fn engage(cell: &'a Cell<bool>) -> Self {
        Self { cell, prev: cell.replace(true) }
    }
}

impl Drop for WriteModeGuard<'_> {
    fn drop(&mut self) {
        self.cell.set(self.prev);
    }
}

// Holds a nesting counter elevated for a scope and restores it even
// when the scope unwinds.
struct DepthGuard<'a> {
    depth: &'a Cell<u32>,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<u32>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// The normalized cache. Cloning yields another handle to the same
/// cache; all handles share state. Single-threaded by design: the
/// handle is neither `Send` nor `Sync`, and hosts embedding it in a
/// threaded context must serialize access.
#[derive(Clone)]
pub struct Cache {
    state: Rc<CacheState>,
}

impl Cache {
    /// Build a cache from a configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Rc::new(CacheState {
                registry: TypeRegistry::new(&config.types),
                strict_writes: config.strict_writes,
                store: RefCell::new(EntityStore::new()),
                read_results: RefCell::new(HashMap::new()),
                watches: RefCell::new(Vec::new()),
                next_watch_id: Cell::new(0),
                optimistic_updates: RefCell::new(Vec::new()),
                next_update_id: Cell::new(0),
                retained: RefCell::new(HashMap::new()),
                transaction_depth: Cell::new(0),
                dirty: Cell::new(false),
                silent_depth: Cell::new(0),
                optimistic_write_mode: Cell::new(false),
            }),
        }
    }

    /// The registered schema types.
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.state.registry
    }

    /// Resolve the entity id a type/id/data combination addresses.
    /// An explicit id wins, then identity extracted from data, then
    /// the type's singleton id.
    pub fn identify(
        &self,
        ty: impl Into<TypeRef>,
        id: Option<&Value>,
        data: Option<&Value>,
    ) -> CacheResult<Option<EntityId>> {
        let ty = ty.into();
        if let Some(id) = id {
            return identify_by_id(&ty, id, &self.state.registry);
        }
        if let Some(data) = data {
            return identify_by_data(&ty, data, &self.state.registry);
        }
        identify_by_type(&ty, &self.state.registry)
    }

    fn root_entity_id(&self, ty: &TypeRef, id: Option<&Value>) -> CacheResult<Option<EntityId>> {
        match id {
            Some(id) => identify_by_id(ty, id, &self.state.registry),
            None => identify_by_type(ty, &self.state.registry),
        }
    }

    /// Read data back out of the cache. Returns `None` when the
    /// addressed root entity does not exist. Optimistic reads are
    /// served from the read-result cache until something invalidates
    /// them.
    pub fn read(&self, request: &ReadRequest) -> CacheResult<Option<ReadResult>> {
        let optimistic = request.optimistic.unwrap_or(true);
        let Some(root_id) = self.root_entity_id(&request.ty, request.id.as_ref())? else {
            return Ok(None);
        };
        let selector = request.select.as_ref().map(Select::resolve).transpose()?;
        let mut result_key = match &selector {
            Some(selector) => format!("{root_id}:{}", selector.source()),
            None => root_id.to_string(),
        };
        if request.only_known_fields {
            // Filtered reads cache separately from unfiltered ones.
            result_key.push_str(":#known");
        }
        if optimistic {
            if let Some(cached) = self.state.read_results.borrow().get(&result_key) {
                if !cached.invalidated {
                    return Ok(cached.result.clone());
                }
            }
        }
        let view = self.state.store.borrow().clone();
        let outcome = execute_read(
            &view,
            &self.state.registry,
            selector.as_ref().map(Selector::document),
            &root_id,
            Some(&request.ty),
            optimistic,
            request.only_known_fields,
        )?;
        tracing::trace!(
            entity = %root_id,
            missing = outcome.missing_fields.len(),
            invalid = outcome.invalid_fields.len(),
            "read"
        );
        let now = now_millis();
        let result = outcome.data.map(|data| {
            let data = match self
                .state
                .read_results
                .borrow()
                .get(&result_key)
                .and_then(|cached| cached.result.as_ref())
            {
                Some(prev) => replace_equal_deep(&prev.data, &data),
                None => data,
            };
            ReadResult {
                data,
                expires_at: outcome.expires_at,
                invalidated: outcome.invalidated,
                stale: outcome.invalidated
                    || (outcome.expires_at != NO_EXPIRY && outcome.expires_at <= now),
                missing_fields: outcome.missing_fields,
                invalid_fields: outcome.invalid_fields,
                selector: selector.clone(),
            }
        });
        if optimistic {
            self.state.read_results.borrow_mut().insert(
                result_key,
                CachedRead { result: result.clone(), invalidated: false },
            );
        }
        Ok(result)
    }

    /// Normalize data into the cache.
    pub fn write(&self, request: &WriteRequest) -> CacheResult<WriteResult> {
        let optimistic =
            request.optimistic.unwrap_or_else(|| self.state.optimistic_write_mode.get());
        let strict = request.strict.unwrap_or(self.state.strict_writes);
        let registry = &self.state.registry;
        let root_id = match &request.id {
            Some(id) => identify_by_id(&request.ty, id, registry)?,
            None => match identify_by_data(&request.ty, &request.data, registry)? {
                Some(id) => Some(id),
                None => identify_by_type(&request.ty, registry)?,
            },
        }
        .ok_or(CacheError::UnidentifiedData)?;
        let expires_at = request.expires_at.unwrap_or(NO_EXPIRY);

        let view = self.state.store.borrow().clone();
        let outcome = execute_write(
            &view,
            registry,
            Some(&request.ty),
            &root_id,
            &request.data,
            expires_at,
            optimistic,
            request.only_known_fields,
        )?;

        let mut updated_entity_ids = Vec::new();
        let persist = !strict || outcome.invalid_fields.is_empty();
        if persist {
            let mut store = self.state.store.borrow_mut();
            for draft in outcome.drafts {
                let id = draft.id.clone();
                let (_, changed) = store.set(draft, optimistic);
                if changed {
                    updated_entity_ids.push(id);
                }
            }
        }
        tracing::debug!(
            entity = %root_id,
            updated = updated_entity_ids.len(),
            invalid = outcome.invalid_fields.len(),
            optimistic,
            "write"
        );
        if !updated_entity_ids.is_empty() {
            self.handle_updated_entities(optimistic);
        }
        Ok(WriteResult {
            updated_entity_ids,
            invalid_fields: outcome.invalid_fields,
            selector: outcome.selector,
        })
    }

    /// Remove the addressed entity, or the selected fields of it.
    /// Returns `None` when the root entity does not exist.
    pub fn delete(&self, request: &ModifyRequest) -> CacheResult<Option<ModifyResult>> {
        self.modify(request, ModifyMode::Delete)
    }

    /// Flag the addressed entity, or the selected fields of it, as
    /// invalidated without removing data.
    pub fn invalidate(&self, request: &ModifyRequest) -> CacheResult<Option<ModifyResult>> {
        self.modify(request, ModifyMode::Invalidate)
    }

    fn modify(
        &self,
        request: &ModifyRequest,
        mode: ModifyMode,
    ) -> CacheResult<Option<ModifyResult>> {
        let optimistic =
            request.optimistic.unwrap_or_else(|| self.state.optimistic_write_mode.get());
        let Some(root_id) = self.root_entity_id(&request.ty, request.id.as_ref())? else {
            return Ok(None);
        };
        let selector = request.select.as_ref().map(Select::resolve).transpose()?;
        let view = self.state.store.borrow().clone();
        let Some(outcome) = execute_modify(
            &view,
            &self.state.registry,
            selector.as_ref().map(Selector::document),
            &root_id,
            Some(&request.ty),
            optimistic,
            mode,
        )?
        else {
            return Ok(None);
        };

        let mut updated_entity_ids = Vec::new();
        {
            let mut store = self.state.store.borrow_mut();
            for (id, entity) in outcome.edits {
                let changed = match entity {
                    Some(entity) => store.set(entity, optimistic).1,
                    None => store.delete(&id, optimistic),
                };
                if changed {
                    updated_entity_ids.push(id);
                }
            }
        }
        tracing::debug!(
            entity = %root_id,
            updated = updated_entity_ids.len(),
            ?mode,
            optimistic,
            "modify"
        );
        if !updated_entity_ids.is_empty() {
            self.handle_updated_entities(optimistic);
        }
        Ok(Some(ModifyResult { updated_entity_ids }))
    }

    /// Watch a read: the callback fires with `(new, old)` whenever the
    /// result of re-running the request changes. The initial result is
    /// captured as the baseline without firing the callback.
    pub fn watch(
        &self,
        request: ReadRequest,
        callback: impl Fn(Option<&ReadResult>, Option<&ReadResult>) + 'static,
    ) -> CacheResult<WatchHandle> {
        let initial = self.read(&request)?;
        let id = self.state.next_watch_id.get();
        self.state.next_watch_id.set(id + 1);
        let entry = Rc::new(WatchEntry {
            id,
            request,
            callback: Rc::new(callback),
            prev: RefCell::new(initial),
        });
        self.state.watches.borrow_mut().push(entry);
        Ok(WatchHandle { state: Rc::clone(&self.state), id })
    }

    /// Run several operations as one unit: watchers are notified once
    /// at the end instead of after every operation. Transactions nest;
    /// only the outermost notifies.
    pub fn transaction<T>(&self, f: impl FnOnce() -> T) -> T {
        let outermost = self.state.transaction_depth.get() == 0;
        let result = {
            let _guard = DepthGuard::enter(&self.state.transaction_depth);
            f()
        };
        if outermost && self.state.dirty.replace(false) {
            self.update_watchers();
        }
        result
    }

    /// Change the default write mode. While `true`, writes, deletes,
    /// and invalidations without an explicit `optimistic` flag target
    /// the overlay instead of the committed base. Rebase replay sets
    /// this for its own duration and restores it afterwards.
    pub fn set_optimistic_write_mode(&self, optimistic: bool) {
        self.state.optimistic_write_mode.set(optimistic);
    }

    /// Run operations without notifying watchers at all.
    pub fn silent<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = DepthGuard::enter(&self.state.silent_depth);
        f()
    }

    /// Append an optimistic update function and rebase. The function
    /// is replayed on every rebase; operations inside it default to
    /// optimistic writes. Returns an id for [`Cache::remove_optimistic_update`].
    pub fn add_optimistic_update(
        &self,
        update: impl Fn(&Cache) -> CacheResult<()> + 'static,
    ) -> u64 {
        let id = self.state.next_update_id.get();
        self.state.next_update_id.set(id + 1);
        self.state
            .optimistic_updates
            .borrow_mut()
            .push(OptimisticUpdate { id, update: Rc::new(update) });
        self.transaction(|| {
            self.rebase();
            self.invalidate_read_results();
        });
        id
    }

    /// Remove one optimistic update function and rebase.
    pub fn remove_optimistic_update(&self, id: u64) {
        let removed = {
            let mut updates = self.state.optimistic_updates.borrow_mut();
            let before = updates.len();
            updates.retain(|update| update.id != id);
            updates.len() != before
        };
        if removed {
            self.transaction(|| {
                self.rebase();
                self.invalidate_read_results();
            });
        }
    }

    /// Drop every optimistic update function and the overlay.
    pub fn remove_optimistic_updates(&self) {
        self.state.optimistic_updates.borrow_mut().clear();
        self.transaction(|| {
            self.rebase();
            self.invalidate_read_results();
        });
    }

    /// Pin an entity so garbage collection keeps it and everything
    /// reachable from it. The guard releases only through
    /// [`RetainGuard::release`]; dropping it keeps the pin.
    pub fn retain(&self, id: impl Into<EntityId>) -> RetainGuard {
        let id = id.into();
        *self.state.retained.borrow_mut().entry(id.clone()).or_insert(0) += 1;
        RetainGuard { state: Rc::clone(&self.state), id, released: Cell::new(false) }
    }

    /// Drop every committed entity not reachable from a retained or
    /// watched entity. Returns the removed ids.
    pub fn gc(&self) -> Vec<EntityId> {
        let mut roots: Vec<EntityId> =
            self.state.retained.borrow().keys().cloned().collect();
        for entry in self.state.watches.borrow().iter() {
            if let Ok(Some(id)) =
                self.root_entity_id(&entry.request.ty, entry.request.id.as_ref())
            {
                roots.push(id);
            }
        }
        let removed = {
            let mut store = self.state.store.borrow_mut();
            let mut marked = HashSet::new();
            while let Some(id) = roots.pop() {
                if !marked.insert(id.clone()) {
                    continue;
                }
                if let Some(entity) = store.get(&id, false) {
                    collect_refs(&entity.value, &mut roots);
                }
            }
            let removed: Vec<EntityId> = store
                .base_ids()
                .into_iter()
                .filter(|id| !marked.contains(id))
                .collect();
            for id in &removed {
                store.remove_base(id);
            }
            removed
        };
        for cached in self.state.read_results.borrow_mut().values_mut() {
            cached.invalidated = true;
        }
        tracing::debug!(removed = removed.len(), "gc");
        removed
    }

    /// Copy the stored entities out, optionally with the optimistic
    /// overlay.
    #[must_use]
    pub fn extract(&self, include_optimistic: bool) -> Snapshot {
        let store = self.state.store.borrow();
        let mut entities: Vec<Entity> =
            store.base_entries().map(|(_, entity)| (**entity).clone()).collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        let mut optimistic = Vec::new();
        if include_optimistic {
            optimistic = store
                .overlay_entries()
                .map(|(id, entity)| OverlayEntry {
                    id: id.clone(),
                    entity: entity.map(|entity| (**entity).clone()),
                })
                .collect();
            optimistic.sort_by(|a, b| a.id.cmp(&b.id));
        }
        Snapshot { entities, optimistic }
    }

    /// Load entities from a snapshot over the current contents and
    /// re-evaluate watchers.
    pub fn restore(&self, snapshot: Snapshot) {
        {
            let mut store = self.state.store.borrow_mut();
            for entity in snapshot.entities {
                store.set(entity, false);
            }
            for entry in snapshot.optimistic {
                match entry.entity {
                    Some(entity) => {
                        store.set(entity, true);
                    }
                    None => {
                        store.delete(&entry.id, true);
                    }
                }
            }
        }
        self.transaction(|| self.invalidate_read_results());
    }

    /// Fetch a stored entity directly.
    #[must_use]
    pub fn get(&self, id: &EntityId, optimistic: bool) -> Option<Entity> {
        self.state.store.borrow().get(id, optimistic).map(|entity| (*entity).clone())
    }

    /// Store an entity directly, bypassing normalization. Reads and
    /// watchers observe the change like any write.
    pub fn set(&self, entity: Entity, optimistic: bool) {
        let (_, changed) = self.state.store.borrow_mut().set(entity, optimistic);
        if changed {
            self.handle_updated_entities(optimistic);
        }
    }

    /// Drop all stored entities, overlay state, and cached reads.
    pub fn reset(&self) {
        *self.state.store.borrow_mut() = EntityStore::new();
        self.state.read_results.borrow_mut().clear();
        self.state.optimistic_updates.borrow_mut().clear();
        self.transaction(|| {
            if self.state.silent_depth.get() == 0 {
                self.state.dirty.set(true);
            }
        });
    }

    fn handle_updated_entities(&self, optimistic: bool) {
        self.transaction(|| {
            if !optimistic {
                self.rebase();
            }
            self.invalidate_read_results();
        });
    }

    // Rebuild the optimistic overlay from scratch by replaying every
    // update function against the current base.
    fn rebase(&self) {
        self.state.store.borrow_mut().clear_overlay();
        let updates: Vec<OptimisticUpdate> =
            self.state.optimistic_updates.borrow().clone();
        if updates.is_empty() {
            return;
        }
        tracing::debug!(updates = updates.len(), "rebase");
        self.transaction(|| {
            let _guard = WriteModeGuard::engage(&self.state.optimistic_write_mode);
            for update in &updates {
                if let Err(error) = (update.update)(self) {
                    tracing::warn!(%error, id = update.id, "optimistic update failed during rebase");
                }
            }
        });
    }

    fn invalidate_read_results(&self) {
        for cached in self.state.read_results.borrow_mut().values_mut() {
            cached.invalidated = true;
        }
        if self.state.silent_depth.get() > 0 {
            return;
        }
        if self.state.transaction_depth.get() > 0 {
            self.state.dirty.set(true);
        } else {
            self.update_watchers();
        }
    }

    fn update_watchers(&self) {
        let entries: Vec<Rc<WatchEntry>> = self.state.watches.borrow().clone();
        for entry in entries {
            let next = match self.read(&entry.request) {
                Ok(next) => next,
                Err(error) => {
                    tracing::warn!(%error, watch = entry.id, "watch re-read failed");
                    continue;
                }
            };
            let changed = *entry.prev.borrow() != next;
            if changed {
                let prev = entry.prev.replace(next.clone());
                (entry.callback)(next.as_ref(), prev.as_ref());
            }
        }
    }
}

/// Unsubscribes a watch registered with [`Cache::watch`].
pub struct WatchHandle {
    state: Rc<CacheState>,
    id: u64,
}

impl WatchHandle {
    /// Stop watching. Idempotent.
    pub fn unsubscribe(&self) {
        self.state.watches.borrow_mut().retain(|entry| entry.id != self.id);
    }
}

/// Pins an entity against garbage collection. Dropping the guard does
/// not release the pin; call [`RetainGuard::release`].
pub struct RetainGuard {
    state: Rc<CacheState>,
    id: EntityId,
    released: Cell<bool>,
}

impl RetainGuard {
    /// The pinned entity id.
    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        &self.id
    }

    /// Release the pin. Idempotent: releasing twice decrements the
    /// reference count only once.
    pub fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        let mut retained = self.state.retained.borrow_mut();
        if let Some(count) = retained.get_mut(&self.id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                retained.remove(&self.id);
            }
        }
    }
}

fn collect_refs(value: &Value, out: &mut Vec<EntityId>) {
    match value {
        Value::Ref(id) => out.push(id.clone()),
        Value::Array(items) => {
            for item in items.iter() {
                collect_refs(item, out);
            }
        }
        Value::Object(object) => {
            for field in object.fields.values() {
                collect_refs(field, out);
            }
        }
        _ => {}
    }
}
