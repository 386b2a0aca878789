//! In-memory doubles for the engine's capabilities, used by unit and
//! behaviour tests.
//!
//! Everything here records what it was asked so tests can assert on call
//! counts and write order.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::market::{MarketPrice, PriceEntry, PriceSource, plan_refresh};
use crate::names::NamedEntity;
use crate::projections::{CelestialHit, RouteOracle, SpatialOracle};
use crate::record::{
    EntityId, EntityRecord, Fields, InlineRecord, NaturalKey, RawRecord, Upserted, merge_fields,
};
use crate::schema::{EntityDescriptor, EntityKind, SectionSet};
use crate::source::{
    EntitySource, NameSource, ResolvedName, SourceError, SupplementaryDataSource,
    SupplementaryResource,
};
use crate::store::{Store, StoreError};
use crate::tasks::{AdvisoryLock, AsyncExecutor, ExecutorError, MemoryLock, UnitOfWork};

#[derive(Debug, Default)]
struct MemoryState {
    entities: BTreeMap<(EntityKind, EntityId), EntityRecord>,
    inline: BTreeMap<(EntityKind, EntityId, NaturalKey), InlineRecord>,
    services: BTreeMap<EntityId, BTreeSet<String>>,
    supplementary: HashMap<(SupplementaryResource, EntityId), Vec<RawRecord>>,
    prices: BTreeMap<EntityId, MarketPrice>,
    named: BTreeMap<EntityId, NamedEntity>,
}

/// In-memory [`Store`] and [`AdvisoryLock`].
///
/// The store performs linear scans and is intended only for small datasets.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RefCell<MemoryState>,
    writes: RefCell<Vec<(EntityKind, EntityId)>>,
    locks: MemoryLock,
    fail_price_refresh: Cell<bool>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity upserts in the order they happened.
    #[must_use]
    pub fn writes(&self) -> Vec<(EntityKind, EntityId)> {
        self.writes.borrow().clone()
    }

    /// Number of stored entities of `kind`.
    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        self.state
            .borrow()
            .entities
            .keys()
            .filter(|(stored, _)| *stored == kind)
            .count()
    }

    /// Insert `record` directly, bypassing the write log.
    pub fn seed(&self, record: EntityRecord) {
        self.state
            .borrow_mut()
            .entities
            .insert((record.kind, record.id), record);
    }

    /// Insert a price directly.
    pub fn seed_price(&self, price: MarketPrice) {
        self.state.borrow_mut().prices.insert(price.type_id, price);
    }

    /// Every stored price, sorted by type ID.
    #[must_use]
    pub fn prices(&self) -> Vec<MarketPrice> {
        self.state.borrow().prices.values().cloned().collect()
    }

    /// Make the next price refresh fail before writing anything.
    pub fn fail_next_price_refresh(&self) {
        self.fail_price_refresh.set(true);
    }

    /// Whether the advisory lock `key` is held.
    #[must_use]
    pub fn is_locked(&self, key: &str) -> bool {
        self.locks.is_held(key)
    }
}

impl Store for MemoryStore {
    fn entity(&self, kind: EntityKind, id: EntityId) -> Result<Option<EntityRecord>, StoreError> {
        Ok(self.state.borrow().entities.get(&(kind, id)).cloned())
    }

    fn covered_ids(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        required: SectionSet,
    ) -> Result<BTreeSet<EntityId>, StoreError> {
        let state = self.state.borrow();
        Ok(ids
            .iter()
            .copied()
            .filter(|id| {
                state
                    .entities
                    .get(&(kind, *id))
                    .is_some_and(|record| record.sections.covers(required))
            })
            .collect())
    }

    fn entities(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
    ) -> Result<Vec<EntityRecord>, StoreError> {
        let wanted: BTreeSet<EntityId> = ids.iter().copied().collect();
        let state = self.state.borrow();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.entities.get(&(kind, id)).cloned())
            .collect())
    }

    fn entity_ids(&self, kind: EntityKind) -> Result<Vec<EntityId>, StoreError> {
        Ok(self
            .state
            .borrow()
            .entities
            .keys()
            .filter(|(stored, _)| *stored == kind)
            .map(|(_, id)| *id)
            .collect())
    }

    fn referencing_entities(
        &self,
        kind: EntityKind,
        field: &str,
        target: EntityId,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        Ok(self
            .state
            .borrow()
            .entities
            .values()
            .filter(|record| record.kind == kind && record.foreign_key(field) == Some(target))
            .cloned()
            .collect())
    }

    fn upsert_entity(
        &self,
        kind: EntityKind,
        id: EntityId,
        fields: &Fields,
        sections: SectionSet,
        synced_at: DateTime<Utc>,
    ) -> Result<Upserted<EntityRecord>, StoreError> {
        self.writes.borrow_mut().push((kind, id));
        let mut state = self.state.borrow_mut();
        let created = !state.entities.contains_key(&(kind, id));
        let record = state
            .entities
            .entry((kind, id))
            .or_insert_with(|| EntityRecord {
                kind,
                id,
                fields: Fields::new(),
                sections: SectionSet::EMPTY,
                last_updated: synced_at,
            });
        merge_fields(&mut record.fields, fields);
        record.sections = record.sections.union(sections);
        record.last_updated = synced_at;
        Ok(Upserted {
            record: record.clone(),
            created,
        })
    }

    fn upsert_inline(
        &self,
        kind: EntityKind,
        parent_id: EntityId,
        other_key: &NaturalKey,
        fields: &Fields,
        synced_at: DateTime<Utc>,
    ) -> Result<Upserted<InlineRecord>, StoreError> {
        let mut state = self.state.borrow_mut();
        let key = (kind, parent_id, other_key.clone());
        let created = !state.inline.contains_key(&key);
        let record = state.inline.entry(key).or_insert_with(|| InlineRecord {
            kind,
            parent_id,
            other_key: other_key.clone(),
            fields: Fields::new(),
            last_updated: synced_at,
        });
        merge_fields(&mut record.fields, fields);
        record.last_updated = synced_at;
        Ok(Upserted {
            record: record.clone(),
            created,
        })
    }

    fn inline_records(
        &self,
        kind: EntityKind,
        parent_id: EntityId,
    ) -> Result<Vec<InlineRecord>, StoreError> {
        Ok(self
            .state
            .borrow()
            .inline
            .values()
            .filter(|record| record.kind == kind && record.parent_id == parent_id)
            .cloned()
            .collect())
    }

    fn add_station_services(
        &self,
        station_id: EntityId,
        names: &[String],
    ) -> Result<(), StoreError> {
        self.state
            .borrow_mut()
            .services
            .entry(station_id)
            .or_default()
            .extend(names.iter().cloned());
        Ok(())
    }

    fn station_services(&self, station_id: EntityId) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .borrow()
            .services
            .get(&station_id)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn replace_supplementary_rows(
        &self,
        resource: SupplementaryResource,
        type_id: EntityId,
        rows: &[RawRecord],
    ) -> Result<usize, StoreError> {
        self.state
            .borrow_mut()
            .supplementary
            .insert((resource, type_id), rows.to_vec());
        Ok(rows.len())
    }

    fn supplementary_rows(
        &self,
        resource: SupplementaryResource,
        type_id: EntityId,
    ) -> Result<Vec<RawRecord>, StoreError> {
        Ok(self
            .state
            .borrow()
            .supplementary
            .get(&(resource, type_id))
            .cloned()
            .unwrap_or_default())
    }

    fn refresh_market_prices(
        &self,
        entries: &[PriceEntry],
        fresh_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        if self.fail_price_refresh.replace(false) {
            return Err(StoreError::Corrupt {
                operation: "refresh_market_prices",
                message: "injected failure".to_owned(),
            });
        }
        let mut state = self.state.borrow_mut();
        let known: HashSet<EntityId> = state
            .entities
            .keys()
            .filter(|(kind, _)| *kind == EntityKind::Type)
            .map(|(_, id)| *id)
            .collect();
        let stored: HashMap<EntityId, DateTime<Utc>> = state
            .prices
            .values()
            .map(|price| (price.type_id, price.updated_at))
            .collect();
        let plan = plan_refresh(entries, &known, &stored, fresh_after, now);
        let written = plan.len();
        for price in plan {
            state.prices.insert(price.type_id, price);
        }
        Ok(written)
    }

    fn market_price(&self, type_id: EntityId) -> Result<Option<MarketPrice>, StoreError> {
        Ok(self.state.borrow().prices.get(&type_id).cloned())
    }

    fn named_entity(&self, id: EntityId) -> Result<Option<NamedEntity>, StoreError> {
        Ok(self.state.borrow().named.get(&id).cloned())
    }

    fn named_entities(&self, ids: &[EntityId]) -> Result<Vec<NamedEntity>, StoreError> {
        let wanted: BTreeSet<EntityId> = ids.iter().copied().collect();
        let state = self.state.borrow();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.named.get(&id).cloned())
            .collect())
    }

    fn upsert_named_entity(
        &self,
        entity: &NamedEntity,
        _synced_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .state
            .borrow_mut()
            .named
            .insert(entity.id, entity.clone())
            .is_none())
    }

    fn insert_named_placeholders(&self, ids: &[EntityId]) -> Result<usize, StoreError> {
        let mut state = self.state.borrow_mut();
        let mut created = 0;
        for id in ids {
            if !state.named.contains_key(id) {
                state.named.insert(*id, NamedEntity::unresolved(*id));
                created += 1;
            }
        }
        Ok(created)
    }

    fn named_entity_ids(&self, unresolved_only: bool) -> Result<Vec<EntityId>, StoreError> {
        Ok(self
            .state
            .borrow()
            .named
            .values()
            .filter(|entity| !unresolved_only || !entity.is_resolved())
            .map(|entity| entity.id)
            .collect())
    }
}

impl AdvisoryLock for MemoryStore {
    fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.locks.try_acquire(key, ttl)
    }

    fn release(&self, key: &str) -> Result<(), StoreError> {
        self.locks.release(key)
    }
}

/// Scripted [`EntitySource`] answering from canned JSON.
///
/// Unknown objects answer [`SourceError::NotFound`]. List-only kinds answer
/// object requests with their scripted list.
#[derive(Debug, Default)]
pub struct StubEntitySource {
    objects: RefCell<HashMap<(EntityKind, EntityId), Value>>,
    lists: RefCell<HashMap<EntityKind, Vec<Value>>>,
    failures: RefCell<HashMap<(EntityKind, EntityId), VecDeque<SourceError>>>,
    calls: RefCell<Vec<(EntityKind, Option<EntityId>)>>,
}

impl StubEntitySource {
    /// A source with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer object requests for `(kind, id)` with `body`.
    pub fn with_object(&self, kind: EntityKind, id: EntityId, body: Value) -> &Self {
        self.objects.borrow_mut().insert((kind, id), body);
        self
    }

    /// Answer list requests for `kind` with `rows`.
    pub fn with_list(&self, kind: EntityKind, rows: Vec<Value>) -> &Self {
        self.lists.borrow_mut().insert(kind, rows);
        self
    }

    /// Fail the next object request for `(kind, id)` with `error`.
    pub fn fail_once(&self, kind: EntityKind, id: EntityId, error: SourceError) -> &Self {
        self.failures
            .borrow_mut()
            .entry((kind, id))
            .or_default()
            .push_back(error);
        self
    }

    /// Every request so far; `None` marks a list request.
    #[must_use]
    pub fn calls(&self) -> Vec<(EntityKind, Option<EntityId>)> {
        self.calls.borrow().clone()
    }

    /// Number of object requests for `(kind, id)`.
    #[must_use]
    pub fn object_calls(&self, kind: EntityKind, id: EntityId) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| **call == (kind, Some(id)))
            .count()
    }

    fn scripted_list(&self, descriptor: &EntityDescriptor) -> Result<Vec<Value>, SourceError> {
        self.lists
            .borrow()
            .get(&descriptor.kind)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                path: descriptor.kind.as_str().to_owned(),
            })
    }
}

impl EntitySource for StubEntitySource {
    fn fetch_object(
        &self,
        descriptor: &EntityDescriptor,
        id: EntityId,
    ) -> Result<Value, SourceError> {
        self.calls.borrow_mut().push((descriptor.kind, Some(id)));
        if let Some(error) = self
            .failures
            .borrow_mut()
            .get_mut(&(descriptor.kind, id))
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        if descriptor.is_list_only_endpoint() {
            return self.scripted_list(descriptor).map(Value::Array);
        }
        self.objects
            .borrow()
            .get(&(descriptor.kind, id))
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                path: format!("{}/{id}", descriptor.kind),
            })
    }

    fn fetch_list(&self, descriptor: &EntityDescriptor) -> Result<Vec<Value>, SourceError> {
        self.calls.borrow_mut().push((descriptor.kind, None));
        self.scripted_list(descriptor)
    }
}

/// [`AsyncExecutor`] that records units instead of running them.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    units: RefCell<Vec<UnitOfWork>>,
    reject: Cell<bool>,
}

impl RecordingExecutor {
    /// An executor accepting every unit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An executor rejecting every unit.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            units: RefCell::default(),
            reject: Cell::new(true),
        }
    }

    /// Units enqueued so far.
    #[must_use]
    pub fn units(&self) -> Vec<UnitOfWork> {
        self.units.borrow().clone()
    }

    /// Names of the tasks enqueued so far.
    #[must_use]
    pub fn task_names(&self) -> Vec<&'static str> {
        self.units.borrow().iter().map(|unit| unit.task.name()).collect()
    }
}

impl AsyncExecutor for RecordingExecutor {
    fn enqueue(&self, unit: UnitOfWork) -> Result<(), ExecutorError> {
        if self.reject.get() {
            return Err(ExecutorError::Rejected {
                task: unit.task.name(),
                message: "executor is closed".to_owned(),
            });
        }
        self.units.borrow_mut().push(unit);
        Ok(())
    }
}

/// [`NameSource`] answering from a fixed table.
///
/// A batch containing an ID listed as invalid is rejected as a whole with
/// [`SourceError::NotFound`].
#[derive(Debug, Default)]
pub struct StubNameSource {
    names: HashMap<EntityId, ResolvedName>,
    invalid: HashSet<EntityId>,
    failing_name_batch: Option<usize>,
    id_calls: RefCell<Vec<Vec<EntityId>>>,
    name_calls: RefCell<Vec<Vec<String>>>,
}

impl StubNameSource {
    /// A source knowing `names`.
    #[must_use]
    pub fn new(names: impl IntoIterator<Item = ResolvedName>) -> Self {
        Self {
            names: names.into_iter().map(|name| (name.id, name)).collect(),
            ..Self::default()
        }
    }

    /// Reject any batch containing one of `ids`.
    #[must_use]
    pub fn with_invalid(mut self, ids: impl IntoIterator<Item = EntityId>) -> Self {
        self.invalid.extend(ids);
        self
    }

    /// Fail the name lookup batch with zero-based index `batch`.
    #[must_use]
    pub const fn failing_name_batch(mut self, batch: usize) -> Self {
        self.failing_name_batch = Some(batch);
        self
    }

    /// ID batches requested so far.
    #[must_use]
    pub fn id_calls(&self) -> Vec<Vec<EntityId>> {
        self.id_calls.borrow().clone()
    }

    /// Name batches requested so far.
    #[must_use]
    pub fn name_calls(&self) -> Vec<Vec<String>> {
        self.name_calls.borrow().clone()
    }
}

impl NameSource for StubNameSource {
    fn resolve_ids(&self, ids: &[EntityId]) -> Result<Vec<ResolvedName>, SourceError> {
        self.id_calls.borrow_mut().push(ids.to_vec());
        if ids.iter().any(|id| self.invalid.contains(id)) {
            return Err(SourceError::NotFound {
                path: "/universe/names/".to_owned(),
            });
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.names.get(id).cloned())
            .collect())
    }

    fn resolve_names(&self, names: &[String]) -> Result<Vec<ResolvedName>, SourceError> {
        let batch = self.name_calls.borrow().len();
        self.name_calls.borrow_mut().push(names.to_vec());
        if self.failing_name_batch == Some(batch) {
            return Err(SourceError::Transient {
                path: "/universe/ids/".to_owned(),
                message: "connection reset".to_owned(),
            });
        }
        Ok(self
            .names
            .values()
            .filter(|resolved| names.contains(&resolved.name))
            .cloned()
            .collect())
    }
}

/// [`PriceSource`] returning a fixed price list.
#[derive(Debug, Default)]
pub struct StubPriceSource {
    entries: Vec<PriceEntry>,
    calls: Cell<usize>,
}

impl StubPriceSource {
    /// A source publishing `entries`.
    #[must_use]
    pub const fn new(entries: Vec<PriceEntry>) -> Self {
        Self {
            entries,
            calls: Cell::new(0),
        }
    }

    /// Number of fetches so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl PriceSource for StubPriceSource {
    fn fetch_prices(&self) -> Result<Vec<PriceEntry>, SourceError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.entries.clone())
    }
}

/// [`SupplementaryDataSource`] answering from canned rows.
#[derive(Debug, Default)]
pub struct StubSupplementarySource {
    rows: HashMap<(SupplementaryResource, EntityId), Vec<RawRecord>>,
}

impl StubSupplementarySource {
    /// A source with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `resource` lookups for `type_id` with `rows`.
    #[must_use]
    pub fn with_rows(
        mut self,
        resource: SupplementaryResource,
        type_id: EntityId,
        rows: Vec<RawRecord>,
    ) -> Self {
        self.rows.insert((resource, type_id), rows);
        self
    }
}

impl SupplementaryDataSource for StubSupplementarySource {
    fn rows(
        &self,
        resource: SupplementaryResource,
        type_id: EntityId,
    ) -> Result<Vec<RawRecord>, SourceError> {
        Ok(self
            .rows
            .get(&(resource, type_id))
            .cloned()
            .unwrap_or_default())
    }
}

/// [`RouteOracle`] answering from a fixed table.
#[derive(Debug, Default)]
pub struct StubRouteOracle {
    routes: HashMap<(EntityId, EntityId), Vec<EntityId>>,
}

impl StubRouteOracle {
    /// An oracle knowing no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `origin` to `destination` with `path`.
    #[must_use]
    pub fn with_route(mut self, path: Vec<EntityId>) -> Self {
        if let (Some(origin), Some(destination)) = (path.first(), path.last()) {
            self.routes.insert((*origin, *destination), path.clone());
        }
        self
    }
}

impl RouteOracle for StubRouteOracle {
    fn route(
        &self,
        origin: EntityId,
        destination: EntityId,
    ) -> Result<Option<Vec<EntityId>>, SourceError> {
        Ok(self.routes.get(&(origin, destination)).cloned())
    }
}

/// [`SpatialOracle`] returning one fixed hit.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubSpatialOracle {
    hit: Option<CelestialHit>,
}

impl StubSpatialOracle {
    /// An oracle always answering `hit`.
    #[must_use]
    pub const fn new(hit: Option<CelestialHit>) -> Self {
        Self { hit }
    }
}

impl SpatialOracle for StubSpatialOracle {
    fn nearest_celestial(
        &self,
        _system_id: EntityId,
        _position: [f64; 3],
        group_id: Option<EntityId>,
    ) -> Result<Option<CelestialHit>, SourceError> {
        Ok(self
            .hit
            .filter(|hit| group_id.is_none_or(|group| hit.group_id == Some(group))))
    }
}

/// A record of `kind` holding `fields`, synced now.
#[must_use]
pub fn record(
    kind: EntityKind,
    id: EntityId,
    fields: Fields,
    sections: SectionSet,
) -> EntityRecord {
    EntityRecord {
        kind,
        id,
        fields,
        sections,
        last_updated: Utc::now(),
    }
}
