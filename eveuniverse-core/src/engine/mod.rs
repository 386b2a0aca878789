//! Synchronization engine: get-or-fetch of entities by ID.
//!
//! Responsibilities:
//! - Resolve single entities, bulk ID sets and whole kinds against the
//!   store, falling back to the remote [`EntitySource`].
//! - Persist the normalized record before any child or inline row, then
//!   expand children either depth-first or by enqueuing [`UnitOfWork`]s.
//!
//! Boundaries:
//! - The engine runs on one thread of control. Concurrency only comes from
//!   work handed to the [`AsyncExecutor`].
//! - Kind-specific behaviour is selected by the descriptor's
//!   [`ExpansionStrategy`](crate::schema::ExpansionStrategy); the generic
//!   path never tests for a particular kind.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;

use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::mapper::{self, ForeignKeyResolver};
use crate::market::PriceSource;
use crate::record::{EntityId, EntityRecord, InlineRecord, RawRecord, Upserted};
use crate::schema::{
    EntityDescriptor, EntityKind, SchemaError, SchemaRegistry, Section, SectionSet,
};
use crate::source::{EntitySource, SourceError, SupplementaryDataSource};
use crate::store::{Store, StoreError};
use crate::tasks::{AsyncExecutor, ExecutorError, Task, UnitOfWork};

mod expansion;
mod loaders;

#[cfg(test)]
mod tests;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The remote has no record for the requested identity.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Requested kind.
        kind: EntityKind,
        /// Requested identity.
        id: EntityId,
    },
    /// A structural assumption about the remote data was violated.
    #[error("data integrity error for {kind} {id}: {reason}")]
    DataIntegrity {
        /// Kind being resolved.
        kind: EntityKind,
        /// Identity being resolved.
        id: EntityId,
        /// What was missing or inconsistent.
        reason: String,
    },
    /// `(kind, id)` is already being resolved further up the call chain.
    #[error("{kind} {id} is already being resolved")]
    Reentrant {
        /// Kind being resolved.
        kind: EntityKind,
        /// Identity being resolved.
        id: EntityId,
    },
    /// The schema registry is misdeclared.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// The remote source failed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Background work could not be scheduled.
    #[error("failed to schedule background work")]
    Executor(#[from] ExecutorError),
    /// The kind cannot be enumerated.
    #[error("{kind} has no list endpoint")]
    MissingListEndpoint {
        /// Kind without a list endpoint.
        kind: EntityKind,
    },
    /// The kind cannot be fetched by ID.
    #[error("{kind} has no object endpoint")]
    MissingObjectEndpoint {
        /// Kind without an object endpoint.
        kind: EntityKind,
    },
    /// A supplementary section was requested without a dataset source.
    #[error("section {section} requires a supplementary data source")]
    MissingSupplementarySource {
        /// Requested section.
        section: Section,
    },
    /// Market prices were requested without a price source.
    #[error("no market price source configured")]
    MissingPriceSource,
    /// Named-entity work was requested without a name resolver.
    #[error("no name source configured")]
    MissingNameSource,
    /// The remote category list was empty.
    #[error("remote returned no inventory categories")]
    NoCategories,
    /// A task payload could not be encoded.
    #[error("failed to encode task payload")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether a later retry of the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Source(source) => source.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn integrity(kind: EntityKind, id: EntityId, reason: impl Into<String>) -> Self {
        Self::DataIntegrity {
            kind,
            id,
            reason: reason.into(),
        }
    }
}

/// Per-call expansion options.
///
/// # Examples
///
/// ```
/// use eveuniverse_core::{Section, SectionSet, SyncOptions};
///
/// let options = SyncOptions::default()
///     .with_children()
///     .with_sections(SectionSet::from_iter([Section::Planets]));
/// assert!(options.include_children);
/// assert!(options.wait_for_children);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Expand declared children after persisting.
    pub include_children: bool,
    /// Expand children on the calling thread instead of enqueuing work.
    pub wait_for_children: bool,
    /// Sections requested on top of the configured defaults.
    pub sections: SectionSet,
    /// Priority of enqueued work; the configured task priority when unset.
    pub priority: Option<u8>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            include_children: false,
            wait_for_children: true,
            sections: SectionSet::EMPTY,
            priority: None,
        }
    }
}

impl SyncOptions {
    /// Also expand children.
    #[must_use]
    pub const fn with_children(mut self) -> Self {
        self.include_children = true;
        self
    }

    /// Enqueue child expansion instead of running it inline.
    #[must_use]
    pub const fn without_waiting(mut self) -> Self {
        self.wait_for_children = false;
        self
    }

    /// Request `sections`.
    #[must_use]
    pub const fn with_sections(mut self, sections: SectionSet) -> Self {
        self.sections = sections;
        self
    }

    /// Schedule enqueued work at `priority`.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Resolves entities against a [`Store`] and an [`EntitySource`].
pub struct SyncEngine<'a> {
    registry: SchemaRegistry,
    store: &'a dyn Store,
    source: &'a dyn EntitySource,
    executor: &'a dyn AsyncExecutor,
    supplementary: Option<&'a dyn SupplementaryDataSource>,
    prices: Option<&'a dyn PriceSource>,
    config: EngineConfig,
    in_flight: RefCell<BTreeSet<(EntityKind, EntityId)>>,
}

impl fmt::Debug for SyncEngine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("supplementary", &self.supplementary.is_some())
            .field("prices", &self.prices.is_some())
            .finish_non_exhaustive()
    }
}

struct InFlight<'g> {
    set: &'g RefCell<BTreeSet<(EntityKind, EntityId)>>,
    key: (EntityKind, EntityId),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.borrow_mut().remove(&self.key);
    }
}

impl<'a> SyncEngine<'a> {
    /// Engine over the standard schema registry.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Schema`] when the built-in registry is
    /// misdeclared.
    pub fn new(
        store: &'a dyn Store,
        source: &'a dyn EntitySource,
        executor: &'a dyn AsyncExecutor,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            registry: SchemaRegistry::standard()?,
            store,
            source,
            executor,
            supplementary: None,
            prices: None,
            config,
            in_flight: RefCell::new(BTreeSet::new()),
        })
    }

    /// Replace the schema registry.
    #[must_use]
    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Source for the material and industry sections of inventory types.
    #[must_use]
    pub fn with_supplementary(mut self, source: &'a dyn SupplementaryDataSource) -> Self {
        self.supplementary = Some(source);
        self
    }

    /// Source for market price refreshes.
    #[must_use]
    pub fn with_prices(mut self, source: &'a dyn PriceSource) -> Self {
        self.prices = Some(source);
        self
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Schema registry in use.
    #[must_use]
    pub const fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Backing store.
    #[must_use]
    pub fn store(&self) -> &'a dyn Store {
        self.store
    }

    /// Stored entity `(kind, id)` with its loaded sections covering the
    /// requested ones, fetching it remotely otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when the remote has no such record,
    /// and any store, source or integrity failure of the fetch.
    pub fn get_or_create(
        &self,
        kind: EntityKind,
        id: EntityId,
        options: &SyncOptions,
    ) -> Result<(EntityRecord, bool), EngineError> {
        let descriptor = self.registry.schema_for(kind)?;
        let required =
            descriptor.relevant_sections(self.config.effective_sections(options.sections));
        if let Some(record) = self.store.covered_entity(kind, id, required)? {
            return Ok((record, false));
        }
        self.update_or_create(kind, id, options)
    }

    /// Fetch `(kind, id)` remotely, persist it and expand it.
    ///
    /// The record is written before inline rows and children. Expansion
    /// failures are returned but leave the written record in place.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when the remote has no such record,
    /// [`EngineError::Reentrant`] when the same entity is already being
    /// resolved, and any store, source or integrity failure.
    pub fn update_or_create(
        &self,
        kind: EntityKind,
        id: EntityId,
        options: &SyncOptions,
    ) -> Result<(EntityRecord, bool), EngineError> {
        let descriptor = self.registry.schema_for(kind)?;
        let _guard = self.enter(kind, id)?;
        let sections = self.config.effective_sections(options.sections);
        let expands_children =
            options.include_children && !descriptor.children(sections).is_empty();
        let raw = self.fetch_record(descriptor, id, expands_children)?;
        debug!("fetched {kind} {id}");
        let fields = mapper::normalize(&raw, descriptor, sections, self)?;
        let upserted = self.store.upsert_entity(
            kind,
            id,
            &fields,
            descriptor.relevant_sections(sections),
            Utc::now(),
        )?;
        self.expand_inline_objects(descriptor, id, &raw, sections, options)?;
        if options.include_children {
            self.expand_children(descriptor, &raw, sections, options)?;
        }
        self.apply_strategy(descriptor, &upserted.record, &raw, sections)?;
        Ok((upserted.record, upserted.created))
    }

    /// Entities of `kind` for every ID in `ids`, fetching the missing ones.
    ///
    /// IDs already stored with sufficient sections are not fetched. The
    /// result is sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns the first failure of a missing entity's fetch.
    pub fn bulk_get_or_create(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        options: &SyncOptions,
    ) -> Result<Vec<EntityRecord>, EngineError> {
        let descriptor = self.registry.schema_for(kind)?;
        let required =
            descriptor.relevant_sections(self.config.effective_sections(options.sections));
        let wanted: BTreeSet<EntityId> = ids.iter().copied().collect();
        let wanted: Vec<EntityId> = wanted.into_iter().collect();
        let present = self.store.covered_ids(kind, &wanted, required)?;
        for id in wanted.iter().filter(|id| !present.contains(id)) {
            self.update_or_create(kind, *id, options)?;
        }
        Ok(self.store.entities(kind, &wanted)?)
    }

    /// Fetch and persist every entity of `kind`.
    ///
    /// List-only kinds are written straight from the single list response
    /// without expansion. Other kinds enumerate IDs and resolve each one, or
    /// enqueue one unit per ID when not waiting. Returns the number of IDs
    /// handled.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingListEndpoint`] when the kind cannot be
    /// enumerated, and any failure while resolving synchronously.
    pub fn update_or_create_all(
        &self,
        kind: EntityKind,
        options: &SyncOptions,
    ) -> Result<usize, EngineError> {
        let descriptor = self.registry.schema_for(kind)?;
        if descriptor.list_endpoint.is_none() {
            return Err(EngineError::MissingListEndpoint { kind });
        }
        let listed = self.source.fetch_list(descriptor)?;
        if descriptor.is_list_only_endpoint() {
            return self.persist_list_rows(descriptor, &listed, options);
        }
        let ids = loaders::listed_ids(descriptor, &listed);
        for id in &ids {
            if options.wait_for_children {
                self.update_or_create(kind, *id, options)?;
            } else {
                self.enqueue(
                    Task::UpdateOrCreate {
                        kind,
                        id: *id,
                        options: *options,
                    },
                    options,
                )?;
            }
        }
        Ok(ids.len())
    }

    fn persist_list_rows(
        &self,
        descriptor: &EntityDescriptor,
        rows: &[serde_json::Value],
        options: &SyncOptions,
    ) -> Result<usize, EngineError> {
        let sections = self.config.effective_sections(options.sections);
        let mut written = 0;
        for row in rows {
            let Some(raw) = row.as_object() else {
                continue;
            };
            let Some(id) = raw.get(descriptor.identity).and_then(mapper::as_id) else {
                continue;
            };
            let fields = mapper::normalize(raw, descriptor, sections, self)?;
            self.store.upsert_entity(
                descriptor.kind,
                id,
                &fields,
                descriptor.relevant_sections(sections),
                Utc::now(),
            )?;
            written += 1;
        }
        debug!("wrote {written} {} rows from list", descriptor.kind);
        Ok(written)
    }

    /// Persist one dependent row taken from its parent's response.
    ///
    /// The parent must already be stored. The non-parent half of the
    /// functional key is resolved first; when it is a foreign key its target
    /// is created on demand.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DataIntegrity`] when the parent is not stored or
    /// the row lacks its functional key.
    pub fn update_or_create_inline(
        &self,
        kind: EntityKind,
        parent_id: EntityId,
        raw: &RawRecord,
        sections: SectionSet,
    ) -> Result<Upserted<InlineRecord>, EngineError> {
        let descriptor = self.registry.schema_for(kind)?;
        self.upsert_inline_row(descriptor, parent_id, raw, self.config.effective_sections(sections))
    }

    pub(crate) fn enqueue(&self, task: Task, options: &SyncOptions) -> Result<(), EngineError> {
        let priority = options.priority.unwrap_or(self.config.tasks_priority);
        self.executor.enqueue(UnitOfWork::new(task, priority))?;
        Ok(())
    }

    fn enter(&self, kind: EntityKind, id: EntityId) -> Result<InFlight<'_>, EngineError> {
        if !self.in_flight.borrow_mut().insert((kind, id)) {
            return Err(EngineError::Reentrant { kind, id });
        }
        Ok(InFlight {
            set: &self.in_flight,
            key: (kind, id),
        })
    }
}

impl ForeignKeyResolver for SyncEngine<'_> {
    fn exists(&self, kind: EntityKind, id: EntityId) -> Result<bool, StoreError> {
        Ok(self.store.entity(kind, id)?.is_some())
    }

    fn auto_create(&self, kind: EntityKind, id: EntityId) -> Result<(), EngineError> {
        self.get_or_create(kind, id, &SyncOptions::default())
            .map(|_| ())
    }
}
