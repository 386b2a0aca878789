//! Flat registry of named entities outside the structural graph.
//!
//! Characters, corporations, alliances and other named things are stored as
//! `(id, name, category)` triples and resolved in bulk against a remote
//! names endpoint. ID resolution isolates invalid IDs by splitting rejected
//! pages; name resolution fails the whole call when one batch fails.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::engine::EngineError;
use crate::record::EntityId;
use crate::source::{NameSource, ResolvedName};
use crate::store::Store;

/// Maximum split depth when isolating invalid IDs.
pub const MAX_SPLIT_DEPTH: u8 = 5;

/// Category of a named entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    /// Player alliance.
    Alliance,
    /// Character.
    Character,
    /// Constellation.
    Constellation,
    /// Corporation.
    Corporation,
    /// NPC faction.
    Faction,
    /// Inventory type.
    InventoryType,
    /// Region.
    Region,
    /// Solar system.
    SolarSystem,
    /// Station.
    Station,
}

impl EntityCategory {
    /// All categories.
    pub const ALL: [Self; 9] = [
        Self::Alliance,
        Self::Character,
        Self::Constellation,
        Self::Corporation,
        Self::Faction,
        Self::InventoryType,
        Self::Region,
        Self::SolarSystem,
        Self::Station,
    ];

    /// Name used by the remote API and in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alliance => "alliance",
            Self::Character => "character",
            Self::Constellation => "constellation",
            Self::Corporation => "corporation",
            Self::Faction => "faction",
            Self::InventoryType => "inventory_type",
            Self::Region => "region",
            Self::SolarSystem => "solar_system",
            Self::Station => "station",
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entity category '{name}'")]
pub struct ParseCategoryError {
    /// The rejected input.
    pub name: String,
}

impl FromStr for EntityCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| ParseCategoryError { name: s.to_owned() })
    }
}

const NPC_STARTER_CORPORATIONS: [EntityId; 12] = [
    1_000_044, 1_000_045, 1_000_077, 1_000_115, 1_000_165, 1_000_166, 1_000_167, 1_000_168,
    1_000_169, 1_000_170, 1_000_171, 1_000_172,
];

/// A stored named entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    /// Entity ID.
    pub id: EntityId,
    /// Display name, empty while unresolved.
    pub name: String,
    /// Category, unknown while unresolved.
    pub category: Option<EntityCategory>,
    /// Time of the last successful resolution.
    pub last_updated: Option<DateTime<Utc>>,
}

impl NamedEntity {
    /// A bare row awaiting resolution.
    #[must_use]
    pub const fn unresolved(id: EntityId) -> Self {
        Self {
            id,
            name: String::new(),
            category: None,
            last_updated: None,
        }
    }

    /// Whether the name has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !self.name.is_empty()
    }

    fn is(&self, category: EntityCategory) -> bool {
        self.category == Some(category)
    }

    /// Whether this is an alliance.
    #[must_use]
    pub fn is_alliance(&self) -> bool {
        self.is(EntityCategory::Alliance)
    }

    /// Whether this is a character.
    #[must_use]
    pub fn is_character(&self) -> bool {
        self.is(EntityCategory::Character)
    }

    /// Whether this is a constellation.
    #[must_use]
    pub fn is_constellation(&self) -> bool {
        self.is(EntityCategory::Constellation)
    }

    /// Whether this is a corporation.
    #[must_use]
    pub fn is_corporation(&self) -> bool {
        self.is(EntityCategory::Corporation)
    }

    /// Whether this is a faction.
    #[must_use]
    pub fn is_faction(&self) -> bool {
        self.is(EntityCategory::Faction)
    }

    /// Whether this is an inventory type.
    #[must_use]
    pub fn is_type(&self) -> bool {
        self.is(EntityCategory::InventoryType)
    }

    /// Whether this is a region.
    #[must_use]
    pub fn is_region(&self) -> bool {
        self.is(EntityCategory::Region)
    }

    /// Whether this is a solar system.
    #[must_use]
    pub fn is_solar_system(&self) -> bool {
        self.is(EntityCategory::SolarSystem)
    }

    /// Whether this is a station.
    #[must_use]
    pub fn is_station(&self) -> bool {
        self.is(EntityCategory::Station)
    }

    /// Whether this is an NPC corporation or character.
    #[must_use]
    pub fn is_npc(&self) -> bool {
        (self.is_corporation() && (1_000_000..2_000_000).contains(&self.id))
            || (self.is_character() && (3_000_000..4_000_000).contains(&self.id))
    }

    /// Whether this is one of the corporations new characters start in.
    #[must_use]
    pub fn is_npc_starter_corporation(&self) -> bool {
        self.is_corporation() && NPC_STARTER_CORPORATIONS.contains(&self.id)
    }
}

impl From<ResolvedName> for NamedEntity {
    fn from(resolved: ResolvedName) -> Self {
        Self {
            id: resolved.id,
            name: resolved.name,
            category: Some(resolved.category),
            last_updated: None,
        }
    }
}

/// Snapshot of names for a set of IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityNameResolver {
    names: HashMap<EntityId, String>,
}

impl EntityNameResolver {
    /// Name of `id`, empty when unknown.
    #[must_use]
    pub fn to_name(&self, id: EntityId) -> &str {
        self.names.get(&id).map(String::as_str).unwrap_or_default()
    }

    /// Number of known names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no names are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// IDs that may be sent to the remote names endpoint.
#[must_use]
pub fn is_valid_id(id: EntityId) -> bool {
    id > 1
}

/// Resolves named entities against the store and a [`NameSource`].
pub struct NameResolver<'a> {
    store: &'a dyn Store,
    source: &'a dyn NameSource,
    page_size: usize,
    batch_size: usize,
}

impl fmt::Debug for NameResolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameResolver")
            .field("page_size", &self.page_size)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl<'a> NameResolver<'a> {
    /// Construct a resolver using the paging limits of `config`.
    #[must_use]
    pub fn new(store: &'a dyn Store, source: &'a dyn NameSource, config: &EngineConfig) -> Self {
        Self {
            store,
            source,
            page_size: config.names_page_size.max(1),
            batch_size: config.names_batch_size.max(1),
        }
    }

    /// Stored name of `id`, empty when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the lookup fails.
    pub fn resolve_name(&self, id: EntityId) -> Result<String, EngineError> {
        Ok(self
            .store
            .named_entity(id)?
            .map(|entity| entity.name)
            .unwrap_or_default())
    }

    /// Ensure every valid ID in `ids` is stored and resolved, then return a
    /// snapshot of their names.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the store or the remote fails.
    pub fn bulk_resolve_names(&self, ids: &[EntityId]) -> Result<EntityNameResolver, EngineError> {
        self.bulk_create(ids)?;
        let unresolved: Vec<EntityId> = self
            .store
            .named_entities(ids)?
            .into_iter()
            .filter(|entity| !entity.is_resolved())
            .map(|entity| entity.id)
            .collect();
        if !unresolved.is_empty() {
            self.update_from_esi(&unresolved)?;
        }
        let names = self
            .store
            .named_entities(ids)?
            .into_iter()
            .map(|entity| (entity.id, entity.name))
            .collect();
        Ok(EntityNameResolver { names })
    }

    /// Stored entity `id`, resolving it remotely when absent.
    ///
    /// Returns `None` when the ID is invalid or the remote does not know it.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the store or the remote fails.
    pub fn get_or_create(&self, id: EntityId) -> Result<Option<(NamedEntity, bool)>, EngineError> {
        match self.store.named_entity(id)? {
            Some(entity) => Ok(Some((entity, false))),
            None => self.update_or_create(id),
        }
    }

    /// Resolve `id` remotely and store the result.
    ///
    /// Returns `None` when the ID is invalid or the remote does not know it.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the store or the remote fails.
    pub fn update_or_create(
        &self,
        id: EntityId,
    ) -> Result<Option<(NamedEntity, bool)>, EngineError> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let resolved = match self.source.resolve_ids(&[id]) {
            Ok(resolved) => resolved,
            Err(err) if err.is_not_found() => {
                warn!("remote rejected named entity {id}");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let Some(found) = resolved.into_iter().find(|name| name.id == id) else {
            return Ok(None);
        };
        let now = Utc::now();
        let mut entity = NamedEntity::from(found);
        entity.last_updated = Some(now);
        let created = self.store.upsert_named_entity(&entity, now)?;
        Ok(Some((entity, created)))
    }

    /// Store and resolve every valid ID of `ids` not yet known.
    ///
    /// Returns the number of rows created.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the store or the remote fails.
    pub fn bulk_create(&self, ids: &[EntityId]) -> Result<usize, EngineError> {
        let wanted: BTreeSet<EntityId> =
            ids.iter().copied().filter(|id| is_valid_id(*id)).collect();
        let wanted: Vec<EntityId> = wanted.into_iter().collect();
        let known: BTreeSet<EntityId> = self
            .store
            .named_entities(&wanted)?
            .into_iter()
            .map(|entity| entity.id)
            .collect();
        let new_ids: Vec<EntityId> = wanted
            .into_iter()
            .filter(|id| !known.contains(id))
            .collect();
        if new_ids.is_empty() {
            return Ok(0);
        }
        let created = self.store.insert_named_placeholders(&new_ids)?;
        self.update_from_esi(&new_ids)?;
        Ok(created)
    }

    /// Resolve every stored entity that has no name yet.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the store or the remote fails.
    pub fn bulk_update_new(&self) -> Result<usize, EngineError> {
        let ids = self.store.named_entity_ids(true)?;
        self.update_from_esi(&ids)
    }

    /// Re-resolve every stored entity.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the store or the remote fails.
    pub fn bulk_update_all(&self) -> Result<usize, EngineError> {
        let ids = self.store.named_entity_ids(false)?;
        self.update_from_esi(&ids)
    }

    /// Resolve `ids` in pages and store every returned triple.
    ///
    /// IDs `<= 1` are never sent. A page rejected as invalid is split in
    /// halves until the offending IDs are isolated and dropped. Returns the
    /// number of entities resolved.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] for store failures and for remote failures
    /// other than a rejected page.
    pub fn update_from_esi(&self, ids: &[EntityId]) -> Result<usize, EngineError> {
        let ids: Vec<EntityId> = ids
            .iter()
            .copied()
            .filter(|id| is_valid_id(*id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        info!("resolving names for {} entities", ids.len());
        let mut resolved = Vec::new();
        for page in ids.chunks(self.page_size) {
            self.resolve_page(page, 0, &mut resolved)?;
        }
        let now = Utc::now();
        for found in &resolved {
            let mut entity = NamedEntity::from(found.clone());
            entity.last_updated = Some(now);
            self.store.upsert_named_entity(&entity, now)?;
        }
        debug!("resolved {} of {} entity names", resolved.len(), ids.len());
        Ok(resolved.len())
    }

    fn resolve_page(
        &self,
        ids: &[EntityId],
        depth: u8,
        resolved: &mut Vec<ResolvedName>,
    ) -> Result<(), EngineError> {
        match self.source.resolve_ids(ids) {
            Ok(names) => {
                resolved.extend(names);
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                if let [id] = ids {
                    warn!("dropping invalid entity ID {id}");
                    return Ok(());
                }
                if depth >= MAX_SPLIT_DEPTH {
                    warn!(
                        "dropping {} entity IDs after {depth} splits: {err}",
                        ids.len()
                    );
                    return Ok(());
                }
                let (left, right) = ids.split_at(ids.len() / 2);
                self.resolve_page(left, depth + 1, resolved)?;
                self.resolve_page(right, depth + 1, resolved)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve entities by exact name in batches.
    ///
    /// With `update` every returned triple is written; otherwise only
    /// entities not yet stored are created. A failing batch fails the whole
    /// call; entities from earlier batches stay stored.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when any batch or store write fails.
    pub fn fetch_by_names(
        &self,
        names: &[String],
        update: bool,
    ) -> Result<Vec<NamedEntity>, EngineError> {
        let unique: Vec<String> = names
            .iter()
            .filter(|name| !name.is_empty())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut entities = Vec::new();
        let now = Utc::now();
        for batch in unique.chunks(self.batch_size) {
            for found in self.source.resolve_names(batch)? {
                let existing = self.store.named_entity(found.id)?;
                let entity = match existing {
                    Some(stored) if !update && stored.is_resolved() => stored,
                    _ => {
                        let mut entity = NamedEntity::from(found);
                        entity.last_updated = Some(now);
                        self.store.upsert_named_entity(&entity, now)?;
                        entity
                    }
                };
                entities.push(entity);
            }
        }
        entities.sort_by_key(|entity| entity.id);
        entities.dedup_by_key(|entity| entity.id);
        Ok(entities)
    }
}

#[cfg(test)]
mod tests;
