//! Bulk loaders that fan work out as units of work, and the market price
//! refresh.

use chrono::{Duration, Utc};
use log::info;
use serde_json::Value;

use super::{EngineError, SyncEngine, SyncOptions};
use crate::constants::{CATEGORY_SHIP, CATEGORY_STRUCTURE};
use crate::mapper::as_id;
use crate::record::EntityId;
use crate::schema::{EntityDescriptor, EntityKind, Section};
use crate::tasks::Task;

/// IDs named by a list response, in response order.
pub(super) fn listed_ids(descriptor: &EntityDescriptor, listed: &[Value]) -> Vec<EntityId> {
    listed
        .iter()
        .filter_map(|item| match item {
            Value::Object(row) => row.get(descriptor.identity).and_then(as_id),
            other => as_id(other),
        })
        .collect()
}

impl SyncEngine<'_> {
    fn loader_options(&self, include_children: bool) -> SyncOptions {
        SyncOptions {
            include_children,
            wait_for_children: false,
            sections: self.config.default_sections(),
            priority: Some(self.config.tasks_priority),
        }
    }

    fn list_ids(&self, kind: EntityKind) -> Result<Vec<EntityId>, EngineError> {
        let descriptor = self.registry.schema_for(kind)?;
        if descriptor.list_endpoint.is_none() {
            return Err(EngineError::MissingListEndpoint { kind });
        }
        let listed = self.source.fetch_list(descriptor)?;
        Ok(listed_ids(descriptor, &listed))
    }

    fn enqueue_updates(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        options: &SyncOptions,
    ) -> Result<usize, EngineError> {
        for id in ids {
            self.enqueue(
                Task::UpdateOrCreate {
                    kind,
                    id: *id,
                    options: *options,
                },
                options,
            )?;
        }
        Ok(ids.len())
    }

    /// Enqueue every region with its full descendant tree.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the region list cannot be fetched or
    /// a unit cannot be enqueued.
    pub fn load_map(&self) -> Result<usize, EngineError> {
        let regions = self.list_ids(EntityKind::Region)?;
        info!("loading map with {} regions", regions.len());
        self.enqueue_updates(EntityKind::Region, &regions, &self.loader_options(true))
    }

    /// Enqueue every inventory category with its groups and types, in ID
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoCategories`] when the remote lists none.
    pub fn load_all_types(&self) -> Result<usize, EngineError> {
        let mut categories = self.list_ids(EntityKind::Category)?;
        if categories.is_empty() {
            return Err(EngineError::NoCategories);
        }
        categories.sort_unstable();
        categories.dedup();
        info!("loading all types from {} categories", categories.len());
        self.enqueue_updates(EntityKind::Category, &categories, &self.loader_options(true))
    }

    /// Enqueue the ship category with its groups and types.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the unit cannot be enqueued.
    pub fn load_ship_types(&self) -> Result<usize, EngineError> {
        info!("loading ship types");
        self.enqueue_updates(EntityKind::Category, &[CATEGORY_SHIP], &self.loader_options(true))
    }

    /// Enqueue the structure category with its groups and types.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the unit cannot be enqueued.
    pub fn load_structure_types(&self) -> Result<usize, EngineError> {
        info!("loading structure types");
        self.enqueue_updates(
            EntityKind::Category,
            &[CATEGORY_STRUCTURE],
            &self.loader_options(true),
        )
    }

    /// Enqueue selected categories and groups with their descendants, and
    /// types on their own.
    ///
    /// `force_dogmas` adds the dogmas section regardless of configuration.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when a unit cannot be enqueued.
    pub fn load_types(
        &self,
        category_ids: &[EntityId],
        group_ids: &[EntityId],
        type_ids: &[EntityId],
        force_dogmas: bool,
    ) -> Result<usize, EngineError> {
        let with_dogmas = |mut options: SyncOptions| {
            if force_dogmas {
                options.sections = options.sections.with(Section::Dogmas);
            }
            options
        };
        info!(
            "loading {} categories, {} groups and {} types",
            category_ids.len(),
            group_ids.len(),
            type_ids.len()
        );
        let parents = with_dogmas(self.loader_options(true));
        let leaves = with_dogmas(self.loader_options(false));
        Ok(self.enqueue_updates(EntityKind::Category, category_ids, &parents)?
            + self.enqueue_updates(EntityKind::Group, group_ids, &parents)?
            + self.enqueue_updates(EntityKind::Type, type_ids, &leaves)?)
    }

    /// Enqueue a get-or-create of `(kind, id)`.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the unit cannot be enqueued.
    pub fn load_object(
        &self,
        kind: EntityKind,
        id: EntityId,
        options: &SyncOptions,
    ) -> Result<(), EngineError> {
        self.registry.schema_for(kind)?;
        self.enqueue(
            Task::LoadObject {
                kind,
                id,
                options: *options,
            },
            options,
        )
    }

    /// Replace stale market prices of stored types.
    ///
    /// Prices refreshed within `minutes_until_stale` (the configured value
    /// when `None`) are kept. Returns the number of prices written.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingPriceSource`] without a price source, and
    /// any fetch or store failure. A failed refresh writes nothing.
    pub fn update_market_prices(
        &self,
        minutes_until_stale: Option<u32>,
    ) -> Result<usize, EngineError> {
        let source = self.prices.ok_or(EngineError::MissingPriceSource)?;
        let minutes = minutes_until_stale.unwrap_or(self.config.market_price_minutes_until_stale);
        let entries = source.fetch_prices()?;
        let now = Utc::now();
        let fresh_after = now - Duration::minutes(i64::from(minutes));
        let written = self.store.refresh_market_prices(&entries, fresh_after, now)?;
        info!("updated {written} market prices from {} entries", entries.len());
        Ok(written)
    }
}
