//! Persistence capability used by the engine.
//!
//! The [`Store`] trait keeps every write individually atomic. The only
//! multi-row unit is [`Store::refresh_market_prices`], which must read,
//! delete and insert inside one transaction.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::market::{MarketPrice, PriceEntry};
use crate::names::NamedEntity;
use crate::record::{EntityId, EntityRecord, Fields, InlineRecord, NaturalKey, RawRecord, Upserted};
use crate::schema::{EntityKind, SectionSet};
use crate::source::SupplementaryResource;

#[cfg(feature = "store-sqlite")]
mod migrations;
#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use migrations::SCHEMA_VERSION;
#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteStore;

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the SQLite database failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to open SQLite database at {path}")]
    Open {
        /// Location of the database.
        path: std::path::PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A schema migration step failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to execute migration step '{step}'")]
    Migration {
        /// Step that failed.
        step: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// The database was created by an incompatible schema version.
    #[error("expected store schema version {expected} but found {found}")]
    VersionMismatch {
        /// Version this build understands.
        expected: i64,
        /// Version recorded in the database.
        found: i64,
    },
    /// A SQLite statement failed.
    #[cfg(feature = "store-sqlite")]
    #[error("SQLite operation '{operation}' failed")]
    Sqlite {
        /// Operation that failed.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Stored JSON could not be encoded or decoded.
    #[error("failed to encode or decode stored JSON during '{operation}'")]
    Json {
        /// Operation that failed.
        operation: &'static str,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A stored value is not valid for its column.
    #[error("invalid stored value during '{operation}': {message}")]
    Corrupt {
        /// Operation that failed.
        operation: &'static str,
        /// Description of the invalid value.
        message: String,
    },
}

/// Local persistence for mirrored entities and derived facts.
pub trait Store {
    /// Entity `(kind, id)` regardless of loaded sections.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn entity(&self, kind: EntityKind, id: EntityId) -> Result<Option<EntityRecord>, StoreError>;

    /// Entity `(kind, id)` only when its loaded sections cover `required`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn covered_entity(
        &self,
        kind: EntityKind,
        id: EntityId,
        required: SectionSet,
    ) -> Result<Option<EntityRecord>, StoreError> {
        Ok(self
            .entity(kind, id)?
            .filter(|record| record.sections.covers(required)))
    }

    /// IDs among `ids` stored with loaded sections covering `required`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn covered_ids(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        required: SectionSet,
    ) -> Result<BTreeSet<EntityId>, StoreError>;

    /// Stored entities among `ids`, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn entities(&self, kind: EntityKind, ids: &[EntityId])
    -> Result<Vec<EntityRecord>, StoreError>;

    /// Every stored ID of `kind`, sorted.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn entity_ids(&self, kind: EntityKind) -> Result<Vec<EntityId>, StoreError>;

    /// Stored entities of `kind` whose foreign key `field` points at
    /// `target`, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn referencing_entities(
        &self,
        kind: EntityKind,
        field: &str,
        target: EntityId,
    ) -> Result<Vec<EntityRecord>, StoreError>;

    /// Create or update `(kind, id)`, merging `fields` over existing values
    /// and OR-ing `sections` into the loaded set.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn upsert_entity(
        &self,
        kind: EntityKind,
        id: EntityId,
        fields: &Fields,
        sections: SectionSet,
        synced_at: DateTime<Utc>,
    ) -> Result<Upserted<EntityRecord>, StoreError>;

    /// Create or update the dependent row `(kind, parent_id, other_key)`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn upsert_inline(
        &self,
        kind: EntityKind,
        parent_id: EntityId,
        other_key: &NaturalKey,
        fields: &Fields,
        synced_at: DateTime<Utc>,
    ) -> Result<Upserted<InlineRecord>, StoreError>;

    /// Dependent rows of `kind` owned by `parent_id`, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn inline_records(
        &self,
        kind: EntityKind,
        parent_id: EntityId,
    ) -> Result<Vec<InlineRecord>, StoreError>;

    /// Get or create each named service tag and attach it to `station_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn add_station_services(&self, station_id: EntityId, names: &[String])
    -> Result<(), StoreError>;

    /// Service names attached to `station_id`, sorted.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn station_services(&self, station_id: EntityId) -> Result<Vec<String>, StoreError>;

    /// Replace every `resource` row owned by `type_id` with `rows`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn replace_supplementary_rows(
        &self,
        resource: SupplementaryResource,
        type_id: EntityId,
        rows: &[RawRecord],
    ) -> Result<usize, StoreError>;

    /// Stored `resource` rows owned by `type_id`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn supplementary_rows(
        &self,
        resource: SupplementaryResource,
        type_id: EntityId,
    ) -> Result<Vec<RawRecord>, StoreError>;

    /// Atomically replace stale prices for stored types with `entries`.
    ///
    /// Prices written after `fresh_after` are kept. Returns the number of
    /// prices written; zero means nothing was touched.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails; no partial refresh
    /// is visible in that case.
    fn refresh_market_prices(
        &self,
        entries: &[PriceEntry],
        fresh_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Stored price for `type_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn market_price(&self, type_id: EntityId) -> Result<Option<MarketPrice>, StoreError>;

    /// Named entity `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn named_entity(&self, id: EntityId) -> Result<Option<NamedEntity>, StoreError>;

    /// Stored named entities among `ids`, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn named_entities(&self, ids: &[EntityId]) -> Result<Vec<NamedEntity>, StoreError>;

    /// Create or overwrite a named entity; returns whether it was created.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn upsert_named_entity(
        &self,
        entity: &NamedEntity,
        synced_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Insert bare, unresolved rows for IDs not yet stored.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn insert_named_placeholders(&self, ids: &[EntityId]) -> Result<usize, StoreError>;

    /// Stored named-entity IDs, optionally only those without a name.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn named_entity_ids(&self, unresolved_only: bool) -> Result<Vec<EntityId>, StoreError>;
}
