//! Facade crate for the EVE universe mirroring engine.
//!
//! This crate re-exports the core domain types and exposes the SQLite store
//! and in-memory test doubles behind feature flags.

#![forbid(unsafe_code)]

pub use eveuniverse_core::{
    AdvisoryLock, AsyncExecutor, CelestialHit, CelestialIndex, EngineConfig, EngineError,
    EntityDescriptor, EntityId, EntityKind, EntityNameResolver, EntityRecord, EntitySource,
    MarketPrice, NameResolver, NameSource, PriceSource, Projections, ResolvedName, RouteOracle,
    SchemaRegistry, Section, SectionSet, SourceError, SpatialOracle, Store, StoreError,
    SupplementaryDataSource, SupplementaryResource, SyncEngine, SyncOptions, TaskQueue,
    TaskRunner, UnitOfWork,
};

#[cfg(feature = "store-sqlite")]
pub use eveuniverse_core::SqliteStore;

#[cfg(feature = "test-support")]
pub use eveuniverse_core::test_support;
