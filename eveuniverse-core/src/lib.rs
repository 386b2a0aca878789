//! Local mirroring of the EVE Online universe.
//!
//! A [`SyncEngine`] resolves entities from an [`EntitySource`] into a
//! [`Store`], creating referenced parents first and expanding children
//! according to the descriptors in the [`SchemaRegistry`]. Background work
//! is handed to an [`AsyncExecutor`] as [`UnitOfWork`] values; the in-process
//! [`TaskQueue`] and [`TaskRunner`] cover single-process deployments.
//!
//! # Examples
//!
//! ```
//! use eveuniverse_core::{EngineConfig, Section, SectionSet, SyncOptions};
//!
//! let config = EngineConfig {
//!     load_planets: true,
//!     ..EngineConfig::default()
//! };
//! let options = SyncOptions::default()
//!     .with_children()
//!     .with_sections(SectionSet::from_iter([Section::Stations]));
//! let sections = config.effective_sections(options.sections);
//! assert!(sections.contains(Section::Planets));
//! assert!(sections.contains(Section::Stations));
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod constants;
pub mod engine;
pub mod mapper;
pub mod market;
pub mod names;
pub mod projections;
pub mod record;
pub mod schema;
pub mod source;
pub mod store;
pub mod tasks;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::EngineConfig;
pub use engine::{EngineError, SyncEngine, SyncOptions};
pub use market::{MarketPrice, PriceEntry, PriceSource};
pub use names::{EntityCategory, EntityNameResolver, NameResolver, NamedEntity};
pub use projections::{CelestialHit, CelestialIndex, Projections, RouteOracle, SpatialOracle};
pub use record::{EntityId, EntityRecord, FieldValue, Fields, InlineRecord, NaturalKey, RawRecord};
pub use schema::{EntityDescriptor, EntityKind, SchemaRegistry, Section, SectionSet};
pub use source::{
    EntitySource, NameSource, ResolvedName, SourceError, SupplementaryDataSource,
    SupplementaryResource,
};
#[cfg(feature = "store-sqlite")]
pub use store::SqliteStore;
pub use store::{Store, StoreError};
pub use tasks::{
    AdvisoryLock, AsyncExecutor, ExecutorError, MemoryLock, Task, TaskQueue, TaskRunner,
    UnitOfWork,
};
