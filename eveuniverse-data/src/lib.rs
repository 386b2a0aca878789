//! Remote adapters for the EVE universe synchronization engine.
//!
//! Responsibilities:
//! - Implement the capability traits of `eveuniverse-core` over HTTP.
//! - Map transport failures onto `SourceError` so the task runner can tell
//!   transient failures from permanent ones.
//! - Cache bulky or slow remote answers locally.
//!
//! Boundaries:
//! - No synchronization rules live here; the adapters only fetch.
//! - Every adapter is blocking from the caller's point of view.
//!
//! Adapters:
//! - [`EsiSource`]: entities, names, market prices and routes from ESI.
//! - [`HttpCelestialOracle`]: nearest celestial lookups.
//! - [`SdeSource`]: supplementary industry and reprocessing datasets.

mod celestial;
mod client;
mod esi;
pub mod sde;

pub use celestial::{CELESTIAL_BASE_URL, CELESTIAL_CACHE_TTL, HttpCelestialOracle};
pub use client::{ClientBuildError, DEFAULT_USER_AGENT, ESI_BASE_URL, HttpConfig};
pub use esi::EsiSource;
pub use sde::{SDE_BASE_URL, SdeSource};
