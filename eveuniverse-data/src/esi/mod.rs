//! Entity, name, price and route adapter for the EVE Swagger Interface.
//!
//! [`EsiSource`] implements every remote capability the engine reads from
//! ESI. Paths come from the entity descriptors, so adding a kind to the
//! schema registry needs no change here.
//!
//! # Example
//!
//! ```no_run
//! use eveuniverse_core::{
//!     EngineConfig, EntityKind, SqliteStore, SyncEngine, SyncOptions, TaskQueue,
//! };
//! use eveuniverse_data::EsiSource;
//!
//! let esi = EsiSource::new()?;
//! let store = SqliteStore::open("eveuniverse.sqlite3")?;
//! let queue = TaskQueue::new();
//! let engine = SyncEngine::new(&store, &esi, &queue, EngineConfig::default())?;
//! let (jita, _) =
//!     engine.get_or_create(EntityKind::SolarSystem, 30_000_142, &SyncOptions::default())?;
//! # let _ = jita;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod wire;

use eveuniverse_core::{
    EntityDescriptor, EntityId, EntitySource, NameSource, PriceEntry, PriceSource, ResolvedName,
    RouteOracle, SourceError,
};
use serde_json::Value;
use url::Url;

use crate::client::{ClientBuildError, HttpClient, HttpConfig};
use wire::{IdsResponse, NameEntry};

const NAMES_PATH: &str = "/universe/names/";
const IDS_PATH: &str = "/universe/ids/";
const PRICES_PATH: &str = "/markets/prices/";

/// Blocking ESI client.
#[derive(Debug)]
pub struct EsiSource {
    http: HttpClient,
}

impl EsiSource {
    /// Create a source against the public ESI host.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn new() -> Result<Self, ClientBuildError> {
        Self::with_config(HttpConfig::default())
    }

    /// Create a source with explicit connection settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client or
    /// Tokio runtime fails to build.
    pub fn with_config(config: HttpConfig) -> Result<Self, ClientBuildError> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }

    /// Connection settings in use.
    #[must_use]
    pub const fn config(&self) -> &HttpConfig {
        self.http.config()
    }

    fn object_url(&self, descriptor: &EntityDescriptor, id: EntityId) -> Result<Url, SourceError> {
        let endpoint = descriptor
            .object_endpoint
            .ok_or_else(|| SourceError::Unsupported {
                path: descriptor.kind.to_string(),
            })?;
        self.http.endpoint(&endpoint.render(Some(id)))
    }

    fn list_url(&self, descriptor: &EntityDescriptor) -> Result<Url, SourceError> {
        let endpoint = descriptor
            .list_endpoint
            .ok_or_else(|| SourceError::Unsupported {
                path: descriptor.kind.to_string(),
            })?;
        self.http.endpoint(&endpoint.render(None))
    }

    fn route_url(&self, origin: EntityId, destination: EntityId) -> Result<Url, SourceError> {
        self.http
            .endpoint(&format!("/route/{origin}/{destination}/"))
    }
}

impl EntitySource for EsiSource {
    fn fetch_object(
        &self,
        descriptor: &EntityDescriptor,
        id: EntityId,
    ) -> Result<Value, SourceError> {
        let url = self.object_url(descriptor, id)?;
        log::debug!("fetching {} {id} from {url}", descriptor.kind);
        if descriptor.is_list_only_endpoint() {
            return self
                .http
                .block_on(self.http.get_pages::<Value>(&url))
                .map(Value::Array);
        }
        self.http.block_on(self.http.get_json(&url))
    }

    fn fetch_list(&self, descriptor: &EntityDescriptor) -> Result<Vec<Value>, SourceError> {
        let url = self.list_url(descriptor)?;
        log::debug!("listing {} from {url}", descriptor.kind);
        self.http.block_on(self.http.get_pages(&url))
    }
}

impl NameSource for EsiSource {
    fn resolve_ids(&self, ids: &[EntityId]) -> Result<Vec<ResolvedName>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.http.endpoint(NAMES_PATH)?;
        let entries: Vec<NameEntry> = self.http.block_on(self.http.post_json(&url, ids))?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let id = entry.id;
                let resolved = entry.into_resolved();
                if resolved.is_none() {
                    log::warn!("skipping name for {id} with an unknown category");
                }
                resolved
            })
            .collect())
    }

    fn resolve_names(&self, names: &[String]) -> Result<Vec<ResolvedName>, SourceError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.http.endpoint(IDS_PATH)?;
        let response: IdsResponse = self.http.block_on(self.http.post_json(&url, names))?;
        Ok(response.into_resolved())
    }
}

impl PriceSource for EsiSource {
    fn fetch_prices(&self) -> Result<Vec<PriceEntry>, SourceError> {
        let url = self.http.endpoint(PRICES_PATH)?;
        self.http.block_on(self.http.get_json(&url))
    }
}

impl RouteOracle for EsiSource {
    /// ESI answers 404 when the systems are not connected.
    fn route(
        &self,
        origin: EntityId,
        destination: EntityId,
    ) -> Result<Option<Vec<EntityId>>, SourceError> {
        let url = self.route_url(origin, destination)?;
        match self.http.block_on(self.http.get_json(&url)) {
            Ok(route) => Ok(Some(route)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
