//! Supplementary static dataset source.
//!
//! Industry and reprocessing data is not published per type by ESI. The
//! static data export mirror serves each resource as one large JSON array,
//! so [`SdeSource`] downloads a resource whole, keeps it on disk for a
//! configurable age and answers per-type queries from an in-memory index.

mod cache;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use eveuniverse_core::{
    EntityId, RawRecord, SourceError, SupplementaryDataSource, SupplementaryResource,
};
use serde_json::Value;

use crate::client::{ClientBuildError, HttpClient, HttpConfig};

pub use cache::{
    CachedDataset, SdeCacheError, SdeCacheWriteError, cache_path, read_cache, write_cache,
};

/// Default base URL of the static data export mirror.
pub const SDE_BASE_URL: &str = "https://sde.zzeve.com";

/// How long a downloaded resource is reused by default.
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(24 * 3_600);

/// Row key holding the owning type.
const TYPE_KEY: &str = "typeID";

/// One resource indexed by owning type.
#[derive(Debug)]
struct Dataset {
    fetched_at: DateTime<Utc>,
    by_type: HashMap<EntityId, Vec<RawRecord>>,
}

impl Dataset {
    fn index(fetched_at: DateTime<Utc>, rows: Vec<RawRecord>) -> Self {
        let mut by_type: HashMap<EntityId, Vec<RawRecord>> = HashMap::new();
        for row in rows {
            if let Some(type_id) = row.get(TYPE_KEY).and_then(Value::as_i64) {
                by_type.entry(type_id).or_default().push(row);
            }
        }
        Self {
            fetched_at,
            by_type,
        }
    }

    fn rows_for(&self, type_id: EntityId) -> Vec<RawRecord> {
        self.by_type.get(&type_id).cloned().unwrap_or_default()
    }
}

/// [`SupplementaryDataSource`] over the static data export mirror.
#[derive(Debug)]
pub struct SdeSource {
    http: HttpClient,
    cache_dir: Utf8PathBuf,
    max_age: Duration,
    loaded: Mutex<HashMap<SupplementaryResource, Arc<Dataset>>>,
}

impl SdeSource {
    /// Create a source against the public mirror caching into `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn new(cache_dir: impl Into<Utf8PathBuf>) -> Result<Self, ClientBuildError> {
        Self::with_config(HttpConfig::new(SDE_BASE_URL), cache_dir)
    }

    /// Create a source with explicit connection settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client or
    /// Tokio runtime fails to build.
    pub fn with_config(
        config: HttpConfig,
        cache_dir: impl Into<Utf8PathBuf>,
    ) -> Result<Self, ClientBuildError> {
        Ok(Self {
            http: HttpClient::new(config)?,
            cache_dir: cache_dir.into(),
            max_age: DEFAULT_CACHE_MAX_AGE,
            loaded: Mutex::new(HashMap::new()),
        })
    }

    /// Set how long a downloaded resource is reused.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn cache_dir(&self) -> &Utf8Path {
        &self.cache_dir
    }

    fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let max_age = chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(fetched_at) < max_age
    }

    fn dataset(&self, resource: SupplementaryResource) -> Result<Arc<Dataset>, SourceError> {
        let now = Utc::now();
        {
            let loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(dataset) = loaded
                .get(&resource)
                .filter(|dataset| self.is_fresh(dataset.fetched_at, now))
            {
                return Ok(Arc::clone(dataset));
            }
        }

        let dataset = Arc::new(self.load(resource, now)?);
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource, Arc::clone(&dataset));
        Ok(dataset)
    }

    /// Read the disk cache when fresh, otherwise download and rewrite it.
    fn load(
        &self,
        resource: SupplementaryResource,
        now: DateTime<Utc>,
    ) -> Result<Dataset, SourceError> {
        let path = cache_path(&self.cache_dir, resource.as_str());
        match read_cache(&path) {
            Ok(cached) if self.is_fresh(cached.fetched_at, now) => {
                log::debug!("using cached {} from {path}", resource.as_str());
                return Ok(Dataset::index(cached.fetched_at, cached.rows));
            }
            Ok(_) => log::debug!("cached {} is stale", resource.as_str()),
            Err(SdeCacheError::Io { .. }) => {}
            Err(err) => log::warn!("ignoring unreadable dataset cache: {err}"),
        }

        let url = self.http.endpoint(&format!("/{}.json", resource.as_str()))?;
        log::info!("downloading {} from {url}", resource.as_str());
        let rows: Vec<RawRecord> = self.http.block_on(self.http.get_json(&url))?;
        if let Err(err) = write_cache(&path, now, &rows) {
            log::warn!("failed to cache {}: {err}", resource.as_str());
        }
        Ok(Dataset::index(now, rows))
    }
}

impl SupplementaryDataSource for SdeSource {
    fn rows(
        &self,
        resource: SupplementaryResource,
        type_id: EntityId,
    ) -> Result<Vec<RawRecord>, SourceError> {
        Ok(self.dataset(resource)?.rows_for(type_id))
    }
}

#[cfg(test)]
mod tests;
