//! Remote nearest-celestial lookups with an in-memory result cache.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use eveuniverse_core::{CelestialHit, EntityId, SourceError, SpatialOracle};
use serde::Deserialize;
use url::Url;

use crate::client::{ClientBuildError, HttpClient, HttpConfig};

/// Default base URL of the static-data API answering spatial queries.
pub const CELESTIAL_BASE_URL: &str = "https://evesdeapi.kalkoken.net/latest";

/// How long a lookup result is reused.
pub const CELESTIAL_CACHE_TTL: Duration = Duration::from_secs(3_600 * 12);

#[derive(Debug, Deserialize)]
struct NearestItem {
    item_id: EntityId,
    type_id: EntityId,
    distance: f64,
}

/// Query parameters identifying one lookup. Coordinates are compared by
/// their bit patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LookupKey {
    system_id: EntityId,
    position: [u64; 3],
    group_id: Option<EntityId>,
}

impl LookupKey {
    fn new(system_id: EntityId, position: [f64; 3], group_id: Option<EntityId>) -> Self {
        Self {
            system_id,
            position: position.map(f64::to_bits),
            group_id,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedLookup {
    hit: Option<CelestialHit>,
    stored_at: Instant,
}

/// [`SpatialOracle`] backed by the `nearest_celestials` endpoint.
///
/// The endpoint does not report inventory groups, so hits carry the
/// requested group or none at all.
#[derive(Debug)]
pub struct HttpCelestialOracle {
    http: HttpClient,
    ttl: Duration,
    cache: Mutex<HashMap<LookupKey, CachedLookup>>,
}

impl HttpCelestialOracle {
    /// Create an oracle against the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn new() -> Result<Self, ClientBuildError> {
        Self::with_config(HttpConfig::new(CELESTIAL_BASE_URL))
    }

    /// Create an oracle with explicit connection settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client or
    /// Tokio runtime fails to build.
    pub fn with_config(config: HttpConfig) -> Result<Self, ClientBuildError> {
        Ok(Self {
            http: HttpClient::new(config)?,
            ttl: CELESTIAL_CACHE_TTL,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Set how long lookup results are reused.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn lookup_url(
        &self,
        system_id: EntityId,
        position: [f64; 3],
        group_id: Option<EntityId>,
    ) -> Result<Url, SourceError> {
        let mut url = self
            .http
            .endpoint(&format!("/universe/systems/{system_id}/nearest_celestials"))?;
        {
            let [x, y, z] = position;
            let mut query = url.query_pairs_mut();
            query
                .append_pair("x", &x.to_string())
                .append_pair("y", &y.to_string())
                .append_pair("z", &z.to_string());
            if let Some(group_id) = group_id {
                query.append_pair("group_id", &group_id.to_string());
            }
        }
        Ok(url)
    }

    fn cached(&self, key: &LookupKey) -> Option<Option<CelestialHit>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.hit)
    }

    fn remember(&self, key: LookupKey, hit: Option<CelestialHit>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        cache.insert(
            key,
            CachedLookup {
                hit,
                stored_at: Instant::now(),
            },
        );
    }
}

/// The first item of a response is the nearest one.
fn first_hit(items: Vec<NearestItem>, group_id: Option<EntityId>) -> Option<CelestialHit> {
    items.into_iter().next().map(|item| CelestialHit {
        item_id: item.item_id,
        type_id: item.type_id,
        group_id,
        distance: item.distance,
    })
}

impl SpatialOracle for HttpCelestialOracle {
    fn nearest_celestial(
        &self,
        system_id: EntityId,
        position: [f64; 3],
        group_id: Option<EntityId>,
    ) -> Result<Option<CelestialHit>, SourceError> {
        let key = LookupKey::new(system_id, position, group_id);
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }
        let url = self.lookup_url(system_id, position, group_id)?;
        log::info!("requesting nearest celestial from {url}");
        let items: Vec<NearestItem> = self.http.block_on(self.http.get_json(&url))?;
        let hit = first_hit(items, group_id);
        self.remember(key, hit);
        Ok(hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn oracle() -> HttpCelestialOracle {
        // Nothing listens on the discard port, so uncached lookups fail fast.
        HttpCelestialOracle::with_config(
            HttpConfig::new("http://127.0.0.1:9/latest").with_timeout(Duration::from_secs(1)),
        )
        .expect("oracle should build")
    }

    fn planet_hit() -> CelestialHit {
        CelestialHit {
            item_id: 40_009_077,
            type_id: 11,
            group_id: Some(7),
            distance: 1_250.0,
        }
    }

    #[rstest]
    fn lookup_urls_carry_the_position_and_group(oracle: HttpCelestialOracle) {
        let url = oracle
            .lookup_url(30_000_142, [1.5, -2.0, 0.0], Some(7))
            .expect("url");

        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9/latest/universe/systems/30000142/nearest_celestials?x=1.5&y=-2&z=0&group_id=7"
        );
    }

    #[rstest]
    fn lookup_urls_omit_a_missing_group(oracle: HttpCelestialOracle) {
        let url = oracle.lookup_url(30_000_142, [0.0; 3], None).expect("url");

        assert!(!url.as_str().contains("group_id"));
    }

    #[rstest]
    fn the_nearest_item_comes_first() {
        let items: Vec<NearestItem> = serde_json::from_str(
            r#"[
                {"item_id": 40009077, "name": "Jita IV", "type_id": 11, "distance": 12.5},
                {"item_id": 40009078, "name": "Jita IV - Moon 1", "type_id": 14, "distance": 80.0}
            ]"#,
        )
        .expect("decode");

        let hit = first_hit(items, None).expect("hit");

        assert_eq!(hit.item_id, 40_009_077);
        assert_eq!(hit.type_id, 11);
        assert_eq!(hit.group_id, None);
        assert!(first_hit(Vec::new(), Some(7)).is_none());
    }

    #[rstest]
    fn cached_lookups_do_not_reach_the_remote(oracle: HttpCelestialOracle) {
        let position = [1.0, 2.0, 3.0];
        oracle.remember(LookupKey::new(30_000_142, position, Some(7)), Some(planet_hit()));

        let hit = oracle
            .nearest_celestial(30_000_142, position, Some(7))
            .expect("cached lookup");

        assert_eq!(hit, Some(planet_hit()));
    }

    #[rstest]
    fn cached_misses_are_reused_too(oracle: HttpCelestialOracle) {
        oracle.remember(LookupKey::new(31_000_005, [0.0; 3], None), None);

        let hit = oracle
            .nearest_celestial(31_000_005, [0.0; 3], None)
            .expect("cached lookup");

        assert!(hit.is_none());
    }

    #[rstest]
    fn expired_entries_are_fetched_again(oracle: HttpCelestialOracle) {
        let expiring = oracle.with_cache_ttl(Duration::ZERO);
        expiring.remember(LookupKey::new(30_000_142, [0.0; 3], None), Some(planet_hit()));

        let err = expiring
            .nearest_celestial(30_000_142, [0.0; 3], None)
            .expect_err("nothing listens on the test port");

        assert!(err.is_transient());
    }
}
