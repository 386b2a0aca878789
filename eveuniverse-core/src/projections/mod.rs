//! Read-only queries derived from the stored universe graph.
//!
//! Topology exclusions (wormhole space and Pochven) produce `None` rather
//! than errors. Only store and oracle failures are reported as errors.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use crate::constants::{
    GROUP_ASTEROID_BELT, GROUP_MOON, GROUP_PLANET, GROUP_STAR, GROUP_STARGATE, GROUP_STATION,
    METERS_PER_AU, METERS_PER_LIGHT_YEAR, REGION_POCHVEN, W_SPACE_SYSTEM_ID_END,
    W_SPACE_SYSTEM_ID_START,
};
use crate::engine::{EngineError, SyncEngine, SyncOptions};
use crate::record::{EntityId, EntityRecord};
use crate::schema::EntityKind;
use crate::source::SourceError;
use crate::store::StoreError;

mod celestial_index;

pub use celestial_index::CelestialIndex;

/// Shortest-path computation between solar systems.
pub trait RouteOracle {
    /// System IDs from `origin` to `destination` inclusive, `None` when no
    /// route exists.
    ///
    /// # Errors
    ///
    /// Propagates transport and decoding failures.
    fn route(
        &self,
        origin: EntityId,
        destination: EntityId,
    ) -> Result<Option<Vec<EntityId>>, SourceError>;
}

/// The celestial object closest to a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CelestialHit {
    /// ID of the celestial object.
    pub item_id: EntityId,
    /// Inventory type of the object.
    pub type_id: EntityId,
    /// Inventory group of the object, when the oracle reports it.
    pub group_id: Option<EntityId>,
    /// Distance from the query point in meters.
    pub distance: f64,
}

/// Nearest-object lookup within one solar system.
pub trait SpatialOracle {
    /// Closest celestial to `position` in `system_id`, optionally only of
    /// `group_id`.
    ///
    /// # Errors
    ///
    /// Propagates transport and lookup failures.
    fn nearest_celestial(
        &self,
        system_id: EntityId,
        position: [f64; 3],
        group_id: Option<EntityId>,
    ) -> Result<Option<CelestialHit>, SourceError>;
}

/// Stored kind for celestial inventory `group_id`.
#[must_use]
pub const fn kind_for_group(group_id: EntityId) -> Option<EntityKind> {
    match group_id {
        GROUP_ASTEROID_BELT => Some(EntityKind::AsteroidBelt),
        GROUP_MOON => Some(EntityKind::Moon),
        GROUP_PLANET => Some(EntityKind::Planet),
        GROUP_STAR => Some(EntityKind::Star),
        GROUP_STARGATE => Some(EntityKind::Stargate),
        GROUP_STATION => Some(EntityKind::Station),
        _ => None,
    }
}

/// Resolved nearest celestial with its inventory type.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestCelestial {
    /// Inventory type of the object.
    pub eve_type: EntityRecord,
    /// The object itself.
    pub eve_object: EntityRecord,
    /// Distance from the query point in meters.
    pub distance: f64,
}

/// Security status rounded to one decimal.
#[must_use]
pub fn security_round(security_status: f64) -> f64 {
    (security_status * 10.0).round() / 10.0
}

/// Whether `system_id` is in wormhole space.
#[must_use]
pub const fn is_w_space(system_id: EntityId) -> bool {
    system_id >= W_SPACE_SYSTEM_ID_START && system_id < W_SPACE_SYSTEM_ID_END
}

/// Convert meters to light years.
#[must_use]
pub fn meters_to_ly(meters: f64) -> f64 {
    meters / METERS_PER_LIGHT_YEAR
}

/// Convert meters to astronomical units.
#[must_use]
pub fn meters_to_au(meters: f64) -> f64 {
    meters / METERS_PER_AU
}

fn rounded_security(system: &EntityRecord) -> Option<f64> {
    system.float("security_status").map(security_round)
}

/// Whether the system is high security.
#[must_use]
pub fn is_high_sec(system: &EntityRecord) -> bool {
    rounded_security(system).is_some_and(|security| security >= 0.5)
}

/// Whether the system is low security.
#[must_use]
pub fn is_low_sec(system: &EntityRecord) -> bool {
    rounded_security(system).is_some_and(|security| security > 0.0 && security < 0.5)
}

/// Euclidean distance between two stored positions.
#[must_use]
pub fn position_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(left, right)| (left - right).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Graph queries over solar systems with per-instance caches.
pub struct Projections<'a> {
    engine: &'a SyncEngine<'a>,
    routes: Option<&'a dyn RouteOracle>,
    spatial: Option<&'a dyn SpatialOracle>,
    trig_cache: RefCell<HashMap<EntityId, bool>>,
}

impl fmt::Debug for Projections<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projections")
            .field("routes", &self.routes.is_some())
            .field("spatial", &self.spatial.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> Projections<'a> {
    /// Projections over the engine's store.
    #[must_use]
    pub fn new(engine: &'a SyncEngine<'a>) -> Self {
        Self {
            engine,
            routes: None,
            spatial: None,
            trig_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Enable route queries.
    #[must_use]
    pub fn with_routes(mut self, routes: &'a dyn RouteOracle) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Enable nearest-celestial queries.
    #[must_use]
    pub fn with_spatial(mut self, spatial: &'a dyn SpatialOracle) -> Self {
        self.spatial = Some(spatial);
        self
    }

    /// Whether the system belongs to Pochven.
    ///
    /// The system, constellation and region chain is read once per system
    /// and cached. A broken chain counts as not Pochven.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when a lookup fails.
    pub fn is_trig_space(&self, system: &EntityRecord) -> Result<bool, StoreError> {
        if let Some(cached) = self.trig_cache.borrow().get(&system.id) {
            return Ok(*cached);
        }
        let store = self.engine.store();
        let region = match system.foreign_key("eve_constellation") {
            Some(constellation) => store
                .entity(EntityKind::Constellation, constellation)?
                .and_then(|record| record.foreign_key("eve_region")),
            None => None,
        };
        let trig = region == Some(REGION_POCHVEN);
        self.trig_cache.borrow_mut().insert(system.id, trig);
        Ok(trig)
    }

    /// Whether the system is null security outside wormhole space and
    /// Pochven.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the region lookup fails.
    pub fn is_null_sec(&self, system: &EntityRecord) -> Result<bool, StoreError> {
        let Some(security) = rounded_security(system) else {
            return Ok(false);
        };
        Ok(security <= 0.0 && !is_w_space(system.id) && !self.is_trig_space(system)?)
    }

    fn is_excluded(&self, system: &EntityRecord) -> Result<bool, StoreError> {
        Ok(is_w_space(system.id) || self.is_trig_space(system)?)
    }

    /// Distance in meters between two systems, `None` when either lacks a
    /// position or sits in an excluded region.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the region lookup fails.
    pub fn distance(&self, a: &EntityRecord, b: &EntityRecord) -> Result<Option<f64>, StoreError> {
        if self.is_excluded(a)? || self.is_excluded(b)? {
            return Ok(None);
        }
        Ok(a.position()
            .zip(b.position())
            .map(|(left, right)| position_distance(left, right)))
    }

    /// Systems on the shortest route from `origin` to `destination`, in
    /// path order, fetching any system not stored yet.
    ///
    /// Returns `None` without a route oracle, when no route exists, or when
    /// either end sits in an excluded region.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the oracle or a system fetch fails.
    pub fn route(
        &self,
        origin: &EntityRecord,
        destination: &EntityRecord,
    ) -> Result<Option<Vec<EntityRecord>>, EngineError> {
        let Some(routes) = self.routes else {
            return Ok(None);
        };
        if self.is_excluded(origin)? || self.is_excluded(destination)? {
            return Ok(None);
        }
        let Some(path) = routes.route(origin.id, destination.id)? else {
            return Ok(None);
        };
        let options = SyncOptions::default();
        let systems = path
            .into_iter()
            .map(|id| {
                self.engine
                    .get_or_create(EntityKind::SolarSystem, id, &options)
                    .map(|(record, _)| record)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(systems))
    }

    /// Jumps on the shortest route, `None` when [`Projections::route`] is.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the route lookup fails.
    pub fn jump_count(
        &self,
        origin: &EntityRecord,
        destination: &EntityRecord,
    ) -> Result<Option<usize>, EngineError> {
        Ok(self
            .route(origin, destination)?
            .map(|systems| systems.len().saturating_sub(1)))
    }

    /// Nearest celestial to `position` in `system`, with its type and object
    /// fetched when missing.
    ///
    /// Returns `None` without a spatial oracle, when nothing is found, or
    /// when the hit's group has no stored kind. Hits without a group take
    /// the group of their inventory type.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the oracle or a fetch fails.
    pub fn nearest_celestial(
        &self,
        system: &EntityRecord,
        position: [f64; 3],
        group_id: Option<EntityId>,
    ) -> Result<Option<NearestCelestial>, EngineError> {
        let Some(spatial) = self.spatial else {
            return Ok(None);
        };
        let Some(hit) = spatial.nearest_celestial(system.id, position, group_id)? else {
            return Ok(None);
        };
        if hit.group_id.is_some_and(|group| kind_for_group(group).is_none()) {
            return Ok(None);
        }
        let options = SyncOptions::default();
        let (eve_type, _) = self
            .engine
            .get_or_create(EntityKind::Type, hit.type_id, &options)?;
        let Some(kind) = hit
            .group_id
            .or_else(|| eve_type.foreign_key("eve_group"))
            .and_then(kind_for_group)
        else {
            return Ok(None);
        };
        let (eve_object, _) = self.engine.get_or_create(kind, hit.item_id, &options)?;
        Ok(Some(NearestCelestial {
            eve_type,
            eve_object,
            distance: hit.distance,
        }))
    }
}
