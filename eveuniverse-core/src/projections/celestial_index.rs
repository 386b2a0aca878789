//! R*-tree over the stored celestials of one solar system.

use log::debug;
use rstar::{AABB, PointDistance, RTree, RTreeObject};

use super::{CelestialHit, SpatialOracle, position_distance};
use crate::constants::{
    GROUP_ASTEROID_BELT, GROUP_MOON, GROUP_PLANET, GROUP_STAR, GROUP_STARGATE, GROUP_STATION,
    TYPE_ASTEROID_BELT, TYPE_MOON,
};
use crate::record::{EntityId, EntityRecord};
use crate::schema::EntityKind;
use crate::source::SourceError;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedCelestial {
    item_id: EntityId,
    type_id: EntityId,
    group_id: EntityId,
    position: [f64; 3],
}

impl RTreeObject for IndexedCelestial {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedCelestial {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        self.position
            .iter()
            .zip(point.iter())
            .map(|(left, right)| (left - right).powi(2))
            .sum()
    }
}

/// Nearest-celestial lookup answered from the local store.
///
/// The star sits at the system origin. Moons and asteroid belts are reached
/// through the system's stored planets, so an index built before the planet
/// children were loaded will not contain them.
#[derive(Debug)]
pub struct CelestialIndex {
    system_id: EntityId,
    tree: RTree<IndexedCelestial>,
}

impl CelestialIndex {
    /// Index the stored celestials of `system`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when a lookup fails.
    pub fn for_system(store: &dyn Store, system: &EntityRecord) -> Result<Self, StoreError> {
        let mut entries = Vec::new();
        if let Some(star) = system.foreign_key("eve_star")
            && let Some(record) = store.entity(EntityKind::Star, star)?
            && let Some(type_id) = record.foreign_key("eve_type")
        {
            entries.push(IndexedCelestial {
                item_id: record.id,
                type_id,
                group_id: GROUP_STAR,
                position: [0.0; 3],
            });
        }
        let planets =
            store.referencing_entities(EntityKind::Planet, "eve_solar_system", system.id)?;
        for planet in &planets {
            push(&mut entries, planet, GROUP_PLANET, None);
            for moon in store.referencing_entities(EntityKind::Moon, "eve_planet", planet.id)? {
                push(&mut entries, &moon, GROUP_MOON, Some(TYPE_MOON));
            }
            for belt in
                store.referencing_entities(EntityKind::AsteroidBelt, "eve_planet", planet.id)?
            {
                push(
                    &mut entries,
                    &belt,
                    GROUP_ASTEROID_BELT,
                    Some(TYPE_ASTEROID_BELT),
                );
            }
        }
        for stargate in
            store.referencing_entities(EntityKind::Stargate, "eve_solar_system", system.id)?
        {
            push(&mut entries, &stargate, GROUP_STARGATE, None);
        }
        for station in
            store.referencing_entities(EntityKind::Station, "eve_solar_system", system.id)?
        {
            push(&mut entries, &station, GROUP_STATION, None);
        }
        debug!(
            "indexed {} celestials for solar system {}",
            entries.len(),
            system.id
        );
        Ok(Self {
            system_id: system.id,
            tree: RTree::bulk_load(entries),
        })
    }

    /// Number of indexed celestials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

fn push(
    entries: &mut Vec<IndexedCelestial>,
    record: &EntityRecord,
    group_id: EntityId,
    fixed_type: Option<EntityId>,
) {
    let (Some(position), Some(type_id)) = (
        record.position(),
        fixed_type.or_else(|| record.foreign_key("eve_type")),
    ) else {
        debug!("skipping {} {} without position or type", record.kind, record.id);
        return;
    };
    entries.push(IndexedCelestial {
        item_id: record.id,
        type_id,
        group_id,
        position,
    });
}

impl SpatialOracle for CelestialIndex {
    fn nearest_celestial(
        &self,
        system_id: EntityId,
        position: [f64; 3],
        group_id: Option<EntityId>,
    ) -> Result<Option<CelestialHit>, SourceError> {
        if system_id != self.system_id {
            return Ok(None);
        }
        let hit = self
            .tree
            .nearest_neighbor_iter(&position)
            .find(|entry| group_id.is_none_or(|group| entry.group_id == group));
        Ok(hit.map(|entry| CelestialHit {
            item_id: entry.item_id,
            type_id: entry.type_id,
            group_id: Some(entry.group_id),
            distance: position_distance(entry.position, position),
        }))
    }
}
