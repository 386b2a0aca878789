//! Response bodies of the ESI name endpoints.

use eveuniverse_core::{EntityCategory, EntityId, ResolvedName};
use serde::Deserialize;

/// One element of the `POST /universe/names/` response.
#[derive(Debug, Deserialize)]
pub(crate) struct NameEntry {
    pub id: EntityId,
    pub name: String,
    pub category: String,
}

impl NameEntry {
    /// Convert into a resolved name, `None` for categories not mirrored.
    pub(crate) fn into_resolved(self) -> Option<ResolvedName> {
        let category = self.category.parse::<EntityCategory>().ok()?;
        Some(ResolvedName {
            id: self.id,
            name: self.name,
            category,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdEntry {
    pub id: EntityId,
    pub name: String,
}

/// The `POST /universe/ids/` response, grouped by plural category keys.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct IdsResponse {
    #[serde(default)]
    pub agents: Vec<IdEntry>,
    #[serde(default)]
    pub alliances: Vec<IdEntry>,
    #[serde(default)]
    pub characters: Vec<IdEntry>,
    #[serde(default)]
    pub constellations: Vec<IdEntry>,
    #[serde(default)]
    pub corporations: Vec<IdEntry>,
    #[serde(default)]
    pub factions: Vec<IdEntry>,
    #[serde(default)]
    pub inventory_types: Vec<IdEntry>,
    #[serde(default)]
    pub regions: Vec<IdEntry>,
    #[serde(default)]
    pub stations: Vec<IdEntry>,
    #[serde(default)]
    pub systems: Vec<IdEntry>,
}

impl IdsResponse {
    /// Flatten the groups. Agents are characters.
    pub(crate) fn into_resolved(self) -> Vec<ResolvedName> {
        [
            (self.agents, EntityCategory::Character),
            (self.alliances, EntityCategory::Alliance),
            (self.characters, EntityCategory::Character),
            (self.constellations, EntityCategory::Constellation),
            (self.corporations, EntityCategory::Corporation),
            (self.factions, EntityCategory::Faction),
            (self.inventory_types, EntityCategory::InventoryType),
            (self.regions, EntityCategory::Region),
            (self.stations, EntityCategory::Station),
            (self.systems, EntityCategory::SolarSystem),
        ]
        .into_iter()
        .flat_map(|(entries, category)| {
            entries.into_iter().map(move |entry| ResolvedName {
                id: entry.id,
                name: entry.name,
                category,
            })
        })
        .collect()
    }
}
