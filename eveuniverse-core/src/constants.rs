//! Well-known IDs of the universe dataset.

use crate::record::EntityId;

/// Category of ships.
pub const CATEGORY_SHIP: EntityId = 6;
/// Category of blueprints.
pub const CATEGORY_BLUEPRINT: EntityId = 9;
/// Category of player structures.
pub const CATEGORY_STRUCTURE: EntityId = 65;
/// Category of ship skins.
pub const CATEGORY_SKIN: EntityId = 91;

/// Group of characters.
pub const GROUP_CHARACTER: EntityId = 1;
/// Group of corporations.
pub const GROUP_CORPORATION: EntityId = 2;
/// Group of solar systems.
pub const GROUP_SOLAR_SYSTEM: EntityId = 5;
/// Group of stars.
pub const GROUP_STAR: EntityId = 6;
/// Group of planets.
pub const GROUP_PLANET: EntityId = 7;
/// Group of moons.
pub const GROUP_MOON: EntityId = 8;
/// Group of asteroid belts.
pub const GROUP_ASTEROID_BELT: EntityId = 9;
/// Group of stargates.
pub const GROUP_STARGATE: EntityId = 10;
/// Group of NPC stations.
pub const GROUP_STATION: EntityId = 15;
/// Group of alliances.
pub const GROUP_ALLIANCE: EntityId = 32;

/// Inventory type shared by all moons.
pub const TYPE_MOON: EntityId = 14;
/// Inventory type shared by all asteroid belts.
pub const TYPE_ASTEROID_BELT: EntityId = 15;

/// The Pochven region.
pub const REGION_POCHVEN: EntityId = 10_000_070;

/// Wormhole solar system IDs start here.
pub const W_SPACE_SYSTEM_ID_START: EntityId = 31_000_000;
/// Wormhole solar system IDs end before this value.
pub const W_SPACE_SYSTEM_ID_END: EntityId = 32_000_000;

/// Maximum IDs the names endpoint accepts per request.
pub const DEFAULT_NAMES_PAGE_SIZE: usize = 1000;
/// Maximum names sent per ID lookup request.
pub const DEFAULT_NAMES_BATCH_SIZE: usize = 500;

/// Meters in one light year.
pub const METERS_PER_LIGHT_YEAR: f64 = 9_460_730_472_580_800.0;
/// Meters in one astronomical unit.
pub const METERS_PER_AU: f64 = 149_597_870_691.0;
