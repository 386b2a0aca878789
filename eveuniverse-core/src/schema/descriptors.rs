//! Built-in descriptors for every mirrored entity kind.

use super::{
    EntityDescriptor, EntityKind, Endpoint, ExpansionStrategy, FieldSpec, Relation, Section,
};

const POSITION_X: FieldSpec = FieldSpec::nested_float("position_x", "position", "x");
const POSITION_Y: FieldSpec = FieldSpec::nested_float("position_y", "position", "y");
const POSITION_Z: FieldSpec = FieldSpec::nested_float("position_z", "position", "z");

const fn independent(
    kind: EntityKind,
    identity: &'static str,
    load_order: u16,
) -> EntityDescriptor {
    EntityDescriptor {
        kind,
        identity,
        object_endpoint: None,
        list_endpoint: None,
        fields: &[],
        functional_key: &[],
        parent_fk: None,
        children: &[],
        inline_objects: &[],
        sections: &[],
        load_order,
        strategy: ExpansionStrategy::Generic,
    }
}

const ANCESTRIES: Endpoint =
    Endpoint::new("Universe.get_universe_ancestries", "/universe/ancestries/");
const BLOODLINES: Endpoint =
    Endpoint::new("Universe.get_universe_bloodlines", "/universe/bloodlines/");
const FACTIONS: Endpoint = Endpoint::new("Universe.get_universe_factions", "/universe/factions/");
const RACES: Endpoint = Endpoint::new("Universe.get_universe_races", "/universe/races/");

pub(super) const ANCESTRY: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(ANCESTRIES),
    list_endpoint: Some(ANCESTRIES),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::foreign_key("eve_bloodline", "bloodline_id", EntityKind::Bloodline),
        FieldSpec::text("description"),
        FieldSpec::integer("icon_id"),
        FieldSpec::text("short_description"),
    ],
    ..independent(EntityKind::Ancestry, "id", 180)
};

pub(super) const ASTEROID_BELT: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_asteroid_belts_asteroid_belt_id",
        "/universe/asteroid_belts/{id}/",
    )),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::foreign_key("eve_planet", "planet_id", EntityKind::Planet),
        POSITION_X,
        POSITION_Y,
        POSITION_Z,
    ],
    strategy: ExpansionStrategy::PlanetChild {
        property: "asteroid_belts",
    },
    ..independent(EntityKind::AsteroidBelt, "asteroid_belt_id", 200)
};

pub(super) const BLOODLINE: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(BLOODLINES),
    list_endpoint: Some(BLOODLINES),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::integer("charisma"),
        FieldSpec::integer("corporation_id"),
        FieldSpec::text("description"),
        FieldSpec::foreign_key("eve_race", "race_id", EntityKind::Race),
        FieldSpec::foreign_key("eve_ship_type", "ship_type_id", EntityKind::Type),
        FieldSpec::integer("intelligence"),
        FieldSpec::integer("memory"),
        FieldSpec::integer("perception"),
        FieldSpec::integer("willpower"),
    ],
    ..independent(EntityKind::Bloodline, "bloodline_id", 170)
};

pub(super) const CATEGORY: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_categories_category_id",
        "/universe/categories/{id}/",
    )),
    list_endpoint: Some(Endpoint::new(
        "Universe.get_universe_categories",
        "/universe/categories/",
    )),
    fields: &[FieldSpec::text("name"), FieldSpec::boolean("published")],
    children: &[Relation::new("groups", EntityKind::Group)],
    ..independent(EntityKind::Category, "category_id", 130)
};

pub(super) const CONSTELLATION: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_constellations_constellation_id",
        "/universe/constellations/{id}/",
    )),
    list_endpoint: Some(Endpoint::new(
        "Universe.get_universe_constellations",
        "/universe/constellations/",
    )),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::foreign_key("eve_region", "region_id", EntityKind::Region),
        POSITION_X,
        POSITION_Y,
        POSITION_Z,
    ],
    children: &[Relation::new("systems", EntityKind::SolarSystem)],
    ..independent(EntityKind::Constellation, "constellation_id", 192)
};

pub(super) const DOGMA_ATTRIBUTE: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Dogma.get_dogma_attributes_attribute_id",
        "/dogma/attributes/{id}/",
    )),
    list_endpoint: Some(Endpoint::new("Dogma.get_dogma_attributes", "/dogma/attributes/")),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::foreign_key("eve_unit", "unit_id", EntityKind::Unit),
        FieldSpec::float("default_value"),
        FieldSpec::text("description"),
        FieldSpec::text("display_name"),
        FieldSpec::boolean("high_is_good"),
        FieldSpec::integer("icon_id"),
        FieldSpec::boolean("published"),
        FieldSpec::boolean("stackable"),
    ],
    ..independent(EntityKind::DogmaAttribute, "attribute_id", 140)
};

pub(super) const DOGMA_EFFECT: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Dogma.get_dogma_effects_effect_id",
        "/dogma/effects/{id}/",
    )),
    list_endpoint: Some(Endpoint::new("Dogma.get_dogma_effects", "/dogma/effects/")),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::text("description"),
        FieldSpec::boolean("disallow_auto_repeat"),
        FieldSpec::foreign_key(
            "discharge_attribute",
            "discharge_attribute_id",
            EntityKind::DogmaAttribute,
        ),
        FieldSpec::text("display_name"),
        FieldSpec::foreign_key(
            "duration_attribute",
            "duration_attribute_id",
            EntityKind::DogmaAttribute,
        ),
        FieldSpec::integer("effect_category"),
        FieldSpec::boolean("electronic_chance"),
        FieldSpec::foreign_key(
            "falloff_attribute",
            "falloff_attribute_id",
            EntityKind::DogmaAttribute,
        ),
        FieldSpec::integer("icon_id"),
        FieldSpec::boolean("is_assistance"),
        FieldSpec::boolean("is_offensive"),
        FieldSpec::boolean("is_warp_safe"),
        FieldSpec::integer("post_expression"),
        FieldSpec::integer("pre_expression"),
        FieldSpec::boolean("published"),
        FieldSpec::foreign_key("range_attribute", "range_attribute_id", EntityKind::DogmaAttribute),
        FieldSpec::boolean("range_chance"),
        FieldSpec::foreign_key(
            "tracking_speed_attribute",
            "tracking_speed_attribute_id",
            EntityKind::DogmaAttribute,
        ),
    ],
    inline_objects: &[Relation::new("modifiers", EntityKind::DogmaEffectModifier)],
    ..independent(EntityKind::DogmaEffect, "effect_id", 142)
};

pub(super) const DOGMA_EFFECT_MODIFIER: EntityDescriptor = EntityDescriptor {
    fields: &[
        FieldSpec::foreign_key("eve_dogma_effect", "eve_dogma_effect", EntityKind::DogmaEffect),
        FieldSpec::text("domain"),
        FieldSpec::text("func"),
        FieldSpec::foreign_key(
            "modified_attribute",
            "modified_attribute_id",
            EntityKind::DogmaAttribute,
        ),
        FieldSpec::foreign_key(
            "modifying_attribute",
            "modifying_attribute_id",
            EntityKind::DogmaAttribute,
        ),
        FieldSpec::foreign_key("modifying_effect", "effect_id", EntityKind::DogmaEffect),
        FieldSpec::integer("operator"),
    ],
    functional_key: &["eve_dogma_effect", "func"],
    parent_fk: Some("eve_dogma_effect"),
    ..independent(EntityKind::DogmaEffectModifier, "", 144)
};

pub(super) const FACTION: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(FACTIONS),
    list_endpoint: Some(FACTIONS),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::integer("corporation_id"),
        FieldSpec::text("description"),
        FieldSpec::foreign_key("eve_solar_system", "solar_system_id", EntityKind::SolarSystem),
        FieldSpec::boolean("is_unique"),
        FieldSpec::integer("militia_corporation_id"),
        FieldSpec::float("size_factor"),
        FieldSpec::integer("station_count"),
        FieldSpec::integer("station_system_count"),
    ],
    ..independent(EntityKind::Faction, "faction_id", 210)
};

pub(super) const GRAPHIC: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_graphics_graphic_id",
        "/universe/graphics/{id}/",
    )),
    list_endpoint: Some(Endpoint::new("Universe.get_universe_graphics", "/universe/graphics/")),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::text("collision_file"),
        FieldSpec::text("graphic_file"),
        FieldSpec::text("icon_folder"),
        FieldSpec::text("sof_dna"),
        FieldSpec::text("sof_fation_name"),
        FieldSpec::text("sof_hull_name"),
        FieldSpec::text("sof_race_name"),
    ],
    ..independent(EntityKind::Graphic, "graphic_id", 120)
};

pub(super) const GROUP: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_groups_group_id",
        "/universe/groups/{id}/",
    )),
    list_endpoint: Some(Endpoint::new("Universe.get_universe_groups", "/universe/groups/")),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::foreign_key("eve_category", "category_id", EntityKind::Category),
        FieldSpec::boolean("published"),
    ],
    children: &[Relation::new("types", EntityKind::Type)],
    ..independent(EntityKind::Group, "group_id", 132)
};

pub(super) const MARKET_GROUP: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Market.get_markets_groups_market_group_id",
        "/markets/groups/{id}/",
    )),
    list_endpoint: Some(Endpoint::new("Market.get_markets_groups", "/markets/groups/")),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::text("description"),
        FieldSpec::foreign_key("parent_market_group", "parent_group_id", EntityKind::MarketGroup),
    ],
    children: &[Relation::new("types", EntityKind::Type)],
    ..independent(EntityKind::MarketGroup, "market_group_id", 230)
};

pub(super) const MOON: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_moons_moon_id",
        "/universe/moons/{id}/",
    )),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::foreign_key("eve_planet", "planet_id", EntityKind::Planet),
        POSITION_X,
        POSITION_Y,
        POSITION_Z,
    ],
    strategy: ExpansionStrategy::PlanetChild { property: "moons" },
    ..independent(EntityKind::Moon, "moon_id", 220)
};

pub(super) const PLANET: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_planets_planet_id",
        "/universe/planets/{id}/",
    )),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::foreign_key("eve_solar_system", "system_id", EntityKind::SolarSystem),
        FieldSpec::foreign_key("eve_type", "type_id", EntityKind::Type),
        POSITION_X,
        POSITION_Y,
        POSITION_Z,
    ],
    children: &[
        Relation::new("asteroid_belts", EntityKind::AsteroidBelt).requires(Section::AsteroidBelts),
        Relation::new("moons", EntityKind::Moon).requires(Section::Moons),
    ],
    sections: &[Section::AsteroidBelts, Section::Moons],
    strategy: ExpansionStrategy::Planet,
    ..independent(EntityKind::Planet, "planet_id", 205)
};

pub(super) const RACE: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(RACES),
    list_endpoint: Some(RACES),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::integer("alliance_id"),
        FieldSpec::text("description"),
    ],
    ..independent(EntityKind::Race, "race_id", 150)
};

pub(super) const REGION: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_regions_region_id",
        "/universe/regions/{id}/",
    )),
    list_endpoint: Some(Endpoint::new("Universe.get_universe_regions", "/universe/regions/")),
    fields: &[FieldSpec::text("name"), FieldSpec::text("description")],
    children: &[Relation::new("constellations", EntityKind::Constellation)],
    ..independent(EntityKind::Region, "region_id", 190)
};

pub(super) const SOLAR_SYSTEM: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_systems_system_id",
        "/universe/systems/{id}/",
    )),
    list_endpoint: Some(Endpoint::new("Universe.get_universe_systems", "/universe/systems/")),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::foreign_key("eve_constellation", "constellation_id", EntityKind::Constellation),
        FieldSpec::foreign_key("eve_star", "star_id", EntityKind::Star).requires(Section::Stars),
        POSITION_X,
        POSITION_Y,
        POSITION_Z,
        FieldSpec::float("security_status"),
    ],
    children: &[
        Relation::new("planets", EntityKind::Planet)
            .requires(Section::Planets)
            .keyed_by("planet_id"),
        Relation::new("stargates", EntityKind::Stargate).requires(Section::Stargates),
        Relation::new("stations", EntityKind::Station).requires(Section::Stations),
    ],
    sections: &[
        Section::Planets,
        Section::Stargates,
        Section::Stars,
        Section::Stations,
    ],
    ..independent(EntityKind::SolarSystem, "system_id", 194)
};

pub(super) const STAR: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_stars_star_id",
        "/universe/stars/{id}/",
    )),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::integer("age"),
        FieldSpec::foreign_key("eve_type", "type_id", EntityKind::Type),
        FieldSpec::float("luminosity"),
        FieldSpec::integer("radius"),
        FieldSpec::text("spectral_class"),
        FieldSpec::integer("temperature"),
    ],
    ..independent(EntityKind::Star, "star_id", 222)
};

pub(super) const STARGATE: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_stargates_stargate_id",
        "/universe/stargates/{id}/",
    )),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::foreign_key(
            "destination_eve_stargate",
            "stargate_id",
            EntityKind::Stargate,
        )
        .from_nested("destination", "stargate_id")
        .without_auto_create(),
        FieldSpec::foreign_key(
            "destination_eve_solar_system",
            "system_id",
            EntityKind::SolarSystem,
        )
        .from_nested("destination", "system_id")
        .without_auto_create(),
        FieldSpec::foreign_key("eve_solar_system", "system_id", EntityKind::SolarSystem),
        FieldSpec::foreign_key("eve_type", "type_id", EntityKind::Type),
        POSITION_X,
        POSITION_Y,
        POSITION_Z,
    ],
    strategy: ExpansionStrategy::Stargate,
    ..independent(EntityKind::Stargate, "stargate_id", 224)
};

pub(super) const STATION: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_stations_station_id",
        "/universe/stations/{id}/",
    )),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::foreign_key("eve_race", "race_id", EntityKind::Race),
        FieldSpec::foreign_key("eve_solar_system", "system_id", EntityKind::SolarSystem),
        FieldSpec::foreign_key("eve_type", "type_id", EntityKind::Type),
        FieldSpec::float("max_dockable_ship_volume"),
        FieldSpec::float("office_rental_cost"),
        FieldSpec::integer("owner_id").from_remote("owner"),
        POSITION_X,
        POSITION_Y,
        POSITION_Z,
        FieldSpec::float("reprocessing_efficiency"),
        FieldSpec::float("reprocessing_stations_take"),
    ],
    strategy: ExpansionStrategy::Station,
    ..independent(EntityKind::Station, "station_id", 207)
};

pub(super) const TYPE: EntityDescriptor = EntityDescriptor {
    object_endpoint: Some(Endpoint::new(
        "Universe.get_universe_types_type_id",
        "/universe/types/{id}/",
    )),
    list_endpoint: Some(Endpoint::new("Universe.get_universe_types", "/universe/types/")),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::float("capacity"),
        FieldSpec::text("description"),
        FieldSpec::foreign_key("eve_graphic", "graphic_id", EntityKind::Graphic)
            .requires(Section::Graphics),
        FieldSpec::foreign_key("eve_group", "group_id", EntityKind::Group),
        FieldSpec::foreign_key("eve_market_group", "market_group_id", EntityKind::MarketGroup)
            .requires(Section::MarketGroups),
        FieldSpec::integer("icon_id"),
        FieldSpec::float("mass"),
        FieldSpec::float("packaged_volume"),
        FieldSpec::integer("portion_size"),
        FieldSpec::float("radius"),
        FieldSpec::boolean("published"),
        FieldSpec::float("volume"),
    ],
    inline_objects: &[
        Relation::new("dogma_attributes", EntityKind::TypeDogmaAttribute)
            .requires(Section::Dogmas),
        Relation::new("dogma_effects", EntityKind::TypeDogmaEffect).requires(Section::Dogmas),
    ],
    sections: &[
        Section::Dogmas,
        Section::Graphics,
        Section::MarketGroups,
        Section::TypeMaterials,
        Section::IndustryActivities,
    ],
    strategy: ExpansionStrategy::InventoryType,
    ..independent(EntityKind::Type, "type_id", 134)
};

pub(super) const TYPE_DOGMA_ATTRIBUTE: EntityDescriptor = EntityDescriptor {
    fields: &[
        FieldSpec::foreign_key("eve_type", "type_id", EntityKind::Type),
        FieldSpec::foreign_key("eve_dogma_attribute", "attribute_id", EntityKind::DogmaAttribute),
        FieldSpec::float("value"),
    ],
    functional_key: &["eve_type", "eve_dogma_attribute"],
    parent_fk: Some("eve_type"),
    ..independent(EntityKind::TypeDogmaAttribute, "", 148)
};

pub(super) const TYPE_DOGMA_EFFECT: EntityDescriptor = EntityDescriptor {
    fields: &[
        FieldSpec::foreign_key("eve_type", "type_id", EntityKind::Type),
        FieldSpec::foreign_key("eve_dogma_effect", "effect_id", EntityKind::DogmaEffect),
        FieldSpec::boolean("is_default"),
    ],
    functional_key: &["eve_type", "eve_dogma_effect"],
    parent_fk: Some("eve_type"),
    ..independent(EntityKind::TypeDogmaEffect, "", 146)
};

pub(super) const UNIT: EntityDescriptor = EntityDescriptor {
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::text("description"),
        FieldSpec::text("display_name"),
    ],
    ..independent(EntityKind::Unit, "unit_id", 100)
};

pub(super) const ALL: [EntityDescriptor; 24] = [
    ANCESTRY,
    ASTEROID_BELT,
    BLOODLINE,
    CATEGORY,
    CONSTELLATION,
    DOGMA_ATTRIBUTE,
    DOGMA_EFFECT,
    DOGMA_EFFECT_MODIFIER,
    FACTION,
    GRAPHIC,
    GROUP,
    MARKET_GROUP,
    MOON,
    PLANET,
    RACE,
    REGION,
    SOLAR_SYSTEM,
    STAR,
    STARGATE,
    STATION,
    TYPE,
    TYPE_DOGMA_ATTRIBUTE,
    TYPE_DOGMA_EFFECT,
    UNIT,
];
