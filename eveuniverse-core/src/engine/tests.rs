//! Unit tests for synchronization, expansion and the loaders.

use super::*;
use crate::market::{MarketPrice, PriceEntry};
use crate::record::{FieldValue, Fields, NaturalKey};
use crate::source::{SourceError, SupplementaryResource};
use crate::test_support::{
    MemoryStore, RecordingExecutor, StubEntitySource, StubPriceSource, StubSupplementarySource,
    record,
};
use proptest::prelude::*;
use rstest::{fixture, rstest};
use serde_json::{Value, json};


pub(super) const JITA: EntityId = 30_000_142;
pub(super) const JITA_I: EntityId = 40_009_077;
pub(super) const JITA_I_MOON: EntityId = 40_009_078;

pub(super) struct Harness {
    pub(super) store: MemoryStore,
    pub(super) source: StubEntitySource,
    pub(super) executor: RecordingExecutor,
    pub(super) supplementary: StubSupplementarySource,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            source: StubEntitySource::new(),
            executor: RecordingExecutor::new(),
            supplementary: StubSupplementarySource::new(),
        }
    }

    pub(super) fn engine(&self, config: EngineConfig) -> SyncEngine<'_> {
        SyncEngine::new(&self.store, &self.source, &self.executor, config)
            .expect("standard registry")
            .with_supplementary(&self.supplementary)
    }

    /// Category 6 with group 25 and type 587.
    pub(super) fn script_ship_tree(&self) {
        self.source
            .with_object(
                EntityKind::Category,
                6,
                json!({"category_id": 6, "name": "Ship", "published": true, "groups": [25]}),
            )
            .with_object(
                EntityKind::Group,
                25,
                json!({
                    "group_id": 25,
                    "name": "Frigate",
                    "category_id": 6,
                    "published": true,
                    "types": [587]
                }),
            )
            .with_object(EntityKind::Type, 587, rifter());
    }

    /// Jita with one planet carrying one moon.
    pub(super) fn script_jita(&self) {
        self.source
            .with_object(
                EntityKind::SolarSystem,
                JITA,
                json!({
                    "system_id": JITA,
                    "name": "Jita",
                    "security_status": 0.945_913,
                    "position": {"x": 1.0, "y": 2.0, "z": 3.0},
                    "planets": [
                        {"planet_id": JITA_I, "moons": [JITA_I_MOON], "asteroid_belts": []}
                    ]
                }),
            )
            .with_object(
                EntityKind::Planet,
                JITA_I,
                json!({
                    "planet_id": JITA_I,
                    "name": "Jita I",
                    "system_id": JITA,
                    "type_id": 11,
                    "position": {"x": 5.0, "y": 0.0, "z": 0.0}
                }),
            )
            .with_object(
                EntityKind::Moon,
                JITA_I_MOON,
                json!({
                    "moon_id": JITA_I_MOON,
                    "name": "Jita I - Moon 1",
                    "system_id": JITA,
                    "position": {"x": 6.0, "y": 0.0, "z": 0.0}
                }),
            );
    }
}

pub(super) fn rifter() -> Value {
    json!({
        "type_id": 587,
        "name": "Rifter",
        "group_id": 25,
        "published": true,
        "graphic_id": 46,
        "market_group_id": 64,
        "dogma_attributes": [{"attribute_id": 9, "value": 350.0}],
        "dogma_effects": [{"effect_id": 11, "is_default": false}]
    })
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

fn object(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

#[rstest]
fn get_or_create_fetches_once(harness: Harness) {
    harness.script_ship_tree();
    let engine = harness.engine(EngineConfig::default());

    let (first, created) = engine
        .get_or_create(EntityKind::Category, 6, &SyncOptions::default())
        .expect("create");
    let (second, again) = engine
        .get_or_create(EntityKind::Category, 6, &SyncOptions::default())
        .expect("lookup");

    assert!(created);
    assert!(!again);
    assert_eq!(first.name(), "Ship");
    assert_eq!(second.boolean("published"), Some(true));
    assert_eq!(harness.source.object_calls(EntityKind::Category, 6), 1);
    assert_eq!(harness.store.count(EntityKind::Group), 0);
}

#[rstest]
fn update_or_create_always_refetches(harness: Harness) {
    harness.script_ship_tree();
    let engine = harness.engine(EngineConfig::default());

    engine
        .update_or_create(EntityKind::Category, 6, &SyncOptions::default())
        .expect("create");
    let (_, created) = engine
        .update_or_create(EntityKind::Category, 6, &SyncOptions::default())
        .expect("update");

    assert!(!created);
    assert_eq!(harness.source.object_calls(EntityKind::Category, 6), 2);
}

#[rstest]
fn unknown_remote_ids_are_not_found(harness: Harness) {
    let engine = harness.engine(EngineConfig::default());
    let err = engine
        .get_or_create(EntityKind::Region, 42, &SyncOptions::default())
        .expect_err("nothing scripted");
    assert!(matches!(
        err,
        EngineError::NotFound {
            kind: EntityKind::Region,
            id: 42
        }
    ));
}

#[rstest]
fn kinds_without_endpoints_cannot_be_fetched(harness: Harness) {
    let engine = harness.engine(EngineConfig::default());
    let err = engine
        .get_or_create(EntityKind::Unit, 1, &SyncOptions::default())
        .expect_err("units are never fetched");
    assert!(matches!(err, EngineError::MissingObjectEndpoint { .. }));
    assert!(harness.source.calls().is_empty());
}

#[rstest]
fn children_are_written_after_their_parent(harness: Harness) {
    harness.script_ship_tree();
    let engine = harness.engine(EngineConfig::default());

    engine
        .get_or_create(
            EntityKind::Category,
            6,
            &SyncOptions::default().with_children(),
        )
        .expect("create tree");

    assert_eq!(
        harness.store.writes(),
        vec![
            (EntityKind::Category, 6),
            (EntityKind::Group, 25),
            (EntityKind::Type, 587),
        ]
    );
    let rifter = harness
        .store
        .entity(EntityKind::Type, 587)
        .expect("lookup")
        .expect("stored");
    assert_eq!(rifter.foreign_key("eve_group"), Some(25));
}

#[rstest]
fn children_are_enqueued_when_not_waiting(harness: Harness) {
    harness.script_ship_tree();
    let engine = harness.engine(EngineConfig::default());
    let options = SyncOptions::default().with_children().without_waiting();

    engine
        .update_or_create(EntityKind::Category, 6, &options)
        .expect("create");

    assert_eq!(harness.store.writes(), vec![(EntityKind::Category, 6)]);
    let units = harness.executor.units();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].priority, 7);
    match &units[0].task {
        Task::UpdateOrCreate { kind, id, options } => {
            assert_eq!((*kind, *id), (EntityKind::Group, 25));
            assert!(options.include_children);
            assert!(!options.wait_for_children);
        }
        other => panic!("unexpected task {other:?}"),
    }
}

#[rstest]
fn foreign_keys_of_disabled_sections_are_not_mapped(harness: Harness) {
    harness.script_ship_tree();
    harness.source.with_object(
        EntityKind::Graphic,
        46,
        json!({"graphic_id": 46, "graphic_file": "res:/dx9/model/ship/minmatar/frigate.red"}),
    );
    let engine = harness.engine(EngineConfig::default());

    let (plain, _) = engine
        .update_or_create(EntityKind::Type, 587, &SyncOptions::default())
        .expect("create");
    assert_eq!(plain.value("eve_graphic"), None);
    assert_eq!(harness.source.object_calls(EntityKind::Graphic, 46), 0);

    let options = SyncOptions::default().with_sections(SectionSet::from_iter([Section::Graphics]));
    let (with_graphic, _) = engine
        .update_or_create(EntityKind::Type, 587, &options)
        .expect("update");
    assert_eq!(with_graphic.foreign_key("eve_graphic"), Some(46));
    assert!(with_graphic.sections.contains(Section::Graphics));
}

#[rstest]
fn section_requests_refetch_until_covered(harness: Harness) {
    harness.script_ship_tree();
    harness.source.with_object(
        EntityKind::DogmaAttribute,
        9,
        json!({"attribute_id": 9, "name": "hp", "published": true}),
    );
    let engine = harness.engine(EngineConfig::default());
    let dogmas = SyncOptions::default().with_sections(SectionSet::from_iter([Section::Dogmas]));

    engine
        .get_or_create(EntityKind::Type, 587, &SyncOptions::default())
        .expect("create");
    let (record, created) = engine
        .get_or_create(EntityKind::Type, 587, &dogmas)
        .expect("load dogmas");
    engine
        .get_or_create(EntityKind::Type, 587, &dogmas)
        .expect("covered");
    engine
        .get_or_create(EntityKind::Type, 587, &SyncOptions::default())
        .expect("covered");

    assert!(!created);
    assert!(record.sections.contains(Section::Dogmas));
    assert_eq!(harness.source.object_calls(EntityKind::Type, 587), 2);
    let rows = harness
        .store
        .inline_records(EntityKind::TypeDogmaAttribute, 587)
        .expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].other_key, NaturalKey::Id(9));
    assert!(
        harness
            .store
            .entity(EntityKind::DogmaAttribute, 9)
            .expect("lookup")
            .is_some()
    );
}

#[rstest]
fn unresolvable_inline_keys_keep_the_raw_id(harness: Harness) {
    harness.script_ship_tree();
    let engine = harness.engine(EngineConfig::default());
    let dogmas = SyncOptions::default().with_sections(SectionSet::from_iter([Section::Dogmas]));

    engine
        .update_or_create(EntityKind::Type, 587, &dogmas)
        .expect("create");

    let effects = harness
        .store
        .inline_records(EntityKind::TypeDogmaEffect, 587)
        .expect("rows");
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].other_key, NaturalKey::Id(11));
    assert_eq!(effects[0].fields.get("is_default"), Some(&FieldValue::Bool(false)));
}

#[rstest]
fn inline_rows_require_a_stored_parent(harness: Harness) {
    let engine = harness.engine(EngineConfig::default());
    let row = object(json!({"attribute_id": 9, "value": 1.0}));

    let err = engine
        .update_or_create_inline(EntityKind::TypeDogmaAttribute, 587, &row, SectionSet::EMPTY)
        .expect_err("parent missing");

    assert!(matches!(err, EngineError::DataIntegrity { .. }));
}

#[rstest]
fn inline_rows_require_their_functional_key(harness: Harness) {
    harness
        .store
        .seed(record(EntityKind::DogmaEffect, 11, Fields::new(), SectionSet::EMPTY));
    let engine = harness.engine(EngineConfig::default());
    let row = object(json!({"domain": "shipID", "modified_attribute_id": 9}));

    let err = engine
        .update_or_create_inline(EntityKind::DogmaEffectModifier, 11, &row, SectionSet::EMPTY)
        .expect_err("func missing");

    assert!(matches!(err, EngineError::DataIntegrity { .. }));
}

#[rstest]
fn self_references_do_not_recurse(harness: Harness) {
    harness.source.with_object(
        EntityKind::MarketGroup,
        5,
        json!({"market_group_id": 5, "name": "Loop", "parent_group_id": 5, "types": []}),
    );
    let engine = harness.engine(EngineConfig::default());

    let (group, _) = engine
        .get_or_create(EntityKind::MarketGroup, 5, &SyncOptions::default())
        .expect("create");

    assert_eq!(group.value("parent_market_group"), Some(&FieldValue::Null));
    assert_eq!(harness.source.object_calls(EntityKind::MarketGroup, 5), 1);
}

#[rstest]
fn list_only_kinds_scan_the_list(harness: Harness) {
    harness.source.with_list(
        EntityKind::Race,
        vec![
            json!({"race_id": 1, "name": "Caldari", "alliance_id": 500_001}),
            json!({"race_id": 2, "name": "Minmatar", "alliance_id": 500_002}),
        ],
    );
    let engine = harness.engine(EngineConfig::default());

    let (race, _) = engine
        .get_or_create(EntityKind::Race, 2, &SyncOptions::default())
        .expect("listed");
    let err = engine
        .get_or_create(EntityKind::Race, 99, &SyncOptions::default())
        .expect_err("not listed");

    assert_eq!(race.name(), "Minmatar");
    assert!(matches!(err, EngineError::NotFound { id: 99, .. }));
}

#[rstest]
fn update_all_writes_list_only_rows_from_one_response(harness: Harness) {
    harness.source.with_list(
        EntityKind::Race,
        vec![
            json!({"race_id": 1, "name": "Caldari"}),
            json!({"race_id": 2, "name": "Minmatar"}),
            json!("not a row"),
        ],
    );
    let engine = harness.engine(EngineConfig::default());

    let written = engine
        .update_or_create_all(EntityKind::Race, &SyncOptions::default())
        .expect("update all");

    assert_eq!(written, 2);
    assert_eq!(harness.store.count(EntityKind::Race), 2);
    assert_eq!(harness.source.calls(), vec![(EntityKind::Race, None)]);
}

#[rstest]
fn update_all_enqueues_when_not_waiting(harness: Harness) {
    harness
        .source
        .with_list(EntityKind::Category, vec![json!(6), json!(9), json!(91)]);
    let engine = harness.engine(EngineConfig::default());

    let handled = engine
        .update_or_create_all(EntityKind::Category, &SyncOptions::default().without_waiting())
        .expect("enqueue");

    assert_eq!(handled, 3);
    assert_eq!(harness.executor.task_names(), vec!["update_or_create"; 3]);
    assert!(harness.store.writes().is_empty());
}

#[rstest]
#[case(EntityKind::Moon)]
#[case(EntityKind::Unit)]
fn kinds_without_list_endpoints_cannot_be_enumerated(harness: Harness, #[case] kind: EntityKind) {
    let engine = harness.engine(EngineConfig::default());
    let err = engine
        .update_or_create_all(kind, &SyncOptions::default())
        .expect_err("not listed");
    assert!(matches!(err, EngineError::MissingListEndpoint { kind: failed } if failed == kind));
    assert!(harness.source.calls().is_empty());
}

#[rstest]
fn bulk_get_or_create_fetches_only_missing_ids(harness: Harness) {
    harness.script_ship_tree();
    harness
        .store
        .seed(record(EntityKind::Group, 18, Fields::new(), SectionSet::EMPTY));
    let engine = harness.engine(EngineConfig::default());

    let groups = engine
        .bulk_get_or_create(EntityKind::Group, &[25, 18, 25], &SyncOptions::default())
        .expect("bulk");

    let ids: Vec<_> = groups.iter().map(|group| group.id).collect();
    assert_eq!(ids, vec![18, 25]);
    assert_eq!(harness.source.object_calls(EntityKind::Group, 25), 1);
    assert_eq!(harness.source.object_calls(EntityKind::Group, 18), 0);
}

#[rstest]
fn planets_borrow_their_children_from_the_system(harness: Harness) {
    harness.script_jita();
    let engine = harness.engine(EngineConfig::default());
    let options = SyncOptions::default()
        .with_children()
        .with_sections(SectionSet::from_iter([Section::Moons]));

    let (planet, _) = engine
        .get_or_create(EntityKind::Planet, JITA_I, &options)
        .expect("planet tree");

    assert_eq!(planet.foreign_key("eve_solar_system"), Some(JITA));
    assert!(planet.sections.contains(Section::Moons));
    let moon = harness
        .store
        .entity(EntityKind::Moon, JITA_I_MOON)
        .expect("lookup")
        .expect("moon stored");
    assert_eq!(moon.foreign_key("eve_planet"), Some(JITA_I));
    let writes = harness.store.writes();
    let planet_at = writes.iter().position(|write| *write == (EntityKind::Planet, JITA_I));
    let moon_at = writes
        .iter()
        .position(|write| *write == (EntityKind::Moon, JITA_I_MOON));
    assert!(planet_at < moon_at);
}

#[rstest]
fn planets_without_child_sections_skip_the_system(harness: Harness) {
    harness.script_jita();
    harness
        .store
        .seed(record(EntityKind::SolarSystem, JITA, Fields::new(), SectionSet::EMPTY));
    harness
        .store
        .seed(record(EntityKind::Type, 11, Fields::new(), SectionSet::EMPTY));
    let engine = harness.engine(EngineConfig::default());
    let options = SyncOptions::default().with_children();

    let (planet, created) = engine
        .get_or_create(EntityKind::Planet, JITA_I, &options)
        .expect("planet alone");

    assert!(created);
    assert_eq!(planet.foreign_key("eve_solar_system"), Some(JITA));
    assert_eq!(harness.source.object_calls(EntityKind::SolarSystem, JITA), 0);
    assert_eq!(harness.source.object_calls(EntityKind::Moon, JITA_I_MOON), 0);
    assert_eq!(harness.store.count(EntityKind::Moon), 0);
}

#[rstest]
fn planet_children_need_an_owning_planet(harness: Harness) {
    harness.script_jita();
    harness.source.with_object(
        EntityKind::Moon,
        40_009_999,
        json!({"moon_id": 40_009_999, "name": "Stray", "system_id": JITA}),
    );
    let engine = harness.engine(EngineConfig::default());

    let err = engine
        .get_or_create(EntityKind::Moon, 40_009_999, &SyncOptions::default())
        .expect_err("no planet lists it");

    assert!(matches!(err, EngineError::DataIntegrity { .. }));
    assert!(
        harness
            .store
            .entity(EntityKind::Moon, 40_009_999)
            .expect("lookup")
            .is_none()
    );
}

#[rstest]
fn stargates_link_their_stored_destination(harness: Harness) {
    harness.script_jita();
    harness.store.seed(record(
        EntityKind::Stargate,
        50_000_057,
        Fields::new(),
        SectionSet::EMPTY,
    ));
    harness.source.with_object(
        EntityKind::Stargate,
        50_000_056,
        json!({
            "stargate_id": 50_000_056,
            "name": "Stargate (Perimeter)",
            "system_id": JITA,
            "type_id": 29_624,
            "position": {"x": 0.0, "y": 0.0, "z": 0.0},
            "destination": {"stargate_id": 50_000_057, "system_id": 30_000_144}
        }),
    );
    let engine = harness.engine(EngineConfig::default());

    let (gate, _) = engine
        .get_or_create(EntityKind::Stargate, 50_000_056, &SyncOptions::default())
        .expect("gate");

    assert_eq!(gate.foreign_key("destination_eve_stargate"), Some(50_000_057));
    assert_eq!(gate.value("destination_eve_solar_system"), Some(&FieldValue::Null));
    let other = harness
        .store
        .entity(EntityKind::Stargate, 50_000_057)
        .expect("lookup")
        .expect("seeded");
    assert_eq!(other.foreign_key("destination_eve_stargate"), Some(50_000_056));
    assert_eq!(other.foreign_key("destination_eve_solar_system"), Some(JITA));
    assert_eq!(harness.source.object_calls(EntityKind::SolarSystem, 30_000_144), 0);
}

#[rstest]
fn stations_attach_their_services(harness: Harness) {
    harness.script_jita();
    harness.source.with_object(
        EntityKind::Station,
        60_003_760,
        json!({
            "station_id": 60_003_760,
            "name": "Jita IV - Moon 4 - Caldari Navy Assembly Plant",
            "system_id": JITA,
            "owner": 1_000_035,
            "services": ["market", "fitting", "market"]
        }),
    );
    let engine = harness.engine(EngineConfig::default());

    let (station, _) = engine
        .get_or_create(EntityKind::Station, 60_003_760, &SyncOptions::default())
        .expect("station");

    assert_eq!(station.integer("owner_id"), Some(1_000_035));
    assert_eq!(
        harness.store.station_services(60_003_760).expect("services"),
        vec!["fitting".to_owned(), "market".to_owned()]
    );
}

#[rstest]
fn type_materials_pull_in_referenced_types(harness: Harness) {
    let harness = Harness {
        supplementary: StubSupplementarySource::new().with_rows(
            SupplementaryResource::TypeMaterials,
            587,
            vec![object(
                json!({"typeID": 587, "materialTypeID": 34, "quantity": 100}),
            )],
        ),
        ..harness
    };
    harness.script_ship_tree();
    harness.source.with_object(
        EntityKind::Type,
        34,
        json!({"type_id": 34, "name": "Tritanium", "group_id": 18}),
    );
    let engine = harness.engine(EngineConfig {
        load_type_materials: true,
        ..EngineConfig::default()
    });

    engine
        .get_or_create(EntityKind::Type, 587, &SyncOptions::default())
        .expect("type");

    let rows = harness
        .store
        .supplementary_rows(SupplementaryResource::TypeMaterials, 587)
        .expect("rows");
    assert_eq!(rows.len(), 1);
    assert!(
        harness
            .store
            .entity(EntityKind::Type, 34)
            .expect("lookup")
            .is_some()
    );
}

#[rstest]
fn supplementary_sections_need_a_source(harness: Harness) {
    harness.script_ship_tree();
    let engine = SyncEngine::new(
        &harness.store,
        &harness.source,
        &harness.executor,
        EngineConfig::default(),
    )
    .expect("engine");
    let options = SyncOptions::default()
        .with_sections(SectionSet::from_iter([Section::IndustryActivities]));

    let err = engine
        .update_or_create(EntityKind::Type, 587, &options)
        .expect_err("no supplementary source");

    assert!(matches!(
        err,
        EngineError::MissingSupplementarySource {
            section: Section::IndustryActivities
        }
    ));
}

#[rstest]
fn transient_source_failures_are_retryable(harness: Harness) {
    harness.source.fail_once(
        EntityKind::Region,
        10_000_002,
        SourceError::Transient {
            path: "/universe/regions/10000002/".to_owned(),
            message: "timeout".to_owned(),
        },
    );
    let engine = harness.engine(EngineConfig::default());
    let err = engine
        .get_or_create(EntityKind::Region, 10_000_002, &SyncOptions::default())
        .expect_err("transient");
    assert!(err.is_transient());
}

#[rstest]
fn load_map_enqueues_every_region(harness: Harness) {
    harness
        .source
        .with_list(EntityKind::Region, vec![json!(10_000_002), json!(10_000_043)]);
    let engine = harness.engine(EngineConfig {
        tasks_priority: 4,
        ..EngineConfig::default()
    });

    assert_eq!(engine.load_map().expect("load map"), 2);

    let units = harness.executor.units();
    assert!(units.iter().all(|unit| unit.priority == 4));
    assert!(units.iter().all(|unit| matches!(
        unit.task,
        Task::UpdateOrCreate {
            kind: EntityKind::Region,
            options: SyncOptions {
                include_children: true,
                wait_for_children: false,
                ..
            },
            ..
        }
    )));
}

#[rstest]
fn load_all_types_needs_categories(harness: Harness) {
    harness.source.with_list(EntityKind::Category, Vec::new());
    let engine = harness.engine(EngineConfig::default());
    assert!(matches!(engine.load_all_types(), Err(EngineError::NoCategories)));
}

#[rstest]
fn load_types_forces_dogmas(harness: Harness) {
    let engine = harness.engine(EngineConfig::default());

    let handled = engine.load_types(&[6], &[25, 26], &[587], true).expect("load");

    assert_eq!(handled, 4);
    let units = harness.executor.units();
    for unit in &units {
        let Task::UpdateOrCreate { kind, options, .. } = &unit.task else {
            panic!("unexpected task {:?}", unit.task);
        };
        assert!(options.sections.contains(Section::Dogmas));
        assert_eq!(options.include_children, *kind != EntityKind::Type);
    }
}

#[rstest]
fn rejected_units_surface_as_errors() {
    let harness = Harness {
        executor: RecordingExecutor::rejecting(),
        ..Harness::new()
    };
    let engine = harness.engine(EngineConfig::default());
    assert!(matches!(
        engine.load_ship_types(),
        Err(EngineError::Executor(_))
    ));
}

#[rstest]
fn market_prices_skip_fresh_and_unknown_types(harness: Harness) {
    harness
        .store
        .seed(record(EntityKind::Type, 34, Fields::new(), SectionSet::EMPTY));
    let prices = StubPriceSource::new(vec![
        PriceEntry {
            type_id: 34,
            adjusted_price: Some(4.5),
            average_price: Some(5.0),
        },
        PriceEntry {
            type_id: 99_999,
            adjusted_price: Some(1.0),
            average_price: None,
        },
    ]);
    let engine = harness.engine(EngineConfig::default()).with_prices(&prices);

    assert_eq!(engine.update_market_prices(None).expect("refresh"), 1);
    assert_eq!(engine.update_market_prices(None).expect("refresh"), 0);
    assert_eq!(engine.update_market_prices(Some(0)).expect("refresh"), 1);
    let stored: Vec<MarketPrice> = harness.store.prices();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].average_price, Some(5.0));
}

#[rstest]
fn failed_price_refresh_changes_nothing(harness: Harness) {
    harness
        .store
        .seed(record(EntityKind::Type, 34, Fields::new(), SectionSet::EMPTY));
    let prices = StubPriceSource::new(vec![PriceEntry {
        type_id: 34,
        adjusted_price: Some(4.5),
        average_price: Some(5.0),
    }]);
    let engine = harness.engine(EngineConfig::default()).with_prices(&prices);
    harness.store.fail_next_price_refresh();

    assert!(engine.update_market_prices(None).is_err());
    assert!(harness.store.prices().is_empty());
}

#[rstest]
fn market_prices_need_a_source(harness: Harness) {
    let engine = harness.engine(EngineConfig::default());
    assert!(matches!(
        engine.update_market_prices(None),
        Err(EngineError::MissingPriceSource)
    ));
}

proptest! {
    #[test]
    fn loaded_sections_only_grow(
        requests in prop::collection::vec(any::<u32>().prop_map(SectionSet::from_bits), 1..6),
    ) {
        let harness = Harness::new();
        harness.script_ship_tree();
        let engine = harness.engine(EngineConfig::default());
        let valid = engine
            .registry()
            .schema_for(EntityKind::Type)
            .expect("type descriptor")
            .valid_sections();
        let mut expected = SectionSet::EMPTY;
        for request in requests {
            let options = SyncOptions::default().with_sections(request);
            let (record, _) = engine
                .update_or_create(EntityKind::Type, 587, &options)
                .expect("update");
            expected = expected.union(request.intersection(valid));
            prop_assert_eq!(record.sections, expected);
        }
    }
}
