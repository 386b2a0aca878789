//! Unit tests for named-entity resolution.

use super::*;
use crate::test_support::{MemoryStore, StubNameSource};
use rstest::{fixture, rstest};

fn resolved(id: EntityId, name: &str, category: EntityCategory) -> ResolvedName {
    ResolvedName {
        id,
        name: name.to_owned(),
        category,
    }
}

fn characters(ids: impl IntoIterator<Item = EntityId>) -> Vec<ResolvedName> {
    ids.into_iter()
        .map(|id| resolved(id, &format!("Pilot {id}"), EntityCategory::Character))
        .collect()
}

#[fixture]
fn store() -> MemoryStore {
    MemoryStore::new()
}

fn config(page_size: usize, batch_size: usize) -> EngineConfig {
    EngineConfig {
        names_page_size: page_size,
        names_batch_size: batch_size,
        ..EngineConfig::default()
    }
}

#[rstest]
fn pages_requests_by_page_size(store: MemoryStore) {
    let source = StubNameSource::new(characters(10..15));
    let resolver = NameResolver::new(&store, &source, &config(2, 500));

    let resolved = resolver.update_from_esi(&[10, 11, 12, 13, 14]).expect("resolve");

    assert_eq!(resolved, 5);
    let sizes: Vec<_> = source.id_calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[rstest]
fn isolates_invalid_ids_by_splitting(store: MemoryStore) {
    let source = StubNameSource::new(characters(10..18)).with_invalid([13]);
    let resolver = NameResolver::new(&store, &source, &EngineConfig::default());

    let resolved = resolver
        .update_from_esi(&(10..18).collect::<Vec<_>>())
        .expect("resolve");

    assert_eq!(resolved, 7);
    assert_eq!(source.id_calls().len(), 7);
    assert!(store.named_entity(13).expect("lookup").is_none());
    assert_eq!(
        store.named_entity(12).expect("lookup").map(|entity| entity.name),
        Some("Pilot 12".to_owned())
    );
}

#[rstest]
fn stops_splitting_at_the_depth_limit(store: MemoryStore) {
    let ids: Vec<EntityId> = (2..66).collect();
    let source = StubNameSource::new(characters(ids.clone())).with_invalid(ids.clone());
    let resolver = NameResolver::new(&store, &source, &EngineConfig::default());

    let resolved = resolver.update_from_esi(&ids).expect("resolve");

    assert_eq!(resolved, 0);
    assert_eq!(source.id_calls().len(), 63);
    assert!(source.id_calls().iter().all(|call| call.len() >= 2));
}

#[rstest]
#[case(vec![0, 1, -5])]
#[case(vec![])]
fn never_sends_reserved_ids(store: MemoryStore, #[case] ids: Vec<EntityId>) {
    let source = StubNameSource::new(Vec::new());
    let resolver = NameResolver::new(&store, &source, &EngineConfig::default());

    assert_eq!(resolver.update_from_esi(&ids).expect("resolve"), 0);
    assert_eq!(resolver.bulk_create(&ids).expect("create"), 0);
    assert!(source.id_calls().is_empty());
}

#[rstest]
fn bulk_create_skips_known_ids(store: MemoryStore) {
    let source = StubNameSource::new(characters([90, 91]));
    let resolver = NameResolver::new(&store, &source, &EngineConfig::default());

    assert_eq!(resolver.bulk_create(&[90]).expect("create"), 1);
    assert_eq!(resolver.bulk_create(&[90, 91, 91]).expect("create"), 1);

    let calls = source.id_calls();
    assert_eq!(calls, vec![vec![90], vec![91]]);
}

#[rstest]
fn bulk_resolve_names_returns_a_snapshot(store: MemoryStore) {
    let source = StubNameSource::new(vec![
        resolved(30_000_142, "Jita", EntityCategory::SolarSystem),
        resolved(1_000_125, "CONCORD", EntityCategory::Corporation),
    ]);
    let resolver = NameResolver::new(&store, &source, &EngineConfig::default());

    let names = resolver
        .bulk_resolve_names(&[30_000_142, 1_000_125, 7])
        .expect("resolve");

    assert_eq!(names.to_name(30_000_142), "Jita");
    assert_eq!(names.to_name(1_000_125), "CONCORD");
    assert_eq!(names.to_name(7), "");
    assert_eq!(resolver.resolve_name(30_000_142).expect("lookup"), "Jita");
}

#[rstest]
fn get_or_create_returns_none_for_rejected_ids(store: MemoryStore) {
    let source = StubNameSource::new(Vec::new()).with_invalid([42]);
    let resolver = NameResolver::new(&store, &source, &EngineConfig::default());

    assert!(resolver.get_or_create(42).expect("lookup").is_none());
    assert!(resolver.get_or_create(1).expect("lookup").is_none());
}

#[rstest]
fn get_or_create_reads_the_store_first(store: MemoryStore) {
    let source = StubNameSource::new(characters([95_465_499]));
    let resolver = NameResolver::new(&store, &source, &EngineConfig::default());

    let (first, created) = resolver
        .get_or_create(95_465_499)
        .expect("lookup")
        .expect("known entity");
    let (second, again) = resolver
        .get_or_create(95_465_499)
        .expect("lookup")
        .expect("known entity");

    assert!(created);
    assert!(!again);
    assert_eq!(first.name, second.name);
    assert_eq!(source.id_calls().len(), 1);
}

#[rstest]
fn a_failing_name_batch_fails_the_call(store: MemoryStore) {
    let source = StubNameSource::new(vec![
        resolved(10, "Alpha", EntityCategory::Character),
        resolved(11, "Bravo", EntityCategory::Character),
        resolved(12, "Charlie", EntityCategory::Character),
    ])
    .failing_name_batch(1);
    let resolver = NameResolver::new(&store, &source, &config(1000, 2));
    let names: Vec<String> = ["Alpha", "Bravo", "Charlie"]
        .into_iter()
        .map(str::to_owned)
        .collect();

    let result = resolver.fetch_by_names(&names, false);

    assert!(result.is_err());
    assert_eq!(source.name_calls().len(), 2);
    assert!(store.named_entity(10).expect("lookup").is_some());
    assert!(store.named_entity(12).expect("lookup").is_none());
}

#[rstest]
fn fetch_by_names_keeps_stored_entities_unless_updating(store: MemoryStore) {
    let source = StubNameSource::new(vec![resolved(10, "Alpha", EntityCategory::Alliance)]);
    let resolver = NameResolver::new(&store, &source, &EngineConfig::default());
    let stale = NamedEntity {
        id: 10,
        name: "Old Alpha".to_owned(),
        category: Some(EntityCategory::Alliance),
        last_updated: None,
    };
    store
        .upsert_named_entity(&stale, Utc::now())
        .expect("seed entity");
    let names = vec!["Alpha".to_owned()];

    let kept = resolver.fetch_by_names(&names, false).expect("fetch");
    assert_eq!(kept[0].name, "Old Alpha");

    let updated = resolver.fetch_by_names(&names, true).expect("fetch");
    assert_eq!(updated[0].name, "Alpha");
}

#[rstest]
#[case(1_000_044, EntityCategory::Corporation, true, true)]
#[case(1_000_125, EntityCategory::Corporation, true, false)]
#[case(3_019_499, EntityCategory::Character, true, false)]
#[case(98_000_001, EntityCategory::Corporation, false, false)]
fn classifies_npc_entities(
    #[case] id: EntityId,
    #[case] category: EntityCategory,
    #[case] npc: bool,
    #[case] starter: bool,
) {
    let entity = NamedEntity::from(resolved(id, "x", category));
    assert_eq!(entity.is_npc(), npc);
    assert_eq!(entity.is_npc_starter_corporation(), starter);
}

#[rstest]
fn parses_category_names() {
    for category in EntityCategory::ALL {
        assert_eq!(category.as_str().parse::<EntityCategory>(), Ok(category));
    }
    assert!("moon".parse::<EntityCategory>().is_err());
}
