use super::*;
use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

fn row(value: Value) -> RawRecord {
    value.as_object().cloned().expect("object literal")
}

fn materials() -> Vec<RawRecord> {
    vec![
        row(json!({"typeID": 587, "materialTypeID": 34, "quantity": 2000})),
        row(json!({"typeID": 587, "materialTypeID": 35, "quantity": 500})),
        row(json!({"typeID": 603, "materialTypeID": 34, "quantity": 900})),
        row(json!({"materialTypeID": 36, "quantity": 1})),
    ]
}

/// A source whose remote refuses connections, so only cached data answers.
#[fixture]
fn offline() -> (TempDir, SdeSource) {
    let dir = TempDir::new().expect("create temp dir");
    let cache_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
    let source = SdeSource::with_config(
        HttpConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(1)),
        cache_dir,
    )
    .expect("source should build");
    (dir, source)
}

fn seed(source: &SdeSource, fetched_at: DateTime<Utc>) -> Utf8PathBuf {
    let path = cache_path(
        source.cache_dir(),
        SupplementaryResource::TypeMaterials.as_str(),
    );
    write_cache(&path, fetched_at, &materials()).expect("write cache");
    path
}

#[rstest]
fn rows_are_indexed_by_owning_type() {
    let dataset = Dataset::index(Utc::now(), materials());

    assert_eq!(dataset.rows_for(587).len(), 2);
    assert_eq!(dataset.rows_for(603).len(), 1);
    assert!(dataset.rows_for(1).is_empty());
    assert_eq!(dataset.by_type.values().map(Vec::len).sum::<usize>(), 3);
}

#[rstest]
fn fresh_disk_caches_answer_without_the_remote(offline: (TempDir, SdeSource)) {
    let (_guard, source) = offline;
    seed(&source, Utc::now());

    let rows = source
        .rows(SupplementaryResource::TypeMaterials, 587)
        .expect("cached rows");

    assert_eq!(rows, materials()[..2].to_vec());
}

#[rstest]
fn loaded_datasets_are_kept_in_memory(offline: (TempDir, SdeSource)) {
    let (_guard, source) = offline;
    let path = seed(&source, Utc::now());
    source
        .rows(SupplementaryResource::TypeMaterials, 587)
        .expect("first read");
    std::fs::remove_file(&path).expect("remove cache");

    let rows = source
        .rows(SupplementaryResource::TypeMaterials, 603)
        .expect("memory read");

    assert_eq!(rows.len(), 1);
}

#[rstest]
fn stale_caches_are_downloaded_again(offline: (TempDir, SdeSource)) {
    let (_guard, source) = offline;
    seed(&source, Utc::now() - chrono::Duration::hours(25));

    let err = source
        .rows(SupplementaryResource::TypeMaterials, 587)
        .expect_err("download attempted");

    assert!(err.is_transient());
}

#[rstest]
fn max_age_is_configurable(offline: (TempDir, SdeSource)) {
    let (_guard, source) = offline;
    let source = source.with_max_age(Duration::from_secs(48 * 3_600));
    seed(&source, Utc::now() - chrono::Duration::hours(25));

    let rows = source
        .rows(SupplementaryResource::TypeMaterials, 587)
        .expect("cached rows");

    assert_eq!(rows.len(), 2);
}

#[rstest]
fn unreadable_caches_fall_back_to_the_remote(offline: (TempDir, SdeSource)) {
    let (_guard, source) = offline;
    let path = cache_path(
        source.cache_dir(),
        SupplementaryResource::TypeMaterials.as_str(),
    );
    std::fs::write(&path, b"garbage!").expect("write garbage");

    let err = source
        .rows(SupplementaryResource::TypeMaterials, 587)
        .expect_err("download attempted");

    assert!(err.is_transient());
}
