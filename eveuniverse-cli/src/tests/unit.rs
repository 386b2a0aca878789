//! Unit tests for argument resolution and command output.

use super::*;
use crate::load::{
    LoadObjectArgs, LoadObjectConfig, LoadTypesArgs, LoadTypesConfig, engine_config, parse_ids,
    parse_sections,
};
use crate::names::{ResolveNamesArgs, ResolveNamesConfig};
use crate::prices::{RefreshPricesArgs, RefreshPricesConfig};
use crate::session::{DEFAULT_DATABASE, DEFAULT_SDE_CACHE_DIR, report_drain};
use camino::Utf8PathBuf;
use eveuniverse_core::tasks::{DrainReport, TaskFailure};
use eveuniverse_core::{EntityKind, Section, SectionSet};
use eveuniverse_data::ESI_BASE_URL;
use rstest::rstest;
use tempfile::TempDir;

fn load_object_args(kind: Option<&str>, id: Option<i64>) -> LoadObjectArgs {
    LoadObjectArgs {
        kind: kind.map(str::to_owned),
        id,
        ..LoadObjectArgs::default()
    }
}

#[rstest]
fn cli_parses_load_object_flags() {
    let cli = Cli::try_parse_from([
        "eveuniverse",
        "load-object",
        "planet",
        "40009077",
        "--children",
        "--database",
        "mirror.sqlite3",
    ])
    .expect("valid arguments");
    match cli.command {
        Command::LoadObject(args) => {
            assert_eq!(args.kind.as_deref(), Some("planet"));
            assert_eq!(args.id, Some(40_009_077));
            assert_eq!(args.children, Some(true));
            assert_eq!(args.database, Some(Utf8PathBuf::from("mirror.sqlite3")));
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[rstest]
fn help_is_not_reported_as_an_error() {
    let err = Cli::try_parse_from(["eveuniverse", "--help"]).expect_err("help exits early");
    assert!(!err.use_stderr());
}

#[rstest]
fn load_object_requires_a_kind() {
    let err = LoadObjectConfig::try_from(load_object_args(None, Some(1)))
        .expect_err("missing kind");
    match err {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, ARG_KIND);
            assert_eq!(env, ENV_LOAD_OBJECT_KIND);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn load_object_defaults_connection_settings() {
    let config = LoadObjectConfig::try_from(load_object_args(Some("type"), Some(587)))
        .expect("valid arguments");

    assert_eq!(config.kind, EntityKind::Type);
    assert_eq!(config.connection.database, Utf8PathBuf::from(DEFAULT_DATABASE));
    assert_eq!(config.connection.esi_base_url, ESI_BASE_URL);
    assert_eq!(
        config.connection.sde_cache_dir,
        Utf8PathBuf::from(DEFAULT_SDE_CACHE_DIR)
    );
    assert!(!config.options.include_children);
    assert!(config.options.sections.is_empty());
}

#[rstest]
fn load_object_rejects_unknown_sections() {
    let args = LoadObjectArgs {
        sections: Some("planets,wormholes".to_owned()),
        ..load_object_args(Some("solar_system"), Some(30_000_142))
    };

    let err = LoadObjectConfig::try_from(args).expect_err("unknown section");

    assert!(matches!(err, CliError::InvalidSection(ref e) if e.name == "wormholes"));
}

#[rstest]
#[case(None, vec![])]
#[case(Some(""), vec![])]
#[case(Some("34"), vec![34])]
#[case(Some("34, 35,,36 "), vec![34, 35, 36])]
fn id_lists_skip_blank_entries(#[case] raw: Option<&str>, #[case] expected: Vec<i64>) {
    assert_eq!(parse_ids(ARG_TYPES, raw).expect("valid list"), expected);
}

#[rstest]
fn id_lists_report_the_offending_entry() {
    let err = parse_ids(ARG_GROUPS, Some("25,frigate")).expect_err("invalid id");
    match err {
        CliError::InvalidId { field, value, .. } => {
            assert_eq!(field, ARG_GROUPS);
            assert_eq!(value, "frigate");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn section_lists_are_trimmed() {
    let sections = parse_sections(Some(" planets , moons,")).expect("valid list");
    assert_eq!(
        sections,
        SectionSet::from_iter([Section::Planets, Section::Moons])
    );
}

#[rstest]
fn sections_switch_on_engine_toggles() {
    let config = engine_config(SectionSet::from_iter([Section::Planets, Section::Stargates]));

    assert!(config.load_planets);
    assert!(config.load_stargates);
    assert!(!config.load_moons);
    assert_eq!(
        config.default_sections(),
        SectionSet::from_iter([Section::Planets, Section::Stargates])
    );
}

#[rstest]
fn load_types_needs_something_to_load() {
    let err = LoadTypesConfig::try_from(LoadTypesArgs::default()).expect_err("empty request");
    assert!(matches!(err, CliError::NothingToLoad));
}

#[rstest]
#[case(LoadTypesArgs { ships: Some(true), ..LoadTypesArgs::default() })]
#[case(LoadTypesArgs { types: Some("587".to_owned()), ..LoadTypesArgs::default() })]
fn load_types_accepts_collections_or_lists(#[case] args: LoadTypesArgs) {
    LoadTypesConfig::try_from(args).expect("something to load");
}

#[rstest]
fn explicit_false_flags_count_as_unset() {
    let args = LoadTypesArgs {
        all: Some(false),
        ..LoadTypesArgs::default()
    };
    let err = LoadTypesConfig::try_from(args).expect_err("nothing requested");
    assert!(matches!(err, CliError::NothingToLoad));
}

#[rstest]
fn resolve_names_requires_ids() {
    let err = ResolveNamesConfig::try_from(ResolveNamesArgs::default()).expect_err("no ids");
    match err {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, ARG_IDS);
            assert_eq!(env, ENV_RESOLVE_NAMES_IDS);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn cli_parses_positional_name_ids() {
    let cli = Cli::try_parse_from(["eveuniverse", "resolve-names", "30000142", "1000125"])
        .expect("valid arguments");
    match cli.command {
        Command::ResolveNames(args) => assert_eq!(args.ids, vec![30_000_142, 1_000_125]),
        other => panic!("unexpected command {other:?}"),
    }
}

#[rstest]
fn refresh_prices_keeps_an_unset_window() {
    let config = RefreshPricesConfig::from(RefreshPricesArgs::default());
    assert_eq!(config.minutes_until_stale, None);
    assert_eq!(config.connection.esi_base_url, ESI_BASE_URL);
}

#[rstest]
fn drain_summaries_are_printed() {
    let report = DrainReport {
        completed: 3,
        skipped: 1,
        retries: 2,
        ..DrainReport::default()
    };
    let mut out = Vec::new();

    report_drain(&mut out, &report).expect("no failures");

    assert_eq!(
        String::from_utf8(out).expect("utf-8 output"),
        "completed 3 task(s), skipped 1, retried 2\n"
    );
}

#[rstest]
fn failed_units_fail_the_command() {
    let report = DrainReport {
        completed: 1,
        failures: vec![
            TaskFailure {
                task: "load_eve_object",
                message: "transient source failure: timeout".to_owned(),
            },
            TaskFailure {
                task: "update_or_create_eve_object",
                message: "not found".to_owned(),
            },
        ],
        ..DrainReport::default()
    };
    let mut out = Vec::new();

    let err = report_drain(&mut out, &report).expect_err("failures reported");

    match err {
        CliError::TasksFailed { count, first } => {
            assert_eq!(count, 2);
            assert!(first.starts_with("load_eve_object: "));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn empty_type_requests_fail_before_opening_a_store() {
    let mut out = Vec::new();
    let err = load::run_load_types_with(LoadTypesArgs::default(), &mut out)
        .expect_err("nothing to load");
    assert!(matches!(err, CliError::NothingToLoad));
    assert!(out.is_empty());
}

#[rstest]
fn unopenable_databases_are_reported() {
    let dir = TempDir::new().expect("tempdir");
    let database = Utf8PathBuf::from_path_buf(dir.path().join("missing/dir/mirror.sqlite3"))
        .expect("utf-8 path");
    let args = LoadObjectArgs {
        database: Some(database.clone()),
        ..load_object_args(Some("race"), Some(1))
    };
    let mut out = Vec::new();

    let err = load::run_load_object_with(args, &mut out).expect_err("store cannot open");

    match err {
        CliError::OpenStore { path, .. } => assert_eq!(path, database),
        other => panic!("unexpected error {other:?}"),
    }
}
