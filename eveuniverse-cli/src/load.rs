//! Loader commands: single objects, the map and inventory types.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use eveuniverse_core::{
    EngineConfig, EntityId, EntityKind, Section, SectionSet, Store, SyncOptions,
};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::session::{ConnectionConfig, Session, report_drain};
use crate::{
    ARG_ALL, ARG_CATEGORIES, ARG_CHILDREN, ARG_DATABASE, ARG_DOGMAS, ARG_ESI_BASE_URL, ARG_GROUPS,
    ARG_ID, ARG_KIND, ARG_SDE_CACHE_DIR, ARG_SECTIONS, ARG_SHIPS, ARG_STRUCTURES, ARG_TYPES,
    CliError, ENV_LOAD_OBJECT_ID, ENV_LOAD_OBJECT_KIND,
};

/// CLI arguments for the `load-object` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Fetch one entity from ESI and persist it, creating the \
                 parents it references first. With --children the entity's \
                 declared children are loaded as well, limited to the \
                 requested sections.",
    about = "Load a single entity"
)]
#[ortho_config(prefix = "EVEUNIVERSE")]
pub(crate) struct LoadObjectArgs {
    /// Entity kind, for example `solar_system` or `type`.
    #[arg(value_name = "kind")]
    #[serde(default)]
    pub(crate) kind: Option<String>,
    /// Entity ID.
    #[arg(value_name = "id")]
    #[serde(default)]
    pub(crate) id: Option<EntityId>,
    /// Also load declared children.
    #[arg(
        long = ARG_CHILDREN,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "bool"
    )]
    #[serde(default)]
    pub(crate) children: Option<bool>,
    /// Comma-separated sections to load, for example `planets,moons`.
    #[arg(long = ARG_SECTIONS, value_name = "list")]
    #[serde(default)]
    pub(crate) sections: Option<String>,
    /// Path to the SQLite database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Base URL of the ESI API.
    #[arg(long = ARG_ESI_BASE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) esi_base_url: Option<String>,
    /// Directory for cached static data exports.
    #[arg(long = ARG_SDE_CACHE_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) sde_cache_dir: Option<Utf8PathBuf>,
}

impl LoadObjectArgs {
    pub(crate) fn into_config(self) -> Result<LoadObjectConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        LoadObjectConfig::try_from(merged)
    }
}

/// Resolved `load-object` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadObjectConfig {
    pub(crate) connection: ConnectionConfig,
    pub(crate) kind: EntityKind,
    pub(crate) id: EntityId,
    pub(crate) options: SyncOptions,
}

impl TryFrom<LoadObjectArgs> for LoadObjectConfig {
    type Error = CliError;

    fn try_from(args: LoadObjectArgs) -> Result<Self, Self::Error> {
        let kind = args
            .kind
            .ok_or(CliError::MissingArgument {
                field: ARG_KIND,
                env: ENV_LOAD_OBJECT_KIND,
            })?
            .parse::<EntityKind>()?;
        let id = args.id.ok_or(CliError::MissingArgument {
            field: ARG_ID,
            env: ENV_LOAD_OBJECT_ID,
        })?;
        let mut options =
            SyncOptions::default().with_sections(parse_sections(args.sections.as_deref())?);
        if args.children.unwrap_or(false) {
            options = options.with_children();
        }
        Ok(Self {
            connection: ConnectionConfig::resolve(
                args.database,
                args.esi_base_url,
                args.sde_cache_dir,
            ),
            kind,
            id,
            options,
        })
    }
}

/// CLI arguments for the `load-map` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Enqueue every region listed by ESI together with its \
                 constellations and solar systems, then work the queue.",
    about = "Load the whole map"
)]
#[ortho_config(prefix = "EVEUNIVERSE")]
pub(crate) struct LoadMapArgs {
    /// Comma-separated sections to load with every solar system.
    #[arg(long = ARG_SECTIONS, value_name = "list")]
    #[serde(default)]
    pub(crate) sections: Option<String>,
    /// Path to the SQLite database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Base URL of the ESI API.
    #[arg(long = ARG_ESI_BASE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) esi_base_url: Option<String>,
    /// Directory for cached static data exports.
    #[arg(long = ARG_SDE_CACHE_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) sde_cache_dir: Option<Utf8PathBuf>,
}

impl LoadMapArgs {
    pub(crate) fn into_config(self) -> Result<LoadMapConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        LoadMapConfig::try_from(merged)
    }
}

/// Resolved `load-map` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadMapConfig {
    pub(crate) connection: ConnectionConfig,
    pub(crate) engine: EngineConfig,
}

impl TryFrom<LoadMapArgs> for LoadMapConfig {
    type Error = CliError;

    fn try_from(args: LoadMapArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            connection: ConnectionConfig::resolve(
                args.database,
                args.esi_base_url,
                args.sde_cache_dir,
            ),
            engine: engine_config(parse_sections(args.sections.as_deref())?),
        })
    }
}

/// CLI arguments for the `load-types` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Enqueue inventory categories, groups and types. Named \
                 collections (--all, --ships, --structures) and explicit ID \
                 lists can be combined.",
    about = "Load inventory types"
)]
#[ortho_config(prefix = "EVEUNIVERSE")]
pub(crate) struct LoadTypesArgs {
    /// Load every category with its groups and types.
    #[arg(
        long = ARG_ALL,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "bool"
    )]
    #[serde(default)]
    pub(crate) all: Option<bool>,
    /// Load the ship category.
    #[arg(
        long = ARG_SHIPS,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "bool"
    )]
    #[serde(default)]
    pub(crate) ships: Option<bool>,
    /// Load the structure category.
    #[arg(
        long = ARG_STRUCTURES,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "bool"
    )]
    #[serde(default)]
    pub(crate) structures: Option<bool>,
    /// Comma-separated category IDs.
    #[arg(long = ARG_CATEGORIES, value_name = "ids")]
    #[serde(default)]
    pub(crate) categories: Option<String>,
    /// Comma-separated group IDs.
    #[arg(long = ARG_GROUPS, value_name = "ids")]
    #[serde(default)]
    pub(crate) groups: Option<String>,
    /// Comma-separated type IDs.
    #[arg(long = ARG_TYPES, value_name = "ids")]
    #[serde(default)]
    pub(crate) types: Option<String>,
    /// Load dogma attributes and effects for explicitly listed IDs.
    #[arg(
        long = ARG_DOGMAS,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "bool"
    )]
    #[serde(default)]
    pub(crate) dogmas: Option<bool>,
    /// Path to the SQLite database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Base URL of the ESI API.
    #[arg(long = ARG_ESI_BASE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) esi_base_url: Option<String>,
    /// Directory for cached static data exports.
    #[arg(long = ARG_SDE_CACHE_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) sde_cache_dir: Option<Utf8PathBuf>,
}

impl LoadTypesArgs {
    pub(crate) fn into_config(self) -> Result<LoadTypesConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        LoadTypesConfig::try_from(merged)
    }
}

/// Resolved `load-types` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadTypesConfig {
    pub(crate) connection: ConnectionConfig,
    pub(crate) all: bool,
    pub(crate) ships: bool,
    pub(crate) structures: bool,
    pub(crate) categories: Vec<EntityId>,
    pub(crate) groups: Vec<EntityId>,
    pub(crate) types: Vec<EntityId>,
    pub(crate) dogmas: bool,
}

impl LoadTypesConfig {
    fn has_id_lists(&self) -> bool {
        !(self.categories.is_empty() && self.groups.is_empty() && self.types.is_empty())
    }
}

impl TryFrom<LoadTypesArgs> for LoadTypesConfig {
    type Error = CliError;

    fn try_from(args: LoadTypesArgs) -> Result<Self, Self::Error> {
        let config = Self {
            connection: ConnectionConfig::resolve(
                args.database,
                args.esi_base_url,
                args.sde_cache_dir,
            ),
            all: args.all.unwrap_or(false),
            ships: args.ships.unwrap_or(false),
            structures: args.structures.unwrap_or(false),
            categories: parse_ids(ARG_CATEGORIES, args.categories.as_deref())?,
            groups: parse_ids(ARG_GROUPS, args.groups.as_deref())?,
            types: parse_ids(ARG_TYPES, args.types.as_deref())?,
            dogmas: args.dogmas.unwrap_or(false),
        };
        if config.all || config.ships || config.structures || config.has_id_lists() {
            Ok(config)
        } else {
            Err(CliError::NothingToLoad)
        }
    }
}

pub(crate) fn run_load_object_with(
    args: LoadObjectArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.into_config()?;
    let session = Session::open(&config.connection, EngineConfig::default())?;
    let ((), report) =
        session.run(|engine| engine.load_object(config.kind, config.id, &config.options))?;
    report_drain(writer, &report)?;

    let stored = session
        .store()
        .entity(config.kind, config.id)
        .map_err(eveuniverse_core::EngineError::from)?;
    match stored {
        Some(record) => {
            let rendered =
                serde_json::to_string_pretty(&record).map_err(CliError::SerializeOutput)?;
            writeln!(writer, "{rendered}").map_err(CliError::WriteOutput)
        }
        None => {
            log::warn!("{} {} was not stored", config.kind, config.id);
            Ok(())
        }
    }
}

pub(crate) fn run_load_map_with(args: LoadMapArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let session = Session::open(&config.connection, config.engine)?;
    let (regions, report) = session.run(|engine| engine.load_map())?;
    writeln!(writer, "scheduled {regions} region(s)").map_err(CliError::WriteOutput)?;
    report_drain(writer, &report)
}

pub(crate) fn run_load_types_with(
    args: LoadTypesArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.into_config()?;
    let session = Session::open(&config.connection, EngineConfig::default())?;
    let (scheduled, report) = session.run(|engine| {
        let mut scheduled = 0;
        if config.all {
            scheduled += engine.load_all_types()?;
        }
        if config.ships {
            scheduled += engine.load_ship_types()?;
        }
        if config.structures {
            scheduled += engine.load_structure_types()?;
        }
        if config.has_id_lists() {
            scheduled += engine.load_types(
                &config.categories,
                &config.groups,
                &config.types,
                config.dogmas,
            )?;
        }
        Ok(scheduled)
    })?;
    writeln!(writer, "scheduled {scheduled} unit(s)").map_err(CliError::WriteOutput)?;
    report_drain(writer, &report)
}

/// Engine settings with the toggles for `sections` switched on.
pub(crate) fn engine_config(sections: SectionSet) -> EngineConfig {
    let mut config = EngineConfig::default();
    for section in sections.iter() {
        match section {
            Section::AsteroidBelts => config.load_asteroid_belts = true,
            Section::Dogmas => config.load_dogmas = true,
            Section::Graphics => config.load_graphics = true,
            Section::MarketGroups => config.load_market_groups = true,
            Section::Moons => config.load_moons = true,
            Section::Planets => config.load_planets = true,
            Section::Stargates => config.load_stargates = true,
            Section::Stars => config.load_stars = true,
            Section::Stations => config.load_stations = true,
            Section::TypeMaterials => config.load_type_materials = true,
            Section::IndustryActivities => config.load_industry_activities = true,
        }
    }
    config
}

/// Parse a comma-separated section list; blank entries are skipped.
pub(crate) fn parse_sections(raw: Option<&str>) -> Result<SectionSet, CliError> {
    let Some(raw) = raw else {
        return Ok(SectionSet::EMPTY);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.parse::<Section>().map_err(CliError::from))
        .collect()
}

/// Parse a comma-separated ID list; blank entries are skipped.
pub(crate) fn parse_ids(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Vec<EntityId>, CliError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value.parse::<EntityId>().map_err(|source| CliError::InvalidId {
                field,
                value: value.to_owned(),
                source,
            })
        })
        .collect()
}
