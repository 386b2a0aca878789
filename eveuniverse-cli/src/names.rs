//! `resolve-names` command.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use eveuniverse_core::{EngineConfig, EntityId};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::session::{ConnectionConfig, Session};
use crate::{
    ARG_DATABASE, ARG_ESI_BASE_URL, ARG_IDS, ARG_SDE_CACHE_DIR, CliError, ENV_RESOLVE_NAMES_IDS,
};

/// CLI arguments for the `resolve-names` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Resolve IDs of characters, corporations, alliances, \
                 systems, types and other categories to names. Names already \
                 stored locally are answered without a remote call.",
    about = "Resolve IDs to names"
)]
#[ortho_config(prefix = "EVEUNIVERSE")]
pub(crate) struct ResolveNamesArgs {
    /// IDs to resolve.
    #[arg(value_name = "id")]
    #[serde(default)]
    pub(crate) ids: Vec<EntityId>,
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

impl ResolveNamesArgs {
    pub(crate) fn into_config(self) -> Result<ResolveNamesConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ResolveNamesConfig::try_from(merged)
    }
}

/// Resolved `resolve-names` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolveNamesConfig {
    pub(crate) connection: ConnectionConfig,
    pub(crate) ids: Vec<EntityId>,
}

impl TryFrom<ResolveNamesArgs> for ResolveNamesConfig {
    type Error = CliError;

    fn try_from(args: ResolveNamesArgs) -> Result<Self, Self::Error> {
        if args.ids.is_empty() {
            return Err(CliError::MissingArgument {
                field: ARG_IDS,
                env: ENV_RESOLVE_NAMES_IDS,
            });
        }
        Ok(Self {
            connection: ConnectionConfig::resolve(
                args.database,
                args.esi_base_url,
                args.sde_cache_dir,
            ),
            ids: args.ids,
        })
    }
}

pub(crate) fn run_resolve_names_with(
    args: ResolveNamesArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.into_config()?;
    let session = Session::open(&config.connection, EngineConfig::default())?;
    let resolver = session.names(|names| names.bulk_resolve_names(&config.ids))?;
    for id in &config.ids {
        writeln!(writer, "{id}\t{}", resolver.to_name(*id)).map_err(CliError::WriteOutput)?;
    }
    Ok(())
}
