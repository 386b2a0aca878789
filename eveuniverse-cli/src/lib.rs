//! Command-line interface for mirroring the EVE universe into SQLite.
#![forbid(unsafe_code)]

use std::io::{self, Write};

use clap::{Parser, Subcommand};

mod error;
mod load;
mod names;
mod prices;
mod session;

pub use error::CliError;

use load::{LoadMapArgs, LoadObjectArgs, LoadTypesArgs};
use names::ResolveNamesArgs;
use prices::RefreshPricesArgs;

pub(crate) const ARG_DATABASE: &str = "database";
pub(crate) const ARG_ESI_BASE_URL: &str = "esi-base-url";
pub(crate) const ARG_SDE_CACHE_DIR: &str = "sde-cache-dir";
pub(crate) const ARG_KIND: &str = "kind";
pub(crate) const ARG_ID: &str = "id";
pub(crate) const ARG_CHILDREN: &str = "children";
pub(crate) const ARG_SECTIONS: &str = "sections";
pub(crate) const ARG_ALL: &str = "all";
pub(crate) const ARG_SHIPS: &str = "ships";
pub(crate) const ARG_STRUCTURES: &str = "structures";
pub(crate) const ARG_CATEGORIES: &str = "categories";
pub(crate) const ARG_GROUPS: &str = "groups";
pub(crate) const ARG_TYPES: &str = "types";
pub(crate) const ARG_DOGMAS: &str = "dogmas";
pub(crate) const ARG_MINUTES_UNTIL_STALE: &str = "minutes-until-stale";
pub(crate) const ARG_IDS: &str = "ids";
pub(crate) const ENV_LOAD_OBJECT_KIND: &str = "EVEUNIVERSE_CMDS_LOAD_OBJECT_KIND";
pub(crate) const ENV_LOAD_OBJECT_ID: &str = "EVEUNIVERSE_CMDS_LOAD_OBJECT_ID";
pub(crate) const ENV_RESOLVE_NAMES_IDS: &str = "EVEUNIVERSE_CMDS_RESOLVE_NAMES_IDS";

/// Run the eveuniverse CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns [`CliError`] when arguments or configuration are invalid, the
/// store cannot be opened, or any scheduled unit of work fails.
pub fn run() -> Result<(), CliError> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            print!("{err}");
            return Ok(());
        }
        Err(err) => return Err(CliError::ArgumentParsing(err)),
    };
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    dispatch(cli.command, &mut writer)
}

fn dispatch(command: Command, writer: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::LoadObject(args) => load::run_load_object_with(args, writer),
        Command::LoadMap(args) => load::run_load_map_with(args, writer),
        Command::LoadTypes(args) => load::run_load_types_with(args, writer),
        Command::RefreshPrices(args) => prices::run_refresh_prices_with(args, writer),
        Command::ResolveNames(args) => names::run_resolve_names_with(args, writer),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "eveuniverse",
    about = "Mirror EVE Online universe data into a local SQLite store",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load one entity, optionally with its children.
    LoadObject(LoadObjectArgs),
    /// Load every region with its constellations and solar systems.
    LoadMap(LoadMapArgs),
    /// Load inventory categories, groups and types.
    LoadTypes(LoadTypesArgs),
    /// Refresh average and adjusted market prices.
    RefreshPrices(RefreshPricesArgs),
    /// Resolve IDs of any category to names.
    ResolveNames(ResolveNamesArgs),
}

#[cfg(test)]
mod tests;
