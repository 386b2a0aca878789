//! `refresh-prices` command.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use eveuniverse_core::EngineConfig;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::session::{ConnectionConfig, Session, report_drain};
use crate::{ARG_DATABASE, ARG_ESI_BASE_URL, ARG_MINUTES_UNTIL_STALE, ARG_SDE_CACHE_DIR, CliError};

/// CLI arguments for the `refresh-prices` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Fetch average and adjusted prices for every type and \
                 store them for types known locally. Prices updated within \
                 the staleness window are left untouched.",
    about = "Refresh market prices"
)]
#[ortho_config(prefix = "EVEUNIVERSE")]
pub(crate) struct RefreshPricesArgs {
    /// Age in minutes after which a stored price is refreshed.
    #[arg(long = ARG_MINUTES_UNTIL_STALE, value_name = "minutes")]
    #[serde(default)]
    pub(crate) minutes_until_stale: Option<u32>,
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

impl RefreshPricesArgs {
    pub(crate) fn into_config(self) -> Result<RefreshPricesConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        Ok(RefreshPricesConfig::from(merged))
    }
}

/// Resolved `refresh-prices` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RefreshPricesConfig {
    pub(crate) connection: ConnectionConfig,
    /// Unset means the engine's configured window.
    pub(crate) minutes_until_stale: Option<u32>,
}

impl From<RefreshPricesArgs> for RefreshPricesConfig {
    fn from(args: RefreshPricesArgs) -> Self {
        Self {
            connection: ConnectionConfig::resolve(
                args.database,
                args.esi_base_url,
                args.sde_cache_dir,
            ),
            minutes_until_stale: args.minutes_until_stale,
        }
    }
}

pub(crate) fn run_refresh_prices_with(
    args: RefreshPricesArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.into_config()?;
    let session = Session::open(&config.connection, EngineConfig::default())?;
    let (updated, report) =
        session.run(|engine| engine.update_market_prices(config.minutes_until_stale))?;
    writeln!(writer, "updated {updated} price(s)").map_err(CliError::WriteOutput)?;
    report_drain(writer, &report)
}
