//! Wiring of the store, remote adapters and task queue for one command.

use std::io::Write;

use camino::Utf8PathBuf;
use eveuniverse_core::tasks::DrainReport;
use eveuniverse_core::{
    EngineConfig, EngineError, NameResolver, SqliteStore, SyncEngine, TaskQueue, TaskRunner,
};
use eveuniverse_data::{ESI_BASE_URL, EsiSource, HttpConfig, SdeSource};
use serde::{Deserialize, Serialize};

use crate::CliError;

/// Default SQLite database path.
pub(crate) const DEFAULT_DATABASE: &str = "eveuniverse.sqlite3";

/// Default directory for supplementary dataset caches.
pub(crate) const DEFAULT_SDE_CACHE_DIR: &str = "sde-cache";

/// Resolved locations of the store and remotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ConnectionConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) esi_base_url: String,
    pub(crate) sde_cache_dir: Utf8PathBuf,
}

impl ConnectionConfig {
    /// Fill unset locations with their defaults.
    pub(crate) fn resolve(
        database: Option<Utf8PathBuf>,
        esi_base_url: Option<String>,
        sde_cache_dir: Option<Utf8PathBuf>,
    ) -> Self {
        Self {
            database: database.unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE)),
            esi_base_url: esi_base_url.unwrap_or_else(|| ESI_BASE_URL.to_owned()),
            sde_cache_dir: sde_cache_dir
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_SDE_CACHE_DIR)),
        }
    }
}

/// Everything a command needs to run the engine in-process.
#[derive(Debug)]
pub(crate) struct Session {
    store: SqliteStore,
    esi: EsiSource,
    sde: SdeSource,
    queue: TaskQueue,
    config: EngineConfig,
}

impl Session {
    pub(crate) fn open(
        connection: &ConnectionConfig,
        config: EngineConfig,
    ) -> Result<Self, CliError> {
        let store =
            SqliteStore::open(connection.database.as_std_path()).map_err(|source| {
                CliError::OpenStore {
                    path: connection.database.clone(),
                    source,
                }
            })?;
        let esi = EsiSource::with_config(HttpConfig::new(connection.esi_base_url.clone()))
            .map_err(|source| CliError::BuildClient {
                base_url: connection.esi_base_url.clone(),
                source,
            })?;
        let sde = SdeSource::new(connection.sde_cache_dir.clone()).map_err(|source| {
            CliError::BuildClient {
                base_url: eveuniverse_data::SDE_BASE_URL.to_owned(),
                source,
            }
        })?;
        Ok(Self {
            store,
            esi,
            sde,
            queue: TaskQueue::new(),
            config,
        })
    }

    pub(crate) const fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Run `schedule` against a fresh engine, then drain every unit of work
    /// it queued.
    pub(crate) fn run<T>(
        &self,
        schedule: impl FnOnce(&SyncEngine<'_>) -> Result<T, EngineError>,
    ) -> Result<(T, DrainReport), CliError> {
        let engine = SyncEngine::new(&self.store, &self.esi, &self.queue, self.config.clone())?
            .with_supplementary(&self.sde)
            .with_prices(&self.esi);
        let names = NameResolver::new(&self.store, &self.esi, &self.config);
        let scheduled = schedule(&engine)?;
        let report = TaskRunner::new(&engine, &self.store)
            .with_names(&names)
            .drain(&self.queue);
        Ok((scheduled, report))
    }

    /// Run `resolve` against a name resolver over the session's store.
    pub(crate) fn names<T>(
        &self,
        resolve: impl FnOnce(&NameResolver<'_>) -> Result<T, EngineError>,
    ) -> Result<T, CliError> {
        let names = NameResolver::new(&self.store, &self.esi, &self.config);
        Ok(resolve(&names)?)
    }
}

/// Print a one-line summary of `report`, failing when any unit failed.
pub(crate) fn report_drain(writer: &mut dyn Write, report: &DrainReport) -> Result<(), CliError> {
    writeln!(
        writer,
        "completed {} task(s), skipped {}, retried {}",
        report.completed, report.skipped, report.retries
    )
    .map_err(CliError::WriteOutput)?;
    match report.failures.first() {
        Some(first) => Err(CliError::TasksFailed {
            count: report.failures.len(),
            first: format!("{}: {}", first.task, first.message),
        }),
        None => Ok(()),
    }
}
