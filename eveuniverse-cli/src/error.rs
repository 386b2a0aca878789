//! Error types emitted by the eveuniverse CLI.

use std::num::ParseIntError;
use std::sync::Arc;

use camino::Utf8PathBuf;
use eveuniverse_core::schema::{ParseEntityKindError, ParseSectionError};
use eveuniverse_core::{EngineError, StoreError};
use eveuniverse_data::ClientBuildError;
use thiserror::Error;

/// Errors emitted by the eveuniverse CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// The entity kind is not mirrored.
    #[error(transparent)]
    InvalidKind(#[from] ParseEntityKindError),
    /// A requested section does not exist.
    #[error(transparent)]
    InvalidSection(#[from] ParseSectionError),
    /// An ID list contains something that is not an integer.
    #[error("{field} contains an invalid ID {value:?}: {source}")]
    InvalidId {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    /// `load-types` was given nothing to load.
    #[error("nothing to load: pass --all, --ships, --structures or an ID list")]
    NothingToLoad,
    /// Opening the SQLite store failed.
    #[error("failed to open store at {path:?}: {source}")]
    OpenStore {
        path: Utf8PathBuf,
        #[source]
        source: StoreError,
    },
    /// Constructing a remote adapter failed.
    #[error("failed to build client for {base_url:?}: {source}")]
    BuildClient {
        base_url: String,
        #[source]
        source: ClientBuildError,
    },
    /// The engine rejected an operation.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Some queued units failed after their retries.
    #[error("{count} task(s) failed, first: {first}")]
    TasksFailed { count: usize, first: String },
    /// Serializing a stored record failed.
    #[error("failed to serialize output: {0}")]
    SerializeOutput(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
