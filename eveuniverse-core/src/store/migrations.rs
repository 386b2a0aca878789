//! Versioned SQLite schema for [`super::SqliteStore`].

use rusqlite::{Connection, OptionalExtension, Transaction};

use super::StoreError;

/// Schema version written by this build.
pub const SCHEMA_VERSION: i64 = 1;

/// Create every table and index inside one transaction and record the
/// schema version.
///
/// Existing databases must already carry [`SCHEMA_VERSION`]; anything else
/// is rejected with [`StoreError::VersionMismatch`].
pub(super) fn initialise_schema(connection: &mut Connection) -> Result<(), StoreError> {
    connection
        .pragma_update(None, "foreign_keys", true)
        .map_err(|source| StoreError::Migration {
            step: "enable foreign keys",
            source,
        })?;

    let transaction = connection
        .transaction()
        .map_err(|source| StoreError::Migration {
            step: "begin schema transaction",
            source,
        })?;

    create_entity_tables(&transaction)?;
    create_derived_tables(&transaction)?;
    create_indexes(&transaction)?;
    ensure_schema_version(&transaction)?;

    transaction
        .commit()
        .map_err(|source| StoreError::Migration {
            step: "commit schema transaction",
            source,
        })
}

fn create_entity_tables(transaction: &Transaction<'_>) -> Result<(), StoreError> {
    run_migration_step(
        transaction,
        "create entities",
        "CREATE TABLE IF NOT EXISTS entities (
            kind TEXT NOT NULL,
            id INTEGER NOT NULL,
            fields TEXT NOT NULL,
            sections INTEGER NOT NULL DEFAULT 0 CHECK (sections >= 0),
            last_updated TEXT NOT NULL,
            PRIMARY KEY (kind, id)
        ) WITHOUT ROWID",
    )?;
    run_migration_step(
        transaction,
        "create inline_entities",
        "CREATE TABLE IF NOT EXISTS inline_entities (
            kind TEXT NOT NULL,
            parent_id INTEGER NOT NULL,
            other_key TEXT NOT NULL,
            fields TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            PRIMARY KEY (kind, parent_id, other_key)
        ) WITHOUT ROWID",
    )?;
    run_migration_step(
        transaction,
        "create named_entities",
        "CREATE TABLE IF NOT EXISTS named_entities (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            category TEXT,
            last_updated TEXT
        )",
    )
}

fn create_derived_tables(transaction: &Transaction<'_>) -> Result<(), StoreError> {
    run_migration_step(
        transaction,
        "create station_services",
        "CREATE TABLE IF NOT EXISTS station_services (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )",
    )?;
    run_migration_step(
        transaction,
        "create station_service_links",
        "CREATE TABLE IF NOT EXISTS station_service_links (
            station_id INTEGER NOT NULL,
            service_id INTEGER NOT NULL,
            PRIMARY KEY (station_id, service_id),
            FOREIGN KEY (service_id) REFERENCES station_services(id) ON DELETE CASCADE
        ) WITHOUT ROWID",
    )?;
    run_migration_step(
        transaction,
        "create supplementary_rows",
        "CREATE TABLE IF NOT EXISTS supplementary_rows (
            resource TEXT NOT NULL,
            type_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            fields TEXT NOT NULL,
            PRIMARY KEY (resource, type_id, position)
        ) WITHOUT ROWID",
    )?;
    run_migration_step(
        transaction,
        "create market_prices",
        "CREATE TABLE IF NOT EXISTS market_prices (
            type_id INTEGER PRIMARY KEY,
            adjusted_price REAL,
            average_price REAL,
            updated_at TEXT NOT NULL
        )",
    )?;
    run_migration_step(
        transaction,
        "create task_locks",
        "CREATE TABLE IF NOT EXISTS task_locks (
            key TEXT PRIMARY KEY,
            expires_at INTEGER NOT NULL
        ) WITHOUT ROWID",
    )
}

fn create_indexes(transaction: &Transaction<'_>) -> Result<(), StoreError> {
    run_migration_step(
        transaction,
        "index inline_entities",
        "CREATE INDEX IF NOT EXISTS idx_inline_entities_parent
            ON inline_entities(kind, parent_id)",
    )?;
    run_migration_step(
        transaction,
        "index unresolved named_entities",
        "CREATE INDEX IF NOT EXISTS idx_named_entities_unresolved
            ON named_entities(id) WHERE name = ''",
    )
}

fn ensure_schema_version(transaction: &Transaction<'_>) -> Result<(), StoreError> {
    run_migration_step(
        transaction,
        "create schema version table",
        "CREATE TABLE IF NOT EXISTS eveuniverse_schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0),
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ) WITHOUT ROWID",
    )?;

    let existing_version: Option<i64> = transaction
        .query_row(
            "SELECT version FROM eveuniverse_schema_version LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|source| StoreError::Migration {
            step: "read schema version",
            source,
        })?;

    match existing_version {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(StoreError::VersionMismatch {
            expected: SCHEMA_VERSION,
            found,
        }),
        None => transaction
            .execute(
                "INSERT INTO eveuniverse_schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )
            .map(|_| ())
            .map_err(|source| StoreError::Migration {
                step: "record schema version",
                source,
            }),
    }
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    step: &'static str,
    sql: &str,
) -> Result<(), StoreError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| StoreError::Migration { step, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn initialising_twice_keeps_one_version_row() {
        let mut connection = Connection::open_in_memory().expect("open database");
        initialise_schema(&mut connection).expect("first run");
        initialise_schema(&mut connection).expect("second run");

        let rows: i64 = connection
            .query_row("SELECT COUNT(*) FROM eveuniverse_schema_version", [], |row| {
                row.get(0)
            })
            .expect("count versions");
        assert_eq!(rows, 1);
    }

    #[rstest]
    fn rejects_other_schema_versions() {
        let mut connection = Connection::open_in_memory().expect("open database");
        initialise_schema(&mut connection).expect("initialise");
        connection
            .execute("UPDATE eveuniverse_schema_version SET version = 7", [])
            .expect("bump version");

        let err = initialise_schema(&mut connection).expect_err("mismatch");
        assert!(matches!(
            err,
            StoreError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found: 7
            }
        ));
    }
}
