//! SQLite-backed [`Store`] and [`AdvisoryLock`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Params, params, params_from_iter};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::migrations::initialise_schema;
use super::{Store, StoreError};
use crate::market::{MarketPrice, PriceEntry, plan_refresh};
use crate::names::{EntityCategory, NamedEntity};
use crate::record::{
    EntityId, EntityRecord, Fields, InlineRecord, NaturalKey, RawRecord, Upserted, merge_fields,
};
use crate::schema::{EntityKind, SectionSet};
use crate::source::SupplementaryResource;
use crate::tasks::AdvisoryLock;

/// SQLite limits bound parameters per statement to 999 by default. The store
/// chunks `IN` queries to remain below that ceiling.
const SQLITE_MAX_VARIABLE_NUMBER: usize = 999;

/// Parameters bound ahead of the ID list in chunked queries.
const LEADING_PARAMETERS: usize = 3;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Entity store persisted in a single SQLite database.
///
/// Every write runs in its own transaction. The connection is not shared
/// across threads; open one store per worker.
pub struct SqliteStore {
    connection: Connection,
    path: Option<PathBuf>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] when the file cannot be opened and
    /// [`StoreError::VersionMismatch`] when it was written by another schema
    /// version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut connection = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(sqlite("set busy timeout"))?;
        initialise_schema(&mut connection)?;
        debug!("opened entity store at {}", path.display());
        Ok(Self {
            connection,
            path: Some(path.to_path_buf()),
        })
    }

    /// A private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when SQLite cannot create the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut connection = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        initialise_schema(&mut connection)?;
        Ok(Self {
            connection,
            path: None,
        })
    }

    /// Location of the database file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn entity_rows<P: Params>(
        &self,
        operation: &'static str,
        kind: EntityKind,
        sql: &str,
        params: P,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        let mut statement = self
            .connection
            .prepare_cached(sql)
            .map_err(sqlite(operation))?;
        let rows = statement
            .query_map(params, |row| {
                Ok((
                    row.get::<_, EntityId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(sqlite(operation))?;
        let mut records = Vec::new();
        for row in rows {
            let (id, fields, sections, last_updated) = row.map_err(sqlite(operation))?;
            records.push(EntityRecord {
                kind,
                id,
                fields: decode_json(operation, &fields)?,
                sections: SectionSet::from_bits(sections),
                last_updated: decode_time(operation, &last_updated)?,
            });
        }
        Ok(records)
    }

    fn named_rows<P: Params>(
        &self,
        operation: &'static str,
        sql: &str,
        params: P,
    ) -> Result<Vec<NamedEntity>, StoreError> {
        let mut statement = self
            .connection
            .prepare_cached(sql)
            .map_err(sqlite(operation))?;
        let rows = statement
            .query_map(params, |row| {
                Ok((
                    row.get::<_, EntityId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(sqlite(operation))?;
        let mut entities = Vec::new();
        for row in rows {
            let (id, name, category, last_updated) = row.map_err(sqlite(operation))?;
            let category = category
                .map(|text| {
                    text.parse::<EntityCategory>()
                        .map_err(|err| StoreError::Corrupt {
                            operation,
                            message: err.to_string(),
                        })
                })
                .transpose()?;
            let last_updated = last_updated
                .map(|text| decode_time(operation, &text))
                .transpose()?;
            entities.push(NamedEntity {
                id,
                name,
                category,
                last_updated,
            });
        }
        Ok(entities)
    }

    fn ids<P: Params>(
        &self,
        operation: &'static str,
        sql: &str,
        params: P,
    ) -> Result<Vec<EntityId>, StoreError> {
        let mut statement = self
            .connection
            .prepare_cached(sql)
            .map_err(sqlite(operation))?;
        let rows = statement
            .query_map(params, |row| row.get::<_, EntityId>(0))
            .map_err(sqlite(operation))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(sqlite(operation))
    }
}

impl Store for SqliteStore {
    fn entity(&self, kind: EntityKind, id: EntityId) -> Result<Option<EntityRecord>, StoreError> {
        Ok(self
            .entity_rows(
                "read entity",
                kind,
                "SELECT id, fields, sections, last_updated FROM entities
                    WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
            )?
            .pop())
    }

    fn covered_ids(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        required: SectionSet,
    ) -> Result<BTreeSet<EntityId>, StoreError> {
        let mut covered = BTreeSet::new();
        for chunk in sorted_unique(ids).chunks(id_chunk_size()) {
            let sql = format!(
                "SELECT id FROM entities WHERE kind = ? AND (sections & ?) = ? AND id IN ({})",
                placeholders(chunk.len())
            );
            let bits = i64::from(required.bits());
            let mut values = vec![
                SqlValue::Text(kind.as_str().to_owned()),
                SqlValue::Integer(bits),
                SqlValue::Integer(bits),
            ];
            values.extend(chunk.iter().map(|id| SqlValue::Integer(*id)));
            covered.extend(self.ids("read covered ids", &sql, params_from_iter(values))?);
        }
        Ok(covered)
    }

    fn entities(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
    ) -> Result<Vec<EntityRecord>, StoreError> {
        let mut records = Vec::new();
        for chunk in sorted_unique(ids).chunks(id_chunk_size()) {
            let sql = format!(
                "SELECT id, fields, sections, last_updated FROM entities
                    WHERE kind = ? AND id IN ({}) ORDER BY id",
                placeholders(chunk.len())
            );
            let mut values = vec![SqlValue::Text(kind.as_str().to_owned())];
            values.extend(chunk.iter().map(|id| SqlValue::Integer(*id)));
            records.extend(self.entity_rows(
                "read entities",
                kind,
                &sql,
                params_from_iter(values),
            )?);
        }
        Ok(records)
    }

    fn entity_ids(&self, kind: EntityKind) -> Result<Vec<EntityId>, StoreError> {
        self.ids(
            "read entity ids",
            "SELECT id FROM entities WHERE kind = ?1 ORDER BY id",
            [kind.as_str()],
        )
    }

    fn referencing_entities(
        &self,
        kind: EntityKind,
        field: &str,
        target: EntityId,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        self.entity_rows(
            "read referencing entities",
            kind,
            "SELECT id, fields, sections, last_updated FROM entities
                WHERE kind = ?1 AND json_extract(fields, ?2) = ?3 ORDER BY id",
            params![kind.as_str(), format!("$.{field}"), target],
        )
    }

    fn upsert_entity(
        &self,
        kind: EntityKind,
        id: EntityId,
        fields: &Fields,
        sections: SectionSet,
        synced_at: DateTime<Utc>,
    ) -> Result<Upserted<EntityRecord>, StoreError> {
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite("begin entity upsert"))?;
        let existing: Option<(String, u32)> = transaction
            .query_row(
                "SELECT fields, sections FROM entities WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(sqlite("read entity for upsert"))?;
        let created = existing.is_none();
        let (mut merged, loaded) = match existing {
            Some((text, bits)) => (
                decode_json::<Fields>("read entity for upsert", &text)?,
                SectionSet::from_bits(bits),
            ),
            None => (Fields::new(), SectionSet::EMPTY),
        };
        merge_fields(&mut merged, fields);
        let sections = loaded.union(sections);
        transaction
            .execute(
                "INSERT INTO entities (kind, id, fields, sections, last_updated)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT (kind, id) DO UPDATE SET
                        fields = excluded.fields,
                        sections = excluded.sections,
                        last_updated = excluded.last_updated",
                params![
                    kind.as_str(),
                    id,
                    encode_json("write entity", &merged)?,
                    sections.bits(),
                    encode_time(synced_at),
                ],
            )
            .map_err(sqlite("write entity"))?;
        transaction
            .commit()
            .map_err(sqlite("commit entity upsert"))?;
        Ok(Upserted {
            record: EntityRecord {
                kind,
                id,
                fields: merged,
                sections,
                last_updated: synced_at,
            },
            created,
        })
    }

    fn upsert_inline(
        &self,
        kind: EntityKind,
        parent_id: EntityId,
        other_key: &NaturalKey,
        fields: &Fields,
        synced_at: DateTime<Utc>,
    ) -> Result<Upserted<InlineRecord>, StoreError> {
        let key = encode_json("encode inline key", other_key)?;
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite("begin inline upsert"))?;
        let existing: Option<String> = transaction
            .query_row(
                "SELECT fields FROM inline_entities
                    WHERE kind = ?1 AND parent_id = ?2 AND other_key = ?3",
                params![kind.as_str(), parent_id, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(sqlite("read inline entity for upsert"))?;
        let created = existing.is_none();
        let mut merged = match existing {
            Some(text) => decode_json::<Fields>("read inline entity for upsert", &text)?,
            None => Fields::new(),
        };
        merge_fields(&mut merged, fields);
        transaction
            .execute(
                "INSERT INTO inline_entities (kind, parent_id, other_key, fields, last_updated)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT (kind, parent_id, other_key) DO UPDATE SET
                        fields = excluded.fields,
                        last_updated = excluded.last_updated",
                params![
                    kind.as_str(),
                    parent_id,
                    key,
                    encode_json("write inline entity", &merged)?,
                    encode_time(synced_at),
                ],
            )
            .map_err(sqlite("write inline entity"))?;
        transaction
            .commit()
            .map_err(sqlite("commit inline upsert"))?;
        Ok(Upserted {
            record: InlineRecord {
                kind,
                parent_id,
                other_key: other_key.clone(),
                fields: merged,
                last_updated: synced_at,
            },
            created,
        })
    }

    fn inline_records(
        &self,
        kind: EntityKind,
        parent_id: EntityId,
    ) -> Result<Vec<InlineRecord>, StoreError> {
        let operation = "read inline entities";
        let mut statement = self
            .connection
            .prepare_cached(
                "SELECT other_key, fields, last_updated FROM inline_entities
                    WHERE kind = ?1 AND parent_id = ?2",
            )
            .map_err(sqlite(operation))?;
        let rows = statement
            .query_map(params![kind.as_str(), parent_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(sqlite(operation))?;
        let mut records = Vec::new();
        for row in rows {
            let (key, fields, last_updated) = row.map_err(sqlite(operation))?;
            records.push(InlineRecord {
                kind,
                parent_id,
                other_key: decode_json(operation, &key)?,
                fields: decode_json(operation, &fields)?,
                last_updated: decode_time(operation, &last_updated)?,
            });
        }
        records.sort_by(|left, right| left.other_key.cmp(&right.other_key));
        Ok(records)
    }

    fn add_station_services(
        &self,
        station_id: EntityId,
        names: &[String],
    ) -> Result<(), StoreError> {
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite("begin station services"))?;
        {
            let mut insert_service = transaction
                .prepare_cached("INSERT OR IGNORE INTO station_services (name) VALUES (?1)")
                .map_err(sqlite("prepare insert service"))?;
            let mut find_service = transaction
                .prepare_cached("SELECT id FROM station_services WHERE name = ?1")
                .map_err(sqlite("prepare find service"))?;
            let mut link_service = transaction
                .prepare_cached(
                    "INSERT OR IGNORE INTO station_service_links (station_id, service_id)
                        VALUES (?1, ?2)",
                )
                .map_err(sqlite("prepare link service"))?;
            for name in names {
                insert_service
                    .execute([name])
                    .map_err(sqlite("insert service"))?;
                let service_id: i64 = find_service
                    .query_row([name], |row| row.get(0))
                    .map_err(sqlite("find service"))?;
                link_service
                    .execute(params![station_id, service_id])
                    .map_err(sqlite("link service"))?;
            }
        }
        transaction
            .commit()
            .map_err(sqlite("commit station services"))
    }

    fn station_services(&self, station_id: EntityId) -> Result<Vec<String>, StoreError> {
        let operation = "read station services";
        let mut statement = self
            .connection
            .prepare_cached(
                "SELECT services.name FROM station_service_links AS links
                    JOIN station_services AS services ON services.id = links.service_id
                    WHERE links.station_id = ?1
                    ORDER BY services.name",
            )
            .map_err(sqlite(operation))?;
        let rows = statement
            .query_map([station_id], |row| row.get::<_, String>(0))
            .map_err(sqlite(operation))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(sqlite(operation))
    }

    fn replace_supplementary_rows(
        &self,
        resource: SupplementaryResource,
        type_id: EntityId,
        rows: &[RawRecord],
    ) -> Result<usize, StoreError> {
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite("begin supplementary replace"))?;
        transaction
            .execute(
                "DELETE FROM supplementary_rows WHERE resource = ?1 AND type_id = ?2",
                params![resource.as_str(), type_id],
            )
            .map_err(sqlite("delete supplementary rows"))?;
        {
            let mut insert = transaction
                .prepare_cached(
                    "INSERT INTO supplementary_rows (resource, type_id, position, fields)
                        VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(sqlite("prepare insert supplementary row"))?;
            let mut position: i64 = 0;
            for row in rows {
                insert
                    .execute(params![
                        resource.as_str(),
                        type_id,
                        position,
                        encode_json("write supplementary row", row)?,
                    ])
                    .map_err(sqlite("insert supplementary row"))?;
                position += 1;
            }
        }
        transaction
            .commit()
            .map_err(sqlite("commit supplementary replace"))?;
        Ok(rows.len())
    }

    fn supplementary_rows(
        &self,
        resource: SupplementaryResource,
        type_id: EntityId,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let operation = "read supplementary rows";
        let mut statement = self
            .connection
            .prepare_cached(
                "SELECT fields FROM supplementary_rows
                    WHERE resource = ?1 AND type_id = ?2 ORDER BY position",
            )
            .map_err(sqlite(operation))?;
        let rows = statement
            .query_map(params![resource.as_str(), type_id], |row| {
                row.get::<_, String>(0)
            })
            .map_err(sqlite(operation))?;
        let mut records = Vec::new();
        for row in rows {
            let text = row.map_err(sqlite(operation))?;
            records.push(decode_json(operation, &text)?);
        }
        Ok(records)
    }

    fn refresh_market_prices(
        &self,
        entries: &[PriceEntry],
        fresh_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let operation = "refresh market prices";
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite("begin market price refresh"))?;
        let known: HashSet<EntityId> = {
            let mut statement = transaction
                .prepare_cached("SELECT id FROM entities WHERE kind = ?1")
                .map_err(sqlite(operation))?;
            let rows = statement
                .query_map([EntityKind::Type.as_str()], |row| row.get::<_, EntityId>(0))
                .map_err(sqlite(operation))?;
            rows.collect::<Result<_, _>>().map_err(sqlite(operation))?
        };
        let mut stored = HashMap::new();
        {
            let mut statement = transaction
                .prepare_cached("SELECT type_id, updated_at FROM market_prices")
                .map_err(sqlite(operation))?;
            let rows = statement
                .query_map([], |row| {
                    Ok((row.get::<_, EntityId>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(sqlite(operation))?;
            for row in rows {
                let (type_id, updated_at) = row.map_err(sqlite(operation))?;
                stored.insert(type_id, decode_time(operation, &updated_at)?);
            }
        }
        let plan = plan_refresh(entries, &known, &stored, fresh_after, now);
        if plan.is_empty() {
            debug!("market prices are fresh, nothing to write");
            return Ok(0);
        }
        {
            let mut upsert = transaction
                .prepare_cached(
                    "INSERT OR REPLACE INTO market_prices
                        (type_id, adjusted_price, average_price, updated_at)
                        VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(sqlite("prepare write market price"))?;
            for price in &plan {
                upsert
                    .execute(params![
                        price.type_id,
                        price.adjusted_price,
                        price.average_price,
                        encode_time(price.updated_at),
                    ])
                    .map_err(sqlite("write market price"))?;
            }
        }
        transaction
            .commit()
            .map_err(sqlite("commit market price refresh"))?;
        Ok(plan.len())
    }

    fn market_price(&self, type_id: EntityId) -> Result<Option<MarketPrice>, StoreError> {
        let operation = "read market price";
        let row: Option<(Option<f64>, Option<f64>, String)> = self
            .connection
            .query_row(
                "SELECT adjusted_price, average_price, updated_at FROM market_prices
                    WHERE type_id = ?1",
                [type_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(sqlite(operation))?;
        row.map(|(adjusted_price, average_price, updated_at)| {
            Ok(MarketPrice {
                type_id,
                adjusted_price,
                average_price,
                updated_at: decode_time(operation, &updated_at)?,
            })
        })
        .transpose()
    }

    fn named_entity(&self, id: EntityId) -> Result<Option<NamedEntity>, StoreError> {
        Ok(self
            .named_rows(
                "read named entity",
                "SELECT id, name, category, last_updated FROM named_entities WHERE id = ?1",
                [id],
            )?
            .pop())
    }

    fn named_entities(&self, ids: &[EntityId]) -> Result<Vec<NamedEntity>, StoreError> {
        let mut entities = Vec::new();
        for chunk in sorted_unique(ids).chunks(id_chunk_size()) {
            let sql = format!(
                "SELECT id, name, category, last_updated FROM named_entities
                    WHERE id IN ({}) ORDER BY id",
                placeholders(chunk.len())
            );
            entities.extend(self.named_rows(
                "read named entities",
                &sql,
                params_from_iter(chunk.iter()),
            )?);
        }
        Ok(entities)
    }

    fn upsert_named_entity(
        &self,
        entity: &NamedEntity,
        synced_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite("begin named entity upsert"))?;
        let existed = transaction
            .query_row(
                "SELECT 1 FROM named_entities WHERE id = ?1",
                [entity.id],
                |_| Ok(()),
            )
            .optional()
            .map_err(sqlite("read named entity for upsert"))?
            .is_some();
        transaction
            .execute(
                "INSERT INTO named_entities (id, name, category, last_updated)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT (id) DO UPDATE SET
                        name = excluded.name,
                        category = excluded.category,
                        last_updated = excluded.last_updated",
                params![
                    entity.id,
                    entity.name,
                    entity.category.map(EntityCategory::as_str),
                    encode_time(synced_at),
                ],
            )
            .map_err(sqlite("write named entity"))?;
        transaction
            .commit()
            .map_err(sqlite("commit named entity upsert"))?;
        Ok(!existed)
    }

    fn insert_named_placeholders(&self, ids: &[EntityId]) -> Result<usize, StoreError> {
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite("begin named placeholders"))?;
        let mut created = 0;
        {
            let mut insert = transaction
                .prepare_cached("INSERT OR IGNORE INTO named_entities (id) VALUES (?1)")
                .map_err(sqlite("prepare insert named placeholder"))?;
            for id in ids {
                created += insert
                    .execute([id])
                    .map_err(sqlite("insert named placeholder"))?;
            }
        }
        transaction
            .commit()
            .map_err(sqlite("commit named placeholders"))?;
        Ok(created)
    }

    fn named_entity_ids(&self, unresolved_only: bool) -> Result<Vec<EntityId>, StoreError> {
        let sql = if unresolved_only {
            "SELECT id FROM named_entities WHERE name = '' ORDER BY id"
        } else {
            "SELECT id FROM named_entities ORDER BY id"
        };
        self.ids("read named entity ids", sql, [])
    }
}

impl AdvisoryLock for SqliteStore {
    fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Utc::now().timestamp_millis();
        let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite("begin lock acquire"))?;
        transaction
            .execute(
                "DELETE FROM task_locks WHERE key = ?1 AND expires_at <= ?2",
                params![key, now],
            )
            .map_err(sqlite("expire task lock"))?;
        let inserted = transaction
            .execute(
                "INSERT OR IGNORE INTO task_locks (key, expires_at) VALUES (?1, ?2)",
                params![key, now.saturating_add(ttl)],
            )
            .map_err(sqlite("take task lock"))?;
        transaction
            .commit()
            .map_err(sqlite("commit lock acquire"))?;
        Ok(inserted == 1)
    }

    fn release(&self, key: &str) -> Result<(), StoreError> {
        self.connection
            .execute("DELETE FROM task_locks WHERE key = ?1", [key])
            .map(|_| ())
            .map_err(sqlite("release task lock"))
    }
}

fn sqlite(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |source| StoreError::Sqlite { operation, source }
}

const fn id_chunk_size() -> usize {
    SQLITE_MAX_VARIABLE_NUMBER - LEADING_PARAMETERS
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn sorted_unique(ids: &[EntityId]) -> Vec<EntityId> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn encode_json<T: Serialize + ?Sized>(
    operation: &'static str,
    value: &T,
) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Json { operation, source })
}

fn decode_json<T: DeserializeOwned>(operation: &'static str, text: &str) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|source| StoreError::Json { operation, source })
}

fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn decode_time(operation: &'static str, text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| StoreError::Corrupt {
            operation,
            message: format!("invalid timestamp '{text}': {err}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use crate::schema::Section;
    use chrono::Duration as ChronoDuration;
    use rstest::{fixture, rstest};
    use serde_json::json;
    use tempfile::TempDir;

    #[fixture]
    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("open in-memory store")
    }

    fn fields(pairs: &[(&str, FieldValue)]) -> Fields {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    #[rstest]
    fn upserts_merge_fields_and_grow_sections(store: SqliteStore) {
        let now = Utc::now();
        let first = store
            .upsert_entity(
                EntityKind::Type,
                587,
                &fields(&[
                    ("name", FieldValue::from("Rifter")),
                    ("eve_group", FieldValue::Integer(25)),
                ]),
                SectionSet::from_iter([Section::Dogmas]),
                now,
            )
            .expect("create");
        let second = store
            .upsert_entity(
                EntityKind::Type,
                587,
                &fields(&[("name", FieldValue::from("Rifter II"))]),
                SectionSet::from_iter([Section::Graphics]),
                now,
            )
            .expect("update");

        assert!(first.created);
        assert!(!second.created);
        let stored = store
            .entity(EntityKind::Type, 587)
            .expect("lookup")
            .expect("stored");
        assert_eq!(stored, second.record);
        assert_eq!(stored.name(), "Rifter II");
        assert_eq!(stored.foreign_key("eve_group"), Some(25));
        assert!(stored
            .sections
            .covers(SectionSet::from_iter([Section::Dogmas, Section::Graphics])));
    }

    #[rstest]
    fn covered_ids_chunk_large_id_sets(store: SqliteStore) {
        let now = Utc::now();
        let dogmas = SectionSet::from_iter([Section::Dogmas]);
        for id in 1..=1_200 {
            let sections = if id % 2 == 0 { dogmas } else { SectionSet::EMPTY };
            store
                .upsert_entity(EntityKind::Type, id, &Fields::new(), sections, now)
                .expect("seed");
        }
        let ids: Vec<EntityId> = (1..=1_500).collect();

        let covered = store
            .covered_ids(EntityKind::Type, &ids, dogmas)
            .expect("covered ids");
        let all = store
            .covered_ids(EntityKind::Type, &ids, SectionSet::EMPTY)
            .expect("covered ids");

        assert_eq!(covered.len(), 600);
        assert!(covered.iter().all(|id| id % 2 == 0));
        assert_eq!(all.len(), 1_200);
        assert_eq!(store.entities(EntityKind::Type, &ids).expect("entities").len(), 1_200);
        assert!(
            store
                .covered_ids(EntityKind::Group, &ids, SectionSet::EMPTY)
                .expect("covered ids")
                .is_empty()
        );
    }

    #[rstest]
    fn finds_entities_by_foreign_key(store: SqliteStore) {
        let now = Utc::now();
        for (id, planet) in [(40_009_078, 40_009_077), (40_009_079, 40_009_077), (40_009_081, 9)] {
            store
                .upsert_entity(
                    EntityKind::Moon,
                    id,
                    &fields(&[("eve_planet", FieldValue::Integer(planet))]),
                    SectionSet::EMPTY,
                    now,
                )
                .expect("seed moon");
        }

        let moons = store
            .referencing_entities(EntityKind::Moon, "eve_planet", 40_009_077)
            .expect("lookup");

        let ids: Vec<_> = moons.iter().map(|moon| moon.id).collect();
        assert_eq!(ids, vec![40_009_078, 40_009_079]);
    }

    #[rstest]
    fn inline_rows_are_keyed_by_parent_and_natural_key(store: SqliteStore) {
        let now = Utc::now();
        for (key, value) in [(30, 1.0), (9, 350.0), (30, 2.0)] {
            store
                .upsert_inline(
                    EntityKind::TypeDogmaAttribute,
                    587,
                    &NaturalKey::Id(key),
                    &fields(&[("value", FieldValue::Float(value))]),
                    now,
                )
                .expect("upsert");
        }

        let rows = store
            .inline_records(EntityKind::TypeDogmaAttribute, 587)
            .expect("rows");

        let keys: Vec<_> = rows.iter().map(|row| row.other_key.clone()).collect();
        assert_eq!(keys, vec![NaturalKey::Id(9), NaturalKey::Id(30)]);
        assert_eq!(rows[1].fields.get("value"), Some(&FieldValue::Float(2.0)));
    }

    #[rstest]
    fn station_services_are_shared_and_sorted(store: SqliteStore) {
        let services = |names: &[&str]| -> Vec<String> {
            names.iter().map(|name| (*name).to_owned()).collect()
        };
        store
            .add_station_services(60_003_760, &services(&["repair-facilities", "bounty-missions"]))
            .expect("add");
        store
            .add_station_services(60_003_760, &services(&["bounty-missions"]))
            .expect("add again");
        store
            .add_station_services(60_000_001, &services(&["bounty-missions"]))
            .expect("add other station");

        assert_eq!(
            store.station_services(60_003_760).expect("services"),
            services(&["bounty-missions", "repair-facilities"])
        );
        let distinct: i64 = store
            .connection
            .query_row("SELECT COUNT(*) FROM station_services", [], |row| row.get(0))
            .expect("count");
        assert_eq!(distinct, 2);
    }

    #[rstest]
    fn supplementary_rows_are_replaced_whole(store: SqliteStore) {
        let row = |material: i64| match json!({"materialTypeID": material, "quantity": 2}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!("literal is an object"),
        };
        store
            .replace_supplementary_rows(
                SupplementaryResource::TypeMaterials,
                587,
                &[row(34), row(35)],
            )
            .expect("replace");
        let written = store
            .replace_supplementary_rows(SupplementaryResource::TypeMaterials, 587, &[row(36)])
            .expect("replace");

        assert_eq!(written, 1);
        assert_eq!(
            store
                .supplementary_rows(SupplementaryResource::TypeMaterials, 587)
                .expect("rows"),
            vec![row(36)]
        );
    }

    #[rstest]
    fn market_price_refresh_skips_fresh_and_unknown_types(store: SqliteStore) {
        let now = Utc::now();
        for id in [34, 35] {
            store
                .upsert_entity(EntityKind::Type, id, &Fields::new(), SectionSet::EMPTY, now)
                .expect("seed type");
        }
        let entry = |type_id, price| PriceEntry {
            type_id,
            adjusted_price: Some(price),
            average_price: None,
        };
        let entries = [entry(34, 5.0), entry(35, 7.0), entry(99, 1.0)];
        let fresh_after = now - ChronoDuration::minutes(60);

        assert_eq!(
            store
                .refresh_market_prices(&entries, fresh_after, now)
                .expect("refresh"),
            2
        );
        assert_eq!(
            store
                .refresh_market_prices(&entries, fresh_after, now)
                .expect("refresh"),
            0
        );
        let price = store.market_price(34).expect("lookup").expect("stored");
        assert_eq!(price.adjusted_price, Some(5.0));
        assert_eq!(price.updated_at, now);
        assert!(store.market_price(99).expect("lookup").is_none());
    }

    #[rstest]
    fn named_placeholders_stay_unresolved_until_named(store: SqliteStore) {
        assert_eq!(store.insert_named_placeholders(&[3, 1, 3]).expect("insert"), 2);
        assert_eq!(store.named_entity_ids(true).expect("ids"), vec![1, 3]);

        let now = Utc::now();
        let jita = NamedEntity {
            id: 3,
            name: "Jita".to_owned(),
            category: Some(EntityCategory::SolarSystem),
            last_updated: Some(now),
        };
        assert!(!store.upsert_named_entity(&jita, now).expect("upsert"));

        assert_eq!(store.named_entity_ids(true).expect("ids"), vec![1]);
        assert_eq!(store.named_entity_ids(false).expect("ids"), vec![1, 3]);
        assert_eq!(store.named_entity(3).expect("lookup"), Some(jita));
        assert_eq!(
            store.named_entities(&[3, 1, 8]).expect("lookup"),
            vec![
                NamedEntity::unresolved(1),
                store.named_entity(3).expect("lookup").expect("stored"),
            ]
        );
    }

    #[rstest]
    fn task_locks_are_exclusive_until_released_or_expired(store: SqliteStore) {
        let hour = Duration::from_secs(3_600);
        assert!(store.try_acquire("load_map", hour).expect("acquire"));
        assert!(!store.try_acquire("load_map", hour).expect("acquire"));
        store.release("load_map").expect("release");
        assert!(store.try_acquire("load_map", hour).expect("acquire"));

        assert!(store.try_acquire("short", Duration::ZERO).expect("acquire"));
        assert!(store.try_acquire("short", hour).expect("expired lock"));
    }

    #[rstest]
    fn data_survives_reopening() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("eveuniverse.db");
        {
            let store = SqliteStore::open(&path).expect("open");
            store
                .upsert_entity(
                    EntityKind::Region,
                    10_000_002,
                    &fields(&[("name", FieldValue::from("The Forge"))]),
                    SectionSet::EMPTY,
                    Utc::now(),
                )
                .expect("write");
        }

        let store = SqliteStore::open(&path).expect("reopen");
        assert_eq!(store.path(), Some(path.as_path()));
        let region = store
            .entity(EntityKind::Region, 10_000_002)
            .expect("lookup")
            .expect("persisted");
        assert_eq!(region.name(), "The Forge");
    }
}
