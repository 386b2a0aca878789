//! Fetch quirks, inline rows, children and per-strategy post-steps.

use std::collections::BTreeSet;

use chrono::Utc;
use log::{debug, warn};
use serde_json::Value;

use super::{EngineError, SyncEngine, SyncOptions};
use crate::mapper::{self, as_id};
use crate::record::{
    EntityId, EntityRecord, FieldValue, Fields, InlineRecord, NaturalKey, RawRecord, Upserted,
};
use crate::schema::{
    EntityDescriptor, EntityKind, ExpansionStrategy, FieldKind, FieldSpec, SchemaError, Section,
    SectionSet,
};
use crate::source::SupplementaryResource;
use crate::tasks::Task;

const PLANETS: &str = "planets";
const PLANET_ID: &str = "planet_id";
const SYSTEM_ID: &str = "system_id";

impl SyncEngine<'_> {
    /// Raw record for `(descriptor.kind, id)`, with linkage borrowed from
    /// the owning solar system where the strategy requires it.
    ///
    /// Planets only borrow their moons and belts when `expands_children`.
    pub(super) fn fetch_record(
        &self,
        descriptor: &EntityDescriptor,
        id: EntityId,
        expands_children: bool,
    ) -> Result<RawRecord, EngineError> {
        let kind = descriptor.kind;
        if descriptor.object_endpoint.is_none() {
            return Err(EngineError::MissingObjectEndpoint { kind });
        }
        let response = self.fetch_object(descriptor, id)?;
        let mut raw = if descriptor.is_list_only_endpoint() {
            scan_list(descriptor, id, response)?
        } else {
            into_object(kind, id, response)?
        };
        match descriptor.strategy {
            ExpansionStrategy::Planet if expands_children => {
                self.borrow_planet_children(id, &mut raw)?;
            }
            ExpansionStrategy::PlanetChild { property } => {
                self.borrow_owning_planet(kind, id, property, &mut raw)?;
            }
            _ => {}
        }
        Ok(raw)
    }

    fn fetch_object(
        &self,
        descriptor: &EntityDescriptor,
        id: EntityId,
    ) -> Result<Value, EngineError> {
        self.source
            .fetch_object(descriptor, id)
            .map_err(|err| match err {
                not_found if not_found.is_not_found() => EngineError::NotFound {
                    kind: descriptor.kind,
                    id,
                },
                other => other.into(),
            })
    }

    fn system_planets(
        &self,
        kind: EntityKind,
        id: EntityId,
        raw: &RawRecord,
    ) -> Result<Vec<Value>, EngineError> {
        let system_id = raw
            .get(SYSTEM_ID)
            .and_then(as_id)
            .ok_or_else(|| EngineError::integrity(kind, id, "response has no system_id"))?;
        let system_descriptor = self.registry.schema_for(EntityKind::SolarSystem)?;
        let system = self.fetch_object(system_descriptor, system_id)?;
        match system.get(PLANETS) {
            Some(Value::Array(planets)) => Ok(planets.clone()),
            _ => Err(EngineError::integrity(
                kind,
                id,
                format!("solar system {system_id} response has no planets"),
            )),
        }
    }

    fn borrow_planet_children(
        &self,
        id: EntityId,
        raw: &mut RawRecord,
    ) -> Result<(), EngineError> {
        let planets = self.system_planets(EntityKind::Planet, id, raw)?;
        let planet = planets
            .iter()
            .find(|planet| planet.get(PLANET_ID).and_then(as_id) == Some(id))
            .ok_or_else(|| {
                EngineError::integrity(
                    EntityKind::Planet,
                    id,
                    "planet not listed by its solar system",
                )
            })?;
        for property in ["asteroid_belts", "moons"] {
            if let Some(children) = planet.get(property) {
                raw.insert(property.to_owned(), children.clone());
            }
        }
        Ok(())
    }

    fn borrow_owning_planet(
        &self,
        kind: EntityKind,
        id: EntityId,
        property: &str,
        raw: &mut RawRecord,
    ) -> Result<(), EngineError> {
        let planets = self.system_planets(kind, id, raw)?;
        let planet_id = planets
            .iter()
            .find(|planet| {
                planet
                    .get(property)
                    .and_then(Value::as_array)
                    .is_some_and(|members| members.iter().any(|member| as_id(member) == Some(id)))
            })
            .and_then(|planet| planet.get(PLANET_ID).and_then(as_id))
            .ok_or_else(|| {
                EngineError::integrity(
                    kind,
                    id,
                    format!("not listed under the {property} of any planet"),
                )
            })?;
        raw.insert(PLANET_ID.to_owned(), Value::from(planet_id));
        Ok(())
    }

    pub(super) fn expand_inline_objects(
        &self,
        descriptor: &EntityDescriptor,
        parent_id: EntityId,
        raw: &RawRecord,
        sections: SectionSet,
        options: &SyncOptions,
    ) -> Result<(), EngineError> {
        for relation in descriptor.inline_objects(sections) {
            let Some(Value::Array(elements)) = raw.get(relation.remote_field) else {
                continue;
            };
            for element in elements {
                let Some(record) = element.as_object() else {
                    warn!(
                        "skipping malformed {} element of {} {parent_id}",
                        relation.remote_field, descriptor.kind
                    );
                    continue;
                };
                if options.wait_for_children {
                    self.update_or_create_inline(relation.target, parent_id, record, sections)?;
                } else {
                    self.enqueue(
                        Task::UpdateOrCreateInline {
                            kind: relation.target,
                            parent_id,
                            record: record.clone(),
                            sections,
                        },
                        options,
                    )?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn upsert_inline_row(
        &self,
        descriptor: &EntityDescriptor,
        parent_id: EntityId,
        raw: &RawRecord,
        sections: SectionSet,
    ) -> Result<Upserted<InlineRecord>, EngineError> {
        let kind = descriptor.kind;
        let (parent_field, other) = descriptor.functional_pair()?;
        let parent_kind = descriptor
            .field(parent_field)
            .and_then(FieldSpec::target)
            .ok_or(SchemaError::InvalidFunctionalKey { kind })?;
        if self.store.entity(parent_kind, parent_id)?.is_none() {
            return Err(EngineError::integrity(
                parent_kind,
                parent_id,
                format!("parent of {kind} rows is not stored"),
            ));
        }
        let value = mapper::extract(raw, other.remote).ok_or_else(|| {
            EngineError::integrity(
                kind,
                parent_id,
                format!("row lacks functional key '{}'", other.name),
            )
        })?;
        let other_key = self.resolve_other_key(kind, parent_id, other, value, sections)?;
        let fields = mapper::normalize(raw, descriptor, sections, self)?;
        let upserted = self
            .store
            .upsert_inline(kind, parent_id, &other_key, &fields, Utc::now())?;
        debug!("stored {kind} row {parent_id}/{other_key}");
        Ok(upserted)
    }

    fn resolve_other_key(
        &self,
        kind: EntityKind,
        parent_id: EntityId,
        other: &FieldSpec,
        value: &Value,
        sections: SectionSet,
    ) -> Result<NaturalKey, EngineError> {
        let invalid = || {
            EngineError::integrity(
                kind,
                parent_id,
                format!("invalid functional key '{}'", other.name),
            )
        };
        match other.kind {
            FieldKind::ForeignKey(target) => {
                let id = as_id(value).ok_or_else(invalid)?;
                if self.store.entity(target, id)?.is_none() {
                    let options = SyncOptions::default().with_sections(sections);
                    if let Err(err) = self.get_or_create(target, id, &options) {
                        warn!("could not resolve {} {target} {id}: {err}", other.name);
                    }
                }
                Ok(NaturalKey::Id(id))
            }
            FieldKind::Integer => as_id(value).map(NaturalKey::Id).ok_or_else(invalid),
            _ => match mapper::scalar_value(FieldKind::Text, value) {
                FieldValue::Text(text) if !text.is_empty() => Ok(NaturalKey::Text(text)),
                _ => Err(invalid()),
            },
        }
    }

    pub(super) fn expand_children(
        &self,
        descriptor: &EntityDescriptor,
        raw: &RawRecord,
        sections: SectionSet,
        options: &SyncOptions,
    ) -> Result<(), EngineError> {
        let child_options = SyncOptions {
            sections,
            ..*options
        };
        for relation in descriptor.children(sections) {
            let Some(Value::Array(elements)) = raw.get(relation.remote_field) else {
                continue;
            };
            for element in elements {
                let child_id = match relation.id_field {
                    Some(key) => element.get(key).and_then(as_id),
                    None => as_id(element),
                };
                let Some(child_id) = child_id else {
                    warn!(
                        "skipping malformed {} element of {}",
                        relation.remote_field, descriptor.kind
                    );
                    continue;
                };
                if options.wait_for_children {
                    self.update_or_create(relation.target, child_id, &child_options)?;
                } else {
                    self.enqueue(
                        Task::UpdateOrCreate {
                            kind: relation.target,
                            id: child_id,
                            options: child_options,
                        },
                        options,
                    )?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn apply_strategy(
        &self,
        descriptor: &EntityDescriptor,
        record: &EntityRecord,
        raw: &RawRecord,
        sections: SectionSet,
    ) -> Result<(), EngineError> {
        match descriptor.strategy {
            ExpansionStrategy::Stargate => self.link_destination(record),
            ExpansionStrategy::Station => self.attach_services(record.id, raw),
            ExpansionStrategy::InventoryType => self.load_supplementary(record.id, sections),
            ExpansionStrategy::Generic
            | ExpansionStrategy::Planet
            | ExpansionStrategy::PlanetChild { .. } => Ok(()),
        }
    }

    fn link_destination(&self, stargate: &EntityRecord) -> Result<(), EngineError> {
        let Some(destination) = stargate.foreign_key("destination_eve_stargate") else {
            return Ok(());
        };
        let mut fields = Fields::new();
        fields.insert(
            "destination_eve_stargate".to_owned(),
            FieldValue::Integer(stargate.id),
        );
        if let Some(system) = stargate.foreign_key("eve_solar_system") {
            fields.insert(
                "destination_eve_solar_system".to_owned(),
                FieldValue::Integer(system),
            );
        }
        self.store.upsert_entity(
            EntityKind::Stargate,
            destination,
            &fields,
            SectionSet::EMPTY,
            Utc::now(),
        )?;
        Ok(())
    }

    fn attach_services(&self, station_id: EntityId, raw: &RawRecord) -> Result<(), EngineError> {
        let Some(Value::Array(services)) = raw.get("services") else {
            return Ok(());
        };
        let names: Vec<String> = services
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        if !names.is_empty() {
            self.store.add_station_services(station_id, &names)?;
        }
        Ok(())
    }

    fn load_supplementary(
        &self,
        type_id: EntityId,
        sections: SectionSet,
    ) -> Result<(), EngineError> {
        if sections.contains(Section::TypeMaterials) {
            self.replace_rows(
                Section::TypeMaterials,
                SupplementaryResource::TypeMaterials,
                type_id,
            )?;
        }
        if sections.contains(Section::IndustryActivities) {
            for resource in SupplementaryResource::INDUSTRY {
                self.replace_rows(Section::IndustryActivities, resource, type_id)?;
            }
        }
        Ok(())
    }

    fn replace_rows(
        &self,
        section: Section,
        resource: SupplementaryResource,
        type_id: EntityId,
    ) -> Result<(), EngineError> {
        let source = self
            .supplementary
            .ok_or(EngineError::MissingSupplementarySource { section })?;
        let rows = source.rows(resource, type_id)?;
        let referenced: BTreeSet<EntityId> = resource
            .referenced_type_key()
            .map(|key| {
                rows.iter()
                    .filter_map(|row| row.get(key).and_then(as_id))
                    .filter(|id| *id != type_id)
                    .collect()
            })
            .unwrap_or_default();
        if !referenced.is_empty() {
            let ids: Vec<EntityId> = referenced.into_iter().collect();
            self.bulk_get_or_create(EntityKind::Type, &ids, &SyncOptions::default())?;
        }
        let written = self
            .store
            .replace_supplementary_rows(resource, type_id, &rows)?;
        debug!("stored {written} {} rows for type {type_id}", resource.as_str());
        Ok(())
    }
}

fn into_object(kind: EntityKind, id: EntityId, response: Value) -> Result<RawRecord, EngineError> {
    match response {
        Value::Object(record) => Ok(record),
        _ => Err(EngineError::integrity(kind, id, "response is not an object")),
    }
}

/// Find the row of a list-only response whose identity equals `id`.
fn scan_list(
    descriptor: &EntityDescriptor,
    id: EntityId,
    response: Value,
) -> Result<RawRecord, EngineError> {
    let kind = descriptor.kind;
    let Value::Array(rows) = response else {
        return Err(EngineError::integrity(kind, id, "list response is not an array"));
    };
    rows.into_iter()
        .filter_map(|row| match row {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .find(|record| record.get(descriptor.identity).and_then(as_id) == Some(id))
        .ok_or(EngineError::NotFound { kind, id })
}
