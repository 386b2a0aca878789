//! Pure transformation from raw remote records to normalized fields.
//!
//! Foreign keys are the only values that reach outside the record: the
//! mapper asks a [`ForeignKeyResolver`] whether the target exists and, when
//! allowed, to create it. Creation failures leave the field null.

use log::warn;
use serde_json::Value;

use crate::engine::EngineError;
use crate::record::{EntityId, FieldValue, Fields, RawRecord};
use crate::schema::{EntityDescriptor, EntityKind, FieldKind, MappedField, RemoteRef, SectionSet};
use crate::store::StoreError;

/// Resolves foreign-key targets while normalizing a record.
pub trait ForeignKeyResolver {
    /// Whether `(kind, id)` is stored locally.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the lookup fails.
    fn exists(&self, kind: EntityKind, id: EntityId) -> Result<bool, StoreError>;

    /// Fetch and persist `(kind, id)` without expanding its children.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the target cannot be created.
    fn auto_create(&self, kind: EntityKind, id: EntityId) -> Result<(), EngineError>;
}

/// Extract the raw value at `remote`, `None` when the key is absent.
#[must_use]
pub fn extract<'r>(raw: &'r RawRecord, remote: RemoteRef) -> Option<&'r Value> {
    match remote {
        RemoteRef::Direct(key) => raw.get(key),
        RemoteRef::Nested(container, leaf) => raw.get(container)?.as_object()?.get(leaf),
    }
}

/// Read an integer ID, accepting integral floats that fit an `i64`.
#[must_use]
pub fn as_id(value: &Value) -> Option<EntityId> {
    // Both bounds are exact powers of two; the upper one lies outside `i64`.
    const RANGE: std::ops::Range<f64> = (i64::MIN as f64)..(i64::MAX as f64);
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|number| number.fract() == 0.0 && RANGE.contains(number))
            .map(|number| number as i64)
    })
}

/// Produce the normalized, upsert-ready fields of `raw`.
///
/// Identity and functional-key fields are skipped, as are fields suppressed
/// by a disabled section. Absent keys are omitted so stored values survive;
/// a present `null` becomes the empty string for text fields and
/// [`FieldValue::Null`] otherwise.
///
/// # Errors
///
/// Returns [`EngineError::Store`] when a foreign-key lookup fails. Failures
/// creating a missing foreign-key target are logged and yield null.
pub fn normalize(
    raw: &RawRecord,
    descriptor: &EntityDescriptor,
    enabled: SectionSet,
    resolver: &dyn ForeignKeyResolver,
) -> Result<Fields, EngineError> {
    let mut fields = Fields::new();
    for mapped in descriptor.remote_mapping(enabled) {
        if mapped.is_key() || mapped.suppressed_by_section {
            continue;
        }
        let Some(kind) = mapped.kind else {
            continue;
        };
        let Some(value) = extract(raw, mapped.remote) else {
            continue;
        };
        let normalized = match kind {
            FieldKind::ForeignKey(target) => resolve_foreign_key(&mapped, target, value, resolver)?,
            scalar => scalar_value(scalar, value),
        };
        fields.insert(mapped.local.to_owned(), normalized);
    }
    Ok(fields)
}

fn resolve_foreign_key(
    mapped: &MappedField,
    target: EntityKind,
    value: &Value,
    resolver: &dyn ForeignKeyResolver,
) -> Result<FieldValue, EngineError> {
    let Some(id) = as_id(value) else {
        return Ok(FieldValue::Null);
    };
    if resolver.exists(target, id)? {
        return Ok(FieldValue::Integer(id));
    }
    if !mapped.auto_create {
        return Ok(FieldValue::Null);
    }
    match resolver.auto_create(target, id) {
        Ok(()) => Ok(FieldValue::Integer(id)),
        Err(err) => {
            warn!("could not resolve {} {target} {id}: {err}", mapped.local);
            Ok(FieldValue::Null)
        }
    }
}

/// Convert a raw scalar according to its declared kind.
#[must_use]
pub fn scalar_value(kind: FieldKind, value: &Value) -> FieldValue {
    match (kind, value) {
        (FieldKind::Text, Value::Null) => FieldValue::Text(String::new()),
        (FieldKind::Text, Value::String(text)) => FieldValue::Text(text.clone()),
        (FieldKind::Text, other) => FieldValue::Text(other.to_string()),
        (FieldKind::Integer | FieldKind::ForeignKey(_), other) => {
            as_id(other).map_or(FieldValue::Null, FieldValue::Integer)
        }
        (FieldKind::Float, other) => other.as_f64().map_or(FieldValue::Null, FieldValue::Float),
        (FieldKind::Boolean, other) => other.as_bool().map_or(FieldValue::Null, FieldValue::Bool),
    }
}
