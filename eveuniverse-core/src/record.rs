//! Persisted record types shared by the engine and store implementations.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::{EntityKind, SectionSet};

/// Numeric identity of an entity within its kind.
pub type EntityId = i64;

/// A raw record as returned by the remote API.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Normalized field values keyed by local field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// A normalized scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Explicit absence, used for unresolved foreign keys.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value, including foreign-key IDs.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl FieldValue {
    /// Integer view.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Float view; integers widen.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Text view.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Boolean view.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether this is [`FieldValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// The non-parent half of a dependent record's functional key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NaturalKey {
    /// A numeric key, typically a foreign-key ID.
    Id(EntityId),
    /// A textual key.
    Text(String),
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// A persisted independent entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Kind of the entity.
    pub kind: EntityKind,
    /// Identity within the kind.
    pub id: EntityId,
    /// Scalar and foreign-key values.
    pub fields: Fields,
    /// Sections loaded for this instance so far.
    pub sections: SectionSet,
    /// Time of the last synchronization.
    pub last_updated: DateTime<Utc>,
}

impl EntityRecord {
    /// Display name, empty when not yet known.
    #[must_use]
    pub fn name(&self) -> &str {
        self.text("name").unwrap_or_default()
    }

    /// Raw value of `field`.
    #[must_use]
    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Text value of `field`.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.value(field).and_then(FieldValue::as_str)
    }

    /// Integer value of `field`.
    #[must_use]
    pub fn integer(&self, field: &str) -> Option<i64> {
        self.value(field).and_then(FieldValue::as_i64)
    }

    /// Float value of `field`.
    #[must_use]
    pub fn float(&self, field: &str) -> Option<f64> {
        self.value(field).and_then(FieldValue::as_f64)
    }

    /// Boolean value of `field`.
    #[must_use]
    pub fn boolean(&self, field: &str) -> Option<bool> {
        self.value(field).and_then(FieldValue::as_bool)
    }

    /// Target ID of foreign key `field`, `None` when null or absent.
    #[must_use]
    pub fn foreign_key(&self, field: &str) -> Option<EntityId> {
        self.integer(field)
    }

    /// Stored `(x, y, z)` position when all three coordinates are present.
    #[must_use]
    pub fn position(&self) -> Option<[f64; 3]> {
        Some([
            self.float("position_x")?,
            self.float("position_y")?,
            self.float("position_z")?,
        ])
    }
}

/// A persisted dependent entity keyed by its parent and a natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineRecord {
    /// Kind of the dependent entity.
    pub kind: EntityKind,
    /// Identity of the owning parent.
    pub parent_id: EntityId,
    /// Remaining functional key component.
    pub other_key: NaturalKey,
    /// Non-key values.
    pub fields: Fields,
    /// Time of the last synchronization.
    pub last_updated: DateTime<Utc>,
}

/// Result of an update-or-create call.
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted<T> {
    /// The persisted record after the write.
    pub record: T,
    /// Whether the record did not exist before.
    pub created: bool,
}

/// Merge `update` into `existing`, keeping fields the update omits.
pub(crate) fn merge_fields(existing: &mut Fields, update: &Fields) {
    for (name, value) in update {
        existing.insert(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("null", FieldValue::Null)]
    #[case("true", FieldValue::Bool(true))]
    #[case("42", FieldValue::Integer(42))]
    #[case("0.5", FieldValue::Float(0.5))]
    #[case("\"Jita\"", FieldValue::Text("Jita".to_owned()))]
    fn decodes_untagged_values(#[case] json: &str, #[case] expected: FieldValue) {
        let value: FieldValue = serde_json::from_str(json).expect("decode");
        assert_eq!(value, expected);
    }

    #[rstest]
    fn merge_keeps_omitted_fields() {
        let mut existing = Fields::new();
        existing.insert("name".to_owned(), "Old".into());
        existing.insert("published".to_owned(), true.into());
        let mut update = Fields::new();
        update.insert("name".to_owned(), "New".into());

        merge_fields(&mut existing, &update);

        assert_eq!(existing.get("name"), Some(&FieldValue::from("New")));
        assert_eq!(existing.get("published"), Some(&FieldValue::Bool(true)));
    }

    #[rstest]
    fn position_requires_all_coordinates() {
        let mut fields = Fields::new();
        fields.insert("position_x".to_owned(), 1.0.into());
        fields.insert("position_y".to_owned(), 2.0.into());
        let mut record = EntityRecord {
            kind: EntityKind::SolarSystem,
            id: 30_000_142,
            fields,
            sections: SectionSet::EMPTY,
            last_updated: Utc::now(),
        };
        assert_eq!(record.position(), None);
        record.fields.insert("position_z".to_owned(), 3.into());
        assert_eq!(record.position(), Some([1.0, 2.0, 3.0]));
    }
}
