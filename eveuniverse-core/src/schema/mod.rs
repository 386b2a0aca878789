//! Declarative schema registry for mirrored entity kinds.
//!
//! Responsibilities:
//! - Describe every entity kind as immutable data: identity, remote
//!   endpoints, field mappings, relations and optional sections.
//! - Validate descriptors once when the registry is built.
//!
//! Boundaries:
//! - No I/O and no mutation after construction. Behaviour that differs per
//!   kind is expressed through [`ExpansionStrategy`] tags and interpreted by
//!   the engine.
//!
//! Invariants:
//! - Every endpoint operation splits into exactly two dot-separated
//!   segments.
//! - Dependent (inline) kinds declare a parent foreign key that is part of a
//!   two-field functional key.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod descriptors;
mod sections;

pub use sections::{ParseSectionError, Section, SectionSet};

/// Every entity kind mirrored by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Character ancestry.
    Ancestry,
    /// Asteroid belt orbiting a planet.
    AsteroidBelt,
    /// Character bloodline.
    Bloodline,
    /// Top-level inventory category.
    Category,
    /// Constellation grouping solar systems.
    Constellation,
    /// Dogma attribute definition.
    DogmaAttribute,
    /// Dogma effect definition.
    DogmaEffect,
    /// Modifier attached to a dogma effect.
    DogmaEffectModifier,
    /// NPC faction.
    Faction,
    /// Graphic resource.
    Graphic,
    /// Inventory group.
    Group,
    /// Market group.
    MarketGroup,
    /// Moon orbiting a planet.
    Moon,
    /// Planet in a solar system.
    Planet,
    /// Character race.
    Race,
    /// Region grouping constellations.
    Region,
    /// Solar system.
    SolarSystem,
    /// Star of a solar system.
    Star,
    /// Stargate linking two solar systems.
    Stargate,
    /// NPC station.
    Station,
    /// Inventory type.
    Type,
    /// Dogma attribute value of an inventory type.
    TypeDogmaAttribute,
    /// Dogma effect of an inventory type.
    TypeDogmaEffect,
    /// Unit of measure for dogma attributes.
    Unit,
}

impl EntityKind {
    /// All kinds in declaration order.
    pub const ALL: [Self; 24] = [
        Self::Ancestry,
        Self::AsteroidBelt,
        Self::Bloodline,
        Self::Category,
        Self::Constellation,
        Self::DogmaAttribute,
        Self::DogmaEffect,
        Self::DogmaEffectModifier,
        Self::Faction,
        Self::Graphic,
        Self::Group,
        Self::MarketGroup,
        Self::Moon,
        Self::Planet,
        Self::Race,
        Self::Region,
        Self::SolarSystem,
        Self::Star,
        Self::Stargate,
        Self::Station,
        Self::Type,
        Self::TypeDogmaAttribute,
        Self::TypeDogmaEffect,
        Self::Unit,
    ];

    /// Stable name used for persistence and task payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ancestry => "ancestry",
            Self::AsteroidBelt => "asteroid_belt",
            Self::Bloodline => "bloodline",
            Self::Category => "category",
            Self::Constellation => "constellation",
            Self::DogmaAttribute => "dogma_attribute",
            Self::DogmaEffect => "dogma_effect",
            Self::DogmaEffectModifier => "dogma_effect_modifier",
            Self::Faction => "faction",
            Self::Graphic => "graphic",
            Self::Group => "group",
            Self::MarketGroup => "market_group",
            Self::Moon => "moon",
            Self::Planet => "planet",
            Self::Race => "race",
            Self::Region => "region",
            Self::SolarSystem => "solar_system",
            Self::Star => "star",
            Self::Stargate => "stargate",
            Self::Station => "station",
            Self::Type => "type",
            Self::TypeDogmaAttribute => "type_dogma_attribute",
            Self::TypeDogmaEffect => "type_dogma_effect",
            Self::Unit => "unit",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown entity kind name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entity kind '{name}'")]
pub struct ParseEntityKindError {
    /// The rejected input.
    pub name: String,
}

impl FromStr for EntityKind {
    type Err = ParseEntityKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseEntityKindError { name: s.to_owned() })
    }
}

/// Location of a value inside a raw remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRef {
    /// A top-level key.
    Direct(&'static str),
    /// A key inside a nested object: `(container, leaf)`.
    Nested(&'static str, &'static str),
}

/// Value type of a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text; absent values persist as the empty string.
    Text,
    /// Signed integer.
    Integer,
    /// Floating point number.
    Float,
    /// Boolean flag.
    Boolean,
    /// Reference to another entity of the given kind by ID.
    ForeignKey(EntityKind),
}

/// Declaration of one local field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Local field name.
    pub name: &'static str,
    /// Where the value lives in the remote record.
    pub remote: RemoteRef,
    /// Value type.
    pub kind: FieldKind,
    /// Whether a missing foreign-key target is fetched on demand.
    pub auto_create: bool,
    /// Section that must be enabled for this field to be mapped.
    pub section: Option<Section>,
}

impl FieldSpec {
    const fn new(name: &'static str, remote: RemoteRef, kind: FieldKind) -> Self {
        Self {
            name,
            remote,
            kind,
            auto_create: true,
            section: None,
        }
    }

    /// A text field read from the key of the same name.
    #[must_use]
    pub const fn text(name: &'static str) -> Self {
        Self::new(name, RemoteRef::Direct(name), FieldKind::Text)
    }

    /// An integer field read from the key of the same name.
    #[must_use]
    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, RemoteRef::Direct(name), FieldKind::Integer)
    }

    /// A float field read from the key of the same name.
    #[must_use]
    pub const fn float(name: &'static str) -> Self {
        Self::new(name, RemoteRef::Direct(name), FieldKind::Float)
    }

    /// A boolean field read from the key of the same name.
    #[must_use]
    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, RemoteRef::Direct(name), FieldKind::Boolean)
    }

    /// A foreign key read from `remote`.
    #[must_use]
    pub const fn foreign_key(name: &'static str, remote: &'static str, target: EntityKind) -> Self {
        Self::new(name, RemoteRef::Direct(remote), FieldKind::ForeignKey(target))
    }

    /// A float read from a nested `(container, leaf)` pair.
    #[must_use]
    pub const fn nested_float(
        name: &'static str,
        container: &'static str,
        leaf: &'static str,
    ) -> Self {
        Self::new(name, RemoteRef::Nested(container, leaf), FieldKind::Float)
    }

    /// Read the value from a different remote key.
    #[must_use]
    pub const fn from_remote(mut self, remote: &'static str) -> Self {
        self.remote = RemoteRef::Direct(remote);
        self
    }

    /// Read the value from a nested `(container, leaf)` pair.
    #[must_use]
    pub const fn from_nested(mut self, container: &'static str, leaf: &'static str) -> Self {
        self.remote = RemoteRef::Nested(container, leaf);
        self
    }

    /// Never fetch a missing target for this foreign key.
    #[must_use]
    pub const fn without_auto_create(mut self) -> Self {
        self.auto_create = false;
        self
    }

    /// Only map this field when `section` is enabled.
    #[must_use]
    pub const fn requires(mut self, section: Section) -> Self {
        self.section = Some(section);
        self
    }

    /// Target kind when this field is a foreign key.
    #[must_use]
    pub const fn target(&self) -> Option<EntityKind> {
        match self.kind {
            FieldKind::ForeignKey(kind) => Some(kind),
            _ => None,
        }
    }
}

/// A remote endpoint naming an API operation and its path template.
///
/// The operation has the form `Group.operation_name`. The path template may
/// contain `{id}`, substituted with the requested identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Two-segment operation name, for example `Universe.get_universe_types`.
    pub operation: &'static str,
    /// Path template relative to the API base URL.
    pub path: &'static str,
}

impl Endpoint {
    /// Construct an endpoint descriptor.
    #[must_use]
    pub const fn new(operation: &'static str, path: &'static str) -> Self {
        Self { operation, path }
    }

    /// Split the operation into its `(group, operation)` segments.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MalformedEndpoint`] when the operation does not
    /// consist of exactly two non-empty segments.
    pub fn segments(&self) -> Result<(&'static str, &'static str), SchemaError> {
        let mut parts = self.operation.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(group), Some(operation), None) if !group.is_empty() && !operation.is_empty() => {
                Ok((group, operation))
            }
            _ => Err(SchemaError::MalformedEndpoint {
                operation: self.operation,
            }),
        }
    }

    /// Render the path for `id`.
    #[must_use]
    pub fn render(&self, id: Option<i64>) -> String {
        match id {
            Some(id) => self.path.replace("{id}", &id.to_string()),
            None => self.path.to_owned(),
        }
    }
}

/// A declared child or inline-object relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    /// Remote array field holding the related elements.
    pub remote_field: &'static str,
    /// Kind of the related entities.
    pub target: EntityKind,
    /// Section that must be enabled for the relation to apply.
    pub section: Option<Section>,
    /// Key holding the child ID when elements are objects rather than IDs.
    pub id_field: Option<&'static str>,
}

impl Relation {
    /// A relation whose elements are plain IDs.
    #[must_use]
    pub const fn new(remote_field: &'static str, target: EntityKind) -> Self {
        Self {
            remote_field,
            target,
            section: None,
            id_field: None,
        }
    }

    /// Only apply the relation when `section` is enabled.
    #[must_use]
    pub const fn requires(mut self, section: Section) -> Self {
        self.section = Some(section);
        self
    }

    /// Read child IDs from `key` inside each element.
    #[must_use]
    pub const fn keyed_by(mut self, key: &'static str) -> Self {
        self.id_field = Some(key);
        self
    }

    fn applies(&self, sections: SectionSet) -> bool {
        self.section.is_none_or(|section| sections.contains(section))
    }
}

/// Per-kind override of the generic fetch and expansion behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionStrategy {
    /// Generic fetch, normalize and expand.
    Generic,
    /// Stargates re-link their paired destination after persisting.
    Stargate,
    /// Stations attach service names as shared tags.
    Station,
    /// Planets borrow moon and belt lists from their solar system.
    Planet,
    /// Moons and belts borrow their planet from their solar system.
    PlanetChild {
        /// Planet array in the system record listing this kind's IDs.
        property: &'static str,
    },
    /// Inventory types pull supplementary datasets for some sections.
    InventoryType,
}

/// Immutable description of one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Kind described.
    pub kind: EntityKind,
    /// Remote key holding the identity.
    pub identity: &'static str,
    /// Single-object endpoint.
    pub object_endpoint: Option<Endpoint>,
    /// Enumeration endpoint.
    pub list_endpoint: Option<Endpoint>,
    /// Non-identity fields.
    pub fields: &'static [FieldSpec],
    /// Fields forming the composite key of a dependent kind.
    pub functional_key: &'static [&'static str],
    /// Field linking a dependent kind to its parent.
    pub parent_fk: Option<&'static str>,
    /// Relations expanded recursively as independent entities.
    pub children: &'static [Relation],
    /// Relations expanded from the same response as dependent rows.
    pub inline_objects: &'static [Relation],
    /// Sections this kind honours.
    pub sections: &'static [Section],
    /// Rank giving a deterministic global processing order.
    pub load_order: u16,
    /// Fetch and expansion override.
    pub strategy: ExpansionStrategy,
}

/// Per-field flags reported by [`EntityDescriptor::remote_mapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedField {
    /// Local field name.
    pub local: &'static str,
    /// Remote location.
    pub remote: RemoteRef,
    /// Value type, `None` for the identity.
    pub kind: Option<FieldKind>,
    /// Whether this is the identity field.
    pub is_identity: bool,
    /// Whether this is a foreign key.
    pub is_fk: bool,
    /// Whether this field is part of the functional key.
    pub is_functional_key: bool,
    /// Whether this field links to the parent of a dependent kind.
    pub is_parent_fk: bool,
    /// Whether a missing section suppresses this field.
    pub suppressed_by_section: bool,
    /// Whether a missing foreign-key target may be fetched.
    pub auto_create: bool,
}

impl MappedField {
    /// Whether the field takes part in identity resolution.
    #[must_use]
    pub const fn is_key(&self) -> bool {
        self.is_identity || self.is_functional_key
    }
}

/// Local identity field name of independent kinds.
pub const IDENTITY_FIELD: &str = "id";

impl EntityDescriptor {
    /// Local name of the identity field.
    #[must_use]
    pub const fn identity_field_name(&self) -> &'static str {
        IDENTITY_FIELD
    }

    /// Whether the kind is keyed by a functional key instead of an ID.
    #[must_use]
    pub const fn is_dependent(&self) -> bool {
        !self.functional_key.is_empty()
    }

    /// Sections honoured by this kind as a set.
    #[must_use]
    pub fn valid_sections(&self) -> SectionSet {
        self.sections.iter().copied().collect()
    }

    /// Restrict `sections` to those this kind honours.
    #[must_use]
    pub fn relevant_sections(&self, sections: SectionSet) -> SectionSet {
        sections.intersection(self.valid_sections())
    }

    /// Field mapping with per-field flags for `enabled` sections.
    #[must_use]
    pub fn remote_mapping(&self, enabled: SectionSet) -> Vec<MappedField> {
        let identity = (!self.is_dependent()).then_some(MappedField {
            local: IDENTITY_FIELD,
            remote: RemoteRef::Direct(self.identity),
            kind: None,
            is_identity: true,
            is_fk: false,
            is_functional_key: false,
            is_parent_fk: false,
            suppressed_by_section: false,
            auto_create: false,
        });
        identity
            .into_iter()
            .chain(self.fields.iter().map(|field| {
                let is_functional_key = self.functional_key.contains(&field.name);
                MappedField {
                    local: field.name,
                    remote: field.remote,
                    kind: Some(field.kind),
                    is_identity: false,
                    is_fk: field.target().is_some(),
                    is_functional_key,
                    is_parent_fk: is_functional_key && self.parent_fk == Some(field.name),
                    suppressed_by_section: field
                        .section
                        .is_some_and(|section| !enabled.contains(section)),
                    auto_create: field.auto_create,
                }
            }))
            .collect()
    }

    /// Child relations active for `enabled` sections.
    #[must_use]
    pub fn children(&self, enabled: SectionSet) -> Vec<Relation> {
        self.children
            .iter()
            .copied()
            .filter(|relation| relation.applies(enabled))
            .collect()
    }

    /// Inline-object relations active for `enabled` sections.
    #[must_use]
    pub fn inline_objects(&self, enabled: SectionSet) -> Vec<Relation> {
        self.inline_objects
            .iter()
            .copied()
            .filter(|relation| relation.applies(enabled))
            .collect()
    }

    /// Whether single records can only be obtained by scanning the list.
    #[must_use]
    pub fn is_list_only_endpoint(&self) -> bool {
        matches!(
            (self.list_endpoint, self.object_endpoint),
            (Some(list), Some(object)) if list == object
        )
    }

    /// Look up a field declaration by local name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Split the functional key into `(parent_fk, other_key)` declarations.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidFunctionalKey`] unless the kind declares
    /// a parent foreign key and exactly one other functional key field.
    pub fn functional_pair(&self) -> Result<(&'static str, &'static FieldSpec), SchemaError> {
        let invalid = || SchemaError::InvalidFunctionalKey { kind: self.kind };
        let parent = self.parent_fk.ok_or_else(invalid)?;
        if self.functional_key.len() != 2 || !self.functional_key.contains(&parent) {
            return Err(invalid());
        }
        let other = self
            .functional_key
            .iter()
            .find(|name| **name != parent)
            .and_then(|name| self.field(name))
            .ok_or_else(invalid)?;
        Ok((parent, other))
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for endpoint in self.object_endpoint.iter().chain(self.list_endpoint.iter()) {
            endpoint.segments()?;
        }
        if self.is_dependent() {
            self.functional_pair()?;
        } else if self.parent_fk.is_some() {
            return Err(SchemaError::InvalidFunctionalKey { kind: self.kind });
        }
        for name in self.functional_key {
            if self.field(name).is_none() {
                return Err(SchemaError::UnknownField {
                    kind: self.kind,
                    field: name,
                });
            }
        }
        for relation in self.children.iter().chain(self.inline_objects) {
            if let Some(section) = relation.section {
                if !self.sections.contains(&section) {
                    return Err(SchemaError::UndeclaredSection {
                        kind: self.kind,
                        section,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Errors raised while building the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// An endpoint operation does not have two segments.
    #[error("endpoint operation '{operation}' must have the form Group.operation")]
    MalformedEndpoint {
        /// Offending operation name.
        operation: &'static str,
    },
    /// A dependent kind lacks a valid parent/other functional key pair.
    #[error("{kind} does not declare a valid parent foreign key and functional key")]
    InvalidFunctionalKey {
        /// Offending kind.
        kind: EntityKind,
    },
    /// A functional key names an undeclared field.
    #[error("{kind} functional key refers to unknown field '{field}'")]
    UnknownField {
        /// Offending kind.
        kind: EntityKind,
        /// Missing field.
        field: &'static str,
    },
    /// A relation is gated by a section the kind does not declare.
    #[error("{kind} relation requires undeclared section {section}")]
    UndeclaredSection {
        /// Offending kind.
        kind: EntityKind,
        /// Section not declared by the kind.
        section: Section,
    },
    /// The same kind was declared twice.
    #[error("{kind} is declared more than once")]
    DuplicateKind {
        /// Offending kind.
        kind: EntityKind,
    },
    /// A relation or foreign key targets a kind with no descriptor.
    #[error("{kind} is referenced but has no descriptor")]
    MissingDescriptor {
        /// Kind without a descriptor.
        kind: EntityKind,
    },
}

/// Validated lookup from entity kind to descriptor.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    descriptors: HashMap<EntityKind, EntityDescriptor>,
}

impl SchemaRegistry {
    /// Build the registry of all mirrored kinds.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] when a built-in descriptor is malformed.
    pub fn standard() -> Result<Self, SchemaError> {
        Self::from_descriptors(descriptors::ALL.iter().copied())
    }

    /// Build a registry from explicit descriptors.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] when a descriptor is malformed, declared
    /// twice, or references a kind without a descriptor.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = EntityDescriptor>,
    ) -> Result<Self, SchemaError> {
        let mut map = HashMap::new();
        for descriptor in descriptors {
            descriptor.validate()?;
            if map.insert(descriptor.kind, descriptor).is_some() {
                return Err(SchemaError::DuplicateKind {
                    kind: descriptor.kind,
                });
            }
        }
        let registry = Self { descriptors: map };
        registry.check_references()?;
        Ok(registry)
    }

    fn check_references(&self) -> Result<(), SchemaError> {
        for descriptor in self.descriptors.values() {
            let targets = descriptor
                .fields
                .iter()
                .filter_map(FieldSpec::target)
                .chain(descriptor.children.iter().map(|relation| relation.target))
                .chain(descriptor.inline_objects.iter().map(|relation| relation.target));
            for kind in targets {
                if !self.descriptors.contains_key(&kind) {
                    return Err(SchemaError::MissingDescriptor { kind });
                }
            }
        }
        Ok(())
    }

    /// Descriptor for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingDescriptor`] for unregistered kinds.
    pub fn schema_for(&self, kind: EntityKind) -> Result<&EntityDescriptor, SchemaError> {
        self.descriptors
            .get(&kind)
            .ok_or(SchemaError::MissingDescriptor { kind })
    }

    /// All descriptors sorted by load order.
    #[must_use]
    pub fn in_load_order(&self) -> Vec<&EntityDescriptor> {
        let mut all: Vec<_> = self.descriptors.values().collect();
        all.sort_by_key(|descriptor| (descriptor.load_order, descriptor.kind));
        all
    }
}
