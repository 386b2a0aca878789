//! Remote data capabilities consumed by the engine.
//!
//! The engine never talks to the network itself. Adapters implement these
//! traits and map their transport failures onto [`SourceError`].

use serde_json::Value;
use thiserror::Error;

use crate::names::EntityCategory;
use crate::record::{EntityId, RawRecord};
use crate::schema::EntityDescriptor;

/// Failure reported by a remote source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The remote has no record at `path`.
    #[error("no remote record at {path}")]
    NotFound {
        /// Requested path or resource.
        path: String,
    },
    /// Timeout, network failure or a retryable server status.
    #[error("transient failure calling {path}: {message}")]
    Transient {
        /// Requested path or resource.
        path: String,
        /// Transport description.
        message: String,
    },
    /// Any other unexpected HTTP status.
    #[error("{path} returned HTTP status {status}")]
    Http {
        /// Requested path or resource.
        path: String,
        /// Status code.
        status: u16,
    },
    /// The response body did not have the expected shape.
    #[error("failed to decode response from {path}: {message}")]
    Decode {
        /// Requested path or resource.
        path: String,
        /// Decoder message.
        message: String,
    },
    /// The descriptor lacks the endpoint the call needs.
    #[error("{path} has no remote endpoint for this call")]
    Unsupported {
        /// Kind or resource lacking the endpoint.
        path: String,
    },
}

impl SourceError {
    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether the remote reported a missing record.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Reads entity records from the remote API.
pub trait EntitySource {
    /// Fetch the single-object response for `id`.
    ///
    /// For list-only kinds the full list response is returned and the caller
    /// scans it for the requested identity.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] when the remote has no such record.
    fn fetch_object(&self, descriptor: &EntityDescriptor, id: EntityId)
    -> Result<Value, SourceError>;

    /// Fetch the enumeration response: IDs for normal kinds, full rows for
    /// list-only kinds.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unsupported`] when the kind has no list
    /// endpoint.
    fn fetch_list(&self, descriptor: &EntityDescriptor) -> Result<Vec<Value>, SourceError>;
}

/// One `(id, name, category)` triple returned by the names endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    /// Entity ID.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Category reported by the remote.
    pub category: EntityCategory,
}

/// Bulk name resolution against a page-limited remote endpoint.
pub trait NameSource {
    /// Resolve names for `ids` in a single request.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] when the remote rejects the batch
    /// because it contains an invalid ID.
    fn resolve_ids(&self, ids: &[EntityId]) -> Result<Vec<ResolvedName>, SourceError>;

    /// Resolve IDs for exact `names` in a single request.
    ///
    /// # Errors
    ///
    /// Propagates any transport or decoding failure for the batch.
    fn resolve_names(&self, names: &[String]) -> Result<Vec<ResolvedName>, SourceError>;
}

/// A named remote resource of the supplementary static dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupplementaryResource {
    /// Reprocessing materials per type.
    TypeMaterials,
    /// Manufacturing and research activity durations.
    IndustryActivityDurations,
    /// Materials consumed by industry activities.
    IndustryActivityMaterials,
    /// Products of industry activities.
    IndustryActivityProducts,
    /// Skills required by industry activities.
    IndustryActivitySkills,
}

impl SupplementaryResource {
    /// Resources loaded for the industry activities section.
    pub const INDUSTRY: [Self; 4] = [
        Self::IndustryActivityDurations,
        Self::IndustryActivityProducts,
        Self::IndustryActivitySkills,
        Self::IndustryActivityMaterials,
    ];

    /// Remote resource name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TypeMaterials => "invTypeMaterials",
            Self::IndustryActivityDurations => "industryActivity",
            Self::IndustryActivityMaterials => "industryActivityMaterials",
            Self::IndustryActivityProducts => "industryActivityProducts",
            Self::IndustryActivitySkills => "industryActivitySkills",
        }
    }

    /// Key holding a referenced type ID inside each row, if any.
    #[must_use]
    pub const fn referenced_type_key(self) -> Option<&'static str> {
        match self {
            Self::TypeMaterials | Self::IndustryActivityMaterials => Some("materialTypeID"),
            Self::IndustryActivityProducts => Some("productTypeID"),
            Self::IndustryActivitySkills => Some("skillID"),
            Self::IndustryActivityDurations => None,
        }
    }
}

/// Whole-dataset fetch of supplementary rows, filtered by owning type.
pub trait SupplementaryDataSource {
    /// Rows of `resource` owned by `type_id`.
    ///
    /// # Errors
    ///
    /// Propagates failures fetching or decoding the dataset.
    fn rows(
        &self,
        resource: SupplementaryResource,
        type_id: EntityId,
    ) -> Result<Vec<RawRecord>, SourceError>;
}
