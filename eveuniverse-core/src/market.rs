//! Market price facts and the stale-price refresh plan.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::EntityId;
use crate::source::SourceError;

/// A price entry as returned by the remote price list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    /// Inventory type the price applies to.
    pub type_id: EntityId,
    /// Adjusted price used for industry calculations.
    #[serde(default)]
    pub adjusted_price: Option<f64>,
    /// Average market price.
    #[serde(default)]
    pub average_price: Option<f64>,
}

/// A persisted market price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPrice {
    /// Inventory type the price applies to.
    pub type_id: EntityId,
    /// Adjusted price used for industry calculations.
    pub adjusted_price: Option<f64>,
    /// Average market price.
    pub average_price: Option<f64>,
    /// Time the price was written.
    pub updated_at: DateTime<Utc>,
}

/// Reads the current market price list from the remote API.
pub trait PriceSource {
    /// Fetch every published price.
    ///
    /// # Errors
    ///
    /// Propagates transport and decoding failures.
    fn fetch_prices(&self) -> Result<Vec<PriceEntry>, SourceError>;
}

/// Compute the prices to write during one refresh.
///
/// Entries for types missing from `known_types` are dropped. Types whose
/// stored price was written after `fresh_after` are kept as they are. The
/// result is sorted by type ID; when a type appears more than once the last
/// entry wins.
#[must_use]
pub fn plan_refresh<S: std::hash::BuildHasher>(
    entries: &[PriceEntry],
    known_types: &HashSet<EntityId, S>,
    stored: &HashMap<EntityId, DateTime<Utc>, S>,
    fresh_after: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<MarketPrice> {
    let mut latest: BTreeMap<EntityId, &PriceEntry> = BTreeMap::new();
    for entry in entries {
        latest.insert(entry.type_id, entry);
    }
    latest
        .into_iter()
        .filter(|(type_id, _)| known_types.contains(type_id))
        .filter(|(type_id, _)| {
            stored
                .get(type_id)
                .is_none_or(|updated_at| *updated_at <= fresh_after)
        })
        .map(|(type_id, entry)| MarketPrice {
            type_id,
            adjusted_price: entry.adjusted_price,
            average_price: entry.average_price,
            updated_at: now,
        })
        .collect()
}
