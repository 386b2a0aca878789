//! Units of background work and the capabilities that execute them.
//!
//! The engine only ever enqueues [`UnitOfWork`] values through the
//! [`AsyncExecutor`] trait. [`TaskQueue`] is an in-process executor and
//! [`TaskRunner`] drains it, guarding each unit with an [`AdvisoryLock`].

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::engine::SyncOptions;
use crate::record::{EntityId, RawRecord};
use crate::schema::{EntityKind, SectionSet};

mod lock;
mod queue;
mod runner;

pub use lock::{AdvisoryLock, MemoryLock};
pub use queue::TaskQueue;
pub use runner::{DrainReport, RetryPolicy, TaskFailure, TaskRunner};

/// A background operation with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    /// Get or create one entity.
    LoadObject {
        /// Kind to resolve.
        kind: EntityKind,
        /// Identity to resolve.
        id: EntityId,
        /// Expansion options.
        options: SyncOptions,
    },
    /// Fetch and persist one entity unconditionally.
    UpdateOrCreate {
        /// Kind to fetch.
        kind: EntityKind,
        /// Identity to fetch.
        id: EntityId,
        /// Expansion options.
        options: SyncOptions,
    },
    /// Persist one dependent row from its parent's response.
    UpdateOrCreateInline {
        /// Dependent kind.
        kind: EntityKind,
        /// Identity of the stored parent.
        parent_id: EntityId,
        /// Raw element taken from the parent's response.
        record: RawRecord,
        /// Sections enabled for the parent call.
        sections: SectionSet,
    },
    /// Load every region with its descendants.
    LoadMap,
    /// Load every inventory category with its descendants.
    LoadAllTypes,
    /// Load the ship category with its descendants.
    LoadShipTypes,
    /// Load the structure category with its descendants.
    LoadStructureTypes,
    /// Load selected categories, groups and types.
    LoadTypes {
        /// Categories loaded with their groups and types.
        category_ids: Vec<EntityId>,
        /// Groups loaded with their types.
        group_ids: Vec<EntityId>,
        /// Types loaded on their own.
        type_ids: Vec<EntityId>,
        /// Always include dogmas.
        force_dogmas: bool,
    },
    /// Store and resolve named entities.
    CreateNamedEntities {
        /// IDs to create.
        ids: Vec<EntityId>,
    },
    /// Resolve every stored named entity without a name.
    UpdateUnresolvedNamedEntities,
    /// Refresh stale market prices.
    UpdateMarketPrices {
        /// Staleness override in minutes.
        minutes_until_stale: Option<u32>,
    },
}

impl Task {
    /// Snake-case name of the operation.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoadObject { .. } => "load_object",
            Self::UpdateOrCreate { .. } => "update_or_create",
            Self::UpdateOrCreateInline { .. } => "update_or_create_inline",
            Self::LoadMap => "load_map",
            Self::LoadAllTypes => "load_all_types",
            Self::LoadShipTypes => "load_ship_types",
            Self::LoadStructureTypes => "load_structure_types",
            Self::LoadTypes { .. } => "load_types",
            Self::CreateNamedEntities { .. } => "create_named_entities",
            Self::UpdateUnresolvedNamedEntities => "update_unresolved_named_entities",
            Self::UpdateMarketPrices { .. } => "update_market_prices",
        }
    }
}

/// A task scheduled at a priority; lower numbers run first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOfWork {
    /// Operation to run.
    pub task: Task,
    /// Scheduling priority.
    pub priority: u8,
}

impl UnitOfWork {
    /// Schedule `task` at `priority`.
    #[must_use]
    pub const fn new(task: Task, priority: u8) -> Self {
        Self { task, priority }
    }

    /// Deterministic lock key derived from the task and its arguments.
    ///
    /// The key is the SHA-256 hex digest of the task's JSON form. Object
    /// keys serialize sorted, so equal tasks share a key. The priority is not
    /// part of the key.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] when the task cannot be encoded.
    pub fn lock_key(&self) -> Result<String, serde_json::Error> {
        let encoded = serde_json::to_vec(&self.task)?;
        let digest = Sha256::digest(&encoded);
        let mut key = String::with_capacity(64);
        for byte in digest {
            let _ = write!(key, "{byte:02x}");
        }
        Ok(key)
    }
}

/// Failure to hand a unit of work to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The executor refused the unit.
    #[error("executor rejected task '{task}': {message}")]
    Rejected {
        /// Name of the rejected task.
        task: &'static str,
        /// Reason reported by the executor.
        message: String,
    },
}

/// Fire-and-forget scheduling of background work.
pub trait AsyncExecutor {
    /// Schedule `unit`; delivery is at least once.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecutorError`] when the unit cannot be scheduled.
    fn enqueue(&self, unit: UnitOfWork) -> Result<(), ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Section;
    use rstest::rstest;

    fn load(id: EntityId, sections: SectionSet) -> UnitOfWork {
        UnitOfWork::new(
            Task::UpdateOrCreate {
                kind: EntityKind::Region,
                id,
                options: SyncOptions::default().with_sections(sections),
            },
            7,
        )
    }

    #[rstest]
    fn lock_key_is_stable_hex() {
        let unit = load(10_000_002, SectionSet::EMPTY);
        let key = unit.lock_key().expect("lock key");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, unit.lock_key().expect("lock key"));
    }

    #[rstest]
    fn lock_key_ignores_priority() {
        let mut unit = load(10_000_002, SectionSet::EMPTY);
        let key = unit.lock_key().expect("lock key");
        unit.priority = 1;
        assert_eq!(unit.lock_key().expect("lock key"), key);
    }

    #[rstest]
    #[case(load(10_000_003, SectionSet::EMPTY))]
    #[case(load(10_000_002, SectionSet::from_iter([Section::Planets])))]
    fn lock_key_changes_with_arguments(#[case] other: UnitOfWork) {
        let base = load(10_000_002, SectionSet::EMPTY);
        assert_ne!(
            base.lock_key().expect("lock key"),
            other.lock_key().expect("lock key")
        );
    }

    #[rstest]
    fn tasks_serialize_with_a_tag() {
        let json = serde_json::to_value(&Task::LoadMap).expect("encode");
        assert_eq!(json, serde_json::json!({"task": "load_map"}));
    }
}
