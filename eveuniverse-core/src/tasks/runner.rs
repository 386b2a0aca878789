//! Drains a [`TaskQueue`] against a [`SyncEngine`].

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};

use super::{AdvisoryLock, Task, TaskQueue, UnitOfWork};
use crate::config::EngineConfig;
use crate::engine::{EngineError, SyncEngine};
use crate::names::NameResolver;

/// Upper bound of a single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(600);

/// Exponential backoff for transient task failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound of any delay.
    pub cap: Duration,
}

impl RetryPolicy {
    /// Policy described by `config`.
    #[must_use]
    pub const fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.task_retry_budget,
            base: Duration::from_secs(config.task_backoff_base),
            cap: MAX_BACKOFF,
        }
    }

    /// Delay before retry number `attempt`, counting from zero.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        2_u32
            .checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}

/// A unit that failed after its retries were spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Name of the failed task.
    pub task: &'static str,
    /// Final error message.
    pub message: String,
}

/// Summary of a [`TaskRunner::drain`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Units that ran to completion.
    pub completed: usize,
    /// Units skipped because their lock was held.
    pub skipped: usize,
    /// Retries spent across all units.
    pub retries: usize,
    /// Units that failed.
    pub failures: Vec<TaskFailure>,
}

enum Outcome {
    Completed { retries: u32 },
    Skipped,
}

/// Runs units of work with locking and retries.
pub struct TaskRunner<'a> {
    engine: &'a SyncEngine<'a>,
    lock: &'a dyn AdvisoryLock,
    names: Option<&'a NameResolver<'a>>,
    policy: RetryPolicy,
    time_limit: Duration,
    sleep: Box<dyn Fn(Duration) + 'a>,
}

impl fmt::Debug for TaskRunner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("policy", &self.policy)
            .field("time_limit", &self.time_limit)
            .field("names", &self.names.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> TaskRunner<'a> {
    /// Runner using the retry and lock settings of the engine's config.
    #[must_use]
    pub fn new(engine: &'a SyncEngine<'a>, lock: &'a dyn AdvisoryLock) -> Self {
        Self {
            engine,
            lock,
            names: None,
            policy: RetryPolicy::from_config(engine.config()),
            time_limit: engine.config().task_time_limit(),
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Enable the named-entity tasks.
    #[must_use]
    pub fn with_names(mut self, names: &'a NameResolver<'a>) -> Self {
        self.names = Some(names);
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the function used to wait between retries.
    #[must_use]
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Run queued units until the queue is empty, including units enqueued
    /// while draining.
    pub fn drain(&self, queue: &TaskQueue) -> DrainReport {
        let mut report = DrainReport::default();
        while let Some(unit) = queue.pop() {
            match self.run(&unit) {
                Ok(Outcome::Completed { retries }) => {
                    report.completed += 1;
                    report.retries += retries as usize;
                }
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    warn!("task {} failed: {err}", unit.task.name());
                    report.failures.push(TaskFailure {
                        task: unit.task.name(),
                        message: err.to_string(),
                    });
                }
            }
        }
        info!(
            "drained tasks: {} completed, {} skipped, {} failed",
            report.completed,
            report.skipped,
            report.failures.len()
        );
        report
    }

    /// Run one unit under its advisory lock.
    ///
    /// Returns `Ok(false)` when the lock was already held and the unit was
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns the last [`EngineError`] once retries are spent, or at once
    /// for failures that are not transient.
    pub fn run_unit(&self, unit: &UnitOfWork) -> Result<bool, EngineError> {
        Ok(matches!(self.run(unit)?, Outcome::Completed { .. }))
    }

    fn run(&self, unit: &UnitOfWork) -> Result<Outcome, EngineError> {
        let key = unit.lock_key()?;
        if !self.lock.try_acquire(&key, self.time_limit)? {
            info!("task {} is already running, skipping", unit.task.name());
            return Ok(Outcome::Skipped);
        }
        let result = self.run_with_retries(&unit.task);
        let released = self.lock.release(&key);
        let retries = result?;
        released?;
        Ok(Outcome::Completed { retries })
    }

    fn run_with_retries(&self, task: &Task) -> Result<u32, EngineError> {
        let mut attempt = 0;
        loop {
            match self.execute(task) {
                Ok(()) => return Ok(attempt),
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        "task {} failed transiently, retrying in {delay:?}: {err}",
                        task.name()
                    );
                    (self.sleep)(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn execute(&self, task: &Task) -> Result<(), EngineError> {
        debug!("running task {}", task.name());
        match task {
            Task::LoadObject { kind, id, options } => {
                self.engine.get_or_create(*kind, *id, options)?;
            }
            Task::UpdateOrCreate { kind, id, options } => {
                self.engine.update_or_create(*kind, *id, options)?;
            }
            Task::UpdateOrCreateInline {
                kind,
                parent_id,
                record,
                sections,
            } => {
                self.engine
                    .update_or_create_inline(*kind, *parent_id, record, *sections)?;
            }
            Task::LoadMap => {
                self.engine.load_map()?;
            }
            Task::LoadAllTypes => {
                self.engine.load_all_types()?;
            }
            Task::LoadShipTypes => {
                self.engine.load_ship_types()?;
            }
            Task::LoadStructureTypes => {
                self.engine.load_structure_types()?;
            }
            Task::LoadTypes {
                category_ids,
                group_ids,
                type_ids,
                force_dogmas,
            } => {
                self.engine
                    .load_types(category_ids, group_ids, type_ids, *force_dogmas)?;
            }
            Task::CreateNamedEntities { ids } => {
                self.names()?.bulk_create(ids)?;
            }
            Task::UpdateUnresolvedNamedEntities => {
                self.names()?.bulk_update_new()?;
            }
            Task::UpdateMarketPrices {
                minutes_until_stale,
            } => {
                self.engine.update_market_prices(*minutes_until_stale)?;
            }
        }
        Ok(())
    }

    fn names(&self) -> Result<&'a NameResolver<'a>, EngineError> {
        self.names.ok_or(EngineError::MissingNameSource)
    }
}
