//! Engine configuration passed explicitly at construction time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_NAMES_BATCH_SIZE, DEFAULT_NAMES_PAGE_SIZE};
use crate::schema::{Section, SectionSet};

/// Settings for the synchronization engine and its task runner.
///
/// The `load_*` toggles form the default sections merged into every call.
///
/// # Examples
///
/// ```
/// use eveuniverse_core::{EngineConfig, Section};
///
/// let config: EngineConfig = serde_json::from_str(r#"{"load_planets": true}"#)
///     .expect("valid configuration");
/// assert!(config.default_sections().contains(Section::Planets));
/// assert_eq!(config.tasks_priority, 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Load asteroid belts with planets.
    pub load_asteroid_belts: bool,
    /// Load dogma attributes and effects with types.
    pub load_dogmas: bool,
    /// Load graphics with types.
    pub load_graphics: bool,
    /// Load market groups with types.
    pub load_market_groups: bool,
    /// Load moons with planets.
    pub load_moons: bool,
    /// Load planets with solar systems.
    pub load_planets: bool,
    /// Load stargates with solar systems.
    pub load_stargates: bool,
    /// Load stars with solar systems.
    pub load_stars: bool,
    /// Load stations with solar systems.
    pub load_stations: bool,
    /// Load reprocessing materials with types.
    pub load_type_materials: bool,
    /// Load industry activities with types.
    pub load_industry_activities: bool,
    /// Priority of tasks spawned by loaders.
    pub tasks_priority: u8,
    /// Lock budget for a single task, in seconds.
    pub tasks_time_limit: u64,
    /// Number of retries for transient task failures.
    pub task_retry_budget: u32,
    /// Base of the exponential retry backoff, in seconds.
    pub task_backoff_base: u64,
    /// Maximum IDs per names request.
    pub names_page_size: usize,
    /// Maximum names per ID lookup request.
    pub names_batch_size: usize,
    /// Age after which stored market prices are refreshed, in minutes.
    pub market_price_minutes_until_stale: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            load_asteroid_belts: false,
            load_dogmas: false,
            load_graphics: false,
            load_market_groups: false,
            load_moons: false,
            load_planets: false,
            load_stargates: false,
            load_stars: false,
            load_stations: false,
            load_type_materials: false,
            load_industry_activities: false,
            tasks_priority: 7,
            tasks_time_limit: 7200,
            task_retry_budget: 3,
            task_backoff_base: 1,
            names_page_size: DEFAULT_NAMES_PAGE_SIZE,
            names_batch_size: DEFAULT_NAMES_BATCH_SIZE,
            market_price_minutes_until_stale: 60,
        }
    }
}

impl EngineConfig {
    /// Sections enabled by the `load_*` toggles.
    #[must_use]
    pub fn default_sections(&self) -> SectionSet {
        [
            (self.load_asteroid_belts, Section::AsteroidBelts),
            (self.load_dogmas, Section::Dogmas),
            (self.load_graphics, Section::Graphics),
            (self.load_market_groups, Section::MarketGroups),
            (self.load_moons, Section::Moons),
            (self.load_planets, Section::Planets),
            (self.load_stargates, Section::Stargates),
            (self.load_stars, Section::Stars),
            (self.load_stations, Section::Stations),
            (self.load_type_materials, Section::TypeMaterials),
            (self.load_industry_activities, Section::IndustryActivities),
        ]
        .into_iter()
        .filter_map(|(enabled, section)| enabled.then_some(section))
        .collect()
    }

    /// Defaults merged with per-call `requested` sections.
    #[must_use]
    pub fn effective_sections(&self, requested: SectionSet) -> SectionSet {
        self.default_sections().union(requested)
    }

    /// Lock budget as a [`Duration`].
    #[must_use]
    pub const fn task_time_limit(&self) -> Duration {
        Duration::from_secs(self.tasks_time_limit)
    }

    /// Enable every section toggle.
    #[must_use]
    pub fn with_all_sections(mut self) -> Self {
        self.load_asteroid_belts = true;
        self.load_dogmas = true;
        self.load_graphics = true;
        self.load_market_groups = true;
        self.load_moons = true;
        self.load_planets = true;
        self.load_stargates = true;
        self.load_stars = true;
        self.load_stations = true;
        self.load_type_materials = true;
        self.load_industry_activities = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_enable_no_sections() {
        let config = EngineConfig::default();
        assert!(config.default_sections().is_empty());
        assert_eq!(config.names_page_size, 1000);
        assert_eq!(config.task_time_limit(), Duration::from_secs(7200));
    }

    #[rstest]
    fn effective_sections_union_defaults_and_request() {
        let config = EngineConfig {
            load_stars: true,
            ..EngineConfig::default()
        };
        let effective = config.effective_sections(SectionSet::from_iter([Section::Planets]));
        assert_eq!(
            effective,
            SectionSet::from_iter([Section::Planets, Section::Stars])
        );
    }

    #[rstest]
    fn all_sections_toggle_covers_every_section() {
        let config = EngineConfig::default().with_all_sections();
        assert_eq!(
            config.default_sections(),
            Section::ALL.into_iter().collect::<SectionSet>()
        );
    }
}
