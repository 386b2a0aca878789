//! Optional sections and the persisted loaded-sections bitmask.
//!
//! A [`Section`] names an independently toggleable bundle of related data
//! for one entity kind. Each kind only honours the sections its descriptor
//! declares; other sections are ignored for that kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named toggles controlling optional related data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Asteroid belts of planets.
    AsteroidBelts,
    /// Dogma attributes and effects of inventory types.
    Dogmas,
    /// Graphic references of inventory types.
    Graphics,
    /// Market group references of inventory types.
    MarketGroups,
    /// Moons of planets.
    Moons,
    /// Planets of solar systems.
    Planets,
    /// Stargates of solar systems.
    Stargates,
    /// Stars of solar systems.
    Stars,
    /// Stations of solar systems.
    Stations,
    /// Material composition of inventory types.
    TypeMaterials,
    /// Industry recipes of inventory types.
    IndustryActivities,
}

impl Section {
    /// All sections in bit order.
    pub const ALL: [Self; 11] = [
        Self::AsteroidBelts,
        Self::Dogmas,
        Self::Graphics,
        Self::MarketGroups,
        Self::Moons,
        Self::Planets,
        Self::Stargates,
        Self::Stars,
        Self::Stations,
        Self::TypeMaterials,
        Self::IndustryActivities,
    ];

    /// Stable name used in configuration and task payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AsteroidBelts => "asteroid_belts",
            Self::Dogmas => "dogmas",
            Self::Graphics => "graphics",
            Self::MarketGroups => "market_groups",
            Self::Moons => "moons",
            Self::Planets => "planets",
            Self::Stargates => "stargates",
            Self::Stars => "stars",
            Self::Stations => "stations",
            Self::TypeMaterials => "type_materials",
            Self::IndustryActivities => "industry_activities",
        }
    }

    const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown section name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown section '{name}'")]
pub struct ParseSectionError {
    /// The rejected input.
    pub name: String,
}

impl FromStr for Section {
    type Err = ParseSectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| ParseSectionError { name: s.to_owned() })
    }
}

/// A set of sections stored as a fixed-width bitmask.
///
/// The only mutating operation is [`SectionSet::union`] (and its in-place
/// form), so a persisted set can grow but never shrink.
///
/// # Examples
///
/// ```
/// use eveuniverse_core::{Section, SectionSet};
///
/// let loaded = SectionSet::from_iter([Section::Planets]);
/// let wanted = SectionSet::from_iter([Section::Planets, Section::Stars]);
/// assert!(!loaded.covers(wanted));
/// assert!(loaded.union(wanted).covers(wanted));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<Section>", from = "Vec<Section>")]
pub struct SectionSet(u32);

impl SectionSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Build a set from its persisted bitmask, ignoring unknown bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        let mut known = 0;
        let mut index = 0;
        while index < Section::ALL.len() {
            known |= Section::ALL[index].bit();
            index += 1;
        }
        Self(bits & known)
    }

    /// The persisted bitmask.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether the set holds no sections.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether `section` is a member.
    #[must_use]
    pub const fn contains(self, section: Section) -> bool {
        self.0 & section.bit() != 0
    }

    /// Whether every member of `other` is also a member of `self`.
    #[must_use]
    pub const fn covers(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set union.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set intersection.
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Add a single section.
    #[must_use]
    pub const fn with(self, section: Section) -> Self {
        Self(self.0 | section.bit())
    }

    /// Merge `other` into `self`.
    pub const fn merge(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Iterate over the members in bit order.
    pub fn iter(self) -> impl Iterator<Item = Section> {
        Section::ALL
            .into_iter()
            .filter(move |section| self.contains(*section))
    }
}

impl FromIterator<Section> for SectionSet {
    fn from_iter<I: IntoIterator<Item = Section>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl From<Vec<Section>> for SectionSet {
    fn from(sections: Vec<Section>) -> Self {
        sections.into_iter().collect()
    }
}

impl From<SectionSet> for Vec<Section> {
    fn from(set: SectionSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Display for SectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Section::as_str).collect();
        f.write_str(&names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("planets", Section::Planets)]
    #[case("asteroid_belts", Section::AsteroidBelts)]
    #[case("industry_activities", Section::IndustryActivities)]
    fn parses_section_names(#[case] name: &str, #[case] expected: Section) {
        assert_eq!(name.parse::<Section>().expect("known section"), expected);
    }

    #[rstest]
    fn rejects_unknown_section_name() {
        let err = "wormholes".parse::<Section>().expect_err("unknown");
        assert_eq!(err.name, "wormholes");
    }

    #[rstest]
    fn empty_set_is_covered_by_everything() {
        let set = SectionSet::from_iter([Section::Moons]);
        assert!(set.covers(SectionSet::EMPTY));
        assert!(SectionSet::EMPTY.covers(SectionSet::EMPTY));
    }

    #[rstest]
    fn from_bits_drops_unknown_bits() {
        let set = SectionSet::from_bits(u32::MAX);
        assert_eq!(set.iter().count(), Section::ALL.len());
    }

    #[rstest]
    fn serialises_as_section_names() {
        let set = SectionSet::from_iter([Section::Stars, Section::Dogmas]);
        let json = serde_json::to_string(&set).expect("serialise");
        assert_eq!(json, r#"["dogmas","stars"]"#);
        let back: SectionSet = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, set);
    }

    fn section_strategy() -> impl Strategy<Value = SectionSet> {
        any::<u32>().prop_map(SectionSet::from_bits)
    }

    proptest! {
        #[test]
        fn merged_sets_equal_union_of_requests(
            requests in prop::collection::vec(section_strategy(), 1..8),
        ) {
            let mut persisted = SectionSet::EMPTY;
            for request in &requests {
                let before = persisted;
                persisted.merge(*request);
                prop_assert!(persisted.covers(before));
            }
            let expected = requests.iter().fold(SectionSet::EMPTY, |acc, s| acc.union(*s));
            prop_assert_eq!(persisted, expected);
        }
    }
}
