#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Flood-frequency event taxonomy.
//!
//! Defines the closed set of annual-exceedance-probability events a WSE grid
//! can be produced for, the textual synonyms that elevation tables use to
//! name them, and the reserved "no data" codes carried on vector attributes.
//! Every elevation attribute, TIN, and raster name binds to exactly one
//! [`EventType`].

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Placeholder written to every event attribute before the elevation join.
pub const UNSET_ELEVATION: f64 = -8888.0;

/// Alternate "no data" code found on delivered cross-section attributes.
pub const MISSING_ELEVATION: f64 = -9999.0;

/// Returns `true` if `value` is one of the reserved vector "no data" codes.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn is_sentinel(value: f64) -> bool {
    value == UNSET_ELEVATION || value == MISSING_ELEVATION
}

/// A flood-frequency class (annual chance of exceedance).
///
/// The strum/serde representation is the short event code used in file
/// names (`01pct` -> `01pct.tif`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum EventType {
    /// 50% annual chance (2-year).
    #[serde(rename = "50pct")]
    #[strum(serialize = "50pct")]
    Pct50,
    /// 20% annual chance (5-year).
    #[serde(rename = "20pct")]
    #[strum(serialize = "20pct")]
    Pct20,
    /// 10% annual chance (10-year).
    #[serde(rename = "10pct")]
    #[strum(serialize = "10pct")]
    Pct10,
    /// 4% annual chance (25-year).
    #[serde(rename = "04pct")]
    #[strum(serialize = "04pct")]
    Pct4,
    /// 2% annual chance (50-year).
    #[serde(rename = "02pct")]
    #[strum(serialize = "02pct")]
    Pct2,
    /// 1% annual chance plus (upper confidence limit).
    #[serde(rename = "01plus")]
    #[strum(serialize = "01plus")]
    Pct1Plus,
    /// 1% annual chance minus (lower confidence limit).
    #[serde(rename = "01minus")]
    #[strum(serialize = "01minus")]
    Pct1Minus,
    /// 1% annual chance (base flood).
    #[serde(rename = "01pct")]
    #[strum(serialize = "01pct")]
    Pct1,
    /// 0.2% annual chance (500-year).
    #[serde(rename = "0_2pct")]
    #[strum(serialize = "0_2pct")]
    Pct0_2,
    /// 0.5% annual chance (200-year).
    #[serde(rename = "0_5pct")]
    #[strum(serialize = "0_5pct")]
    Pct0_5,
    /// 1% annual chance under future conditions.
    #[serde(rename = "01pctfut")]
    #[strum(serialize = "01pctfut")]
    Pct1Future,
}

/// Which regulatory flood-hazard extent bounds an event's grid.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum ExtentClass {
    /// The 1% annual chance floodplain.
    #[serde(rename = "1pct")]
    #[strum(serialize = "1pct")]
    OnePercent,
    /// The 0.2% annual chance floodplain (contains the 1% floodplain).
    #[serde(rename = "0_2pct")]
    #[strum(serialize = "0_2pct")]
    PointTwoPercent,
}

impl EventType {
    /// Short event code used in artifact names.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Pct50 => "50pct",
            Self::Pct20 => "20pct",
            Self::Pct10 => "10pct",
            Self::Pct4 => "04pct",
            Self::Pct2 => "02pct",
            Self::Pct1Plus => "01plus",
            Self::Pct1Minus => "01minus",
            Self::Pct1 => "01pct",
            Self::Pct0_2 => "0_2pct",
            Self::Pct0_5 => "0_5pct",
            Self::Pct1Future => "01pctfut",
        }
    }

    /// Name of the per-event elevation attribute on the working
    /// cross-section layer.
    #[must_use]
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Pct50 => "WSE_50pct",
            Self::Pct20 => "WSE_20pct",
            Self::Pct10 => "WSE_10pct",
            Self::Pct4 => "WSE_04pct",
            Self::Pct2 => "WSE_02pct",
            Self::Pct1Plus => "WSE_01plus",
            Self::Pct1Minus => "WSE_01min",
            Self::Pct1 => "WSE_01pct",
            Self::Pct0_2 => "WSE_0_2pct",
            Self::Pct0_5 => "WSE_0_5pct",
            Self::Pct1Future => "WSE_01fut",
        }
    }

    /// Name of the attribute written by the combine utility.
    #[must_use]
    pub const fn combined_field_name(self) -> &'static str {
        match self {
            Self::Pct50 => "PCT_50",
            Self::Pct20 => "PCT_20",
            Self::Pct10 => "PCT_10",
            Self::Pct4 => "PCT_4",
            Self::Pct2 => "PCT_2",
            Self::Pct1Plus => "PCT_1_Plus",
            Self::Pct1Minus => "PCT_1_Min",
            Self::Pct1 => "PCT_1",
            Self::Pct0_2 => "PCT_0_2",
            Self::Pct0_5 => "PCT_0_5",
            Self::Pct1Future => "PCT_1_Fut",
        }
    }

    /// Every spelling an elevation table may use for this event.
    ///
    /// The future-conditions event keeps the misspelled "Change" variant
    /// found in delivered tables.
    #[must_use]
    pub const fn synonyms(self) -> &'static [&'static str] {
        match self {
            Self::Pct50 => &["50pct", "50 Percent Chance"],
            Self::Pct20 => &["20pct", "20 Percent Chance"],
            Self::Pct10 => &["10pct", "10 Percent Chance"],
            Self::Pct4 => &["04pct", "4 Percent Chance"],
            Self::Pct2 => &["02pct", "2 Percent Chance"],
            Self::Pct1Plus => &["01plus", "1 Percent Plus Chance"],
            Self::Pct1Minus => &["01minus", "1 Percent Minus Chance"],
            Self::Pct1 => &["01pct", "1 Percent Chance"],
            Self::Pct0_2 => &["0_2pct", "0.2 Percent Chance"],
            Self::Pct0_5 => &["0_5pct", "0.5 Percent Chance"],
            Self::Pct1Future => &[
                "01pctfut",
                "1 Percent Chance Future Conditions",
                "1 Percent Change Future Conditions",
            ],
        }
    }

    /// Normalizes an elevation-table event text to its event.
    ///
    /// Matching is exact and case-sensitive; unknown text yields `None`.
    #[must_use]
    pub fn from_event_text(text: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|event| event.synonyms().contains(&text))
    }

    /// Resolves a user-supplied event name: an event code, a `WSE_*`
    /// attribute name, or any table synonym.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEventError`] if the name matches no event.
    pub fn parse_name(name: &str) -> Result<Self, UnknownEventError> {
        Self::all()
            .iter()
            .copied()
            .find(|event| {
                event.code() == name || event.field_name() == name || event.synonyms().contains(&name)
            })
            .ok_or_else(|| UnknownEventError {
                name: name.to_string(),
            })
    }

    /// Regulatory extent that bounds this event's grid.
    ///
    /// The plus/minus confidence limits and the rarer events are bounded by
    /// the 0.2% floodplain; everything else by the 1% floodplain.
    #[must_use]
    pub const fn extent_class(self) -> ExtentClass {
        match self {
            Self::Pct1Plus | Self::Pct1Minus | Self::Pct0_2 | Self::Pct0_5 => {
                ExtentClass::PointTwoPercent
            }
            Self::Pct50
            | Self::Pct20
            | Self::Pct10
            | Self::Pct4
            | Self::Pct2
            | Self::Pct1
            | Self::Pct1Future => ExtentClass::OnePercent,
        }
    }

    /// Whether terrain-floor enforcement applies to this event.
    ///
    /// Policy: the base 1% and 0.2% grids are authoritative and are never
    /// floor-corrected.
    #[must_use]
    pub const fn enforces_terrain_floor(self) -> bool {
        !matches!(self, Self::Pct1 | Self::Pct0_2)
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Pct50,
            Self::Pct20,
            Self::Pct10,
            Self::Pct4,
            Self::Pct2,
            Self::Pct1Plus,
            Self::Pct1Minus,
            Self::Pct1,
            Self::Pct0_2,
            Self::Pct0_5,
            Self::Pct1Future,
        ]
    }
}

impl ExtentClass {
    /// Base name of the buffered extent layer in the workspace root.
    #[must_use]
    pub const fn layer_name(self) -> &'static str {
        match self {
            Self::OnePercent => "flooding_1pct",
            Self::PointTwoPercent => "flooding_0_2pct",
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::OnePercent, Self::PointTwoPercent]
    }
}

/// Error returned when a configured event name matches no [`EventType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventError {
    /// The name that failed to resolve.
    pub name: String,
}

impl std::fmt::Display for UnknownEventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown flood event '{}'", self.name)
    }
}

impl std::error::Error for UnknownEventError {}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::str::FromStr;

    use super::*;

    #[test]
    fn synonyms_normalize_to_same_event() {
        assert_eq!(
            EventType::from_event_text("01pct"),
            EventType::from_event_text("1 Percent Chance")
        );
        assert_eq!(
            EventType::from_event_text("1 Percent Change Future Conditions"),
            Some(EventType::Pct1Future)
        );
        assert_eq!(
            EventType::from_event_text("0.2 Percent Chance"),
            Some(EventType::Pct0_2)
        );
    }

    #[test]
    fn event_text_matching_is_exact() {
        assert_eq!(EventType::from_event_text("1 percent chance"), None);
        assert_eq!(EventType::from_event_text(" 01pct"), None);
        assert_eq!(EventType::from_event_text("WSE_01pct"), None);
    }

    #[test]
    fn synonyms_are_unique_across_events() {
        let mut seen = BTreeSet::new();
        for event in EventType::all() {
            for synonym in event.synonyms() {
                assert!(seen.insert(*synonym), "{synonym} maps to two events");
            }
        }
    }

    #[test]
    fn parse_name_accepts_code_field_and_synonym() {
        for event in EventType::all() {
            assert_eq!(EventType::parse_name(event.code()), Ok(*event));
            assert_eq!(EventType::parse_name(event.field_name()), Ok(*event));
            assert_eq!(EventType::parse_name(event.synonyms()[1]), Ok(*event));
        }
        assert!(EventType::parse_name("100 year").is_err());
    }

    #[test]
    fn display_matches_code() {
        for event in EventType::all() {
            assert_eq!(event.to_string(), event.code());
            assert_eq!(EventType::from_str(event.code()), Ok(*event));
        }
    }

    #[test]
    fn extent_class_assignment() {
        let point_two: Vec<_> = EventType::all()
            .iter()
            .copied()
            .filter(|e| e.extent_class() == ExtentClass::PointTwoPercent)
            .collect();
        assert_eq!(
            point_two,
            vec![
                EventType::Pct1Plus,
                EventType::Pct1Minus,
                EventType::Pct0_2,
                EventType::Pct0_5
            ]
        );
    }

    #[test]
    fn only_base_events_skip_floor() {
        let exempt: Vec<_> = EventType::all()
            .iter()
            .copied()
            .filter(|e| !e.enforces_terrain_floor())
            .collect();
        assert_eq!(exempt, vec![EventType::Pct1, EventType::Pct0_2]);
    }

    #[test]
    fn sentinels() {
        assert!(is_sentinel(-8888.0));
        assert!(is_sentinel(-9999.0));
        assert!(!is_sentinel(0.0));
        assert!(!is_sentinel(101.2));
    }
}
