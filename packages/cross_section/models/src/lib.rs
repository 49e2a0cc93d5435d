#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cross-section line and elevation record types.
//!
//! A [`CrossSection`] is a surveyed transect across a stream carrying one
//! water-surface elevation per [`EventType`]. [`ElevationRecord`]s are the
//! rows of the tabular elevation input that get joined onto them.

use std::collections::BTreeMap;

use geo::MultiLineString;
use serde::{Deserialize, Serialize};
use wse_grids_event_models::{EventType, UNSET_ELEVATION, is_sentinel};

/// Attribute holding the unique line identifier.
pub const LINE_ID_FIELD: &str = "XS_LN_ID";
/// Attribute holding the stream (water body) name.
pub const STREAM_FIELD: &str = "WTR_NM";
/// Attribute holding the station along the stream.
pub const STATION_FIELD: &str = "STREAM_STN";

/// Per-event elevations carried by a cross-section.
///
/// Every [`EventType`] always has a value: either a joined elevation or
/// [`UNSET_ELEVATION`].
#[derive(Debug, Clone, PartialEq)]
pub struct EventElevations(BTreeMap<EventType, f64>);

impl EventElevations {
    /// All events set to [`UNSET_ELEVATION`].
    #[must_use]
    pub fn unset() -> Self {
        Self(
            EventType::all()
                .iter()
                .map(|event| (*event, UNSET_ELEVATION))
                .collect(),
        )
    }

    /// Raw attribute value for `event`, sentinel included.
    #[must_use]
    pub fn raw(&self, event: EventType) -> f64 {
        self.0.get(&event).copied().unwrap_or(UNSET_ELEVATION)
    }

    /// The elevation for `event`, or `None` if it is still a sentinel.
    #[must_use]
    pub fn get(&self, event: EventType) -> Option<f64> {
        let value = self.raw(event);
        (!is_sentinel(value)).then_some(value)
    }

    /// Overwrites the elevation for `event`.
    pub fn set(&mut self, event: EventType, value: f64) {
        self.0.insert(event, value);
    }

    /// Iterates `(event, raw value)` pairs in event order.
    pub fn iter(&self) -> impl Iterator<Item = (EventType, f64)> + '_ {
        self.0.iter().map(|(event, value)| (*event, *value))
    }
}

impl Default for EventElevations {
    fn default() -> Self {
        Self::unset()
    }
}

/// A surveyed cross-section line belonging to one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSection {
    /// Unique line identifier (`XS_LN_ID`).
    pub line_id: String,
    /// Stream name (`WTR_NM`).
    pub stream: String,
    /// Distance along the stream (`STREAM_STN`).
    pub station: f64,
    /// Line geometry in the layer's spatial reference.
    pub geometry: MultiLineString<f64>,
    /// Per-event water-surface elevations.
    pub elevations: EventElevations,
}

impl CrossSection {
    /// Whether this cross-section has a real elevation for `event`.
    #[must_use]
    pub fn has_elevation(&self, event: EventType) -> bool {
        self.elevations.get(event).is_some()
    }
}

/// One row of the cross-section elevation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationRecord {
    /// Line identifier this elevation belongs to.
    #[serde(rename = "XS_LN_ID")]
    pub line_id: String,
    /// Event text as delivered (code or long-form synonym).
    #[serde(rename = "EVENT_TYP")]
    pub event_type: String,
    /// Water-surface elevation.
    #[serde(rename = "WSEL")]
    pub wsel: Option<f64>,
    /// `"T"` when the line is a 2D evaluation line.
    #[serde(rename = "EVAL_LN", default)]
    pub eval_line: Option<String>,
}

impl ElevationRecord {
    /// Whether this record marks its line as a non-representative 2D
    /// evaluation line.
    #[must_use]
    pub fn is_evaluation_line(&self) -> bool {
        self.eval_line.as_deref() == Some("T")
    }

    /// The event this record's text names, if recognized.
    #[must_use]
    pub fn event(&self) -> Option<EventType> {
        EventType::from_event_text(&self.event_type)
    }
}
