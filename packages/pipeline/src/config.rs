//! Run configuration loaded from TOML.
//!
//! ```toml
//! cross_sections = "S_XS.geojson"
//! flood_hazard = "S_FLD_HAZ_AR.geojson"
//! elevation_table = "L_XS_ELEV.csv"
//! terrain = "dem.tif"
//! output_folder = "wse"
//! streams = ["Clear Creek", "Mill Branch"]
//! events = ["01pct", "0_2pct", "10 Percent Chance"]
//! cell_size = 10.0
//! mosaic = true
//!
//! [spatial_reference]
//! epsg = 2236
//! ```
//!
//! Relative paths are resolved against the directory holding the file. The
//! spatial reference's unit comes from the EPSG registry unless `unit` is
//! given.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use wse_grids_engine::{LinearUnit, SpatialRef};
use wse_grids_event_models::EventType;

use crate::PipelineError;

/// Working spatial reference of the outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpatialReferenceConfig {
    /// EPSG code.
    pub epsg: u32,
    /// Linear unit of the coordinates; looked up from `epsg` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<LinearUnit>,
}

/// Everything one pipeline run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Cross-section lines (`GeoJSON`).
    pub cross_sections: PathBuf,
    /// Flood-hazard area polygons (`GeoJSON`).
    pub flood_hazard: PathBuf,
    /// Cross-section elevation table (CSV).
    pub elevation_table: PathBuf,
    /// Terrain model (`GeoTIFF`); also the snap grid.
    pub terrain: PathBuf,
    /// Root of all outputs.
    pub output_folder: PathBuf,
    /// Streams (`WTR_NM` values) to process. Empty processes every stream
    /// in the cross-section layer.
    #[serde(default)]
    pub streams: Vec<String>,
    /// Events to process, by code, field name or synonym. Empty processes
    /// every event.
    #[serde(default)]
    pub events: Vec<String>,
    /// Output cell size in working linear units.
    pub cell_size: f64,
    /// Working spatial reference.
    pub spatial_reference: SpatialReferenceConfig,
    /// Build the per-event composites after all streams.
    #[serde(default = "default_mosaic")]
    pub mosaic: bool,
    /// Keep TINs and unclipped rasters instead of deleting them.
    #[serde(default)]
    pub keep_intermediate: bool,
}

const fn default_mosaic() -> bool {
    true
}

impl RunConfig {
    /// Loads and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or fails
    /// [`Self::validate`].
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a configuration without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or fails
    /// [`Self::validate`].
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges and event names.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for a bad cell size, spatial
    /// reference or stream name, and [`PipelineError::UnknownEvent`] for an
    /// unrecognized event.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(PipelineError::Config {
                message: format!("cell_size must be positive, got {}", self.cell_size),
            });
        }
        if self.spatial_reference.epsg == 0 {
            return Err(PipelineError::Config {
                message: "spatial_reference.epsg must be set".to_string(),
            });
        }
        if self.spatial_reference.unit.is_none()
            && SpatialRef::from_epsg(self.spatial_reference.epsg).is_none()
        {
            return Err(PipelineError::Config {
                message: format!(
                    "EPSG:{} is not in the registry; set spatial_reference.unit",
                    self.spatial_reference.epsg
                ),
            });
        }
        if self.spatial_ref().is_geographic() {
            return Err(PipelineError::Config {
                message: "spatial_reference must be projected (unit foot or meter)".to_string(),
            });
        }
        if let Some(blank) = self.streams.iter().find(|s| s.trim().is_empty()) {
            return Err(PipelineError::Config {
                message: format!("stream name {blank:?} is blank"),
            });
        }
        self.event_types()?;
        Ok(())
    }

    /// The configured events, resolved and de-duplicated in order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownEvent`] for an unrecognized name.
    pub fn event_types(&self) -> Result<Vec<EventType>, PipelineError> {
        if self.events.is_empty() {
            return Ok(EventType::all().to_vec());
        }
        let mut events = Vec::with_capacity(self.events.len());
        for name in &self.events {
            let event = EventType::parse_name(name)?;
            if !events.contains(&event) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// The working spatial reference. An explicit unit overrides the
    /// registry's.
    #[must_use]
    pub fn spatial_ref(&self) -> SpatialRef {
        let epsg = self.spatial_reference.epsg;
        match self.spatial_reference.unit {
            Some(unit) => SpatialRef::new(epsg, unit),
            None => SpatialRef::from_epsg(epsg)
                .unwrap_or_else(|| SpatialRef::new(epsg, LinearUnit::default())),
        }
    }

    /// Makes every relative input/output path relative to `base` instead.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        for path in [
            &mut self.cross_sections,
            &mut self.flood_hazard,
            &mut self.elevation_table,
            &mut self.terrain,
            &mut self.output_folder,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        cross_sections = "S_XS.geojson"
        flood_hazard = "S_FLD_HAZ_AR.geojson"
        elevation_table = "L_XS_ELEV.csv"
        terrain = "/data/dem.tif"
        output_folder = "wse"
        streams = ["Clear Creek"]
        events = ["01pct", "WSE_0_2pct", "10 Percent Chance", "1 Percent Chance"]
        cell_size = 10.0

        [spatial_reference]
        epsg = 2236
    "#;

    #[test]
    fn parses_and_resolves_events() {
        let config = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert!(config.mosaic);
        assert!(!config.keep_intermediate);
        assert_eq!(
            config.event_types().unwrap(),
            vec![EventType::Pct1, EventType::Pct0_2, EventType::Pct10]
        );
        assert_eq!(config.spatial_ref(), SpatialRef::new(2236, LinearUnit::Foot));
    }

    #[test]
    fn explicit_unit_overrides_the_registry() {
        let text = SAMPLE.replace("epsg = 2236", "epsg = 99999\nunit = \"meter\"");
        let config = RunConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.spatial_ref(), SpatialRef::new(99999, LinearUnit::Meter));
    }

    #[test]
    fn empty_events_means_all() {
        let text = SAMPLE.replace(
            r#"events = ["01pct", "WSE_0_2pct", "10 Percent Chance", "1 Percent Chance"]"#,
            "",
        );
        let config = RunConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.event_types().unwrap().len(), EventType::all().len());
    }

    #[test]
    fn rejects_bad_values() {
        let bad_cell = SAMPLE.replace("cell_size = 10.0", "cell_size = 0.0");
        assert!(matches!(
            RunConfig::from_toml_str(&bad_cell),
            Err(PipelineError::Config { .. })
        ));

        let bad_event = SAMPLE.replace("\"01pct\",", "\"100 year\",");
        assert!(matches!(
            RunConfig::from_toml_str(&bad_event),
            Err(PipelineError::UnknownEvent(_))
        ));

        let geographic = SAMPLE.replace("epsg = 2236", "epsg = 4326");
        assert!(matches!(
            RunConfig::from_toml_str(&geographic),
            Err(PipelineError::Config { .. })
        ));

        let unregistered = SAMPLE.replace("epsg = 2236", "epsg = 99999");
        assert!(matches!(
            RunConfig::from_toml_str(&unregistered),
            Err(PipelineError::Config { .. })
        ));

        let unknown_key = format!("{SAMPLE}\nsnap_raster = \"x.tif\"");
        assert!(matches!(
            RunConfig::from_toml_str(&unknown_key),
            Err(PipelineError::Toml(_))
        ));
    }

    #[test]
    fn resolves_relative_paths() {
        let mut config = RunConfig::from_toml_str(SAMPLE).unwrap();
        config.resolve_relative_to(Path::new("/projects/fema"));
        assert_eq!(
            config.cross_sections,
            Path::new("/projects/fema/S_XS.geojson")
        );
        assert_eq!(config.terrain, Path::new("/data/dem.tif"));
        assert_eq!(config.output_folder, Path::new("/projects/fema/wse"));
    }
}
