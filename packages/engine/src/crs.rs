//! Spatial reference identifiers and coordinate transforms.
//!
//! Every EPSG code is resolved through the `crs-definitions` registry to a
//! proj4 definition, which supplies both the transform (via `proj4rs`) and
//! the linear unit of the coordinates.

use geo::{Coord, Geometry, MapCoords};
use proj4rs::proj::Proj;
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Metres per international foot.
const FOOT_IN_METERS: f64 = 0.3048;

/// Linear unit of a spatial reference's coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinearUnit {
    /// Metres.
    #[default]
    Meter,
    /// Feet (US survey or international).
    Foot,
    /// Geographic degrees.
    Degree,
}

impl LinearUnit {
    /// GeoTIFF `ProjLinearUnitsGeoKey` code, if this is a linear unit.
    #[must_use]
    pub const fn geokey_code(self) -> Option<u16> {
        match self {
            Self::Meter => Some(9001),
            Self::Foot => Some(9003),
            Self::Degree => None,
        }
    }

    /// Inverse of [`Self::geokey_code`].
    #[must_use]
    pub const fn from_geokey_code(code: u16) -> Option<Self> {
        match code {
            9001 => Some(Self::Meter),
            9002 | 9003 => Some(Self::Foot),
            _ => None,
        }
    }

    /// Unit declared by a proj4 definition string.
    fn of_definition(definition: &str) -> Self {
        let mut unit = Self::Meter;
        for token in definition.split_whitespace() {
            match token.trim_start_matches('+').split_once('=') {
                Some(("proj", "longlat" | "latlong" | "lonlat" | "latlon")) => return Self::Degree,
                Some(("units", "us-ft" | "ft" | "ind-ft")) => unit = Self::Foot,
                Some(("to_meter", factor))
                    if factor
                        .parse::<f64>()
                        .is_ok_and(|f| (f - FOOT_IN_METERS).abs() < 1e-4) =>
                {
                    unit = Self::Foot;
                }
                _ => {}
            }
        }
        unit
    }
}

/// An EPSG-coded spatial reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialRef {
    /// EPSG code; `0` when unknown.
    pub epsg: u32,
    /// Unit of the coordinates.
    #[serde(default)]
    pub unit: LinearUnit,
}

impl SpatialRef {
    /// WGS 84 geographic coordinates.
    pub const WGS84: Self = Self {
        epsg: 4326,
        unit: LinearUnit::Degree,
    };

    /// Placeholder for data that carried no spatial reference.
    pub const UNKNOWN: Self = Self {
        epsg: 0,
        unit: LinearUnit::Meter,
    };

    /// Creates a spatial reference from an EPSG code and unit.
    #[must_use]
    pub const fn new(epsg: u32, unit: LinearUnit) -> Self {
        Self { epsg, unit }
    }

    /// Looks `epsg` up in the registry, taking the unit from its definition.
    ///
    /// Returns `None` for codes the registry does not know.
    #[must_use]
    pub fn from_epsg(epsg: u32) -> Option<Self> {
        definition(epsg).map(|d| Self::new(epsg, LinearUnit::of_definition(d)))
    }

    /// Whether the EPSG code is known.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        self.epsg != 0
    }

    /// Whether coordinates are geographic (longitude/latitude).
    #[must_use]
    pub const fn is_geographic(&self) -> bool {
        matches!(self.unit, LinearUnit::Degree)
    }

    /// Parses a CRS name as found in a legacy `GeoJSON` `crs` member:
    /// `EPSG:2236`, `urn:ogc:def:crs:EPSG::2236`, or the OGC CRS84 URN.
    ///
    /// Returns `None` when the name is malformed or the code is not in the
    /// registry.
    #[must_use]
    pub fn from_crs_name(name: &str) -> Option<Self> {
        if name.ends_with("CRS84") {
            return Some(Self::WGS84);
        }
        let code: u32 = name.rsplit(':').next()?.trim().parse().ok()?;
        Self::from_epsg(code)
    }

    /// The name written into a `GeoJSON` `crs` member.
    #[must_use]
    pub fn crs_name(&self) -> String {
        format!("urn:ogc:def:crs:EPSG::{}", self.epsg)
    }
}

impl std::fmt::Display for SpatialRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// proj4 definition of `epsg` from the registry.
fn definition(epsg: u32) -> Option<&'static str> {
    let code = u16::try_from(epsg).ok()?;
    crs_definitions::from_code(code).map(|def| def.proj4)
}

/// A compiled source-to-target transform.
struct Transform {
    source: Proj,
    target: Proj,
    source_degrees: bool,
    target_degrees: bool,
}

impl Transform {
    fn new(source: &SpatialRef, target: &SpatialRef) -> Result<Self, EngineError> {
        let (source, source_degrees) = compile(source)?;
        let (target, target_degrees) = compile(target)?;
        Ok(Self {
            source,
            target,
            source_degrees,
            target_degrees,
        })
    }

    /// `proj4rs` works in radians for geographic systems.
    fn apply(&self, coord: Coord<f64>) -> Result<Coord<f64>, EngineError> {
        let mut point = if self.source_degrees {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        proj4rs::transform::transform(&self.source, &self.target, &mut point).map_err(|e| {
            EngineError::Projection {
                message: format!("({}, {}): {e:?}", coord.x, coord.y),
            }
        })?;
        Ok(if self.target_degrees {
            Coord {
                x: point.0.to_degrees(),
                y: point.1.to_degrees(),
            }
        } else {
            Coord {
                x: point.0,
                y: point.1,
            }
        })
    }
}

fn compile(spatial_ref: &SpatialRef) -> Result<(Proj, bool), EngineError> {
    let definition = definition(spatial_ref.epsg).ok_or(EngineError::UnknownSpatialReference {
        epsg: spatial_ref.epsg,
    })?;
    let proj = Proj::from_proj_string(definition).map_err(|e| EngineError::Projection {
        message: format!("{spatial_ref}: {e:?}"),
    })?;
    Ok((proj, LinearUnit::of_definition(definition) == LinearUnit::Degree))
}

/// Reprojects every coordinate of `geometry`.
///
/// # Errors
///
/// Returns [`EngineError::UnknownSpatialReference`] when either code is not
/// in the registry and [`EngineError::Projection`] when a coordinate cannot
/// be transformed.
pub fn project_geometry(
    geometry: &Geometry<f64>,
    source: &SpatialRef,
    target: &SpatialRef,
) -> Result<Geometry<f64>, EngineError> {
    if !source.is_known() {
        log::warn!("Source spatial reference unknown; assuming {target}");
        return Ok(geometry.clone());
    }
    if source.epsg == target.epsg {
        return Ok(geometry.clone());
    }

    let transform = Transform::new(source, target)?;
    geometry.try_map_coords(|coord| transform.apply(coord))
}
