#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry and raster engine for WSE grid synthesis.
//!
//! The pipeline never touches spatial primitives directly: it talks to the
//! [`SpatialEngine`] trait. [`GeoEngine`] implements that trait on top of
//! `geo` (hulls, unions, buffers), `spade` (constrained triangulation),
//! `proj4rs` (reprojection) and `rstar` (mask lookups, vertex elevation
//! lookups), with GeoTIFF grids read and written through [`geotiff`] and
//! vector layers through [`vector`].

pub mod crs;
pub mod geo_engine;
pub mod geotiff;
pub mod mask;
pub mod raster;
pub mod tin;
pub mod vector;

use geo::{Geometry, MultiPolygon, Polygon};
use thiserror::Error;

pub use crs::{LinearUnit, SpatialRef};
pub use geo_engine::GeoEngine;
pub use raster::{CellMask, GridSnap, Raster};
pub use tin::{Breakline, Tin};

/// Errors raised by engine operations and spatial file I/O.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Reading or writing a file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// GeoTIFF encoding or decoding failed.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// `GeoJSON` parsing or conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The triangulation could not be built.
    #[error("Triangulation failed: {message}")]
    Triangulation {
        /// Description of what went wrong.
        message: String,
    },

    /// The EPSG code has no definition in the registry.
    #[error("Unknown spatial reference EPSG:{epsg}")]
    UnknownSpatialReference {
        /// The unresolved EPSG code.
        epsg: u32,
    },

    /// A definition could not be compiled or a coordinate could not be
    /// transformed.
    #[error("Projection failed: {message}")]
    Projection {
        /// Description of what went wrong.
        message: String,
    },

    /// Two grids that must line up do not.
    #[error("Grid mismatch: {message}")]
    GridMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// An operation received nothing to work on.
    #[error("{operation} requires at least one input")]
    EmptyInput {
        /// The operation that was called.
        operation: &'static str,
    },

    /// Data could not be converted into the expected shape.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Cell-by-cell comparison applied by [`SpatialEngine::compare_cellwise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellPredicate {
    /// `a < b`
    LessThan,
    /// `a > b`
    GreaterThan,
}

impl CellPredicate {
    /// Evaluates the predicate on two cell values.
    #[must_use]
    pub fn holds(self, a: f32, b: f32) -> bool {
        match self {
            Self::LessThan => a < b,
            Self::GreaterThan => a > b,
        }
    }
}

/// How overlapping cells are resolved when mosaicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosaicMethod {
    /// The highest value wins.
    Maximum,
}

/// Spatial-analysis primitives the pipeline depends on.
///
/// All calls are synchronous and either complete or fail with an
/// [`EngineError`].
pub trait SpatialEngine {
    /// Reprojects `geometry` from `source` into `target`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownSpatialReference`] for an unregistered
    /// code and [`EngineError::Projection`] if a coordinate cannot be
    /// transformed.
    fn project(
        &self,
        geometry: &Geometry<f64>,
        source: &SpatialRef,
        target: &SpatialRef,
    ) -> Result<Geometry<f64>, EngineError>;

    /// Convex hull of all coordinates of `geometries`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptyInput`] if there are no coordinates.
    fn convex_hull(&self, geometries: &[Geometry<f64>]) -> Result<Polygon<f64>, EngineError>;

    /// Unions `polygons` into one (multi)polygon.
    ///
    /// # Errors
    ///
    /// Returns an error if the union cannot be computed.
    fn dissolve(&self, polygons: &[Polygon<f64>]) -> Result<MultiPolygon<f64>, EngineError>;

    /// Buffers `polygon` outward by `distance` (linear units of its spatial
    /// reference), dissolving overlaps.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be computed.
    fn buffer(
        &self,
        polygon: &MultiPolygon<f64>,
        distance: f64,
    ) -> Result<MultiPolygon<f64>, EngineError>;

    /// Builds a constrained triangulation with every breakline enforced as a
    /// hard edge.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Triangulation`] if no surface can be built.
    fn triangulate(&self, breaklines: &[Breakline], spatial_ref: &SpatialRef)
    -> Result<Tin, EngineError>;

    /// Samples `surface` onto a regular grid of `cell_size` cells, aligned to
    /// `snap` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is empty.
    fn rasterize(
        &self,
        surface: &Tin,
        cell_size: f64,
        snap: Option<&GridSnap>,
    ) -> Result<Raster, EngineError>;

    /// Keeps cells whose centres fall inside (`keep_inside = true`) or
    /// outside `mask`; all others become no-data.
    ///
    /// # Errors
    ///
    /// Returns an error if the mask cannot be applied.
    fn mask_extract(
        &self,
        raster: &Raster,
        mask: &MultiPolygon<f64>,
        keep_inside: bool,
    ) -> Result<Raster, EngineError>;

    /// Evaluates `predicate(a, b)` for every cell of `a`, sampling `b` at
    /// the cell centre. Cells where either side is no-data are `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rasters cannot be compared.
    fn compare_cellwise(
        &self,
        a: &Raster,
        b: &Raster,
        predicate: CellPredicate,
    ) -> Result<CellMask, EngineError>;

    /// Sets every cell flagged in `condition` to no-data.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GridMismatch`] if the shapes differ.
    fn set_null_where(&self, raster: &Raster, condition: &CellMask)
    -> Result<Raster, EngineError>;

    /// Merges `rasters` into one grid covering their combined extent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptyInput`] for no inputs and
    /// [`EngineError::GridMismatch`] for differing cell sizes.
    fn mosaic(&self, rasters: &[Raster], method: MosaicMethod) -> Result<Raster, EngineError>;
}
