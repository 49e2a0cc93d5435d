//! Terrain-floor enforcement.
//!
//! A water surface below the ground is not a water surface: every WSE cell
//! lower than the terrain sampled at its centre becomes no-data.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use wse_grids_engine::{CellPredicate, GridSnap, Raster, SpatialRef, geotiff};
use wse_grids_event_models::EventType;

use crate::workspace::StreamFolder;
use crate::{PipelineError, ProcessingContext, scoped};

/// The terrain model, loaded on first use.
#[derive(Debug)]
pub struct Terrain {
    path: PathBuf,
    raster: OnceCell<Raster>,
}

impl Terrain {
    /// Terrain model at `path`. Nothing is read yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            raster: OnceCell::new(),
        }
    }

    /// Path of the terrain model.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Grid alignment of the terrain model, read from its header only.
    ///
    /// Warns when the terrain's spatial reference differs from `working`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be read.
    pub fn snap(&self, working: &SpatialRef) -> Result<GridSnap, PipelineError> {
        let header = geotiff::read_header(&self.path)?;
        if header.spatial_ref.is_known() && header.spatial_ref.epsg != working.epsg {
            log::warn!(
                "Terrain {} is in {} but outputs are in {working}; cells are compared as-is",
                self.path.display(),
                header.spatial_ref
            );
        }
        Ok(GridSnap {
            origin_x: header.origin_x,
            origin_y: header.origin_y,
        })
    }

    /// The terrain cells, read on the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the raster cannot be read.
    pub fn raster(&self) -> Result<&Raster, PipelineError> {
        if let Some(raster) = self.raster.get() {
            return Ok(raster);
        }
        log::info!("Loading terrain from {}", self.path.display());
        let raster = geotiff::read_raster(&self.path)?;
        Ok(self.raster.get_or_init(|| raster))
    }
}

/// Nulls every cell of `<event>.tif` lying below the terrain and replaces
/// the file atomically. Returns the number of cells nulled.
///
/// # Errors
///
/// Returns an error if reading, comparing or writing fails.
pub fn enforce_floor(
    folder: &StreamFolder,
    event: EventType,
    terrain: &Terrain,
    ctx: &ProcessingContext<'_>,
) -> Result<usize, PipelineError> {
    let path = folder.final_raster_path(event);
    let wse = geotiff::read_raster(&path)?;
    let below = ctx
        .engine
        .compare_cellwise(&wse, terrain.raster()?, CellPredicate::LessThan)?;
    let floored = ctx.engine.set_null_where(&wse, &below)?;

    let temp = scoped::TempArtifact::new(folder.temp_raster_path(event));
    geotiff::write_raster(temp.path(), &floored)?;
    temp.persist_to(&path)?;

    log::debug!(
        "Removed {} {event} cells below terrain on {}",
        below.count(),
        folder.stream()
    );
    Ok(below.count())
}
