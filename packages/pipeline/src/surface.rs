//! Surface building, rasterization and reach clipping for one event.

use geo::MultiPolygon;
use wse_grids_cross_section_models::CrossSection;
use wse_grids_engine::{Breakline, Raster, Tin, geotiff};
use wse_grids_event_models::EventType;

use crate::scoped::{self, TempArtifact};
use crate::workspace::StreamFolder;
use crate::{PipelineError, ProcessingContext};

/// Minimum number of cross-sections a surface needs.
pub const MIN_CROSS_SECTIONS: usize = 2;

/// Breaklines for the cross-sections that carry a real elevation for
/// `event`.
#[must_use]
pub fn breaklines(cross_sections: &[CrossSection], event: EventType) -> Vec<Breakline> {
    cross_sections
        .iter()
        .filter_map(|xs| {
            xs.elevations.get(event).map(|elevation| Breakline {
                line: xs.geometry.clone(),
                elevation,
            })
        })
        .collect()
}

/// A stage output that only lives until the stage after it has run.
pub struct Transient<T> {
    /// The in-memory result.
    pub value: T,
    /// Guard over its on-disk copy.
    pub artifact: TempArtifact,
}

impl<T> Transient<T> {
    /// Releases the on-disk copy, keeping it when intermediates are kept.
    #[must_use]
    pub fn release(self, ctx: &ProcessingContext<'_>) -> T {
        if ctx.keep_intermediate {
            let path = self.artifact.keep();
            log::debug!("Keeping intermediate {}", path.display());
        }
        self.value
    }
}

/// Triangulates the qualifying cross-sections for `event`.
///
/// Returns `None` when fewer than [`MIN_CROSS_SECTIONS`] qualify.
///
/// # Errors
///
/// Returns an error if triangulation or writing the surface fails.
pub fn build_surface(
    folder: &StreamFolder,
    cross_sections: &[CrossSection],
    event: EventType,
    ctx: &ProcessingContext<'_>,
) -> Result<Option<Transient<Tin>>, PipelineError> {
    let breaklines = breaklines(cross_sections, event);
    if breaklines.len() < MIN_CROSS_SECTIONS {
        log::info!("There are no WSE values for {event} on {}", folder.stream());
        return Ok(None);
    }

    let artifact = TempArtifact::new(folder.tin_path(event));
    let tin = ctx.engine.triangulate(&breaklines, &ctx.spatial_ref)?;
    tin.save(artifact.path())?;
    log::debug!(
        "Built {event} surface for {} from {} cross-sections",
        folder.stream(),
        breaklines.len()
    );

    Ok(Some(Transient {
        value: tin,
        artifact,
    }))
}

/// Samples `tin` onto the snapped output grid.
///
/// # Errors
///
/// Returns an error if rasterization or writing the raster fails.
pub fn rasterize_surface(
    folder: &StreamFolder,
    tin: &Tin,
    event: EventType,
    ctx: &ProcessingContext<'_>,
) -> Result<Transient<Raster>, PipelineError> {
    let artifact = TempArtifact::new(folder.temp_raster_path(event));
    let raster = ctx
        .engine
        .rasterize(tin, ctx.cell_size, ctx.snap.as_ref())?;
    geotiff::write_raster(artifact.path(), &raster)?;
    Ok(Transient {
        value: raster,
        artifact,
    })
}

/// Keeps the cells of `raster` inside the reach boundary and writes the
/// result as `<event>_full.tif`.
///
/// # Errors
///
/// Returns an error if masking or writing fails.
pub fn clip_to_reach(
    folder: &StreamFolder,
    raster: &Raster,
    boundary: &MultiPolygon<f64>,
    event: EventType,
    ctx: &ProcessingContext<'_>,
) -> Result<(), PipelineError> {
    let clipped = ctx.engine.mask_extract(raster, boundary, true)?;
    scoped::write_atomically(&folder.full_raster_path(event), |path| {
        geotiff::write_raster(path, &clipped)
    })
}
