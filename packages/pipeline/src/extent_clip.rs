//! Clipping a reach raster to its event's regulatory flood extent.

use wse_grids_engine::geotiff;
use wse_grids_event_models::EventType;

use crate::flood_extent::FloodExtents;
use crate::workspace::StreamFolder;
use crate::{PipelineError, ProcessingContext, scoped};

/// Extracts `<event>_full.tif` by the event's flood extent into
/// `<event>.tif`. The `_full` raster is left for the caller to remove once
/// the checkpoint is recorded.
///
/// Returns `false` when the `_full` raster is missing.
///
/// # Errors
///
/// Returns an error if reading, masking or writing fails.
pub fn clip_to_flood_extent(
    folder: &StreamFolder,
    event: EventType,
    extents: &FloodExtents,
    ctx: &ProcessingContext<'_>,
) -> Result<bool, PipelineError> {
    let full_path = folder.full_raster_path(event);
    if !full_path.exists() {
        log::info!("There are no WSE values for {event} on {}", folder.stream());
        return Ok(false);
    }

    let full = geotiff::read_raster(&full_path)?;
    let clipped = ctx
        .engine
        .mask_extract(&full, extents.for_event(event), true)?;
    log::debug!(
        "Clipped {event} on {} to the {} extent: {} of {} cells kept",
        folder.stream(),
        event.extent_class(),
        clipped.data_cell_count(),
        full.data_cell_count()
    );

    scoped::write_atomically(&folder.final_raster_path(event), |path| {
        geotiff::write_raster(path, &clipped)
    })?;
    Ok(true)
}
