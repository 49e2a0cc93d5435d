//! Per-event composites of every stream's final raster.

use std::path::PathBuf;

use wse_grids_engine::{MosaicMethod, geotiff};
use wse_grids_event_models::EventType;

use crate::manifest::Manifest;
use crate::workspace::Workspace;
use crate::{PipelineError, ProcessingContext, scoped};

/// Max-composites every raster the manifest records for `event` into
/// `<root>/<event>.tif`, replacing any previous composite.
///
/// Returns `None` (and leaves any previous composite removed) when the
/// manifest has no raster for the event.
///
/// # Errors
///
/// Returns an error if an input cannot be read or the mosaic fails.
pub fn mosaic_event(
    workspace: &Workspace,
    manifest: &Manifest,
    event: EventType,
    ctx: &ProcessingContext<'_>,
) -> Result<Option<PathBuf>, PipelineError> {
    let target = workspace.composite_path(event);
    if scoped::remove_if_exists(&target)? {
        log::debug!("Removed previous composite {}", target.display());
    }

    let inputs = manifest.rasters(event);
    if inputs.is_empty() {
        log::info!("There are no WSE values for {event}");
        return Ok(None);
    }

    log::info!("Mosaicking {} rasters for {event}", inputs.len());
    let rasters = inputs
        .iter()
        .map(|path| geotiff::read_raster(path))
        .collect::<Result<Vec<_>, _>>()?;
    let composite = ctx.engine.mosaic(&rasters, MosaicMethod::Maximum)?;

    scoped::write_atomically(&target, |path| geotiff::write_raster(path, &composite))?;
    Ok(Some(target))
}
