//! Buffered regulatory flood-hazard extents.
//!
//! Both extents are computed once per output folder and shared read-only by
//! every stream. The buffer is half a cell so that cells straddling the
//! hazard boundary survive the extent clip.

use std::cell::OnceCell;
use std::path::Path;

use geo::{Geometry, MultiPolygon};
use geojson::JsonObject;
use wse_grids_engine::vector::{self, FeatureLayer, LayerFeature};
use wse_grids_event_models::{EventType, ExtentClass};

use crate::boundary::polygons_of;
use crate::workspace::Workspace;
use crate::{PipelineError, ProcessingContext, scoped};

/// Flood zone attribute.
pub const ZONE_FIELD: &str = "FLD_ZONE";
/// Zone subtype attribute.
pub const ZONE_SUBTYPE_FIELD: &str = "ZONE_SUBTY";
/// Zones inside the 1% annual chance floodplain.
pub const ONE_PERCENT_ZONES: [&str; 3] = ["AE", "A", "AH"];
/// Subtypes marking the 0.2% annual chance floodplain.
pub const POINT_TWO_PERCENT_SUBTYPES: [&str; 2] = ["0500", "0.2 PCT ANNUAL CHANCE FLOOD HAZARD"];

/// Whether a hazard-area feature belongs to `class`'s extent.
#[must_use]
pub fn matches_extent(feature: &LayerFeature, class: ExtentClass) -> bool {
    let in_one_percent = feature
        .string(ZONE_FIELD)
        .is_some_and(|zone| ONE_PERCENT_ZONES.contains(&zone));
    match class {
        ExtentClass::OnePercent => in_one_percent,
        ExtentClass::PointTwoPercent => {
            in_one_percent
                || feature
                    .string(ZONE_SUBTYPE_FIELD)
                    .is_some_and(|subtype| POINT_TWO_PERCENT_SUBTYPES.contains(&subtype))
        }
    }
}

/// The two buffered extents.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodExtents {
    /// Buffered 1% extent.
    pub one_percent: MultiPolygon<f64>,
    /// Buffered 0.2% extent.
    pub point_two_percent: MultiPolygon<f64>,
}

impl FloodExtents {
    /// Extent for `class`.
    #[must_use]
    pub const fn get(&self, class: ExtentClass) -> &MultiPolygon<f64> {
        match class {
            ExtentClass::OnePercent => &self.one_percent,
            ExtentClass::PointTwoPercent => &self.point_two_percent,
        }
    }

    /// Extent bounding `event`'s grids.
    #[must_use]
    pub const fn for_event(&self, event: EventType) -> &MultiPolygon<f64> {
        self.get(event.extent_class())
    }
}

/// Filters, projects, dissolves and buffers the hazard polygons of `class`.
///
/// # Errors
///
/// Returns an error if projection, dissolve or buffering fails.
pub fn build_extent(
    hazard: &FeatureLayer,
    class: ExtentClass,
    ctx: &ProcessingContext<'_>,
) -> Result<MultiPolygon<f64>, PipelineError> {
    let mut polygons = Vec::new();
    for feature in hazard.features.iter().filter(|f| matches_extent(f, class)) {
        let projected = ctx
            .engine
            .project(&feature.geometry, &hazard.spatial_ref, &ctx.spatial_ref)?;
        polygons.extend(polygons_of(projected));
    }

    if polygons.is_empty() {
        log::warn!("No flood-hazard areas match the {class} extent");
        return Ok(MultiPolygon::new(Vec::new()));
    }

    let dissolved = ctx.engine.dissolve(&polygons)?;
    Ok(ctx.engine.buffer(&dissolved, ctx.cell_size * 0.5)?)
}

/// Loads both extents from the workspace, building and persisting whichever
/// is missing. The hazard layer is read only if something must be built.
///
/// # Errors
///
/// Returns an error if an extent cannot be read, built or written.
pub fn ensure_flood_extents(
    workspace: &Workspace,
    hazard_path: &Path,
    ctx: &ProcessingContext<'_>,
) -> Result<FloodExtents, PipelineError> {
    let hazard: OnceCell<FeatureLayer> = OnceCell::new();
    let one_percent = ensure_extent(workspace, hazard_path, &hazard, ExtentClass::OnePercent, ctx)?;
    let point_two_percent = ensure_extent(
        workspace,
        hazard_path,
        &hazard,
        ExtentClass::PointTwoPercent,
        ctx,
    )?;
    Ok(FloodExtents {
        one_percent,
        point_two_percent,
    })
}

fn ensure_extent(
    workspace: &Workspace,
    hazard_path: &Path,
    hazard: &OnceCell<FeatureLayer>,
    class: ExtentClass,
    ctx: &ProcessingContext<'_>,
) -> Result<MultiPolygon<f64>, PipelineError> {
    let path = workspace.flood_extent_path(class);
    if path.exists() {
        log::info!("{class} flooding clipper already exists");
        let layer = vector::read_layer(&path)?;
        let polygons = layer
            .features
            .into_iter()
            .flat_map(|f| polygons_of(f.geometry))
            .collect();
        return Ok(MultiPolygon::new(polygons));
    }

    log::info!("Creating {class} flooding clipper");
    let layer = match hazard.get() {
        Some(layer) => layer,
        None => {
            let layer = vector::read_layer(hazard_path)?;
            hazard.get_or_init(|| layer)
        }
    };
    let extent = build_extent(layer, class, ctx)?;

    let mut output = FeatureLayer::new(ctx.spatial_ref);
    output.features.push(LayerFeature {
        geometry: Geometry::MultiPolygon(extent.clone()),
        properties: JsonObject::new(),
    });
    scoped::write_atomically(&path, |p| vector::write_layer(p, &output))?;

    Ok(extent)
}
