//! Reach boundary ("clipper") construction.
//!
//! The boundary is the union of the convex hulls of every pair of adjacent
//! stations, so it hugs the stream's bends instead of spanning them.

use geo::{Geometry, MultiPolygon};
use geojson::JsonObject;
use wse_grids_cross_section_models::CrossSection;
use wse_grids_engine::vector::{self, FeatureLayer, LayerFeature};

use crate::workspace::StreamFolder;
use crate::{PipelineError, ProcessingContext, scoped};

/// Distinct stations in ascending order.
#[must_use]
pub fn distinct_stations(cross_sections: &[CrossSection]) -> Vec<f64> {
    let mut stations: Vec<f64> = cross_sections.iter().map(|xs| xs.station).collect();
    stations.sort_by(f64::total_cmp);
    stations.dedup();
    stations
}

/// Builds the reach boundary for `cross_sections`.
///
/// Returns `None` when there are fewer than two distinct stations.
///
/// # Errors
///
/// Returns an error if a hull or the dissolve fails.
#[allow(clippy::float_cmp)]
pub fn build_boundary(
    cross_sections: &[CrossSection],
    ctx: &ProcessingContext<'_>,
) -> Result<Option<MultiPolygon<f64>>, PipelineError> {
    let stations = distinct_stations(cross_sections);
    if stations.len() < 2 {
        return Ok(None);
    }

    let mut hulls = Vec::with_capacity(stations.len() - 1);
    for pair in stations.windows(2) {
        let members: Vec<Geometry<f64>> = cross_sections
            .iter()
            .filter(|xs| xs.station == pair[0] || xs.station == pair[1])
            .map(|xs| Geometry::MultiLineString(xs.geometry.clone()))
            .collect();
        hulls.push(ctx.engine.convex_hull(&members)?);
    }

    Ok(Some(ctx.engine.dissolve(&hulls)?))
}

/// Loads the stream's `clipper` if it exists, otherwise builds and persists
/// it.
///
/// Returns `None` (and writes nothing) when no boundary can be built.
///
/// # Errors
///
/// Returns an error if reading, building or writing the boundary fails.
pub fn ensure_boundary(
    folder: &StreamFolder,
    cross_sections: &[CrossSection],
    ctx: &ProcessingContext<'_>,
) -> Result<Option<MultiPolygon<f64>>, PipelineError> {
    let path = folder.clipper_path();
    if path.exists() {
        log::info!("Clipper for {} already exists", folder.stream());
        let layer = vector::read_layer(&path)?;
        let polygons: Vec<_> = layer
            .features
            .into_iter()
            .flat_map(|f| polygons_of(f.geometry))
            .collect();
        return Ok((!polygons.is_empty()).then(|| MultiPolygon::new(polygons)));
    }

    let Some(boundary) = build_boundary(cross_sections, ctx)? else {
        log::info!(
            "No boundary available for {}: fewer than two distinct stations",
            folder.stream()
        );
        return Ok(None);
    };

    let mut layer = FeatureLayer::new(ctx.spatial_ref);
    layer.features.push(LayerFeature {
        geometry: Geometry::MultiPolygon(boundary.clone()),
        properties: JsonObject::new(),
    });
    scoped::write_atomically(&path, |p| vector::write_layer(p, &layer))?;

    Ok(Some(boundary))
}

/// Polygons making up a polygonal geometry; other geometry kinds yield none.
pub(crate) fn polygons_of(geometry: Geometry<f64>) -> Vec<geo::Polygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => vec![p],
        Geometry::MultiPolygon(mp) => mp.0,
        Geometry::Rect(r) => vec![r.to_polygon()],
        Geometry::GeometryCollection(gc) => gc.0.into_iter().flat_map(polygons_of).collect(),
        other => {
            log::warn!("Ignoring non-polygon geometry {other:?}");
            Vec::new()
        }
    }
}
