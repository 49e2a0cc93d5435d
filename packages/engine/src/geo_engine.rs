//! [`SpatialEngine`] implemented with `geo` and `rstar`.

use geo::{Buffer, ConvexHull, CoordsIter, Geometry, MultiPoint, MultiPolygon, Point, Polygon};

use crate::{
    Breakline, CellMask, CellPredicate, EngineError, GridSnap, MosaicMethod, Raster,
    SpatialEngine, SpatialRef, Tin, crs, mask, tin,
};

/// In-process spatial engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoEngine;

impl GeoEngine {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SpatialEngine for GeoEngine {
    fn project(
        &self,
        geometry: &Geometry<f64>,
        source: &SpatialRef,
        target: &SpatialRef,
    ) -> Result<Geometry<f64>, EngineError> {
        crs::project_geometry(geometry, source, target)
    }

    fn convex_hull(&self, geometries: &[Geometry<f64>]) -> Result<Polygon<f64>, EngineError> {
        let points: Vec<Point<f64>> = geometries
            .iter()
            .flat_map(|g| g.coords_iter())
            .map(Point::from)
            .collect();
        if points.is_empty() {
            return Err(EngineError::EmptyInput {
                operation: "convex_hull",
            });
        }
        Ok(MultiPoint::new(points).convex_hull())
    }

    fn dissolve(&self, polygons: &[Polygon<f64>]) -> Result<MultiPolygon<f64>, EngineError> {
        Ok(geo::unary_union(polygons))
    }

    fn buffer(
        &self,
        polygon: &MultiPolygon<f64>,
        distance: f64,
    ) -> Result<MultiPolygon<f64>, EngineError> {
        if !distance.is_finite() {
            return Err(EngineError::Conversion {
                message: format!("invalid buffer distance {distance}"),
            });
        }
        Ok(polygon.buffer(distance))
    }

    fn triangulate(
        &self,
        breaklines: &[Breakline],
        spatial_ref: &SpatialRef,
    ) -> Result<Tin, EngineError> {
        tin::triangulate(breaklines, spatial_ref)
    }

    fn rasterize(
        &self,
        surface: &Tin,
        cell_size: f64,
        snap: Option<&GridSnap>,
    ) -> Result<Raster, EngineError> {
        tin::rasterize(surface, cell_size, snap)
    }

    fn mask_extract(
        &self,
        raster: &Raster,
        mask: &MultiPolygon<f64>,
        keep_inside: bool,
    ) -> Result<Raster, EngineError> {
        mask::extract(raster, mask, keep_inside)
    }

    fn compare_cellwise(
        &self,
        a: &Raster,
        b: &Raster,
        predicate: CellPredicate,
    ) -> Result<CellMask, EngineError> {
        let mut result = CellMask::new(a.width, a.height);
        for row in 0..a.height {
            for col in 0..a.width {
                let Some(left) = a.get(col, row) else {
                    continue;
                };
                let Some(right) = b.value_at(a.cell_center(col, row)) else {
                    continue;
                };
                if predicate.holds(left, right) {
                    result.set(col, row, true);
                }
            }
        }
        Ok(result)
    }

    fn set_null_where(
        &self,
        raster: &Raster,
        condition: &CellMask,
    ) -> Result<Raster, EngineError> {
        if raster.width != condition.width || raster.height != condition.height {
            return Err(EngineError::GridMismatch {
                message: format!(
                    "mask is {}x{} but grid is {}x{}",
                    condition.width, condition.height, raster.width, raster.height
                ),
            });
        }

        let mut result = raster.clone();
        for row in 0..raster.height {
            for col in 0..raster.width {
                if condition.get(col, row) {
                    result.set(col, row, None);
                }
            }
        }
        Ok(result)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    fn mosaic(&self, rasters: &[Raster], method: MosaicMethod) -> Result<Raster, EngineError> {
        let Some(first) = rasters.first() else {
            return Err(EngineError::EmptyInput {
                operation: "mosaic",
            });
        };
        let cell_size = first.cell_size;
        if let Some(other) = rasters
            .iter()
            .find(|r| (r.cell_size - cell_size).abs() > cell_size * 1e-6)
        {
            return Err(EngineError::GridMismatch {
                message: format!(
                    "cannot mosaic cell size {} with {cell_size}",
                    other.cell_size
                ),
            });
        }

        let mut left = f64::INFINITY;
        let mut right = f64::NEG_INFINITY;
        let mut bottom = f64::INFINITY;
        let mut top = f64::NEG_INFINITY;
        for raster in rasters {
            let bounds = raster.bounds();
            left = left.min(bounds.min().x);
            right = right.max(bounds.max().x);
            bottom = bottom.min(bounds.min().y);
            top = top.max(bounds.max().y);
        }

        let width = ((right - left) / cell_size).round().max(1.0) as usize;
        let height = ((top - bottom) / cell_size).round().max(1.0) as usize;
        let mut output = Raster::empty(left, top, cell_size, width, height, first.spatial_ref);

        for raster in rasters {
            let col_offset = ((raster.origin_x - left) / cell_size).round() as usize;
            let row_offset = ((top - raster.origin_y) / cell_size).round() as usize;
            for row in 0..raster.height {
                for col in 0..raster.width {
                    let Some(value) = raster.get(col, row) else {
                        continue;
                    };
                    let (out_col, out_row) = (col + col_offset, row + row_offset);
                    let merged = match (method, output.get(out_col, out_row)) {
                        (MosaicMethod::Maximum, Some(existing)) => existing.max(value),
                        (MosaicMethod::Maximum, None) => value,
                    };
                    output.set(out_col, out_row, Some(merged));
                }
            }
        }

        log::debug!(
            "Mosaicked {} grids into {width}x{height} ({} cells with data)",
            rasters.len(),
            output.data_cell_count()
        );

        Ok(output)
    }
}
