//! Polygon masks applied to rasters.
//!
//! Mask polygons go into an R-tree keyed by their bounding box so each cell
//! centre is tested only against the polygons whose envelope contains it.

use geo::{BoundingRect, Coord, Intersects, MultiPolygon, Point, Polygon, Rect};
use rstar::{AABB, RTree, RTreeObject};

use crate::{EngineError, Raster};

/// A mask polygon stored in the R-tree.
struct MaskEntry {
    envelope: AABB<[f64; 2]>,
    polygon: Polygon<f64>,
}

impl RTreeObject for MaskEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Point-in-polygon lookups against a fixed set of mask polygons.
pub struct MaskIndex {
    tree: RTree<MaskEntry>,
    bounds: Option<Rect<f64>>,
}

impl MaskIndex {
    /// Indexes every polygon of `mask`.
    #[must_use]
    pub fn new(mask: &MultiPolygon<f64>) -> Self {
        let entries: Vec<MaskEntry> = mask
            .0
            .iter()
            .filter_map(|polygon| {
                let rect = polygon.bounding_rect()?;
                Some(MaskEntry {
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                    polygon: polygon.clone(),
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
            bounds: mask.bounding_rect(),
        }
    }

    /// Whether `coord` lies inside or on the boundary of any mask polygon.
    #[must_use]
    pub fn contains(&self, coord: Coord<f64>) -> bool {
        let point = Point::from(coord);
        let query_env = AABB::from_point([coord.x, coord.y]);
        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .any(|entry| entry.polygon.intersects(&point))
    }

    /// Bounding box of the whole mask, `None` when the mask is empty.
    #[must_use]
    pub const fn bounds(&self) -> Option<Rect<f64>> {
        self.bounds
    }
}

/// Keeps the cells of `raster` whose centres are inside (or, with
/// `keep_inside = false`, outside) `mask`.
///
/// When keeping the inside, the result is cropped to the cells overlapping
/// the mask's bounding box. A mask that misses the raster entirely yields an
/// all-no-data grid on the original extent.
///
/// # Errors
///
/// Currently infallible; the `Result` mirrors the other engine operations.
#[allow(clippy::unnecessary_wraps)]
pub fn extract(
    raster: &Raster,
    mask: &MultiPolygon<f64>,
    keep_inside: bool,
) -> Result<Raster, EngineError> {
    let index = MaskIndex::new(mask);

    let cropped = if keep_inside {
        match index.bounds().and_then(|b| overlap_window(raster, b)) {
            Some((col, row, width, height)) => raster.window(col, row, width, height),
            None => {
                log::debug!("Mask does not overlap the grid; every cell becomes no-data");
                return Ok(raster.blank_like());
            }
        }
    } else {
        raster.clone()
    };

    let mut result = cropped.clone();
    for row in 0..cropped.height {
        for col in 0..cropped.width {
            if cropped.get(col, row).is_none() {
                continue;
            }
            if index.contains(cropped.cell_center(col, row)) != keep_inside {
                result.set(col, row, None);
            }
        }
    }

    Ok(result)
}

/// Cell window of `raster` overlapping `bounds`, as `(col, row, width, height)`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn overlap_window(raster: &Raster, bounds: Rect<f64>) -> Option<(usize, usize, usize, usize)> {
    let grid = raster.bounds();
    let min_x = bounds.min().x.max(grid.min().x);
    let max_x = bounds.max().x.min(grid.max().x);
    let min_y = bounds.min().y.max(grid.min().y);
    let max_y = bounds.max().y.min(grid.max().y);
    if min_x >= max_x || min_y >= max_y {
        return None;
    }

    let col0 = ((min_x - raster.origin_x) / raster.cell_size).floor().max(0.0) as usize;
    let col1 = ((max_x - raster.origin_x) / raster.cell_size).ceil() as usize;
    let row0 = ((raster.origin_y - max_y) / raster.cell_size).floor().max(0.0) as usize;
    let row1 = ((raster.origin_y - min_y) / raster.cell_size).ceil() as usize;

    Some((
        col0,
        row0,
        col1.min(raster.width) - col0,
        row1.min(raster.height) - row0,
    ))
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;
    use crate::SpatialRef;

    fn grid() -> Raster {
        // 10 x 10 cells of 10 units covering [0, 100] x [0, 100].
        Raster::from_values(0.0, 100.0, 10.0, 10, 10, SpatialRef::UNKNOWN, vec![5.0; 100]).unwrap()
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]])
    }

    #[test]
    fn keeps_inside_and_crops() {
        let clipped = extract(&grid(), &square(20.0, 20.0, 60.0, 50.0), true).unwrap();
        assert_eq!((clipped.width, clipped.height), (4, 3));
        assert!((clipped.origin_x - 20.0).abs() < 1e-9);
        assert!((clipped.origin_y - 50.0).abs() < 1e-9);
        assert_eq!(clipped.data_cell_count(), 12);
    }

    #[test]
    fn keep_outside_preserves_extent() {
        let clipped = extract(&grid(), &square(20.0, 20.0, 60.0, 50.0), false).unwrap();
        assert_eq!((clipped.width, clipped.height), (10, 10));
        assert_eq!(clipped.data_cell_count(), 88);
        assert_eq!(clipped.get(3, 6), None);
        assert_eq!(clipped.get(0, 0), Some(5.0));
    }

    #[test]
    fn disjoint_mask_yields_empty_grid() {
        let clipped = extract(&grid(), &square(500.0, 500.0, 600.0, 600.0), true).unwrap();
        assert_eq!((clipped.width, clipped.height), (10, 10));
        assert_eq!(clipped.data_cell_count(), 0);
    }

    #[test]
    fn overlapping_envelopes_use_the_exact_polygon() {
        // An L-shaped polygon whose bounding box covers the notch at (15, 15).
        let mask = MultiPolygon::new(vec![
            polygon![
                (x: 0.0, y: 0.0),
                (x: 20.0, y: 0.0),
                (x: 20.0, y: 10.0),
                (x: 10.0, y: 10.0),
                (x: 10.0, y: 20.0),
                (x: 0.0, y: 20.0),
                (x: 0.0, y: 0.0),
            ],
            polygon![
                (x: 100.0, y: 100.0),
                (x: 110.0, y: 100.0),
                (x: 110.0, y: 110.0),
                (x: 100.0, y: 110.0),
                (x: 100.0, y: 100.0),
            ],
        ]);
        let index = MaskIndex::new(&mask);
        assert!(index.contains(Coord { x: 5.0, y: 15.0 }));
        assert!(index.contains(Coord { x: 15.0, y: 5.0 }));
        assert!(!index.contains(Coord { x: 15.0, y: 15.0 }));
        assert!(index.contains(Coord { x: 105.0, y: 105.0 }));
        assert!(!index.contains(Coord { x: 50.0, y: 50.0 }));
    }

    #[test]
    fn boundary_counts_as_inside() {
        let index = MaskIndex::new(&square(0.0, 0.0, 10.0, 10.0));
        assert!(index.contains(Coord { x: 10.0, y: 5.0 }));
        assert!(!index.contains(Coord { x: 10.5, y: 5.0 }));
    }
}
