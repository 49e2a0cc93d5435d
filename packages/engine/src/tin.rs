//! Triangulated irregular networks built from elevation breaklines.
//!
//! Breaklines are enforced as hard edges of a constrained Delaunay
//! triangulation. Every triangle vertex takes the elevation of the nearest
//! breakline vertex. A segment that would cross an earlier breakline is
//! left unconstrained.

use std::fs;
use std::path::Path;

use geo::{CoordsIter, MultiLineString};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};
use spade::handles::FixedVertexHandle;
use spade::{ConstrainedDelaunayTriangulation, Point2, Triangulation as _};

use crate::{EngineError, GridSnap, Raster, SpatialRef};

/// A line whose every vertex carries the same elevation.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakline {
    /// Line geometry.
    pub line: MultiLineString<f64>,
    /// Elevation applied to every vertex.
    pub elevation: f64,
}

/// A triangulated surface: a list of 3D triangles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tin {
    /// Spatial reference of the vertex coordinates.
    pub spatial_ref: SpatialRef,
    /// Triangles as `[x, y, z]` vertex triples.
    pub triangles: Vec<[[f64; 3]; 3]>,
}

impl Tin {
    /// Persists the surface as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json).map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Planimetric bounding box as `(min_x, min_y, max_x, max_y)`.
    #[must_use]
    pub fn extent(&self) -> Option<(f64, f64, f64, f64)> {
        self.triangles.iter().flatten().fold(None, |acc, v| {
            Some(match acc {
                None => (v[0], v[1], v[0], v[1]),
                Some((x0, y0, x1, y1)) => (x0.min(v[0]), y0.min(v[1]), x1.max(v[0]), y1.max(v[1])),
            })
        })
    }
}

/// Builds a constrained triangulation over `breaklines`.
///
/// # Errors
///
/// Returns [`EngineError::Triangulation`] if a vertex cannot be inserted or
/// the breaklines are degenerate (for example all collinear).
pub fn triangulate(breaklines: &[Breakline], spatial_ref: &SpatialRef) -> Result<Tin, EngineError> {
    let vertices: Vec<GeomWithData<[f64; 2], f64>> = breaklines
        .iter()
        .flat_map(|b| {
            b.line
                .coords_iter()
                .map(move |c| GeomWithData::new([c.x, c.y], b.elevation))
        })
        .collect();
    if vertices.is_empty() {
        return Err(EngineError::EmptyInput {
            operation: "triangulate",
        });
    }

    let mut cdt = ConstrainedDelaunayTriangulation::<Point2<f64>>::default();
    let mut skipped = 0_usize;
    for line in breaklines.iter().flat_map(|b| b.line.iter()) {
        let mut previous: Option<FixedVertexHandle> = None;
        for coord in line.coords() {
            let handle = cdt
                .insert(Point2::new(coord.x, coord.y))
                .map_err(|e| EngineError::Triangulation {
                    message: format!("({}, {}): {e:?}", coord.x, coord.y),
                })?;
            if let Some(from) = previous
                && from != handle
            {
                if cdt.can_add_constraint(from, handle) {
                    cdt.add_constraint(from, handle);
                } else {
                    skipped += 1;
                }
            }
            previous = Some(handle);
        }
    }
    if skipped > 0 {
        log::warn!("{skipped} breakline segments cross another breakline; left unconstrained");
    }

    let elevation_index = RTree::bulk_load(vertices);
    let triangles: Vec<[[f64; 3]; 3]> = cdt
        .inner_faces()
        .map(|face| {
            face.vertices().map(|vertex| {
                let p = vertex.position();
                let z = elevation_index
                    .nearest_neighbor(&[p.x, p.y])
                    .map_or(f64::NAN, |v| v.data);
                [p.x, p.y, z]
            })
        })
        .collect();

    if triangles.is_empty() {
        return Err(EngineError::Triangulation {
            message: "breaklines produced no triangles (degenerate input)".to_string(),
        });
    }

    log::debug!(
        "Triangulated {} breaklines into {} triangles ({} constraint edges)",
        breaklines.len(),
        triangles.len(),
        cdt.num_constraints()
    );

    Ok(Tin {
        spatial_ref: *spatial_ref,
        triangles,
    })
}

/// Samples `tin` at cell centres onto a grid of `cell_size` cells.
///
/// Values are linearly interpolated within each triangle; cells outside
/// every triangle are no-data.
///
/// # Errors
///
/// Returns [`EngineError::EmptyInput`] for an empty surface and
/// [`EngineError::Conversion`] for a non-positive cell size.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn rasterize(tin: &Tin, cell_size: f64, snap: Option<&GridSnap>) -> Result<Raster, EngineError> {
    if cell_size <= 0.0 || !cell_size.is_finite() {
        return Err(EngineError::Conversion {
            message: format!("invalid cell size {cell_size}"),
        });
    }
    let (min_x, min_y, max_x, max_y) = tin.extent().ok_or(EngineError::EmptyInput {
        operation: "rasterize",
    })?;

    let (origin_x, origin_y) = snap.map_or((min_x, max_y), |s| {
        (s.floor_x(min_x, cell_size), s.ceil_y(max_y, cell_size))
    });
    let width = (((max_x - origin_x) / cell_size).ceil() as usize).max(1);
    let height = (((origin_y - min_y) / cell_size).ceil() as usize).max(1);

    let mut raster = Raster::empty(origin_x, origin_y, cell_size, width, height, tin.spatial_ref);

    for [a, b, c] in &tin.triangles {
        let denom = (b[1] - c[1]).mul_add(a[0] - c[0], (c[0] - b[0]) * (a[1] - c[1]));
        if denom.abs() < f64::EPSILON {
            continue;
        }

        let tx0 = a[0].min(b[0]).min(c[0]);
        let tx1 = a[0].max(b[0]).max(c[0]);
        let ty0 = a[1].min(b[1]).min(c[1]);
        let ty1 = a[1].max(b[1]).max(c[1]);

        let col0 = ((tx0 - origin_x) / cell_size - 0.5).floor().max(0.0) as usize;
        let col1 = (((tx1 - origin_x) / cell_size - 0.5).ceil().max(0.0) as usize).min(width - 1);
        let row0 = ((origin_y - ty1) / cell_size - 0.5).floor().max(0.0) as usize;
        let row1 = (((origin_y - ty0) / cell_size - 0.5).ceil().max(0.0) as usize).min(height - 1);

        for row in row0..=row1 {
            for col in col0..=col1 {
                let p = raster.cell_center(col, row);
                let l1 = (b[1] - c[1]).mul_add(p.x - c[0], (c[0] - b[0]) * (p.y - c[1])) / denom;
                let l2 = (c[1] - a[1]).mul_add(p.x - c[0], (a[0] - c[0]) * (p.y - c[1])) / denom;
                let l3 = 1.0 - l1 - l2;
                let tolerance = -1e-9;
                if l1 < tolerance || l2 < tolerance || l3 < tolerance {
                    continue;
                }
                let z = l3.mul_add(c[2], l1.mul_add(a[2], l2 * b[2]));
                if z.is_finite() {
                    raster.set(col, row, Some(z as f32));
                }
            }
        }
    }

    log::debug!(
        "Rasterized {} triangles onto a {width}x{height} grid ({} cells with data)",
        tin.triangles.len(),
        raster.data_cell_count()
    );

    Ok(raster)
}

#[cfg(test)]
mod tests {
    use geo::line_string;

    use super::*;

    fn breakline(x: f64, elevation: f64) -> Breakline {
        Breakline {
            line: MultiLineString::new(vec![line_string![(x: x, y: 0.0), (x: x, y: 100.0)]]),
            elevation,
        }
    }

    #[test]
    fn two_parallel_breaklines_interpolate_linearly() {
        let tin = triangulate(
            &[breakline(100.0, 101.2), breakline(300.0, 103.5)],
            &SpatialRef::UNKNOWN,
        )
        .unwrap();
        assert_eq!(tin.triangles.len(), 2);
        for vertex in tin.triangles.iter().flatten() {
            let expected = if vertex[0] < 200.0 { 101.2 } else { 103.5 };
            assert!((vertex[2] - expected).abs() < 1e-9);
        }

        let raster = rasterize(&tin, 10.0, None).unwrap();
        assert_eq!((raster.width, raster.height), (20, 10));
        // Centre of the middle column pair sits at x = 195 / 205.
        let left = raster.get(9, 5).unwrap();
        let right = raster.get(10, 5).unwrap();
        let expected_left = 101.2 + (103.5 - 101.2) * (95.0 / 200.0);
        let expected_right = 101.2 + (103.5 - 101.2) * (105.0 / 200.0);
        assert!((f64::from(left) - expected_left).abs() < 1e-4);
        assert!((f64::from(right) - expected_right).abs() < 1e-4);
        assert_eq!(raster.data_cell_count(), 200);
    }

    #[test]
    fn snapping_moves_the_origin() {
        let tin = triangulate(
            &[breakline(100.0, 1.0), breakline(300.0, 2.0)],
            &SpatialRef::UNKNOWN,
        )
        .unwrap();
        let snap = GridSnap {
            origin_x: 3.0,
            origin_y: 3.0,
        };
        let raster = rasterize(&tin, 10.0, Some(&snap)).unwrap();
        assert!((raster.origin_x - 93.0).abs() < 1e-9);
        assert!((raster.origin_y - 103.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            triangulate(&[], &SpatialRef::UNKNOWN),
            Err(EngineError::EmptyInput { .. })
        ));
        let tin = Tin {
            spatial_ref: SpatialRef::UNKNOWN,
            triangles: Vec::new(),
        };
        assert!(matches!(
            rasterize(&tin, 10.0, None),
            Err(EngineError::EmptyInput { .. })
        ));
    }

    #[test]
    fn save_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01pct.tin");
        let tin = Tin {
            spatial_ref: SpatialRef::UNKNOWN,
            triangles: vec![[[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 2.0]]],
        };
        tin.save(&path).unwrap();
        let written: Tin = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, tin);
    }

    #[test]
    fn crossing_breaklines_still_triangulate() {
        let crossing = Breakline {
            line: MultiLineString::new(vec![line_string![(x: 50.0, y: -10.0), (x: 350.0, y: 110.0)]]),
            elevation: 102.0,
        };
        let tin = triangulate(
            &[breakline(100.0, 101.2), breakline(300.0, 103.5), crossing],
            &SpatialRef::UNKNOWN,
        )
        .unwrap();
        assert!(!tin.triangles.is_empty());
        assert!(tin.triangles.iter().flatten().all(|v| v[2].is_finite()));
    }
}
