//! In-memory single-band float grids.
//!
//! Rows run north to south from `origin_y` (the top edge); columns run west
//! to east from `origin_x` (the left edge). No-data cells are stored as
//! `NaN` and never collide with the vector sentinels.

use geo::{Coord, Rect};

use crate::{EngineError, SpatialRef};

/// Grid alignment target: every grid built against it has edges at
/// `origin + k * cell_size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSnap {
    /// Any grid line's x coordinate.
    pub origin_x: f64,
    /// Any grid line's y coordinate.
    pub origin_y: f64,
}

impl GridSnap {
    /// Snaps `value` down onto the x grid lines.
    #[must_use]
    pub fn floor_x(&self, value: f64, cell_size: f64) -> f64 {
        self.origin_x + ((value - self.origin_x) / cell_size).floor() * cell_size
    }

    /// Snaps `value` up onto the y grid lines.
    #[must_use]
    pub fn ceil_y(&self, value: f64, cell_size: f64) -> f64 {
        self.origin_y + ((value - self.origin_y) / cell_size).ceil() * cell_size
    }
}

/// A north-up single-band raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    /// x of the left edge.
    pub origin_x: f64,
    /// y of the top edge.
    pub origin_y: f64,
    /// Square cell size in spatial-reference units.
    pub cell_size: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Spatial reference of the grid.
    pub spatial_ref: SpatialRef,
    data: Vec<f32>,
}

impl Raster {
    /// Creates an all-no-data raster.
    #[must_use]
    pub fn empty(
        origin_x: f64,
        origin_y: f64,
        cell_size: f64,
        width: usize,
        height: usize,
        spatial_ref: SpatialRef,
    ) -> Self {
        Self {
            origin_x,
            origin_y,
            cell_size,
            width,
            height,
            spatial_ref,
            data: vec![f32::NAN; width * height],
        }
    }

    /// Creates a raster from row-major cell values (`NaN` = no-data).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GridMismatch`] if `data` does not hold
    /// `width * height` values.
    pub fn from_values(
        origin_x: f64,
        origin_y: f64,
        cell_size: f64,
        width: usize,
        height: usize,
        spatial_ref: SpatialRef,
        data: Vec<f32>,
    ) -> Result<Self, EngineError> {
        if data.len() != width * height {
            return Err(EngineError::GridMismatch {
                message: format!(
                    "expected {} cells for a {width}x{height} grid, got {}",
                    width * height,
                    data.len()
                ),
            });
        }
        Ok(Self {
            origin_x,
            origin_y,
            cell_size,
            width,
            height,
            spatial_ref,
            data,
        })
    }

    /// A new all-no-data raster on the same grid as `self`.
    #[must_use]
    pub fn blank_like(&self) -> Self {
        Self::empty(
            self.origin_x,
            self.origin_y,
            self.cell_size,
            self.width,
            self.height,
            self.spatial_ref,
        )
    }

    /// Row-major cell values.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Value at `(col, row)`, `None` for no-data or out of range.
    #[must_use]
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let value = self.data[row * self.width + col];
        (!value.is_nan()).then_some(value)
    }

    /// Sets `(col, row)`; `None` writes no-data. Out-of-range writes are
    /// ignored.
    pub fn set(&mut self, col: usize, row: usize, value: Option<f32>) {
        if col < self.width && row < self.height {
            self.data[row * self.width + col] = value.unwrap_or(f32::NAN);
        }
    }

    /// Centre of cell `(col, row)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_center(&self, col: usize, row: usize) -> Coord<f64> {
        Coord {
            x: (col as f64 + 0.5).mul_add(self.cell_size, self.origin_x),
            y: (row as f64 + 0.5).mul_add(-self.cell_size, self.origin_y),
        }
    }

    /// The `(col, row)` containing `point`, if it lies on the grid.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn cell_at(&self, point: Coord<f64>) -> Option<(usize, usize)> {
        let col = ((point.x - self.origin_x) / self.cell_size).floor();
        let row = ((self.origin_y - point.y) / self.cell_size).floor();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        Some((col as usize, row as usize))
    }

    /// Value of the cell containing `point`.
    #[must_use]
    pub fn value_at(&self, point: Coord<f64>) -> Option<f32> {
        self.cell_at(point).and_then(|(col, row)| self.get(col, row))
    }

    /// Ground extent of the grid.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.origin_x,
                y: (self.height as f64).mul_add(-self.cell_size, self.origin_y),
            },
            Coord {
                x: (self.width as f64).mul_add(self.cell_size, self.origin_x),
                y: self.origin_y,
            },
        )
    }

    /// Number of cells holding data.
    #[must_use]
    pub fn data_cell_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Copies the window starting at `(col, row)` of `width` x `height`
    /// cells into a new raster.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn window(&self, col: usize, row: usize, width: usize, height: usize) -> Self {
        let col = col.min(self.width);
        let row = row.min(self.height);
        let width = width.min(self.width - col);
        let height = height.min(self.height - row);

        let mut data = Vec::with_capacity(width * height);
        for r in row..row + height {
            let start = r * self.width + col;
            data.extend_from_slice(&self.data[start..start + width]);
        }

        Self {
            origin_x: (col as f64).mul_add(self.cell_size, self.origin_x),
            origin_y: (row as f64).mul_add(-self.cell_size, self.origin_y),
            cell_size: self.cell_size,
            width,
            height,
            spatial_ref: self.spatial_ref,
            data,
        }
    }
}

/// A boolean grid matching some raster's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellMask {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    cells: Vec<bool>,
}

impl CellMask {
    /// An all-`false` mask.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width * height],
        }
    }

    /// Flag at `(col, row)`; out of range is `false`.
    #[must_use]
    pub fn get(&self, col: usize, row: usize) -> bool {
        col < self.width && row < self.height && self.cells[row * self.width + col]
    }

    /// Sets the flag at `(col, row)`.
    pub fn set(&mut self, col: usize, row: usize, value: bool) {
        if col < self.width && row < self.height {
            self.cells[row * self.width + col] = value;
        }
    }

    /// Number of `true` cells.
    #[must_use]
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Raster {
        Raster::from_values(
            100.0,
            50.0,
            10.0,
            3,
            2,
            SpatialRef::UNKNOWN,
            vec![1.0, 2.0, f32::NAN, 4.0, 5.0, 6.0],
        )
        .unwrap()
    }

    #[test]
    fn rejects_wrong_cell_count() {
        let result = Raster::from_values(0.0, 0.0, 1.0, 2, 2, SpatialRef::UNKNOWN, vec![0.0; 3]);
        assert!(matches!(result, Err(EngineError::GridMismatch { .. })));
    }

    #[test]
    fn cell_geometry() {
        let raster = sample();
        assert_eq!(raster.cell_center(0, 0), Coord { x: 105.0, y: 45.0 });
        assert_eq!(raster.cell_at(Coord { x: 125.0, y: 35.0 }), Some((2, 1)));
        assert_eq!(raster.cell_at(Coord { x: 99.0, y: 35.0 }), None);
        assert_eq!(raster.cell_at(Coord { x: 105.0, y: 29.0 }), None);
        let bounds = raster.bounds();
        assert_eq!(bounds.min(), Coord { x: 100.0, y: 30.0 });
        assert_eq!(bounds.max(), Coord { x: 130.0, y: 50.0 });
    }

    #[test]
    fn no_data_reads_as_none() {
        let raster = sample();
        assert_eq!(raster.get(2, 0), None);
        assert_eq!(raster.get(1, 1), Some(5.0));
        assert_eq!(raster.value_at(Coord { x: 115.0, y: 45.0 }), Some(2.0));
        assert_eq!(raster.data_cell_count(), 5);
    }

    #[test]
    fn window_keeps_georeference() {
        let raster = sample();
        let window = raster.window(1, 1, 5, 5);
        assert_eq!((window.width, window.height), (2, 1));
        assert!((window.origin_x - 110.0).abs() < 1e-9);
        assert!((window.origin_y - 40.0).abs() < 1e-9);
        assert_eq!(window.get(0, 0), Some(5.0));
        assert_eq!(window.get(1, 0), Some(6.0));
    }

    #[test]
    fn snap_aligns_to_origin() {
        let snap = GridSnap {
            origin_x: 3.0,
            origin_y: 7.0,
        };
        assert!((snap.floor_x(27.5, 10.0) - 23.0).abs() < 1e-9);
        assert!((snap.ceil_y(27.5, 10.0) - 37.0).abs() < 1e-9);
    }
}
