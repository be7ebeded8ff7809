//! Robot-centred square raster shared by every sensor grid and the fused
//! human grid.
//!
//! # Layout
//! Cells are stored row-major. Row index grows with +y and column index
//! with +x, so cell (row, col) has its centre at
//! `(origin.x + (col + 0.5)·res, origin.y + (row + 0.5)·res)`, where the
//! origin is the outer corner of cell (0, 0) and the robot sits at the
//! middle of the raster.

use crate::{error::ConfigError, types::CartesianPose};
use serde::{Deserialize, Serialize};

/// Planar pose of the grid origin in the base frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GridOrigin {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// Dimensions of a square, robot-centred grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Cells per side
    pub size: usize,
    /// Cell edge length (meters)
    pub resolution: f64,
}

impl GridGeometry {
    /// `size = ceil(2·range_max / resolution)`.
    pub fn new(range_max: f64, resolution: f64) -> Result<Self, ConfigError> {
        if !(resolution > 0.0 && resolution.is_finite()) {
            return Err(ConfigError::NonPositiveResolution(resolution));
        }
        if !(range_max > 0.0 && range_max.is_finite()) {
            return Err(ConfigError::NonPositive {
                name: "range_max".into(),
                value: range_max,
            });
        }
        let size = (2.0 * range_max / resolution).ceil() as usize;
        Ok(Self { size, resolution })
    }

    pub fn width(&self) -> usize {
        self.size
    }

    pub fn height(&self) -> usize {
        self.size
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.size * self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn origin(&self) -> GridOrigin {
        let half = self.size as f64 * self.resolution / 2.0;
        GridOrigin {
            x: -half,
            y: -half,
            theta: 0.0,
        }
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.size + col
    }

    pub fn row_col(&self, index: usize) -> (usize, usize) {
        (index / self.size, index % self.size)
    }

    pub fn cell_center(&self, row: usize, col: usize) -> CartesianPose {
        let origin = self.origin();
        CartesianPose::new(
            origin.x + (col as f64 + 0.5) * self.resolution,
            origin.y + (row as f64 + 0.5) * self.resolution,
        )
    }

    pub fn index_center(&self, index: usize) -> CartesianPose {
        let (row, col) = self.row_col(index);
        self.cell_center(row, col)
    }

    /// Cell containing `pose`, or `None` when it falls off the raster.
    pub fn cell_of(&self, pose: CartesianPose) -> Option<(usize, usize)> {
        let origin = self.origin();
        let col = ((pose.x - origin.x) / self.resolution).floor();
        let row = ((pose.y - origin.y) / self.resolution).floor();
        let limit = self.size as f64;
        if col < 0.0 || row < 0.0 || col >= limit || row >= limit {
            return None;
        }
        Some((row as usize, col as usize))
    }
}

/// A probability raster: one value in [0, 1] per cell, row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OccupancyGrid {
    pub geometry: GridGeometry,
    pub cells: Vec<f64>,
}

impl OccupancyGrid {
    /// Grid with every cell set to `value`.
    pub fn filled(geometry: GridGeometry, value: f64) -> Self {
        Self {
            geometry,
            cells: vec![value; geometry.len()],
        }
    }

    pub fn width(&self) -> usize {
        self.geometry.width()
    }

    pub fn height(&self) -> usize {
        self.geometry.height()
    }

    pub fn resolution(&self) -> f64 {
        self.geometry.resolution
    }

    pub fn origin(&self) -> GridOrigin {
        self.geometry.origin()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.cells[self.geometry.index(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let idx = self.geometry.index(row, col);
        self.cells[idx] = value;
    }

    /// Probability of the cell containing `pose`.
    pub fn value_at(&self, pose: CartesianPose) -> Option<f64> {
        self.geometry
            .cell_of(pose)
            .map(|(row, col)| self.get(row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn size_from_range_and_resolution() {
        let g = GridGeometry::new(20.0, 0.5).unwrap();
        assert_eq!((g.width(), g.height()), (80, 80));
        assert_eq!(g.len(), 6400);
        // Non-integer ratio rounds up
        assert_eq!(GridGeometry::new(10.0, 0.3).unwrap().size, 67);
    }

    #[test]
    fn rejects_non_positive_resolution() {
        assert_eq!(
            GridGeometry::new(20.0, -0.5),
            Err(ConfigError::NonPositiveResolution(-0.5))
        );
    }

    #[test]
    fn robot_is_at_grid_centre() {
        let g = GridGeometry::new(20.0, 0.5).unwrap();
        let o = g.origin();
        assert_abs_diff_eq!(o.x, -20.0);
        assert_abs_diff_eq!(o.y, -20.0);
        let c = g.cell_center(40, 40);
        assert_abs_diff_eq!(c.x, 0.25);
        assert_abs_diff_eq!(c.y, 0.25);
    }

    #[test]
    fn cell_lookup_matches_centres() {
        let g = GridGeometry::new(5.0, 0.5).unwrap();
        for idx in [0, 7, 42, g.len() - 1] {
            let (row, col) = g.row_col(idx);
            assert_eq!(g.cell_of(g.index_center(idx)), Some((row, col)));
        }
        assert_eq!(g.cell_of(CartesianPose::new(5.1, 0.0)), None);
        assert_eq!(g.cell_of(CartesianPose::new(0.0, -5.1)), None);
    }
}
