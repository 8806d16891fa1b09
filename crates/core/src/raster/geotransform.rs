//! Affine georeferencing for north-up rasters

use serde::{Deserialize, Serialize};

/// Georeferencing of a north-up raster grid.
///
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `pixel_height` is negative for the usual north-up layout. Rotated grids
/// are not supported: every moving-window operator in the workspace assumes
/// square, axis-aligned cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Cell size in X direction
    pub pixel_width: f64,
    /// Cell size in Y direction, usually negative
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Convert pixel coordinates to geographic coordinates of the cell center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Cell size (square pixels)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Area of one cell in map units squared
    pub fn cell_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    /// Transform of a grid grown by `margin` cells on every side.
    pub fn expanded(&self, margin: usize) -> Self {
        let m = margin as f64;
        Self {
            origin_x: self.origin_x - m * self.pixel_width,
            origin_y: self.origin_y - m * self.pixel_height,
            ..*self
        }
    }

    /// Bounding box (min_x, min_y, max_x, max_y) for a grid of given dimensions
    pub fn bounds(&self, cols: usize, rows: usize) -> (f64, f64, f64, f64) {
        let x0 = self.origin_x;
        let x1 = self.origin_x + cols as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + rows as f64 * self.pixel_height;
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_expanded_keeps_cell_centers_aligned() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let grown = gt.expanded(2);

        // Cell (0, 0) of the original is cell (2, 2) of the expanded grid
        let (x, y) = gt.pixel_to_geo(0, 0);
        let (gx, gy) = grown.pixel_to_geo(2, 2);
        assert_relative_eq!(x, gx, epsilon = 1e-10);
        assert_relative_eq!(y, gy, epsilon = 1e-10);
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(100, 100);

        assert_relative_eq!(min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(max_y, 100.0, epsilon = 1e-10);
        assert_relative_eq!(gt.cell_area(), 1.0);
    }
}
