/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 16/01/2025
Last Modified: 07/05/2025
License: MIT
*/
use crate::structures::{BoundingBox, Point2D};

/// A 6-parameter affine transform mapping pixel (column, row) coordinates to
/// georeferenced (x, y) coordinates:
///
/// ```text
/// x = x0 + column * dx_col + row * dx_row
/// y = y0 + column * dy_col + row * dy_row
/// ```
///
/// The default transform is the identity, which leaves vertices in pixel
/// space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoTransform {
    pub x0: f64,
    pub dx_col: f64,
    pub dx_row: f64,
    pub y0: f64,
    pub dy_col: f64,
    pub dy_row: f64,
}

impl Default for GeoTransform {
    fn default() -> GeoTransform {
        GeoTransform {
            x0: 0f64,
            dx_col: 1f64,
            dx_row: 0f64,
            y0: 0f64,
            dy_col: 0f64,
            dy_row: 1f64,
        }
    }
}

impl GeoTransform {
    pub fn new(x0: f64, dx_col: f64, dx_row: f64, y0: f64, dy_col: f64, dy_row: f64) -> GeoTransform {
        GeoTransform {
            x0: x0,
            dx_col: dx_col,
            dx_row: dx_row,
            y0: y0,
            dy_col: dy_col,
            dy_row: dy_row,
        }
    }

    /// Derives the transform of a north-up raster from its bounding box and
    /// grid dimensions. MiraMon rasters carry no rotation terms.
    pub fn from_bounds(bb: &BoundingBox, columns: usize, rows: usize) -> GeoTransform {
        GeoTransform {
            x0: bb.min_x,
            dx_col: bb.get_width() / columns as f64,
            dx_row: 0f64,
            y0: bb.max_y,
            dy_col: 0f64,
            dy_row: -bb.get_height() / rows as f64,
        }
    }

    pub fn apply(&self, column: f64, row: f64) -> Point2D {
        Point2D::new(
            self.x0 + column * self.dx_col + row * self.dx_row,
            self.y0 + column * self.dy_col + row * self.dy_row,
        )
    }

    /// Maps a georeferenced point back to (column, row). Only valid for
    /// transforms without rotation terms.
    pub fn apply_inverse(&self, p: &Point2D) -> (f64, f64) {
        ((p.x - self.x0) / self.dx_col, (p.y - self.y0) / self.dy_row)
    }
}

#[cfg(test)]
mod test {
    use super::GeoTransform;
    use crate::structures::{BoundingBox, Point2D};

    #[test]
    fn identity_leaves_pixel_coordinates() {
        let gt = GeoTransform::default();
        let p = gt.apply(3f64, 7f64);
        assert_eq!(p, Point2D::new(3f64, 7f64));
    }

    #[test]
    fn from_bounds_maps_corners() {
        let bb = BoundingBox::new(100f64, 200f64, 50f64, 150f64);
        let gt = GeoTransform::from_bounds(&bb, 10, 20);
        assert_eq!(gt.apply(0f64, 0f64), Point2D::new(100f64, 150f64));
        assert_eq!(gt.apply(10f64, 20f64), Point2D::new(200f64, 50f64));
    }

    #[test]
    fn inverse_recovers_pixel_corner() {
        let bb = BoundingBox::new(100f64, 200f64, 50f64, 150f64);
        let gt = GeoTransform::from_bounds(&bb, 10, 20);
        let p = gt.apply(4f64, 9f64);
        let (col, row) = gt.apply_inverse(&p);
        assert_eq!(col.round() as i64, 4);
        assert_eq!(row.round() as i64, 9);
    }
}
