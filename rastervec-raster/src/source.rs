/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 24/01/2025
Last Modified: 30/05/2025
License: MIT
*/
use rastervec_common::structures::GeoTransform;
use std::io::Error;

/// A single-band raster that yields one row of cell values at a time.
///
/// Rows are indexed `0..height` top to bottom. The two read methods widen
/// whatever scalar type the band stores into the requested working type, the
/// way the original drivers select an I/O buffer type: `read_row_i64` for
/// the integer scan path and `read_row_f32` for the floating-point path.
pub trait RasterSource {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    /// Reads row `row` into `values`, which must hold exactly `width()`
    /// entries. Floating-point cells are rounded to the nearest integer.
    fn read_row_i64(&mut self, row: usize, values: &mut [i64]) -> Result<(), Error>;

    /// Reads row `row` into `values`, which must hold exactly `width()`
    /// entries.
    fn read_row_f32(&mut self, row: usize, values: &mut [f32]) -> Result<(), Error>;

    /// The band's affine georeferencing, when it has one.
    fn geo_transform(&self) -> Option<GeoTransform> {
        None
    }
}

/// An 8-bit validity mask with the same dimensions as the raster it masks.
/// A cell value of zero excludes the corresponding raster cell.
pub trait MaskSource {
    fn read_row(&mut self, row: usize, values: &mut [u8]) -> Result<(), Error>;
}

/// A raster that accepts one written row at a time, in any row order.
pub trait RasterSink {
    fn write_row(&mut self, row: usize, values: &[i64]) -> Result<(), Error>;
}
