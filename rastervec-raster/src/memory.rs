/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 27/01/2025
Last Modified: 30/05/2025
License: MIT
*/
use crate::source::{MaskSource, RasterSink, RasterSource};
use num_traits::AsPrimitive;
use rastervec_common::structures::GeoTransform;
use std::io::{Error, ErrorKind};

/// A simple in-memory single-band raster, mostly useful as a scan target for
/// the sieve filter and as a test stand-in for file-backed bands.
#[derive(Clone, Debug)]
pub struct MemoryRaster<T: Copy> {
    rows: usize,
    columns: usize,
    data: Vec<T>,
    geo_transform: Option<GeoTransform>,
}

impl<T: Copy> MemoryRaster<T> {
    pub fn new(rows: usize, columns: usize, initial_value: T) -> MemoryRaster<T> {
        MemoryRaster {
            rows: rows,
            columns: columns,
            data: vec![initial_value; rows * columns],
            geo_transform: None,
        }
    }

    /// Builds a raster from row-major cell values. The value count must be
    /// `rows * columns`.
    pub fn from_data(rows: usize, columns: usize, data: Vec<T>) -> Result<MemoryRaster<T>, Error> {
        if data.len() != rows * columns {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Cell count does not match the raster dimensions.",
            ));
        }
        Ok(MemoryRaster {
            rows: rows,
            columns: columns,
            data: data,
            geo_transform: None,
        })
    }

    pub fn set_geo_transform(&mut self, gt: GeoTransform) {
        self.geo_transform = Some(gt);
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn get_value(&self, row: usize, column: usize) -> T {
        self.data[row * self.columns + column]
    }

    pub fn set_value(&mut self, row: usize, column: usize, value: T) {
        self.data[row * self.columns + column] = value;
    }

    pub fn get_row_data(&self, row: usize) -> &[T] {
        &self.data[row * self.columns..(row + 1) * self.columns]
    }

    fn check_row(&self, row: usize, len: usize) -> Result<(), Error> {
        if row >= self.rows || len != self.columns {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Row index or buffer length out of range.",
            ));
        }
        Ok(())
    }
}

impl<T> RasterSource for MemoryRaster<T>
where
    T: Copy + AsPrimitive<i64> + AsPrimitive<f32> + 'static,
{
    fn width(&self) -> usize {
        self.columns
    }

    fn height(&self) -> usize {
        self.rows
    }

    fn read_row_i64(&mut self, row: usize, values: &mut [i64]) -> Result<(), Error> {
        self.check_row(row, values.len())?;
        for (i, v) in self.get_row_data(row).iter().enumerate() {
            values[i] = (*v).as_();
        }
        Ok(())
    }

    fn read_row_f32(&mut self, row: usize, values: &mut [f32]) -> Result<(), Error> {
        self.check_row(row, values.len())?;
        for (i, v) in self.get_row_data(row).iter().enumerate() {
            values[i] = (*v).as_();
        }
        Ok(())
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        self.geo_transform
    }
}

impl RasterSink for MemoryRaster<i64> {
    fn write_row(&mut self, row: usize, values: &[i64]) -> Result<(), Error> {
        self.check_row(row, values.len())?;
        let start = row * self.columns;
        self.data[start..start + self.columns].copy_from_slice(values);
        Ok(())
    }
}

impl MaskSource for MemoryRaster<u8> {
    fn read_row(&mut self, row: usize, values: &mut [u8]) -> Result<(), Error> {
        self.check_row(row, values.len())?;
        values.copy_from_slice(self.get_row_data(row));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::MemoryRaster;
    use crate::source::{RasterSink, RasterSource};

    #[test]
    fn round_trips_rows() {
        let mut r = MemoryRaster::new(2, 3, 0i64);
        r.write_row(1, &[4, 5, 6]).unwrap();
        let mut buf = [0i64; 3];
        r.read_row_i64(1, &mut buf).unwrap();
        assert_eq!(buf, [4, 5, 6]);
    }

    #[test]
    fn rejects_mismatched_buffers() {
        let mut r = MemoryRaster::new(2, 3, 0i64);
        let mut buf = [0i64; 2];
        assert!(r.read_row_i64(0, &mut buf).is_err());
        assert!(r.read_row_i64(2, &mut [0i64; 3]).is_err());
    }

    #[test]
    fn widens_float_cells() {
        let r = MemoryRaster::from_data(1, 2, vec![1.5f32, -2.0f32]).unwrap();
        let mut r = r;
        let mut buf = [0f32; 2];
        r.read_row_f32(0, &mut buf).unwrap();
        assert_eq!(buf, [1.5, -2.0]);
    }
}
