/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 15/03/2025
Last Modified: 08/07/2025
License: MIT
*/

pub mod enumerator;
pub mod polygonize;
pub mod polygonizer;
pub mod sieve;

pub use crate::enumerator::{float_equals, CellValue, PolygonEnumerator, NODATA_MARKER};
pub use crate::polygonize::{fpolygonize, polygonize, Connectedness, PolygonizeOptions};
pub use crate::sieve::sieve_filter;
