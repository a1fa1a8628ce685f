/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 24/01/2025
Last Modified: 12/06/2025
License: MIT
*/

pub mod miramon;

mod memory;
mod source;

pub use self::memory::MemoryRaster;
pub use self::source::{MaskSource, RasterSink, RasterSource};
