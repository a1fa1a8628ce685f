/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 11/01/2025
Last Modified: 19/04/2025
License: MIT
*/

pub mod structures;
pub mod utils;
