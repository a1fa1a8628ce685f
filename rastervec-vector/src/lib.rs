/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 08/03/2025
Last Modified: 27/06/2025
License: MIT
*/

pub mod attributes;
pub mod geometry;
pub mod layer;

pub use crate::attributes::{AttributeField, FieldData, FieldDataType};
pub use crate::geometry::PolygonGeometry;
pub use crate::layer::{Feature, MemoryLayer, PolygonLayer};
