/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 10/03/2025
Last Modified: 27/06/2025
License: MIT

Notes: The feature-layer capability the polygonizer writes into, plus an
in-memory implementation. On-disk vector formats live behind this trait and
are out of the library's scope.
*/
use crate::attributes::{AttributeField, FieldData};
use crate::geometry::PolygonGeometry;
use std::io::{Error, ErrorKind};

/// An output feature under construction: attribute values sized to the
/// layer's schema, plus the polygon geometry.
#[derive(Clone, Debug)]
pub struct Feature {
    fields: Vec<FieldData>,
    geometry: PolygonGeometry,
}

impl Feature {
    pub fn new(num_fields: usize) -> Feature {
        Feature {
            fields: vec![FieldData::Null; num_fields],
            geometry: PolygonGeometry::new(),
        }
    }

    pub fn set_field(&mut self, field_index: usize, value: FieldData) -> Result<(), Error> {
        if field_index >= self.fields.len() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Attribute index outside the layer schema.",
            ));
        }
        self.fields[field_index] = value;
        Ok(())
    }

    pub fn set_geometry(&mut self, geometry: PolygonGeometry) {
        self.geometry = geometry;
    }

    pub fn fields(&self) -> &[FieldData] {
        &self.fields
    }

    pub fn geometry(&self) -> &PolygonGeometry {
        &self.geometry
    }
}

/// A feature layer that accepts polygon features one at a time, in the order
/// they are created.
pub trait PolygonLayer {
    /// Whether the layer supports appending features sequentially. Drivers
    /// refuse to run against a layer that does not.
    fn test_sequential_write(&self) -> bool {
        true
    }

    fn num_fields(&self) -> usize;

    /// Starts a feature sized to this layer's attribute schema.
    fn create_feature(&self) -> Feature {
        Feature::new(self.num_fields())
    }

    /// Appends a finished feature to the layer.
    fn commit_feature(&mut self, feature: Feature) -> Result<(), Error>;
}

/// A `PolygonLayer` that keeps everything in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryLayer {
    fields: Vec<AttributeField>,
    features: Vec<Feature>,
}

impl MemoryLayer {
    pub fn new() -> MemoryLayer {
        MemoryLayer {
            fields: vec![],
            features: vec![],
        }
    }

    pub fn add_field(&mut self, field: &AttributeField) {
        self.fields.push(field.clone());
    }

    pub fn fields(&self) -> &[AttributeField] {
        &self.fields
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub fn feature(&self, index: usize) -> Option<&Feature> {
        self.features.get(index)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }
}

impl PolygonLayer for MemoryLayer {
    fn num_fields(&self) -> usize {
        self.fields.len()
    }

    fn commit_feature(&mut self, feature: Feature) -> Result<(), Error> {
        self.features.push(feature);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::attributes::FieldDataType;

    #[test]
    fn features_follow_the_layer_schema() {
        let mut layer = MemoryLayer::new();
        layer.add_field(&AttributeField::new("FID", FieldDataType::Int, 10u8, 0u8));
        layer.add_field(&AttributeField::new("VALUE", FieldDataType::Real, 12u8, 4u8));

        let mut f = layer.create_feature();
        f.set_field(1, FieldData::Real(7.0)).unwrap();
        assert!(f.set_field(2, FieldData::Int(1)).is_err());
        layer.commit_feature(f).unwrap();

        assert_eq!(layer.num_features(), 1);
        assert_eq!(layer.feature(0).unwrap().fields()[1], FieldData::Real(7.0));
        assert_eq!(layer.feature(0).unwrap().fields()[0], FieldData::Null);
    }
}
