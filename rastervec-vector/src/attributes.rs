/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 08/03/2025
Last Modified: 08/03/2025
License: MIT

Notes: Structures describing the attribute table of an output feature layer.
*/
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FieldDataType {
    Int,
    Real,
    Text,
    Bool,
}

/// The schema of one attribute field.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeField {
    pub name: String,
    pub field_type: FieldDataType,
    pub field_length: u8,
    pub decimal_count: u8,
}

impl AttributeField {
    pub fn new(name: &str, field_type: FieldDataType, field_length: u8, decimal_count: u8) -> AttributeField {
        AttributeField {
            name: name.to_string(),
            field_type: field_type,
            field_length: field_length,
            decimal_count: decimal_count,
        }
    }
}

/// One attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Int(i32),
    Real(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl fmt::Display for FieldData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldData::Int(v) => write!(f, "{}", v),
            FieldData::Real(v) => write!(f, "{}", v),
            FieldData::Text(v) => write!(f, "{}", v),
            FieldData::Bool(v) => write!(f, "{}", v),
            FieldData::Null => write!(f, "null"),
        }
    }
}
