/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 02/02/2025
Last Modified: 12/06/2025
License: MIT

Notes: Read-only access to the MiraMon raster format: an IMG file holding the
raw band data and a sidecar REL metadata file describing how to interpret it.
*/

mod band;
mod palette;
mod rel;

pub use self::band::{MirBand, MirDataType};
pub use self::palette::{ColorScaling, MirPalette};
pub use self::rel::MirRel;

pub(crate) const SECTION_ATTRIBUTE_DATA: &str = "ATTRIBUTE_DATA";
pub(crate) const SECTION_OVERVIEW: &str = "OVERVIEW";
pub(crate) const SECTION_ASPECTES_TECNICS: &str = "ASPECTES_TECNICS";
pub(crate) const SECTION_EXTENT: &str = "EXTENT";
pub(crate) const SECTION_COLOR_TEXT: &str = "COLOR_TEXT";
pub(crate) const KEY_NOM_FITXER: &str = "NomFitxer";
pub(crate) const KEY_INDEXES_NOMS_CAMPS: &str = "IndexesNomsCamps";
pub(crate) const KEY_NOM_CAMP: &str = "NomCamp";

pub(crate) const EXT_RASTER: &str = ".img";
pub(crate) const EXT_RASTER_REL: &str = "I.rel";

const SUBDATASET_PREFIX: &str = "MiraMonRaster:";

/// A parsed sub-dataset name of the form
/// `MiraMonRaster:"<REL path>","<raw band name>",…`.
#[derive(Clone, Debug, PartialEq)]
pub struct SubDataset {
    pub rel_file: String,
    pub band_files: Vec<String>,
}

/// Splits a sub-dataset name into the REL path and the raw band names it
/// selects. Returns `None` when the name does not carry the prefix or names
/// no band.
pub fn parse_subdataset_name(name: &str) -> Option<SubDataset> {
    if !name.starts_with(SUBDATASET_PREFIX) {
        return None;
    }
    let tokens: Vec<String> = name[SUBDATASET_PREFIX.len()..]
        .split(',')
        .map(|t| t.trim().replace('"', ""))
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() < 2 {
        return None;
    }
    Some(SubDataset {
        rel_file: tokens[0].clone(),
        band_files: tokens[1..].to_vec(),
    })
}

/// A file identifies as a MiraMon raster iff its name ends in `I.rel`
/// (case-insensitive) and the REL passes the structural check: an
/// `[ATTRIBUTE_DATA]` section enumerating at least one band.
pub fn is_miramon_raster(file_name: &str) -> bool {
    if !ends_with_ignore_case(file_name, EXT_RASTER_REL) {
        return false;
    }
    match MirRel::open(file_name) {
        Ok(rel) => rel.num_bands() > 0,
        Err(_) => false,
    }
}

pub(crate) fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
