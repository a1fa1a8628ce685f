/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 02/02/2025
Last Modified: 12/06/2025
License: MIT

Notes: The REL sidecar is an INI-like text file: sections in brackets
(possibly layered, e.g. [ATTRIBUTE_DATA:G1:EXTENT]), key=value entries,
continuation lines, and ;/# comments. Section and key comparison is
case-insensitive. Every key consumed through an accessor is recorded so the
caller can enumerate whatever metadata the reader did not model.
*/
use super::band::MirBand;
use super::palette::MirPalette;
use super::{
    ends_with_ignore_case, parse_subdataset_name, EXT_RASTER, EXT_RASTER_REL,
    KEY_INDEXES_NOMS_CAMPS, KEY_NOM_CAMP, KEY_NOM_FITXER, SECTION_ATTRIBUTE_DATA,
};
use std::collections::HashSet;
use std::fs;
use std::io::{Error, ErrorKind};
use std::path::Path;

struct RelSection {
    name: String,
    entries: Vec<(String, String)>,
}

/// Parsed REL metadata plus the bands it documents.
pub struct MirRel {
    rel_file_name: String,
    sections: Vec<RelSection>,
    excluded: HashSet<(String, String)>,
    bands: Vec<MirBand>,
}

impl MirRel {
    /// Opens a REL metadata file, an IMG file with a REL sidecar, or a
    /// sub-dataset name, and constructs every band it documents.
    pub fn open(file_name: &str) -> Result<MirRel, Error> {
        let mut sds_bands: Vec<String> = vec![];
        let rel_name = if let Some(sds) = parse_subdataset_name(file_name) {
            sds_bands = sds.band_files;
            sds.rel_file
        } else if ends_with_ignore_case(file_name, EXT_RASTER_REL) {
            file_name.to_string()
        } else if ends_with_ignore_case(file_name, EXT_RASTER) {
            rel_name_for_img(file_name)
        } else {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Not a MiraMon raster name: {}", file_name),
            ));
        };

        let sections = parse_rel_text(&rel_name)?;
        let mut rel = MirRel {
            rel_file_name: rel_name,
            sections: sections,
            excluded: HashSet::new(),
            bands: vec![],
        };
        rel.parse_band_info(&sds_bands)?;
        Ok(rel)
    }

    pub fn rel_file_name(&self) -> &str {
        &self.rel_file_name
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, index: usize) -> Option<&MirBand> {
        self.bands.get(index)
    }

    pub fn band_mut(&mut self, index: usize) -> Option<&mut MirBand> {
        self.bands.get_mut(index)
    }

    /// Reads the palette referenced by a band's symbolization metadata, if
    /// the band exists.
    pub fn palette_for_band(&mut self, index: usize) -> Result<Option<MirPalette>, Error> {
        let section = match self.bands.get(index) {
            Some(band) => band.band_section().to_string(),
            None => return Ok(None),
        };
        MirPalette::open(self, &section).map(Some)
    }

    /// Resolves the main attribute table reference: the DBF file name and the
    /// field that joins it to the raster values.
    pub fn attribute_table_file(&mut self) -> Option<(String, String)> {
        let dbf = self.get_value("TAULA_PRINCIPAL", KEY_NOM_FITXER)?;
        let field = self.get_value("TAULA_PRINCIPAL", "AssociatRel")?;
        if dbf.is_empty() || field.is_empty() {
            return None;
        }
        Some((self.resolve_path(&dbf), field))
    }

    /// Looks a key up in `[section]`, recording the pair as consumed.
    pub fn get_value(&mut self, section: &str, key: &str) -> Option<String> {
        self.exclude(section, key);
        self.lookup(section, key)
    }

    /// Looks a key up in `[main:sub]`, falling back to `[main]`.
    pub fn get_value_in(&mut self, main: &str, sub: &str, key: &str) -> Option<String> {
        let layered = format!("{}:{}", main, sub);
        self.exclude(&layered, key);
        if let Some(value) = self.lookup(&layered, key) {
            return Some(value);
        }
        self.exclude(main, key);
        self.lookup(main, key)
    }

    /// Looks a key up in `[main:sub:subsub]`, falling back to `[subsub]`.
    pub fn get_value_nested(
        &mut self,
        main: &str,
        sub: &str,
        subsub: &str,
        key: &str,
    ) -> Option<String> {
        let layered = format!("{}:{}:{}", main, sub, subsub);
        self.exclude(&layered, key);
        if let Some(value) = self.lookup(&layered, key) {
            return Some(value);
        }
        self.exclude(subsub, key);
        self.lookup(subsub, key)
    }

    /// Marks a whole section as consumed.
    pub fn exclude_section(&mut self, section: &str) {
        self.exclude(section, "");
    }

    /// Every (section, key, value) entry that no accessor has consumed, in
    /// file order. This is what a driver exposes as opaque passthrough
    /// metadata.
    pub fn remaining_metadata(&self) -> Vec<(String, String, String)> {
        let mut items = vec![];
        for section in &self.sections {
            let section_lc = section.name.to_lowercase();
            if self.excluded.contains(&(section_lc.clone(), String::new())) {
                continue;
            }
            for (key, value) in &section.entries {
                if self.excluded.contains(&(section_lc.clone(), key.to_lowercase())) {
                    continue;
                }
                items.push((section.name.clone(), key.clone(), value.clone()));
            }
        }
        items
    }

    /// Resolves a file name documented in the REL relative to the REL's own
    /// directory.
    pub fn resolve_path(&self, documented: &str) -> String {
        let path = Path::new(documented);
        if path.is_absolute() {
            return documented.to_string();
        }
        match Path::new(&self.rel_file_name).parent() {
            Some(dir) => dir.join(documented).to_string_lossy().to_string(),
            None => documented.to_string(),
        }
    }

    /// Derives the raw band file name used when a band section documents no
    /// `NomFitxer`: the REL name with the trailing `I.rel` replaced by `.img`.
    pub fn img_name_from_rel_name(&self) -> Option<String> {
        let name = &self.rel_file_name;
        if name.len() < EXT_RASTER_REL.len() {
            return None;
        }
        Some(format!(
            "{}{}",
            &name[..name.len() - EXT_RASTER_REL.len()],
            EXT_RASTER
        ))
    }

    fn exclude(&mut self, section: &str, key: &str) {
        self.excluded
            .insert((section.to_lowercase(), key.to_lowercase()));
    }

    fn lookup(&self, section: &str, key: &str) -> Option<String> {
        let section = self
            .sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(section))?;
        section
            .entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    }

    fn parse_band_info(&mut self, sds_bands: &[String]) -> Result<(), Error> {
        let field_names = match self.get_value(SECTION_ATTRIBUTE_DATA, KEY_INDEXES_NOMS_CAMPS) {
            Some(v) if !v.is_empty() => v,
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!(
                        "[{}] {} should exist in {}.",
                        SECTION_ATTRIBUTE_DATA, KEY_INDEXES_NOMS_CAMPS, self.rel_file_name
                    ),
                ))
            }
        };

        let mut processed: HashSet<String> = HashSet::new();
        for token in field_names.split(',').map(|t| t.trim()).filter(|t| !t.is_empty()) {
            // Repeated band tokens are ignored.
            if !processed.insert(token.to_lowercase()) {
                continue;
            }

            let section_key = format!("{}_{}", KEY_NOM_CAMP, token);
            let band_section = match self.get_value(SECTION_ATTRIBUTE_DATA, &section_key) {
                Some(v) if !v.is_empty() => v.trim().to_string(),
                _ => continue,
            };

            if !sds_bands.is_empty() {
                let raw_name = self
                    .get_value_in(SECTION_ATTRIBUTE_DATA, &band_section, KEY_NOM_FITXER)
                    .unwrap_or_default();
                if !sds_bands.iter().any(|b| b.eq_ignore_ascii_case(&raw_name)) {
                    continue;
                }
            }

            let band = MirBand::open(self, &band_section)?;
            self.bands.push(band);
        }

        if self.bands.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("No bands in file {}.", self.rel_file_name),
            ));
        }
        Ok(())
    }
}

// Converts FileName.img to FileNameI.rel
fn rel_name_for_img(img_name: &str) -> String {
    let stem = match img_name.rfind('.') {
        Some(dot) => &img_name[..dot],
        None => img_name,
    };
    format!("{}{}", stem, EXT_RASTER_REL)
}

fn parse_rel_text(file_name: &str) -> Result<Vec<RelSection>, Error> {
    let bytes = fs::read(file_name)?;
    let text = String::from_utf8_lossy(&bytes);

    let mut sections: Vec<RelSection> = vec![];
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            sections.push(RelSection {
                name: line[1..line.len() - 1].trim().to_string(),
                entries: vec![],
            });
            continue;
        }

        let section = match sections.last_mut() {
            Some(s) => s,
            None => continue, // junk ahead of the first section header
        };

        match line.find('=') {
            Some(eq) => {
                section.entries.push((
                    line[..eq].trim().to_string(),
                    line[eq + 1..].trim().to_string(),
                ));
            }
            None => {
                // A line without '=' continues the previous value.
                if let Some((_, value)) = section.entries.last_mut() {
                    value.push('\n');
                    value.push_str(line);
                }
            }
        }
    }

    if sections.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("Metadata file {} has no sections.", file_name),
        ));
    }
    Ok(sections)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn write_temp_rel(name: &str, contents: &str) -> String {
        let path = std::env::temp_dir().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn parses_sections_keys_and_continuations() {
        let path = write_temp_rel(
            "rel_parse_testI.rel",
            "; comment\n[VERS]\nVers=4\n[ATTRIBUTE_DATA]\nIndexesNomsCamps=1\nNomCamp_1=G1\n\
             descriptor=first line\nsecond line\n# another comment\n",
        );
        let sections = parse_rel_text(&path).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].name, "ATTRIBUTE_DATA");
        let descriptor = &sections[1].entries[2];
        assert_eq!(descriptor.0, "descriptor");
        assert_eq!(descriptor.1, "first line\nsecond line");
    }

    #[test]
    fn derives_img_names_from_rel_names() {
        assert_eq!(rel_name_for_img("/data/city.img"), "/data/cityI.rel");
    }

    #[test]
    fn consumed_keys_leave_the_passthrough_metadata() {
        let dir = std::env::temp_dir().join("rel_excluded_test");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("band.img"), [0u8; 4]).unwrap();
        let rel_path = dir.join("bandI.rel");
        fs::write(
            &rel_path,
            "[VERSIO]\nVers=4\n[ATTRIBUTE_DATA]\nIndexesNomsCamps=1\nNomCamp_1=G1\n\
             [ATTRIBUTE_DATA:G1]\nNomFitxer=band.img\ncolumns=2\nrows=2\n\
             TipusCompressio=byte\nunusual_key=kept\n",
        )
        .unwrap();

        let rel = MirRel::open(&rel_path.to_string_lossy()).unwrap();
        let remaining = rel.remaining_metadata();
        // Keys the reader modeled are gone; the rest pass through verbatim.
        assert!(remaining
            .iter()
            .any(|(s, k, v)| s == "VERSIO" && k == "Vers" && v == "4"));
        assert!(remaining
            .iter()
            .any(|(s, k, _)| s == "ATTRIBUTE_DATA:G1" && k == "unusual_key"));
        assert!(!remaining.iter().any(|(_, k, _)| k == "TipusCompressio"));
        assert!(!remaining.iter().any(|(_, k, _)| k == "IndexesNomsCamps"));
    }

    #[test]
    fn lookups_are_case_insensitive_and_layered() {
        let dir = std::env::temp_dir().join("rel_layered_test");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("band.img"), [0u8; 4]).unwrap();
        let rel_path = dir.join("bandI.rel");
        fs::write(
            &rel_path,
            "[OVERVIEW:ASPECTES_TECNICS]\ncolumns=2\nrows=2\n\
             [attribute_data]\nIndexesNomsCamps=1\nnomcamp_1=G1\n\
             [ATTRIBUTE_DATA:G1]\nNomFitxer=band.img\nTipusCompressio=BYTE\n",
        )
        .unwrap();

        // Dimensions resolve through the technical-aspects fallback and the
        // compression type through the case-insensitive comparison.
        let rel = MirRel::open(&rel_path.to_string_lossy()).unwrap();
        assert_eq!(rel.num_bands(), 1);
        let band = rel.band(0).unwrap();
        assert_eq!(band.data_type(), crate::miramon::MirDataType::Byte);
    }
}
