/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 12/02/2025
Last Modified: 21/06/2025
License: MIT

Notes: A band's colors come either from a DBF table whose records join color
components to pixel values, or from a fixed-size text palette (.pal/.p25/.p65
for 64/256/65536 entries). A corrupt entry is reported and reading stops, but
entries already read stand.
*/
use super::rel::MirRel;
use super::{SECTION_ATTRIBUTE_DATA, SECTION_COLOR_TEXT};
use std::fs;
use std::io::{Error, ErrorKind};
use std::path::Path;

/// How palette entries map onto the band's value range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorScaling {
    Default,
    DirectAssignment,
    OriginDisplacement,
    Linear,
    Log10,
    UserIntervals,
}

/// Color information referenced by a band's symbolization metadata.
pub struct MirPalette {
    colors: Vec<(u8, u8, u8)>,
    nodata_index: Option<usize>,
    categorical: bool,
    automatic: bool,
    constant_color: Option<(u8, u8, u8)>,
    color_scaling: ColorScaling,
}

impl MirPalette {
    /// Reads the palette a band's `[COLOR_TEXT]` section points at.
    pub(crate) fn open(rel: &mut MirRel, band_section: &str) -> Result<MirPalette, Error> {
        let mut palette = MirPalette {
            colors: vec![],
            nodata_index: None,
            categorical: false,
            automatic: false,
            constant_color: None,
            color_scaling: ColorScaling::Default,
        };

        // A constant color overrides any palette file.
        let constant = rel
            .get_value_in(SECTION_COLOR_TEXT, band_section, "Color_Const")
            .map(|v| v == "1")
            .unwrap_or(false);
        if constant {
            palette.constant_color = parse_color_triplet(
                &rel.get_value_in(SECTION_COLOR_TEXT, band_section, "Color_Smb")
                    .unwrap_or_default(),
            );
            return Ok(palette);
        }

        let treatment = match rel.get_value_in(
            SECTION_COLOR_TEXT,
            band_section,
            "Color_TractamentVariable",
        ) {
            Some(v) if !v.is_empty() => Some(v),
            _ => rel.get_value(SECTION_ATTRIBUTE_DATA, "TractamentVariable"),
        };
        palette.categorical = treatment
            .map(|v| v.eq_ignore_ascii_case("Categoric"))
            .unwrap_or(false);

        if let Some(scaling) =
            rel.get_value_in(SECTION_COLOR_TEXT, band_section, "Color_EscalatColor")
        {
            palette.color_scaling = match scaling.as_str() {
                "AssigDirecta" => ColorScaling::DirectAssignment,
                "DespOrigen" => ColorScaling::OriginDisplacement,
                "lineal" => ColorScaling::Linear,
                "log_10" => ColorScaling::Log10,
                "IntervalsUsuari" => ColorScaling::UserIntervals,
                _ => ColorScaling::Default,
            };
        }

        // A missing or <Automatic> palette reference leaves the colors to the
        // displaying application.
        let reference = match rel.get_value_in(SECTION_COLOR_TEXT, band_section, "Color_Paleta") {
            Some(v) if !v.is_empty() && v != "<Automatic>" => v,
            _ => {
                palette.automatic = true;
                return Ok(palette);
            }
        };

        let palette_file = rel.resolve_path(&reference);
        let extension = Path::new(&reference)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "dbf" => palette.read_dbf(&palette_file)?,
            "pal" | "p25" | "p65" => palette.read_text(&palette_file, &extension)?,
            _ => {}
        }
        Ok(palette)
    }

    pub fn colors(&self) -> &[(u8, u8, u8)] {
        &self.colors
    }

    pub fn nodata_index(&self) -> Option<usize> {
        self.nodata_index
    }

    pub fn is_categorical(&self) -> bool {
        self.categorical
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    pub fn constant_color(&self) -> Option<(u8, u8, u8)> {
        self.constant_color
    }

    pub fn color_scaling(&self) -> ColorScaling {
        self.color_scaling
    }

    // Text palettes carry a fixed number of `index R G B` rows.
    fn read_text(&mut self, file_name: &str, extension: &str) -> Result<(), Error> {
        let capacity = match extension {
            "pal" => 64,
            "p25" => 256,
            _ => 65536,
        };

        let text = fs::read_to_string(file_name).map_err(|e| {
            Error::new(e.kind(), format!("Invalid color table: \"{}\": {}", file_name, e))
        })?;

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if self.colors.len() >= capacity {
                break;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let color = if tokens.len() == 4 {
                parse_color_components(tokens[1], tokens[2], tokens[3])
            } else {
                None
            };
            match color {
                Some(c) => self.colors.push(c),
                None => {
                    eprintln!(
                        "Warning: corrupt entry {} in color table \"{}\"; \
                         remaining entries skipped.",
                        self.colors.len(),
                        file_name
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    // DBF palettes join colors to pixel values; a record with an empty
    // CLAUSIMBOL carries the nodata color.
    fn read_dbf(&mut self, file_name: &str) -> Result<(), Error> {
        let table = DbfTable::read(file_name)?;

        let clausimbol = table.require_field("CLAUSIMBOL")?;
        let r_color = table.require_field("R_COLOR")?;
        let g_color = table.require_field("G_COLOR")?;
        let b_color = table.require_field("B_COLOR")?;

        if table.num_records > 65536 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Palette table too large: \"{}\"", file_name),
            ));
        }

        for record in 0..table.num_records {
            if table.is_deleted(record) {
                continue;
            }
            let key = table.value(record, clausimbol);
            let color = match (
                table.value(record, r_color).parse::<f64>(),
                table.value(record, g_color).parse::<f64>(),
                table.value(record, b_color).parse::<f64>(),
            ) {
                (Ok(r), Ok(g), Ok(b)) => (clamp_component(r), clamp_component(g), clamp_component(b)),
                _ => {
                    eprintln!(
                        "Warning: corrupt color in palette table \"{}\"; \
                         remaining entries skipped.",
                        file_name
                    );
                    break;
                }
            };
            if key.is_empty() {
                self.nodata_index = Some(self.colors.len());
            }
            self.colors.push(color);
        }
        Ok(())
    }
}

// Example: Color_Smb=(255,0,255)
fn parse_color_triplet(value: &str) -> Option<(u8, u8, u8)> {
    let cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let inner = cleaned.strip_prefix('(')?.strip_suffix(')')?;
    let parts: Vec<&str> = inner.split(',').collect();
    if parts.len() != 3 {
        return None;
    }
    parse_color_components(parts[0], parts[1], parts[2])
}

fn parse_color_components(r: &str, g: &str, b: &str) -> Option<(u8, u8, u8)> {
    match (r.parse::<f64>(), g.parse::<f64>(), b.parse::<f64>()) {
        (Ok(r), Ok(g), Ok(b)) => Some((clamp_component(r), clamp_component(g), clamp_component(b))),
        _ => None,
    }
}

fn clamp_component(v: f64) -> u8 {
    v.max(0f64).min(255f64) as u8
}

// A minimal read-only view of a dBASE table: the 32-byte header, the field
// descriptor array, and fixed-width ASCII records.
struct DbfTable {
    num_records: usize,
    bytes_in_header: usize,
    bytes_in_record: usize,
    fields: Vec<DbfField>,
    data: Vec<u8>,
}

struct DbfField {
    name: String,
    offset: usize,
    length: usize,
}

impl DbfTable {
    fn read(file_name: &str) -> Result<DbfTable, Error> {
        let data = fs::read(file_name)?;
        if data.len() < 32 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Truncated palette table: \"{}\"", file_name),
            ));
        }

        let num_records = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        let bytes_in_header = u16::from_le_bytes([data[8], data[9]]) as usize;
        let bytes_in_record = u16::from_le_bytes([data[10], data[11]]) as usize;

        let mut fields = vec![];
        let mut pos = 32;
        // Records start with the one-byte deletion flag.
        let mut field_offset = 1;
        while pos + 32 <= data.len() && data[pos] != 0x0d {
            let name_bytes = &data[pos..pos + 11];
            let name_end = name_bytes.iter().position(|b| *b == 0).unwrap_or(11);
            let length = data[pos + 16] as usize;
            fields.push(DbfField {
                name: String::from_utf8_lossy(&name_bytes[..name_end]).trim().to_string(),
                offset: field_offset,
                length: length,
            });
            field_offset += length;
            pos += 32;
        }

        if bytes_in_header + num_records * bytes_in_record > data.len()
            || field_offset > bytes_in_record
        {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Truncated palette table: \"{}\"", file_name),
            ));
        }

        Ok(DbfTable {
            num_records: num_records,
            bytes_in_header: bytes_in_header,
            bytes_in_record: bytes_in_record,
            fields: fields,
            data: data,
        })
    }

    fn require_field(&self, name: &str) -> Result<usize, Error> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidData,
                    format!("Palette table lacks the required field {}", name),
                )
            })
    }

    fn is_deleted(&self, record: usize) -> bool {
        self.data[self.bytes_in_header + record * self.bytes_in_record] == 0x2a
    }

    fn value(&self, record: usize, field: usize) -> String {
        let f = &self.fields[field];
        let start = self.bytes_in_header + record * self.bytes_in_record + f.offset;
        String::from_utf8_lossy(&self.data[start..start + f.length])
            .trim()
            .to_string()
    }
}
