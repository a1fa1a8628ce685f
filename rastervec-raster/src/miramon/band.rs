/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 05/02/2025
Last Modified: 21/06/2025
License: MIT

Notes: One MMR band: the metadata extracted from its REL section plus the
open IMG file. Blocks are always one row tall and full width; MiraMon IMG
files are efficient at seeking to a given row, either directly (uncompressed
types) or through the row-offsets index (RLE types).
*/
use super::rel::MirRel;
use super::{
    KEY_NOM_FITXER, SECTION_ASPECTES_TECNICS, SECTION_ATTRIBUTE_DATA, SECTION_COLOR_TEXT,
    SECTION_EXTENT, SECTION_OVERVIEW,
};
use crate::source::{MaskSource, RasterSource};
use rastervec_common::structures::{BoundingBox, GeoTransform};
use rastervec_common::utils::{ByteOrderReader, Endianness};
use std::fs::File;
use std::io::{BufReader, Error, ErrorKind};
use std::path::Path;

/// The scalar type and compression of a band, as declared by the REL
/// `TipusCompressio` key.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MirDataType {
    Bit,
    Byte,
    ByteRle,
    Integer,
    IntegerRle,
    UInteger,
    UIntegerRle,
    Long,
    LongRle,
    Real,
    RealRle,
    Double,
    DoubleRle,
}

impl MirDataType {
    pub fn from_compression_type(value: &str) -> Option<MirDataType> {
        if value.eq_ignore_ascii_case("bit") {
            Some(MirDataType::Bit)
        } else if value.eq_ignore_ascii_case("byte") {
            Some(MirDataType::Byte)
        } else if value.eq_ignore_ascii_case("byte-RLE") {
            Some(MirDataType::ByteRle)
        } else if value.eq_ignore_ascii_case("integer") {
            Some(MirDataType::Integer)
        } else if value.eq_ignore_ascii_case("integer-RLE") {
            Some(MirDataType::IntegerRle)
        } else if value.eq_ignore_ascii_case("uinteger") {
            Some(MirDataType::UInteger)
        } else if value.eq_ignore_ascii_case("uinteger-RLE") {
            Some(MirDataType::UIntegerRle)
        } else if value.eq_ignore_ascii_case("long") {
            Some(MirDataType::Long)
        } else if value.eq_ignore_ascii_case("long-RLE") {
            Some(MirDataType::LongRle)
        } else if value.eq_ignore_ascii_case("real") {
            Some(MirDataType::Real)
        } else if value.eq_ignore_ascii_case("real-RLE") {
            Some(MirDataType::RealRle)
        } else if value.eq_ignore_ascii_case("double") {
            Some(MirDataType::Double)
        } else if value.eq_ignore_ascii_case("double-RLE") {
            Some(MirDataType::DoubleRle)
        } else {
            None
        }
    }

    pub fn is_rle(&self) -> bool {
        matches!(
            self,
            MirDataType::ByteRle
                | MirDataType::IntegerRle
                | MirDataType::UIntegerRle
                | MirDataType::LongRle
                | MirDataType::RealRle
                | MirDataType::DoubleRle
        )
    }

    /// The same scalar type without the RLE wrapping.
    pub fn uncompressed(&self) -> MirDataType {
        match self {
            MirDataType::ByteRle => MirDataType::Byte,
            MirDataType::IntegerRle => MirDataType::Integer,
            MirDataType::UIntegerRle => MirDataType::UInteger,
            MirDataType::LongRle => MirDataType::Long,
            MirDataType::RealRle => MirDataType::Real,
            MirDataType::DoubleRle => MirDataType::Double,
            other => *other,
        }
    }

    /// Bytes per stored value. Bit cells occupy one byte once expanded.
    pub fn cell_size(&self) -> usize {
        match self.uncompressed() {
            MirDataType::Bit | MirDataType::Byte => 1,
            MirDataType::Integer | MirDataType::UInteger => 2,
            MirDataType::Long | MirDataType::Real => 4,
            MirDataType::Double => 8,
            _ => unreachable!(),
        }
    }
}

/// A single MiraMon band and its open IMG file.
pub struct MirBand {
    band_section: String,
    raw_band_file_name: String,
    band_file_name: String,
    band_name: String,
    friendly_description: String,

    width: usize,
    height: usize,
    data_type: MirDataType,

    nodata: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    visu_min: Option<f64>,
    visu_max: Option<f64>,

    bounding_box: BoundingBox,
    geo_transform: GeoTransform,

    color_palette_ref: Option<String>,
    attribute_table_ref: Option<String>,

    reader: ByteOrderReader<BufReader<File>>,
    row_offsets: Vec<u64>,
}

impl MirBand {
    pub(crate) fn open(rel: &mut MirRel, section: &str) -> Result<MirBand, Error> {
        // Band file name: documented, or derived from the REL name in the
        // single-band case.
        let documented = rel
            .get_value_in(SECTION_ATTRIBUTE_DATA, section, KEY_NOM_FITXER)
            .unwrap_or_default();
        let (raw_band_file_name, band_file_name) = if documented.is_empty() {
            match rel.img_name_from_rel_name() {
                Some(name) => (
                    Path::new(&name)
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| name.clone()),
                    name,
                ),
                None => {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        format!(
                            "The REL file '{}' contains a documented band with no \
                             explicit name. Section [{}:{}].",
                            rel.rel_file_name(),
                            SECTION_ATTRIBUTE_DATA,
                            section
                        ),
                    ))
                }
            }
        } else {
            (documented.clone(), rel.resolve_path(&documented))
        };

        let band_name = Path::new(&raw_band_file_name)
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| raw_band_file_name.clone());

        let width = tech_int(rel, section, "columns").ok_or_else(|| {
            Error::new(ErrorKind::InvalidData, "No number of columns documented")
        })?;
        let height = tech_int(rel, section, "rows").ok_or_else(|| {
            Error::new(ErrorKind::InvalidData, "No number of rows documented")
        })?;
        if width == 0 || height == 0 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "Band dimensions must be positive",
            ));
        }

        let compression = rel
            .get_value_in(SECTION_ATTRIBUTE_DATA, section, "TipusCompressio")
            .unwrap_or_default();
        let data_type = MirDataType::from_compression_type(&compression).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidData,
                format!("Unhandled band data type '{}'", compression),
            )
        })?;

        let nodata = rel
            .get_value_in(SECTION_ATTRIBUTE_DATA, section, "NODATA")
            .and_then(|v| v.parse::<f64>().ok());

        let layered = format!("{}:{}", SECTION_ATTRIBUTE_DATA, section);
        let mut min = rel
            .get_value(&layered, "min")
            .and_then(|v| v.parse::<f64>().ok());
        let mut max = rel
            .get_value(&layered, "max")
            .and_then(|v| v.parse::<f64>().ok());
        // An inverted range is treated as undocumented.
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                min = None;
                max = None;
            }
        }

        let visu_min = rel
            .get_value_in(SECTION_COLOR_TEXT, section, "Color_ValorColor_0")
            .and_then(|v| v.parse::<f64>().ok())
            .or(min);
        let visu_max = rel
            .get_value_in(SECTION_COLOR_TEXT, section, "Color_ValorColor_n_1")
            .and_then(|v| v.parse::<f64>().ok())
            .or(max);

        let friendly_description = rel
            .get_value_in(SECTION_ATTRIBUTE_DATA, section, "descriptor")
            .unwrap_or_default();

        let color_palette_ref = rel
            .get_value_in(SECTION_COLOR_TEXT, section, "Color_Paleta")
            .filter(|v| !v.is_empty());
        let attribute_table_ref = rel
            .get_value_in(SECTION_ATTRIBUTE_DATA, section, "IndexsJoinTaula")
            .filter(|v| !v.is_empty());

        let bounding_box = read_extent(rel, section, width, height);
        let geo_transform = GeoTransform::from_bounds(&bounding_box, width, height);

        let file = File::open(&band_file_name).map_err(|e| {
            Error::new(
                e.kind(),
                format!(
                    "Failed to open MiraMon band file `{}': {}",
                    band_file_name, e
                ),
            )
        })?;
        let reader = ByteOrderReader::new(BufReader::new(file), Endianness::LittleEndian)?;

        Ok(MirBand {
            band_section: section.to_string(),
            raw_band_file_name: raw_band_file_name,
            band_file_name: band_file_name,
            band_name: band_name,
            friendly_description: friendly_description,
            width: width,
            height: height,
            data_type: data_type,
            nodata: nodata,
            min: min,
            max: max,
            visu_min: visu_min,
            visu_max: visu_max,
            bounding_box: bounding_box,
            geo_transform: geo_transform,
            color_palette_ref: color_palette_ref,
            attribute_table_ref: attribute_table_ref,
            reader: reader,
            row_offsets: vec![],
        })
    }

    pub fn band_section(&self) -> &str {
        &self.band_section
    }

    pub fn raw_band_file_name(&self) -> &str {
        &self.raw_band_file_name
    }

    pub fn band_file_name(&self) -> &str {
        &self.band_file_name
    }

    pub fn band_name(&self) -> &str {
        &self.band_name
    }

    pub fn friendly_description(&self) -> &str {
        &self.friendly_description
    }

    pub fn data_type(&self) -> MirDataType {
        self.data_type
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn visu_min(&self) -> Option<f64> {
        self.visu_min
    }

    pub fn visu_max(&self) -> Option<f64> {
        self.visu_max
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    pub fn color_palette_ref(&self) -> Option<&str> {
        self.color_palette_ref.as_deref()
    }

    pub fn attribute_table_ref(&self) -> Option<&str> {
        self.attribute_table_ref.as_deref()
    }

    /// Reads one row and widens every cell to f64. `values` must hold
    /// exactly `width` entries. Bit rows are expanded to one value per cell.
    pub fn read_row_f64(&mut self, row: usize, values: &mut [f64]) -> Result<(), Error> {
        if values.len() != self.width {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Row buffer length does not match the band width.",
            ));
        }
        let raw = self.read_row_raw(row)?;
        match self.data_type.uncompressed() {
            MirDataType::Bit => {
                for (i, value) in values.iter_mut().enumerate() {
                    *value = ((raw[i / 8] >> (i % 8)) & 1) as f64;
                }
            }
            MirDataType::Byte => {
                for (i, value) in values.iter_mut().enumerate() {
                    *value = raw[i] as f64;
                }
            }
            MirDataType::Integer => {
                for (i, value) in values.iter_mut().enumerate() {
                    *value = i16::from_le_bytes([raw[2 * i], raw[2 * i + 1]]) as f64;
                }
            }
            MirDataType::UInteger => {
                for (i, value) in values.iter_mut().enumerate() {
                    *value = u16::from_le_bytes([raw[2 * i], raw[2 * i + 1]]) as f64;
                }
            }
            MirDataType::Long => {
                for (i, value) in values.iter_mut().enumerate() {
                    let b = [raw[4 * i], raw[4 * i + 1], raw[4 * i + 2], raw[4 * i + 3]];
                    *value = i32::from_le_bytes(b) as f64;
                }
            }
            MirDataType::Real => {
                for (i, value) in values.iter_mut().enumerate() {
                    let b = [raw[4 * i], raw[4 * i + 1], raw[4 * i + 2], raw[4 * i + 3]];
                    *value = f32::from_le_bytes(b) as f64;
                }
            }
            MirDataType::Double => {
                for (i, value) in values.iter_mut().enumerate() {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(&raw[8 * i..8 * i + 8]);
                    *value = f64::from_le_bytes(b);
                }
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Reads one decoded row as raw little-endian bytes. For the bit type the
    /// row stays packed at eight cells per byte.
    pub fn read_row_raw(&mut self, row: usize) -> Result<Vec<u8>, Error> {
        if row >= self.height {
            return Err(Error::new(ErrorKind::InvalidInput, "Row index out of range."));
        }

        self.fill_row_offsets()?;
        self.reader.seek(self.row_offsets[row])?;

        match self.data_type {
            MirDataType::Bit => {
                let mut raw = vec![0u8; (self.width + 7) / 8];
                self.reader.read_exact(&mut raw)?;
                Ok(raw)
            }
            t if !t.is_rle() => {
                let mut raw = vec![0u8; self.width * t.cell_size()];
                self.reader.read_exact(&mut raw)?;
                Ok(raw)
            }
            t => {
                // The compressed size of the last row is never known; it is
                // decoded byte by byte.
                let compressed_size = if row + 1 < self.height {
                    Some((self.row_offsets[row + 1] - self.row_offsets[row]) as usize)
                } else {
                    None
                };
                self.uncompress_row(t.cell_size(), compressed_size)
            }
        }
    }

    /// Decodes one RLE row into `width` cells of `cell_size` bytes each.
    ///
    /// Codes are: a non-zero count byte followed by one value repeated that
    /// many times, or a zero count byte followed by a literal count and that
    /// many verbatim values. A row producing more than `width` cells is
    /// malformed.
    fn uncompress_row(
        &mut self,
        cell_size: usize,
        compressed_size: Option<usize>,
    ) -> Result<Vec<u8>, Error> {
        let width = self.width;
        let mut row = vec![0u8; width * cell_size];
        let mut produced = 0usize;

        let compressed: Option<Vec<u8>> = match compressed_size {
            Some(n) => {
                let mut buffer = vec![0u8; n];
                self.reader.read_exact(&mut buffer)?;
                Some(buffer)
            }
            None => None,
        };
        let mut index = 0usize;

        let overshoot =
            || Error::new(ErrorKind::InvalidData, "RLE row produced more cells than the row holds");
        let truncated =
            || Error::new(ErrorKind::InvalidData, "RLE row ended before the row was complete");

        let mut value = vec![0u8; cell_size];
        while produced < width {
            let counter = match &compressed {
                Some(buffer) => {
                    let c = *buffer.get(index).ok_or_else(truncated)?;
                    index += 1;
                    c
                }
                None => self.reader.read_u8()?,
            };

            if counter == 0 {
                // Not a run: the next byte counts verbatim values.
                let literal = match &compressed {
                    Some(buffer) => {
                        let c = *buffer.get(index).ok_or_else(truncated)?;
                        index += 1;
                        c
                    }
                    None => self.reader.read_u8()?,
                } as usize;

                if produced + literal > width {
                    return Err(overshoot());
                }
                for _ in 0..literal {
                    match &compressed {
                        Some(buffer) => {
                            if index + cell_size > buffer.len() {
                                return Err(truncated());
                            }
                            row[produced * cell_size..(produced + 1) * cell_size]
                                .copy_from_slice(&buffer[index..index + cell_size]);
                            index += cell_size;
                        }
                        None => {
                            self.reader.read_exact(
                                &mut row[produced * cell_size..(produced + 1) * cell_size],
                            )?;
                        }
                    }
                    produced += 1;
                }
            } else {
                let count = counter as usize;
                if produced + count > width {
                    return Err(overshoot());
                }
                match &compressed {
                    Some(buffer) => {
                        if index + cell_size > buffer.len() {
                            return Err(truncated());
                        }
                        value.copy_from_slice(&buffer[index..index + cell_size]);
                        index += cell_size;
                    }
                    None => {
                        self.reader.read_exact(&mut value)?;
                    }
                }
                for _ in 0..count {
                    row[produced * cell_size..(produced + 1) * cell_size]
                        .copy_from_slice(&value);
                    produced += 1;
                }
            }
        }

        Ok(row)
    }

    /// Locates or reconstructs the byte offset of every row. Offsets are
    /// computed directly for fixed-width types; RLE bands use the row-offsets
    /// trailer when the file carries one and otherwise decode the whole file
    /// once, recording the position ahead of each row.
    fn fill_row_offsets(&mut self) -> Result<(), Error> {
        if !self.row_offsets.is_empty() {
            return Ok(());
        }

        let height = self.height;
        let mut offsets = vec![0u64; height + 1];

        match self.data_type {
            MirDataType::Bit => {
                let row_bytes = ((self.width + 7) / 8) as u64;
                for (row, offset) in offsets.iter_mut().enumerate() {
                    *offset = row as u64 * row_bytes;
                }
            }
            t if !t.is_rle() => {
                let row_bytes = (self.width * t.cell_size()) as u64;
                for (row, offset) in offsets.iter_mut().enumerate() {
                    *offset = row as u64 * row_bytes;
                }
            }
            t => {
                match self.position_at_row_offsets()? {
                    Some(offset_size) => {
                        let file_len = self.reader.len();
                        for row in 0..height {
                            let offset = match offset_size {
                                1 => self.reader.read_u8()? as u64,
                                2 => self.reader.read_u16()? as u64,
                                4 => self.reader.read_u32()? as u64,
                                _ => self.reader.read_u64()?,
                            };
                            if offset >= file_len
                                || (row > 0 && offset <= offsets[row - 1])
                            {
                                return Err(Error::new(
                                    ErrorKind::InvalidData,
                                    "Inconsistent row offsets in IMG trailer",
                                ));
                            }
                            offsets[row] = offset;
                        }
                    }
                    None => {
                        // No index in the file: build one by decoding every
                        // row once from the start.
                        let cell_size = t.cell_size();
                        self.reader.seek(0)?;
                        offsets[0] = 0;
                        for row in 1..=height {
                            self.uncompress_row(cell_size, None)?;
                            offsets[row] = self.reader.pos();
                        }
                    }
                }
                // The end-of-data position is never trusted.
                offsets[height] = u64::MAX;
            }
        }

        self.row_offsets = offsets;
        Ok(())
    }

    /// Walks the IMG trailer to the row-offsets section. On success the
    /// reader is left at the first offset and the declared offset width is
    /// returned; any structural mismatch means the file carries no usable
    /// index.
    fn position_at_row_offsets(&mut self) -> Result<Option<u32>, Error> {
        let file_len = self.reader.len();
        let height = self.height as u64;

        if file_len < 32 || file_len < 32 + height + 32 {
            return Ok(None);
        }

        // Terminal marker: 16 zero bytes, then "IMG x.y", then the offset of
        // the first section header.
        self.reader.seek(file_len - 32)?;
        let mut zeros = [0u8; 16];
        if self.reader.read_exact(&mut zeros).is_err() || zeros.iter().any(|b| *b != 0) {
            return Ok(None);
        }
        if !self.read_img_version_tag()? {
            return Ok(None);
        }
        let mut header_offset = match self.reader.read_u64() {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };

        // Walk the section-header chain looking for type 2 (row offsets).
        loop {
            if header_offset >= file_len || self.reader.seek(header_offset).is_err() {
                return Ok(None);
            }
            if !self.read_img_version_tag()? {
                return Ok(None);
            }
            let section_type = match self.reader.read_u32() {
                Ok(v) => v,
                Err(_) => return Ok(None),
            };
            if section_type == 2 {
                break;
            }

            // Not the section we want; follow its next-header offset.
            let next_pos = self.reader.pos() + 12;
            if self.reader.seek(next_pos).is_err() {
                return Ok(None);
            }
            header_offset = match self.reader.read_u64() {
                Ok(v) => v,
                Err(_) => return Ok(None),
            };
            if header_offset == 0 {
                return Ok(None);
            }
        }

        // A plausible RLE stream needs at least two bytes per row ahead of
        // the index.
        if header_offset < height * 2 {
            return Ok(None);
        }

        let offset_size = match self.reader.read_u32() {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };
        if offset_size != 1 && offset_size != 2 && offset_size != 4 && offset_size != 8 {
            return Ok(None);
        }

        // 8 reserved bytes ahead of the offsets themselves.
        let offsets_pos = self.reader.pos() + 8;
        if offsets_pos + offset_size as u64 * height > file_len
            || self.reader.seek(offsets_pos).is_err()
        {
            return Ok(None);
        }

        Ok(Some(offset_size))
    }

    // Reads the 8-byte "IMG x.y" tag; major version must be 1.
    fn read_img_version_tag(&mut self) -> Result<bool, Error> {
        let mut tag = [0u8; 8];
        if self.reader.read_exact(&mut tag).is_err() {
            return Ok(false);
        }
        Ok(&tag[0..4] == b"IMG " && tag[4] == b'1' && tag[5] == b'.' && tag[6].is_ascii_digit())
    }
}

impl RasterSource for MirBand {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn read_row_i64(&mut self, row: usize, values: &mut [i64]) -> Result<(), Error> {
        let mut buffer = vec![0f64; self.width];
        self.read_row_f64(row, &mut buffer)?;
        for (value, v) in values.iter_mut().zip(buffer.iter()) {
            *value = v.round() as i64;
        }
        Ok(())
    }

    fn read_row_f32(&mut self, row: usize, values: &mut [f32]) -> Result<(), Error> {
        let mut buffer = vec![0f64; self.width];
        self.read_row_f64(row, &mut buffer)?;
        for (value, v) in values.iter_mut().zip(buffer.iter()) {
            *value = *v as f32;
        }
        Ok(())
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        Some(self.geo_transform)
    }
}

impl MaskSource for MirBand {
    fn read_row(&mut self, row: usize, values: &mut [u8]) -> Result<(), Error> {
        let mut buffer = vec![0f64; self.width];
        self.read_row_f64(row, &mut buffer)?;
        for (value, v) in values.iter_mut().zip(buffer.iter()) {
            *value = *v as u8;
        }
        Ok(())
    }
}

// [ATTRIBUTE_DATA:xxxx] or [OVERVIEW:ASPECTES_TECNICS]
fn tech_int(rel: &mut MirRel, section: &str, key: &str) -> Option<usize> {
    let value = match rel.get_value_in(SECTION_ATTRIBUTE_DATA, section, key) {
        Some(v) if !v.is_empty() => v,
        _ => rel.get_value_in(SECTION_OVERVIEW, SECTION_ASPECTES_TECNICS, key)?,
    };
    value.trim().parse::<usize>().ok()
}

// [ATTRIBUTE_DATA:xxxx:EXTENT] or [EXTENT]; missing corners default to the
// pixel-space box.
fn read_extent(rel: &mut MirRel, section: &str, width: usize, height: usize) -> BoundingBox {
    let corner = |rel: &mut MirRel, key: &str, default: f64| -> f64 {
        rel.get_value_nested(SECTION_ATTRIBUTE_DATA, section, SECTION_EXTENT, key)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(default)
    };
    let min_x = corner(rel, "MinX", 0f64);
    let max_x = corner(rel, "MaxX", width as f64);
    let min_y = corner(rel, "MinY", 0f64);
    let max_y = corner(rel, "MaxY", height as f64);
    BoundingBox::new(min_x, max_x, min_y, max_y)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_rel(dir: &PathBuf, stem: &str, img: &str, compression: &str, w: usize, h: usize) -> String {
        let rel_path = dir.join(format!("{}I.rel", stem));
        let mut f = fs::File::create(&rel_path).unwrap();
        write!(
            f,
            "[ATTRIBUTE_DATA]\nIndexesNomsCamps=1\nNomCamp_1=G1\n\
             [ATTRIBUTE_DATA:G1]\nNomFitxer={}\ncolumns={}\nrows={}\n\
             TipusCompressio={}\nNODATA=255\n\
             [ATTRIBUTE_DATA:G1:EXTENT]\nMinX=0\nMaxX={}\nMinY=0\nMaxY={}\n",
            img, w, h, compression, w, h
        )
        .unwrap();
        rel_path.to_string_lossy().to_string()
    }

    // The canonical run-length encoder: maximal runs of up to 255 repeats.
    fn rle_encode_row(values: &[u8]) -> Vec<u8> {
        let mut encoded = vec![];
        let mut i = 0;
        while i < values.len() {
            let mut run = 1usize;
            while i + run < values.len() && values[i + run] == values[i] && run < 255 {
                run += 1;
            }
            encoded.push(run as u8);
            encoded.push(values[i]);
            i += run;
        }
        encoded
    }

    fn append_offsets_trailer(img: &mut Vec<u8>, offsets: &[u64]) {
        // Row-offsets section: tag, type 2, offset size, 8 reserved bytes,
        // then one 4-byte offset per row.
        let section_start = img.len() as u64;
        img.extend_from_slice(b"IMG 1.0\0");
        img.extend_from_slice(&2u32.to_le_bytes());
        img.extend_from_slice(&4u32.to_le_bytes());
        img.extend_from_slice(&[0u8; 8]);
        for offset in offsets {
            img.extend_from_slice(&(*offset as u32).to_le_bytes());
        }
        // Terminal marker.
        img.extend_from_slice(&[0u8; 16]);
        img.extend_from_slice(b"IMG 1.0\0");
        img.extend_from_slice(&section_start.to_le_bytes());
    }

    #[test]
    fn reads_uncompressed_byte_rows() {
        let dir = temp_dir("mir_band_plain");
        fs::write(dir.join("band.img"), [1u8, 2, 3, 4, 5, 6]).unwrap();
        let rel = write_rel(&dir, "band", "band.img", "byte", 3, 2);

        let mut rel = MirRel::open(&rel).unwrap();
        let band = rel.band_mut(0).unwrap();
        assert_eq!(band.data_type(), MirDataType::Byte);
        assert_eq!(band.nodata(), Some(255f64));

        let mut row = [0f64; 3];
        band.read_row_f64(1, &mut row).unwrap();
        assert_eq!(row, [4f64, 5f64, 6f64]);
        band.read_row_f64(0, &mut row).unwrap();
        assert_eq!(row, [1f64, 2f64, 3f64]);
    }

    #[test]
    fn rle_round_trips_through_the_canonical_encoder() {
        let dir = temp_dir("mir_band_rle");
        let rows: Vec<Vec<u8>> = vec![
            vec![7; 300].into_iter().chain(vec![1, 2, 3]).collect(),
            vec![0; 303],
            (0..=255u8).cycle().take(303).collect(),
        ];
        let mut img = vec![];
        for row in &rows {
            img.extend_from_slice(&rle_encode_row(row));
        }
        fs::write(dir.join("band.img"), &img).unwrap();
        let rel = write_rel(&dir, "band", "band.img", "byte-RLE", 303, 3);

        let mut rel = MirRel::open(&rel).unwrap();
        let band = rel.band_mut(0).unwrap();
        let mut row = vec![0f64; 303];
        for (i, expected) in rows.iter().enumerate() {
            band.read_row_f64(i, &mut row).unwrap();
            let expected: Vec<f64> = expected.iter().map(|v| *v as f64).collect();
            assert_eq!(row, expected);
        }
    }

    #[test]
    fn trailer_offsets_agree_with_dynamic_reconstruction() {
        let dir = temp_dir("mir_band_trailer");
        let rows: Vec<Vec<u8>> = vec![vec![9; 40], vec![3; 20].into_iter().chain(vec![4; 20]).collect(), vec![1; 40]];

        let mut img = vec![];
        let mut offsets = vec![];
        for row in &rows {
            offsets.push(img.len() as u64);
            img.extend_from_slice(&rle_encode_row(row));
        }
        let mut indexed = img.clone();
        append_offsets_trailer(&mut indexed, &offsets);
        fs::write(dir.join("indexed.img"), &indexed).unwrap();
        fs::write(dir.join("plain.img"), &img).unwrap();
        let rel_indexed = write_rel(&dir, "indexed", "indexed.img", "byte-RLE", 40, 3);
        let rel_plain = write_rel(&dir, "plain", "plain.img", "byte-RLE", 40, 3);

        let mut rel_indexed = MirRel::open(&rel_indexed).unwrap();
        let mut rel_plain = MirRel::open(&rel_plain).unwrap();
        let mut a = vec![0f64; 40];
        let mut b = vec![0f64; 40];
        // Read in reverse order so the indexed band must really seek.
        for row in (0..3).rev() {
            rel_indexed.band_mut(0).unwrap().read_row_f64(row, &mut a).unwrap();
            rel_plain.band_mut(0).unwrap().read_row_f64(row, &mut b).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn rle_overshoot_aborts_the_row() {
        // 03 05 00 02 07 09 02 FF decodes to [5,5,5,7,9,FF,FF]: seven cells.
        let encoded: [u8; 8] = [0x03, 0x05, 0x00, 0x02, 0x07, 0x09, 0x02, 0xff];

        let dir = temp_dir("mir_band_overshoot");
        fs::write(dir.join("band.img"), encoded).unwrap();
        let rel = write_rel(&dir, "band", "band.img", "byte-RLE", 6, 1);
        let mut rel = MirRel::open(&rel).unwrap();
        let mut row = vec![0f64; 6];
        assert!(rel.band_mut(0).unwrap().read_row_f64(0, &mut row).is_err());

        let dir = temp_dir("mir_band_no_overshoot");
        fs::write(dir.join("band.img"), encoded).unwrap();
        let rel = write_rel(&dir, "band", "band.img", "byte-RLE", 7, 1);
        let mut rel = MirRel::open(&rel).unwrap();
        let mut row = vec![0f64; 7];
        rel.band_mut(0).unwrap().read_row_f64(0, &mut row).unwrap();
        assert_eq!(row, [5f64, 5f64, 5f64, 7f64, 9f64, 255f64, 255f64]);
    }

    #[test]
    fn bit_rows_expand_lsb_first() {
        let dir = temp_dir("mir_band_bit");
        // Row of 10 cells: bytes 0b00000101, 0b00000010.
        fs::write(dir.join("band.img"), [0b0000_0101u8, 0b0000_0010]).unwrap();
        let rel = write_rel(&dir, "band", "band.img", "bit", 10, 1);

        let mut rel = MirRel::open(&rel).unwrap();
        let mut row = vec![0f64; 10];
        rel.band_mut(0).unwrap().read_row_f64(0, &mut row).unwrap();
        assert_eq!(row, [1f64, 0f64, 1f64, 0f64, 0f64, 0f64, 0f64, 0f64, 0f64, 1f64]);
    }

    #[test]
    fn non_monotone_trailer_offsets_are_rejected() {
        let dir = temp_dir("mir_band_bad_offsets");
        let rows: Vec<Vec<u8>> = vec![vec![9; 8], vec![3; 8], vec![1; 8]];
        let mut img = vec![];
        let mut offsets = vec![];
        for row in &rows {
            offsets.push(img.len() as u64);
            img.extend_from_slice(&rle_encode_row(row));
        }
        offsets.swap(1, 2);
        append_offsets_trailer(&mut img, &offsets);
        fs::write(dir.join("band.img"), &img).unwrap();
        let rel = write_rel(&dir, "band", "band.img", "byte-RLE", 8, 3);

        let mut rel = MirRel::open(&rel).unwrap();
        let mut row = vec![0f64; 8];
        assert!(rel.band_mut(0).unwrap().read_row_f64(0, &mut row).is_err());
    }

    #[test]
    fn reads_integer_rle_values() {
        let dir = temp_dir("mir_band_i16");
        // Two runs: 3 x -5, then a literal block of 2 values.
        let mut img = vec![3u8];
        img.extend_from_slice(&(-5i16).to_le_bytes());
        img.push(0);
        img.push(2);
        img.extend_from_slice(&(1000i16).to_le_bytes());
        img.extend_from_slice(&(-1000i16).to_le_bytes());
        fs::write(dir.join("band.img"), &img).unwrap();
        let rel = write_rel(&dir, "band", "band.img", "integer-RLE", 5, 1);

        let mut rel = MirRel::open(&rel).unwrap();
        let mut row = vec![0f64; 5];
        rel.band_mut(0).unwrap().read_row_f64(0, &mut row).unwrap();
        assert_eq!(row, [-5f64, -5f64, -5f64, 1000f64, -1000f64]);
    }

    #[test]
    fn geotransform_derives_from_the_extent() {
        let dir = temp_dir("mir_band_georef");
        fs::write(dir.join("band.img"), [0u8; 4]).unwrap();
        let rel_path = dir.join("bandI.rel");
        fs::write(
            &rel_path,
            "[ATTRIBUTE_DATA]\nIndexesNomsCamps=1\nNomCamp_1=G1\n\
             [ATTRIBUTE_DATA:G1]\nNomFitxer=band.img\ncolumns=2\nrows=2\n\
             TipusCompressio=byte\n\
             [ATTRIBUTE_DATA:G1:EXTENT]\nMinX=100\nMaxX=300\nMinY=50\nMaxY=250\n",
        )
        .unwrap();

        let rel = MirRel::open(&rel_path.to_string_lossy()).unwrap();
        let band = rel.band(0).unwrap();
        let gt = band.geo_transform;
        assert_eq!(gt.x0, 100f64);
        assert_eq!(gt.dx_col, 100f64);
        assert_eq!(gt.y0, 250f64);
        assert_eq!(gt.dy_row, -100f64);
    }
}
