/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 29/03/2025
Last Modified: 08/07/2025
License: MIT

Notes: Creates a polygon coverage from raster data: every connected region
of cells sharing a common value becomes one feature, with an optional
attribute carrying the cell value. The first pass enumerates polygons to
learn the final id map; the second pass re-enumerates and traces the edges,
emitting each polygon as soon as a row passes without touching it, so memory
stays proportional to the active polygons rather than the raster.
*/
use rastervec_common::structures::GeoTransform;
use rastervec_common::utils::ProgressReporter;
use rastervec_raster::miramon::MirRel;
use rastervec_raster::{MaskSource, RasterSource};
use rastervec_vector::PolygonLayer;
use std::io::{Error, ErrorKind};
use std::mem;

use crate::enumerator::{CellValue, PolygonEnumerator};
use crate::polygonizer::{LayerWriter, Polygonizer, TwoArm, OUTER_POLYGON_ID};

/// Which cells count as neighbours: edge-adjacent only, or edge- and
/// corner-adjacent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectedness {
    Four,
    Eight,
}

impl Default for Connectedness {
    fn default() -> Connectedness {
        Connectedness::Four
    }
}

/// Options accepted by `polygonize` and `fpolygonize`.
#[derive(Clone, Debug, Default)]
pub struct PolygonizeOptions {
    pub connectedness: Connectedness,
    /// An explicit affine transform for the emitted vertices. Overrides
    /// everything else.
    pub geo_transform: Option<GeoTransform>,
    /// Name of a MiraMon dataset to borrow the geotransform from. Useful
    /// when the source band has no georeferencing of its own, which is
    /// typical for mask bands.
    pub dataset_for_georef: Option<String>,
}

/// The scan's working cell type: how rows of the source are read into it.
pub trait WorkingType: CellValue {
    fn read_row<S: RasterSource + ?Sized>(
        source: &mut S,
        row: usize,
        values: &mut [Self],
    ) -> Result<(), Error>
    where
        Self: Sized;
}

impl WorkingType for i64 {
    fn read_row<S: RasterSource + ?Sized>(
        source: &mut S,
        row: usize,
        values: &mut [i64],
    ) -> Result<(), Error> {
        source.read_row_i64(row, values)
    }
}

impl WorkingType for f32 {
    fn read_row<S: RasterSource + ?Sized>(
        source: &mut S,
        row: usize,
        values: &mut [f32],
    ) -> Result<(), Error> {
        source.read_row_f32(row, values)
    }
}

/// Overwrites cells whose mask value is zero with the nodata marker.
pub(crate) fn mask_image_data<T: CellValue>(
    mask: &mut dyn MaskSource,
    mask_line: &mut [u8],
    row: usize,
    values: &mut [T],
) -> Result<(), Error> {
    mask.read_row(row, mask_line)?;
    for (value, mask_value) in values.iter_mut().zip(mask_line.iter()) {
        if *mask_value == 0 {
            *value = T::nodata_marker();
        }
    }
    Ok(())
}

pub(crate) fn user_interrupt() -> Error {
    Error::new(ErrorKind::Interrupted, "User terminated")
}

/// Vectorizes `source` into `layer`, reading cell values as 64-bit integers
/// with bitwise equality. Floating-point bands should prefer `fpolygonize`.
pub fn polygonize<S, K, P>(
    source: &mut S,
    mask: Option<&mut dyn MaskSource>,
    layer: &mut K,
    pix_val_field: Option<usize>,
    options: &PolygonizeOptions,
    progress: &mut P,
) -> Result<(), Error>
where
    S: RasterSource,
    K: PolygonLayer,
    P: ProgressReporter,
{
    polygonize_t::<i64, S, K, P>(source, mask, layer, pix_val_field, options, progress)
}

/// Vectorizes `source` into `layer`, reading cell values as 32-bit floats
/// compared within 10 ULPs.
pub fn fpolygonize<S, K, P>(
    source: &mut S,
    mask: Option<&mut dyn MaskSource>,
    layer: &mut K,
    pix_val_field: Option<usize>,
    options: &PolygonizeOptions,
    progress: &mut P,
) -> Result<(), Error>
where
    S: RasterSource,
    K: PolygonLayer,
    P: ProgressReporter,
{
    polygonize_t::<f32, S, K, P>(source, mask, layer, pix_val_field, options, progress)
}

fn polygonize_t<T, S, K, P>(
    source: &mut S,
    mut mask: Option<&mut dyn MaskSource>,
    layer: &mut K,
    pix_val_field: Option<usize>,
    options: &PolygonizeOptions,
    progress: &mut P,
) -> Result<(), Error>
where
    T: WorkingType,
    S: RasterSource,
    K: PolygonLayer,
    P: ProgressReporter,
{
    if !layer.test_sequential_write() {
        return Err(Error::new(
            ErrorKind::Unsupported,
            "Output feature layer does not appear to support creation of features.",
        ));
    }

    let width = source.width();
    let height = source.height();
    if width == 0 || height == 0 {
        return Err(Error::new(ErrorKind::InvalidInput, "Empty raster"));
    }

    let geo_transform = resolve_geo_transform(source, options);

    let mut last_vals = vec![T::nodata_marker(); width];
    let mut this_vals = vec![T::nodata_marker(); width];
    let mut last_ids = vec![0i32; width];
    let mut this_ids = vec![0i32; width];
    let mut mask_line = vec![0u8; width];

    // The first pass over the raster is only used to build up the polygon id
    // map so we will know in advance what polygons are what on the second
    // pass.
    let mut first_enum = PolygonEnumerator::<T>::new(options.connectedness);

    for row in 0..height {
        T::read_row(source, row, &mut this_vals)?;
        if let Some(mask) = mask.as_deref_mut() {
            mask_image_data(mask, &mut mask_line, row, &mut this_vals)?;
        }

        if row == 0 {
            first_enum.process_line(None, &this_vals, None, &mut this_ids, width)?;
        } else {
            first_enum.process_line(
                Some(&last_vals),
                &this_vals,
                Some(&last_ids),
                &mut this_ids,
                width,
            )?;
        }

        mem::swap(&mut last_vals, &mut this_vals);
        mem::swap(&mut last_ids, &mut this_ids);

        if !progress.report(0.10 * (row + 1) as f64 / height as f64, "") {
            return Err(user_interrupt());
        }
    }

    first_enum.complete_merges();

    // A second enumerator redoes the same assignment so the first pass map
    // is preserved; the polygonizer collects the edges.
    let mut second_enum = PolygonEnumerator::<T>::new(options.connectedness);
    let mut polygonizer = Polygonizer::new(-1);
    let mut writer = LayerWriter::new(layer, pix_val_field, geo_transform);

    let mut last_arms = vec![TwoArm::outer(); width + 2];
    let mut this_arms = vec![TwoArm::default(); width + 2];

    for row in 0..=height {
        if row < height {
            T::read_row(source, row, &mut this_vals)?;
            if let Some(mask) = mask.as_deref_mut() {
                mask_image_data(mask, &mut mask_line, row, &mut this_vals)?;
            }
        }

        if row == height {
            // One virtual row below the raster closes every open polygon.
            for id in this_ids.iter_mut() {
                *id = OUTER_POLYGON_ID;
            }
        } else if row == 0 {
            second_enum.process_line(None, &this_vals, None, &mut this_ids, width)?;
        } else {
            second_enum.process_line(
                Some(&last_vals),
                &this_vals,
                Some(&last_ids),
                &mut this_ids,
                width,
            )?;
        }

        if row < height {
            // Map provisional ids through the first pass map; nodata stays
            // outside every polygon.
            for i in 0..width {
                last_ids[i] = if this_ids[i] == -1 {
                    -1
                } else {
                    first_enum.poly_id_map[this_ids[i] as usize]
                };
            }
            polygonizer.process_line(
                &last_ids,
                &last_vals,
                &mut this_arms,
                &mut last_arms,
                row as u32,
                width as u32,
                &mut writer,
            )?;
        } else {
            polygonizer.process_line(
                &this_ids,
                &last_vals,
                &mut this_arms,
                &mut last_arms,
                row as u32,
                width as u32,
                &mut writer,
            )?;
        }

        mem::swap(&mut last_vals, &mut this_vals);
        mem::swap(&mut last_ids, &mut this_ids);
        mem::swap(&mut last_arms, &mut this_arms);

        let fraction = (0.10 + 0.90 * (row + 1) as f64 / height as f64).min(1.0);
        if !progress.report(fraction, "") {
            return Err(user_interrupt());
        }
    }

    Ok(())
}

// Precedence: an explicit transform, then the named dataset, then the
// source's own georeferencing, then the identity.
fn resolve_geo_transform<S: RasterSource>(
    source: &S,
    options: &PolygonizeOptions,
) -> GeoTransform {
    if let Some(gt) = options.geo_transform {
        return gt;
    }
    if let Some(name) = &options.dataset_for_georef {
        if let Ok(rel) = MirRel::open(name) {
            if let Some(gt) = rel.band(0).and_then(|b| b.geo_transform()) {
                return gt;
            }
        }
        return GeoTransform::default();
    }
    source.geo_transform().unwrap_or_default()
}
