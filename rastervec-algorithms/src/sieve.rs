/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 12/04/2025
Last Modified: 08/07/2025
License: MIT

Notes: Removes raster polygons smaller than a threshold by rewriting their
cells with the value of their largest neighbour. Three enumeration passes:
one to size every polygon, one to find each polygon's biggest neighbour, and
one to apply the merges while writing the output. Memory use follows the
polygon count, not the raster size.
*/
use rastervec_common::utils::ProgressReporter;
use rastervec_raster::{MaskSource, RasterSink, RasterSource};
use std::io::{Error, ErrorKind};
use std::mem;

use crate::enumerator::{CellValue, PolygonEnumerator};
use crate::polygonize::{mask_image_data, user_interrupt, Connectedness};

/// Compare two neighbouring polygons, and update each one's biggest
/// neighbour if the other is larger than its current largest. No attempt is
/// made to restrict this to polygons below the threshold, nor to exclude
/// candidates that are themselves below it; that is resolved afterwards.
fn compare_neighbour(
    poly_id1: i32,
    poly_id2: i32,
    poly_id_map: &[i32],
    poly_value: &[i64],
    poly_sizes: &[usize],
    big_neighbour: &mut [i32],
) {
    if poly_id1 < 0 || poly_id2 < 0 {
        return;
    }

    // Work with the final merged polygon ids.
    let poly_id1 = poly_id_map[poly_id1 as usize];
    let poly_id2 = poly_id_map[poly_id2 as usize];

    if poly_id1 == poly_id2 {
        return;
    }

    // Nodata polygons do not need neighbours, and cannot be neighbours to
    // valid polygons.
    if poly_value[poly_id1 as usize].is_nodata() || poly_value[poly_id2 as usize].is_nodata() {
        return;
    }

    let current = big_neighbour[poly_id1 as usize];
    if current == -1 || poly_sizes[current as usize] < poly_sizes[poly_id2 as usize] {
        big_neighbour[poly_id1 as usize] = poly_id2;
    }

    let current = big_neighbour[poly_id2 as usize];
    if current == -1 || poly_sizes[current as usize] < poly_sizes[poly_id1 as usize] {
        big_neighbour[poly_id2 as usize] = poly_id1;
    }
}

/// Removes raster polygons smaller than `size_threshold` cells, replacing
/// their cells with the value of the largest neighbouring polygon whose own
/// final size reaches the threshold. Small polygons without such a neighbour
/// are left untouched, so polygons surrounded by nodata never change. Every
/// row of the source is written to `dest`, changed or not.
pub fn sieve_filter<S, D, P>(
    source: &mut S,
    mut mask: Option<&mut dyn MaskSource>,
    dest: &mut D,
    size_threshold: usize,
    connectedness: Connectedness,
    progress: &mut P,
) -> Result<(), Error>
where
    S: RasterSource,
    D: RasterSink,
    P: ProgressReporter,
{
    let width = source.width();
    let height = source.height();
    if width == 0 || height == 0 {
        return Err(Error::new(ErrorKind::InvalidInput, "Empty raster"));
    }

    let eight = connectedness == Connectedness::Eight;

    let mut last_vals = vec![0i64; width];
    let mut this_vals = vec![0i64; width];
    let mut last_ids = vec![0i32; width];
    let mut this_ids = vec![0i32; width];
    let mut write_vals = vec![0i64; width];
    let mut mask_line = vec![0u8; width];

    // The first pass over the raster builds the polygon id map and
    // accumulates polygon sizes.
    let mut first_enum = PolygonEnumerator::<i64>::new(connectedness);
    let mut poly_sizes: Vec<usize> = vec![];

    for row in 0..height {
        source.read_row_i64(row, &mut this_vals)?;
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

        if first_enum.num_polygons() as usize > poly_sizes.len() {
            poly_sizes.resize(first_enum.num_polygons() as usize, 0);
        }
        for id in this_ids.iter() {
            if *id >= 0 {
                poly_sizes[*id as usize] += 1;
            }
        }

        mem::swap(&mut last_vals, &mut this_vals);
        mem::swap(&mut last_ids, &mut this_ids);

        if !progress.report(0.25 * (row + 1) as f64 / height as f64, "") {
            return Err(user_interrupt());
        }
    }

    first_enum.complete_merges();

    // Push the sizes of merged polygon fragments into the merged polygon
    // id's count.
    for poly in 0..first_enum.num_polygons() as usize {
        let root = first_enum.poly_id_map[poly] as usize;
        if root != poly {
            poly_sizes[root] += poly_sizes[poly];
            poly_sizes[poly] = 0;
        }
    }

    // Second pass, with a fresh enumerator so the first pass map survives:
    // identify the largest neighbour of each polygon.
    let mut second_enum = PolygonEnumerator::<i64>::new(connectedness);
    let mut big_neighbour: Vec<i32> = vec![-1; poly_sizes.len()];

    for row in 0..height {
        source.read_row_i64(row, &mut this_vals)?;
        if let Some(mask) = mask.as_deref_mut() {
            mask_image_data(mask, &mut mask_line, row, &mut this_vals)?;
        }

        if row == 0 {
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

        // In-row comparisons flow left to right; cross-row comparisons use
        // the previous row only, since the next row will compare back to us.
        for x in 0..width {
            if row > 0 {
                compare_neighbour(
                    this_ids[x],
                    last_ids[x],
                    &first_enum.poly_id_map,
                    &first_enum.poly_value,
                    &poly_sizes,
                    &mut big_neighbour,
                );
                if x > 0 && eight {
                    compare_neighbour(
                        this_ids[x],
                        last_ids[x - 1],
                        &first_enum.poly_id_map,
                        &first_enum.poly_value,
                        &poly_sizes,
                        &mut big_neighbour,
                    );
                }
                if x < width - 1 && eight {
                    compare_neighbour(
                        this_ids[x],
                        last_ids[x + 1],
                        &first_enum.poly_id_map,
                        &first_enum.poly_value,
                        &poly_sizes,
                        &mut big_neighbour,
                    );
                }
            }
            if x > 0 {
                compare_neighbour(
                    this_ids[x],
                    this_ids[x - 1],
                    &first_enum.poly_id_map,
                    &first_enum.poly_value,
                    &poly_sizes,
                    &mut big_neighbour,
                );
            }
        }

        mem::swap(&mut last_vals, &mut this_vals);
        mem::swap(&mut last_ids, &mut this_ids);

        if !progress.report(0.25 + 0.25 * (row + 1) as f64 / height as f64, "") {
            return Err(user_interrupt());
        }
    }

    // Resolve merge targets. A polygon at or above the threshold stays; a
    // small polygon merges only into a neighbour that is itself at or above
    // the threshold, with no chasing through a chain of small neighbours.
    for poly in 0..poly_sizes.len() {
        if first_enum.poly_id_map[poly] as usize != poly {
            continue;
        }
        if first_enum.poly_value[poly].is_nodata() {
            continue;
        }
        if poly_sizes[poly] >= size_threshold {
            big_neighbour[poly] = -1;
            continue;
        }
        let neighbour = big_neighbour[poly];
        if neighbour == -1 {
            // Isolated small polygon; nothing to merge into.
            continue;
        }
        if poly_sizes[neighbour as usize] < size_threshold {
            big_neighbour[poly] = -1;
        }
    }

    // Third pass: apply the merges while writing the output. The second
    // enumerator is reused from scratch; the first pass maps survive.
    second_enum.clear();

    for row in 0..height {
        source.read_row_i64(row, &mut this_vals)?;
        write_vals.copy_from_slice(&this_vals);
        if let Some(mask) = mask.as_deref_mut() {
            mask_image_data(mask, &mut mask_line, row, &mut this_vals)?;
        }

        if row == 0 {
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

        for x in 0..width {
            if this_ids[x] < 0 {
                continue;
            }
            let this_poly = first_enum.poly_id_map[this_ids[x] as usize];
            if big_neighbour[this_poly as usize] != -1 {
                write_vals[x] =
                    first_enum.poly_value[big_neighbour[this_poly as usize] as usize];
            }
        }

        dest.write_row(row, &write_vals)?;

        mem::swap(&mut last_vals, &mut this_vals);
        mem::swap(&mut last_ids, &mut this_ids);

        if !progress.report(0.50 + 0.25 * (row + 1) as f64 / height as f64, "") {
            return Err(user_interrupt());
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use rastervec_common::utils::SilentProgress;
    use rastervec_raster::MemoryRaster;

    fn sieve_grid(
        rows: usize,
        columns: usize,
        data: Vec<i64>,
        threshold: usize,
        connectedness: Connectedness,
    ) -> MemoryRaster<i64> {
        let mut source = MemoryRaster::from_data(rows, columns, data).unwrap();
        let mut dest = MemoryRaster::new(rows, columns, 0i64);
        sieve_filter(
            &mut source,
            None,
            &mut dest,
            threshold,
            connectedness,
            &mut SilentProgress,
        )
        .unwrap();
        dest
    }

    #[test]
    fn single_cell_island_merges_into_its_surrounding() {
        let dest = sieve_grid(3, 3, vec![1, 1, 1, 1, 2, 1, 1, 1, 1], 2, Connectedness::Four);
        for row in 0..3 {
            assert_eq!(dest.get_row_data(row), &[1, 1, 1]);
        }
    }

    #[test]
    fn polygons_at_the_threshold_survive() {
        // The pair of 2s has exactly the threshold size.
        let dest = sieve_grid(3, 3, vec![1, 1, 1, 2, 2, 1, 1, 1, 1], 2, Connectedness::Four);
        assert_eq!(dest.get_row_data(1), &[2, 2, 1]);
    }

    #[test]
    fn small_polygons_merge_into_the_largest_neighbour() {
        // The lone 9 touches both the 1s (3 cells) and the 2s (4 cells); the
        // larger region wins.
        let dest = sieve_grid(
            2,
            4,
            vec![1, 9, 2, 2, 1, 1, 2, 2],
            3,
            Connectedness::Four,
        );
        assert_eq!(dest.get_row_data(0), &[1, 2, 2, 2]);
        assert_eq!(dest.get_row_data(1), &[1, 1, 2, 2]);
    }

    #[test]
    fn unmergeable_small_polygons_survive() {
        // Two small polygons whose only neighbours are each other: neither
        // reaches the threshold, so neither changes.
        let dest = sieve_grid(1, 2, vec![1, 2], 5, Connectedness::Four);
        assert_eq!(dest.get_row_data(0), &[1, 2]);
    }

    #[test]
    fn masked_cells_never_change() {
        let mut source = MemoryRaster::from_data(3, 3, vec![1, 1, 1, 1, 2, 1, 1, 1, 1]).unwrap();
        let mut mask = MemoryRaster::from_data(
            3,
            3,
            vec![1u8, 1, 1, 1, 0, 1, 1, 1, 1],
        )
        .unwrap();
        let mut dest = MemoryRaster::new(3, 3, 0i64);
        sieve_filter(
            &mut source,
            Some(&mut mask),
            &mut dest,
            2,
            Connectedness::Four,
            &mut SilentProgress,
        )
        .unwrap();
        // The masked centre keeps its original value.
        assert_eq!(dest.get_row_data(1), &[1, 2, 1]);
    }

    #[test]
    fn sieve_monotonicity_holds_on_a_noisy_grid() {
        // After sieving at threshold T, every surviving polygon either has
        // size >= T or had no neighbour of size >= T.
        let data = vec![
            5, 5, 5, 7, 7, //
            5, 3, 5, 7, 8, //
            5, 5, 5, 7, 7, //
            6, 6, 7, 7, 7, //
        ];
        let threshold = 3;
        let dest = sieve_grid(4, 5, data, threshold, Connectedness::Four);

        // Count the sizes of the surviving polygons.
        let mut source2 = dest.clone();
        let mut e = PolygonEnumerator::<i64>::new(Connectedness::Four);
        let mut last_vals = vec![0i64; 5];
        let mut this_vals = vec![0i64; 5];
        let mut last_ids = vec![0i32; 5];
        let mut this_ids = vec![0i32; 5];
        let mut sizes: Vec<usize> = vec![];
        for row in 0..4 {
            source2.read_row_i64(row, &mut this_vals).unwrap();
            if row == 0 {
                e.process_line(None, &this_vals, None, &mut this_ids, 5).unwrap();
            } else {
                e.process_line(Some(&last_vals), &this_vals, Some(&last_ids), &mut this_ids, 5)
                    .unwrap();
            }
            if e.num_polygons() as usize > sizes.len() {
                sizes.resize(e.num_polygons() as usize, 0);
            }
            for id in this_ids.iter() {
                sizes[*id as usize] += 1;
            }
            mem::swap(&mut last_vals, &mut this_vals);
            mem::swap(&mut last_ids, &mut this_ids);
        }
        e.complete_merges();
        let mut rolled = vec![0usize; sizes.len()];
        for (id, size) in sizes.iter().enumerate() {
            rolled[e.poly_id_map[id] as usize] += size;
        }

        // The 3, the 8 and the pair of 6s all merged into large neighbours;
        // every surviving polygon reaches the threshold.
        for (id, size) in rolled.iter().enumerate() {
            if e.poly_id_map[id] as usize != id || *size == 0 {
                continue;
            }
            assert!(
                *size >= threshold,
                "unexpected small polygon of value {} and size {}",
                e.poly_value[id],
                size
            );
        }
        assert_eq!(dest.get_row_data(3), &[5, 5, 7, 7, 7]);
    }
}
