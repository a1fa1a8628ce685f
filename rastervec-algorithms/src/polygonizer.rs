/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 22/03/2025
Last Modified: 08/07/2025
License: MIT

Notes: The two-arm-chains edge tracer, after Junhua Teng, Fahui Wang, Yu Liu:
"An Efficient Algorithm for Raster-to-Vector Data Conversion"
(https://doi.org/10.1080/10824000809480639). Every pixel corner carries up to
four in-flight arc endpoints (the two arms of the horizontal edge arriving
from the left and the two arms of the vertical edge arriving from above);
each corner is resolved by a twelve-case table over the solid/virtual state
of its four edges. A raster polygon is a list of arcs whose successor links
partition them into closed rings.
*/
use rastervec_common::structures::{GeoTransform, Point2D};
use rastervec_vector::{FieldData, PolygonGeometry, PolygonLayer};
use std::collections::BTreeMap;
use std::io::{Error, ErrorKind};

use crate::enumerator::CellValue;

pub type PolyId = i32;

/// The id of the unbounded polygon surrounding the raster. Keeping it a real
/// polygon lets the case table treat the border like any other corner.
pub const OUTER_POLYGON_ID: PolyId = i32::MAX;

/// A pixel-corner vertex as (row, column).
pub type Corner = (u32, u32);

/// A reference to one arc: the polygon that owns it and its index there.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct ArcRef {
    poly: PolyId,
    arc: u32,
}

struct ArcData {
    points: Vec<Corner>,
    // index of the next arc of the ring, within the owning polygon
    connection: u32,
    // does the arc traverse the ring with the polygon on its right
    follow_righthand: bool,
}

/// A raster polygon under construction: its arcs, and the bottom-right most
/// cell seen so far. Once a whole row passes without touching the polygon it
/// can no longer grow and is emitted.
pub struct RPolygon {
    bottom_right_row: u32,
    bottom_right_col: u32,
    arcs: Vec<ArcData>,
}

impl RPolygon {
    fn new() -> RPolygon {
        RPolygon {
            bottom_right_row: 0,
            bottom_right_col: 0,
            arcs: vec![],
        }
    }

    fn new_arc(&mut self, follow_righthand: bool) -> u32 {
        let index = self.arcs.len() as u32;
        self.arcs.push(ArcData {
            points: vec![],
            connection: index,
            follow_righthand: follow_righthand,
        });
        index
    }

    fn update_bottom_right(&mut self, row: u32, col: u32) {
        self.bottom_right_row = row;
        self.bottom_right_col = col;
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }

    pub fn arc_points(&self, index: usize) -> &[Corner] {
        &self.arcs[index].points
    }

    pub fn arc_connection(&self, index: usize) -> usize {
        self.arcs[index].connection as usize
    }

    pub fn arc_follows_righthand(&self, index: usize) -> bool {
        self.arcs[index].follow_righthand
    }
}

/// One column boundary of the current row: the up-to-four arc endpoints
/// passing through the bottom-right corner of the preceding cell, the
/// polygons meeting there, and whether the two edges arriving at the corner
/// are real boundaries or virtual.
#[derive(Clone, Copy, Debug, Default)]
pub struct TwoArm {
    row: u32,
    col: u32,

    poly_inside: PolyId,
    poly_above: PolyId,
    poly_left: PolyId,

    hor_outer: ArcRef,
    hor_inner: ArcRef,
    ver_inner: ArcRef,
    ver_outer: ArcRef,

    solid_horizontal: bool,
    solid_vertical: bool,
}

impl TwoArm {
    /// The state of the arms ahead of the first row: everything belongs to
    /// the outer polygon.
    pub fn outer() -> TwoArm {
        TwoArm {
            poly_inside: OUTER_POLYGON_ID,
            ..Default::default()
        }
    }
}

/// Receives each completed polygon together with its cell value.
pub trait PolygonReceiver<T> {
    fn receive(&mut self, polygon: &RPolygon, polygon_cell_value: T) -> Result<(), Error>;
}

/// Manages polygon storage and runs the edge-tracing scan. Active polygons
/// are keyed by id in a sorted map so the completion scan and the emission
/// order are deterministic.
pub struct Polygonizer {
    invalid_poly_id: PolyId,
    polygons: BTreeMap<PolyId, RPolygon>,
}

impl Polygonizer {
    pub fn new(invalid_poly_id: PolyId) -> Polygonizer {
        let mut polygons = BTreeMap::new();
        polygons.insert(OUTER_POLYGON_ID, RPolygon::new());
        Polygonizer {
            invalid_poly_id: invalid_poly_id,
            polygons: polygons,
        }
    }

    fn ensure_polygon(&mut self, id: PolyId) {
        self.polygons.entry(id).or_insert_with(RPolygon::new);
    }

    fn poly_mut(&mut self, id: PolyId) -> &mut RPolygon {
        self.polygons.get_mut(&id).expect("referenced polygon must exist")
    }

    fn new_arc(&mut self, poly: PolyId, follow_righthand: bool) -> ArcRef {
        let arc = self.poly_mut(poly).new_arc(follow_righthand);
        ArcRef { poly: poly, arc: arc }
    }

    fn connect(&mut self, arc: ArcRef, next: ArcRef) {
        debug_assert_eq!(arc.poly, next.poly);
        self.poly_mut(arc.poly).arcs[arc.arc as usize].connection = next.arc;
    }

    fn push_point(&mut self, arc: ArcRef, point: Corner) {
        self.poly_mut(arc.poly).arcs[arc.arc as usize].points.push(point);
    }

    /// Traces one row of corners. `this_line_ids` holds the final polygon id
    /// of every cell of the current row (or the invalid id for nodata);
    /// `last_line_vals` holds the previous row's cell values, from which
    /// completed polygons pick their reported value. Both arm slices are
    /// `cols + 2` long to cover the virtual border columns.
    pub fn process_line<T: Copy, R: PolygonReceiver<T>>(
        &mut self,
        this_line_ids: &[PolyId],
        last_line_vals: &[T],
        this_line_arms: &mut [TwoArm],
        last_line_arms: &mut [TwoArm],
        current_row: u32,
        cols: u32,
        receiver: &mut R,
    ) -> Result<(), Error> {
        // Leftmost corner: the left arm belongs to the outer polygon.
        this_line_arms[0].poly_inside = OUTER_POLYGON_ID;
        this_line_arms[1].row = current_row;
        this_line_arms[1].col = 0;
        this_line_arms[1].poly_inside = this_line_ids[0];
        self.ensure_polygon(this_line_ids[0]);
        self.process_corner(this_line_arms, last_line_arms, 1)?;

        for col in 1..cols as usize {
            let index = col + 1;
            this_line_arms[index].row = current_row;
            this_line_arms[index].col = col as u32;
            this_line_arms[index].poly_inside = this_line_ids[col];
            self.ensure_polygon(this_line_ids[col]);
            self.process_corner(this_line_arms, last_line_arms, index)?;
        }

        // Rightmost corner: both the current and the above arm are outside
        // the raster.
        let index = cols as usize + 1;
        this_line_arms[index].row = current_row;
        this_line_arms[index].col = cols;
        this_line_arms[index].poly_inside = OUTER_POLYGON_ID;
        last_line_arms[index].poly_inside = OUTER_POLYGON_ID;
        self.process_corner(this_line_arms, last_line_arms, index)?;

        // Polygons untouched by this row are complete: emit and destroy.
        let completed: Vec<PolyId> = self
            .polygons
            .iter()
            .filter(|(_, p)| p.bottom_right_row + 1 == current_row)
            .map(|(id, _)| *id)
            .collect();
        for id in completed {
            if id != self.invalid_poly_id {
                let polygon = &self.polygons[&id];
                receiver.receive(polygon, last_line_vals[polygon.bottom_right_col as usize])?;
            }
            self.polygons.remove(&id);
        }

        Ok(())
    }

    /// Resolves one corner from the solid/virtual state of the four edges
    /// meeting there. Bit order: above-vertical, left-horizontal,
    /// current-vertical, current-horizontal; of the sixteen combinations
    /// four would need an odd number of solid edges and cannot occur.
    fn process_corner(
        &mut self,
        this_line_arms: &mut [TwoArm],
        last_line_arms: &[TwoArm],
        index: usize,
    ) -> Result<(), Error> {
        let left = this_line_arms[index - 1];
        let above = last_line_arms[index];
        let mut current = this_line_arms[index];

        self.poly_mut(current.poly_inside)
            .update_bottom_right(current.row, current.col);
        current.solid_vertical = current.poly_inside != left.poly_inside;
        current.solid_horizontal = current.poly_inside != above.poly_inside;
        current.poly_above = above.poly_inside;
        current.poly_left = left.poly_inside;

        const CUR_HORIZ: u8 = 1 << 0;
        const CUR_VERT: u8 = 1 << 1;
        const LEFT: u8 = 1 << 2;
        const ABOVE: u8 = 1 << 3;

        let connection_type = (above.solid_vertical as u8) * ABOVE
            + (left.solid_horizontal as u8) * LEFT
            + (current.solid_vertical as u8) * CUR_VERT
            + (current.solid_horizontal as u8) * CUR_HORIZ;

        let point: Corner = (current.row, current.col);

        match connection_type {
            0 => {
                // no edges
            }
            3 => {
                // Down+right corner entering a polygon: start an inner pair
                // and an outer pair.
                current.ver_inner = self.new_arc(current.poly_inside, true);
                current.hor_inner = self.new_arc(current.poly_inside, false);
                self.connect(current.hor_inner, current.ver_inner);
                self.push_point(current.ver_inner, point);

                current.hor_outer = self.new_arc(above.poly_inside, true);
                current.ver_outer = self.new_arc(above.poly_inside, false);
                self.connect(current.ver_outer, current.hor_outer);
                self.push_point(current.hor_outer, point);
            }
            5 => {
                // Continue horizontal.
                current.hor_inner = left.hor_inner;
                current.hor_outer = left.hor_outer;
            }
            6 => {
                // Turn left-to-down.
                current.ver_inner = left.hor_outer;
                current.ver_outer = left.hor_inner;
                self.push_point(current.ver_inner, point);
                self.push_point(current.ver_outer, point);
            }
            7 => {
                // T-junction from the left.
                current.hor_outer = left.hor_outer;
                current.ver_outer = left.hor_inner;
                self.push_point(left.hor_inner, point);

                current.ver_inner = self.new_arc(current.poly_inside, true);
                current.hor_inner = self.new_arc(current.poly_inside, false);
                self.connect(current.hor_inner, current.ver_inner);
                self.push_point(current.ver_inner, point);
            }
            9 => {
                // Turn down-to-right.
                current.hor_outer = above.ver_inner;
                current.hor_inner = above.ver_outer;
                self.push_point(current.hor_outer, point);
                self.push_point(current.hor_inner, point);
            }
            10 => {
                // Continue vertical.
                current.ver_inner = above.ver_inner;
                current.ver_outer = above.ver_outer;
            }
            11 => {
                // T-junction from above.
                current.hor_outer = above.ver_inner;
                current.ver_outer = above.ver_outer;
                self.push_point(current.hor_outer, point);

                current.ver_inner = self.new_arc(current.poly_inside, true);
                current.hor_inner = self.new_arc(current.poly_inside, false);
                self.connect(current.hor_inner, current.ver_inner);
                self.push_point(current.ver_inner, point);
            }
            12 => {
                // Diagonal close with no outgoing edge.
                self.push_point(left.hor_outer, point);
                self.connect(left.hor_outer, above.ver_outer);

                self.push_point(above.ver_inner, point);
                self.connect(above.ver_inner, left.hor_inner);
            }
            13 => {
                // T-junction from both, horizontal out.
                self.push_point(left.hor_outer, point);
                self.connect(left.hor_outer, above.ver_outer);

                current.hor_outer = above.ver_inner;
                current.hor_inner = left.hor_inner;
                self.push_point(current.hor_outer, point);
            }
            14 => {
                // T-junction from both, vertical out.
                self.push_point(left.hor_outer, point);
                self.connect(left.hor_outer, above.ver_outer);

                current.ver_inner = above.ver_inner;
                current.ver_outer = left.hor_inner;
                self.push_point(current.ver_outer, point);
            }
            15 => {
                // Four-way junction, split per diagonal adjacency.
                if above.poly_left == current.poly_inside {
                    // The two pixels of the main diagonal are one polygon.
                    current.ver_inner = left.hor_outer;
                    current.hor_inner = above.ver_outer;
                    self.push_point(current.ver_inner, point);
                    self.push_point(current.hor_inner, point);
                } else {
                    self.push_point(left.hor_outer, point);
                    self.connect(left.hor_outer, above.ver_outer);

                    current.ver_inner = self.new_arc(current.poly_inside, true);
                    current.hor_inner = self.new_arc(current.poly_inside, false);
                    self.connect(current.hor_inner, current.ver_inner);
                    self.push_point(current.ver_inner, point);
                }

                if above.poly_inside == left.poly_inside {
                    // The two pixels of the secondary diagonal are one
                    // polygon.
                    self.connect(above.ver_inner, left.hor_inner);
                    self.push_point(above.ver_inner, point);

                    current.hor_outer = self.new_arc(above.poly_inside, true);
                    current.ver_outer = self.new_arc(above.poly_inside, false);
                    self.push_point(current.hor_outer, point);
                    self.connect(current.ver_outer, current.hor_outer);
                } else {
                    current.hor_outer = above.ver_inner;
                    current.ver_outer = left.hor_inner;
                    self.push_point(current.hor_outer, point);
                    self.push_point(current.ver_outer, point);
                }
            }
            _ => {
                // Masks 1, 2 and 4 would require an odd number of solid
                // edges at the corner.
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    "Impossible edge configuration at a pixel corner",
                ));
            }
        }

        this_line_arms[index] = current;
        Ok(())
    }
}

/// Builds features out of completed raster polygons and commits them to a
/// feature layer: rings are assembled by following arc successor links,
/// vertices mapped through the geotransform, and the cell value written to
/// the configured attribute field.
pub struct LayerWriter<'a, K: PolygonLayer> {
    layer: &'a mut K,
    pix_val_field: Option<usize>,
    geo_transform: GeoTransform,
}

impl<'a, K: PolygonLayer> LayerWriter<'a, K> {
    pub fn new(
        layer: &'a mut K,
        pix_val_field: Option<usize>,
        geo_transform: GeoTransform,
    ) -> LayerWriter<'a, K> {
        LayerWriter {
            layer: layer,
            pix_val_field: pix_val_field,
            geo_transform: geo_transform,
        }
    }
}

impl<'a, T: CellValue, K: PolygonLayer> PolygonReceiver<T> for LayerWriter<'a, K> {
    fn receive(&mut self, polygon: &RPolygon, polygon_cell_value: T) -> Result<(), Error> {
        let mut accessed = vec![false; polygon.num_arcs()];
        let mut geometry = PolygonGeometry::new();

        for first_arc in 0..polygon.num_arcs() {
            if accessed[first_arc] {
                continue;
            }

            // Follow successor links until the ring closes. Right-hand arcs
            // keep their vertex order; the others are walked backwards.
            let mut ring: Vec<Point2D> = vec![];
            let mut arc_index = first_arc;
            loop {
                accessed[arc_index] = true;
                let points = polygon.arc_points(arc_index);
                if polygon.arc_follows_righthand(arc_index) {
                    for corner in points.iter() {
                        ring.push(self.geo_transform.apply(corner.1 as f64, corner.0 as f64));
                    }
                } else {
                    for corner in points.iter().rev() {
                        ring.push(self.geo_transform.apply(corner.1 as f64, corner.0 as f64));
                    }
                }
                arc_index = polygon.arc_connection(arc_index);
                if arc_index == first_arc {
                    break;
                }
            }

            // Close the ring explicitly.
            if let Some(&first) = ring.first() {
                if ring.last() != Some(&first) {
                    ring.push(first);
                }
            }
            geometry.add_ring(ring);
        }

        let mut feature = self.layer.create_feature();
        if let Some(field) = self.pix_val_field {
            feature.set_field(field, FieldData::Real(polygon_cell_value.as_double()))?;
        }
        feature.set_geometry(geometry);
        self.layer.commit_feature(feature)
    }
}
