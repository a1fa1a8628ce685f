/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 08/03/2025
Last Modified: 27/06/2025
License: MIT
*/
use rastervec_common::structures::Point2D;

/// A polygon: one exterior ring followed by zero or more interior rings
/// (holes). Every ring is closed, i.e. its first and last vertex coincide.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolygonGeometry {
    rings: Vec<Vec<Point2D>>,
}

impl PolygonGeometry {
    pub fn new() -> PolygonGeometry {
        PolygonGeometry { rings: vec![] }
    }

    /// Appends a ring; the first ring added is the exterior.
    pub fn add_ring(&mut self, ring: Vec<Point2D>) {
        self.rings.push(ring);
    }

    pub fn num_rings(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    pub fn exterior_ring(&self) -> Option<&[Point2D]> {
        self.rings.first().map(|r| r.as_slice())
    }

    pub fn interior_rings(&self) -> &[Vec<Point2D>] {
        if self.rings.is_empty() {
            &[]
        } else {
            &self.rings[1..]
        }
    }

    pub fn rings(&self) -> &[Vec<Point2D>] {
        &self.rings
    }

    /// Twice the signed area of a ring; positive for counter-clockwise
    /// vertex order in a y-up coordinate system.
    pub fn ring_signed_area2(ring: &[Point2D]) -> f64 {
        let mut sum = 0f64;
        for i in 0..ring.len().saturating_sub(1) {
            sum += ring[i].x * ring[i + 1].y - ring[i + 1].x * ring[i].y;
        }
        sum
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_ring_is_the_exterior() {
        let mut g = PolygonGeometry::new();
        let outer = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(4.0, 0.0),
            Point2D::new(4.0, 4.0),
            Point2D::new(0.0, 4.0),
            Point2D::new(0.0, 0.0),
        ];
        let hole = vec![
            Point2D::new(1.0, 1.0),
            Point2D::new(1.0, 2.0),
            Point2D::new(2.0, 2.0),
            Point2D::new(2.0, 1.0),
            Point2D::new(1.0, 1.0),
        ];
        g.add_ring(outer.clone());
        g.add_ring(hole);
        assert_eq!(g.num_rings(), 2);
        assert_eq!(g.exterior_ring().unwrap(), outer.as_slice());
        assert_eq!(g.interior_rings().len(), 1);
    }

    #[test]
    fn signed_area_orients_rings() {
        let ccw = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.0),
            Point2D::new(1.0, 1.0),
            Point2D::new(0.0, 1.0),
            Point2D::new(0.0, 0.0),
        ];
        assert!(PolygonGeometry::ring_signed_area2(&ccw) > 0.0);
        let cw: Vec<_> = ccw.iter().rev().cloned().collect();
        assert!(PolygonGeometry::ring_signed_area2(&cw) < 0.0);
    }
}
