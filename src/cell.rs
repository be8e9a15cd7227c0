//! Rigid lattice cells
//!
//! A cell is one quad of the lattice. Its four boundary points live in the
//! grid's point arena and may be shared with up to three neighbours; the
//! cell only holds their indices. Each cell also owns a private rigid copy
//! of its corners, which `fit` moves to the best rotation + translation of
//! the rest shape onto the current boundary.

use nalgebra::{Matrix2, Point2, Vector2};
use serde::Serialize;

use crate::error::DeformError;
use crate::point::LatticePoint;
use crate::projector::PixelProjector;
use crate::raster::SpanMap;
use crate::source::ImageSource;
use crate::transform::Homography;

/// Corner order used everywhere: top-left, top-right, bottom-right, bottom-left
pub const CORNER_COUNT: usize = 4;

/// A line segment in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub from: (f64, f64),
    pub to: (f64, f64),
}

/// The two outlines drawn for a cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellOutline {
    /// Shape of the rigid fit
    pub rigid: [Segment; CORNER_COUNT],
    /// Shape of the shared boundary
    pub boundary: [Segment; CORNER_COUNT],
}

fn closed_loop(corners: [Point2<f64>; CORNER_COUNT]) -> [Segment; CORNER_COUNT] {
    std::array::from_fn(|i| {
        let a = corners[i];
        let b = corners[(i + 1) % CORNER_COUNT];
        Segment {
            from: (a.x, a.y),
            to: (b.x, b.y),
        }
    })
}

fn weighted_centroid(
    positions: &[Point2<f64>; CORNER_COUNT],
    weights: &[f64; CORNER_COUNT],
) -> Point2<f64> {
    let total: f64 = weights.iter().sum();
    let sum = positions
        .iter()
        .zip(weights)
        .fold(Vector2::<f64>::zeros(), |acc, (p, &w)| acc + p.coords * w);
    Point2::from(sum / total)
}

/// One quad cell of the deformation lattice
#[derive(Debug, Clone)]
pub struct RigidCell {
    corners: [usize; CORNER_COUNT],
    rest: [Point2<f64>; CORNER_COUNT],
    rigid: [LatticePoint; CORNER_COUNT],
    /// Weighted centroid of the rest shape, refreshed whenever weights change
    source_centroid: Point2<f64>,
    spans: SpanMap,
    homography: Option<Homography>,
}

impl RigidCell {
    /// Build a cell over the points at `corners` (indices into `points`).
    /// The points are expected to be at rest.
    pub fn new(corners: [usize; CORNER_COUNT], points: &[LatticePoint]) -> Self {
        let rest = corners.map(|i| points[i].rest());
        let rigid = corners.map(|i| points[i].copy());

        let mut cell = Self {
            corners,
            rest,
            rigid,
            source_centroid: Point2::origin(),
            spans: SpanMap::default(),
            homography: None,
        };
        cell.refresh_source_centroid(points);
        cell.rebuild_spans(points);
        cell
    }

    /// Indices of the boundary points in the grid's arena
    pub fn corners(&self) -> [usize; CORNER_COUNT] {
        self.corners
    }

    pub fn rest(&self) -> &[Point2<f64>; CORNER_COUNT] {
        &self.rest
    }

    pub fn rigid_position(&self, corner: usize) -> Point2<f64> {
        self.rigid[corner].position()
    }

    pub fn rigid_positions(&self) -> [Point2<f64>; CORNER_COUNT] {
        std::array::from_fn(|i| self.rigid[i].position())
    }

    pub fn boundary_positions(&self, points: &[LatticePoint]) -> [Point2<f64>; CORNER_COUNT] {
        self.corners.map(|i| points[i].position())
    }

    fn weights(&self, points: &[LatticePoint]) -> [f64; CORNER_COUNT] {
        self.corners.map(|i| points[i].weight)
    }

    /// Boundary rounded to whole pixels
    pub fn vertices(&self, points: &[LatticePoint]) -> [(i32, i32); CORNER_COUNT] {
        self.corners.map(|i| {
            let p = points[i].position();
            (p.x.round() as i32, p.y.round() as i32)
        })
    }

    /// Re-rasterize the boundary. Needed after every change of shape.
    pub fn rebuild_spans(&mut self, points: &[LatticePoint]) {
        self.spans = SpanMap::from_polygon(&self.vertices(points));
    }

    #[inline]
    pub fn has_point(&self, x: i32, y: i32) -> bool {
        self.spans.contains_point(x, y)
    }

    /// Index of the boundary point closest to (x, y) in L1 distance.
    /// Ties go to the first corner in TL, TR, BR, BL order.
    pub fn closest_boundary(&self, points: &[LatticePoint], x: f64, y: f64) -> usize {
        let mut closest = self.corners[0];
        let mut best = f64::INFINITY;
        for &i in &self.corners {
            let p = points[i].position();
            let dist = (p.x - x).abs() + (p.y - y).abs();
            if dist < best {
                best = dist;
                closest = i;
            }
        }
        closest
    }

    pub fn refresh_source_centroid(&mut self, points: &[LatticePoint]) {
        self.source_centroid = weighted_centroid(&self.rest, &self.weights(points));
    }

    /// Weighted rigid alignment of the rest shape onto the current boundary.
    ///
    /// Only rotation and translation survive: the cross-covariance terms are
    /// normalized so scale and shear of the boundary are discarded.
    pub fn fit(&mut self, points: &[LatticePoint]) {
        let weights = self.weights(points);
        let boundary = self.boundary_positions(points);
        let qc = weighted_centroid(&boundary, &weights);
        let pc = self.source_centroid;

        let mut a = 0.0;
        let mut b = 0.0;
        let mut centered = [Vector2::zeros(); CORNER_COUNT];

        for i in 0..CORNER_COUNT {
            let p = self.rest[i] - pc;
            let q = boundary[i] - qc;
            let w = weights[i];

            a += w * (p.x * q.x + p.y * q.y);
            b += w * (p.x * q.y - p.y * q.x);
            centered[i] = p;
        }

        let norm = (a * a + b * b).sqrt();
        // boundary collapsed onto its centroid: nothing to orient against
        let rotation = if norm > 0.0 && norm.is_finite() {
            let m = 1.0 / norm;
            Matrix2::new(a * m, -b * m, b * m, a * m)
        } else {
            Matrix2::identity()
        };

        let translation = qc.coords;
        for (rigid, p) in self.rigid.iter_mut().zip(centered) {
            rigid.set_position(Point2::from(p));
            rigid.rotate(&rotation).translate(&translation);
        }
    }

    /// Recompute the rest -> boundary homography.
    /// On failure the cached matrix is dropped.
    pub fn homography(&mut self, points: &[LatticePoint]) -> Result<&Homography, DeformError> {
        let boundary = self.boundary_positions(points);
        match Homography::from_correspondences(self.rest, boundary) {
            Ok(h) => Ok(&*self.homography.insert(h)),
            Err(e) => {
                self.homography = None;
                Err(e)
            }
        }
    }

    /// Homography computed by the last `homography` call, if it succeeded
    pub fn cached_homography(&self) -> Option<&Homography> {
        self.homography.as_ref()
    }

    /// Resample this cell's source footprint into its current boundary
    pub fn project<P>(
        &mut self,
        points: &[LatticePoint],
        source: &mut ImageSource,
        projector: &P,
    ) -> Result<(), DeformError>
    where
        P: PixelProjector + ?Sized,
    {
        let inverse = self.homography(points)?.inverse_row_major();
        let vertices = self.vertices(points);

        let (width, height) = (source.width(), source.height());
        let (mask, original, destination) = source.buffers_mut();
        projector.project(&inverse, mask, original, destination, width, height, &vertices);
        Ok(())
    }

    pub fn outline(&self, points: &[LatticePoint]) -> CellOutline {
        CellOutline {
            rigid: closed_loop(self.rigid_positions()),
            boundary: closed_loop(self.boundary_positions(points)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Vec<LatticePoint> {
        vec![
            LatticePoint::new(x, y),
            LatticePoint::new(x + size, y),
            LatticePoint::new(x + size, y + size),
            LatticePoint::new(x, y + size),
        ]
    }

    fn assert_close(a: Point2<f64>, b: Point2<f64>, tol: f64) {
        assert!((a - b).norm() < tol, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_fit_at_rest_is_identity() {
        let points = square(32.0, 32.0, 32.0);
        let mut cell = RigidCell::new([0, 1, 2, 3], &points);

        cell.fit(&points);
        for i in 0..CORNER_COUNT {
            assert_close(cell.rigid_position(i), points[i].rest(), 1e-9);
        }

        let h = cell.homography(&points).unwrap();
        let (x, y) = h.transform_point(40.0, 50.0);
        assert!((x - 40.0).abs() < 1e-9);
        assert!((y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_recovers_pure_rotation() {
        let mut points = square(0.0, 0.0, 10.0);
        let mut cell = RigidCell::new([0, 1, 2, 3], &points);

        // rotate the boundary by 30 degrees about the centre and shift it
        let (s, c) = 30f64.to_radians().sin_cos();
        let centre = Point2::new(5.0, 5.0);
        for p in points.iter_mut() {
            let d = p.rest() - centre;
            let rotated = Vector2::new(c * d.x - s * d.y, s * d.x + c * d.y);
            p.set_position(centre + rotated + Vector2::new(3.0, -2.0));
        }

        cell.fit(&points);
        for i in 0..CORNER_COUNT {
            assert_close(cell.rigid_position(i), points[i].position(), 1e-9);
        }
    }

    #[test]
    fn test_fit_discards_scale() {
        let mut points = square(0.0, 0.0, 10.0);
        let mut cell = RigidCell::new([0, 1, 2, 3], &points);

        // boundary doubled in size about its centre
        for p in points.iter_mut() {
            let d = p.rest() - Point2::new(5.0, 5.0);
            p.set_position(Point2::new(5.0, 5.0) + d * 2.0);
        }

        cell.fit(&points);
        let rigid = cell.rigid_positions();
        // rigid copy keeps the rest edge length
        assert!(((rigid[1] - rigid[0]).norm() - 10.0).abs() < 1e-9);
        assert!(((rigid[2] - rigid[1]).norm() - 10.0).abs() < 1e-9);
        assert_close(rigid[0], Point2::new(0.0, 0.0), 1e-9);
    }

    #[test]
    fn test_fit_follows_heavy_corner() {
        let mut points = square(0.0, 0.0, 10.0);
        points[0].weight = 1000.0;
        let mut cell = RigidCell::new([0, 1, 2, 3], &points);

        // only the heavy corner moves
        points[0].set_position(Point2::new(4.0, 0.0));
        cell.fit(&points);

        // the rigid copy is pulled almost all the way along with it
        assert!(cell.rigid_position(0).x > 3.5);
        let rigid = cell.rigid_positions();
        assert!(((rigid[1] - rigid[0]).norm() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_collapsed_boundary_does_not_produce_nan() {
        let mut points = square(0.0, 0.0, 10.0);
        let mut cell = RigidCell::new([0, 1, 2, 3], &points);
        for p in points.iter_mut() {
            p.set_position(Point2::new(7.0, 7.0));
        }

        cell.fit(&points);
        for p in cell.rigid_positions() {
            assert!(p.x.is_finite() && p.y.is_finite());
        }
        assert_eq!(cell.homography(&points).err(), Some(DeformError::DegenerateGeometry));
        assert!(cell.cached_homography().is_none());
    }

    #[test]
    fn test_closest_boundary_ties_prefer_first_corner() {
        let points = square(0.0, 0.0, 10.0);
        let cell = RigidCell::new([0, 1, 2, 3], &points);

        assert_eq!(cell.closest_boundary(&points, 9.0, 1.0), 1);
        assert_eq!(cell.closest_boundary(&points, 1.0, 8.0), 3);
        // centre is equidistant from all four
        assert_eq!(cell.closest_boundary(&points, 5.0, 5.0), 0);
    }

    #[test]
    fn test_has_point_tracks_rebuilt_spans() {
        let mut points = square(0.0, 0.0, 10.0);
        let mut cell = RigidCell::new([0, 1, 2, 3], &points);
        assert!(cell.has_point(5, 5));
        assert!(!cell.has_point(15, 5));

        for p in points.iter_mut() {
            let pos = p.position();
            p.set_position(Point2::new(pos.x + 10.0, pos.y));
        }
        // spans are a snapshot until rebuilt
        assert!(!cell.has_point(15, 5));
        cell.rebuild_spans(&points);
        assert!(cell.has_point(15, 5));
        assert!(!cell.has_point(5, 5));
    }

    #[test]
    fn test_outline_is_closed() {
        let points = square(0.0, 0.0, 10.0);
        let cell = RigidCell::new([0, 1, 2, 3], &points);
        let outline = cell.outline(&points);

        for segments in [outline.rigid, outline.boundary] {
            for i in 0..CORNER_COUNT {
                assert_eq!(segments[i].to, segments[(i + 1) % CORNER_COUNT].from);
            }
        }
    }
}
