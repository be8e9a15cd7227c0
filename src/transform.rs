//! Projective transformation between a cell's rest quad and its live quad
//!
//! The forward matrix maps rest coordinates onto the deformed boundary. Its
//! inverse maps a destination pixel back to where it is sampled in the
//! source image, which is how cells are warped without leaving holes.

use nalgebra::{Matrix3, Point2};

use crate::error::DeformError;

/// Pivots smaller than this fraction of the largest coefficient are treated as zero
const PIVOT_EPSILON: f64 = 1e-10;

/// Forward matrices with a smaller determinant are not inverted
const DET_EPSILON: f64 = 1e-12;

/// A 3x3 homography together with its inverse
#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Homography {
    /// Compute the transform taking 4 source points onto 4 destination points
    pub fn from_correspondences(
        src: [Point2<f64>; 4],
        dst: [Point2<f64>; 4],
    ) -> Result<Self, DeformError> {
        let forward = compute_homography(src, dst)?;

        let det = forward.determinant();
        if !det.is_finite() || det.abs() < DET_EPSILON {
            return Err(DeformError::DegenerateGeometry);
        }

        let inverse = forward
            .try_inverse()
            .ok_or(DeformError::DegenerateGeometry)?;
        if inverse.iter().any(|v| !v.is_finite()) {
            return Err(DeformError::DegenerateGeometry);
        }

        Ok(Self { forward, inverse })
    }

    pub fn forward(&self) -> &Matrix3<f64> {
        &self.forward
    }

    /// Map a rest-space point onto the deformed quad
    #[inline]
    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        apply_homography(&self.forward, x, y)
    }

    /// Map a destination point back to source coordinates
    #[inline]
    pub fn inverse_transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        apply_homography(&self.inverse, x, y)
    }

    /// Inverse matrix flattened in row-major order, as consumed by pixel projectors
    pub fn inverse_row_major(&self) -> [f64; 9] {
        row_major(&self.inverse)
    }
}

#[rustfmt::skip]
fn row_major(m: &Matrix3<f64>) -> [f64; 9] {
    [
        m[(0, 0)], m[(0, 1)], m[(0, 2)],
        m[(1, 0)], m[(1, 1)], m[(1, 2)],
        m[(2, 0)], m[(2, 1)], m[(2, 2)],
    ]
}

/// Compute a 3x3 homography matrix from 4 point correspondences.
///
/// With h8 fixed to 1 every correspondence (x,y) -> (X,Y) yields two rows:
///   [x, y, 1, 0, 0, 0, -x*X, -y*X] . h = X
///   [0, 0, 0, x, y, 1, -x*Y, -y*Y] . h = Y
fn compute_homography(
    src: [Point2<f64>; 4],
    dst: [Point2<f64>; 4],
) -> Result<Matrix3<f64>, DeformError> {
    let mut a = [[0.0f64; 8]; 8];
    let mut b = [0.0f64; 8];

    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (xp, yp) = (dst[i].x, dst[i].y);

        let row1 = i * 2;
        let row2 = i * 2 + 1;

        a[row1] = [x, y, 1.0, 0.0, 0.0, 0.0, -x * xp, -y * xp];
        b[row1] = xp;

        a[row2] = [0.0, 0.0, 0.0, x, y, 1.0, -x * yp, -y * yp];
        b[row2] = yp;
    }

    let h = solve_linear_system(&mut a, &mut b)?;

    #[rustfmt::skip]
    let forward = Matrix3::new(
        h[0], h[1], h[2],
        h[3], h[4], h[5],
        h[6], h[7], 1.0,
    );
    Ok(forward)
}

/// Solve an 8x8 linear system using Gaussian elimination with partial pivoting
fn solve_linear_system(a: &mut [[f64; 8]; 8], b: &mut [f64; 8]) -> Result<[f64; 8], DeformError> {
    let n = 8;

    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    if !scale.is_finite() || scale == 0.0 {
        return Err(DeformError::DegenerateGeometry);
    }
    let threshold = scale * PIVOT_EPSILON;

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            if a[row][col].abs() > max_val {
                max_val = a[row][col].abs();
                max_row = row;
            }
        }

        if max_val < threshold {
            return Err(DeformError::DegenerateGeometry);
        }

        if max_row != col {
            a.swap(col, max_row);
            b.swap(col, max_row);
        }

        let pivot = a[col][col];
        for row in (col + 1)..n {
            let factor = a[row][col] / pivot;
            for j in col..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0f64; 8];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(DeformError::DegenerateGeometry);
    }
    Ok(x)
}

/// Apply a homography matrix to a point
#[inline]
pub fn apply_homography(h: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let w = h[(2, 0)] * x + h[(2, 1)] * y + h[(2, 2)];
    if w.abs() < 1e-10 {
        return (x, y);
    }
    let xp = (h[(0, 0)] * x + h[(0, 1)] * y + h[(0, 2)]) / w;
    let yp = (h[(1, 0)] * x + h[(1, 1)] * y + h[(1, 2)]) / w;
    (xp, yp)
}
