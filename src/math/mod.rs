//! Mathematical utilities for rotor element matrices and solvers

pub mod eigen;
pub mod sparse;

use nalgebra::{Complex, DMatrix, DVector, SMatrix};
use serde::{Deserialize, Serialize};

use crate::error::{RotorError, RotorResult};

pub use eigen::{complex_eigen, symmetric_generalized_eigen, ComplexEigen};
pub use sparse::SparseMatrixBuilder;

pub type Mat = DMatrix<f64>;
pub type DVec = DVector<f64>;
pub type CMat = DMatrix<Complex<f64>>;
pub type CVec = DVector<Complex<f64>>;

/// 4x4 matrix for one bending plane of a beam element (w1, ψ1, w2, ψ2)
pub type Mat4 = SMatrix<f64, 4, 4>;
/// 12x12 matrix for a two-node, six-DOF-per-node shaft element
pub type Mat12 = SMatrix<f64, 12, 12>;

/// Behaviour of a table lookup outside its tabulated range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Extrapolation {
    /// Hold the first/last tabulated value
    #[default]
    Clamp,
    /// Raise `RotorError::OutOfRange`
    Error,
}

/// Piecewise-linear interpolation of `values` tabulated at ascending `points`
pub fn interp1d(points: &[f64], values: &[f64], x: f64, mode: Extrapolation) -> RotorResult<f64> {
    if points.is_empty() || points.len() != values.len() {
        return Err(RotorError::InvalidInput(format!(
            "interpolation table has {} points and {} values",
            points.len(),
            values.len()
        )));
    }

    let first = points[0];
    let last = points[points.len() - 1];

    if x < first || x > last {
        return match mode {
            Extrapolation::Clamp if x < first => Ok(values[0]),
            Extrapolation::Clamp => Ok(values[values.len() - 1]),
            Extrapolation::Error => Err(RotorError::OutOfRange {
                value: x,
                min: first,
                max: last,
            }),
        };
    }

    if points.len() == 1 {
        return Ok(values[0]);
    }

    // First segment whose right end is >= x
    let idx = points.partition_point(|&p| p < x).clamp(1, points.len() - 1);
    let (x0, x1) = (points[idx - 1], points[idx]);
    let (y0, y1) = (values[idx - 1], values[idx]);

    if (x1 - x0).abs() < f64::EPSILON {
        return Ok(y1);
    }

    Ok(y0 + (y1 - y0) * (x - x0) / (x1 - x0))
}

/// Scatter-add a 4x4 plane block into a 12x12 element matrix
///
/// Row `i` of `block` lands on `rows[i]` scaled by `row_signs[i]`, and likewise
/// for columns. The signs carry the rotation convention of each bending plane.
pub fn scatter_plane(
    target: &mut Mat12,
    block: &Mat4,
    rows: &[usize; 4],
    row_signs: &[f64; 4],
    cols: &[usize; 4],
    col_signs: &[f64; 4],
) {
    for (i, &ri) in rows.iter().enumerate() {
        for (j, &cj) in cols.iter().enumerate() {
            target[(ri, cj)] += row_signs[i] * col_signs[j] * block[(i, j)];
        }
    }
}

/// Convert a real matrix to its complex counterpart
pub fn to_complex(m: &Mat) -> CMat {
    m.map(|v| Complex::new(v, 0.0))
}

/// Solve `M x = b` through a Cholesky factorisation, falling back to LU
pub fn solve_spd(m: &Mat, b: &Mat) -> Option<Mat> {
    match m.clone().cholesky() {
        Some(chol) => Some(chol.solve(b)),
        None => m.clone().lu().solve(b),
    }
}

/// Cumulative trapezoidal integral of `y` over `t`, starting at zero
pub fn cumulative_trapezoid(y: &[f64], t: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(y.len());
    let mut acc = 0.0;
    for i in 0..y.len() {
        if i > 0 {
            acc += 0.5 * (y[i] + y[i - 1]) * (t[i] - t[i - 1]);
        }
        out.push(acc);
    }
    out
}

/// Derivative of samples `y(t)`: second-order central differences inside,
/// one-sided at the ends
pub fn gradient(y: &[f64], t: &[f64]) -> Vec<f64> {
    let n = y.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mut out = Vec::with_capacity(n);
    out.push((y[1] - y[0]) / (t[1] - t[0]));
    for i in 1..n - 1 {
        let hs = t[i] - t[i - 1];
        let hd = t[i + 1] - t[i];
        out.push((hs * hs * y[i + 1] + (hd * hd - hs * hs) * y[i] - hd * hd * y[i - 1]) / (hs * hd * (hd + hs)));
    }
    out.push((y[n - 1] - y[n - 2]) / (t[n - 1] - t[n - 2]));
    out
}

/// Two-point Gauss-Legendre abscissae and weights on [0, 1]
pub(crate) fn gauss_points_unit() -> [(f64, f64); 2] {
    let a = 0.5 / 3f64.sqrt();
    [(0.5 - a, 0.5), (0.5 + a, 0.5)]
}
