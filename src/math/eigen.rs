//! Eigen solvers for rotor state-space and undamped problems
//!
//! nalgebra provides the real Schur form of a general matrix but no general
//! eigenvectors, so eigenvectors are recovered by shifted inverse iteration on
//! the complex matrix, one selected eigenvalue at a time.
//!
//! General matrices are balanced first. Rotor state matrices mix stiff axial
//! and torsional rows with soft lateral ones, and the Schur error scales with
//! the matrix norm.

use nalgebra::linalg::{Schur, SymmetricEigen};
use nalgebra::Complex;

use super::{to_complex, CMat, CVec, DVec, Mat};

const RADIX: f64 = 2.0;
const MAX_BALANCE_SWEEPS: usize = 100;

/// Diagonal similarity `B = D⁻¹ A D` with row and column norms of similar
/// size
///
/// Scale factors are powers of two, so `B` carries no rounding error.
/// Returns `B` and the diagonal of `D`.
pub fn balance(a: &Mat) -> (Mat, DVec) {
    let n = a.nrows();
    let mut b = a.clone();
    let mut d = DVec::from_element(n, 1.0);
    for _ in 0..MAX_BALANCE_SWEEPS {
        let mut converged = true;
        for i in 0..n {
            let mut c = 0.0;
            let mut r = 0.0;
            for j in (0..n).filter(|&j| j != i) {
                c += b[(j, i)].abs();
                r += b[(i, j)].abs();
            }
            if c == 0.0 || r == 0.0 || !c.is_finite() || !r.is_finite() {
                continue;
            }
            let total = c + r;
            let mut f = 1.0;
            while c < r / RADIX {
                f *= RADIX;
                c *= RADIX * RADIX;
            }
            while c > r * RADIX {
                f /= RADIX;
                c /= RADIX * RADIX;
            }
            if (c + r) / f < 0.95 * total {
                converged = false;
                d[i] *= f;
                b.row_mut(i).unscale_mut(f);
                b.column_mut(i).scale_mut(f);
            }
        }
        if converged {
            break;
        }
    }
    (b, d)
}

/// Selected eigenpairs of a general real matrix
#[derive(Debug, Clone)]
pub struct ComplexEigen {
    /// Selected eigenvalues, in selection order
    pub values: Vec<Complex<f64>>,
    /// Unit-norm eigenvectors, one column per selected eigenvalue
    pub vectors: CMat,
}

/// Compute all eigenvalues of `a`, keep those chosen by `select`, and
/// return them with their eigenvectors.
///
/// `select` receives every eigenvalue and returns the indices to keep, in the
/// order they should be reported. Returns `None` if the Schur iteration or an
/// inverse iteration fails.
pub fn complex_eigen<F>(a: &Mat, max_iter: usize, select: F) -> Option<ComplexEigen>
where
    F: FnOnce(&[Complex<f64>]) -> Vec<usize>,
{
    let (balanced, d) = balance(a);
    let schur = Schur::try_new(balanced.clone(), f64::EPSILON, max_iter)?;
    let all: Vec<Complex<f64>> = schur.complex_eigenvalues().iter().copied().collect();
    if all.iter().any(|l| !l.re.is_finite() || !l.im.is_finite()) {
        return None;
    }

    let chosen = select(&all);
    let ac = to_complex(&balanced);
    let n = a.nrows();
    let mut vectors = CMat::zeros(n, chosen.len());
    let mut found: Vec<(Complex<f64>, CVec)> = Vec::with_capacity(chosen.len());

    for (col, &idx) in chosen.iter().enumerate() {
        let lambda = *all.get(idx)?;
        let w = inverse_iteration(&ac, lambda, &found, col)?;
        // Back to the coordinates of `a`: v = D w
        let v = CVec::from_fn(n, |i, _| w[i] * d[i]);
        let norm = v.norm();
        if !norm.is_finite() || norm == 0.0 {
            return None;
        }
        vectors.set_column(col, &v.unscale(norm));
        found.push((lambda, w));
    }

    Some(ComplexEigen {
        values: chosen.iter().map(|&i| all[i]).collect(),
        vectors,
    })
}

fn inverse_iteration(
    ac: &CMat,
    lambda: Complex<f64>,
    previous: &[(Complex<f64>, CVec)],
    seed: usize,
) -> Option<CVec> {
    let n = ac.nrows();
    let scale = lambda.norm().max(1.0);
    // An exact shift makes (A - λI) singular
    let shift = lambda + Complex::new(1.0, 1.0) * (scale * 1e-10);

    let mut shifted = ac.clone();
    for i in 0..n {
        shifted[(i, i)] -= shift;
    }
    let lu = shifted.lu();

    // Eigenvectors already found for (numerically) repeated eigenvalues.
    let cluster: Vec<&CVec> = previous
        .iter()
        .filter(|(mu, _)| (mu - lambda).norm() <= 1e-6 * scale)
        .map(|(_, u)| u)
        .collect();

    let mut v = CVec::from_fn(n, |i, _| {
        Complex::new(
            1.0 + ((i * 7 + seed * 13) % 11) as f64 * 0.1,
            ((i * 3 + seed * 5) % 7) as f64 * 0.1,
        )
    });
    v = v.unscale(v.norm());

    for _ in 0..4 {
        for u in &cluster {
            let proj = u.dotc(&v);
            v -= *u * proj;
        }
        let w = lu.solve(&v)?;
        let norm = w.norm();
        if !norm.is_finite() || norm == 0.0 {
            return None;
        }
        v = w.unscale(norm);
    }

    for u in &cluster {
        let proj = u.dotc(&v);
        v -= *u * proj;
    }
    let norm = v.norm();
    if !norm.is_finite() || norm == 0.0 {
        return None;
    }
    Some(v.unscale(norm))
}

/// Solve the symmetric generalized problem `K φ = ω² M φ`
///
/// Returns eigenvalues (ω²) in ascending order and the matching
/// mass-normalised eigenvectors as columns. `K` is symmetrised first.
pub fn symmetric_generalized_eigen(k: &Mat, m: &Mat) -> Option<(Vec<f64>, Mat)> {
    let chol = m.clone().cholesky()?;
    let l = chol.l();

    let k_sym = (k + k.transpose()) * 0.5;
    let y = l.solve_lower_triangular(&k_sym)?;
    let a = l.solve_lower_triangular(&y.transpose())?;
    let a = (&a + a.transpose()) * 0.5;

    let eig = SymmetricEigen::try_new(a, f64::EPSILON, 0)?;
    let phi = l.transpose().solve_upper_triangular(&eig.eigenvectors)?;

    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&i, &j| eig.eigenvalues[i].total_cmp(&eig.eigenvalues[j]));

    let values = order.iter().map(|&i| eig.eigenvalues[i]).collect();
    let mut vectors = Mat::zeros(phi.nrows(), order.len());
    for (col, &i) in order.iter().enumerate() {
        vectors.set_column(col, &phi.column(i));
    }
    Some((values, vectors))
}
