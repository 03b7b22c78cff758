//! Pseudo-modal reduction onto the lowest undamped modes

use log::debug;

use super::time_response::TimeProblem;
use crate::error::{RotorError, RotorResult};
use crate::math::{symmetric_generalized_eigen, DVec, Mat};
use crate::results::TimeResponseResult;

/// Mass-normalised basis `Φ` of the lowest undamped modes of `(K, M)`
///
/// Reduced coordinates `q` relate to the DOF by `x = Φ q`, so `ΦᵀMΦ = I`.
#[derive(Debug, Clone)]
pub struct ModalBasis {
    phi: Mat,
    eigenvalues: Vec<f64>,
}

impl ModalBasis {
    pub fn new(m: &Mat, k: &Mat, num_modes: usize) -> RotorResult<Self> {
        let n = m.nrows();
        if num_modes == 0 || num_modes > n {
            return Err(RotorError::InvalidInput(format!(
                "model reduction needs between 1 and {n} modes, got {num_modes}"
            )));
        }
        let (values, vectors) = symmetric_generalized_eigen(k, m)
            .ok_or_else(|| RotorError::SingularMatrix("mass matrix is not positive definite".to_string()))?;
        debug!("modal basis: {num_modes} of {n} modes, highest ω² = {:e}", values[num_modes - 1]);
        Ok(Self {
            phi: vectors.columns(0, num_modes).into_owned(),
            eigenvalues: values[..num_modes].to_vec(),
        })
    }

    /// Full DOF count
    pub fn ndof(&self) -> usize {
        self.phi.nrows()
    }

    pub fn num_modes(&self) -> usize {
        self.phi.ncols()
    }

    pub fn phi(&self) -> &Mat {
        &self.phi
    }

    /// Undamped natural frequencies of the kept modes (rad/s); modes with
    /// negative ω² report a negative value
    pub fn frequencies(&self) -> Vec<f64> {
        self.eigenvalues.iter().map(|l| l.signum() * l.abs().sqrt()).collect()
    }

    /// `ΦᵀAΦ`
    pub fn project_matrix(&self, a: &Mat) -> Mat {
        self.phi.transpose() * a * &self.phi
    }

    /// `Φᵀf`
    pub fn project_vector(&self, f: &DVec) -> DVec {
        self.phi.tr_mul(f)
    }

    /// `Φq`
    pub fn expand(&self, q: &DVec) -> DVec {
        &self.phi * q
    }

    /// Reduced problem with projected matrices, forces and initial state
    pub fn reduce(&self, p: &TimeProblem) -> TimeProblem {
        let mphi_t = self.phi.tr_mul(&p.m);
        TimeProblem {
            m: self.project_matrix(&p.m),
            k: self.project_matrix(&p.k),
            c: self.project_matrix(&p.c),
            g: self.project_matrix(&p.g),
            schedule: p.schedule.as_ref().map(|sch| sch.map(|a| self.project_matrix(a))),
            force: &p.force * &self.phi,
            t: p.t.clone(),
            speed: p.speed.clone(),
            accel: p.accel.clone(),
            x0: &mphi_t * &p.x0,
            v0: &mphi_t * &p.v0,
        }
    }

    /// Map a reduced-coordinate history back onto every DOF
    pub fn expand_result(&self, reduced: TimeResponseResult) -> TimeResponseResult {
        let phi_t = self.phi.transpose();
        TimeResponseResult {
            yout: &reduced.yout * &phi_t,
            velocity: &reduced.velocity * &phi_t,
            acceleration: reduced.acceleration.as_ref().map(|a| a * &phi_t),
            ..reduced
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn chain() -> (Mat, Mat) {
        let m = Mat::from_diagonal(&DVec::from_vec(vec![1.0, 2.0, 1.0]));
        let k = Mat::from_row_slice(3, 3, &[2.0, -1.0, 0.0, -1.0, 2.0, -1.0, 0.0, -1.0, 2.0]) * 100.0;
        (m, k)
    }

    #[test]
    fn test_basis_is_mass_normalised() {
        let (m, k) = chain();
        let basis = ModalBasis::new(&m, &k, 2).unwrap();
        let mr = basis.project_matrix(&m);
        assert_relative_eq!(mr, Mat::identity(2, 2), epsilon = 1e-10);
        let kr = basis.project_matrix(&k);
        assert_relative_eq!(kr[(0, 1)], 0.0, epsilon = 1e-8);
        assert_relative_eq!(kr[(0, 0)], basis.frequencies()[0].powi(2), max_relative = 1e-10);
    }

    #[test]
    fn test_full_basis_roundtrips_state() {
        let (m, k) = chain();
        let basis = ModalBasis::new(&m, &k, 3).unwrap();
        let x = DVec::from_vec(vec![0.1, -0.2, 0.3]);
        let q = basis.phi().tr_mul(&(&m * &x));
        assert_relative_eq!(basis.expand(&q), x, epsilon = 1e-12);
    }

    #[test]
    fn test_mode_count_checked() {
        let (m, k) = chain();
        assert!(ModalBasis::new(&m, &k, 0).is_err());
        assert!(ModalBasis::new(&m, &k, 4).is_err());
    }
}
