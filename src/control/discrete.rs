use serde::{Deserialize, Serialize};

use crate::error::{RotorError, RotorResult};
use crate::math::{DVec, Mat};

/// Discrete-time state-space control law
///
/// ```text
/// x[k+1] = A x[k] + B u[k]
/// y[k]   = C x[k] + D u[k]
/// ```
///
/// `u` are control errors and `y` control outputs, so an LQG realisation
/// (Kalman filter plus state feedback) fits directly. The state advances only
/// through [`DiscreteController::commit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteController {
    pub a: Mat,
    pub b: Mat,
    pub c: Mat,
    pub d: Mat,
    state: DVec,
    pending: DVec,
}

impl DiscreteController {
    pub fn new(a: Mat, b: Mat, c: Mat, d: Mat) -> RotorResult<Self> {
        let n = a.nrows();
        let dim = |what: &str, expected: usize, found: usize| -> RotorResult<()> {
            if expected != found {
                return Err(RotorError::DimensionMismatch {
                    what: format!("discrete controller {what}"),
                    expected,
                    found,
                });
            }
            Ok(())
        };
        dim("A columns", n, a.ncols())?;
        dim("B rows", n, b.nrows())?;
        dim("C columns", n, c.ncols())?;
        dim("D rows", c.nrows(), d.nrows())?;
        dim("D columns", b.ncols(), d.ncols())?;
        Ok(Self {
            a,
            b,
            c,
            d,
            state: DVec::zeros(n),
            pending: DVec::zeros(n),
        })
    }

    /// Static gain `y = D u`
    pub fn gain(d: Mat) -> Self {
        let (outputs, inputs) = d.shape();
        Self {
            a: Mat::zeros(0, 0),
            b: Mat::zeros(0, inputs),
            c: Mat::zeros(outputs, 0),
            d,
            state: DVec::zeros(0),
            pending: DVec::zeros(0),
        }
    }

    pub fn inputs(&self) -> usize {
        self.d.ncols()
    }

    pub fn outputs(&self) -> usize {
        self.d.nrows()
    }

    pub fn state(&self) -> &DVec {
        &self.state
    }

    /// Output for control errors `u`
    pub fn output(&mut self, u: &DVec) -> RotorResult<DVec> {
        if u.len() != self.inputs() {
            return Err(RotorError::DimensionMismatch {
                what: "discrete controller input".to_string(),
                expected: self.inputs(),
                found: u.len(),
            });
        }
        self.pending = &self.a * &self.state + &self.b * u;
        Ok(&self.c * &self.state + &self.d * u)
    }

    pub fn commit(&mut self) {
        self.state.copy_from(&self.pending);
    }

    pub fn reset(&mut self) {
        self.state.fill(0.0);
        self.pending.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_order_filter_steps() {
        // x[k+1] = 0.5 x + u, y = x
        let mut ctl = DiscreteController::new(
            Mat::from_element(1, 1, 0.5),
            Mat::from_element(1, 1, 1.0),
            Mat::from_element(1, 1, 1.0),
            Mat::zeros(1, 1),
        )
        .unwrap();
        let u = DVec::from_element(1, 1.0);
        let ys: Vec<f64> = (0..3)
            .map(|_| {
                let y = ctl.output(&u).unwrap()[0];
                ctl.commit();
                y
            })
            .collect();
        assert_relative_eq!(ys[0], 0.0);
        assert_relative_eq!(ys[1], 1.0);
        assert_relative_eq!(ys[2], 1.5);
    }

    #[test]
    fn test_dimension_checks() {
        let bad = DiscreteController::new(Mat::zeros(2, 2), Mat::zeros(1, 1), Mat::zeros(1, 2), Mat::zeros(1, 1));
        assert!(bad.is_err());
        let mut gain = DiscreteController::gain(Mat::identity(2, 2) * 3.0);
        assert!(gain.output(&DVec::zeros(3)).is_err());
        let y = gain.output(&DVec::from_vec(vec![1.0, 2.0])).unwrap();
        assert_eq!(y, DVec::from_vec(vec![3.0, 6.0]));
    }
}
