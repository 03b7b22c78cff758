//! Rotating unbalance forces

use serde::{Deserialize, Serialize};

use crate::analysis::SpeedProfile;
use crate::error::{RotorError, RotorResult};
use crate::math::{cumulative_trapezoid, gradient, Mat};
use crate::rotor::RotorSystem;

/// Unbalance `m·e` rotating with a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Unbalance {
    pub node: usize,
    /// Magnitude (kg·m)
    pub magnitude: f64,
    /// Angular position at `t = 0` (rad)
    pub phase: f64,
}

impl Unbalance {
    pub fn new(node: usize, magnitude: f64, phase: f64) -> Self {
        Self { node, magnitude, phase }
    }
}

/// Force history of rotating unbalances and the angular position of the
/// driving rotor
///
/// An unbalance at angle `ψ = r·∫Ω dt + φ`, with `r` the speed ratio of its
/// node, loads the shaft with
///
/// ```text
/// Fx = m·e·(ψ̇² cos ψ + ψ̈ sin ψ)
/// Fy = m·e·(ψ̇² sin ψ - ψ̈ cos ψ)
/// ```
///
/// Returns the force as `ntime x ndof` and the angle `∫Ω dt` per sample.
pub fn unbalance_force_over_time<S>(
    system: &S,
    unbalances: &[Unbalance],
    speed: &SpeedProfile,
    t: &[f64],
) -> RotorResult<(Mat, Vec<f64>)>
where
    S: RotorSystem + ?Sized,
{
    let n = system.ndof();
    let speeds = speed.samples(t.len())?;
    let accel = gradient(&speeds, t);
    let theta = cumulative_trapezoid(&speeds, t);

    let mut force = Mat::zeros(t.len(), n);
    for u in unbalances {
        let [dx, dy, _] = system.translational_dofs(u.node).ok_or_else(|| RotorError::NodeOutOfRange {
            element: "Unbalance".to_string(),
            node: u.node,
            max: n,
        })?;
        let ratio = system.speed_ratio(u.node);
        for i in 0..t.len() {
            let psi = ratio * theta[i] + u.phase;
            let (w, dw) = (ratio * speeds[i], ratio * accel[i]);
            let (s, c) = psi.sin_cos();
            force[(i, dx)] += u.magnitude * (w * w * c + dw * s);
            force[(i, dy)] += u.magnitude * (w * w * s - dw * c);
        }
    }
    Ok((force, theta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{Material, ShaftElement};
    use crate::rotor::Rotor;
    use approx::assert_relative_eq;

    fn rotor() -> Rotor {
        Rotor::builder()
            .add_shafts((0..2).map(|_| ShaftElement::new(0.2, 0.0, 0.04, Material::steel())))
            .build()
            .unwrap()
    }

    #[test]
    fn test_constant_speed_force_rotates() {
        let rotor = rotor();
        let t: Vec<f64> = (0..100).map(|i| i as f64 * 1e-3).collect();
        let w = 50.0;
        let (f, theta) =
            unbalance_force_over_time(&rotor, &[Unbalance::new(1, 2e-3, 0.3)], &SpeedProfile::Constant(w), &t).unwrap();
        let [dx, dy, _] = rotor.translational_dofs(1).unwrap();
        for i in [0, 37, 99] {
            assert_relative_eq!(theta[i], w * t[i], epsilon = 1e-12);
            assert_relative_eq!(f[(i, dx)], 2e-3 * w * w * (w * t[i] + 0.3).cos(), epsilon = 1e-9);
            assert_relative_eq!(f[(i, dy)], 2e-3 * w * w * (w * t[i] + 0.3).sin(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_run_up_adds_tangential_term() {
        let rotor = rotor();
        let t: Vec<f64> = (0..11).map(|i| i as f64 * 0.1).collect();
        // From rest: only the Ω̇ term acts at t = 0
        let profile = SpeedProfile::ramp(0.0, 10.0, 11);
        let (f, _) = unbalance_force_over_time(&rotor, &[Unbalance::new(0, 1.0, 0.0)], &profile, &t).unwrap();
        assert_relative_eq!(f[(0, 0)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(f[(0, 1)], -10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unknown_node_rejected() {
        let rotor = rotor();
        let err = unbalance_force_over_time(&rotor, &[Unbalance::new(9, 1.0, 0.0)], &SpeedProfile::Constant(1.0), &[0.0, 1.0]);
        assert!(matches!(err, Err(RotorError::NodeOutOfRange { node: 9, .. })));
    }
}
