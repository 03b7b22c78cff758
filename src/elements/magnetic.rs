//! Active magnetic bearing element
//!
//! Electromagnetic parameters follow Schweitzer & Maslen, *Magnetic Bearings*:
//! a differential actuator about bias current `i0` and nominal gap `g0` has a
//! negative position stiffness `ks` and a current gain `ki`.

use serde::{Deserialize, Serialize};

use super::bearing::{link_blocks, linked_dofs};
use super::{Element, LocalMatrices};
use crate::dof::DofMap;
use crate::error::{RotorError, RotorResult};
use crate::math::Mat;

/// Vacuum permeability (H/m)
pub const MU_0: f64 = 4.0e-7 * std::f64::consts::PI;

/// Controller and signal-chain gains of one magnetic bearing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Amplifier gain (A/V)
    pub k_amp: f64,
    /// Sensor gain (V/m)
    pub k_sense: f64,
}

impl Default for AmbGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 1.0,
            k_amp: 1.0,
            k_sense: 1.0,
        }
    }
}

/// Magnetic bearing acting on the lateral translations of node `n`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagneticBearingElement {
    pub n: usize,
    pub n_link: Option<usize>,
    /// Nominal air gap (m)
    pub g0: f64,
    /// Bias current (A)
    pub i0: f64,
    /// Pole area (m²)
    pub ag: f64,
    /// Number of windings
    pub nw: f64,
    /// Pole half-angle (rad)
    pub alpha: f64,
    pub gains: AmbGains,
    pub tag: Option<String>,
}

impl MagneticBearingElement {
    pub fn new(n: usize, g0: f64, i0: f64, ag: f64, nw: f64, alpha: f64, gains: AmbGains) -> Self {
        Self {
            n,
            n_link: None,
            g0,
            i0,
            ag,
            nw,
            alpha,
            gains,
            tag: None,
        }
    }

    pub fn with_n_link(mut self, n_link: usize) -> Self {
        self.n_link = Some(n_link);
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn validate(&self) -> RotorResult<()> {
        if !(self.g0 > 0.0) || !(self.ag > 0.0) || !(self.nw > 0.0) {
            return Err(RotorError::element(
                self.tag(),
                format!("g0, ag and nw must be positive (g0={}, ag={}, nw={})", self.g0, self.ag, self.nw),
            ));
        }
        Ok(())
    }

    fn magnetic_constant(&self) -> f64 {
        MU_0 * self.nw * self.nw * self.ag * self.alpha.cos() / 4.0
    }

    /// Position stiffness at the bias point (N/m, negative)
    pub fn ks(&self) -> f64 {
        -4.0 * self.magnetic_constant() * self.i0 * self.i0 / self.g0.powi(3)
    }

    /// Current gain (N/A)
    pub fn ki(&self) -> f64 {
        4.0 * self.magnetic_constant() * self.i0 / self.g0.powi(2)
    }

    /// Closed-loop equivalent stiffness of the PD law
    pub fn equivalent_stiffness(&self) -> f64 {
        let g = &self.gains;
        self.ki() * g.k_amp * g.k_sense * g.kp + self.ks()
    }

    /// Closed-loop equivalent damping of the PD law
    pub fn equivalent_damping(&self) -> f64 {
        let g = &self.gains;
        self.ki() * g.k_amp * g.k_sense * g.kd
    }

    fn lateral(&self, k: f64, c: f64) -> LocalMatrices {
        let mut kb = Mat::zeros(3, 3);
        let mut cb = Mat::zeros(3, 3);
        for i in 0..2 {
            kb[(i, i)] = k;
            cb[(i, i)] = c;
        }
        link_blocks(&kb, &cb, &Mat::zeros(3, 3), self.n_link.is_some())
    }

    /// Matrices with only the negative magnetic stiffness; the control
    /// force is applied externally each time step
    pub fn open_loop_matrices(&self) -> LocalMatrices {
        self.lateral(self.ks(), 0.0)
    }
}

impl Element for MagneticBearingElement {
    fn tag(&self) -> String {
        self.tag.clone().unwrap_or_else(|| format!("MagneticBearing {}", self.n))
    }

    fn nodes(&self) -> Vec<usize> {
        std::iter::once(self.n).chain(self.n_link).collect()
    }

    fn dof_indices(&self, map: &DofMap) -> RotorResult<Vec<usize>> {
        linked_dofs(&self.tag(), map, self.n, self.n_link)
    }

    fn local_matrices(&self, _frequency: f64, _speed: f64) -> RotorResult<LocalMatrices> {
        Ok(self.lateral(self.equivalent_stiffness(), self.equivalent_damping()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn amb() -> MagneticBearingElement {
        let gains = AmbGains {
            kp: 1.0,
            kd: 1.0,
            k_amp: 1.0,
            k_sense: 1.0,
            ..AmbGains::default()
        };
        MagneticBearingElement::new(0, 1e-3, 1.0, 1e-4, 200.0, 0.392, gains)
    }

    #[test]
    fn test_magnetic_constants() {
        let b = amb();
        let k = MU_0 * 200.0 * 200.0 * 1e-4 * 0.392f64.cos() / 4.0;
        assert_relative_eq!(b.ks(), -4.0 * k / 1e-9, max_relative = 1e-12);
        assert_relative_eq!(b.ki(), 4.0 * k / 1e-6, max_relative = 1e-12);
    }

    #[test]
    fn test_equivalent_and_open_loop() {
        let b = amb();
        let closed = b.local_matrices(0.0, 0.0).unwrap();
        assert_relative_eq!(closed.k[(0, 0)], b.ki() + b.ks(), max_relative = 1e-12);
        assert_relative_eq!(closed.c[(1, 1)], b.ki(), max_relative = 1e-12);
        assert_eq!(closed.k[(2, 2)], 0.0);

        let open = b.open_loop_matrices();
        assert_relative_eq!(open.k[(0, 0)], b.ks(), max_relative = 1e-12);
        assert_eq!(open.c.norm(), 0.0);
    }
}
