//! Flexible coupling between two shaft nodes

use serde::{Deserialize, Serialize};

use super::{Element, LocalMatrices};
use crate::dof::DofMap;
use crate::error::{RotorError, RotorResult};
use crate::math::Mat;

/// Coupling with six uncoupled springs and dampers between nodes `n` and `n + 1`
///
/// Stiffness and damping are ordered `[x, y, z, α, β, θ]`. Mass and inertias
/// are lumped half at each end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingElement {
    pub n: Option<usize>,
    pub stiffness: [f64; 6],
    pub damping: [f64; 6],
    /// Total mass (kg)
    pub m: f64,
    /// Diametral moment of inertia (kg·m²)
    pub id: f64,
    /// Polar moment of inertia (kg·m²)
    pub ip: f64,
    /// Axial length occupied on the shaft line (m)
    pub length: f64,
    /// Outer diameter, used for geometry only (m)
    pub od: f64,
    pub tag: Option<String>,
}

impl CouplingElement {
    /// Coupling with translational stiffness `kt` and rotational stiffness
    /// `kr` in every direction
    pub fn new(kt: f64, kr: f64, length: f64) -> Self {
        Self {
            n: None,
            stiffness: [kt, kt, kt, kr, kr, kr],
            damping: [0.0; 6],
            m: 0.0,
            id: 0.0,
            ip: 0.0,
            length,
            od: 0.0,
            tag: None,
        }
    }

    pub fn with_n(mut self, n: usize) -> Self {
        self.n = Some(n);
        self
    }

    /// Per-direction stiffness `[kt_x, kt_y, kt_z, kr_x, kr_y, kr_z]`
    pub fn with_stiffness(mut self, stiffness: [f64; 6]) -> Self {
        self.stiffness = stiffness;
        self
    }

    /// Per-direction damping `[ct_x, ct_y, ct_z, cr_x, cr_y, cr_z]`
    pub fn with_damping(mut self, damping: [f64; 6]) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_inertia(mut self, m: f64, id: f64, ip: f64) -> Self {
        self.m = m;
        self.id = id;
        self.ip = ip;
        self
    }

    pub fn with_outer_diameter(mut self, od: f64) -> Self {
        self.od = od;
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn validate(&self) -> RotorResult<()> {
        if !(self.length >= 0.0) {
            return Err(RotorError::element(self.tag(), "length must be non-negative"));
        }
        if self.stiffness.iter().chain(&self.damping).any(|v| !v.is_finite()) {
            return Err(RotorError::element(self.tag(), "stiffness and damping must be finite"));
        }
        Ok(())
    }

    fn spring(values: &[f64; 6]) -> Mat {
        let mut out = Mat::zeros(12, 12);
        for (i, &v) in values.iter().enumerate() {
            out[(i, i)] = v;
            out[(i + 6, i + 6)] = v;
            out[(i, i + 6)] = -v;
            out[(i + 6, i)] = -v;
        }
        out
    }
}

impl Element for CouplingElement {
    fn tag(&self) -> String {
        match (&self.tag, self.n) {
            (Some(t), _) => t.clone(),
            (None, Some(n)) => format!("CouplingElement {n}"),
            (None, None) => "CouplingElement".to_string(),
        }
    }

    fn nodes(&self) -> Vec<usize> {
        self.n.map(|n| vec![n, n + 1]).unwrap_or_default()
    }

    fn dof_indices(&self, map: &DofMap) -> RotorResult<Vec<usize>> {
        let n = self
            .n
            .ok_or_else(|| RotorError::element(self.tag(), "element has not been numbered"))?;
        let tag = self.tag();
        let mut dofs = map.require_shaft(&tag, n)?.to_vec();
        dofs.extend_from_slice(&map.require_shaft(&tag, n + 1)?);
        Ok(dofs)
    }

    fn local_matrices(&self, _frequency: f64, _speed: f64) -> RotorResult<LocalMatrices> {
        let (hm, hid, hip) = (0.5 * self.m, 0.5 * self.id, 0.5 * self.ip);
        let half = [hm, hm, hm, hid, hid, hip];
        let mut m = Mat::zeros(12, 12);
        let mut g = Mat::zeros(12, 12);
        for (i, &v) in half.iter().enumerate() {
            m[(i, i)] = v;
            m[(i + 6, i + 6)] = v;
        }
        for base in [0, 6] {
            g[(base + 3, base + 4)] = hip;
            g[(base + 4, base + 3)] = -hip;
        }
        Ok(LocalMatrices {
            m,
            k: Self::spring(&self.stiffness),
            c: Self::spring(&self.damping),
            g,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spring_pattern_and_lumped_mass() {
        let c = CouplingElement::new(1e7, 5e4, 0.1)
            .with_damping([10.0; 6])
            .with_inertia(2.0, 0.01, 0.02)
            .with_n(3);
        let mats = c.local_matrices(0.0, 0.0).unwrap();
        assert_eq!(mats.k[(0, 0)], 1e7);
        assert_eq!(mats.k[(0, 6)], -1e7);
        assert_eq!(mats.k[(5, 11)], -5e4);
        assert_eq!(mats.c[(7, 1)], -10.0);
        assert_eq!(mats.m[(0, 0)] + mats.m[(6, 6)], 2.0);
        assert_eq!(mats.g[(9, 10)], 0.01);
        assert_eq!(c.nodes(), vec![3, 4]);
    }
}
