//! Shaft element - two-node, 12-DOF beam with spin effects
//!
//! Each node carries `[x, y, z, α, β, θ]`. Bending is formulated per plane on
//! `(w1, ψ1, w2, ψ2)` with `ψ = ∂w/∂z`, then scattered into the 12x12 layout:
//! the x-plane rotation is β, the y-plane rotation is `−α`.

use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::{Element, LocalMatrices, Material};
use crate::dof::DofMap;
use crate::error::{RotorError, RotorResult};
use crate::math::{gauss_points_unit, scatter_plane, Mat, Mat12, Mat4};

const X_PLANE: [usize; 4] = [0, 4, 6, 10];
const X_SIGNS: [f64; 4] = [1.0, 1.0, 1.0, 1.0];
const Y_PLANE: [usize; 4] = [1, 3, 7, 9];
const Y_SIGNS: [f64; 4] = [1.0, -1.0, 1.0, -1.0];
const AXIAL: [usize; 2] = [2, 8];
const TORSION: [usize; 2] = [5, 11];

/// A cylindrical or conical shaft segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaftElement {
    /// Left node; assigned during rotor numbering when `None`
    pub n: Option<usize>,
    /// Element length (m)
    pub length: f64,
    /// Inner diameter at the left end (m)
    pub idl: f64,
    /// Outer diameter at the left end (m)
    pub odl: f64,
    /// Inner diameter at the right end (m)
    pub idr: f64,
    /// Outer diameter at the right end (m)
    pub odr: f64,
    pub material: Material,
    /// Timoshenko shear deformation
    pub shear_effects: bool,
    /// Rotary inertia in the mass matrix
    pub rotary_inertia: bool,
    /// Gyroscopic coupling
    pub gyroscopic: bool,
    /// Axial force (N), tension positive
    pub axial_force: f64,
    /// Torque (N·m)
    pub torque: f64,
    /// Mass-proportional internal damping coefficient
    pub alpha: f64,
    /// Stiffness-proportional internal damping coefficient
    pub beta: f64,
    pub tag: Option<String>,
}

/// Cross-section quantities used by the element matrices
#[derive(Debug, Clone, Copy)]
struct Section {
    area: f64,
    inertia: f64,
    kappa: f64,
}

impl ShaftElement {
    /// Cylindrical element with all beam effects enabled
    pub fn new(length: f64, id: f64, od: f64, material: Material) -> Self {
        Self::conical(length, id, od, id, od, material)
    }

    /// Tapered element with distinct end diameters
    pub fn conical(length: f64, idl: f64, odl: f64, idr: f64, odr: f64, material: Material) -> Self {
        Self {
            n: None,
            length,
            idl,
            odl,
            idr,
            odr,
            material,
            shear_effects: true,
            rotary_inertia: true,
            gyroscopic: true,
            axial_force: 0.0,
            torque: 0.0,
            alpha: 0.0,
            beta: 0.0,
            tag: None,
        }
    }

    /// Pin the element to left node `n`
    pub fn with_n(mut self, n: usize) -> Self {
        self.n = Some(n);
        self
    }

    pub fn with_shear_effects(mut self, enabled: bool) -> Self {
        self.shear_effects = enabled;
        self
    }

    pub fn with_rotary_inertia(mut self, enabled: bool) -> Self {
        self.rotary_inertia = enabled;
        self
    }

    pub fn with_gyroscopic(mut self, enabled: bool) -> Self {
        self.gyroscopic = enabled;
        self
    }

    /// Constant axial force, tension positive
    pub fn with_axial_force(mut self, force: f64) -> Self {
        self.axial_force = force;
        self
    }

    pub fn with_torque(mut self, torque: f64) -> Self {
        self.torque = torque;
        self
    }

    /// Proportional internal damping `C = αM + βK`
    pub fn with_damping(mut self, alpha: f64, beta: f64) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    /// Whether left and right diameters differ
    pub fn is_conical(&self) -> bool {
        (self.idl - self.idr).abs() > f64::EPSILON || (self.odl - self.odr).abs() > f64::EPSILON
    }

    /// Check geometry and material for a usable element
    pub fn validate(&self) -> RotorResult<()> {
        let tag = self.tag();
        if !(self.length > 0.0) {
            return Err(RotorError::element(tag, format!("length must be positive, got {}", self.length)));
        }
        for (name, id, od) in [("left", self.idl, self.odl), ("right", self.idr, self.odr)] {
            if !(id >= 0.0) || !(od > id) {
                return Err(RotorError::element(
                    tag,
                    format!("{name} diameters need 0 <= id < od, got id={id}, od={od}"),
                ));
            }
        }
        if self.material.rho <= 0.0 || self.material.e <= 0.0 || self.material.g_s <= 0.0 {
            return Err(RotorError::element(tag, "material constants must be positive"));
        }
        Ok(())
    }

    fn section(&self) -> Section {
        // Frustum-exact area (volume / length), mean of end inertias
        let outer = self.odl * self.odl + self.odl * self.odr + self.odr * self.odr;
        let inner = self.idl * self.idl + self.idl * self.idr + self.idr * self.idr;
        let area = PI / 12.0 * (outer - inner);

        let inertia_l = PI / 64.0 * (self.odl.powi(4) - self.idl.powi(4));
        let inertia_r = PI / 64.0 * (self.odr.powi(4) - self.idr.powi(4));
        let inertia = 0.5 * (inertia_l + inertia_r);

        let od = 0.5 * (self.odl + self.odr);
        let id = 0.5 * (self.idl + self.idr);
        let kappa = shear_coefficient(id / od, self.material.poisson);

        Section { area, inertia, kappa }
    }

    /// Total element mass (kg)
    pub fn mass(&self) -> f64 {
        self.material.rho * self.section().area * self.length
    }

    /// Position of the center of mass from the left node (m)
    pub fn center_of_mass(&self) -> f64 {
        let al = PI / 4.0 * (self.odl.powi(2) - self.idl.powi(2));
        let ar = PI / 4.0 * (self.odr.powi(2) - self.idr.powi(2));
        if al + ar <= 0.0 {
            return 0.5 * self.length;
        }
        self.length * (al + 2.0 * ar) / (3.0 * (al + ar))
    }

    /// Timoshenko shear parameter φ = 12EI/(κGAL²), zero without shear effects
    pub fn phi(&self) -> f64 {
        if !self.shear_effects {
            return 0.0;
        }
        let s = self.section();
        12.0 * self.material.e * s.inertia / (s.kappa * self.material.g_s * s.area * self.length.powi(2))
    }

    fn translational_mass(&self, phi: f64) -> Mat4 {
        let l = self.length;
        let s = self.section();
        let f = self.material.rho * s.area * l / (1.0 + phi).powi(2);

        let m11 = 13.0 / 35.0 + 7.0 * phi / 10.0 + phi * phi / 3.0;
        let m12 = (11.0 / 210.0 + 11.0 * phi / 120.0 + phi * phi / 24.0) * l;
        let m13 = 9.0 / 70.0 + 3.0 * phi / 10.0 + phi * phi / 6.0;
        let m14 = -(13.0 / 420.0 + 3.0 * phi / 40.0 + phi * phi / 24.0) * l;
        let m22 = (1.0 / 105.0 + phi / 60.0 + phi * phi / 120.0) * l * l;
        let m24 = -(1.0 / 140.0 + phi / 60.0 + phi * phi / 120.0) * l * l;

        #[rustfmt::skip]
        let m = Mat4::from_row_slice(&[
            m11,  m12,  m13,  m14,
            m12,  m22, -m14,  m24,
            m13, -m14,  m11, -m12,
            m14,  m24, -m12,  m22,
        ]);
        m * f
    }

    fn rotary_mass(&self, phi: f64) -> Mat4 {
        let l = self.length;
        let s = self.section();
        let f = self.material.rho * s.inertia / (l * (1.0 + phi).powi(2));

        let r11 = 6.0 / 5.0;
        let r12 = (1.0 / 10.0 - phi / 2.0) * l;
        let r22 = (2.0 / 15.0 + phi / 6.0 + phi * phi / 3.0) * l * l;
        let r24 = (-1.0 / 30.0 - phi / 6.0 + phi * phi / 6.0) * l * l;

        #[rustfmt::skip]
        let r = Mat4::from_row_slice(&[
             r11,  r12, -r11,  r12,
             r12,  r22, -r12,  r24,
            -r11, -r12,  r11, -r12,
             r12,  r24, -r12,  r22,
        ]);
        r * f
    }

    fn bending_stiffness(&self, phi: f64) -> Mat4 {
        let l = self.length;
        let s = self.section();
        let f = self.material.e * s.inertia / (l.powi(3) * (1.0 + phi));

        #[rustfmt::skip]
        let k = Mat4::from_row_slice(&[
            12.0,      6.0 * l,                -12.0,     6.0 * l,
            6.0 * l,   (4.0 + phi) * l * l,    -6.0 * l,  (2.0 - phi) * l * l,
            -12.0,     -6.0 * l,               12.0,      -6.0 * l,
            6.0 * l,   (2.0 - phi) * l * l,    -6.0 * l,  (4.0 + phi) * l * l,
        ]);
        k * f
    }

    fn axial_force_stiffness(&self) -> Mat4 {
        let l = self.length;
        let f = self.axial_force / (30.0 * l);

        #[rustfmt::skip]
        let k = Mat4::from_row_slice(&[
            36.0,     3.0 * l,      -36.0,    3.0 * l,
            3.0 * l,  4.0 * l * l,  -3.0 * l, -l * l,
            -36.0,    -3.0 * l,     36.0,     -3.0 * l,
            3.0 * l,  -l * l,       -3.0 * l, 4.0 * l * l,
        ]);
        k * f
    }

    /// Antisymmetric plane-coupling block from a constant torque
    fn torque_coupling(&self) -> Mat4 {
        let l = self.length;
        let mut a = Mat4::zeros();
        for (xi, w) in gauss_points_unit() {
            let d1 = [
                (-6.0 * xi + 6.0 * xi * xi) / l,
                1.0 - 4.0 * xi + 3.0 * xi * xi,
                (6.0 * xi - 6.0 * xi * xi) / l,
                -2.0 * xi + 3.0 * xi * xi,
            ];
            let d2 = [
                (-6.0 + 12.0 * xi) / (l * l),
                (-4.0 + 6.0 * xi) / l,
                (6.0 - 12.0 * xi) / (l * l),
                (-2.0 + 6.0 * xi) / l,
            ];
            for i in 0..4 {
                for j in 0..4 {
                    a[(i, j)] += w * l * d1[i] * d2[j];
                }
            }
        }
        (a - a.transpose()) * (0.5 * self.torque)
    }

    fn axial_torsion(&self) -> (Matrix2<f64>, Matrix2<f64>, Matrix2<f64>, Matrix2<f64>) {
        let l = self.length;
        let s = self.section();
        let polar = 2.0 * s.inertia;
        let unit_k = Matrix2::new(1.0, -1.0, -1.0, 1.0);
        let unit_m = Matrix2::new(2.0, 1.0, 1.0, 2.0) / 6.0;

        let k_axial = unit_k * (self.material.e * s.area / l);
        let m_axial = unit_m * (self.material.rho * s.area * l);
        let k_torsion = unit_k * (self.material.g_s * polar / l);
        let m_torsion = unit_m * (self.material.rho * polar * l);
        (k_axial, m_axial, k_torsion, m_torsion)
    }

    fn scatter_both_planes(target: &mut Mat12, block: &Mat4) {
        scatter_plane(target, block, &X_PLANE, &X_SIGNS, &X_PLANE, &X_SIGNS);
        scatter_plane(target, block, &Y_PLANE, &Y_SIGNS, &Y_PLANE, &Y_SIGNS);
    }

    fn scatter_bar(target: &mut Mat12, block: &Matrix2<f64>, dofs: &[usize; 2]) {
        for (i, &di) in dofs.iter().enumerate() {
            for (j, &dj) in dofs.iter().enumerate() {
                target[(di, dj)] += block[(i, j)];
            }
        }
    }

    /// 12x12 mass matrix
    pub fn mass_matrix(&self) -> Mat12 {
        let phi = self.phi();
        let mut plane = self.translational_mass(phi);
        if self.rotary_inertia {
            plane += self.rotary_mass(phi);
        }
        let mut m = Mat12::zeros();
        Self::scatter_both_planes(&mut m, &plane);
        let (_, m_axial, _, m_torsion) = self.axial_torsion();
        Self::scatter_bar(&mut m, &m_axial, &AXIAL);
        Self::scatter_bar(&mut m, &m_torsion, &TORSION);
        m
    }

    /// 12x12 stiffness matrix, axial force and torque terms included
    pub fn stiffness_matrix(&self) -> Mat12 {
        let mut plane = self.bending_stiffness(self.phi());
        if self.axial_force != 0.0 {
            plane += self.axial_force_stiffness();
        }
        let mut k = Mat12::zeros();
        Self::scatter_both_planes(&mut k, &plane);

        if self.torque != 0.0 {
            let t = self.torque_coupling();
            scatter_plane(&mut k, &t, &X_PLANE, &X_SIGNS, &Y_PLANE, &Y_SIGNS);
            scatter_plane(&mut k, &t.transpose(), &Y_PLANE, &Y_SIGNS, &X_PLANE, &X_SIGNS);
        }

        let (k_axial, _, k_torsion, _) = self.axial_torsion();
        Self::scatter_bar(&mut k, &k_axial, &AXIAL);
        Self::scatter_bar(&mut k, &k_torsion, &TORSION);
        k
    }

    /// 12x12 gyroscopic matrix per unit spin speed
    pub fn gyroscopic_matrix(&self) -> Mat12 {
        let mut g = Mat12::zeros();
        if !self.gyroscopic {
            return g;
        }
        let r2 = self.rotary_mass(self.phi()) * 2.0;
        scatter_plane(&mut g, &r2, &X_PLANE, &X_SIGNS, &Y_PLANE, &Y_SIGNS);
        scatter_plane(&mut g, &(-r2), &Y_PLANE, &Y_SIGNS, &X_PLANE, &X_SIGNS);
        g
    }

    /// 12x12 internal damping matrix
    pub fn damping_matrix(&self) -> Mat12 {
        if self.alpha == 0.0 && self.beta == 0.0 {
            return Mat12::zeros();
        }
        self.mass_matrix() * self.alpha + self.stiffness_matrix() * self.beta
    }

    /// Split into two elements at `fraction` of the length from the left end
    pub fn split(&self, fraction: f64) -> RotorResult<(Self, Self)> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(RotorError::element(
                self.tag(),
                format!("split fraction must be in (0, 1), got {fraction}"),
            ));
        }
        let lerp = |a: f64, b: f64| a + (b - a) * fraction;
        let (idm, odm) = (lerp(self.idl, self.idr), lerp(self.odl, self.odr));

        let mut left = self.clone();
        left.length = self.length * fraction;
        left.idr = idm;
        left.odr = odm;

        let mut right = self.clone();
        right.length = self.length - left.length;
        right.idl = idm;
        right.odl = odm;
        right.n = self.n.map(|n| n + 1);

        Ok((left, right))
    }
}

/// Hutchinson shear coefficient for a hollow circular section, `r = id/od`
pub fn shear_coefficient(r: f64, nu: f64) -> f64 {
    let r2 = r * r;
    let a = (1.0 + r2).powi(2);
    6.0 * (1.0 + nu).powi(2) * a
        / (a * (7.0 + 12.0 * nu + 4.0 * nu * nu) + 4.0 * r2 * (5.0 + 6.0 * nu + 2.0 * nu * nu))
}

fn to_dynamic(m: &Mat12) -> Mat {
    Mat::from_column_slice(12, 12, m.as_slice())
}

impl Element for ShaftElement {
    fn tag(&self) -> String {
        match (&self.tag, self.n) {
            (Some(t), _) => t.clone(),
            (None, Some(n)) => format!("ShaftElement {n}"),
            (None, None) => "ShaftElement".to_string(),
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
        Ok(LocalMatrices {
            m: to_dynamic(&self.mass_matrix()),
            k: to_dynamic(&self.stiffness_matrix()),
            c: to_dynamic(&self.damping_matrix()),
            g: to_dynamic(&self.gyroscopic_matrix()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn element() -> ShaftElement {
        ShaftElement::new(0.25, 0.0, 0.05, Material::steel()).with_n(0)
    }

    fn plane_vector(x: [f64; 4]) -> nalgebra::SVector<f64, 12> {
        // x-plane vector (x1, β1, x2, β2)
        let mut v = nalgebra::SVector::<f64, 12>::zeros();
        for (i, &d) in X_PLANE.iter().enumerate() {
            v[d] = x[i];
        }
        v
    }

    #[test]
    fn test_rigid_translation_carries_total_mass() {
        for shear in [false, true] {
            let el = element().with_shear_effects(shear).with_rotary_inertia(false);
            let v = plane_vector([1.0, 0.0, 1.0, 0.0]);
            let m = el.mass_matrix();
            assert_relative_eq!((v.transpose() * m * v)[(0, 0)], el.mass(), max_relative = 1e-12);
        }
    }

    #[test]
    fn test_rigid_body_motion_is_stress_free() {
        let el = element();
        let k = el.stiffness_matrix();
        let l = el.length;
        let rotation = plane_vector([0.0, 1.0, l, 1.0]);
        assert!((k * rotation).norm() < 1e-6 * k.norm());

        let mut axial = nalgebra::SVector::<f64, 12>::zeros();
        axial[2] = 1.0;
        axial[8] = 1.0;
        assert!((k * axial).norm() < 1e-6 * k.norm());
    }

    #[test]
    fn test_symmetry_and_skew_symmetry() {
        let el = element().with_torque(500.0).with_axial_force(1e4);
        let m = el.mass_matrix();
        let k = el.stiffness_matrix();
        let g = el.gyroscopic_matrix();
        assert_relative_eq!(m, m.transpose(), epsilon = 1e-12);
        assert_relative_eq!(k, k.transpose(), epsilon = 1e-6);
        assert_relative_eq!(g, -g.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_sign_convention() {
        // Positive β rotates the x-plane like ∂x/∂z; α carries −∂y/∂z
        let el = element().with_shear_effects(false);
        let k = el.stiffness_matrix();
        assert!(k[(0, 4)] > 0.0);
        assert!(k[(1, 3)] < 0.0);
        assert_relative_eq!(k[(0, 4)], -k[(1, 3)], max_relative = 1e-12);

        // Gyroscopic coupling between the rotations matches a disk: G[β, α] < 0
        let g = el.gyroscopic_matrix();
        assert!(g[(4, 3)] < 0.0);
        assert!(g[(3, 4)] > 0.0);
    }

    #[test]
    fn test_shear_coefficient_solid_section() {
        let nu: f64 = 0.3;
        let expected = 6.0 * (1.0 + nu).powi(2) / (7.0 + 12.0 * nu + 4.0 * nu * nu);
        assert_relative_eq!(shear_coefficient(0.0, nu), expected, max_relative = 1e-12);
    }

    #[test]
    fn test_split_preserves_mass_and_taper() {
        let el = ShaftElement::conical(0.4, 0.0, 0.06, 0.01, 0.04, Material::steel()).with_n(2);
        let (a, b) = el.split(0.25).unwrap();
        assert_relative_eq!(a.length + b.length, el.length, max_relative = 1e-12);
        assert_relative_eq!(a.odr, 0.055, max_relative = 1e-12);
        assert_relative_eq!(a.mass() + b.mass(), el.mass(), max_relative = 1e-9);
        assert_eq!(b.n, Some(3));
        assert!(el.split(1.0).is_err());
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        let err = ShaftElement::new(0.2, 0.06, 0.05, Material::steel()).validate().unwrap_err();
        assert!(matches!(err, RotorError::InvalidElement { .. }));
    }
}
