//! Gear element: a disk with tooth geometry for gear mesh coupling

use serde::{Deserialize, Serialize};

use super::{DiskElement, Element, LocalMatrices, Material};
use crate::dof::DofMap;
use crate::error::{RotorError, RotorResult};

/// A spur or helical gear mounted on a shaft node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GearElement {
    pub disk: DiskElement,
    /// Number of teeth
    pub n_teeth: usize,
    /// Pitch diameter (m)
    pub pitch_diameter: f64,
    /// Base circle diameter (m)
    pub base_diameter: f64,
    /// Pressure angle (rad)
    pub pressure_angle: f64,
    /// Helix angle (rad), zero for spur gears
    pub helix_angle: f64,
}

impl GearElement {
    /// Gear from mass, inertias and pitch diameter
    pub fn new(
        n: usize,
        m: f64,
        id: f64,
        ip: f64,
        pitch_diameter: f64,
        n_teeth: usize,
        pressure_angle: f64,
    ) -> Self {
        Self {
            disk: DiskElement::new(n, m, id, ip),
            n_teeth,
            pitch_diameter,
            base_diameter: pitch_diameter * pressure_angle.cos(),
            pressure_angle,
            helix_angle: 0.0,
        }
    }

    /// Gear body from a uniform annulus between `i_d` and the pitch diameter
    pub fn from_geometry(
        n: usize,
        material: &Material,
        width: f64,
        i_d: f64,
        pitch_diameter: f64,
        n_teeth: usize,
        pressure_angle: f64,
    ) -> Self {
        let disk = DiskElement::from_geometry(n, material, width, i_d, pitch_diameter);
        Self::new(n, disk.m, disk.id, disk.ip, pitch_diameter, n_teeth, pressure_angle)
    }

    /// Override the base diameter; the pitch diameter follows from the pressure angle
    pub fn with_base_diameter(mut self, base_diameter: f64) -> Self {
        self.base_diameter = base_diameter;
        self.pitch_diameter = base_diameter / self.pressure_angle.cos();
        self
    }

    pub fn with_helix_angle(mut self, helix_angle: f64) -> Self {
        self.helix_angle = helix_angle;
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.disk.tag = Some(tag.to_string());
        self
    }

    /// Shaft node carrying the gear
    pub fn n(&self) -> usize {
        self.disk.n
    }

    /// Base circle radius
    pub fn base_radius(&self) -> f64 {
        0.5 * self.base_diameter
    }

    pub fn validate(&self) -> RotorResult<()> {
        self.disk.validate()?;
        if !(self.pitch_diameter > 0.0) || !(self.pressure_angle.cos() > 0.0) {
            return Err(RotorError::element(
                self.tag(),
                format!(
                    "pitch diameter {} and pressure angle {} give no base circle",
                    self.pitch_diameter, self.pressure_angle
                ),
            ));
        }
        Ok(())
    }
}

impl Element for GearElement {
    fn tag(&self) -> String {
        self.disk.tag.clone().unwrap_or_else(|| format!("GearElement {}", self.disk.n))
    }

    fn nodes(&self) -> Vec<usize> {
        self.disk.nodes()
    }

    fn dof_indices(&self, map: &DofMap) -> RotorResult<Vec<usize>> {
        Ok(map.require_shaft(&self.tag(), self.disk.n)?.to_vec())
    }

    fn local_matrices(&self, _frequency: f64, _speed: f64) -> RotorResult<LocalMatrices> {
        Ok(self.disk.matrices())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_base_radius_from_pitch() {
        let alpha = 20f64.to_radians();
        let gear = GearElement::new(1, 5.0, 0.02, 0.04, 0.2, 40, alpha);
        assert_relative_eq!(gear.base_radius(), 0.1 * alpha.cos(), max_relative = 1e-12);
    }

    #[test]
    fn test_base_diameter_override_updates_pitch() {
        let alpha = 22.5f64.to_radians();
        let gear = GearElement::new(1, 5.0, 0.02, 0.04, 0.2, 40, alpha).with_base_diameter(0.15);
        assert_relative_eq!(gear.pitch_diameter * alpha.cos(), 0.15, max_relative = 1e-12);
    }
}
