//! Rigid disk element

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::{Element, LocalMatrices, Material};
use crate::dof::DofMap;
use crate::error::{RotorError, RotorResult};
use crate::math::Mat;

/// A rigid disk lumped at a shaft node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskElement {
    /// Shaft node carrying the disk
    pub n: usize,
    /// Mass (kg)
    pub m: f64,
    /// Diametral moment of inertia (kg·m²)
    pub id: f64,
    /// Polar moment of inertia (kg·m²)
    pub ip: f64,
    pub tag: Option<String>,
}

impl DiskElement {
    /// Disk from mass and inertias
    pub fn new(n: usize, m: f64, id: f64, ip: f64) -> Self {
        Self {
            n,
            m,
            id,
            ip,
            tag: None,
        }
    }

    /// Disk from a uniform annulus of `width`, inner diameter `i_d` and
    /// outer diameter `o_d`
    pub fn from_geometry(n: usize, material: &Material, width: f64, i_d: f64, o_d: f64) -> Self {
        let m = material.rho * PI / 4.0 * (o_d * o_d - i_d * i_d) * width;
        let ip = m * (o_d * o_d + i_d * i_d) / 8.0;
        let id = 0.5 * ip + m * width * width / 12.0;
        Self::new(n, m, id, ip)
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn validate(&self) -> RotorResult<()> {
        if !(self.m >= 0.0) || !(self.id >= 0.0) || !(self.ip >= 0.0) {
            return Err(RotorError::element(
                self.tag(),
                format!("mass and inertias must be non-negative (m={}, Id={}, Ip={})", self.m, self.id, self.ip),
            ));
        }
        Ok(())
    }

    pub(crate) fn matrices(&self) -> LocalMatrices {
        let mut mats = LocalMatrices::zeros(6);
        mats.m = Mat::from_diagonal(&nalgebra::DVector::from_vec(vec![
            self.m, self.m, self.m, self.id, self.id, self.ip,
        ]));
        mats.g[(3, 4)] = self.ip;
        mats.g[(4, 3)] = -self.ip;
        mats
    }
}

impl Element for DiskElement {
    fn tag(&self) -> String {
        self.tag.clone().unwrap_or_else(|| format!("DiskElement {}", self.n))
    }

    fn nodes(&self) -> Vec<usize> {
        vec![self.n]
    }

    fn dof_indices(&self, map: &DofMap) -> RotorResult<Vec<usize>> {
        Ok(map.require_shaft(&self.tag(), self.n)?.to_vec())
    }

    fn local_matrices(&self, _frequency: f64, _speed: f64) -> RotorResult<LocalMatrices> {
        Ok(self.matrices())
    }
}
