//! Point mass on a node's translations

use serde::{Deserialize, Serialize};

use super::{Element, LocalMatrices};
use crate::dof::DofMap;
use crate::error::{RotorError, RotorResult};
use crate::math::Mat;

/// Lumped mass, typically placed on a linked support node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointMass {
    pub n: usize,
    pub mx: f64,
    pub my: f64,
    pub mz: f64,
    pub tag: Option<String>,
}

impl PointMass {
    /// Isotropic point mass
    pub fn new(n: usize, m: f64) -> Self {
        Self::anisotropic(n, m, m, m)
    }

    pub fn anisotropic(n: usize, mx: f64, my: f64, mz: f64) -> Self {
        Self {
            n,
            mx,
            my,
            mz,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn validate(&self) -> RotorResult<()> {
        if !(self.mx > 0.0 && self.my > 0.0 && self.mz > 0.0) {
            return Err(RotorError::element(
                self.tag(),
                format!("masses must be positive (mx={}, my={}, mz={})", self.mx, self.my, self.mz),
            ));
        }
        Ok(())
    }
}

impl Element for PointMass {
    fn tag(&self) -> String {
        self.tag.clone().unwrap_or_else(|| format!("PointMass {}", self.n))
    }

    fn nodes(&self) -> Vec<usize> {
        vec![self.n]
    }

    fn dof_indices(&self, map: &DofMap) -> RotorResult<Vec<usize>> {
        Ok(map.require_translational(&self.tag(), self.n)?.to_vec())
    }

    fn local_matrices(&self, _frequency: f64, _speed: f64) -> RotorResult<LocalMatrices> {
        let mut mats = LocalMatrices::zeros(3);
        mats.m = Mat::from_diagonal(&nalgebra::DVector::from_vec(vec![self.mx, self.my, self.mz]));
        Ok(mats)
    }
}
