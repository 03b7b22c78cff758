//! Rotor elements
//!
//! Every element exposes the same capability: local matrices evaluated at a
//! given excitation frequency and spin speed, plus the global DOF they occupy.
//! Gyroscopic matrices are returned per unit spin speed.

mod bearing;
mod coupling;
mod disk;
mod gear;
mod magnetic;
mod material;
mod point_mass;
mod shaft;

pub use bearing::{BearingElement, Coefficient, TableAxis};
pub use coupling::CouplingElement;
pub use disk::DiskElement;
pub use gear::GearElement;
pub use magnetic::{AmbGains, MagneticBearingElement};
pub use material::Material;
pub use point_mass::PointMass;
pub use shaft::ShaftElement;

use serde::{Deserialize, Serialize};

use crate::dof::DofMap;
use crate::error::RotorResult;
use crate::math::Mat;

/// Local matrices of one element, indexed like `Element::dof_indices`
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMatrices {
    pub m: Mat,
    pub k: Mat,
    pub c: Mat,
    /// Gyroscopic matrix per unit spin speed
    pub g: Mat,
}

impl LocalMatrices {
    /// All-zero matrices of size `n`
    pub fn zeros(n: usize) -> Self {
        Self {
            m: Mat::zeros(n, n),
            k: Mat::zeros(n, n),
            c: Mat::zeros(n, n),
            g: Mat::zeros(n, n),
        }
    }
}

/// Capability shared by all rotor elements
pub trait Element {
    /// Human-readable element label used in diagnostics
    fn tag(&self) -> String;

    /// Nodes referenced by the element
    fn nodes(&self) -> Vec<usize>;

    /// Global DOF indices occupied by the element's local matrices
    fn dof_indices(&self, map: &DofMap) -> RotorResult<Vec<usize>>;

    /// Local matrices at excitation `frequency` and spin `speed` (rad/s)
    fn local_matrices(&self, frequency: f64, speed: f64) -> RotorResult<LocalMatrices>;
}

/// Element occupying a slot of the shaft line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShaftSegment {
    Shaft(ShaftElement),
    Coupling(CouplingElement),
}

impl ShaftSegment {
    /// Left node, once numbered
    pub fn n(&self) -> Option<usize> {
        match self {
            ShaftSegment::Shaft(s) => s.n,
            ShaftSegment::Coupling(c) => c.n,
        }
    }

    pub(crate) fn set_n(&mut self, n: usize) {
        match self {
            ShaftSegment::Shaft(s) => s.n = Some(n),
            ShaftSegment::Coupling(c) => c.n = Some(n),
        }
    }

    /// Axial length
    pub fn length(&self) -> f64 {
        match self {
            ShaftSegment::Shaft(s) => s.length,
            ShaftSegment::Coupling(c) => c.length,
        }
    }

    /// Outer diameters at the left and right ends
    pub fn outer_diameters(&self) -> (f64, f64) {
        match self {
            ShaftSegment::Shaft(s) => (s.odl, s.odr),
            ShaftSegment::Coupling(c) => (c.od, c.od),
        }
    }

    /// Whether the segment is a tapered shaft
    pub fn is_conical(&self) -> bool {
        match self {
            ShaftSegment::Shaft(s) => s.is_conical(),
            ShaftSegment::Coupling(_) => false,
        }
    }

    /// Borrow as the element trait
    pub fn as_element(&self) -> &dyn Element {
        match self {
            ShaftSegment::Shaft(s) => s,
            ShaftSegment::Coupling(c) => c,
        }
    }

    /// Shaft element, if this slot holds one
    pub fn as_shaft(&self) -> Option<&ShaftElement> {
        match self {
            ShaftSegment::Shaft(s) => Some(s),
            ShaftSegment::Coupling(_) => None,
        }
    }
}

impl From<ShaftElement> for ShaftSegment {
    fn from(s: ShaftElement) -> Self {
        ShaftSegment::Shaft(s)
    }
}

impl From<CouplingElement> for ShaftSegment {
    fn from(c: CouplingElement) -> Self {
        ShaftSegment::Coupling(c)
    }
}
