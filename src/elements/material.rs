//! Material properties

use serde::{Deserialize, Serialize};

use crate::error::{RotorError, RotorResult};

/// Relative tolerance when all three elastic constants are supplied
const CONSISTENCY_TOL: f64 = 1e-3;

/// Isotropic material for shaft and disk elements
///
/// Only two of Young's modulus, shear modulus and Poisson's ratio are
/// independent; the third is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Material name
    pub name: String,
    /// Density in kg/m³
    pub rho: f64,
    /// Young's modulus in Pa
    pub e: f64,
    /// Shear modulus in Pa
    pub g_s: f64,
    /// Poisson's ratio
    pub poisson: f64,
}

impl Material {
    /// Create a material from density and any two (or three consistent)
    /// elastic constants
    pub fn new(
        name: &str,
        rho: f64,
        e: Option<f64>,
        g_s: Option<f64>,
        poisson: Option<f64>,
    ) -> RotorResult<Self> {
        let invalid = |reason: String| RotorError::InvalidMaterial {
            name: name.to_string(),
            reason,
        };

        if !(rho > 0.0) {
            return Err(invalid(format!("density must be positive, got {rho}")));
        }

        let (e, g_s, poisson) = match (e, g_s, poisson) {
            (Some(e), Some(g), None) => (e, g, e / (2.0 * g) - 1.0),
            (Some(e), None, Some(nu)) => (e, e / (2.0 * (1.0 + nu)), nu),
            (None, Some(g), Some(nu)) => (2.0 * g * (1.0 + nu), g, nu),
            (Some(e), Some(g), Some(nu)) => {
                let g_expected = e / (2.0 * (1.0 + nu));
                if ((g - g_expected) / g_expected).abs() > CONSISTENCY_TOL {
                    return Err(invalid(format!(
                        "E={e}, G={g} and Poisson={nu} are inconsistent (G should be {g_expected:.4e})"
                    )));
                }
                (e, g, nu)
            }
            _ => {
                return Err(invalid(
                    "exactly two of E, G_s and Poisson must be given".to_string(),
                ))
            }
        };

        if !(e > 0.0) || !(g_s > 0.0) {
            return Err(invalid(format!("moduli must be positive (E={e}, G={g_s})")));
        }
        if !(poisson > -1.0 && poisson <= 0.5) {
            return Err(invalid(format!("Poisson's ratio {poisson} outside (-1, 0.5]")));
        }

        Ok(Self {
            name: name.to_string(),
            rho,
            e,
            g_s,
            poisson,
        })
    }

    /// Create a material from E and G
    pub fn from_e_g(name: &str, rho: f64, e: f64, g_s: f64) -> RotorResult<Self> {
        Self::new(name, rho, Some(e), Some(g_s), None)
    }

    /// Create a material from E and Poisson's ratio
    pub fn from_e_poisson(name: &str, rho: f64, e: f64, poisson: f64) -> RotorResult<Self> {
        Self::new(name, rho, Some(e), None, Some(poisson))
    }

    /// Standard rotor steel (ρ = 7810 kg/m³, E = 211 GPa, G = 81.2 GPa)
    pub fn steel() -> Self {
        Self {
            name: "Steel".to_string(),
            rho: 7810.0,
            e: 211e9,
            g_s: 81.2e9,
            poisson: 211e9 / (2.0 * 81.2e9) - 1.0,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::steel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_from_e_poisson() {
        let mat = Material::from_e_poisson("s", 7810.0, 211e9, 0.3).unwrap();
        assert_relative_eq!(mat.g_s, 211e9 / 2.6, max_relative = 1e-12);
    }

    #[test]
    fn test_from_g_poisson() {
        let mat = Material::new("s", 7810.0, None, Some(81.2e9), Some(0.3)).unwrap();
        assert_relative_eq!(mat.e, 2.0 * 81.2e9 * 1.3, max_relative = 1e-12);
    }

    #[test]
    fn test_inconsistent_triple_rejected() {
        let err = Material::new("s", 7810.0, Some(211e9), Some(50e9), Some(0.3)).unwrap_err();
        assert!(matches!(err, RotorError::InvalidMaterial { .. }));
    }

    #[test]
    fn test_consistent_triple_accepted() {
        let g = 211e9 / 2.6;
        assert!(Material::new("s", 7810.0, Some(211e9), Some(g), Some(0.3)).is_ok());
    }

    #[test]
    fn test_underspecified_rejected() {
        assert!(Material::new("s", 7810.0, Some(211e9), None, None).is_err());
        assert!(Material::new("s", -1.0, Some(211e9), None, Some(0.3)).is_err());
    }

    proptest! {
        #[test]
        fn shear_modulus_consistent(e in 1e9_f64..500e9, nu in 0.0_f64..0.49) {
            let from_e_nu = Material::from_e_poisson("m", 7800.0, e, nu).unwrap();
            let expected = e / (2.0 * (1.0 + nu));
            prop_assert!(((from_e_nu.g_s - expected) / expected).abs() < 1e-12);

            let from_e_g = Material::from_e_g("m", 7800.0, e, expected).unwrap();
            prop_assert!((from_e_g.poisson - nu).abs() < 1e-9);
        }
    }
}
