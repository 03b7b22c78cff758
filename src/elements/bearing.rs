//! Bearing element - linear springs and dampers on a node's translations
//!
//! A bearing connects node `n` to ground, or to node `n_link` when given.
//! Coefficients are either constant or tabulated against excitation
//! frequency or spin speed.

use serde::{Deserialize, Serialize};

use super::{Element, LocalMatrices};
use crate::dof::DofMap;
use crate::error::{RotorError, RotorResult};
use crate::math::{interp1d, Extrapolation, Mat};

/// Variable a coefficient table is indexed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableAxis {
    /// Excitation frequency (rad/s)
    Frequency,
    /// Spin speed (rad/s)
    Speed,
}

/// A stiffness, damping or mass coefficient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Coefficient {
    Constant(f64),
    Table {
        axis: TableAxis,
        points: Vec<f64>,
        values: Vec<f64>,
    },
}

impl Coefficient {
    /// Table indexed by excitation frequency
    pub fn frequency_table(points: Vec<f64>, values: Vec<f64>) -> Self {
        Coefficient::Table {
            axis: TableAxis::Frequency,
            points,
            values,
        }
    }

    /// Table indexed by spin speed
    pub fn speed_table(points: Vec<f64>, values: Vec<f64>) -> Self {
        Coefficient::Table {
            axis: TableAxis::Speed,
            points,
            values,
        }
    }

    /// Value at the given frequency and speed
    pub fn eval(&self, frequency: f64, speed: f64, mode: Extrapolation) -> RotorResult<f64> {
        match self {
            Coefficient::Constant(v) => Ok(*v),
            Coefficient::Table { axis, points, values } => {
                let x = match axis {
                    TableAxis::Frequency => frequency,
                    TableAxis::Speed => speed,
                };
                interp1d(points, values, x, mode)
            }
        }
    }

    /// Whether the coefficient is identically zero
    pub fn is_zero(&self) -> bool {
        match self {
            Coefficient::Constant(v) => *v == 0.0,
            Coefficient::Table { values, .. } => values.iter().all(|v| *v == 0.0),
        }
    }

    fn validate(&self, element: &str, name: &str) -> RotorResult<()> {
        if let Coefficient::Table { points, values, .. } = self {
            if points.is_empty() || points.len() != values.len() {
                return Err(RotorError::CoefficientLength {
                    element: element.to_string(),
                    name: name.to_string(),
                    expected: points.len(),
                    found: values.len(),
                });
            }
            if points.windows(2).any(|w| !(w[1] > w[0])) {
                return Err(RotorError::element(
                    element,
                    format!("table points of '{name}' must be strictly ascending"),
                ));
            }
        }
        Ok(())
    }
}

impl From<f64> for Coefficient {
    fn from(v: f64) -> Self {
        Coefficient::Constant(v)
    }
}

/// Evaluated 3x3 translational blocks of a bearing
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BearingBlocks {
    pub k: Mat,
    pub c: Mat,
    pub m: Mat,
}

/// Linear bearing (or seal, or support) element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearingElement {
    /// Node the bearing acts on
    pub n: usize,
    /// Second node for a series or co-axial connection; ground when `None`
    pub n_link: Option<usize>,
    pub kxx: Coefficient,
    pub kyy: Coefficient,
    pub kxy: Coefficient,
    pub kyx: Coefficient,
    pub kzz: Coefficient,
    pub cxx: Coefficient,
    pub cyy: Coefficient,
    pub cxy: Coefficient,
    pub cyx: Coefficient,
    pub czz: Coefficient,
    /// Translational masses lumped at `n`
    pub mass: [f64; 3],
    /// Behaviour outside tabulated ranges
    pub extrapolation: Extrapolation,
    pub tag: Option<String>,
}

impl BearingElement {
    /// Isotropic bearing: `kyy = kxx`, `cyy = cxx`, no cross-coupling
    pub fn new(n: usize, kxx: impl Into<Coefficient>, cxx: impl Into<Coefficient>) -> Self {
        let kxx = kxx.into();
        let cxx = cxx.into();
        Self {
            n,
            n_link: None,
            kyy: kxx.clone(),
            kxx,
            kxy: 0.0.into(),
            kyx: 0.0.into(),
            kzz: 0.0.into(),
            cyy: cxx.clone(),
            cxx,
            cxy: 0.0.into(),
            cyx: 0.0.into(),
            czz: 0.0.into(),
            mass: [0.0; 3],
            extrapolation: Extrapolation::Clamp,
            tag: None,
        }
    }

    /// Empirical ball bearing stiffness for `n_balls` of diameter `d_balls`
    /// under static load `fs`, contact angle `alpha`
    pub fn ball_bearing(n: usize, n_balls: f64, d_balls: f64, fs: f64, alpha: f64) -> Self {
        let kb = 13.0e6;
        let kyy = kb * n_balls.powf(2.0 / 3.0) * d_balls.powf(1.0 / 3.0) * fs.powf(1.0 / 3.0)
            * alpha.cos().powf(5.0 / 3.0);
        let ratio = interp_ratio(n_balls, &[0.46, 0.64, 0.73]);
        Self::rolling(n, ratio * kyy, kyy).with_tag(&format!("BallBearing {n}"))
    }

    /// Empirical roller bearing stiffness for `n_rollers` of length
    /// `l_rollers` under static load `fs`, contact angle `alpha`
    pub fn roller_bearing(n: usize, n_rollers: f64, l_rollers: f64, fs: f64, alpha: f64) -> Self {
        let kb = 1.0e9;
        let kyy = kb * n_rollers.powf(0.9) * l_rollers.powf(0.8) * fs.powf(0.1) * alpha.cos().powf(1.9);
        let ratio = interp_ratio(n_rollers, &[0.49, 0.66, 0.74]);
        Self::rolling(n, ratio * kyy, kyy).with_tag(&format!("RollerBearing {n}"))
    }

    fn rolling(n: usize, kxx: f64, kyy: f64) -> Self {
        let damping = 1.25e-5;
        Self::new(n, kxx, damping * kxx)
            .with_kyy(kyy)
            .with_cyy(damping * kyy)
    }

    pub fn with_kyy(mut self, kyy: impl Into<Coefficient>) -> Self {
        self.kyy = kyy.into();
        self
    }

    pub fn with_cyy(mut self, cyy: impl Into<Coefficient>) -> Self {
        self.cyy = cyy.into();
        self
    }

    /// Cross-coupled stiffness terms
    pub fn with_cross_stiffness(mut self, kxy: impl Into<Coefficient>, kyx: impl Into<Coefficient>) -> Self {
        self.kxy = kxy.into();
        self.kyx = kyx.into();
        self
    }

    /// Cross-coupled damping terms
    pub fn with_cross_damping(mut self, cxy: impl Into<Coefficient>, cyx: impl Into<Coefficient>) -> Self {
        self.cxy = cxy.into();
        self.cyx = cyx.into();
        self
    }

    /// Axial stiffness and damping
    pub fn with_axial(mut self, kzz: impl Into<Coefficient>, czz: impl Into<Coefficient>) -> Self {
        self.kzz = kzz.into();
        self.czz = czz.into();
        self
    }

    /// Lumped translational mass at `n`
    pub fn with_mass(mut self, mxx: f64, myy: f64, mzz: f64) -> Self {
        self.mass = [mxx, myy, mzz];
        self
    }

    /// Connect to another node instead of ground
    pub fn with_n_link(mut self, n_link: usize) -> Self {
        self.n_link = Some(n_link);
        self
    }

    pub fn with_extrapolation(mut self, mode: Extrapolation) -> Self {
        self.extrapolation = mode;
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    fn coefficients(&self) -> [(&'static str, &Coefficient); 10] {
        [
            ("kxx", &self.kxx),
            ("kyy", &self.kyy),
            ("kxy", &self.kxy),
            ("kyx", &self.kyx),
            ("kzz", &self.kzz),
            ("cxx", &self.cxx),
            ("cyy", &self.cyy),
            ("cxy", &self.cxy),
            ("cyx", &self.cyx),
            ("czz", &self.czz),
        ]
    }

    /// Check every tabulated coefficient for consistent lengths
    pub fn validate(&self) -> RotorResult<()> {
        let tag = self.tag();
        for (name, coef) in self.coefficients() {
            coef.validate(&tag, name)?;
        }
        if self.n_link == Some(self.n) {
            return Err(RotorError::element(tag, "n_link must differ from n"));
        }
        if self.mass.iter().any(|m| !(*m >= 0.0)) {
            return Err(RotorError::element(tag, "bearing mass must be non-negative"));
        }
        Ok(())
    }

    /// Whether any coefficient depends on the excitation frequency
    pub fn is_frequency_dependent(&self) -> bool {
        self.coefficients().iter().any(|(_, c)| {
            matches!(
                c,
                Coefficient::Table {
                    axis: TableAxis::Frequency,
                    ..
                }
            )
        })
    }

    /// Table points of every coefficient indexed by `axis`
    pub fn table_points(&self, axis: TableAxis) -> Vec<f64> {
        self.coefficients()
            .iter()
            .flat_map(|(_, c)| match c {
                Coefficient::Table { axis: a, points, .. } if *a == axis => points.clone(),
                _ => Vec::new(),
            })
            .collect()
    }

    pub(crate) fn blocks(&self, frequency: f64, speed: f64) -> RotorResult<BearingBlocks> {
        let at = |c: &Coefficient| c.eval(frequency, speed, self.extrapolation);

        #[rustfmt::skip]
        let k = Mat::from_row_slice(3, 3, &[
            at(&self.kxx)?, at(&self.kxy)?, 0.0,
            at(&self.kyx)?, at(&self.kyy)?, 0.0,
            0.0,            0.0,            at(&self.kzz)?,
        ]);
        #[rustfmt::skip]
        let c = Mat::from_row_slice(3, 3, &[
            at(&self.cxx)?, at(&self.cxy)?, 0.0,
            at(&self.cyx)?, at(&self.cyy)?, 0.0,
            0.0,            0.0,            at(&self.czz)?,
        ]);
        let m = Mat::from_diagonal(&nalgebra::DVector::from_row_slice(&self.mass));
        Ok(BearingBlocks { k, c, m })
    }
}

/// Stiffness ratio kxx/kyy against rolling element count (8, 12, 16)
fn interp_ratio(count: f64, ratios: &[f64; 3]) -> f64 {
    interp1d(&[8.0, 12.0, 16.0], ratios, count, Extrapolation::Clamp).unwrap_or(ratios[1])
}

/// Expand 3x3 translational blocks into a grounded (3x3) or linked (6x6) layout
pub(crate) fn link_blocks(k: &Mat, c: &Mat, m: &Mat, linked: bool) -> LocalMatrices {
    if !linked {
        return LocalMatrices {
            m: m.clone(),
            k: k.clone(),
            c: c.clone(),
            g: Mat::zeros(3, 3),
        };
    }
    let expand = |b: &Mat| {
        let mut out = Mat::zeros(6, 6);
        out.view_mut((0, 0), (3, 3)).copy_from(b);
        out.view_mut((3, 3), (3, 3)).copy_from(b);
        out.view_mut((0, 3), (3, 3)).copy_from(&(-b));
        out.view_mut((3, 0), (3, 3)).copy_from(&(-b));
        out
    };
    let mut mass = Mat::zeros(6, 6);
    mass.view_mut((0, 0), (3, 3)).copy_from(m);
    LocalMatrices {
        m: mass,
        k: expand(k),
        c: expand(c),
        g: Mat::zeros(6, 6),
    }
}

pub(crate) fn linked_dofs(tag: &str, map: &DofMap, n: usize, n_link: Option<usize>) -> RotorResult<Vec<usize>> {
    let mut dofs = map.require_translational(tag, n)?.to_vec();
    if let Some(link) = n_link {
        dofs.extend_from_slice(&map.require_translational(tag, link)?);
    }
    Ok(dofs)
}

impl Element for BearingElement {
    fn tag(&self) -> String {
        self.tag.clone().unwrap_or_else(|| format!("BearingElement {}", self.n))
    }

    fn nodes(&self) -> Vec<usize> {
        std::iter::once(self.n).chain(self.n_link).collect()
    }

    fn dof_indices(&self, map: &DofMap) -> RotorResult<Vec<usize>> {
        linked_dofs(&self.tag(), map, self.n, self.n_link)
    }

    fn local_matrices(&self, frequency: f64, speed: f64) -> RotorResult<LocalMatrices> {
        let b = self.blocks(frequency, speed)?;
        Ok(link_blocks(&b.k, &b.c, &b.m, self.n_link.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_isotropic_defaults() {
        let brg = BearingElement::new(0, 1e6, 100.0);
        let m = brg.local_matrices(0.0, 0.0).unwrap();
        assert_eq!(m.k[(1, 1)], 1e6);
        assert_eq!(m.c[(1, 1)], 100.0);
        assert_eq!(m.k[(0, 1)], 0.0);
        assert_eq!(m.k.nrows(), 3);
    }

    #[test]
    fn test_frequency_table_interpolation_and_clamp() {
        let kxx = Coefficient::frequency_table(vec![0.0, 1000.0, 2000.0], vec![0.5e6, 1.0e6, 2.5e6]);
        let brg = BearingElement::new(0, kxx, 0.0);
        let at = |f: f64| brg.local_matrices(f, 0.0).unwrap().k[(0, 0)];
        assert_relative_eq!(at(500.0), 0.75e6);
        assert_relative_eq!(at(1500.0), 1.75e6);
        assert_relative_eq!(at(5000.0), 2.5e6);
        assert!(brg.is_frequency_dependent());
    }

    #[test]
    fn test_table_points_by_axis() {
        let brg = BearingElement::new(0, Coefficient::speed_table(vec![0.0, 100.0], vec![1e6, 2e6]), 0.0)
            .with_cross_stiffness(Coefficient::frequency_table(vec![10.0, 20.0], vec![0.0, 1e5]), 0.0);
        // kxx and kyy share the speed table
        assert_eq!(brg.table_points(TableAxis::Speed), vec![0.0, 100.0, 0.0, 100.0]);
        assert_eq!(brg.table_points(TableAxis::Frequency), vec![10.0, 20.0]);
        assert!(BearingElement::new(0, 1e6, 0.0).table_points(TableAxis::Speed).is_empty());
    }

    #[test]
    fn test_out_of_range_error_mode() {
        let kxx = Coefficient::speed_table(vec![0.0, 100.0], vec![1e6, 2e6]);
        let brg = BearingElement::new(0, kxx, 0.0).with_extrapolation(Extrapolation::Error);
        assert!(brg.local_matrices(0.0, 50.0).is_ok());
        assert!(matches!(
            brg.local_matrices(0.0, 150.0).unwrap_err(),
            RotorError::OutOfRange { .. }
        ));
    }

    #[test]
    fn test_table_length_mismatch_rejected() {
        let cxx = Coefficient::frequency_table(vec![0.0, 1000.0, 2000.0, 3000.0], vec![1.0, 2.0, 3.0]);
        let err = BearingElement::new(0, 1e6, cxx).validate().unwrap_err();
        assert!(matches!(
            err,
            RotorError::CoefficientLength { expected: 4, found: 3, .. }
        ));
    }

    #[test]
    fn test_linked_layout() {
        let brg = BearingElement::new(0, 2e6, 10.0).with_n_link(7);
        let m = brg.local_matrices(0.0, 0.0).unwrap();
        assert_eq!(m.k.nrows(), 6);
        assert_eq!(m.k[(0, 3)], -2e6);
        assert_eq!(m.k[(4, 4)], 2e6);
        assert_eq!(brg.nodes(), vec![0, 7]);
    }

    #[test]
    fn test_ball_bearing_ratio() {
        let brg = BearingElement::ball_bearing(0, 12.0, 0.03, 500.0, 0.0);
        let m = brg.local_matrices(0.0, 0.0).unwrap();
        assert_relative_eq!(m.k[(0, 0)] / m.k[(1, 1)], 0.64, max_relative = 1e-12);
        assert_relative_eq!(m.c[(1, 1)], 1.25e-5 * m.k[(1, 1)], max_relative = 1e-12);
    }
}
