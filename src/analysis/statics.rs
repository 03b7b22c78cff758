//! Static deflection under gravity and the undamped critical speed map
//!
//! Gravity acts along -y. The stiffness matrix of a rotor is singular in the
//! unrestrained axial and torsional directions, so the static solve uses the
//! pseudo-inverse and then checks that the load was actually carried.

use log::{debug, info};
use nalgebra::Complex;

use super::modal::classify_mode;
use crate::dof::DofKind;
use crate::error::{RotorError, RotorResult};
use crate::math::{symmetric_generalized_eigen, CVec, DVec, Mat};
use crate::results::{ModeType, NodeDeflection, StaticResult, SupportReaction, UcsResult};
use crate::rotor::{MagneticModel, RotorSystem};

/// Standard gravity (m/s²)
pub const GRAVITY: f64 = 9.80665;

/// Singular values below this fraction of the largest are dropped
const RIGID_SV_TOL: f64 = 1e-12;

/// Equilibrium residual accepted relative to the load
const RESIDUAL_TOL: f64 = 1e-6;

/// Static deflection and bearing reactions under the rotor's own weight
pub fn run_static<S>(system: &S) -> RotorResult<StaticResult>
where
    S: RotorSystem + ?Sized,
{
    let n = system.ndof();
    let mats = system.matrices(0.0, 0.0, MagneticModel::Equivalent)?;
    let kinds = system.dof_kinds();

    let accel = DVec::from_iterator(n, kinds.iter().map(|k| if *k == DofKind::Y { -GRAVITY } else { 0.0 }));
    let load = &mats.m * &accel;
    let weight: f64 = -(0..n).filter(|&i| kinds[i] == DofKind::Y).map(|i| load[i]).sum::<f64>();
    info!("static analysis: {n} DOF, weight {weight:.3} N");

    let svd = mats.k.clone().svd(true, true);
    let eps = RIGID_SV_TOL * svd.singular_values.max();
    let deflection = svd
        .solve(&load, eps)
        .map_err(|e| RotorError::SingularMatrix(format!("static stiffness: {e}")))?;

    let residual = (&mats.k * &deflection - &load).norm();
    if !(residual <= RESIDUAL_TOL * load.norm().max(f64::MIN_POSITIVE)) {
        return Err(RotorError::SingularMatrix(format!(
            "rotor is not supported against gravity (residual {residual:e} N)"
        )));
    }

    let nodes = system
        .lateral_pairs()
        .into_iter()
        .map(|(node, dx, dy)| NodeDeflection {
            node,
            dx: deflection[dx],
            dy: deflection[dy],
        })
        .collect();
    let reactions = system
        .supports(0.0, 0.0)?
        .into_iter()
        .map(|s| SupportReaction {
            node: s.node,
            force: s.force_on_node(&deflection),
            tag: s.tag,
        })
        .collect();

    Ok(StaticResult {
        deflection,
        nodes,
        reactions,
        weight,
    })
}

/// Lateral undamped critical speeds with every grounded support replaced by
/// an isotropic spring of each `stiffness`
///
/// Linked supports keep their own stiffness. Each lateral pair is reported
/// once.
pub fn run_ucs<S>(system: &S, stiffness: &[f64], num_modes: usize) -> RotorResult<UcsResult>
where
    S: RotorSystem + ?Sized,
{
    if stiffness.is_empty() || num_modes == 0 {
        return Err(RotorError::InvalidInput(
            "critical speed map needs stiffness samples and at least one mode".to_string(),
        ));
    }
    if let Some(k) = stiffness.iter().find(|k| !(**k > 0.0 && k.is_finite())) {
        return Err(RotorError::InvalidInput(format!("support stiffness must be positive, got {k}")));
    }
    info!("critical speed map: {} stiffness samples, {num_modes} modes", stiffness.len());

    let mats = system.matrices(0.0, 0.0, MagneticModel::Equivalent)?;
    let grounded: Vec<_> = system.supports(0.0, 0.0)?.into_iter().filter(|s| s.n_link.is_none()).collect();
    let mut structure = mats.k.clone();
    for s in &grounded {
        for (i, &gi) in s.dofs.iter().enumerate() {
            for (j, &gj) in s.dofs.iter().enumerate() {
                structure[(gi, gj)] -= s.k[(i, j)];
            }
        }
    }

    let kinds = system.dof_kinds();
    let mass_diag: Vec<f64> = (0..mats.m.nrows()).map(|i| mats.m[(i, i)]).collect();
    let mut critical_speeds = Mat::from_element(stiffness.len(), num_modes, f64::NAN);

    for (row, &kb) in stiffness.iter().enumerate() {
        let mut k = structure.clone();
        for s in &grounded {
            k[(s.dofs[0], s.dofs[0])] += kb;
            k[(s.dofs[1], s.dofs[1])] += kb;
        }
        let k = (&k + k.transpose()) * 0.5;
        let (values, vectors) = symmetric_generalized_eigen(&k, &mats.m)
            .ok_or_else(|| RotorError::SingularMatrix("mass matrix is not positive definite".to_string()))?;

        let lateral: Vec<f64> = values
            .iter()
            .enumerate()
            .filter(|(_, l)| **l > 0.0)
            .filter(|(i, _)| {
                let shape = CVec::from_iterator(vectors.nrows(), vectors.column(*i).iter().map(|v| Complex::new(*v, 0.0)));
                classify_mode(&shape, &kinds, &mass_diag) == ModeType::Lateral
            })
            .map(|(_, l)| l.sqrt())
            .collect();
        for (col, w) in lateral.iter().step_by(2).take(num_modes).enumerate() {
            critical_speeds[(row, col)] = *w;
        }
        debug!("support stiffness {kb:e}: {} lateral modes", lateral.len());
    }

    Ok(UcsResult {
        stiffness: stiffness.to_vec(),
        critical_speeds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{BearingElement, DiskElement, Material, ShaftElement};
    use crate::rotor::Rotor;
    use approx::assert_relative_eq;

    fn shaft_on_bearings(k: f64) -> Rotor {
        let steel = Material::steel();
        Rotor::builder()
            .add_shafts((0..10).map(|_| {
                ShaftElement::new(0.15, 0.0, 0.05, steel.clone())
                    .with_shear_effects(false)
                    .with_rotary_inertia(false)
            }))
            .add_bearing(BearingElement::new(0, k, 0.0))
            .add_bearing(BearingElement::new(10, k, 0.0))
            .build()
            .unwrap()
    }

    #[test]
    fn test_uniform_beam_sags_like_textbook() {
        let rotor = shaft_on_bearings(1e12);
        let res = rotor.run_static().unwrap();
        let steel = Material::steel();
        let d: f64 = 0.05;
        let area = std::f64::consts::PI * d * d / 4.0;
        let inertia = std::f64::consts::PI * d.powi(4) / 64.0;
        let w = steel.rho * area * GRAVITY;
        let length: f64 = 1.5;
        // 5wL⁴/384EI at mid-span
        let exact = 5.0 * w * length.powi(4) / (384.0 * steel.e * inertia);
        let mid = res.nodes.iter().find(|n| n.node == 5).unwrap();
        assert_relative_eq!(mid.dy, -exact, max_relative = 1e-3);
        assert!(mid.dx.abs() < 1e-12);
        assert_eq!(res.max_deflection().unwrap().node, 5);
    }

    #[test]
    fn test_reactions_carry_the_weight() {
        let steel = Material::steel();
        let rotor = Rotor::builder()
            .add_shafts((0..6).map(|_| ShaftElement::new(0.2, 0.0, 0.05, steel.clone())))
            .add_disk(DiskElement::from_geometry(2, &steel, 0.07, 0.05, 0.3))
            .add_bearing(BearingElement::new(0, 1e8, 0.0))
            .add_bearing(BearingElement::new(6, 1e8, 0.0))
            .build()
            .unwrap();
        let res = rotor.run_static().unwrap();
        assert_relative_eq!(res.weight, rotor.mass() * GRAVITY, max_relative = 1e-9);
        let lift: f64 = res.reactions.iter().map(|r| r.force[1]).sum();
        assert_relative_eq!(lift, res.weight, max_relative = 1e-6);
        // The disk sits nearer bearing 0
        assert!(res.reactions[0].force[1] > res.reactions[1].force[1]);
        assert!(res.to_json().unwrap().contains("reactions"));
    }

    #[test]
    fn test_unsupported_rotor_is_rejected() {
        let rotor = Rotor::builder()
            .add_shafts((0..2).map(|_| ShaftElement::new(0.2, 0.0, 0.05, Material::steel())))
            .build()
            .unwrap();
        assert!(matches!(rotor.run_static(), Err(RotorError::SingularMatrix(_))));
    }

    #[test]
    fn test_critical_speeds_rise_with_support_stiffness() {
        let rotor = shaft_on_bearings(1e7);
        let stiffness = [1e3, 1e5, 1e7, 1e8, 1e9, 1e12];
        let ucs = rotor.run_ucs(&stiffness, 3).unwrap();
        assert_eq!(ucs.num_modes(), 3);
        for mode in 0..3 {
            let w = ucs.mode(mode);
            assert!(w.windows(2).all(|p| p[1] >= p[0]));
        }

        // Soft supports: the shaft bounces rigidly on 2k
        let rigid_bounce = (2.0 * 1e3 / rotor.mass()).sqrt();
        assert_relative_eq!(ucs.critical_speeds[(0, 0)], rigid_bounce, max_relative = 0.01);

        // Stiff supports: first pinned-pinned bending mode
        let steel = Material::steel();
        let d: f64 = 0.05;
        let area = std::f64::consts::PI * d * d / 4.0;
        let inertia = std::f64::consts::PI * d.powi(4) / 64.0;
        let length: f64 = 1.5;
        let pinned = (std::f64::consts::PI / length).powi(2) * (steel.e * inertia / (steel.rho * area)).sqrt();
        assert_relative_eq!(ucs.critical_speeds[(5, 0)], pinned, max_relative = 0.01);

        // The current bearings sit on the same curve
        let modal = rotor.run_modal(0.0, &crate::analysis::ModalOptions::new(2)).unwrap();
        assert_relative_eq!(ucs.critical_speeds[(2, 0)], modal.wn[0], max_relative = 1e-4);
    }

    #[test]
    fn test_ucs_rejects_bad_stiffness() {
        let rotor = shaft_on_bearings(1e7);
        assert!(rotor.run_ucs(&[], 2).is_err());
        assert!(rotor.run_ucs(&[1e6, 0.0], 2).is_err());
        assert!(rotor.run_ucs(&[1e6], 0).is_err());
    }
}
