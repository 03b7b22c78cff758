//! Modal analysis of the speed-dependent state-space eigenproblem
//!
//! ```text
//! A = [ 0        I            ]
//!     [ -M⁻¹K    -M⁻¹(C + ΩG) ]
//! ```
//!
//! Eigenvalues come in conjugate pairs; only the root with positive imaginary
//! part is kept for each physical mode.

use log::{debug, info};
use nalgebra::Complex;
use std::f64::consts::PI;

use super::ModalOptions;
use crate::dof::DofKind;
use crate::error::{RotorError, RotorResult};
use crate::math::{complex_eigen, solve_spd, CVec, Mat};
use crate::results::{ModalResult, ModeType, Whirl};
use crate::rotor::{MagneticModel, RotorSystem, SystemMatrices};

/// Nodes below this fraction of the peak orbit size do not vote on whirl
const SIGNIFICANT_NODE: f64 = 1e-3;

/// First-order state matrix at spin `speed`
pub fn state_matrix(mats: &SystemMatrices, speed: f64) -> RotorResult<Mat> {
    let n = mats.m.nrows();
    let damping = &mats.c + &mats.g * speed;

    let mut rhs = Mat::zeros(n, 2 * n);
    rhs.view_mut((0, 0), (n, n)).copy_from(&mats.k);
    rhs.view_mut((0, n), (n, n)).copy_from(&damping);
    let minv = solve_spd(&mats.m, &rhs)
        .ok_or_else(|| RotorError::SingularMatrix("mass matrix is not invertible".to_string()))?;

    let mut a = Mat::zeros(2 * n, 2 * n);
    a.view_mut((0, n), (n, n)).fill_with_identity();
    a.view_mut((n, 0), (n, 2 * n)).copy_from(&(-minv));
    Ok(a)
}

/// Run a modal analysis at `speed` (rad/s)
pub fn run_modal<S>(system: &S, speed: f64, options: &ModalOptions) -> RotorResult<ModalResult>
where
    S: RotorSystem + ?Sized,
{
    info!("modal analysis at {speed:.3} rad/s, {} modes", options.num_modes);
    let frequency = options.frequency.unwrap_or(speed);
    let mats = system.matrices(frequency, speed, MagneticModel::Equivalent)?;
    let a = state_matrix(&mats, speed)?;
    let n = system.ndof();

    let num_modes = options.num_modes;
    let tol = options.rigid_body_tol;
    let eig = complex_eigen(&a, options.max_iter, |values| {
        let mut idx: Vec<usize> = (0..values.len())
            .filter(|&i| values[i].im > 0.0 && values[i].norm() >= tol)
            .collect();
        idx.sort_by(|&i, &j| values[i].im.total_cmp(&values[j].im));
        idx.truncate(num_modes);
        idx
    })
    .ok_or(RotorError::EigenSolveFailed { speed })?;

    let kinds = system.dof_kinds();
    let pairs = system.lateral_pairs();
    let spin: Vec<f64> = pairs.iter().map(|&(node, _, _)| system.speed_ratio(node).signum()).collect();
    let mass_diag: Vec<f64> = (0..n).map(|i| mats.m[(i, i)]).collect();

    let mut result = ModalResult {
        speed,
        evalues: eig.values.clone(),
        evectors: eig.vectors.rows(0, n).into_owned(),
        wn: Vec::with_capacity(eig.values.len()),
        wd: Vec::with_capacity(eig.values.len()),
        damping_ratio: Vec::with_capacity(eig.values.len()),
        log_dec: Vec::with_capacity(eig.values.len()),
        whirl: Vec::with_capacity(eig.values.len()),
        mode_type: Vec::with_capacity(eig.values.len()),
        lateral_pairs: pairs.clone(),
        spin_sense: if spin.iter().all(|s| *s > 0.0) { Vec::new() } else { spin.clone() },
    };

    for (mode, lambda) in eig.values.iter().enumerate() {
        let wn = lambda.norm();
        let zeta = -lambda.re / wn;
        result.wn.push(wn);
        result.wd.push(lambda.im);
        result.damping_ratio.push(zeta);
        result.log_dec.push(2.0 * PI * zeta / (1.0 - zeta * zeta).sqrt());

        let shape = result.evectors.column(mode).into_owned();
        result.whirl.push(classify_whirl(&shape, &pairs, &spin));
        result.mode_type.push(classify_mode(&shape, &kinds, &mass_diag));
    }

    if result.num_modes() < num_modes {
        debug!(
            "only {} of {} requested modes found at {speed:.3} rad/s",
            result.num_modes(),
            num_modes
        );
    }
    Ok(result)
}

/// Whirl direction from the orbit sense of every significant node
///
/// `spin` holds the spin sign of each pair's node; an orbit is forward when it
/// turns the same way as its own shaft.
pub fn classify_whirl(shape: &CVec, pairs: &[(usize, usize, usize)], spin: &[f64]) -> Whirl {
    let size = |x: Complex<f64>, y: Complex<f64>| x.norm_sqr() + y.norm_sqr();
    let peak = pairs
        .iter()
        .map(|&(_, dx, dy)| size(shape[dx], shape[dy]))
        .fold(0.0, f64::max);
    if peak == 0.0 {
        return Whirl::Mixed;
    }

    let (mut forward, mut backward) = (0usize, 0usize);
    for (i, &(_, dx, dy)) in pairs.iter().enumerate() {
        let (x, y) = (shape[dx], shape[dy]);
        if size(x, y) < SIGNIFICANT_NODE * peak {
            continue;
        }
        let sense = -(x.conj() * y).im * spin.get(i).copied().unwrap_or(1.0);
        if sense > 1e-6 * peak {
            forward += 1;
        } else if sense < -1e-6 * peak {
            backward += 1;
        }
    }

    match (forward, backward) {
        (f, 0) if f > 0 => Whirl::Forward,
        (0, b) if b > 0 => Whirl::Backward,
        _ => Whirl::Mixed,
    }
}

/// Dominant DOF class by mass-weighted modal energy
pub fn classify_mode(shape: &CVec, kinds: &[DofKind], mass_diag: &[f64]) -> ModeType {
    let (mut lateral, mut axial, mut torsional) = (0.0, 0.0, 0.0);
    for ((v, kind), m) in shape.iter().zip(kinds).zip(mass_diag) {
        let e = m * v.norm_sqr();
        match kind {
            DofKind::Z => axial += e,
            DofKind::Theta => torsional += e,
            _ => lateral += e,
        }
    }
    if axial > lateral && axial >= torsional {
        ModeType::Axial
    } else if torsional > lateral && torsional > axial {
        ModeType::Torsional
    } else {
        ModeType::Lateral
    }
}
