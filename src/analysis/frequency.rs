//! Frequency-domain receptance and unbalance response

use log::info;
use nalgebra::Complex;

use crate::error::{RotorError, RotorResult};
use crate::loads::Unbalance;
use crate::math::{CMat, CVec};
use crate::results::{ForcedResponseResult, FrequencyResponseResult};
use crate::rotor::{MagneticModel, RotorSystem};

/// Dynamic stiffness `K - ω²M + iω(C + ΩG)` at excitation `omega`
fn dynamic_stiffness<S>(system: &S, speed: f64, omega: f64) -> RotorResult<CMat>
where
    S: RotorSystem + ?Sized,
{
    let mats = system.matrices(omega, speed, MagneticModel::Equivalent)?;
    let real = &mats.k - &mats.m * (omega * omega);
    let imag = (&mats.c + &mats.g * speed) * omega;
    Ok(real.zip_map(&imag, Complex::new))
}

fn receptance<S>(system: &S, speed: f64, omega: f64) -> RotorResult<CMat>
where
    S: RotorSystem + ?Sized,
{
    dynamic_stiffness(system, speed, omega)?
        .try_inverse()
        .ok_or_else(|| RotorError::SingularMatrix(format!("dynamic stiffness at {omega:.3} rad/s")))
}

/// Receptance matrices at a fixed spin `speed`
pub fn run_freq_response<S>(system: &S, speed: f64, frequencies: &[f64]) -> RotorResult<FrequencyResponseResult>
where
    S: RotorSystem + ?Sized,
{
    info!(
        "frequency response at {speed:.3} rad/s over {} frequencies",
        frequencies.len()
    );
    let responses = frequencies
        .iter()
        .map(|&w| receptance(system, speed, w))
        .collect::<RotorResult<Vec<_>>>()?;
    Ok(FrequencyResponseResult {
        speed,
        frequencies: frequencies.to_vec(),
        responses,
    })
}

/// Synchronous unbalance response, spin speed equal to each frequency
///
/// An unbalance `m·e` at phase `φ` gives `Fx = m·e·ω²·e^{iφ}` and
/// `Fy = -i·Fx` at the spin of its node; both signs flip for a node spinning
/// against the driving rotor.
pub fn run_unbalance_response<S>(
    system: &S,
    unbalances: &[Unbalance],
    frequencies: &[f64],
) -> RotorResult<ForcedResponseResult>
where
    S: RotorSystem + ?Sized,
{
    let n = system.ndof();
    let dofs = unbalances
        .iter()
        .map(|u| {
            system
                .translational_dofs(u.node)
                .ok_or_else(|| RotorError::NodeOutOfRange {
                    element: "Unbalance".to_string(),
                    node: u.node,
                    max: n,
                })
        })
        .collect::<RotorResult<Vec<_>>>()?;

    let mut response = CMat::zeros(n, frequencies.len());
    for (col, &omega) in frequencies.iter().enumerate() {
        let mut total = CVec::zeros(n);
        for (u, [dx, dy, _]) in unbalances.iter().zip(&dofs) {
            // A counter-rotating node traces its unbalance the other way round
            let w = omega * system.speed_ratio(u.node);
            let sense = w.signum();
            let fx = Complex::from_polar(u.magnitude * w * w, sense * u.phase);
            let fy = -Complex::<f64>::i() * sense * fx;
            let mut f = CVec::zeros(n);
            f[*dx] = fx;
            f[*dy] = fy;
            let h = receptance(system, omega, w.abs())?;
            total += h * f;
        }
        response.set_column(col, &total);
    }

    Ok(ForcedResponseResult {
        frequencies: frequencies.to_vec(),
        response,
    })
}
