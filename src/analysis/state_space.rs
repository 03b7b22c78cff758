//! Exact state-space propagation of the linear system
//!
//! With `z = [q, q̇]` the system is `ż = A z + B u` and the force is taken
//! piecewise linear between samples (first-order hold). One step is
//!
//! ```text
//! z[k+1] = Ad z[k] + Bd0 u[k] + Bd1 u[k+1]
//! ```
//!
//! where `Ad`, `Bd0` and `Bd1` come from the exponential of the augmented
//! block matrix `[[A·dt, B·dt, 0], [0, 0, I], [0, 0, 0]]`.

use log::debug;

use super::time_response::{TimeIntegrator, TimeProblem};
use super::CancelToken;
use crate::control::RhsForce;
use crate::error::{RotorError, RotorResult};
use crate::math::{solve_spd, DVec, Mat};
use crate::results::TimeResponseResult;

/// Relative tolerance for reusing a discretisation between steps
const DT_TOL: f64 = 1e-9;

/// First-order-hold integrator for constant-speed linear systems
#[derive(Debug, Clone, Copy, Default)]
pub struct StateSpaceIntegrator;

#[derive(Debug, Clone)]
struct Discretisation {
    dt: f64,
    ad: Mat,
    bd0: Mat,
    bd1: Mat,
}

impl StateSpaceIntegrator {
    pub fn new() -> Self {
        Self
    }

    /// Continuous `A` (2n x 2n) and `B` (2n x n) at spin `speed`
    pub fn continuous(problem: &TimeProblem, speed: f64) -> RotorResult<(Mat, Mat)> {
        let n = problem.ndof();
        let (k, c) = problem.stiffness_damping(speed);
        let damping = c + &problem.g * speed;

        let mut rhs = Mat::zeros(n, 3 * n);
        rhs.view_mut((0, 0), (n, n)).copy_from(&k);
        rhs.view_mut((0, n), (n, n)).copy_from(&damping);
        rhs.view_mut((0, 2 * n), (n, n)).fill_with_identity();
        let sol = solve_spd(&problem.m, &rhs)
            .ok_or_else(|| RotorError::SingularMatrix("mass matrix is not invertible".to_string()))?;

        let mut a = Mat::zeros(2 * n, 2 * n);
        a.view_mut((0, n), (n, n)).fill_with_identity();
        a.view_mut((n, 0), (n, 2 * n)).copy_from(&(sol.columns(0, 2 * n) * -1.0));
        let mut b = Mat::zeros(2 * n, n);
        b.view_mut((n, 0), (n, n)).copy_from(&sol.columns(2 * n, n));
        Ok((a, b))
    }

    fn discretise(a: &Mat, b: &Mat, dt: f64) -> Discretisation {
        let ns = a.nrows();
        let ni = b.ncols();
        let size = ns + 2 * ni;
        let mut aug = Mat::zeros(size, size);
        aug.view_mut((0, 0), (ns, ns)).copy_from(&(a * dt));
        aug.view_mut((0, ns), (ns, ni)).copy_from(&(b * dt));
        aug.view_mut((ns, ns + ni), (ni, ni)).fill_with_identity();

        let e = aug.exp();
        let ad = e.view((0, 0), (ns, ns)).into_owned();
        let gamma1 = e.view((0, ns), (ns, ni)).into_owned();
        let bd1 = e.view((0, ns + ni), (ns, ni)).into_owned();
        Discretisation {
            dt,
            ad,
            bd0: gamma1 - &bd1,
            bd1,
        }
    }
}

impl TimeIntegrator for StateSpaceIntegrator {
    fn integrate(
        &self,
        problem: &TimeProblem,
        rhs: Option<&mut dyn RhsForce>,
        cancel: Option<&CancelToken>,
    ) -> RotorResult<TimeResponseResult> {
        if rhs.is_some() {
            return Err(RotorError::InvalidInput(
                "state-space integration takes no per-step forces, use the Newmark method".to_string(),
            ));
        }
        problem.validate()?;
        let speed = problem.speed[0];
        if problem.speed.iter().any(|&s| s != speed) {
            return Err(RotorError::InvalidInput(
                "state-space integration needs a constant speed, use the Newmark method".to_string(),
            ));
        }

        let n = problem.ndof();
        let nt = problem.ntime();
        let (a, b) = Self::continuous(problem, speed)?;

        let mut yout = Mat::zeros(nt, n);
        let mut velocity = Mat::zeros(nt, n);
        let mut z = DVec::zeros(2 * n);
        z.rows_mut(0, n).copy_from(&problem.x0);
        z.rows_mut(n, n).copy_from(&problem.v0);
        yout.set_row(0, &problem.x0.transpose());
        velocity.set_row(0, &problem.v0.transpose());

        let mut disc: Option<Discretisation> = None;
        let mut u_prev = problem.force_at(0);
        for k in 0..nt - 1 {
            CancelToken::check(cancel)?;
            let dt = problem.t[k + 1] - problem.t[k];
            let reuse = disc.as_ref().is_some_and(|d| (d.dt - dt).abs() <= DT_TOL * dt);
            if !reuse {
                debug!("state-space discretisation for dt = {dt:e}");
                disc = Some(Self::discretise(&a, &b, dt));
            }
            let Some(d) = disc.as_ref() else { continue };

            let u_next = problem.force_at(k + 1);
            z = &d.ad * &z + &d.bd0 * &u_prev + &d.bd1 * &u_next;
            u_prev = u_next;

            yout.set_row(k + 1, &z.rows(0, n).transpose());
            velocity.set_row(k + 1, &z.rows(n, n).transpose());
        }

        Ok(TimeResponseResult {
            t: problem.t.clone(),
            yout,
            velocity,
            acceleration: None,
            converged: true,
            failed_steps: Vec::new(),
            warnings: Vec::new(),
        })
    }
}
