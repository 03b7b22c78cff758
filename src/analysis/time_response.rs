//! Time-domain response: problem setup, integrator selection and model
//! reduction around the two integrators

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::newmark::{NewmarkConfig, NewmarkIntegrator};
use super::reduction::ModalBasis;
use super::state_space::StateSpaceIntegrator;
use super::CancelToken;
use crate::control::{AmbController, CompositeForce, ControlLaw, RhsForce, StepState};
use crate::elements::TableAxis;
use crate::error::{RotorError, RotorResult};
use crate::math::{gradient, DVec, Mat};
use crate::results::TimeResponseResult;
use crate::rotor::{MagneticModel, RotorSystem};

/// Spin speed of the driving rotor over a time history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpeedProfile {
    Constant(f64),
    /// One speed per time sample
    Varying(Vec<f64>),
}

impl From<f64> for SpeedProfile {
    fn from(speed: f64) -> Self {
        SpeedProfile::Constant(speed)
    }
}

impl From<Vec<f64>> for SpeedProfile {
    fn from(speeds: Vec<f64>) -> Self {
        SpeedProfile::Varying(speeds)
    }
}

impl SpeedProfile {
    /// Linear run-up from `start` to `end` over `ntime` samples
    pub fn ramp(start: f64, end: f64, ntime: usize) -> Self {
        let steps = ntime.saturating_sub(1).max(1) as f64;
        SpeedProfile::Varying((0..ntime).map(|i| start + (end - start) * i as f64 / steps).collect())
    }

    /// Speed at every one of `ntime` samples
    pub fn samples(&self, ntime: usize) -> RotorResult<Vec<f64>> {
        match self {
            SpeedProfile::Constant(s) => Ok(vec![*s; ntime]),
            SpeedProfile::Varying(v) if v.len() == ntime => Ok(v.clone()),
            SpeedProfile::Varying(v) => Err(RotorError::DimensionMismatch {
                what: "speed profile samples".to_string(),
                expected: ntime,
                found: v.len(),
            }),
        }
    }

    pub fn is_constant(&self) -> bool {
        match self {
            SpeedProfile::Constant(_) => true,
            SpeedProfile::Varying(v) => v.windows(2).all(|w| w[0] == w[1]),
        }
    }

    /// Speed at the first sample
    pub fn initial(&self) -> f64 {
        match self {
            SpeedProfile::Constant(s) => *s,
            SpeedProfile::Varying(v) => v.first().copied().unwrap_or(0.0),
        }
    }
}

/// Integration scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeMethod {
    /// Exact first-order-hold propagation of the linear system
    #[default]
    StateSpace,
    /// Implicit Newmark-beta with per-step callbacks and varying speed
    Newmark,
}

/// How magnetic bearings are closed in a Newmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AmbControl {
    /// Open-loop stiffness plus a PID [`AmbController`] built from the
    /// bearing gains
    #[default]
    Builtin,
    /// Open-loop stiffness; the caller passes its own controller as callback
    External,
    /// Linear-equivalent stiffness and damping, no controller
    Equivalent,
}

/// Options for time-domain analyses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeResponseOptions {
    pub method: TimeMethod,
    pub newmark: NewmarkConfig,
    /// Integrate on the lowest `r` undamped modes instead of all DOF
    pub model_reduction: Option<usize>,
    pub initial_displacement: Option<DVec>,
    pub initial_velocity: Option<DVec>,
    /// Excitation frequency for coefficient tables; `None` follows the
    /// spin speed
    pub frequency: Option<f64>,
    pub amb_control: AmbControl,
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl Default for TimeResponseOptions {
    fn default() -> Self {
        Self {
            method: TimeMethod::StateSpace,
            newmark: NewmarkConfig::default(),
            model_reduction: None,
            initial_displacement: None,
            initial_velocity: None,
            frequency: None,
            amb_control: AmbControl::Builtin,
            cancel: None,
        }
    }
}

impl TimeResponseOptions {
    /// Newmark integration with default parameters
    pub fn newmark() -> Self {
        Self::default().with_method(TimeMethod::Newmark)
    }

    pub fn with_method(mut self, method: TimeMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_newmark(mut self, config: NewmarkConfig) -> Self {
        self.newmark = config;
        self
    }

    pub fn with_model_reduction(mut self, num_modes: usize) -> Self {
        self.model_reduction = Some(num_modes);
        self
    }

    pub fn with_initial_conditions(mut self, displacement: DVec, velocity: DVec) -> Self {
        self.initial_displacement = Some(displacement);
        self.initial_velocity = Some(velocity);
        self
    }

    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_amb_control(mut self, control: AmbControl) -> Self {
        self.amb_control = control;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn magnetic_model(&self) -> MagneticModel {
        match (self.method, self.amb_control) {
            (TimeMethod::StateSpace, _) | (_, AmbControl::Equivalent) => MagneticModel::Equivalent,
            _ => MagneticModel::OpenLoop,
        }
    }
}

/// Stiffness and damping sampled at knot speeds, linear in between
///
/// Bearing tables interpolate linearly, so knots at every table point inside
/// the speed range reproduce the assembled matrices exactly.
#[derive(Debug, Clone)]
pub struct CoefficientSchedule {
    /// Ascending knot speeds, at least two
    speeds: Vec<f64>,
    k: Vec<Mat>,
    c: Vec<Mat>,
}

impl CoefficientSchedule {
    /// Assemble `K` and `C` of `system` at every knot
    ///
    /// `frequency` of `None` evaluates frequency tables at the knot speed.
    pub fn sample<S>(system: &S, speeds: Vec<f64>, frequency: Option<f64>, model: MagneticModel) -> RotorResult<Self>
    where
        S: RotorSystem + ?Sized,
    {
        if speeds.len() < 2 || speeds.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(RotorError::InvalidInput(format!(
                "coefficient schedule needs at least two ascending speeds, got {speeds:?}"
            )));
        }
        let mut k = Vec::with_capacity(speeds.len());
        let mut c = Vec::with_capacity(speeds.len());
        for &s in &speeds {
            let mats = system.matrices(frequency.unwrap_or(s), s, model)?;
            k.push(mats.k);
            c.push(mats.c);
        }
        Ok(Self { speeds, k, c })
    }

    pub fn speeds(&self) -> &[f64] {
        &self.speeds
    }

    /// Interpolated `(K, C)` at `speed`, held constant beyond the end knots
    pub fn at(&self, speed: f64) -> (Mat, Mat) {
        let last = self.speeds.len() - 1;
        let i = self.speeds.partition_point(|s| *s <= speed).clamp(1, last);
        let (s0, s1) = (self.speeds[i - 1], self.speeds[i]);
        let w = ((speed - s0) / (s1 - s0)).clamp(0.0, 1.0);
        (
            &self.k[i - 1] * (1.0 - w) + &self.k[i] * w,
            &self.c[i - 1] * (1.0 - w) + &self.c[i] * w,
        )
    }

    /// Schedule with every matrix mapped through `f`
    pub fn map(&self, f: impl Fn(&Mat) -> Mat) -> Self {
        Self {
            speeds: self.speeds.clone(),
            k: self.k.iter().map(&f).collect(),
            c: self.c.iter().map(&f).collect(),
        }
    }
}

/// Knot speeds covering `speeds`: the range ends plus every table point of a
/// speed-dependent coefficient inside the range
///
/// `None` when no coefficient varies with speed.
fn schedule_knots<S>(system: &S, speeds: &[f64], frequency: Option<f64>) -> Option<Vec<f64>>
where
    S: RotorSystem + ?Sized,
{
    let mut points = system.table_breakpoints(TableAxis::Speed);
    if frequency.is_none() {
        points.extend(system.table_breakpoints(TableAxis::Frequency));
    }
    if points.is_empty() {
        return None;
    }
    let lo = speeds.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = speeds.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(hi > lo) {
        return None;
    }
    let mut knots: Vec<f64> = points.into_iter().filter(|p| *p > lo && *p < hi).collect();
    knots.push(lo);
    knots.push(hi);
    knots.sort_by(f64::total_cmp);
    knots.dedup();
    Some(knots)
}

/// Linear second-order system prepared for integration
///
/// `M q̈ + (C + Ω G) q̇ + (K + Ω̇ G) q = F(t) + f(q, q̇, q̈)`
///
/// `k` and `c` hold the matrices at the initial speed; a `schedule`, when
/// present, supplies them along a speed history.
#[derive(Debug, Clone)]
pub struct TimeProblem {
    pub m: Mat,
    pub k: Mat,
    pub c: Mat,
    pub g: Mat,
    pub schedule: Option<CoefficientSchedule>,
    /// External force, `ntime x ndof`
    pub force: Mat,
    pub t: Vec<f64>,
    /// Spin speed per sample
    pub speed: Vec<f64>,
    /// Spin acceleration per sample
    pub accel: Vec<f64>,
    pub x0: DVec,
    pub v0: DVec,
}

impl TimeProblem {
    pub fn ndof(&self) -> usize {
        self.m.nrows()
    }

    pub fn ntime(&self) -> usize {
        self.t.len()
    }

    /// Check shapes and a strictly increasing time vector
    pub fn validate(&self) -> RotorResult<()> {
        let n = self.ndof();
        let nt = self.ntime();
        if nt < 2 {
            return Err(RotorError::InvalidInput("time vector needs at least two samples".to_string()));
        }
        if let Some(i) = self.t.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(RotorError::InvalidInput(format!(
                "time vector must be strictly increasing (t[{}] = {}, t[{}] = {})",
                i,
                self.t[i],
                i + 1,
                self.t[i + 1]
            )));
        }
        let dims = [
            ("force rows", nt, self.force.nrows()),
            ("force columns", n, self.force.ncols()),
            ("speed samples", nt, self.speed.len()),
            ("speed acceleration samples", nt, self.accel.len()),
            ("initial displacement", n, self.x0.len()),
            ("initial velocity", n, self.v0.len()),
        ];
        for (what, expected, found) in dims {
            if expected != found {
                return Err(RotorError::DimensionMismatch {
                    what: what.to_string(),
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// External force at sample `i`
    pub fn force_at(&self, i: usize) -> DVec {
        self.force.row(i).transpose()
    }

    /// `(K, C)` at spin `speed`
    pub fn stiffness_damping(&self, speed: f64) -> (Mat, Mat) {
        match &self.schedule {
            Some(schedule) => schedule.at(speed),
            None => (self.k.clone(), self.c.clone()),
        }
    }
}

/// A time-stepping scheme
pub trait TimeIntegrator {
    fn integrate(
        &self,
        problem: &TimeProblem,
        rhs: Option<&mut dyn RhsForce>,
        cancel: Option<&CancelToken>,
    ) -> RotorResult<TimeResponseResult>;
}

/// Callback adapter between reduced coordinates and the full DOF space
struct ProjectedRhs<'a, 'b> {
    basis: &'a ModalBasis,
    inner: &'a mut (dyn RhsForce + 'b),
}

impl RhsForce for ProjectedRhs<'_, '_> {
    fn reset(&mut self, _ndof: usize, dt: f64) -> RotorResult<()> {
        self.inner.reset(self.basis.ndof(), dt)
    }

    fn force(&mut self, state: &StepState<'_>) -> RotorResult<DVec> {
        let (x, v, a) = (
            self.basis.expand(state.disp),
            self.basis.expand(state.velc),
            self.basis.expand(state.accl),
        );
        let full = StepState {
            disp: &x,
            velc: &v,
            accl: &a,
            ..*state
        };
        let f = self.inner.force(&full)?;
        crate::control::check_len(&f, self.basis.ndof())?;
        Ok(self.basis.project_vector(&f))
    }

    fn end_step(&mut self, state: &StepState<'_>) {
        let (x, v, a) = (
            self.basis.expand(state.disp),
            self.basis.expand(state.velc),
            self.basis.expand(state.accl),
        );
        self.inner.end_step(&StepState {
            disp: &x,
            velc: &v,
            accl: &a,
            ..*state
        });
    }

    fn warnings(&self) -> Vec<String> {
        self.inner.warnings()
    }
}

/// Time response of `system` to the external force history `force`
pub fn run_time_response<S>(
    system: &S,
    speed: SpeedProfile,
    force: &Mat,
    t: &[f64],
    options: &TimeResponseOptions,
) -> RotorResult<TimeResponseResult>
where
    S: RotorSystem + ?Sized,
{
    run(system, speed, force, t, options, None)
}

/// Time response with an extra per-step callback force
pub fn run_time_response_with<S>(
    system: &S,
    speed: SpeedProfile,
    force: &Mat,
    t: &[f64],
    options: &TimeResponseOptions,
    rhs: &mut dyn RhsForce,
) -> RotorResult<TimeResponseResult>
where
    S: RotorSystem + ?Sized,
{
    run(system, speed, force, t, options, Some(rhs))
}

fn run<S>(
    system: &S,
    speed: SpeedProfile,
    force: &Mat,
    t: &[f64],
    options: &TimeResponseOptions,
    user: Option<&mut dyn RhsForce>,
) -> RotorResult<TimeResponseResult>
where
    S: RotorSystem + ?Sized,
{
    let n = system.ndof();
    let nt = t.len();
    let speeds = speed.samples(nt)?;
    let accel = gradient(&speeds, t);
    let initial_speed = speeds.first().copied().unwrap_or(0.0);
    info!(
        "time response: {:?}, {nt} samples, {n} DOF, initial speed {initial_speed:.3} rad/s",
        options.method
    );

    let model = options.magnetic_model();
    let frequency = options.frequency.unwrap_or(initial_speed);
    let mats = system.matrices(frequency, initial_speed, model)?;
    let schedule = match schedule_knots(system, &speeds, options.frequency) {
        Some(knots) => {
            debug!("re-sampling speed-dependent coefficients at {} speeds", knots.len());
            Some(CoefficientSchedule::sample(system, knots, options.frequency, model)?)
        }
        None => None,
    };

    let mut callbacks = CompositeForce::new();
    if model == MagneticModel::OpenLoop {
        let channels = system.magnetic_channels()?;
        match options.amb_control {
            AmbControl::Builtin if !channels.is_empty() => {
                callbacks.push(AmbController::new(channels, ControlLaw::Pid)?);
            }
            AmbControl::External if !channels.is_empty() && user.is_none() => {
                warn!("{} magnetic bearings run open loop without a controller", channels.len());
            }
            _ => {}
        }
    }
    if let Some(user) = user {
        callbacks.push(user);
    }

    let problem = TimeProblem {
        m: mats.m,
        k: mats.k,
        c: mats.c,
        g: mats.g,
        schedule,
        force: force.clone(),
        t: t.to_vec(),
        speed: speeds,
        accel,
        x0: options.initial_displacement.clone().unwrap_or_else(|| DVec::zeros(n)),
        v0: options.initial_velocity.clone().unwrap_or_else(|| DVec::zeros(n)),
    };
    problem.validate()?;

    let integrator: Box<dyn TimeIntegrator> = match options.method {
        TimeMethod::StateSpace => Box::new(StateSpaceIntegrator::new()),
        TimeMethod::Newmark => Box::new(NewmarkIntegrator::new(options.newmark.clone())),
    };
    let cancel = options.cancel.as_ref();

    let mut result = match options.model_reduction {
        None => {
            let rhs: Option<&mut dyn RhsForce> = if callbacks.is_empty() { None } else { Some(&mut callbacks) };
            integrator.integrate(&problem, rhs, cancel)?
        }
        Some(r) => {
            let basis = ModalBasis::new(&problem.m, &problem.k, r)?;
            let reduced = basis.reduce(&problem);
            let reduced_result = if callbacks.is_empty() {
                integrator.integrate(&reduced, None, cancel)?
            } else {
                let mut projected = ProjectedRhs {
                    basis: &basis,
                    inner: &mut callbacks,
                };
                integrator.integrate(&reduced, Some(&mut projected), cancel)?
            };
            basis.expand_result(reduced_result)
        }
    };

    result.warnings.extend(callbacks.warnings());
    info!(
        "time response finished: converged = {}, {} warnings",
        result.converged,
        result.warnings.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_speed_profile_samples() {
        assert_eq!(SpeedProfile::Constant(3.0).samples(2).unwrap(), vec![3.0, 3.0]);
        assert!(SpeedProfile::Varying(vec![1.0, 2.0]).samples(3).is_err());
        let ramp = SpeedProfile::ramp(0.0, 100.0, 5);
        let s = ramp.samples(5).unwrap();
        assert_relative_eq!(s[4], 100.0);
        assert!(!ramp.is_constant());
        assert!(SpeedProfile::Varying(vec![2.0, 2.0]).is_constant());
    }

    #[test]
    fn test_problem_rejects_non_monotonic_time() {
        let p = TimeProblem {
            m: Mat::identity(1, 1),
            k: Mat::identity(1, 1),
            c: Mat::zeros(1, 1),
            g: Mat::zeros(1, 1),
            schedule: None,
            force: Mat::zeros(3, 1),
            t: vec![0.0, 0.1, 0.1],
            speed: vec![0.0; 3],
            accel: vec![0.0; 3],
            x0: DVec::zeros(1),
            v0: DVec::zeros(1),
        };
        assert!(matches!(p.validate(), Err(RotorError::InvalidInput(_))));
    }

    #[test]
    fn test_schedule_interpolates_between_knots() {
        let schedule = CoefficientSchedule {
            speeds: vec![0.0, 100.0, 300.0],
            k: vec![Mat::from_element(1, 1, 1.0), Mat::from_element(1, 1, 3.0), Mat::from_element(1, 1, 7.0)],
            c: vec![Mat::zeros(1, 1), Mat::from_element(1, 1, 2.0), Mat::from_element(1, 1, 2.0)],
        };
        let (k, c) = schedule.at(50.0);
        assert_relative_eq!(k[(0, 0)], 2.0);
        assert_relative_eq!(c[(0, 0)], 1.0);
        assert_relative_eq!(schedule.at(200.0).0[(0, 0)], 5.0);
        assert_relative_eq!(schedule.at(300.0).0[(0, 0)], 7.0);
        // Held beyond the ends
        assert_relative_eq!(schedule.at(-10.0).0[(0, 0)], 1.0);
        assert_relative_eq!(schedule.at(500.0).0[(0, 0)], 7.0);
    }

    #[test]
    fn test_magnetic_model_selection() {
        assert_eq!(TimeResponseOptions::default().magnetic_model(), MagneticModel::Equivalent);
        assert_eq!(TimeResponseOptions::newmark().magnetic_model(), MagneticModel::OpenLoop);
        let eq = TimeResponseOptions::newmark().with_amb_control(AmbControl::Equivalent);
        assert_eq!(eq.magnetic_model(), MagneticModel::Equivalent);
    }
}
