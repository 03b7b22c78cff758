//! Per-step force callbacks and feedback controllers
//!
//! The Newmark integrator evaluates an [`RhsForce`] inside every step from the
//! current displacement, velocity and acceleration iterate. Any internal state
//! (controller integrators, filter states, contact history) lives in the
//! callback object, is reset at the start of each run and committed only once
//! a step is accepted through [`RhsForce::end_step`].

mod amb;
mod discrete;
mod pid;

pub use amb::{AmbController, AmbSample, ControlLaw};
pub use discrete::DiscreteController;
pub use pid::PidController;

use crate::error::{RotorError, RotorResult};
use crate::math::DVec;

/// State handed to a force callback
#[derive(Debug, Clone, Copy)]
pub struct StepState<'a> {
    /// Index of the step being solved (the state is at `t[step]`)
    pub step: usize,
    pub time: f64,
    /// Spin speed of the driving rotor (rad/s)
    pub speed: f64,
    pub disp: &'a DVec,
    pub velc: &'a DVec,
    pub accl: &'a DVec,
}

/// Extra state-dependent force added to the right-hand side of every step
pub trait RhsForce {
    /// Clear internal state before a run with `ndof` DOF and step `dt`
    fn reset(&mut self, _ndof: usize, _dt: f64) -> RotorResult<()> {
        Ok(())
    }

    /// Force for the current iterate; may be called several times per step
    fn force(&mut self, state: &StepState<'_>) -> RotorResult<DVec>;

    /// Commit internal state once the step at `state` is accepted
    fn end_step(&mut self, _state: &StepState<'_>) {}

    /// Physical-model warnings collected during the run
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<T: RhsForce + ?Sized> RhsForce for &mut T {
    fn reset(&mut self, ndof: usize, dt: f64) -> RotorResult<()> {
        (**self).reset(ndof, dt)
    }

    fn force(&mut self, state: &StepState<'_>) -> RotorResult<DVec> {
        (**self).force(state)
    }

    fn end_step(&mut self, state: &StepState<'_>) {
        (**self).end_step(state)
    }

    fn warnings(&self) -> Vec<String> {
        (**self).warnings()
    }
}

impl<T: RhsForce + ?Sized> RhsForce for Box<T> {
    fn reset(&mut self, ndof: usize, dt: f64) -> RotorResult<()> {
        (**self).reset(ndof, dt)
    }

    fn force(&mut self, state: &StepState<'_>) -> RotorResult<DVec> {
        (**self).force(state)
    }

    fn end_step(&mut self, state: &StepState<'_>) {
        (**self).end_step(state)
    }

    fn warnings(&self) -> Vec<String> {
        (**self).warnings()
    }
}

/// Stateless callback from a closure
pub struct ForceFn<F>(pub F);

impl<F> RhsForce for ForceFn<F>
where
    F: FnMut(&StepState<'_>) -> DVec,
{
    fn force(&mut self, state: &StepState<'_>) -> RotorResult<DVec> {
        Ok((self.0)(state))
    }
}

/// Sum of several callbacks
#[derive(Default)]
pub struct CompositeForce<'a> {
    parts: Vec<Box<dyn RhsForce + 'a>>,
}

impl<'a> CompositeForce<'a> {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    pub fn with(mut self, part: impl RhsForce + 'a) -> Self {
        self.parts.push(Box::new(part));
        self
    }

    pub fn push(&mut self, part: impl RhsForce + 'a) {
        self.parts.push(Box::new(part));
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }
}

impl RhsForce for CompositeForce<'_> {
    fn reset(&mut self, ndof: usize, dt: f64) -> RotorResult<()> {
        self.parts.iter_mut().try_for_each(|p| p.reset(ndof, dt))
    }

    fn force(&mut self, state: &StepState<'_>) -> RotorResult<DVec> {
        let n = state.disp.len();
        let mut total = DVec::zeros(n);
        for part in &mut self.parts {
            let f = part.force(state)?;
            check_len(&f, n)?;
            total += f;
        }
        Ok(total)
    }

    fn end_step(&mut self, state: &StepState<'_>) {
        for part in &mut self.parts {
            part.end_step(state);
        }
    }

    fn warnings(&self) -> Vec<String> {
        self.parts.iter().flat_map(|p| p.warnings()).collect()
    }
}

/// Reject a callback force of the wrong size
pub(crate) fn check_len(f: &DVec, ndof: usize) -> RotorResult<()> {
    if f.len() != ndof {
        return Err(RotorError::DimensionMismatch {
            what: "callback force".to_string(),
            expected: ndof,
            found: f.len(),
        });
    }
    Ok(())
}
