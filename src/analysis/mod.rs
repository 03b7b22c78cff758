//! Analysis options and solvers

pub mod campbell;
pub mod frequency;
pub mod modal;
pub mod newmark;
pub mod reduction;
pub mod state_space;
pub mod statics;
pub mod time_response;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RotorError, RotorResult};

pub use newmark::{NewmarkConfig, NewmarkIntegrator};
pub use reduction::ModalBasis;
pub use state_space::StateSpaceIntegrator;
pub use statics::GRAVITY;
pub use time_response::{
    AmbControl, CoefficientSchedule, SpeedProfile, TimeIntegrator, TimeMethod, TimeProblem,
    TimeResponseOptions,
};

/// What to do when an iterative solve does not converge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConvergencePolicy {
    /// Keep the last iterate, flag the result and log a warning
    #[default]
    BestEffort,
    /// Return an error
    Strict,
}

/// Cooperative cancellation flag checked between speed samples and time steps
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(token: Option<&CancelToken>) -> RotorResult<()> {
        match token {
            Some(t) if t.is_cancelled() => Err(RotorError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Options for modal analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalOptions {
    /// Number of physical modes to report
    pub num_modes: usize,
    /// Roots with `|λ|` below this (rad/s) are treated as rigid-body modes
    pub rigid_body_tol: f64,
    /// Excitation frequency for coefficient tables; `None` uses the speed
    pub frequency: Option<f64>,
    /// Iteration cap of the Schur decomposition (0 = unlimited)
    pub max_iter: usize,
}

impl Default for ModalOptions {
    fn default() -> Self {
        Self {
            num_modes: 12,
            rigid_body_tol: 1.0,
            frequency: None,
            max_iter: 10_000,
        }
    }
}

impl ModalOptions {
    pub fn new(num_modes: usize) -> Self {
        Self {
            num_modes,
            ..Self::default()
        }
    }

    pub fn with_num_modes(mut self, num_modes: usize) -> Self {
        self.num_modes = num_modes;
        self
    }

    pub fn with_rigid_body_tol(mut self, tol: f64) -> Self {
        self.rigid_body_tol = tol;
        self
    }

    /// Evaluate frequency-dependent coefficients at a fixed frequency
    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
}

/// Options for Campbell sweeps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampbellOptions {
    pub modal: ModalOptions,
    /// Relative frequency change between adjacent speeds that is flagged as a jump
    pub jump_tolerance: f64,
    pub policy: ConvergencePolicy,
    /// Solve speed samples on the rayon thread pool (`parallel` feature)
    pub parallel: bool,
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl Default for CampbellOptions {
    fn default() -> Self {
        Self {
            modal: ModalOptions::default(),
            jump_tolerance: 0.5,
            policy: ConvergencePolicy::BestEffort,
            parallel: false,
            cancel: None,
        }
    }
}

impl CampbellOptions {
    pub fn with_jump_tolerance(mut self, tol: f64) -> Self {
        self.jump_tolerance = tol;
        self
    }

    pub fn with_policy(mut self, policy: ConvergencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_modal(mut self, modal: ModalOptions) -> Self {
        self.modal = modal;
        self
    }
}
