use serde::{Deserialize, Serialize};

/// Discrete PID law with a rectangular integrator
///
/// The integral advances only through [`PidController::commit`], so the
/// output can be evaluated repeatedly within one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidController {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    integral: f64,
    pending: f64,
}

impl PidController {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            pending: 0.0,
        }
    }

    /// Control output for `error` and its time derivative
    pub fn output(&mut self, error: f64, error_rate: f64, dt: f64) -> f64 {
        self.pending = self.integral + error * dt;
        self.kp * error + self.ki * self.pending + self.kd * error_rate
    }

    /// Accept the integral of the last evaluated output
    pub fn commit(&mut self) {
        self.integral = self.pending;
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.pending = 0.0;
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }
}
