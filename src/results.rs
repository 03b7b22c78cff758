//! Result types for rotor analyses

use nalgebra::Complex;
use serde::{Deserialize, Serialize};

use crate::error::RotorResult;
use crate::math::{CMat, CVec, DVec, Mat};

/// Whirl direction of a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Whirl {
    Forward,
    Backward,
    /// Nodes disagree on the orbit sense
    Mixed,
}

impl Whirl {
    /// Numeric encoding: forward 0, backward 1, mixed 0.5
    pub fn value(self) -> f64 {
        match self {
            Whirl::Forward => 0.0,
            Whirl::Backward => 1.0,
            Whirl::Mixed => 0.5,
        }
    }

    /// The same orbit seen from a shaft spinning the other way
    pub fn reversed(self) -> Self {
        match self {
            Whirl::Forward => Whirl::Backward,
            Whirl::Backward => Whirl::Forward,
            Whirl::Mixed => Whirl::Mixed,
        }
    }
}

/// Dominant motion of a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeType {
    Lateral,
    Axial,
    Torsional,
}

/// Elliptical orbit of one node in a mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orbit {
    pub node: usize,
    /// Complex x amplitude
    pub x: Complex<f64>,
    /// Complex y amplitude
    pub y: Complex<f64>,
    /// Semi-major axis
    pub major_axis: f64,
    /// Semi-minor axis
    pub minor_axis: f64,
    /// Sense of the orbit, `None` for a degenerate (straight-line) orbit
    pub whirl: Option<Whirl>,
}

impl Orbit {
    /// Orbit traced by `x(t) = Re(X e^{iωt})`, `y(t) = Re(Y e^{iωt})`
    ///
    /// Whirl is relative to a shaft spinning from x towards y.
    pub fn from_amplitudes(node: usize, x: Complex<f64>, y: Complex<f64>, tol: f64) -> Self {
        // Split into forward and backward circular components
        let i = Complex::new(0.0, 1.0);
        let forward = (x + i * y) * 0.5;
        let backward = (x - i * y) * 0.5;
        let (rf, rb) = (forward.norm(), backward.norm());
        let sense = -(x.conj() * y).im;
        let whirl = if sense.abs() <= tol {
            None
        } else if sense > 0.0 {
            Some(Whirl::Forward)
        } else {
            Some(Whirl::Backward)
        };
        Self {
            node,
            x,
            y,
            major_axis: rf + rb,
            minor_axis: (rf - rb).abs(),
            whirl,
        }
    }
}

/// Eigen-analysis at one speed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalResult {
    /// Spin speed of the analysis (rad/s)
    pub speed: f64,
    /// Eigenvalues with positive imaginary part, ascending `Im(λ)`
    pub evalues: Vec<Complex<f64>>,
    /// Displacement part of each eigenvector, one column per mode
    pub evectors: CMat,
    /// Undamped natural frequencies `|λ|` (rad/s)
    pub wn: Vec<f64>,
    /// Damped natural frequencies `Im(λ)` (rad/s)
    pub wd: Vec<f64>,
    pub damping_ratio: Vec<f64>,
    /// Logarithmic decrement
    pub log_dec: Vec<f64>,
    pub whirl: Vec<Whirl>,
    pub mode_type: Vec<ModeType>,
    /// `(node, x_dof, y_dof)` used for orbits
    pub lateral_pairs: Vec<(usize, usize, usize)>,
    /// Spin sign of each lateral pair's node, empty when all spin with `speed`
    #[serde(default)]
    pub spin_sense: Vec<f64>,
}

impl ModalResult {
    /// Number of physical modes
    pub fn num_modes(&self) -> usize {
        self.evalues.len()
    }

    /// Whirl encoded per mode (forward 0, backward 1, mixed 0.5)
    pub fn whirl_values(&self) -> Vec<f64> {
        self.whirl.iter().map(|w| w.value()).collect()
    }

    /// Mode shape normalised so its largest component is real and equal to 1
    pub fn mode_shape(&self, mode: usize) -> Option<CVec> {
        if mode >= self.num_modes() {
            return None;
        }
        let v = self.evectors.column(mode).into_owned();
        let peak = v.iter().copied().max_by(|a, b| a.norm().total_cmp(&b.norm()))?;
        if peak.norm() == 0.0 {
            return Some(v);
        }
        Some(v.map(|c| c / peak))
    }

    /// Orbit of every node in `mode`
    pub fn node_orbits(&self, mode: usize) -> Vec<Orbit> {
        let Some(shape) = self.mode_shape(mode) else {
            return Vec::new();
        };
        let scale = shape.iter().map(|c| c.norm()).fold(0.0, f64::max);
        let tol = 1e-6 * scale * scale;
        self.lateral_pairs
            .iter()
            .enumerate()
            .map(|(i, &(node, dx, dy))| {
                let mut orbit = Orbit::from_amplitudes(node, shape[dx], shape[dy], tol);
                if self.spin_sense.get(i).is_some_and(|s| *s < 0.0) {
                    orbit.whirl = orbit.whirl.map(Whirl::reversed);
                }
                orbit
            })
            .collect()
    }

    /// Indices of modes with negative damping
    pub fn unstable_modes(&self) -> Vec<usize> {
        (0..self.num_modes()).filter(|&i| self.log_dec[i] < 0.0).collect()
    }

    pub fn to_json(&self) -> RotorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A tracked mode whose frequency jumped between adjacent speeds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeJump {
    pub speed_index: usize,
    pub mode: usize,
    pub from: f64,
    pub to: f64,
}

/// Intersection of a tracked mode with a harmonic excitation line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalSpeed {
    pub mode: usize,
    /// Speed at the crossing (rad/s)
    pub speed: f64,
    /// Damped frequency at the crossing (rad/s)
    pub frequency: f64,
    /// Whirl encoding at the nearest sample
    pub whirl: f64,
}

/// Whirl-speed map over a speed range
///
/// Arrays are indexed `(speed, mode)`; modes are tracked across speeds by
/// frequency proximity. Missing samples hold NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampbellResult {
    pub speeds: Vec<f64>,
    pub wd: Mat,
    pub wn: Mat,
    pub damping_ratio: Mat,
    pub log_dec: Mat,
    pub whirl_values: Mat,
    /// Speed indices whose eigensolve failed
    pub missing: Vec<usize>,
    pub jumps: Vec<ModeJump>,
    pub warnings: Vec<String>,
}

impl CampbellResult {
    pub fn num_modes(&self) -> usize {
        self.wd.ncols()
    }

    /// `(speed_index, mode)` cells with negative logarithmic decrement
    pub fn unstable(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for i in 0..self.log_dec.nrows() {
            for j in 0..self.log_dec.ncols() {
                if self.log_dec[(i, j)] < 0.0 {
                    out.push((i, j));
                }
            }
        }
        out
    }

    /// Whether any tracked mode loses stability in the range
    pub fn is_stable(&self) -> bool {
        self.unstable().is_empty()
    }

    /// Crossings of each mode with the line `frequency = harmonic · speed`
    pub fn critical_speeds(&self, harmonic: f64) -> Vec<CriticalSpeed> {
        let mut out = Vec::new();
        for mode in 0..self.num_modes() {
            for i in 1..self.speeds.len() {
                let (s0, s1) = (self.speeds[i - 1], self.speeds[i]);
                let (w0, w1) = (self.wd[(i - 1, mode)], self.wd[(i, mode)]);
                if !w0.is_finite() || !w1.is_finite() {
                    continue;
                }
                let (d0, d1) = (w0 - harmonic * s0, w1 - harmonic * s1);
                let last = i + 1 == self.speeds.len();
                let sign_change = d1 != 0.0 && d0.signum() != d1.signum();
                if d0 == 0.0 || sign_change || (last && d1 == 0.0) {
                    let f = if d1 == d0 { 0.0 } else { d0 / (d0 - d1) };
                    let nearest = if f < 0.5 { i - 1 } else { i };
                    out.push(CriticalSpeed {
                        mode,
                        speed: s0 + f * (s1 - s0),
                        frequency: w0 + f * (w1 - w0),
                        whirl: self.whirl_values[(nearest, mode)],
                    });
                }
            }
        }
        out.sort_by(|a, b| a.speed.total_cmp(&b.speed));
        out
    }

    pub fn to_json(&self) -> RotorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Time history of a transient analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeResponseResult {
    pub t: Vec<f64>,
    /// Displacements, `ntime x ndof`
    pub yout: Mat,
    /// Velocities, `ntime x ndof`
    pub velocity: Mat,
    /// Accelerations, `ntime x ndof` (Newmark only)
    pub acceleration: Option<Mat>,
    /// False when any Newmark step hit the iteration cap
    pub converged: bool,
    /// Steps accepted without convergence
    pub failed_steps: Vec<usize>,
    /// Physical-model and convergence warnings
    pub warnings: Vec<String>,
}

impl TimeResponseResult {
    /// Displacement history of one DOF
    pub fn dof_history(&self, dof: usize) -> Vec<f64> {
        if dof >= self.yout.ncols() {
            return Vec::new();
        }
        self.yout.column(dof).iter().copied().collect()
    }

    /// Largest absolute displacement of one DOF
    pub fn peak(&self, dof: usize) -> f64 {
        self.dof_history(dof).iter().fold(0.0, |acc, v| acc.max(v.abs()))
    }

    pub fn to_json(&self) -> RotorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Receptance matrices `H(ω)` over a frequency range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyResponseResult {
    pub speed: f64,
    pub frequencies: Vec<f64>,
    /// One `ndof x ndof` matrix per frequency
    pub responses: Vec<CMat>,
}

impl FrequencyResponseResult {
    /// `H[out, inp]` over all frequencies
    pub fn receptance(&self, inp: usize, out: usize) -> Vec<Complex<f64>> {
        self.responses.iter().map(|h| h[(out, inp)]).collect()
    }

    pub fn magnitude(&self, inp: usize, out: usize) -> Vec<f64> {
        self.receptance(inp, out).iter().map(|c| c.norm()).collect()
    }

    /// Phase angle in radians
    pub fn phase(&self, inp: usize, out: usize) -> Vec<f64> {
        self.receptance(inp, out).iter().map(|c| c.arg()).collect()
    }
}

/// Harmonic response to a forcing, one column per frequency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForcedResponseResult {
    pub frequencies: Vec<f64>,
    /// Complex amplitudes, `ndof x nfreq`
    pub response: CMat,
}

impl ForcedResponseResult {
    pub fn dof_response(&self, dof: usize) -> Vec<Complex<f64>> {
        self.response.row(dof).iter().copied().collect()
    }

    pub fn magnitude(&self, dof: usize) -> Vec<f64> {
        self.response.row(dof).iter().map(|c| c.norm()).collect()
    }

    pub fn to_json(&self) -> RotorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Lateral static deflection of one node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeDeflection {
    pub node: usize,
    pub dx: f64,
    pub dy: f64,
}

/// Force a bearing exerts on its node (N)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportReaction {
    pub node: usize,
    pub tag: String,
    pub force: [f64; 3],
}

/// Static equilibrium under gravity along -y
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticResult {
    /// Displacement of every DOF
    pub deflection: DVec,
    pub nodes: Vec<NodeDeflection>,
    pub reactions: Vec<SupportReaction>,
    /// Total weight carried by the supports (N)
    pub weight: f64,
}

impl StaticResult {
    /// Largest lateral deflection magnitude and its node
    pub fn max_deflection(&self) -> Option<NodeDeflection> {
        self.nodes
            .iter()
            .copied()
            .max_by(|a, b| a.dx.hypot(a.dy).total_cmp(&b.dx.hypot(b.dy)))
    }

    pub fn to_json(&self) -> RotorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Undamped critical speeds against support stiffness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UcsResult {
    /// Support stiffness samples (N/m)
    pub stiffness: Vec<f64>,
    /// `nstiffness x nmodes` lateral critical speeds (rad/s), NaN where a
    /// mode was not found
    pub critical_speeds: Mat,
}

impl UcsResult {
    pub fn num_modes(&self) -> usize {
        self.critical_speeds.ncols()
    }

    /// Critical speed of `mode` over the stiffness samples
    pub fn mode(&self, mode: usize) -> Vec<f64> {
        self.critical_speeds.column(mode).iter().copied().collect()
    }

    pub fn to_json(&self) -> RotorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
