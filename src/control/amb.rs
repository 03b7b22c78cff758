use log::debug;
use serde::{Deserialize, Serialize};

use super::{DiscreteController, PidController, RhsForce, StepState};
use crate::error::{RotorError, RotorResult};
use crate::math::DVec;
use crate::rotor::{MagneticChannel, RotorSystem};

/// Feedback law closing the magnetic bearing loop
#[derive(Debug, Clone, PartialEq)]
pub enum ControlLaw {
    /// Independent PID per bearing axis from each bearing's gains
    Pid,
    /// One MIMO law over the errors `[ex0, ey0, ex1, ey1, ...]`, each
    /// `-k_sense·x` as for the PID law
    Discrete(DiscreteController),
}

/// Coil current and magnetic force of one bearing at an accepted step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbSample {
    pub time: f64,
    /// Index of the bearing in [`RotorSystem::magnetic_channels`] order
    pub bearing: usize,
    pub current_x: f64,
    pub current_y: f64,
    pub force_x: f64,
    pub force_y: f64,
}

/// Closed-loop controller for every magnetic bearing of a system
///
/// Sensor signal `k_sense·(x - x_link)`, control error `e = -k_sense·(x - x_link)`
/// against a zero reference, control output `u(e)`, coil current `k_amp·u`
/// and actuator force `ki·i`. The negative magnetic stiffness `ks`
/// stays in the open-loop stiffness matrix.
#[derive(Debug, Clone)]
pub struct AmbController {
    channels: Vec<MagneticChannel>,
    law: ControlLaw,
    pids: Vec<[PidController; 2]>,
    dt: f64,
    pending: Vec<AmbSample>,
    log: Vec<AmbSample>,
}

impl AmbController {
    /// PID control of every magnetic bearing in `system`
    pub fn from_system<S: RotorSystem + ?Sized>(system: &S) -> RotorResult<Self> {
        Self::new(system.magnetic_channels()?, ControlLaw::Pid)
    }

    /// Custom control law over every magnetic bearing in `system`
    ///
    /// A discrete law sees the same error signs as the PID law, so a positive
    /// gain pushes the shaft back towards the centre.
    pub fn with_law<S: RotorSystem + ?Sized>(system: &S, law: ControlLaw) -> RotorResult<Self> {
        Self::new(system.magnetic_channels()?, law)
    }

    pub fn new(channels: Vec<MagneticChannel>, law: ControlLaw) -> RotorResult<Self> {
        if let ControlLaw::Discrete(ctl) = &law {
            let signals = 2 * channels.len();
            if ctl.inputs() != signals || ctl.outputs() != signals {
                return Err(RotorError::DimensionMismatch {
                    what: "discrete AMB law inputs/outputs".to_string(),
                    expected: signals,
                    found: ctl.inputs().max(ctl.outputs()),
                });
            }
        }
        let pids = channels
            .iter()
            .map(|ch| {
                let g = ch.bearing.gains;
                [PidController::new(g.kp, g.ki, g.kd), PidController::new(g.kp, g.ki, g.kd)]
            })
            .collect();
        Ok(Self {
            channels,
            law,
            pids,
            dt: 0.0,
            pending: Vec::new(),
            log: Vec::new(),
        })
    }

    pub fn channels(&self) -> &[MagneticChannel] {
        &self.channels
    }

    /// Current and force history of the last run
    pub fn log(&self) -> &[AmbSample] {
        &self.log
    }

    pub fn bearing_log(&self, bearing: usize) -> Vec<AmbSample> {
        self.log.iter().filter(|s| s.bearing == bearing).copied().collect()
    }

    fn relative(ch: &MagneticChannel, v: &DVec) -> [f64; 2] {
        let [dx, dy] = ch.dofs;
        match ch.link {
            Some([lx, ly]) => [v[dx] - v[lx], v[dy] - v[ly]],
            None => [v[dx], v[dy]],
        }
    }
}

impl RhsForce for AmbController {
    fn reset(&mut self, _ndof: usize, dt: f64) -> RotorResult<()> {
        self.dt = dt;
        self.pending.clear();
        self.log.clear();
        for pair in &mut self.pids {
            pair.iter_mut().for_each(PidController::reset);
        }
        if let ControlLaw::Discrete(ctl) = &mut self.law {
            ctl.reset();
        }
        debug!("AMB controller reset for {} bearings, dt = {dt:e}", self.channels.len());
        Ok(())
    }

    fn force(&mut self, state: &StepState<'_>) -> RotorResult<DVec> {
        let mut f = DVec::zeros(state.disp.len());
        let nch = self.channels.len();

        let outputs: Vec<[f64; 2]> = match &mut self.law {
            ControlLaw::Pid => self
                .channels
                .iter()
                .zip(self.pids.iter_mut())
                .map(|(ch, pid)| {
                    let ks = ch.bearing.gains.k_sense;
                    let x = Self::relative(ch, state.disp);
                    let v = Self::relative(ch, state.velc);
                    [
                        pid[0].output(-ks * x[0], -ks * v[0], self.dt),
                        pid[1].output(-ks * x[1], -ks * v[1], self.dt),
                    ]
                })
                .collect(),
            ControlLaw::Discrete(ctl) => {
                let mut signals = DVec::zeros(2 * nch);
                for (i, ch) in self.channels.iter().enumerate() {
                    let x = Self::relative(ch, state.disp);
                    signals[2 * i] = -ch.bearing.gains.k_sense * x[0];
                    signals[2 * i + 1] = -ch.bearing.gains.k_sense * x[1];
                }
                let y = ctl.output(&signals)?;
                (0..nch).map(|i| [y[2 * i], y[2 * i + 1]]).collect()
            }
        };

        self.pending.clear();
        for (i, (ch, u)) in self.channels.iter().zip(outputs).enumerate() {
            let gains = ch.bearing.gains;
            let ki = ch.bearing.ki();
            let current = [gains.k_amp * u[0], gains.k_amp * u[1]];
            let force = [ki * current[0], ki * current[1]];
            let [dx, dy] = ch.dofs;
            f[dx] += force[0];
            f[dy] += force[1];
            if let Some([lx, ly]) = ch.link {
                f[lx] -= force[0];
                f[ly] -= force[1];
            }
            self.pending.push(AmbSample {
                time: state.time,
                bearing: i,
                current_x: current[0],
                current_y: current[1],
                force_x: force[0],
                force_y: force[1],
            });
        }
        Ok(f)
    }

    fn end_step(&mut self, _state: &StepState<'_>) {
        for pair in &mut self.pids {
            pair.iter_mut().for_each(PidController::commit);
        }
        if let ControlLaw::Discrete(ctl) = &mut self.law {
            ctl.commit();
        }
        self.log.append(&mut self.pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{AmbGains, MagneticBearingElement, Material, ShaftElement};
    use crate::math::Mat;
    use crate::rotor::Rotor;
    use approx::assert_relative_eq;

    fn amb_rotor(gains: AmbGains) -> Rotor {
        let amb = |n| MagneticBearingElement::new(n, 1e-3, 1.0, 1e-4, 200.0, 0.39, gains);
        Rotor::builder()
            .add_shafts((0..2).map(|_| ShaftElement::new(0.2, 0.0, 0.04, Material::steel())))
            .add_magnetic_bearing(amb(0))
            .add_magnetic_bearing(amb(2))
            .build()
            .unwrap()
    }

    #[test]
    fn test_pid_force_matches_equivalent_stiffness() {
        let gains = AmbGains {
            kp: 2.0,
            ki: 0.0,
            kd: 0.01,
            k_amp: 1.5,
            k_sense: 100.0,
        };
        let rotor = amb_rotor(gains);
        let mut ctl = AmbController::from_system(&rotor).unwrap();
        ctl.reset(rotor.ndof(), 1e-4).unwrap();

        let mut disp = DVec::zeros(rotor.ndof());
        let vel = DVec::zeros(rotor.ndof());
        disp[0] = 1e-5;
        let state = StepState {
            step: 1,
            time: 1e-4,
            speed: 0.0,
            disp: &disp,
            velc: &vel,
            accl: &vel,
        };
        let f = ctl.force(&state).unwrap();
        let bearing = &rotor.magnetic_bearings()[0];
        let closed_loop = bearing.equivalent_stiffness() - bearing.ks();
        assert_relative_eq!(f[0], -closed_loop * 1e-5, max_relative = 1e-12);
        assert_eq!(f[1], 0.0);

        assert!(ctl.log().is_empty());
        ctl.end_step(&state);
        assert_eq!(ctl.log().len(), 2);
        assert_relative_eq!(ctl.bearing_log(0)[0].force_x, f[0]);
    }

    #[test]
    fn test_discrete_law_dimension_checked() {
        let rotor = amb_rotor(AmbGains::default());
        let law = ControlLaw::Discrete(DiscreteController::gain(Mat::identity(2, 2)));
        assert!(AmbController::with_law(&rotor, law).is_err());
        let law = ControlLaw::Discrete(DiscreteController::gain(Mat::identity(4, 4)));
        assert!(AmbController::with_law(&rotor, law).is_ok());
    }

    #[test]
    fn test_discrete_gain_matches_proportional_pid() {
        let gains = AmbGains {
            kp: 2.0,
            ki: 0.0,
            kd: 0.0,
            k_amp: 1.5,
            k_sense: 100.0,
        };
        let rotor = amb_rotor(gains);
        let mut pid = AmbController::from_system(&rotor).unwrap();
        let law = ControlLaw::Discrete(DiscreteController::gain(Mat::identity(4, 4) * gains.kp));
        let mut discrete = AmbController::with_law(&rotor, law).unwrap();
        pid.reset(rotor.ndof(), 1e-4).unwrap();
        discrete.reset(rotor.ndof(), 1e-4).unwrap();

        let mut disp = DVec::zeros(rotor.ndof());
        let vel = DVec::zeros(rotor.ndof());
        disp[0] = 1e-5;
        disp[1] = -2e-5;
        let state = StepState {
            step: 1,
            time: 1e-4,
            speed: 0.0,
            disp: &disp,
            velc: &vel,
            accl: &vel,
        };
        let a = pid.force(&state).unwrap();
        let b = discrete.force(&state).unwrap();
        assert!(a[0] < 0.0 && a[1] > 0.0);
        assert_relative_eq!(a, b, max_relative = 1e-12);
    }
}
