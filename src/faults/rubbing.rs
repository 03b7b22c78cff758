//! Rotor-stator rub at a shaft node
//!
//! Once the radial displacement `r` of the node exceeds the clearance `δ`, a
//! penalty contact pushes the shaft back towards the centre,
//!
//! ```text
//! Fn = max(k·(r - δ) + c·ṙ, 0)
//! F  = -Fn·n̂ - μ·Fn·sign(v_t + Ω·R)·t̂
//! ```
//!
//! with `n̂` the outward radial direction, `t̂` the tangential direction and
//! `v_t + Ω·R` the sliding speed of the shaft surface at the contact. With
//! torque enabled the friction also acts on the torsional DOF as `-μ·Fn·R·sign`.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::{SpeedProfile, TimeMethod, TimeResponseOptions};
use crate::control::{RhsForce, StepState};
use crate::elements::ShaftSegment;
use crate::error::{RotorError, RotorResult};
use crate::loads::{unbalance_force_over_time, Unbalance};
use crate::math::DVec;
use crate::results::TimeResponseResult;
use crate::rotor::{Rotor, RotorSystem};

/// Contact state of one accepted step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RubbingSample {
    pub step: usize,
    pub time: f64,
    /// `r - δ`, negative while out of contact
    pub penetration: f64,
    pub normal_force: f64,
    pub friction_force: f64,
    pub fx: f64,
    pub fy: f64,
}

/// Response of a rubbing simulation with its contact history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubbingResult {
    pub response: TimeResponseResult,
    pub history: Vec<RubbingSample>,
}

impl RubbingResult {
    /// Steps in contact with the stator
    pub fn contact_steps(&self) -> Vec<usize> {
        self.history.iter().filter(|s| s.penetration > 0.0).map(|s| s.step).collect()
    }

    pub fn max_penetration(&self) -> f64 {
        self.history.iter().map(|s| s.penetration).fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Contact force between the shaft and a stator ring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubbing {
    pub node: usize,
    /// Shaft surface radius at the contact (m)
    pub radius: f64,
    /// Radial clearance (m)
    pub delta: f64,
    pub contact_stiffness: f64,
    pub contact_damping: f64,
    pub friction_coeff: f64,
    pub torque: bool,
    /// `[x, y, θ]` DOF of the contact node
    dofs: [usize; 3],
    speed_ratio: f64,
    history: Vec<RubbingSample>,
    deep_contacts: usize,
}

#[derive(Debug, Clone, Copy)]
struct Contact {
    penetration: f64,
    normal: f64,
    friction: f64,
    force: [f64; 3],
}

impl Rubbing {
    /// Rub at the left node of shaft element `n_rubbing`, radius from its
    /// left outer diameter
    pub fn new(
        rotor: &Rotor,
        n_rubbing: usize,
        delta: f64,
        contact_stiffness: f64,
        contact_damping: f64,
        friction_coeff: f64,
    ) -> RotorResult<Self> {
        let element = rotor
            .shaft_elements()
            .iter()
            .filter_map(ShaftSegment::as_shaft)
            .find(|s| s.n == Some(n_rubbing))
            .ok_or_else(|| {
                RotorError::InvalidInput(format!("no shaft element with n = {n_rubbing} for rubbing"))
            })?;
        Self::at_node(
            rotor,
            n_rubbing,
            element.odl / 2.0,
            delta,
            contact_stiffness,
            contact_damping,
            friction_coeff,
        )
    }

    /// Rub at any shaft node of a system
    pub fn at_node<S: RotorSystem + ?Sized>(
        system: &S,
        node: usize,
        radius: f64,
        delta: f64,
        contact_stiffness: f64,
        contact_damping: f64,
        friction_coeff: f64,
    ) -> RotorResult<Self> {
        let dofs = system
            .shaft_node_dofs(node)
            .ok_or_else(|| RotorError::InvalidInput(format!("rubbing node {node} is not a shaft node")))?;
        if !(delta > 0.0) || !(contact_stiffness > 0.0) || contact_damping < 0.0 || friction_coeff < 0.0 {
            return Err(RotorError::InvalidInput(format!(
                "rubbing needs positive clearance and stiffness, non-negative damping and friction \
                 (delta={delta}, k={contact_stiffness}, c={contact_damping}, mu={friction_coeff})"
            )));
        }
        Ok(Self {
            node,
            radius,
            delta,
            contact_stiffness,
            contact_damping,
            friction_coeff,
            torque: false,
            dofs: [dofs[0], dofs[1], dofs[5]],
            speed_ratio: system.speed_ratio(node),
            history: Vec::new(),
            deep_contacts: 0,
        })
    }

    pub fn with_torque(mut self, torque: bool) -> Self {
        self.torque = torque;
        self
    }

    /// Contact history of the last run
    pub fn history(&self) -> &[RubbingSample] {
        &self.history
    }

    /// Contact force for a node displacement `(x, y)` and velocity `(vx, vy)`
    /// at driving speed `speed`, as `[Fx, Fy, Tθ]`
    pub fn contact_force(&self, x: f64, y: f64, vx: f64, vy: f64, speed: f64) -> [f64; 3] {
        self.contact(x, y, vx, vy, speed).force
    }

    fn contact(&self, x: f64, y: f64, vx: f64, vy: f64, speed: f64) -> Contact {
        let r = x.hypot(y);
        let penetration = r - self.delta;
        if penetration <= 0.0 {
            return Contact {
                penetration,
                normal: 0.0,
                friction: 0.0,
                force: [0.0; 3],
            };
        }

        let (nx, ny) = (x / r, y / r);
        let (tx, ty) = (-ny, nx);
        let radial_velocity = vx * nx + vy * ny;
        let sliding = vx * tx + vy * ty + speed * self.speed_ratio * self.radius;

        let normal = (self.contact_stiffness * penetration + self.contact_damping * radial_velocity).max(0.0);
        let friction = if sliding == 0.0 {
            0.0
        } else {
            self.friction_coeff * normal * sliding.signum()
        };
        let torque = if self.torque { -friction * self.radius } else { 0.0 };
        Contact {
            penetration,
            normal,
            friction,
            force: [-normal * nx - friction * tx, -normal * ny - friction * ty, torque],
        }
    }

    fn node_state(&self, state: &StepState<'_>) -> Contact {
        let [dx, dy, _] = self.dofs;
        self.contact(state.disp[dx], state.disp[dy], state.velc[dx], state.velc[dy], state.speed)
    }

    /// Time response to `unbalances` with this rub active, integrated with
    /// Newmark whatever method `options` names
    pub fn run<S: RotorSystem + ?Sized>(
        &mut self,
        system: &S,
        unbalances: &[Unbalance],
        speed: SpeedProfile,
        t: &[f64],
        options: &TimeResponseOptions,
    ) -> RotorResult<RubbingResult> {
        info!(
            "rubbing at node {} (clearance {:e} m) with {} unbalances",
            self.node,
            self.delta,
            unbalances.len()
        );
        let (force, _) = unbalance_force_over_time(system, unbalances, &speed, t)?;
        let options = options.clone().with_method(TimeMethod::Newmark);
        let response = system.run_time_response_with(speed, &force, t, &options, self)?;
        Ok(RubbingResult {
            response,
            history: self.history.clone(),
        })
    }
}

impl RhsForce for Rubbing {
    fn reset(&mut self, ndof: usize, _dt: f64) -> RotorResult<()> {
        if let Some(&d) = self.dofs.iter().find(|&&d| d >= ndof) {
            return Err(RotorError::DimensionMismatch {
                what: "rubbing DOF".to_string(),
                expected: ndof,
                found: d + 1,
            });
        }
        self.history.clear();
        self.deep_contacts = 0;
        Ok(())
    }

    fn force(&mut self, state: &StepState<'_>) -> RotorResult<DVec> {
        let mut f = DVec::zeros(state.disp.len());
        let contact = self.node_state(state);
        for (&d, v) in self.dofs.iter().zip(contact.force) {
            f[d] += v;
        }
        Ok(f)
    }

    fn end_step(&mut self, state: &StepState<'_>) {
        let contact = self.node_state(state);
        if contact.penetration > self.delta {
            if self.deep_contacts == 0 {
                warn!(
                    "rubbing penetration {:e} m at t = {:.6} exceeds twice the clearance",
                    contact.penetration + self.delta,
                    state.time
                );
            }
            self.deep_contacts += 1;
        }
        self.history.push(RubbingSample {
            step: state.step,
            time: state.time,
            penetration: contact.penetration,
            normal_force: contact.normal,
            friction_force: contact.friction,
            fx: contact.force[0],
            fy: contact.force[1],
        });
    }

    fn warnings(&self) -> Vec<String> {
        if self.deep_contacts == 0 {
            return Vec::new();
        }
        let deepest = self.history.iter().map(|s| s.penetration).fold(0.0, f64::max);
        vec![format!(
            "rubbing at node {}: radial displacement beyond twice the clearance in {} steps (max penetration {:e} m)",
            self.node, self.deep_contacts, deepest
        )]
    }
}
