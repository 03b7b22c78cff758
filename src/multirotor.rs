//! Gear-coupled rotor trains
//!
//! Rotors are joined at gear nodes by a mesh spring acting along the line of
//! action. The first rotor drives the train; each further rotor spins at the
//! driving speed times its gear ratio. External gears counter-rotate, so a
//! ratio is negative for every odd mesh down the train.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::dof::DofKind;
use crate::elements::TableAxis;
use crate::error::{RotorError, RotorResult};
use crate::math::Mat;
use crate::rotor::{Assembler, MagneticChannel, MagneticModel, Rotor, RotorSystem, Support, SystemMatrices};

/// Relative tolerance on pressure angles of mating gears
const PRESSURE_ANGLE_TOL: f64 = 1e-6;

/// Mesh spring between two gears
///
/// With `ψ = pressure_angle - orientation_angle` the tooth deflection is
///
/// ```text
/// δ = (x1 - x2)·sin ψ + (y1 - y2)·cos ψ + r1·θ1 + r2·θ2
/// ```
///
/// so the mesh contributes `k·h·hᵀ` over `(x1, y1, θ1, x2, y2, θ2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GearMesh {
    /// Global node of the driving gear
    pub node_a: usize,
    /// Global node of the driven gear
    pub node_b: usize,
    /// Mesh stiffness (N/m)
    pub stiffness: f64,
    /// Pressure angle (rad)
    pub pressure_angle: f64,
    /// Angle of the line of centres (rad)
    pub orientation_angle: f64,
    pub base_radius_a: f64,
    pub base_radius_b: f64,
}

impl GearMesh {
    /// Signed speed of the driven gear per unit speed of the driving gear
    ///
    /// Rolling without tooth deflection needs `r1·θ1 + r2·θ2 = 0`, so the
    /// driven gear turns the other way.
    pub fn gear_ratio(&self) -> f64 {
        -self.base_radius_a / self.base_radius_b
    }

    /// Line-of-action projection `h`
    pub fn direction(&self) -> [f64; 6] {
        let (s, c) = (self.pressure_angle - self.orientation_angle).sin_cos();
        [s, c, self.base_radius_a, -s, -c, self.base_radius_b]
    }

    /// Rank-one stiffness `k·h·hᵀ`
    pub fn stiffness_matrix(&self) -> Mat {
        let h = self.direction();
        Mat::from_fn(6, 6, |i, j| self.stiffness * h[i] * h[j])
    }
}

/// One rotor of a train with its place in the merged DOF space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainMember {
    pub rotor: Rotor,
    /// First global DOF
    pub dof_offset: usize,
    /// Added to the rotor's own node labels
    pub node_offset: usize,
    /// Signed spin speed per unit driving speed
    pub speed_ratio: f64,
}

impl TrainMember {
    fn contains(&self, node: usize) -> Option<usize> {
        let local = node.checked_sub(self.node_offset)?;
        self.rotor.dof_map().contains(local).then_some(local)
    }

    fn next_node(&self) -> usize {
        self.node_offset + self.rotor.dof_map().max_node() + 1
    }
}

/// Rotors coupled through gear meshes, analysed as one system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiRotor {
    members: Vec<TrainMember>,
    meshes: Vec<GearMesh>,
    pub tag: Option<String>,
}

impl MultiRotor {
    /// Couple `driving` and `driven` at `coupled_nodes = (node on driving,
    /// node on driven)`, both carrying a gear
    ///
    /// Nodes of `driven` are renumbered to follow the last node of `driving`.
    pub fn couple(
        driving: Rotor,
        driven: Rotor,
        coupled_nodes: (usize, usize),
        gear_mesh_stiffness: f64,
        orientation_angle: f64,
    ) -> RotorResult<Self> {
        let train = Self {
            members: vec![TrainMember {
                rotor: driving,
                dof_offset: 0,
                node_offset: 0,
                speed_ratio: 1.0,
            }],
            meshes: Vec::new(),
            tag: None,
        };
        train.couple_with(driven, coupled_nodes, gear_mesh_stiffness, orientation_angle)
    }

    /// Append a further rotor meshing with a gear already in the train
    ///
    /// `coupled_nodes.0` is a global node of this train, `coupled_nodes.1` a
    /// node of `rotor` in its own numbering.
    pub fn couple_with(
        mut self,
        rotor: Rotor,
        coupled_nodes: (usize, usize),
        gear_mesh_stiffness: f64,
        orientation_angle: f64,
    ) -> RotorResult<Self> {
        let (node_a, local_b) = coupled_nodes;
        if !(gear_mesh_stiffness > 0.0) {
            return Err(RotorError::InvalidInput(format!(
                "gear mesh stiffness must be positive, got {gear_mesh_stiffness}"
            )));
        }

        let (member_a, local_a) = self.locate(node_a).ok_or_else(|| RotorError::NodeOutOfRange {
            element: "GearMesh".to_string(),
            node: node_a,
            max: self.max_node(),
        })?;
        let gear_a = member_a.rotor.gear_at(local_a).ok_or_else(|| {
            RotorError::InvalidInput(format!("coupled node {node_a} of the train carries no gear"))
        })?;
        let gear_b = rotor
            .gear_at(local_b)
            .ok_or_else(|| RotorError::InvalidInput(format!("coupled node {local_b} of the driven rotor carries no gear")))?;

        let tol = PRESSURE_ANGLE_TOL * gear_a.pressure_angle.abs().max(1.0);
        if (gear_a.pressure_angle - gear_b.pressure_angle).abs() > tol {
            warn!(
                "mating gears have pressure angles {:.6} and {:.6} rad; using the driving gear's",
                gear_a.pressure_angle, gear_b.pressure_angle
            );
        }

        let last = self.members.last().ok_or_else(|| {
            RotorError::InvalidInput("gear train has no driving rotor".to_string())
        })?;
        let node_offset = last.next_node();
        let dof_offset = last.dof_offset + last.rotor.ndof();

        let mesh = GearMesh {
            node_a,
            node_b: node_offset + local_b,
            stiffness: gear_mesh_stiffness,
            pressure_angle: gear_a.pressure_angle,
            orientation_angle,
            base_radius_a: gear_a.base_radius(),
            base_radius_b: gear_b.base_radius(),
        };
        let speed_ratio = member_a.speed_ratio * mesh.gear_ratio();

        debug!(
            "coupling rotor at node offset {node_offset}, DOF offset {dof_offset}, speed ratio {speed_ratio:.6}"
        );
        self.members.push(TrainMember {
            rotor,
            dof_offset,
            node_offset,
            speed_ratio,
        });
        self.meshes.push(mesh);
        Ok(self)
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn members(&self) -> &[TrainMember] {
        &self.members
    }

    pub fn meshes(&self) -> &[GearMesh] {
        &self.meshes
    }

    /// Largest global node label
    pub fn max_node(&self) -> usize {
        self.members.last().map_or(0, |m| m.next_node().saturating_sub(1))
    }

    /// Total mass of every rotor in the train (kg)
    pub fn mass(&self) -> f64 {
        self.members.iter().map(|m| m.rotor.mass()).sum()
    }

    /// Member owning a global node and the node's local label
    fn locate(&self, node: usize) -> Option<(&TrainMember, usize)> {
        self.members.iter().find_map(|m| m.contains(node).map(|local| (m, local)))
    }

    fn mesh_dofs(&self, mesh: &GearMesh) -> RotorResult<[usize; 6]> {
        let dofs = |node: usize| {
            self.shaft_node_dofs(node).ok_or_else(|| RotorError::NodeOutOfRange {
                element: "GearMesh".to_string(),
                node,
                max: self.max_node(),
            })
        };
        let a = dofs(mesh.node_a)?;
        let b = dofs(mesh.node_b)?;
        Ok([a[0], a[1], a[5], b[0], b[1], b[5]])
    }
}

impl RotorSystem for MultiRotor {
    fn ndof(&self) -> usize {
        self.members.iter().map(|m| m.rotor.ndof()).sum()
    }

    fn dof_kinds(&self) -> Vec<DofKind> {
        self.members.iter().flat_map(|m| m.rotor.dof_kinds()).collect()
    }

    fn lateral_pairs(&self) -> Vec<(usize, usize, usize)> {
        self.members
            .iter()
            .flat_map(|m| {
                m.rotor
                    .lateral_pairs()
                    .into_iter()
                    .map(move |(n, x, y)| (n + m.node_offset, x + m.dof_offset, y + m.dof_offset))
            })
            .collect()
    }

    fn translational_dofs(&self, node: usize) -> Option<[usize; 3]> {
        let (m, local) = self.locate(node)?;
        m.rotor.translational_dofs(local).map(|d| d.map(|i| i + m.dof_offset))
    }

    fn shaft_node_dofs(&self, node: usize) -> Option<[usize; 6]> {
        let (m, local) = self.locate(node)?;
        m.rotor.shaft_node_dofs(local).map(|d| d.map(|i| i + m.dof_offset))
    }

    fn speed_ratio(&self, node: usize) -> f64 {
        self.locate(node).map_or(1.0, |(m, _)| m.speed_ratio)
    }

    fn matrices(&self, frequency: f64, speed: f64, model: MagneticModel) -> RotorResult<SystemMatrices> {
        let mut asm = Assembler::new(self.ndof());
        for m in &self.members {
            let offset = m.dof_offset;
            // Speed tables are read at the spin magnitude; the sign only
            // flips the gyroscopic coupling
            m.rotor.assemble_into(
                &mut asm,
                &|d| d + offset,
                frequency,
                (speed * m.speed_ratio).abs(),
                m.speed_ratio,
                model,
            )?;
        }
        for mesh in &self.meshes {
            asm.add_stiffness(&self.mesh_dofs(mesh)?, &mesh.stiffness_matrix());
        }
        Ok(asm.finish())
    }

    fn magnetic_channels(&self) -> RotorResult<Vec<MagneticChannel>> {
        let mut channels = Vec::new();
        for m in &self.members {
            let shift = |d: [usize; 2]| d.map(|i| i + m.dof_offset);
            for ch in m.rotor.magnetic_channels()? {
                channels.push(MagneticChannel {
                    dofs: shift(ch.dofs),
                    link: ch.link.map(shift),
                    bearing: ch.bearing,
                });
            }
        }
        Ok(channels)
    }

    fn is_frequency_dependent(&self) -> bool {
        self.members.iter().any(|m| m.rotor.is_frequency_dependent())
    }

    fn supports(&self, frequency: f64, speed: f64) -> RotorResult<Vec<Support>> {
        let mut out = Vec::new();
        for m in &self.members {
            for sup in m.rotor.supports(frequency, (speed * m.speed_ratio).abs())? {
                out.push(Support {
                    node: sup.node + m.node_offset,
                    n_link: sup.n_link.map(|n| n + m.node_offset),
                    dofs: sup.dofs.iter().map(|d| d + m.dof_offset).collect(),
                    ..sup
                });
            }
        }
        Ok(out)
    }

    fn table_breakpoints(&self, axis: TableAxis) -> Vec<f64> {
        let mut points = Vec::new();
        for m in &self.members {
            let own = m.rotor.table_breakpoints(axis);
            match axis {
                TableAxis::Frequency => points.extend(own),
                // Members read speed tables at |ratio·Ω|
                TableAxis::Speed if m.speed_ratio != 0.0 => {
                    let r = m.speed_ratio.abs();
                    points.extend(own.iter().flat_map(|p| [p / r, -p / r]));
                }
                TableAxis::Speed => {}
            }
        }
        points.sort_by(f64::total_cmp);
        points.dedup();
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{BearingElement, GearElement, Material, ShaftElement};
    use approx::assert_relative_eq;

    fn geared(n_el: usize, gear_node: usize, pitch: f64) -> Rotor {
        let mat = Material::steel();
        Rotor::builder()
            .add_shafts((0..n_el).map(|_| ShaftElement::new(0.1, 0.0, 0.04, mat.clone())))
            .add_gear(GearElement::from_geometry(gear_node, &mat, 0.03, 0.04, pitch, 40, 20f64.to_radians()))
            .add_bearing(BearingElement::new(0, 1e8, 100.0))
            .add_bearing(BearingElement::new(n_el, 1e8, 100.0))
            .build()
            .unwrap()
    }

    fn train() -> MultiRotor {
        MultiRotor::couple(geared(4, 2, 0.2), geared(2, 1, 0.1), (2, 1), 1e8, 0.0).unwrap()
    }

    #[test]
    fn test_driven_rotor_follows_driving_numbering() {
        let mr = train();
        assert_eq!(mr.ndof(), 6 * 5 + 6 * 3);
        assert_eq!(mr.members()[1].node_offset, 5);
        assert_eq!(mr.members()[1].dof_offset, 30);
        assert_eq!(mr.meshes()[0].node_b, 6);
        assert_eq!(mr.shaft_node_dofs(6).unwrap()[0], 36);
        assert_eq!(mr.max_node(), 7);
        assert!(mr.shaft_node_dofs(8).is_none());
    }

    #[test]
    fn test_gear_ratio_from_base_radii() {
        let mr = train();
        assert_relative_eq!(mr.meshes()[0].gear_ratio(), -2.0, max_relative = 1e-12);
        assert_eq!(mr.speed_ratio(3), 1.0);
        assert_relative_eq!(mr.speed_ratio(6), -2.0, max_relative = 1e-12);
    }

    #[test]
    fn test_mesh_stiffness_is_rank_one_along_line_of_action() {
        let mesh = train().meshes()[0];
        let k = mesh.stiffness_matrix();
        assert_relative_eq!(k.clone(), k.transpose(), epsilon = 1e-6);
        // Rolling without tooth deflection: r1·θ1 + r2·θ2 = 0
        let v = nalgebra::DVector::from_vec(vec![0.0, 0.0, 1.0, 0.0, 0.0, mesh.gear_ratio()]);
        assert!((&k * v).norm() < 1e-6);
        let rank = k.clone().svd(false, false).singular_values.iter().filter(|&&s| s > 1e-6 * k.norm()).count();
        assert_eq!(rank, 1);
    }

    #[test]
    fn test_matrices_merge_blocks_and_scale_driven_gyroscopics() {
        let a = geared(4, 2, 0.2);
        let b = geared(2, 1, 0.1);
        let mr = MultiRotor::couple(a.clone(), b.clone(), (2, 1), 1e8, 0.0).unwrap();
        let sys = mr.matrices(0.0, 0.0, MagneticModel::Equivalent).unwrap();
        let ga = a.g().unwrap();
        let gb = b.g().unwrap();
        assert_relative_eq!(sys.g.view((0, 0), (30, 30)).clone_owned(), ga, epsilon = 1e-12);
        assert_relative_eq!(sys.g.view((30, 30), (18, 18)).clone_owned(), gb * -2.0, epsilon = 1e-12);
        assert_relative_eq!(sys.m.view((30, 30), (18, 18)).clone_owned(), b.m().unwrap(), epsilon = 1e-12);

        // Only the mesh couples the two rotors
        let coupling = sys.k.view((0, 30), (30, 18)).clone_owned();
        let mesh = mr.meshes()[0].stiffness_matrix();
        assert_relative_eq!(coupling[(12, 6)], mesh[(0, 3)], epsilon = 1e-6);
        assert_relative_eq!(coupling[(17, 11)], mesh[(2, 5)], epsilon = 1e-6);
        assert_eq!(coupling[(0, 0)], 0.0);
    }

    #[test]
    fn test_speed_breakpoints_in_driving_units() {
        use crate::elements::Coefficient;
        let mat = Material::steel();
        let driven = Rotor::builder()
            .add_shafts((0..2).map(|_| ShaftElement::new(0.1, 0.0, 0.04, mat.clone())))
            .add_gear(GearElement::from_geometry(1, &mat, 0.03, 0.04, 0.1, 40, 20f64.to_radians()))
            .add_bearing(BearingElement::new(0, Coefficient::speed_table(vec![0.0, 400.0], vec![1e7, 2e7]), 0.0))
            .add_bearing(BearingElement::new(2, 1e8, 0.0))
            .build()
            .unwrap();
        let mr = MultiRotor::couple(geared(4, 2, 0.2), driven, (2, 1), 1e8, 0.0).unwrap();
        let points = mr.table_breakpoints(TableAxis::Speed);
        assert_eq!(points.len(), 3);
        assert_relative_eq!(points[0], -200.0, max_relative = 1e-12);
        assert_eq!(points[1], 0.0);
        assert_relative_eq!(points[2], 200.0, max_relative = 1e-12);
        assert!(mr.table_breakpoints(TableAxis::Frequency).is_empty());
    }

    #[test]
    fn test_coupling_requires_gears() {
        let plain = Rotor::builder()
            .add_shafts((0..2).map(|_| ShaftElement::new(0.1, 0.0, 0.04, Material::steel())))
            .build()
            .unwrap();
        assert!(MultiRotor::couple(geared(4, 2, 0.2), plain.clone(), (2, 1), 1e8, 0.0).is_err());
        assert!(MultiRotor::couple(plain, geared(2, 1, 0.1), (1, 1), 1e8, 0.0).is_err());
        assert!(MultiRotor::couple(geared(4, 2, 0.2), geared(2, 1, 0.1), (2, 1), 0.0, 0.0).is_err());
    }

    #[test]
    fn test_third_rotor_compounds_speed_ratio() {
        let mr = train().couple_with(geared(2, 1, 0.05), (6, 1), 5e7, 0.3).unwrap();
        assert_eq!(mr.members().len(), 3);
        assert_eq!(mr.members()[2].node_offset, 8);
        // Two external meshes turn the third shaft with the first
        assert_relative_eq!(mr.speed_ratio(9), 2.0 * 2.0, max_relative = 1e-12);
        assert_eq!(mr.ndof(), 30 + 18 + 18);
    }
}
