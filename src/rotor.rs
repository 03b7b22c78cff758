//! Rotor model container and global matrix assembly

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::analysis::{
    campbell, frequency, modal, statics, time_response, CampbellOptions, ModalOptions, SpeedProfile,
    TimeResponseOptions,
};
use crate::control::RhsForce;
use crate::dof::{DofKind, DofMap};
use crate::elements::{
    BearingElement, DiskElement, Element, GearElement, LocalMatrices, MagneticBearingElement,
    PointMass, ShaftElement, ShaftSegment, TableAxis,
};
use crate::error::{RotorError, RotorResult};
use crate::loads::Unbalance;
use nalgebra_sparse::CsrMatrix;

use crate::math::{DVec, Mat, SparseMatrixBuilder};
use crate::results::{
    CampbellResult, ForcedResponseResult, FrequencyResponseResult, ModalResult, StaticResult,
    TimeResponseResult, UcsResult,
};

/// Relative tolerance for equal lengths and matching diameters
const GEOMETRY_TOL: f64 = 1e-6;

/// How magnetic bearings enter the stiffness and damping matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MagneticModel {
    /// PD-equivalent stiffness and damping (linear analyses)
    #[default]
    Equivalent,
    /// Negative magnetic stiffness only; the control force is external
    OpenLoop,
}

/// Global system matrices
///
/// `g` is per unit driving speed; driven rotors of a gear train already
/// carry their speed ratio in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMatrices {
    pub m: Mat,
    pub k: Mat,
    pub c: Mat,
    pub g: Mat,
}

/// A bearing or magnetic bearing with its global DOF and evaluated matrices
#[derive(Debug, Clone, PartialEq)]
pub struct Support {
    pub node: usize,
    /// Linked node, ground when `None`
    pub n_link: Option<usize>,
    pub tag: String,
    /// `[x, y, z]` of `node`, followed by those of `n_link` when linked
    pub dofs: Vec<usize>,
    pub k: Mat,
    pub c: Mat,
}

impl Support {
    /// Force the support exerts on `node` for global displacements `disp`
    pub fn force_on_node(&self, disp: &DVec) -> [f64; 3] {
        let u = DVec::from_iterator(self.dofs.len(), self.dofs.iter().map(|&d| disp[d]));
        let f = &self.k * u;
        [-f[0], -f[1], -f[2]]
    }
}

/// A magnetic bearing together with the global DOF it senses and actuates
#[derive(Debug, Clone, PartialEq)]
pub struct MagneticChannel {
    pub bearing: MagneticBearingElement,
    /// `[x, y]` DOF of the bearing node
    pub dofs: [usize; 2],
    /// `[x, y]` DOF of the linked node, if any
    pub link: Option<[usize; 2]>,
}

/// Anything that can be analysed as an assembled rotor system
pub trait RotorSystem: Sync {
    /// Number of global DOF
    fn ndof(&self) -> usize;

    /// Kind of every global DOF
    fn dof_kinds(&self) -> Vec<DofKind>;

    /// `(node, x_dof, y_dof)` for orbit and whirl analysis
    fn lateral_pairs(&self) -> Vec<(usize, usize, usize)>;

    /// Translational DOF of a node
    fn translational_dofs(&self, node: usize) -> Option<[usize; 3]>;

    /// Six DOF of a shaft node
    fn shaft_node_dofs(&self, node: usize) -> Option<[usize; 6]>;

    /// Spin speed of `node` per unit driving speed
    fn speed_ratio(&self, node: usize) -> f64;

    /// Global matrices at excitation `frequency` and driving `speed`
    fn matrices(&self, frequency: f64, speed: f64, model: MagneticModel) -> RotorResult<SystemMatrices>;

    /// Magnetic bearings and their DOF
    fn magnetic_channels(&self) -> RotorResult<Vec<MagneticChannel>>;

    /// Whether any element depends on excitation frequency
    fn is_frequency_dependent(&self) -> bool;

    /// Ascending table points of coefficients indexed by `axis`, in driving
    /// speed (or frequency) units
    fn table_breakpoints(&self, axis: TableAxis) -> Vec<f64>;

    /// Every bearing and magnetic bearing (linear-equivalent) at excitation
    /// `frequency` and driving `speed`
    fn supports(&self, frequency: f64, speed: f64) -> RotorResult<Vec<Support>>;

    // ========================
    // Analyses
    // ========================

    /// Static deflection and support reactions under gravity along -y
    fn run_static(&self) -> RotorResult<StaticResult> {
        statics::run_static(self)
    }

    /// Undamped lateral critical speeds against grounded support stiffness
    fn run_ucs(&self, stiffness: &[f64], num_modes: usize) -> RotorResult<UcsResult> {
        statics::run_ucs(self, stiffness, num_modes)
    }

    /// Modal analysis at a constant speed
    fn run_modal(&self, speed: f64, options: &ModalOptions) -> RotorResult<ModalResult> {
        modal::run_modal(self, speed, options)
    }

    /// Campbell diagram over `speeds`, tracking `frequencies` modes
    fn run_campbell(
        &self,
        speeds: &[f64],
        frequencies: usize,
        options: &CampbellOptions,
    ) -> RotorResult<CampbellResult> {
        campbell::run_campbell(self, speeds, frequencies, options)
    }

    /// Receptance matrices over a frequency range
    fn run_freq_response(&self, speed: f64, frequencies: &[f64]) -> RotorResult<FrequencyResponseResult> {
        frequency::run_freq_response(self, speed, frequencies)
    }

    /// Synchronous response to unbalance, speed equal to frequency
    fn run_unbalance_response(
        &self,
        unbalances: &[Unbalance],
        frequencies: &[f64],
    ) -> RotorResult<ForcedResponseResult> {
        frequency::run_unbalance_response(self, unbalances, frequencies)
    }

    /// Time response to a force history `force` (ntime x ndof) sampled at `t`
    fn run_time_response(
        &self,
        speed: SpeedProfile,
        force: &Mat,
        t: &[f64],
        options: &TimeResponseOptions,
    ) -> RotorResult<TimeResponseResult> {
        time_response::run_time_response(self, speed, force, t, options)
    }

    /// Time response with an extra state-dependent force evaluated every step
    fn run_time_response_with(
        &self,
        speed: SpeedProfile,
        force: &Mat,
        t: &[f64],
        options: &TimeResponseOptions,
        rhs: &mut dyn RhsForce,
    ) -> RotorResult<TimeResponseResult> {
        time_response::run_time_response_with(self, speed, force, t, options, rhs)
    }
}

/// Accumulates element matrices into global sparse builders
pub(crate) struct Assembler {
    m: SparseMatrixBuilder,
    k: SparseMatrixBuilder,
    c: SparseMatrixBuilder,
    g: SparseMatrixBuilder,
}

impl Assembler {
    pub(crate) fn new(ndof: usize) -> Self {
        Self {
            m: SparseMatrixBuilder::new(ndof),
            k: SparseMatrixBuilder::new(ndof),
            c: SparseMatrixBuilder::new(ndof),
            g: SparseMatrixBuilder::new(ndof),
        }
    }

    /// Scatter element matrices; `g_scale` multiplies the gyroscopic part
    pub(crate) fn add(&mut self, dofs: &[usize], local: &LocalMatrices, g_scale: f64) -> RotorResult<()> {
        if local.m.nrows() != dofs.len() {
            return Err(RotorError::DimensionMismatch {
                what: "element matrices".to_string(),
                expected: dofs.len(),
                found: local.m.nrows(),
            });
        }
        self.m.add_element_matrix(dofs, &local.m);
        self.k.add_element_matrix(dofs, &local.k);
        self.c.add_element_matrix(dofs, &local.c);
        if g_scale != 0.0 {
            self.g.add_element_matrix(dofs, &(&local.g * g_scale));
        }
        Ok(())
    }

    /// Add a raw stiffness block
    pub(crate) fn add_stiffness(&mut self, dofs: &[usize], k: &Mat) {
        self.k.add_element_matrix(dofs, k);
    }

    pub(crate) fn finish(self) -> SystemMatrices {
        debug!(
            "Assembled {} dofs from {} stiffness and {} mass triplets",
            self.k.size(),
            self.k.nnz(),
            self.m.nnz()
        );
        SystemMatrices {
            m: self.m.to_dense(),
            k: self.k.to_dense(),
            c: self.c.to_dense(),
            g: self.g.to_dense(),
        }
    }
}

/// An assembled shaft-disk-bearing rotor
///
/// Immutable once built; structural changes such as [`Rotor::add_nodes`]
/// return a new rotor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rotor {
    shaft_elements: Vec<ShaftSegment>,
    disk_elements: Vec<DiskElement>,
    gear_elements: Vec<GearElement>,
    bearing_elements: Vec<BearingElement>,
    magnetic_bearings: Vec<MagneticBearingElement>,
    point_masses: Vec<PointMass>,
    dof_map: DofMap,
    nodes_pos: Vec<f64>,
    pub tag: Option<String>,
}

/// Collects elements and validates them into a [`Rotor`]
#[derive(Debug, Clone, Default)]
pub struct RotorBuilder {
    shaft_elements: Vec<ShaftSegment>,
    disk_elements: Vec<DiskElement>,
    gear_elements: Vec<GearElement>,
    bearing_elements: Vec<BearingElement>,
    magnetic_bearings: Vec<MagneticBearingElement>,
    point_masses: Vec<PointMass>,
    tag: Option<String>,
}

impl RotorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shaft element or coupling to the shaft line
    pub fn add_shaft(mut self, element: impl Into<ShaftSegment>) -> Self {
        self.shaft_elements.push(element.into());
        self
    }

    pub fn add_shafts<I, E>(mut self, elements: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<ShaftSegment>,
    {
        self.shaft_elements.extend(elements.into_iter().map(Into::into));
        self
    }

    pub fn add_disk(mut self, disk: DiskElement) -> Self {
        self.disk_elements.push(disk);
        self
    }

    pub fn add_gear(mut self, gear: GearElement) -> Self {
        self.gear_elements.push(gear);
        self
    }

    pub fn add_bearing(mut self, bearing: BearingElement) -> Self {
        self.bearing_elements.push(bearing);
        self
    }

    pub fn add_magnetic_bearing(mut self, bearing: MagneticBearingElement) -> Self {
        self.magnetic_bearings.push(bearing);
        self
    }

    pub fn add_point_mass(mut self, mass: PointMass) -> Self {
        self.point_masses.push(mass);
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    /// Number the shaft line, validate every element and derive the DOF map
    pub fn build(self) -> RotorResult<Rotor> {
        let RotorBuilder {
            mut shaft_elements,
            disk_elements,
            gear_elements,
            bearing_elements,
            magnetic_bearings,
            point_masses,
            tag,
        } = self;

        if shaft_elements.is_empty() {
            return Err(RotorError::InvalidInput("rotor needs at least one shaft element".to_string()));
        }

        number_shaft(&mut shaft_elements);
        for seg in &shaft_elements {
            match seg {
                ShaftSegment::Shaft(s) => s.validate()?,
                ShaftSegment::Coupling(c) => c.validate()?,
            }
        }
        let lengths = slot_lengths(&shaft_elements)?;
        check_conical_continuity(&shaft_elements)?;

        let n_shaft_nodes = lengths.len() + 1;
        let linked: BTreeSet<usize> = bearing_elements
            .iter()
            .filter_map(|b| b.n_link)
            .chain(magnetic_bearings.iter().filter_map(|b| b.n_link))
            .filter(|&n| n >= n_shaft_nodes)
            .collect();
        let dof_map = DofMap::new(n_shaft_nodes, &linked)?;

        for d in &disk_elements {
            d.validate()?;
        }
        for g in &gear_elements {
            g.validate()?;
        }
        for b in &bearing_elements {
            b.validate()?;
        }
        for b in &magnetic_bearings {
            b.validate()?;
        }
        for p in &point_masses {
            p.validate()?;
        }

        for &n in &linked {
            if !point_masses.iter().any(|p| p.n == n) {
                return Err(RotorError::InvalidInput(format!(
                    "linked node {n} carries no PointMass, so its mass matrix block would be singular"
                )));
            }
        }

        let mut nodes_pos = Vec::with_capacity(n_shaft_nodes);
        let mut z = 0.0;
        nodes_pos.push(z);
        for l in &lengths {
            z += l;
            nodes_pos.push(z);
        }

        let rotor = Rotor {
            shaft_elements,
            disk_elements,
            gear_elements,
            bearing_elements,
            magnetic_bearings,
            point_masses,
            dof_map,
            nodes_pos,
            tag,
        };

        // Every element must map into the DOF space
        for el in rotor.elements() {
            el.dof_indices(&rotor.dof_map)?;
        }
        for amb in &rotor.magnetic_bearings {
            amb.dof_indices(&rotor.dof_map)?;
        }

        debug!(
            "rotor built: {} shaft nodes, {} linked nodes, {} DOF",
            n_shaft_nodes,
            linked.len(),
            rotor.dof_map.ndof()
        );
        Ok(rotor)
    }
}

/// Assign `n = previous + 1` to elements without an explicit node
fn number_shaft(elements: &mut [ShaftSegment]) {
    let mut prev: Option<usize> = None;
    for seg in elements.iter_mut() {
        let n = match seg.n() {
            Some(n) => n,
            None => prev.map_or(0, |p| p + 1),
        };
        seg.set_n(n);
        prev = Some(n);
    }
}

/// Length of every shaft slot `n`, checking contiguity and equal lengths
fn slot_lengths(elements: &[ShaftSegment]) -> RotorResult<Vec<f64>> {
    let mut by_n: BTreeMap<usize, f64> = BTreeMap::new();
    for seg in elements {
        let n = seg.n().unwrap_or(0);
        let l = seg.length();
        if let Some(&first) = by_n.get(&n) {
            if (first - l).abs() > GEOMETRY_TOL * first.abs().max(l.abs()) {
                return Err(RotorError::LengthMismatch { n, first, second: l });
            }
        } else {
            by_n.insert(n, l);
        }
    }
    for (expected, &n) in by_n.keys().enumerate() {
        if n != expected {
            return Err(RotorError::InvalidInput(format!(
                "shaft nodes must be contiguous from 0, slot n={expected} is missing"
            )));
        }
    }
    Ok(by_n.into_values().collect())
}

/// Adjacent conical segments must agree on diameters at the shared node
fn check_conical_continuity(elements: &[ShaftSegment]) -> RotorResult<()> {
    let shafts: Vec<&ShaftElement> = elements.iter().filter_map(ShaftSegment::as_shaft).collect();
    for left in shafts.iter().filter(|s| s.is_conical()) {
        let Some(n) = left.n else { continue };
        for right in shafts.iter().filter(|s| s.n == Some(n + 1) && s.is_conical()) {
            let close = |a: f64, b: f64| (a - b).abs() <= GEOMETRY_TOL * a.abs().max(b.abs()).max(1e-3);
            if !close(left.odr, right.odl) || !close(left.idr, right.idl) {
                return Err(RotorError::DiameterMismatch {
                    node: n + 1,
                    left: left.tag(),
                    right: right.tag(),
                });
            }
        }
    }
    Ok(())
}

impl Rotor {
    /// Start building a rotor
    pub fn builder() -> RotorBuilder {
        RotorBuilder::new()
    }

    /// Shaft elements and couplings, numbered
    pub fn shaft_elements(&self) -> &[ShaftSegment] {
        &self.shaft_elements
    }

    pub fn disk_elements(&self) -> &[DiskElement] {
        &self.disk_elements
    }

    pub fn gear_elements(&self) -> &[GearElement] {
        &self.gear_elements
    }

    pub fn bearing_elements(&self) -> &[BearingElement] {
        &self.bearing_elements
    }

    pub fn magnetic_bearings(&self) -> &[MagneticBearingElement] {
        &self.magnetic_bearings
    }

    pub fn point_masses(&self) -> &[PointMass] {
        &self.point_masses
    }

    pub fn dof_map(&self) -> &DofMap {
        &self.dof_map
    }

    /// Axial position of every shaft node (m)
    pub fn nodes_pos(&self) -> &[f64] {
        &self.nodes_pos
    }

    /// Number of shaft nodes
    pub fn n_shaft_nodes(&self) -> usize {
        self.dof_map.n_shaft_nodes()
    }

    /// Find a gear mounted on `node`
    pub fn gear_at(&self, node: usize) -> Option<&GearElement> {
        self.gear_elements.iter().find(|g| g.n() == node)
    }

    /// Every element as the element capability
    pub fn elements(&self) -> impl Iterator<Item = &dyn Element> + '_ {
        self.shaft_elements
            .iter()
            .map(ShaftSegment::as_element)
            .chain(self.disk_elements.iter().map(|e| e as &dyn Element))
            .chain(self.gear_elements.iter().map(|e| e as &dyn Element))
            .chain(self.bearing_elements.iter().map(|e| e as &dyn Element))
            .chain(self.point_masses.iter().map(|e| e as &dyn Element))
    }

    /// Total mass of shaft, disks, gears, couplings and point masses (kg)
    pub fn mass(&self) -> f64 {
        let shaft: f64 = self
            .shaft_elements
            .iter()
            .map(|s| match s {
                ShaftSegment::Shaft(e) => e.mass(),
                ShaftSegment::Coupling(c) => c.m,
            })
            .sum();
        let disks: f64 = self.disk_elements.iter().map(|d| d.m).sum();
        let gears: f64 = self.gear_elements.iter().map(|g| g.disk.m).sum();
        let points: f64 = self.point_masses.iter().map(|p| p.mx).sum();
        let bearings: f64 = self.bearing_elements.iter().map(|b| b.mass[0]).sum();
        shaft + disks + gears + points + bearings
    }

    /// Assemble global matrices into sparse builders
    pub(crate) fn assemble_into(
        &self,
        asm: &mut Assembler,
        offset: &dyn Fn(usize) -> usize,
        frequency: f64,
        speed: f64,
        g_scale: f64,
        model: MagneticModel,
    ) -> RotorResult<()> {
        for el in self.elements() {
            let dofs: Vec<usize> = el.dof_indices(&self.dof_map)?.into_iter().map(offset).collect();
            asm.add(&dofs, &el.local_matrices(frequency, speed)?, g_scale)?;
        }
        for amb in &self.magnetic_bearings {
            let dofs: Vec<usize> = amb.dof_indices(&self.dof_map)?.into_iter().map(offset).collect();
            let local = match model {
                MagneticModel::Equivalent => amb.local_matrices(frequency, speed)?,
                MagneticModel::OpenLoop => amb.open_loop_matrices(),
            };
            asm.add(&dofs, &local, g_scale)?;
        }
        Ok(())
    }

    /// Mass matrix
    pub fn m(&self) -> RotorResult<Mat> {
        Ok(self.matrices(0.0, 0.0, MagneticModel::Equivalent)?.m)
    }

    /// Stiffness matrix at excitation `frequency` and `speed`
    pub fn k(&self, frequency: f64, speed: f64) -> RotorResult<Mat> {
        Ok(self.matrices(frequency, speed, MagneticModel::Equivalent)?.k)
    }

    /// Stiffness matrix in compressed sparse row form
    pub fn k_sparse(&self, frequency: f64, speed: f64) -> RotorResult<CsrMatrix<f64>> {
        let mut asm = Assembler::new(self.ndof());
        self.assemble_into(&mut asm, &|d| d, frequency, speed, 1.0, MagneticModel::Equivalent)?;
        Ok(asm.k.to_csr())
    }

    /// Damping matrix at excitation `frequency` and `speed`
    pub fn c(&self, frequency: f64, speed: f64) -> RotorResult<Mat> {
        Ok(self.matrices(frequency, speed, MagneticModel::Equivalent)?.c)
    }

    /// Gyroscopic matrix per unit speed
    pub fn g(&self) -> RotorResult<Mat> {
        Ok(self.matrices(0.0, 0.0, MagneticModel::Equivalent)?.g)
    }

    /// Return a new rotor with shaft nodes inserted at axial `positions`
    ///
    /// Elements spanning a position are split there; disks, bearings and
    /// point masses follow the renumbering. Positions that coincide with an
    /// existing node are ignored.
    pub fn add_nodes(&self, positions: &[f64]) -> RotorResult<Rotor> {
        let total = self.nodes_pos.last().copied().unwrap_or(0.0);
        let tol = GEOMETRY_TOL * total.max(1.0);

        let mut new_pos: Vec<f64> = Vec::new();
        for &p in positions {
            if !(p > tol && p < total - tol) {
                if p.abs() <= tol || (p - total).abs() <= tol {
                    continue;
                }
                return Err(RotorError::InvalidInput(format!(
                    "node position {p} is outside the shaft span [0, {total}]"
                )));
            }
            let existing = self.nodes_pos.iter().any(|z| (z - p).abs() <= tol);
            let repeated = new_pos.iter().any(|z| (z - p).abs() <= tol);
            if !existing && !repeated {
                new_pos.push(p);
            }
        }
        new_pos.sort_by(f64::total_cmp);

        let inserted = new_pos.len();
        let renumber = |old: usize| -> usize {
            if old >= self.n_shaft_nodes() {
                return old + inserted;
            }
            let z = self.nodes_pos[old];
            old + new_pos.iter().filter(|&&p| p < z).count()
        };

        let mut shaft = Vec::with_capacity(self.shaft_elements.len() + inserted);
        for seg in &self.shaft_elements {
            let n = seg.n().unwrap_or(0);
            let (z0, z1) = (self.nodes_pos[n], self.nodes_pos[n + 1]);
            let cuts: Vec<f64> = new_pos.iter().copied().filter(|&p| p > z0 && p < z1).collect();
            let base = renumber(n);

            match seg {
                ShaftSegment::Coupling(c) if !cuts.is_empty() => {
                    return Err(RotorError::element(
                        c.tag(),
                        "a node cannot be inserted inside a coupling",
                    ));
                }
                ShaftSegment::Coupling(c) => {
                    let mut c = c.clone();
                    c.n = Some(base);
                    shaft.push(ShaftSegment::Coupling(c));
                }
                ShaftSegment::Shaft(s) => {
                    let mut rest = s.clone();
                    rest.n = Some(base);
                    let mut start = z0;
                    for cut in cuts {
                        let fraction = (cut - start) / (z1 - start);
                        let (left, right) = rest.split(fraction)?;
                        shaft.push(ShaftSegment::Shaft(left));
                        rest = right;
                        start = cut;
                    }
                    shaft.push(ShaftSegment::Shaft(rest));
                }
            }
        }

        let mut builder = RotorBuilder {
            shaft_elements: shaft,
            tag: self.tag.clone(),
            ..RotorBuilder::default()
        };
        for d in &self.disk_elements {
            let mut d = d.clone();
            d.n = renumber(d.n);
            builder.disk_elements.push(d);
        }
        for g in &self.gear_elements {
            let mut g = g.clone();
            g.disk.n = renumber(g.disk.n);
            builder.gear_elements.push(g);
        }
        for b in &self.bearing_elements {
            let mut b = b.clone();
            b.n = renumber(b.n);
            b.n_link = b.n_link.map(renumber);
            builder.bearing_elements.push(b);
        }
        for b in &self.magnetic_bearings {
            let mut b = b.clone();
            b.n = renumber(b.n);
            b.n_link = b.n_link.map(renumber);
            builder.magnetic_bearings.push(b);
        }
        for p in &self.point_masses {
            let mut p = p.clone();
            p.n = renumber(p.n);
            builder.point_masses.push(p);
        }
        builder.build()
    }
}

impl RotorSystem for Rotor {
    fn ndof(&self) -> usize {
        self.dof_map.ndof()
    }

    fn dof_kinds(&self) -> Vec<DofKind> {
        self.dof_map.kinds()
    }

    fn lateral_pairs(&self) -> Vec<(usize, usize, usize)> {
        self.dof_map.lateral_pairs()
    }

    fn translational_dofs(&self, node: usize) -> Option<[usize; 3]> {
        self.dof_map.translational(node)
    }

    fn shaft_node_dofs(&self, node: usize) -> Option<[usize; 6]> {
        self.dof_map.shaft_dofs(node)
    }

    fn speed_ratio(&self, _node: usize) -> f64 {
        1.0
    }

    fn matrices(&self, frequency: f64, speed: f64, model: MagneticModel) -> RotorResult<SystemMatrices> {
        let mut asm = Assembler::new(self.ndof());
        self.assemble_into(&mut asm, &|d| d, frequency, speed, 1.0, model)?;
        Ok(asm.finish())
    }

    fn magnetic_channels(&self) -> RotorResult<Vec<MagneticChannel>> {
        self.magnetic_bearings
            .iter()
            .map(|b| {
                let tag = b.tag();
                let [x, y, _] = self.dof_map.require_translational(&tag, b.n)?;
                let link = match b.n_link {
                    Some(l) => {
                        let [lx, ly, _] = self.dof_map.require_translational(&tag, l)?;
                        Some([lx, ly])
                    }
                    None => None,
                };
                Ok(MagneticChannel {
                    bearing: b.clone(),
                    dofs: [x, y],
                    link,
                })
            })
            .collect()
    }

    fn is_frequency_dependent(&self) -> bool {
        self.bearing_elements.iter().any(BearingElement::is_frequency_dependent)
    }

    fn table_breakpoints(&self, axis: TableAxis) -> Vec<f64> {
        let mut points: Vec<f64> = self.bearing_elements.iter().flat_map(|b| b.table_points(axis)).collect();
        points.sort_by(f64::total_cmp);
        points.dedup();
        points
    }

    fn supports(&self, frequency: f64, speed: f64) -> RotorResult<Vec<Support>> {
        let bearings = self.bearing_elements.iter().map(|b| (b as &dyn Element, b.n, b.n_link));
        let ambs = self.magnetic_bearings.iter().map(|b| (b as &dyn Element, b.n, b.n_link));
        bearings
            .chain(ambs)
            .map(|(el, node, n_link)| {
                let local = el.local_matrices(frequency, speed)?;
                Ok(Support {
                    node,
                    n_link,
                    tag: el.tag(),
                    dofs: el.dof_indices(&self.dof_map)?,
                    k: local.k,
                    c: local.c,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{CouplingElement, Material};
    use approx::assert_relative_eq;

    fn shaft(n_el: usize, l: f64) -> Vec<ShaftElement> {
        (0..n_el)
            .map(|_| ShaftElement::new(l, 0.0, 0.05, Material::steel()))
            .collect()
    }

    #[test]
    fn test_auto_numbering_and_positions() {
        let rotor = Rotor::builder()
            .add_shafts(shaft(4, 0.25))
            .add_bearing(BearingElement::new(0, 1e6, 0.0))
            .add_bearing(BearingElement::new(4, 1e6, 0.0))
            .build()
            .unwrap();
        let ns: Vec<_> = rotor.shaft_elements().iter().map(|s| s.n().unwrap()).collect();
        assert_eq!(ns, vec![0, 1, 2, 3]);
        assert_eq!(rotor.ndof(), 30);
        assert_relative_eq!(rotor.nodes_pos()[4], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sparse_stiffness_matches_dense() {
        let rotor = Rotor::builder()
            .add_shafts(shaft(3, 0.2))
            .add_bearing(BearingElement::new(0, 1e6, 0.0))
            .add_bearing(BearingElement::new(3, 1e6, 0.0))
            .build()
            .unwrap();
        let dense = rotor.k(0.0, 0.0).unwrap();
        let sparse = rotor.k_sparse(0.0, 0.0).unwrap();
        assert!(sparse.nnz() < dense.len());
        for (i, j, v) in sparse.triplet_iter() {
            assert_relative_eq!(*v, dense[(i, j)], epsilon = 1e-9 * dense.amax());
        }
    }

    #[test]
    fn test_node_out_of_range() {
        let err = Rotor::builder()
            .add_shafts(shaft(2, 0.25))
            .add_disk(DiskElement::new(5, 1.0, 0.1, 0.2))
            .build()
            .unwrap_err();
        assert!(matches!(err, RotorError::NodeOutOfRange { node: 5, .. }));
    }

    #[test]
    fn test_parallel_layers_need_equal_length() {
        let a = ShaftElement::new(0.2, 0.0, 0.05, Material::steel()).with_n(0);
        let b = ShaftElement::new(0.3, 0.05, 0.08, Material::steel()).with_n(0);
        let err = Rotor::builder().add_shaft(a).add_shaft(b).build().unwrap_err();
        assert!(matches!(err, RotorError::LengthMismatch { n: 0, .. }));
    }

    #[test]
    fn test_conical_mismatch_rejected_but_steps_allowed() {
        let mat = Material::steel();
        let stepped = Rotor::builder()
            .add_shaft(ShaftElement::new(0.2, 0.0, 0.05, mat.clone()))
            .add_shaft(ShaftElement::new(0.2, 0.0, 0.08, mat.clone()))
            .build();
        assert!(stepped.is_ok());

        let err = Rotor::builder()
            .add_shaft(ShaftElement::conical(0.2, 0.0, 0.05, 0.0, 0.06, mat.clone()))
            .add_shaft(ShaftElement::conical(0.2, 0.0, 0.07, 0.0, 0.08, mat))
            .build()
            .unwrap_err();
        assert!(matches!(err, RotorError::DiameterMismatch { node: 1, .. }));
    }

    #[test]
    fn test_linked_node_needs_point_mass() {
        let base = Rotor::builder()
            .add_shafts(shaft(2, 0.25))
            .add_bearing(BearingElement::new(0, 1e6, 0.0).with_n_link(3))
            .add_bearing(BearingElement::new(3, 1e7, 0.0));
        assert!(base.clone().build().is_err());

        let rotor = base.add_point_mass(PointMass::new(3, 2.0)).build().unwrap();
        assert_eq!(rotor.ndof(), 6 * 3 + 3);
        let m = rotor.m().unwrap();
        assert_eq!(m[(18, 18)], 2.0);
        let k = rotor.k(0.0, 0.0).unwrap();
        assert_eq!(k[(0, 18)], -1e6);
        assert_eq!(k[(18, 18)], 1e6 + 1e7);
    }

    #[test]
    fn test_stiffness_is_frequency_dependent_through_tables() {
        use crate::elements::Coefficient;
        let kxx = Coefficient::frequency_table(vec![0.0, 100.0], vec![1e6, 3e6]);
        let rotor = Rotor::builder()
            .add_shafts(shaft(2, 0.25))
            .add_bearing(BearingElement::new(0, kxx, 0.0))
            .build()
            .unwrap();
        assert!(rotor.is_frequency_dependent());
        let k0 = rotor.k(0.0, 0.0).unwrap();
        let k1 = rotor.k(50.0, 0.0).unwrap();
        assert_relative_eq!(k1[(0, 0)] - k0[(0, 0)], 1e6, max_relative = 1e-9);
    }

    #[test]
    fn test_add_nodes_splits_and_renumbers() {
        let mat = Material::steel();
        let rotor = Rotor::builder()
            .add_shafts(shaft(2, 0.5))
            .add_disk(DiskElement::from_geometry(1, &mat, 0.05, 0.05, 0.3))
            .add_bearing(BearingElement::new(0, 1e6, 0.0))
            .add_bearing(BearingElement::new(2, 1e6, 0.0))
            .build()
            .unwrap();
        let refined = rotor.add_nodes(&[0.25, 0.75, 0.5]).unwrap();
        assert_eq!(refined.n_shaft_nodes(), 5);
        assert_eq!(refined.disk_elements()[0].n, 2);
        assert_eq!(refined.bearing_elements()[1].n, 4);
        assert_relative_eq!(refined.nodes_pos()[1], 0.25, epsilon = 1e-12);
        assert_relative_eq!(refined.mass(), rotor.mass(), max_relative = 1e-9);
    }

    #[test]
    fn test_coupling_occupies_shaft_slot() {
        let rotor = Rotor::builder()
            .add_shaft(ShaftElement::new(0.2, 0.0, 0.05, Material::steel()))
            .add_shaft(CouplingElement::new(1e8, 1e5, 0.05))
            .add_shaft(ShaftElement::new(0.2, 0.0, 0.05, Material::steel()))
            .build()
            .unwrap();
        assert_eq!(rotor.n_shaft_nodes(), 4);
        assert_eq!(rotor.shaft_elements()[2].n(), Some(2));
    }
}
