//! rotordyn example - two-disk rotor on flexible bearings
//!
//! Run with `RUST_LOG=info` to see the solver log.

use anyhow::{Context, Result};
use rotordyn::prelude::*;

fn build_rotor() -> Result<Rotor> {
    let steel = Material::steel();

    //   D         D
    // --|----|----|----|----|----|--
    // B0                          B6
    let rotor = Rotor::builder()
        .add_shafts((0..6).map(|_| ShaftElement::new(0.25, 0.0, 0.05, steel.clone())))
        .add_disk(DiskElement::from_geometry(2, &steel, 0.07, 0.05, 0.28))
        .add_disk(DiskElement::from_geometry(4, &steel, 0.07, 0.05, 0.28))
        .add_bearing(BearingElement::new(0, 1e6, 0.0))
        .add_bearing(BearingElement::new(6, 1e6, 0.0))
        .with_tag("two-disk rotor")
        .build()?;
    Ok(rotor)
}

fn main() -> Result<()> {
    env_logger::init();

    println!("=== rotordyn example: two-disk rotor ===\n");

    let rotor = build_rotor().context("building rotor")?;
    println!(
        "Rotor: {} shaft nodes, {} DOF, {:.2} kg\n",
        rotor.n_shaft_nodes(),
        rotor.ndof(),
        rotor.mass()
    );

    // Gravity sag and undamped critical speeds
    let stat = rotor.run_static()?;
    if let Some(max) = stat.max_deflection() {
        println!("Static sag: {:.3e} m at node {}", max.dy, max.node);
    }
    for r in &stat.reactions {
        println!("  {}: {:.1} N", r.tag, r.force[1]);
    }
    let stiffness: Vec<f64> = (0..7).map(|i| 10f64.powi(5 + i)).collect();
    let ucs = rotor.run_ucs(&stiffness, 2)?;
    println!("Undamped critical speeds:");
    for (i, k) in stiffness.iter().enumerate() {
        println!("  k={k:8.1e} N/m: {:8.1} {:8.1} rad/s", ucs.critical_speeds[(i, 0)], ucs.critical_speeds[(i, 1)]);
    }
    println!();

    // Modal analysis at rest and at speed
    for speed in [0.0, 400.0] {
        let modal = rotor.run_modal(speed, &ModalOptions::new(6))?;
        println!("Modes at {speed:.0} rad/s:");
        for i in 0..modal.num_modes() {
            println!(
                "  {}: wd={:8.2} rad/s  zeta={:.4}  {:?} {:?}",
                i, modal.wd[i], modal.damping_ratio[i], modal.whirl[i], modal.mode_type[i]
            );
        }
        println!();
    }

    // Campbell diagram
    let speeds: Vec<f64> = (0..=20).map(|i| i as f64 * 50.0).collect();
    let campbell = rotor.run_campbell(&speeds, 4, &CampbellOptions::default())?;
    println!("Critical speeds (1X):");
    for crit in campbell.critical_speeds(1.0) {
        println!("  mode {}: {:.1} rad/s (whirl {:.1})", crit.mode, crit.speed, crit.whirl);
    }
    if !campbell.jumps.is_empty() {
        println!("  {} mode jumps flagged", campbell.jumps.len());
    }
    println!();

    // Synchronous unbalance response
    let unbalance = [Unbalance::new(2, 1e-4, 0.0)];
    let freqs: Vec<f64> = (1..=100).map(|i| i as f64 * 10.0).collect();
    let forced = rotor.run_unbalance_response(&unbalance, &freqs)?;
    let sensor_dof = rotor
        .translational_dofs(3)
        .context("node 3 has no translational DOF")?[0];
    let magnitude = forced.magnitude(sensor_dof);
    let (peak_idx, peak) = magnitude
        .iter()
        .copied()
        .enumerate()
        .fold((0, 0.0), |best, (i, m)| if m > best.1 { (i, m) } else { best });
    println!(
        "Unbalance response at node 3: peak {:.3e} m at {:.0} rad/s\n",
        peak, freqs[peak_idx]
    );

    // Transient with a rub at mid-span
    let t: Vec<f64> = (0..2001).map(|i| i as f64 * 2e-4).collect();
    let mut rubbing = Rubbing::new(&rotor, 3, 1e-4, 1e6, 50.0, 0.3)?.with_torque(true);
    let rub = rubbing.run(
        &rotor,
        &[Unbalance::new(2, 5e-3, 0.0)],
        SpeedProfile::Constant(500.0),
        &t,
        &TimeResponseOptions::newmark(),
    )?;
    println!(
        "Rubbing run: {} of {} steps in contact, max penetration {:.3e} m, converged: {}",
        rub.contact_steps().len(),
        t.len(),
        rub.max_penetration(),
        rub.response.converged
    );
    for w in &rub.response.warnings {
        println!("  warning: {w}");
    }

    // Gear-coupled train
    let steel = Material::steel();
    let alpha = 20f64.to_radians();
    let driving = Rotor::builder()
        .add_shafts((0..4).map(|_| ShaftElement::new(0.1, 0.0, 0.04, steel.clone())))
        .add_gear(GearElement::from_geometry(2, &steel, 0.03, 0.04, 0.2, 40, alpha))
        .add_bearing(BearingElement::new(0, 1e8, 100.0))
        .add_bearing(BearingElement::new(4, 1e8, 100.0))
        .build()?;
    let driven = Rotor::builder()
        .add_shafts((0..2).map(|_| ShaftElement::new(0.1, 0.0, 0.04, steel.clone())))
        .add_gear(GearElement::from_geometry(1, &steel, 0.03, 0.04, 0.1, 20, alpha))
        .add_bearing(BearingElement::new(0, 1e8, 100.0))
        .add_bearing(BearingElement::new(2, 1e8, 100.0))
        .build()?;
    let train = MultiRotor::couple(driving, driven, (2, 1), 1e8, 0.0)?;
    let modal = train.run_modal(100.0, &ModalOptions::new(4))?;
    println!(
        "\nGear train: {} DOF, gear ratio {:.2}, first modes {:?} rad/s",
        train.ndof(),
        train.meshes()[0].gear_ratio(),
        modal.wd.iter().map(|w| w.round()).collect::<Vec<_>>()
    );

    println!("\n=== Analysis Complete ===");
    Ok(())
}
