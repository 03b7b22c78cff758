use approx::assert_relative_eq;
use rotordyn::analysis::GRAVITY;
use rotordyn::prelude::*;

fn geared(n_el: usize, gear_node: usize, pitch: f64, n_teeth: usize) -> Rotor {
    let steel = Material::steel();
    Rotor::builder()
        .add_shafts((0..n_el).map(|_| ShaftElement::new(0.12, 0.0, 0.04, steel.clone())))
        .add_gear(GearElement::from_geometry(gear_node, &steel, 0.03, 0.04, pitch, n_teeth, 20f64.to_radians()))
        .add_bearing(BearingElement::new(0, 1e7, 200.0))
        .add_bearing(BearingElement::new(n_el, 1e7, 200.0))
        .build()
        .unwrap()
}

fn lateral_wn<S: RotorSystem>(system: &S, count: usize) -> Vec<f64> {
    let modal = system.run_modal(0.0, &ModalOptions::new(3 * count)).unwrap();
    (0..modal.num_modes())
        .filter(|&i| modal.mode_type[i] == ModeType::Lateral)
        .map(|i| modal.wn[i])
        .take(count)
        .collect()
}

#[test]
fn test_soft_mesh_recovers_uncoupled_rotors() {
    let a = geared(4, 2, 0.2, 40);
    let b = geared(3, 1, 0.1, 20);
    let train = MultiRotor::couple(a.clone(), b.clone(), (2, 1), 1e-3, 0.0).unwrap();

    let mut expected: Vec<f64> = lateral_wn(&a, 4).into_iter().chain(lateral_wn(&b, 4)).collect();
    expected.sort_by(f64::total_cmp);
    let mut coupled = lateral_wn(&train, 4);
    coupled.sort_by(f64::total_cmp);
    for (c, e) in coupled.iter().zip(&expected) {
        assert_relative_eq!(*c, *e, max_relative = 1e-5);
    }
}

#[test]
fn test_train_runs_every_analysis() {
    let train = MultiRotor::couple(geared(4, 2, 0.2, 40), geared(3, 1, 0.1, 20), (2, 1), 1e8, 0.3).unwrap();
    assert_eq!(train.ndof(), 6 * 5 + 6 * 4);
    assert_relative_eq!(train.speed_ratio(7), -2.0, max_relative = 1e-12);

    let campbell = train
        .run_campbell(&[0.0, 100.0, 200.0], 4, &CampbellOptions::default())
        .unwrap();
    assert!(campbell.missing.is_empty());

    // Unbalance on the driven shaft spins backwards at twice the driving speed
    let t: Vec<f64> = (0..200).map(|i| i as f64 * 1e-4).collect();
    let (force, theta) =
        unbalance_force_over_time(&train, &[Unbalance::new(6, 1e-4, 0.0)], &SpeedProfile::Constant(100.0), &t).unwrap();
    let dx = train.translational_dofs(6).unwrap()[0];
    assert_relative_eq!(force[(50, dx)], 1e-4 * 200.0 * 200.0 * (2.0 * theta[50]).cos(), max_relative = 1e-9);

    let res = train
        .run_time_response(SpeedProfile::Constant(100.0), &force, &t, &TimeResponseOptions::newmark())
        .unwrap();
    assert!(res.converged);
    assert!(res.peak(dx) > 0.0);

    let freq = train.run_unbalance_response(&[Unbalance::new(6, 1e-4, 0.0)], &[50.0, 100.0]).unwrap();
    assert_eq!(freq.response.nrows(), train.ndof());

    // Both shafts hang on their own bearings, numbered in the train
    let stat = train.run_static().unwrap();
    let lift: f64 = stat.reactions.iter().map(|r| r.force[1]).sum();
    assert_relative_eq!(lift, train.mass() * GRAVITY, max_relative = 1e-6);
    let nodes: Vec<usize> = stat.reactions.iter().map(|r| r.node).collect();
    assert_eq!(nodes, vec![0, 4, 5, 8]);

    let ucs = train.run_ucs(&[1e6, 1e8], 2).unwrap();
    assert!(ucs.critical_speeds[(1, 0)] > ucs.critical_speeds[(0, 0)]);
}

fn overhung_pinion() -> Rotor {
    let steel = Material::steel();
    Rotor::builder()
        .add_shafts((0..4).map(|_| ShaftElement::new(0.1, 0.0, 0.04, steel.clone())))
        .add_gear(GearElement::from_geometry(1, &steel, 0.03, 0.04, 0.1, 20, 20f64.to_radians()))
        .add_disk(DiskElement::from_geometry(4, &steel, 0.05, 0.04, 0.3))
        .add_bearing(BearingElement::new(0, 1e7, 0.0))
        .add_bearing(BearingElement::new(2, 1e7, 0.0))
        .build()
        .unwrap()
}

#[test]
fn test_driven_shaft_counter_rotates() {
    let pinion = overhung_pinion();
    let train = MultiRotor::couple(geared(4, 2, 0.2, 40), pinion.clone(), (2, 1), 1e-3, 0.0).unwrap();
    assert_relative_eq!(train.speed_ratio(9), -2.0, max_relative = 1e-12);
    let disk = 9;
    let [dx, dy, _] = train.translational_dofs(disk).unwrap();

    // Alone at the same spin magnitude the pinion splits into backward and forward
    let alone = pinion.run_modal(300.0, &ModalOptions::new(2)).unwrap();
    assert_eq!(alone.whirl, vec![Whirl::Backward, Whirl::Forward]);

    let modal = train.run_modal(150.0, &ModalOptions::new(16)).unwrap();
    for k in 0..2 {
        let mode = (0..modal.num_modes())
            .min_by(|&i, &j| (modal.wd[i] - alone.wd[k]).abs().total_cmp(&(modal.wd[j] - alone.wd[k]).abs()))
            .unwrap();
        assert_relative_eq!(modal.wd[mode], alone.wd[k], max_relative = 1e-4);
        // Same label relative to the pinion's spin, opposite absolute orbit
        assert_eq!(modal.whirl[mode], alone.whirl[k]);
        let shape = modal.mode_shape(mode).unwrap();
        let absolute = Orbit::from_amplitudes(disk, shape[dx], shape[dy], 1e-9);
        assert_eq!(absolute.whirl, Some(alone.whirl[k].reversed()));
        let orbit = modal.node_orbits(mode).into_iter().find(|o| o.node == disk).unwrap();
        assert_eq!(orbit.whirl, Some(alone.whirl[k]));
    }

    // Synchronous unbalance on the pinion drives a clockwise orbit of the same size
    let coupled = train.run_unbalance_response(&[Unbalance::new(disk, 1e-4, 0.0)], &[100.0]).unwrap();
    let single = pinion.run_unbalance_response(&[Unbalance::new(4, 1e-4, 0.0)], &[200.0]).unwrap();
    let px = pinion.translational_dofs(4).unwrap()[0];
    assert_relative_eq!(coupled.response[(dx, 0)].norm(), single.response[(px, 0)].norm(), max_relative = 1e-4);
    let orbit = Orbit::from_amplitudes(disk, coupled.response[(dx, 0)], coupled.response[(dy, 0)], 0.0);
    assert_eq!(orbit.whirl, Some(Whirl::Backward));
}
