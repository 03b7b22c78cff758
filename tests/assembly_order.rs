use approx::relative_eq;
use proptest::prelude::*;
use rotordyn::prelude::*;

fn disks() -> Vec<DiskElement> {
    let steel = Material::steel();
    vec![
        DiskElement::from_geometry(1, &steel, 0.05, 0.05, 0.25),
        DiskElement::from_geometry(3, &steel, 0.07, 0.05, 0.3),
        DiskElement::new(3, 2.0, 0.01, 0.02),
        DiskElement::new(5, 5.0, 0.03, 0.05),
    ]
}

fn bearings() -> Vec<BearingElement> {
    vec![
        BearingElement::new(0, 1e7, 100.0),
        BearingElement::new(6, 2e7, 50.0).with_kyy(3e7),
        BearingElement::new(3, 1e5, 10.0),
    ]
}

fn build(disk_order: &[usize], bearing_order: &[usize], shaft_reversed: bool) -> Rotor {
    let steel = Material::steel();
    let mut shafts: Vec<ShaftElement> = (0..6)
        .map(|n| ShaftElement::new(0.2, 0.0, 0.04 + 0.002 * n as f64, steel.clone()).with_n(n))
        .collect();
    if shaft_reversed {
        shafts.reverse();
    }
    let (d, b) = (disks(), bearings());
    let mut builder = Rotor::builder().add_shafts(shafts);
    for &i in disk_order {
        builder = builder.add_disk(d[i].clone());
    }
    for &i in bearing_order {
        builder = builder.add_bearing(b[i].clone());
    }
    builder.build().unwrap()
}

proptest! {
    #[test]
    fn prop_matrices_independent_of_element_order(
        disk_order in Just(vec![0usize, 1, 2, 3]).prop_shuffle(),
        bearing_order in Just(vec![0usize, 1, 2]).prop_shuffle(),
        shaft_reversed in any::<bool>(),
        speed in 0.0f64..2000.0,
    ) {
        let reference = build(&[0, 1, 2, 3], &[0, 1, 2], false)
            .matrices(0.0, speed, MagneticModel::Equivalent)
            .unwrap();
        let shuffled = build(&disk_order, &bearing_order, shaft_reversed)
            .matrices(0.0, speed, MagneticModel::Equivalent)
            .unwrap();

        for (a, b) in [
            (&reference.m, &shuffled.m),
            (&reference.k, &shuffled.k),
            (&reference.c, &shuffled.c),
            (&reference.g, &shuffled.g),
        ] {
            let scale = a.amax().max(1.0);
            prop_assert!(relative_eq!(a, b, epsilon = 1e-12 * scale));
        }
    }
}

#[test]
fn test_assembly_is_deterministic() {
    let a = build(&[2, 0, 3, 1], &[1, 2, 0], true).matrices(10.0, 500.0, MagneticModel::Equivalent).unwrap();
    let b = build(&[2, 0, 3, 1], &[1, 2, 0], true).matrices(10.0, 500.0, MagneticModel::Equivalent).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_system_matrices_are_symmetric() {
    let sys = build(&[0, 1, 2, 3], &[0, 1, 2], false)
        .matrices(0.0, 0.0, MagneticModel::Equivalent)
        .unwrap();
    assert!(relative_eq!(sys.m, sys.m.transpose(), epsilon = 1e-12));
    assert!(relative_eq!(sys.k, sys.k.transpose(), epsilon = 1e-3));
    assert!(relative_eq!(sys.g, -sys.g.transpose(), epsilon = 1e-12));
}
