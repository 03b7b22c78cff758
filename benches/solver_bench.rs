//! Benchmarks for rotordyn

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rotordyn::math::Mat;
use rotordyn::prelude::*;

fn create_rotor(n_el: usize) -> Rotor {
    let steel = Material::steel();
    let l = 1.5 / n_el as f64;
    Rotor::builder()
        .add_shafts((0..n_el).map(|_| ShaftElement::new(l, 0.0, 0.05, steel.clone())))
        .add_disk(DiskElement::from_geometry(n_el / 3, &steel, 0.07, 0.05, 0.28))
        .add_disk(DiskElement::from_geometry(2 * n_el / 3, &steel, 0.07, 0.05, 0.35))
        .add_bearing(BearingElement::new(0, 1e6, 50.0))
        .add_bearing(BearingElement::new(n_el, 1e6, 50.0))
        .build()
        .unwrap()
}

fn benchmark_assembly(c: &mut Criterion) {
    let rotor = create_rotor(30);
    c.bench_function("assemble_30_elements", |b| {
        b.iter(|| {
            let m = rotor.matrices(0.0, 500.0, MagneticModel::Equivalent).unwrap();
            black_box(m);
        })
    });
}

fn benchmark_modal(c: &mut Criterion) {
    let rotor = create_rotor(6);
    let options = ModalOptions::new(8);
    c.bench_function("modal_6_elements", |b| {
        b.iter(|| {
            let modal = rotor.run_modal(black_box(500.0), &options).unwrap();
            black_box(modal);
        })
    });
}

fn benchmark_campbell(c: &mut Criterion) {
    let rotor = create_rotor(6);
    let speeds: Vec<f64> = (0..=10).map(|i| i as f64 * 100.0).collect();
    let options = CampbellOptions::default();
    c.bench_function("campbell_6_elements_11_speeds", |b| {
        b.iter(|| {
            let campbell = rotor.run_campbell(&speeds, 4, &options).unwrap();
            black_box(campbell);
        })
    });
}

fn benchmark_newmark(c: &mut Criterion) {
    let rotor = create_rotor(6);
    let t: Vec<f64> = (0..501).map(|i| i as f64 * 1e-4).collect();
    let (force, _) = unbalance_force_over_time(
        &rotor,
        &[Unbalance::new(2, 1e-3, 0.0)],
        &SpeedProfile::Constant(500.0),
        &t,
    )
    .unwrap();
    let options = TimeResponseOptions::newmark();
    c.bench_function("newmark_500_steps", |b| {
        b.iter(|| {
            let res = rotor
                .run_time_response(SpeedProfile::Constant(500.0), &force, &t, &options)
                .unwrap();
            black_box(res);
        })
    });
}

fn benchmark_state_space(c: &mut Criterion) {
    let rotor = create_rotor(6);
    let t: Vec<f64> = (0..501).map(|i| i as f64 * 1e-4).collect();
    let force = Mat::zeros(t.len(), rotor.ndof());
    let options = TimeResponseOptions::default();
    c.bench_function("state_space_500_steps", |b| {
        b.iter(|| {
            let res = rotor
                .run_time_response(SpeedProfile::Constant(500.0), &force, &t, &options)
                .unwrap();
            black_box(res);
        })
    });
}

criterion_group!(
    benches,
    benchmark_assembly,
    benchmark_modal,
    benchmark_campbell,
    benchmark_newmark,
    benchmark_state_space,
);

criterion_main!(benches);
