//! Behavioural guarantees every model family, solver and circuit must keep.

mod common;

use approx::assert_relative_eq;
use common::*;
use tubefit_core::circuit::{
    time_domain_harmonics, HarmonicEstimator, Point, ScreenSupply, SingleEndedOutput,
    TriodeCathodeFollower,
};
use tubefit_core::estimate::{find_ia, find_va};
use tubefit_core::models::NOT_FOUND;
use tubefit_core::solver::{LinearSolver, QuadraticSolver};
use tubefit_core::{Circuit, Device, DeviceModel, Model, ModelKind, Sample, Sweep};

fn every_model() -> Vec<Model> {
    let mut models: Vec<Model> = ModelKind::ALL.iter().map(|&k| Model::new(k)).collect();
    let mut se = Model::new(ModelKind::ExtractDerkE);
    se.set_secondary_emission(true);
    models.push(se);
    models
}

#[test]
fn anode_current_is_non_decreasing_in_anode_voltage() {
    // Secondary emission bends the tetrode curve back on purpose, so only
    // the plain families are checked.
    for model in ModelKind::ALL.iter().map(|&k| Model::new(k)) {
        for vg1 in [0.0, -1.0, -3.0] {
            let mut last = 0.0;
            for step in 0..=200 {
                let va = step as f64 * 2.5;
                let i = model.anode_current(va, vg1, 250.0);
                assert!(
                    i >= last - 1e-9 * last,
                    "{} not monotonic at Va = {}, Vg1 = {}",
                    model.kind(),
                    va,
                    vg1
                );
                last = i;
            }
        }
    }
}

#[test]
fn currents_are_never_negative_or_nan() {
    let voltages = [-100.0, -1.0, 0.0, 1e-9, 1.0, 50.0, 400.0, 1e6];
    for model in every_model() {
        for &va in &voltages {
            for &vg1 in &[-1e3, -50.0, -2.0, 0.0, 2.0, 50.0] {
                for &vg2 in &[0.0, 100.0, 250.0, 1e4] {
                    for se in [false, true] {
                        let ia = model.anode_current(va, vg1, vg2);
                        let ig2 = model.screen_current(va, vg1, vg2, se);
                        assert!(ia.is_finite() && ia >= 0.0, "{} Ia({}, {}, {})", model.kind(), va, vg1, vg2);
                        assert!(ig2.is_finite() && ig2 >= 0.0, "{} Ig2({}, {}, {})", model.kind(), va, vg1, vg2);
                    }
                }
            }
        }
    }
}

#[test]
fn degenerate_regressions_do_not_converge() {
    let mut empty = LinearSolver::new(2.0, 3.0);
    assert!(!empty.solve());

    let mut single = LinearSolver::new(2.0, 3.0);
    single.add_sample(1.0, 5.0);
    assert!(!single.solve());
    assert!(!single.converged());

    let mut vertical = LinearSolver::new(2.0, 3.0);
    vertical.add_sample(4.0, 1.0);
    vertical.add_sample(4.0, 9.0);
    assert!(!vertical.solve());
    // Coefficients are left untouched.
    assert_eq!((vertical.a(), vertical.b()), (2.0, 3.0));
}

#[test]
fn regressions_recover_exact_curves() {
    let mut line = LinearSolver::default();
    for x in 0..5 {
        let x = x as f64;
        line.add_sample(x, 2.0 * x + 1.0);
    }
    assert!(line.solve());
    assert_relative_eq!(line.a(), 2.0, epsilon = 1e-9);
    assert_relative_eq!(line.b(), 1.0, epsilon = 1e-9);

    let mut parabola = QuadraticSolver::default();
    for x in -2..=4 {
        let x = x as f64;
        parabola.add_sample(x, x * x - 3.0 * x + 2.0);
    }
    assert!(parabola.solve());
    assert_relative_eq!(parabola.a(), 1.0, epsilon = 1e-9);
    assert_relative_eq!(parabola.b(), -3.0, epsilon = 1e-9);
    assert_relative_eq!(parabola.c(), 2.0, epsilon = 1e-9);

    let mut fixed = QuadraticSolver::new(1.0, 0.0, 0.0).with_fixed_a(true);
    for x in 0..6 {
        let x = x as f64;
        fixed.add_sample(x, x * x + 4.0 * x - 1.0);
    }
    assert!(fixed.solve());
    assert_relative_eq!(fixed.a(), 1.0);
    assert_relative_eq!(fixed.b(), 4.0, epsilon = 1e-9);
    assert_relative_eq!(fixed.c(), -1.0, epsilon = 1e-9);
}

#[test]
fn koren_scenario_fit_reproduces_samples() {
    let samples = [
        (250.0, 0.0, 90.5),
        (250.0, -2.0, 60.2),
        (250.0, -4.0, 35.1),
        (150.0, 0.0, 45.3),
    ];
    let mut model = Model::new(ModelKind::Koren);
    for &(va, vg1, ia) in &samples {
        model.add_sample(va, ia, vg1, 0.0, 0.0);
    }
    assert!(model.solve().converged);
    assert!(model.converged());
    for &(va, vg1, ia) in &samples {
        assert_relative_eq!(model.anode_current(va, vg1, 0.0), ia, max_relative = 0.10);
    }
}

#[test]
fn time_domain_harmonics_are_repeatable() {
    let device = Device::new("12AX7", koren_truth()).with_limits(400.0, 4.0, 20.0, 1.25);
    let estimator = HarmonicEstimator::new(&device, 300.0, 20000.0, ScreenSupply::Fixed(0.0));

    let first = estimator.simulate(5.0, 40.0).unwrap();
    let second = estimator.simulate(5.0, 40.0).unwrap();
    assert_eq!(first, second);

    let samples = [9.0, 7.2, 5.0, 3.1, 1.4];
    assert_eq!(time_domain_harmonics(&samples), time_domain_harmonics(&samples));
}

#[test]
fn zero_headroom_has_no_harmonics() {
    let device = Device::new("12AX7", koren_truth());
    let estimator = HarmonicEstimator::new(&device, 300.0, 8000.0, ScreenSupply::Fixed(250.0));
    assert!(estimator.simulate(30.0, 0.0).is_none());
}

#[test]
fn circuits_without_a_device_report_nothing() {
    let mut se = SingleEndedOutput::new();
    se.update(None);
    let r = se.result();
    assert_eq!((r.vk, r.ik, r.rk, r.pout), (0.0, 0.0, 0.0, 0.0));

    let mut cf = TriodeCathodeFollower::new();
    cf.update(None);
    let r = cf.result();
    assert_eq!((r.vg, r.vk, r.ik, r.ro), (0.0, 0.0, 0.0, 0.0));
    assert_eq!(r.operating_point, Point::new(-1.0, -1.0));
}

#[test]
fn sweep_interpolation_inside_and_outside() {
    let mut sweep = Sweep::new(-2.0, 0.0);
    for (va, ia) in [(50.0, 1.0), (100.0, 3.0), (150.0, 6.0), (200.0, 10.0)] {
        sweep.push(Sample::new(va, -2.0, 0.0, ia, 0.0));
    }

    assert_relative_eq!(find_va(&sweep, 4.5), 125.0);
    assert_relative_eq!(find_ia(&sweep, 175.0), 8.0);
    assert_eq!(find_va(&sweep, 12.0), NOT_FOUND);
    assert_eq!(find_ia(&sweep, 250.0), NOT_FOUND);
}

#[test]
fn models_round_trip_through_json() {
    for mut model in every_model() {
        // Move every coefficient off its default.
        let ids = model.parameter_ids();
        for &id in ids {
            let v = model.value(id);
            model.parameters_mut().set(id, if v == 0.0 { 0.01 } else { v * 1.05 });
        }
        let back = Model::from_json(&model.to_json()).unwrap();
        assert_eq!(back.kind(), model.kind());
        for (va, vg1, vg2) in [(50.0, 0.0, 250.0), (200.0, -2.0, 250.0), (350.0, -6.0, 200.0)] {
            assert_eq!(back.anode_current(va, vg1, vg2), model.anode_current(va, vg1, vg2));
            assert_eq!(
                back.screen_current(va, vg1, vg2, back.secondary_emission()),
                model.screen_current(va, vg1, vg2, model.secondary_emission())
            );
        }
    }
}
