//! End-to-end: synthetic measurement, seed estimate, fit, device document,
//! output stage design.

mod common;

use approx::assert_relative_eq;
use common::*;
use tubefit_core::circuit::{PushPullOutput, SingleEndedOutput, SingleEndedUltralinear};
use tubefit_core::{Circuit, Device, DeviceModel, EstimateConfig, Estimator, Model, ModelKind, ParameterId};

const GRIDS: [f64; 9] = [0.0, -0.5, -1.0, -1.5, -2.0, -2.5, -3.0, -3.5, -4.0];

#[test]
fn triode_fit_and_single_ended_design() {
    let truth = koren_truth();
    let measurement = triode_measurement(&truth, &GRIDS, None);

    let mut model = Estimator::new(EstimateConfig::new())
        .estimate(&measurement, ModelKind::Koren)
        .unwrap();
    let added = measurement.add_to_model(&mut model);
    assert_eq!(added, GRIDS.len() * 30);
    let report = model.solve_with_retry();
    assert!(report.converged);
    assert!(report.final_cost <= report.initial_cost);

    let mut device = Device::from_measurement("synthetic", model, measurement);
    assert_relative_eq!(device.vg1_max, 4.0);
    device.va_max = 600.0;
    device.pa_max = 10.0;

    let mut stage = SingleEndedOutput::new();
    stage.ia = 15.0;
    stage.ra = 10000.0;
    stage.update(Some(&device));
    let r = stage.result();

    // The solved grid bias reproduces the target current.
    assert!(r.vk > 0.0);
    let ia = device.anode_current(stage.vb, -r.vk, stage.vs);
    assert_relative_eq!(ia, 15.0, max_relative = 0.005);
    // And agrees with the generating model.
    assert_relative_eq!(truth.anode_current(stage.vb, -r.vk, 0.0), 15.0, max_relative = 0.02);
    assert!(r.effective_headroom > 0.0);
    assert!(r.harmonics.thd > 0.0);
}

#[test]
fn koren_round_trip_with_noise() {
    let truth = koren_truth();
    let mut noise = Noise::new(0x5eed, 2e-4);
    let measurement = triode_measurement(&truth, &GRIDS, Some(&mut noise));

    let mut model = Estimator::default()
        .estimate(&measurement, ModelKind::Koren)
        .unwrap();
    measurement.add_to_model(&mut model);
    assert!(model.solve().converged);

    for id in [ParameterId::Mu, ParameterId::Kg1, ParameterId::X, ParameterId::Kp, ParameterId::Kvb] {
        assert_relative_eq!(model.value(id), truth.value(id), max_relative = 0.05);
    }
    for s in measurement.iter_samples().filter(|s| s.ia > 1.0) {
        assert_relative_eq!(
            model.anode_current(s.va, s.vg1, 0.0),
            truth.anode_current(s.va, s.vg1, 0.0),
            max_relative = 0.02
        );
    }
}

#[test]
fn device_document_survives_a_file_round_trip() {
    let truth = koren_truth();
    let measurement = triode_measurement(&truth, &[0.0, -2.0], None);
    let device = Device::from_measurement("12AT7", truth, measurement);

    let path = std::env::temp_dir().join(format!("tubefit-device-{}.json", std::process::id()));
    device.write_file(&path).unwrap();
    let back = Device::from_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(back.name, "12AT7");
    assert_eq!(back.model().kind(), ModelKind::Koren);
    assert_relative_eq!(back.va_max, device.va_max);
    assert_eq!(
        back.measurement().map(|m| m.sample_count()),
        Some(device.measurement().map_or(0, |m| m.sample_count()))
    );
    for (va, vg1) in [(100.0, 0.0), (250.0, -1.5), (300.0, -3.0)] {
        assert_relative_eq!(
            back.anode_current(va, vg1, 0.0),
            device.anode_current(va, vg1, 0.0),
            max_relative = 1e-12
        );
    }
}

#[test]
fn pentode_pipeline_with_measured_bias() {
    let truth = derk_e_truth();

    // Triode-connected sweeps of the same tube fix the triode coefficients.
    let mut triode_truth = Model::new(ModelKind::CohenHelie);
    triode_truth.from_parameters(truth.parameters());
    let triode_grids: Vec<f64> = (0..=8).map(|i| -2.5 * i as f64).collect();
    let triode_data = triode_measurement(&triode_truth, &triode_grids, None);
    let mut triode = Estimator::default()
        .estimate(&triode_data, ModelKind::CohenHelie)
        .unwrap();
    triode_data.add_to_model(&mut triode);
    assert!(triode.solve().converged);

    let grids = [0.0, -5.0, -10.0, -15.0, -20.0];
    let measurement = pentode_measurement(&truth, &grids, 250.0);

    let mut model = Estimator::default()
        .estimate_with_triode(&measurement, ModelKind::ReefmanDerkE, &triode)
        .unwrap();
    measurement.add_to_model(&mut model);
    let report = model.solve_with_retry();
    assert!(report.converged);
    assert!(report.final_cost <= report.initial_cost);
    for s in measurement.iter_samples().filter(|s| s.ia > 0.5) {
        assert_relative_eq!(model.anode_current(s.va, s.vg1, s.vg2), s.ia, max_relative = 0.05);
    }

    let device = Device::from_measurement("synthetic pentode", model, measurement);
    assert_relative_eq!(device.vg1_max, 20.0);
    assert_relative_eq!(device.va_max, 400.0);
    for va in [0.0, 50.0, 150.0, 300.0] {
        let ia = device.anode_current(va, -10.0, 250.0);
        let ig2 = device.screen_current(va, -10.0, 250.0);
        assert!(ia.is_finite() && ia >= 0.0);
        assert!(ig2.is_finite() && ig2 >= 0.0);
    }

    // Bias read straight off the sweeps, halfway between -10 V and -15 V.
    let target = 0.5 * (truth.anode_current(300.0, -10.0, 250.0) + truth.anode_current(300.0, -15.0, 250.0));
    let mut pp = PushPullOutput::new();
    pp.ia = target;
    pp.update(Some(&device));
    let r = pp.result();
    assert!(r.measured_bias);
    assert_relative_eq!(r.vk, 12.5, epsilon = 1e-9);
    let ig2 = 0.5
        * (truth.screen_current(300.0, -10.0, 250.0, false)
            + truth.screen_current(300.0, -15.0, 250.0, false));
    assert_relative_eq!(r.ik, target + ig2, max_relative = 1e-9);

    // The ultralinear stage always searches the fitted model.
    let mut ul = SingleEndedUltralinear::new();
    ul.ia = target;
    ul.update(Some(&device));
    assert!(!ul.result().measured_bias);
    assert!(ul.result().vk <= 2.0 * device.vg1_max);
}
