//! Shared synthetic devices and measurements for the integration tests.

#![allow(dead_code)]

use tubefit_core::{DeviceModel, DeviceType, Measurement, Model, ModelKind, ParameterId, Sample, TestType};

/// Deterministic, roughly Gaussian noise with zero mean and the given
/// standard deviation (Irwin-Hall sum of four uniforms from an LCG).
pub struct Noise {
    state: u64,
    sigma: f64,
}

impl Noise {
    pub fn new(seed: u64, sigma: f64) -> Self {
        Self { state: seed, sigma }
    }

    fn uniform(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.state >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn next(&mut self) -> f64 {
        // Sum of four U(0,1) has variance 1/3.
        let sum: f64 = (0..4).map(|_| self.uniform()).sum();
        (sum - 2.0) * 3.0f64.sqrt() * self.sigma
    }
}

pub fn koren_truth() -> Model {
    let mut model = Model::new(ModelKind::Koren);
    let p = model.parameters_mut();
    p.set(ParameterId::Mu, 30.0);
    p.set(ParameterId::Kg1, 1.2);
    p.set(ParameterId::X, 1.4);
    p.set(ParameterId::Kp, 400.0);
    p.set(ParameterId::Kvb, 300.0);
    model
}

pub fn derk_e_truth() -> Model {
    let mut model = Model::new(ModelKind::ReefmanDerkE);
    let p = model.parameters_mut();
    p.set(ParameterId::Mu, 9.0);
    p.set(ParameterId::Kg1, 0.6);
    p.set(ParameterId::X, 1.35);
    p.set(ParameterId::Kp, 45.0);
    p.set(ParameterId::Kvb, 250.0);
    p.set(ParameterId::Kvb1, 12.0);
    p.set(ParameterId::Vct, 0.2);
    p.set(ParameterId::Kg2, 6.0);
    p.set(ParameterId::Beta, 0.08);
    model
}

/// Anode characteristics of `truth`, Va from 10 to 300 V in 10 V steps,
/// with relative noise on every current.
pub fn triode_measurement(truth: &Model, grids: &[f64], noise: Option<&mut Noise>) -> Measurement {
    let mut m = Measurement::new(DeviceType::Triode, TestType::AnodeCharacteristics);
    let mut noise = noise;
    for &vg1 in grids {
        let sweep = m.next_sweep(vg1, 0.0);
        for step in 1..=30 {
            let va = 10.0 * step as f64;
            let mut ia = truth.anode_current(va, vg1, 0.0);
            if let Some(n) = noise.as_deref_mut() {
                ia *= 1.0 + n.next();
            }
            sweep.push(Sample::new(va, vg1, 0.0, ia, 0.0));
        }
    }
    m.ia_max = m.max_ia();
    m
}

/// Anode characteristics of a pentode at a fixed screen voltage, Va from
/// 20 to 400 V.
pub fn pentode_measurement(truth: &Model, grids: &[f64], vg2: f64) -> Measurement {
    let mut m = Measurement::new(DeviceType::Pentode, TestType::AnodeCharacteristics);
    for &vg1 in grids {
        let sweep = m.next_sweep(vg1, vg2);
        for step in 1..=20 {
            let va = 20.0 * step as f64;
            let ia = truth.anode_current(va, vg1, vg2);
            let ig2 = truth.screen_current(va, vg1, vg2, false);
            sweep.push(Sample::new(va, vg1, vg2, ia, ig2));
        }
    }
    m.ia_max = m.max_ia();
    m
}
