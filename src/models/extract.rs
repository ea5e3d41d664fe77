//! Beam-tetrode pentode (Derk-E exact).
//!
//! The cathode term is Koren's plate equation evaluated at the screen:
//! ```text
//! Ip    = Ip_Koren(Vg2, Vg1)
//! alpha = 1 − (Kg1/Kg2)·(1 + alpha_s)
//! g     = exp(−(Beta·Va)^1.5)
//! Ia    = Ip·(1/Kg1 − 1/Kg2 + A·Va/Kg1 − g·(alpha/Kg1 + alpha_s/Kg2))
//! Ig2   = Ip/Kg2·(1 + alpha_s·g)
//! ```
//! With secondary emission enabled, `Ip·Psec/Kg2` moves from anode to screen.
//!
//! Unlike the Reefman pentodes every coefficient is fitted together, on
//! anode and screen residuals at once.

use crate::solver::{FitConfig, FitReport};

use super::equations::{extract_currents, PentodeTerms, SecondaryEmission, TriodeTerms};
use super::fit::{fit_parameters, FitState};
use super::parameter::{Bounds, ParameterId, ParameterSet};
use super::{DeviceModel, ModelKind};

const PARAMETERS: &[ParameterId] = &[
    ParameterId::Mu,
    ParameterId::Kg1,
    ParameterId::X,
    ParameterId::Kp,
    ParameterId::Kvb,
    ParameterId::Kg2,
    ParameterId::A,
    ParameterId::Alpha,
    ParameterId::Beta,
    ParameterId::Omega,
    ParameterId::Lambda,
    ParameterId::Nu,
    ParameterId::S,
    ParameterId::Ap,
];

const BASE_FREE: &[ParameterId] = &[
    ParameterId::Kg1,
    ParameterId::Kp,
    ParameterId::Kvb,
    ParameterId::X,
    ParameterId::Mu,
    ParameterId::Kg2,
    ParameterId::A,
    ParameterId::Alpha,
    ParameterId::Beta,
];

const SECONDARY_FREE: &[ParameterId] = &[
    ParameterId::Kg1,
    ParameterId::Kp,
    ParameterId::Kvb,
    ParameterId::X,
    ParameterId::Mu,
    ParameterId::Kg2,
    ParameterId::A,
    ParameterId::Alpha,
    ParameterId::Beta,
    ParameterId::Omega,
    ParameterId::Lambda,
    ParameterId::Nu,
    ParameterId::S,
    ParameterId::Ap,
];

const MAX_ITERATIONS: usize = 800;
const FUNCTION_TOLERANCE: f64 = 1e-5;
const GRADIENT_TOLERANCE: f64 = 1e-6;

/// Beam-tetrode pentode with optional secondary emission.
#[derive(Debug, Clone)]
pub struct ExtractModelPentode {
    params: ParameterSet,
    state: FitState,
    secondary_emission: bool,
}

impl Default for ExtractModelPentode {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ExtractModelPentode {
    pub fn new(secondary_emission: bool) -> Self {
        let mut params = ParameterSet::with_values(&[
            (ParameterId::Mu, 10.0),
            (ParameterId::Kg1, 0.5),
            (ParameterId::X, 1.4),
            (ParameterId::Kp, 40.0),
            (ParameterId::Kvb, 300.0),
            (ParameterId::Kg2, 4.0),
            (ParameterId::A, 0.0),
            (ParameterId::Alpha, 0.1),
            (ParameterId::Beta, 0.05),
            (ParameterId::Omega, 200.0),
            (ParameterId::Lambda, 50.0),
            (ParameterId::Nu, 20.0),
            (ParameterId::S, 0.05),
            (ParameterId::Ap, 0.015),
        ]);
        params.set_bounds(ParameterId::Mu, Bounds::new(1.0, 1000.0));
        params.set_bounds(ParameterId::X, Bounds::new(1.0, 2.0));
        params.set_bounds(ParameterId::Kp, Bounds::new(1.0, 10000.0));
        params.set_bounds(ParameterId::Kvb, Bounds::new(0.1, 10000.0));
        params.set_bounds(ParameterId::Kg1, Bounds::at_least(0.02));
        params.set_bounds(ParameterId::Kg2, Bounds::at_least(0.05));
        params.set_bounds(ParameterId::A, Bounds::at_least(0.0));
        params.set_bounds(ParameterId::Alpha, Bounds::at_least(0.0));
        params.set_bounds(ParameterId::Beta, Bounds::new(0.01, 0.5));
        params.set_bounds(ParameterId::Omega, Bounds::new(0.0, 600.0));
        params.set_bounds(ParameterId::Lambda, Bounds::new(5.0, 200.0));
        params.set_bounds(ParameterId::Nu, Bounds::new(0.0, 80.0));
        params.set_bounds(ParameterId::S, Bounds::new(0.0, 0.5));
        params.set_bounds(ParameterId::Ap, Bounds::new(0.001, 0.05));

        let config = FitConfig::new()
            .with_max_iterations(MAX_ITERATIONS)
            .with_function_tolerance(FUNCTION_TOLERANCE)
            .with_gradient_tolerance(GRADIENT_TOLERANCE);

        Self {
            params,
            state: FitState::with_config(config),
            secondary_emission,
        }
    }

    pub fn set_secondary_emission(&mut self, enabled: bool) {
        self.secondary_emission = enabled;
    }

    fn currents(p: &ParameterSet, secondary: bool, va: f64, vg1: f64, vg2: f64) -> (f64, f64) {
        let t = TriodeTerms::from_set(p);
        let pt = PentodeTerms::from_set(p);
        let se = secondary.then(|| SecondaryEmission::from_set(p));
        extract_currents(&t, &pt, se.as_ref(), va, vg1, vg2)
    }
}

impl DeviceModel for ExtractModelPentode {
    fn kind(&self) -> ModelKind {
        ModelKind::ExtractDerkE
    }

    fn parameter_ids(&self) -> &'static [ParameterId] {
        PARAMETERS
    }

    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    fn fit_state(&self) -> &FitState {
        &self.state
    }

    fn fit_state_mut(&mut self) -> &mut FitState {
        &mut self.state
    }

    fn anode_current(&self, va: f64, vg1: f64, vg2: f64) -> f64 {
        Self::currents(&self.params, self.secondary_emission, va, vg1, vg2).0
    }

    /// Secondary emission applies only when both the caller and the model
    /// enable it.
    fn screen_current(&self, va: f64, vg1: f64, vg2: f64, secondary_emission: bool) -> f64 {
        let secondary = secondary_emission && self.secondary_emission;
        Self::currents(&self.params, secondary, va, vg1, vg2).1
    }

    fn secondary_emission(&self) -> bool {
        self.secondary_emission
    }

    fn solve(&mut self) -> FitReport {
        let secondary = self.secondary_emission;
        let free = if secondary { SECONDARY_FREE } else { BASE_FREE };
        let samples = self.state.samples();
        let n = samples.len();
        let report = fit_parameters(
            &mut self.params,
            free,
            2 * n,
            &self.state.config,
            |p, r| {
                let (anode, screen) = r.split_at_mut(n);
                for ((ra, rs), s) in anode.iter_mut().zip(screen.iter_mut()).zip(samples) {
                    let (ia, ig2) = Self::currents(p, secondary, s.va, s.vg1, s.vg2);
                    *ra = s.ia - ia;
                    *rs = s.ig2 - ig2;
                }
            },
        );
        self.state.set_report(report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn truth() -> ExtractModelPentode {
        let mut m = ExtractModelPentode::new(false);
        let p = m.parameters_mut();
        p.set(ParameterId::Mu, 8.5);
        p.set(ParameterId::Kg1, 0.8);
        p.set(ParameterId::X, 1.35);
        p.set(ParameterId::Kp, 45.0);
        p.set(ParameterId::Kvb, 250.0);
        p.set(ParameterId::Kg2, 5.5);
        p.set(ParameterId::A, 0.0005);
        p.set(ParameterId::Alpha, 0.2);
        p.set(ParameterId::Beta, 0.07);
        m
    }

    #[test]
    fn test_fit_reproduces_synthetic_pentode() {
        let truth = truth();
        let mut model = ExtractModelPentode::new(false);
        {
            let p = model.parameters_mut();
            p.set(ParameterId::Mu, 9.0);
            p.set(ParameterId::Kg1, 0.7);
            p.set(ParameterId::X, 1.3);
            p.set(ParameterId::Kp, 40.0);
            p.set(ParameterId::Kvb, 300.0);
            p.set(ParameterId::Kg2, 5.0);
        }

        let mut points = Vec::new();
        for vg1 in [0.0, -4.0, -8.0, -12.0] {
            for step in 1..=16 {
                let va = 25.0 * step as f64;
                let ia = truth.anode_current(va, vg1, 250.0);
                let ig2 = truth.screen_current(va, vg1, 250.0, false);
                model.add_sample(va, ia, vg1, 250.0, ig2);
                points.push((va, vg1, ia));
            }
        }

        let report = model.solve();
        assert!(report.converged);
        for &(va, vg1, ia) in &points {
            if ia > 1.0 {
                assert_relative_eq!(model.anode_current(va, vg1, 250.0), ia, max_relative = 0.05);
            }
        }
    }

    #[test]
    fn test_secondary_emission_flag() {
        let mut m = truth();
        let plain = m.screen_current(60.0, -2.0, 250.0, true);
        m.set_secondary_emission(true);
        assert!(m.secondary_emission());
        let with_se = m.screen_current(60.0, -2.0, 250.0, true);
        let gated = m.screen_current(60.0, -2.0, 250.0, false);
        assert!(with_se > plain);
        assert_relative_eq!(gated, plain);
    }

    #[test]
    fn test_config_overrides() {
        let m = ExtractModelPentode::new(false);
        assert_eq!(m.fit_state().config.max_iterations, 800);
        assert_relative_eq!(m.fit_state().config.function_tolerance, 1e-5);
    }

    #[test]
    fn test_zero_screen_voltage_gives_zero_currents() {
        let m = truth();
        assert_eq!(m.anode_current(250.0, -2.0, 0.0), 0.0);
        assert_eq!(m.screen_current(250.0, -2.0, 0.0, false), 0.0);
    }
}
