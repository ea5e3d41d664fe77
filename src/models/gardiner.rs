//! Gardiner triode and pentode.
//!
//! The triode replaces Koren's soft exponential with its linear limit:
//! ```text
//! Ep = Va·(1/mu + (Vg1+Vct)/sqrt(Kvb + Kvb1·Va + Va²))
//! Ia = Ep^x / Kg1
//! ```
//! The pentode builds on the Cohen-Helie cathode term with an exponential
//! knee `g = exp(−(shift·Va)^Gamma)`.

use crate::solver::{FitConfig, FitReport};

use super::cohen_helie::apply_cohen_helie_bounds;
use super::equations::{
    cohen_helie_epk, gardiner_current, gardiner_knee, pentode_anode_current,
    pentode_screen_current, PentodeTerms, TriodeTerms,
};
use super::fit::{fit_parameters, FitState};
use super::parameter::{Bounds, ParameterId, ParameterSet};
use super::{DeviceModel, ModelKind};

const TRIODE_PARAMETERS: &[ParameterId] = &[
    ParameterId::Mu,
    ParameterId::Kg1,
    ParameterId::X,
    ParameterId::Kvb,
    ParameterId::Kvb1,
    ParameterId::Vct,
];

const PENTODE_PARAMETERS: &[ParameterId] = &[
    ParameterId::Mu,
    ParameterId::Kg1,
    ParameterId::X,
    ParameterId::Kp,
    ParameterId::Kvb,
    ParameterId::Kvb1,
    ParameterId::Vct,
    ParameterId::Kg2,
    ParameterId::A,
    ParameterId::Alpha,
    ParameterId::Beta,
    ParameterId::Gamma,
];

/// Held at their seeded values during a pentode fit.
const PENTODE_CONSTANTS: &[ParameterId] = &[
    ParameterId::Kp,
    ParameterId::Kvb,
    ParameterId::Kvb1,
    ParameterId::Vct,
    ParameterId::A,
];

/// Gardiner triode.
#[derive(Debug, Clone)]
pub struct GardinerTriode {
    params: ParameterSet,
    state: FitState,
}

impl Default for GardinerTriode {
    fn default() -> Self {
        Self::new()
    }
}

impl GardinerTriode {
    pub fn new() -> Self {
        let mut params = ParameterSet::with_values(&[
            (ParameterId::Kg1, 0.7),
            (ParameterId::Vct, 0.2),
            (ParameterId::X, 1.5),
            (ParameterId::Mu, 100.0),
            (ParameterId::Kvb, 300.0),
            (ParameterId::Kvb1, 30.0),
        ]);
        params.set_bounds(ParameterId::Kg1, Bounds::at_least(1e-7));
        params.set_bounds(ParameterId::X, Bounds::new(1.0, 2.0));
        params.set_bounds(ParameterId::Mu, Bounds::new(1.0, 1000.0));
        params.set_bounds(ParameterId::Kvb, Bounds::new(0.0, 10000.0));
        params.set_bounds(ParameterId::Kvb1, Bounds::new(0.0, 1000.0));
        params.set_bounds(ParameterId::Vct, Bounds::new(0.0, 2.0));

        Self {
            params,
            state: FitState::default(),
        }
    }
}

impl DeviceModel for GardinerTriode {
    fn kind(&self) -> ModelKind {
        ModelKind::Gardiner
    }

    fn parameter_ids(&self) -> &'static [ParameterId] {
        TRIODE_PARAMETERS
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

    fn anode_current(&self, va: f64, vg1: f64, _vg2: f64) -> f64 {
        gardiner_current(&TriodeTerms::from_set(&self.params), va, vg1)
    }

    fn solve(&mut self) -> FitReport {
        let samples = self.state.samples();
        let report = fit_parameters(
            &mut self.params,
            TRIODE_PARAMETERS,
            samples.len(),
            &self.state.config,
            |p, r| {
                let t = TriodeTerms::from_set(p);
                for (ri, s) in r.iter_mut().zip(samples) {
                    *ri = s.ia - gardiner_current(&t, s.va, s.vg1);
                }
            },
        );
        self.state.set_report(report);
        report
    }
}

/// Gardiner pentode.
#[derive(Debug, Clone)]
pub struct GardinerPentode {
    params: ParameterSet,
    state: FitState,
}

impl Default for GardinerPentode {
    fn default() -> Self {
        Self::new()
    }
}

impl GardinerPentode {
    pub fn new() -> Self {
        let mut params = ParameterSet::with_values(&[
            (ParameterId::Mu, 10.0),
            (ParameterId::Kg1, 0.5),
            (ParameterId::X, 1.4),
            (ParameterId::Kp, 40.0),
            (ParameterId::Kvb, 300.0),
            (ParameterId::Kvb1, 10.0),
            (ParameterId::Vct, 0.2),
            (ParameterId::Kg2, 4.0),
            (ParameterId::A, 0.0),
            (ParameterId::Alpha, 0.1),
            (ParameterId::Beta, 0.1),
            (ParameterId::Gamma, 1.0),
        ]);
        apply_cohen_helie_bounds(&mut params);
        params.set_bounds(ParameterId::Kg2, Bounds::at_least(0.05));
        params.set_bounds(ParameterId::Alpha, Bounds::at_least(0.0));
        params.set_bounds(ParameterId::Beta, Bounds::at_least(1e-5));
        params.set_bounds(ParameterId::Gamma, Bounds::new(0.5, 2.0));
        for &id in PENTODE_CONSTANTS {
            params.set_fixed(id, true);
        }

        Self {
            params,
            state: FitState::with_config(FitConfig::new().with_max_iterations(200)),
        }
    }

    /// Nudge the knee coefficients before a second fit attempt.
    pub fn setup_retry(&mut self) {
        let beta = self.params.get(ParameterId::Beta);
        self.params.set(ParameterId::Beta, beta / 1.1);

        let gamma = self.params.get(ParameterId::Gamma);
        if gamma < 1.3 {
            self.params.set(ParameterId::Gamma, gamma * 1.1);
        } else if gamma < 1.7 {
            self.params.set(ParameterId::Gamma, gamma * 0.9);
        }
    }

    fn currents(p: &ParameterSet, va: f64, vg1: f64, vg2: f64) -> (f64, f64) {
        let t = TriodeTerms::from_set(p);
        let pt = PentodeTerms::from_set(p);
        let epk = cohen_helie_epk(&t, vg2.max(0.1), vg1);
        let g = gardiner_knee(&pt, va, vg1);
        let ia = pentode_anode_current(t.kg1, pt.kg2, pt.a, epk, g, va);
        let ig2 = pentode_screen_current(t.kg1, pt.a, epk, va, ia);
        (ia, ig2)
    }
}

impl DeviceModel for GardinerPentode {
    fn kind(&self) -> ModelKind {
        ModelKind::GardinerPentode
    }

    fn parameter_ids(&self) -> &'static [ParameterId] {
        PENTODE_PARAMETERS
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
        Self::currents(&self.params, va, vg1, vg2).0
    }

    fn screen_current(&self, va: f64, vg1: f64, vg2: f64, _secondary_emission: bool) -> f64 {
        Self::currents(&self.params, va, vg1, vg2).1
    }

    fn solve(&mut self) -> FitReport {
        let samples = self.state.samples();
        let report = fit_parameters(
            &mut self.params,
            PENTODE_PARAMETERS,
            samples.len(),
            &self.state.config,
            |p, r| {
                for (ri, s) in r.iter_mut().zip(samples) {
                    *ri = s.ia - Self::currents(p, s.va, s.vg1, s.vg2).0;
                }
            },
        );
        self.state.set_report(report);
        report
    }
}
