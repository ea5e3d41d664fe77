//! Koren triode.
//!
//! ```text
//! E1 = (Va/Kp) · ln(1 + exp(Kp·(1/mu + Vg1/sqrt(Kvb + Va²))))
//! Ia = E1^x / Kg1
//! ```

use crate::solver::FitReport;

use super::equations::{koren_current, TriodeTerms};
use super::fit::{fit_staged, FitState};
use super::parameter::{Bounds, ParameterId, ParameterSet};
use super::{DeviceModel, ModelKind};

const PARAMETERS: &[ParameterId] = &[
    ParameterId::Mu,
    ParameterId::Kg1,
    ParameterId::X,
    ParameterId::Kp,
    ParameterId::Kvb,
];

/// Written to JSON. Vct is stored but the Koren equation never reads it.
const JSON_PARAMETERS: &[ParameterId] = &[
    ParameterId::Mu,
    ParameterId::Kg1,
    ParameterId::X,
    ParameterId::Kp,
    ParameterId::Kvb,
    ParameterId::Vct,
];

/// Shape first, then the knee, then the grid-field term.
const STAGES: &[&[ParameterId]] = &[
    &[ParameterId::Mu, ParameterId::Kg1, ParameterId::X],
    &[ParameterId::Mu, ParameterId::Kg1, ParameterId::X, ParameterId::Kp],
    PARAMETERS,
];

/// Koren's triode equation.
#[derive(Debug, Clone)]
pub struct KorenTriode {
    params: ParameterSet,
    state: FitState,
}

impl Default for KorenTriode {
    fn default() -> Self {
        Self::new()
    }
}

impl KorenTriode {
    pub fn new() -> Self {
        let mut params = ParameterSet::with_values(&[
            (ParameterId::Mu, 100.0),
            (ParameterId::Kg1, 1000.0),
            (ParameterId::X, 1.4),
            (ParameterId::Kp, 100.0),
            (ParameterId::Kvb, 300.0),
            (ParameterId::Vct, 0.1),
        ]);
        apply_koren_bounds(&mut params);

        Self {
            params,
            state: FitState::default(),
        }
    }
}

/// Bounds shared by every Koren-derived triode.
pub(crate) fn apply_koren_bounds(params: &mut ParameterSet) {
    params.set_bounds(ParameterId::Kg1, Bounds::at_least(1e-7));
    params.set_bounds(ParameterId::X, Bounds::new(1.0, 2.0));
    params.set_bounds(ParameterId::Mu, Bounds::new(1.0, 1000.0));
    params.set_bounds(ParameterId::Kp, Bounds::new(1.0, 10000.0));
    params.set_bounds(ParameterId::Kvb, Bounds::new(0.1, 10000.0));
}

impl DeviceModel for KorenTriode {
    fn kind(&self) -> ModelKind {
        ModelKind::Koren
    }

    fn parameter_ids(&self) -> &'static [ParameterId] {
        PARAMETERS
    }

    fn json_ids(&self) -> &'static [ParameterId] {
        JSON_PARAMETERS
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
        koren_current(&TriodeTerms::from_set(&self.params), va, vg1)
    }

    fn solve(&mut self) -> FitReport {
        let samples = self.state.samples();
        let report = fit_staged(
            &mut self.params,
            STAGES,
            samples.len(),
            &self.state.config,
            |p, r| {
                let t = TriodeTerms::from_set(p);
                for (ri, s) in r.iter_mut().zip(samples) {
                    *ri = s.ia - koren_current(&t, s.va, s.vg1);
                }
            },
        );
        self.state.set_report(report);
        report
    }
}
