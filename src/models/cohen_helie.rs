//! Cohen-Helie triode: Koren with a tilted denominator and grid offset.
//!
//! ```text
//! f  = sqrt(Kvb + Va·Kvb1 + Va²)
//! Ep = (Va/Kp) · ln(1 + exp(Kp·(1/mu + (Vg1+Vct)/f)))
//! Ia = Ep^x / Kg1
//! ```

use crate::solver::FitReport;

use super::equations::{cohen_helie_current, TriodeTerms};
use super::fit::{fit_parameters, FitState};
use super::koren::apply_koren_bounds;
use super::parameter::{Bounds, ParameterId, ParameterSet};
use super::{DeviceModel, ModelKind};

const PARAMETERS: &[ParameterId] = &[
    ParameterId::Mu,
    ParameterId::Kg1,
    ParameterId::X,
    ParameterId::Kp,
    ParameterId::Kvb,
    ParameterId::Kvb1,
    ParameterId::Vct,
];

/// Cohen-Helie triode; also the triode stage of the Reefman pentodes.
#[derive(Debug, Clone)]
pub struct CohenHelieTriode {
    params: ParameterSet,
    state: FitState,
}

impl Default for CohenHelieTriode {
    fn default() -> Self {
        Self::new()
    }
}

impl CohenHelieTriode {
    pub fn new() -> Self {
        let mut params = ParameterSet::with_values(&[
            (ParameterId::Mu, 100.0),
            (ParameterId::Kg1, 1000.0),
            (ParameterId::X, 1.4),
            (ParameterId::Kp, 100.0),
            (ParameterId::Kvb, 300.0),
            (ParameterId::Kvb1, 30.0),
            (ParameterId::Vct, 0.2),
        ]);
        apply_cohen_helie_bounds(&mut params);

        Self {
            params,
            state: FitState::default(),
        }
    }
}

pub(crate) fn apply_cohen_helie_bounds(params: &mut ParameterSet) {
    apply_koren_bounds(params);
    params.set_bounds(ParameterId::Kvb1, Bounds::new(0.1, 1000.0));
    params.set_bounds(ParameterId::Vct, Bounds::new(0.0, 2.0));
}

impl DeviceModel for CohenHelieTriode {
    fn kind(&self) -> ModelKind {
        ModelKind::CohenHelie
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

    fn anode_current(&self, va: f64, vg1: f64, _vg2: f64) -> f64 {
        cohen_helie_current(&TriodeTerms::from_set(&self.params), va, vg1)
    }

    fn solve(&mut self) -> FitReport {
        let samples = self.state.samples();
        let report = fit_parameters(
            &mut self.params,
            PARAMETERS,
            samples.len(),
            &self.state.config,
            |p, r| {
                let t = TriodeTerms::from_set(p);
                for (ri, s) in r.iter_mut().zip(samples) {
                    *ri = s.ia - cohen_helie_current(&t, s.va, s.vg1);
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

    fn tube() -> CohenHelieTriode {
        let mut m = CohenHelieTriode::new();
        let p = m.parameters_mut();
        p.set(ParameterId::Mu, 35.0);
        p.set(ParameterId::Kg1, 1.2);
        p.set(ParameterId::X, 1.35);
        p.set(ParameterId::Kp, 300.0);
        p.set(ParameterId::Kvb, 300.0);
        p.set(ParameterId::Kvb1, 20.0);
        p.set(ParameterId::Vct, 0.3);
        m
    }

    #[test]
    fn test_non_negative_at_pathological_inputs() {
        let m = tube();
        for &(va, vg1) in &[(0.0, 50.0), (0.0, -50.0), (-100.0, 0.0), (1e6, 50.0), (400.0, -1e6)] {
            let i = m.anode_current(va, vg1, 0.0);
            assert!(i.is_finite());
            assert!(i >= 0.0);
        }
    }

    #[test]
    fn test_refit_after_clear() {
        let truth = tube();
        let mut model = tube();
        model.parameters_mut().set(ParameterId::Mu, 30.0);
        model.parameters_mut().set(ParameterId::Kg1, 1.0);

        for vg1 in [0.0, -1.0, -2.0, -4.0, -6.0] {
            for step in 1..=10 {
                let va = step as f64 * 30.0;
                model.add_sample(va, truth.anode_current(va, vg1, 0.0), vg1, 0.0, 0.0);
            }
        }
        let first = model.solve();
        assert!(first.converged);
        let mu = model.value(ParameterId::Mu);

        model.clear_samples();
        assert!(!model.converged());
        for vg1 in [0.0, -2.0, -4.0] {
            for step in 1..=10 {
                let va = step as f64 * 30.0;
                model.add_sample(va, truth.anode_current(va, vg1, 0.0), vg1, 0.0, 0.0);
            }
        }
        let second = model.solve();
        assert!(second.converged);
        assert_relative_eq!(model.value(ParameterId::Mu), mu, max_relative = 0.05);
    }
}
