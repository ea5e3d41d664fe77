//! Simple power-law triode.
//!
//! ```text
//! Ia = (Va/mu + Vg1 + Vct)^x / Kg1     when the base is positive, else 0
//! ```

use crate::solver::FitReport;

use super::equations::{simple_current, TriodeTerms};
use super::fit::{fit_parameters, FitState};
use super::parameter::{Bounds, ParameterId, ParameterSet};
use super::{DeviceModel, ModelKind};

const PARAMETERS: &[ParameterId] = &[
    ParameterId::Mu,
    ParameterId::Kg1,
    ParameterId::X,
    ParameterId::Vct,
];

/// Power-law triode with a grid offset.
#[derive(Debug, Clone)]
pub struct SimpleTriode {
    params: ParameterSet,
    state: FitState,
}

impl Default for SimpleTriode {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleTriode {
    pub fn new() -> Self {
        let mut params = ParameterSet::with_values(&[
            (ParameterId::Kg1, 0.7),
            (ParameterId::Vct, 0.1),
            (ParameterId::X, 1.5),
            (ParameterId::Mu, 100.0),
        ]);
        params.set_bounds(ParameterId::Kg1, Bounds::at_least(1e-7));
        params.set_bounds(ParameterId::X, Bounds::new(1.0, 2.0));
        params.set_bounds(ParameterId::Mu, Bounds::new(1.0, 1000.0));
        params.set_bounds(ParameterId::Vct, Bounds::new(-2.0, 2.0));

        Self {
            params,
            state: FitState::default(),
        }
    }
}

impl DeviceModel for SimpleTriode {
    fn kind(&self) -> ModelKind {
        ModelKind::Simple
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
        simple_current(&TriodeTerms::from_set(&self.params), va, vg1)
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
                    *ri = s.ia - simple_current(&t, s.va, s.vg1);
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

    #[test]
    fn test_defaults() {
        let m = SimpleTriode::new();
        assert_relative_eq!(m.value(ParameterId::Kg1), 0.7);
        assert_relative_eq!(m.value(ParameterId::Vct), 0.1);
        assert_relative_eq!(m.value(ParameterId::X), 1.5);
        assert_relative_eq!(m.value(ParameterId::Mu), 100.0);
    }

    #[test]
    fn test_fit_recovers_parameters() {
        let mut truth = SimpleTriode::new();
        truth.parameters_mut().set(ParameterId::Mu, 20.0);
        truth.parameters_mut().set(ParameterId::Kg1, 2.0);
        truth.parameters_mut().set(ParameterId::X, 1.4);
        truth.parameters_mut().set(ParameterId::Vct, 0.3);

        let mut model = SimpleTriode::new();
        model.parameters_mut().set(ParameterId::Mu, 25.0);
        model.parameters_mut().set(ParameterId::Kg1, 1.5);
        for vg1 in [0.0, -2.0, -4.0, -6.0] {
            for step in 1..=12 {
                let va = step as f64 * 25.0;
                let ia = truth.anode_current(va, vg1, 0.0);
                if ia > 0.0 {
                    model.add_sample(va, ia, vg1, 0.0, 0.0);
                }
            }
        }

        let report = model.solve();
        assert!(report.converged);
        assert!(model.converged());
        assert_relative_eq!(model.value(ParameterId::Mu), 20.0, max_relative = 1e-4);
        assert_relative_eq!(model.value(ParameterId::X), 1.4, max_relative = 1e-4);
    }

    #[test]
    fn test_clear_samples_resets_fit() {
        let mut model = SimpleTriode::new();
        model.add_sample(100.0, 1.0, 0.0, 0.0, 0.0);
        model.clear_samples();
        assert!(model.fit_state().samples().is_empty());
        assert!(!model.solve().converged);
    }
}
