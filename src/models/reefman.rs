//! Reefman pentodes (Derk and Derk-E) on the Cohen-Helie cathode term.
//!
//! ```text
//! Epk   = cohen_helie_epk(Vg2, Vg1)
//! k     = 1/Kg1 − 1/Kg2
//! Derk:   g = 1/(1 + (Beta·(1 − Alpha·Vg1)·Va)^Gamma)
//! Derk-E: g = exp(−(Beta·Va)^1.5)
//! Ia    = Epk·(k·(1−g) + A·Va/Kg1)
//! Ig2   = Epk·(1 + A·Va)/Kg1 − Ia
//! ```
//!
//! The triode coefficients come from a prior triode fit and stay fixed;
//! only the screen-partition coefficients are fitted.

use crate::solver::FitReport;

use super::cohen_helie::apply_cohen_helie_bounds;
use super::equations::{
    cohen_helie_epk, derk_e_knee, derk_knee, pentode_anode_current, pentode_screen_current,
    PentodeTerms, TriodeTerms,
};
use super::fit::{fit_parameters, FitState};
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
    ParameterId::Kg2,
    ParameterId::A,
    ParameterId::Alpha,
    ParameterId::Beta,
    ParameterId::Gamma,
];

const TRIODE_CONSTANTS: &[ParameterId] = &[
    ParameterId::Mu,
    ParameterId::Kg1,
    ParameterId::X,
    ParameterId::Kp,
    ParameterId::Kvb,
    ParameterId::Kvb1,
    ParameterId::Vct,
];

const DERK_FREE: &[ParameterId] = &[
    ParameterId::Kg2,
    ParameterId::A,
    ParameterId::Alpha,
    ParameterId::Beta,
    ParameterId::Gamma,
];

/// Alpha has no effect on the Derk-E knee but stays in the free set so
/// both variants share one parameter list.
const DERK_E_FREE: &[ParameterId] = &[
    ParameterId::Kg2,
    ParameterId::A,
    ParameterId::Alpha,
    ParameterId::Beta,
];

/// Knee shape of a Reefman pentode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerkVariant {
    Derk,
    DerkE,
}

impl DerkVariant {
    pub fn tag(self) -> &'static str {
        match self {
            DerkVariant::Derk => "derk",
            DerkVariant::DerkE => "derkE",
        }
    }
}

/// Reefman Derk / Derk-E pentode.
#[derive(Debug, Clone)]
pub struct ReefmanPentode {
    variant: DerkVariant,
    params: ParameterSet,
    state: FitState,
}

impl ReefmanPentode {
    pub fn new(variant: DerkVariant) -> Self {
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
            (ParameterId::Alpha, 0.0),
            (ParameterId::Beta, 0.05),
            (ParameterId::Gamma, 1.0),
        ]);
        apply_cohen_helie_bounds(&mut params);
        params.set_bounds(ParameterId::Kg2, Bounds::at_least(0.05));
        params.set_bounds(ParameterId::A, Bounds::at_least(0.0));
        params.set_bounds(ParameterId::Alpha, Bounds::at_least(0.0));
        params.set_bounds(ParameterId::Beta, Bounds::new(0.01, 0.5));
        params.set_bounds(ParameterId::Gamma, Bounds::new(0.5, 2.0));
        for &id in TRIODE_CONSTANTS {
            params.set_fixed(id, true);
        }

        Self {
            variant,
            params,
            state: FitState::default(),
        }
    }

    pub fn variant(&self) -> DerkVariant {
        self.variant
    }

    /// Adopt the triode coefficients of a fitted triode model.
    pub fn seed_from_triode(&mut self, triode: &dyn DeviceModel) {
        for &id in TRIODE_CONSTANTS {
            self.params.set(id, triode.value(id));
        }
    }

    fn currents(variant: DerkVariant, p: &ParameterSet, va: f64, vg1: f64, vg2: f64) -> (f64, f64) {
        let t = TriodeTerms::from_set(p);
        let pt = PentodeTerms::from_set(p);
        let epk = cohen_helie_epk(&t, vg2.max(0.1), vg1);
        let g = match variant {
            DerkVariant::Derk => derk_knee(&pt, va, vg1),
            DerkVariant::DerkE => derk_e_knee(pt.beta, va),
        };
        let ia = pentode_anode_current(t.kg1, pt.kg2, pt.a, epk, g, va);
        let ig2 = pentode_screen_current(t.kg1, pt.a, epk, va, ia);
        (ia, ig2)
    }
}

impl DeviceModel for ReefmanPentode {
    fn kind(&self) -> ModelKind {
        match self.variant {
            DerkVariant::Derk => ModelKind::ReefmanDerk,
            DerkVariant::DerkE => ModelKind::ReefmanDerkE,
        }
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
        Self::currents(self.variant, &self.params, va, vg1, vg2).0
    }

    fn screen_current(&self, va: f64, vg1: f64, vg2: f64, _secondary_emission: bool) -> f64 {
        Self::currents(self.variant, &self.params, va, vg1, vg2).1
    }

    fn solve(&mut self) -> FitReport {
        let variant = self.variant;
        let free = match variant {
            DerkVariant::Derk => DERK_FREE,
            DerkVariant::DerkE => DERK_E_FREE,
        };
        let samples = self.state.samples();
        let report = fit_parameters(
            &mut self.params,
            free,
            samples.len(),
            &self.state.config,
            |p, r| {
                for (ri, s) in r.iter_mut().zip(samples) {
                    *ri = s.ia - Self::currents(variant, p, s.va, s.vg1, s.vg2).0;
                }
            },
        );
        self.state.set_report(report);
        report
    }
}
