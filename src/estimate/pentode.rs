//! Pentode seed estimation.

use tracing::info;

use crate::data::{Measurement, Sweep};
use crate::models::equations::{cohen_helie_epk, TriodeTerms};
use crate::models::{DeviceModel, ParameterId};

use super::{clamp, Estimator};

/// Screen voltage assumed when no sweep names one.
const DEFAULT_SCREEN_VOLTAGE: f64 = 250.0;

/// Grid voltage assumed when no sweep names one.
const DEFAULT_GRID_VOLTAGE: f64 = -20.0;

/// Last sample of one sweep.
#[derive(Debug, Clone, Copy)]
struct SweepTail {
    vg1_nominal: f64,
    vg2_nominal: f64,
    va: f64,
    ia: f64,
    ig2: f64,
}

fn tails(measurement: &Measurement) -> Vec<SweepTail> {
    measurement
        .sweeps()
        .iter()
        .filter_map(|sweep: &Sweep| {
            sweep.last().map(|s| SweepTail {
                vg1_nominal: sweep.vg1_nominal,
                vg2_nominal: sweep.vg2_nominal,
                va: s.va,
                ia: s.ia,
                ig2: s.ig2,
            })
        })
        .collect()
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(values[values.len() / 2])
}

/// Median of the positive nominal screen voltages.
fn reference_vg2(tails: &[SweepTail]) -> f64 {
    let values = tails
        .iter()
        .map(|t| t.vg2_nominal)
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    median(values).unwrap_or(DEFAULT_SCREEN_VOLTAGE)
}

/// Most negative grid voltage, treating every nominal as a bias magnitude.
fn most_negative_vg1(tails: &[SweepTail]) -> f64 {
    tails
        .iter()
        .map(|t| t.vg1_nominal)
        .filter(|v| v.is_finite())
        .map(|v| -v.abs())
        .reduce(f64::min)
        .unwrap_or(DEFAULT_GRID_VOLTAGE)
}

/// Anode and screen current at the highest anode voltage reached.
fn high_va_currents(tails: &[SweepTail]) -> Option<(f64, f64)> {
    tails
        .iter()
        .max_by(|a, b| a.va.total_cmp(&b.va))
        .map(|t| (t.ia, t.ig2))
}

impl Estimator {
    /// Seed every pentode coefficient.
    ///
    /// With a fitted triode its coefficients become the triode seeds and
    /// Kg2 follows from the triode cathode term; without one the seeds
    /// come from heuristics on the sweep voltages and currents.
    pub fn estimate_pentode(&mut self, measurement: &Measurement, triode: Option<&dyn DeviceModel>) {
        let tails = tails(measurement);
        let vg2_ref = reference_vg2(&tails);
        let vg1_min = most_negative_vg1(&tails);
        let high = high_va_currents(&tails);

        match triode {
            None => self.seed_from_heuristics(vg2_ref, vg1_min, high),
            Some(triode) => self.seed_from_triode(measurement, triode, &tails),
        }

        self.clamp_pentode_seeds();
        info!(
            vg2_ref,
            vg1_min,
            mu = self.value(ParameterId::Mu),
            x = self.value(ParameterId::X),
            kg1 = self.value(ParameterId::Kg1),
            kg2 = self.value(ParameterId::Kg2),
            kp = self.value(ParameterId::Kp),
            kvb = self.value(ParameterId::Kvb),
            kvb1 = self.value(ParameterId::Kvb1),
            vct = self.value(ParameterId::Vct),
            "pentode seed"
        );
        info!(
            a = self.value(ParameterId::A),
            beta = self.value(ParameterId::Beta),
            gamma = self.value(ParameterId::Gamma),
            s = self.value(ParameterId::S),
            ap = self.value(ParameterId::Ap),
            "pentode seed (screen)"
        );
    }

    fn seed_from_heuristics(&mut self, vg2_ref: f64, vg1_min: f64, high: Option<(f64, f64)>) {
        let bias = vg1_min.abs();
        let kg1 = clamp((bias + 3.0) * 0.08, 0.2, 1.5);

        self.set(ParameterId::Mu, clamp(bias * 0.6 + 6.0, 5.0, 18.0));
        self.set(ParameterId::X, clamp(1.3 + 0.02 * bias, 1.2, 1.6));
        self.set(ParameterId::Kg1, kg1);
        self.set(ParameterId::Kp, clamp(vg2_ref * 0.7, 40.0, 300.0));
        self.set(ParameterId::Kvb, clamp(vg2_ref, 60.0, 400.0));
        self.set(ParameterId::Kvb1, clamp(vg2_ref / 20.0, 4.0, 25.0));
        self.set(ParameterId::Vct, clamp(-0.01 * vg1_min, 0.0, 1.0));

        let kg2 = match high {
            Some((ia, ig2)) if ig2 > 1e-6 => ia / ig2 * 0.5,
            _ => kg1 * 5.0,
        };
        self.set(ParameterId::Kg2, clamp(kg2, 0.1, 15.0));

        self.set(ParameterId::A, clamp(0.005 + 0.001 * bias, 0.0, 0.05));
        self.set(ParameterId::Beta, clamp(0.08 + 0.002 * bias, 0.02, 0.25));
        self.set(ParameterId::Gamma, clamp(1.2 - 0.01 * bias, 0.7, 1.5));

        let (psi, s) = match high {
            Some((ia, ig2)) => (ig2 / ia.max(1e-6), (ia - ig2) * 0.002),
            None => (3.0, 5.0 * 0.002),
        };
        self.set(ParameterId::Psi, clamp(psi, 0.5, 6.0));
        self.set(ParameterId::Omega, 200.0);
        self.set(ParameterId::Lambda, 50.0);
        self.set(ParameterId::Nu, 20.0);
        self.set(ParameterId::S, clamp(s, 0.0, 0.5));
        self.set(ParameterId::Ap, 0.015);
    }

    fn seed_from_triode(&mut self, measurement: &Measurement, triode: &dyn DeviceModel, tails: &[SweepTail]) {
        for id in [
            ParameterId::Mu,
            ParameterId::X,
            ParameterId::Kg1,
            ParameterId::Kp,
            ParameterId::Kvb,
            ParameterId::Kvb1,
            ParameterId::Vct,
        ] {
            self.set(id, triode.value(id));
        }
        self.set(ParameterId::A, 0.0);
        self.set(ParameterId::Beta, 0.1);
        self.set(ParameterId::Gamma, 1.0);

        // Epk is linear in 1/Kg2 once the knee has closed at high Va.
        let terms = TriodeTerms::from_set(triode.parameters());
        let anode_stop = measurement.anode_stop;
        let (epk_sum, ig2_sum) = tails
            .iter()
            .filter(|t| t.va >= 0.8 * anode_stop)
            .map(|t| (cohen_helie_epk(&terms, t.vg2_nominal, t.vg1_nominal), t.ig2))
            .filter(|(epk, ig2)| epk.is_finite() && *epk > 1e-9 && ig2.is_finite() && *ig2 > 1e-6)
            .fold((0.0, 0.0), |(e, i), (epk, ig2)| (e + epk, i + ig2));
        let kg2 = if ig2_sum > 1e-6 {
            epk_sum / ig2_sum
        } else {
            self.value(ParameterId::Kg1) * 5.0
        };
        self.set(ParameterId::Kg2, clamp(kg2, 0.1, 15.0));

        if self.config.secondary_emission {
            let ratios: Vec<f64> = tails
                .iter()
                .filter(|t| t.va >= 0.3 * anode_stop && t.ia.is_finite() && t.ig2.is_finite())
                .filter(|t| t.ia + t.ig2 > 1e-6)
                .map(|t| t.ig2 / (t.ia + t.ig2))
                .collect();
            let ratio = if ratios.is_empty() {
                0.02
            } else {
                ratios.iter().sum::<f64>() / ratios.len() as f64
            };
            self.set(ParameterId::S, clamp(ratio * 0.5, 0.0, 0.5));
            self.set(ParameterId::Ap, clamp(0.01 + ratio * 0.02, 0.005, 0.05));
            self.set(ParameterId::Omega, clamp(150.0 + ratio * 400.0, 50.0, 600.0));
            self.set(ParameterId::Lambda, clamp(40.0 + ratio * 120.0, 10.0, 200.0));
            self.set(ParameterId::Nu, clamp(15.0 + ratio * 40.0, 5.0, 80.0));
        }
    }

    fn clamp_pentode_seeds(&mut self) {
        const RANGES: [(ParameterId, f64, f64); 17] = [
            (ParameterId::Mu, 3.0, 25.0),
            (ParameterId::X, 1.1, 1.8),
            (ParameterId::Kg1, 0.05, 5.0),
            (ParameterId::Kp, 20.0, 400.0),
            (ParameterId::Kvb, 50.0, 600.0),
            (ParameterId::Kvb1, 1.0, 40.0),
            (ParameterId::Vct, 0.0, 3.0),
            (ParameterId::Kg2, 0.1, 20.0),
            (ParameterId::A, 0.0, 0.05),
            (ParameterId::Beta, 0.01, 0.3),
            (ParameterId::Gamma, 0.5, 2.0),
            (ParameterId::Psi, 0.5, 8.0),
            (ParameterId::Omega, 10.0, 800.0),
            (ParameterId::Lambda, 5.0, 250.0),
            (ParameterId::Nu, 0.0, 120.0),
            (ParameterId::S, 0.0, 1.0),
            (ParameterId::Ap, 0.0, 0.2),
        ];
        for (id, lower, upper) in RANGES {
            let value = clamp(self.value(id), lower, upper);
            self.set(id, value);
        }
    }
}
