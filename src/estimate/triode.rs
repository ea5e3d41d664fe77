//! Triode seed estimation.

use tracing::debug;

use crate::data::{Measurement, TestType};
use crate::models::{DeviceType, ParameterId};
use crate::solver::{LinearSolver, QuadraticSolver};

use super::{clamp, find_ia, find_va, Estimator};

/// Floor of the current at which mu is read off adjacent sweeps.
const MIN_MU_CURRENT: f64 = 1.0;

/// Grid voltages closer to zero than this count as zero bias.
const ZERO_GRID: f64 = 1e-4;

impl Estimator {
    /// Seed mu, Kg1, x and Kp (and optionally Kvb, Kvb1) from triode
    /// anode characteristics.
    pub fn estimate_triode(&mut self, measurement: &Measurement) {
        if measurement.device_type != DeviceType::Triode {
            return;
        }
        let ia_max = if measurement.ia_max > 0.0 {
            measurement.ia_max
        } else {
            measurement.max_ia()
        };

        if measurement.test_type == TestType::AnodeCharacteristics {
            self.estimate_mu(measurement, ia_max);
        }
        self.estimate_kg1_x(measurement, ia_max);
        if measurement.test_type == TestType::AnodeCharacteristics {
            self.estimate_kp(measurement);
        }
        if self.config.estimate_kvb {
            self.estimate_kvb(measurement, ia_max);
        }

        let mu = clamp(self.value(ParameterId::Mu), 1.0, 1000.0);
        let x = clamp(self.value(ParameterId::X), 1.0, 2.0);
        let kg1 = self.value(ParameterId::Kg1).max(1e-7);
        let kp = clamp(self.value(ParameterId::Kp), 1.0, 10000.0);
        self.set(ParameterId::Mu, mu);
        self.set(ParameterId::X, x);
        self.set(ParameterId::Kg1, kg1);
        self.set(ParameterId::Kp, kp);
    }

    /// Mean `ΔVa/ΔVg1` between adjacent sweeps at a small anode current.
    fn estimate_mu(&mut self, measurement: &Measurement, ia_max: f64) {
        let i_mu = (ia_max * 0.05).max(MIN_MU_CURRENT);
        let mut previous: Option<(f64, f64)> = None;
        let mut values = Vec::new();

        for sweep in measurement.sweeps() {
            let va = find_va(sweep, i_mu);
            if va < 0.0 {
                // Later sweeps are cut off further and will not reach it either.
                if previous.is_some() {
                    break;
                }
                continue;
            }

            let vg1 = sweep.vg1_nominal;
            if let Some((va_prev, vg1_prev)) = previous {
                let dvg = vg1_prev - vg1;
                if dvg.abs() > ZERO_GRID {
                    values.push((va - va_prev) / dvg);
                }
            }
            previous = Some((va, vg1));
        }

        let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite() && *v > 0.0).collect();
        if !values.is_empty() {
            let mu = values.iter().sum::<f64>() / values.len() as f64;
            debug!(mu, pairs = values.len(), current = i_mu, "mu estimate");
            self.set(ParameterId::Mu, mu);
        }
    }

    /// `ln(Ia) = x·ln(Va/mu + Vg1) − ln(Kg1)` over high-current samples.
    fn estimate_kg1_x(&mut self, measurement: &Measurement, ia_max: f64) {
        let mu = self.value(ParameterId::Mu);
        let threshold = ia_max * 0.4;
        let mut solver = LinearSolver::new(1.4, 0.5f64.ln());

        for s in measurement.iter_samples() {
            if s.ia > threshold {
                solver.add_sample((s.va / mu + s.vg1).ln(), s.ia.ln());
            }
        }

        if solver.solve() {
            debug!(x = solver.a(), kg1 = (-solver.b()).exp(), "kg1/x estimate");
        }
        self.set(ParameterId::X, solver.a());
        self.set(ParameterId::Kg1, (-solver.b()).exp());
    }

    /// Koren knee: at `Va = −Vg1·mu` the soft exponential is at ln 2.
    fn estimate_kp(&mut self, measurement: &Measurement) {
        let mu = self.value(ParameterId::Mu);
        let kg1 = self.value(ParameterId::Kg1);
        let x = self.value(ParameterId::X);

        let values: Vec<f64> = measurement
            .sweeps()
            .iter()
            .filter(|sweep| sweep.vg1_nominal < -ZERO_GRID)
            .filter_map(|sweep| {
                let vt = -sweep.vg1_nominal * mu;
                let ia = find_ia(sweep, vt);
                (ia > 0.0).then(|| vt * 2f64.ln() / (ia * kg1).powf(1.0 / x))
            })
            .filter(|kp| kp.is_finite())
            .collect();

        if !values.is_empty() {
            let kp = values.iter().sum::<f64>() / values.len() as f64;
            debug!(kp, sweeps = values.len(), "kp estimate");
            self.set(ParameterId::Kp, kp);
        }
    }

    /// `f² = Kvb + Kvb1·Va + Va²` with `f = Vg1/((Ia·Kg1)^(1/x)/Va − 1/mu)`
    /// over low-current samples of biased sweeps.
    fn estimate_kvb(&mut self, measurement: &Measurement, ia_max: f64) {
        let mu = self.value(ParameterId::Mu);
        let kg1 = self.value(ParameterId::Kg1);
        let x = self.value(ParameterId::X);
        let threshold = ia_max * 0.2;

        let mut solver = QuadraticSolver::new(1.0, self.value(ParameterId::Kvb1), self.value(ParameterId::Kvb))
            .with_fixed_a(true)
            .with_require_positive(true);

        for sweep in measurement.sweeps().iter().filter(|s| s.vg1_nominal < -ZERO_GRID) {
            for s in sweep.iter().filter(|s| s.ia > 0.0 && s.ia < threshold) {
                let f = s.vg1 / ((s.ia * kg1).powf(1.0 / x) / s.va - 1.0 / mu);
                solver.add_sample(s.va, f * f);
            }
        }

        if solver.sample_count() > 0 && solver.solve() {
            debug!(kvb = solver.c(), kvb1 = solver.b(), "kvb estimate");
            self.set(ParameterId::Kvb1, solver.b());
            self.set(ParameterId::Kvb, solver.c());
        }
    }
}
