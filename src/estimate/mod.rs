//! Seed estimation ahead of the nonlinear fit.
//!
//! Nonlinear least squares over five to fourteen coefficients is not
//! globally convergent, so every fit starts from seeds computed here with
//! interpolation and linear regression on the raw sweeps:
//!
//! - Triodes: mu from adjacent-sweep spacing at a small current, Kg1 and x
//!   from a log-log regression at high current, Kp from the cut-off knee,
//!   and optionally Kvb/Kvb1 from a quadratic regression.
//! - Pentodes: the triode coefficients of a prior triode fit (or measurement
//!   heuristics without one), Kg2 from the screen current at high Va, and
//!   secondary-emission geometry from the screen share of cathode current.
//!
//! Every seed is clamped to a sane range before it reaches a model.

mod interpolate;
mod pentode;
mod triode;

pub use interpolate::{find_ia, find_ig2, find_va};

use tracing::{info, warn};

use crate::data::Measurement;
use crate::error::{Result, TubeError};
use crate::models::{DeviceModel, DeviceType, Model, ModelKind, ParameterId, ParameterSet};

/// Options for [`Estimator`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EstimateConfig {
    /// Refine Kvb and Kvb1 with a quadratic regression.
    pub estimate_kvb: bool,
    /// Seed and enable secondary emission on beam-tetrode models.
    pub secondary_emission: bool,
}

impl EstimateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_estimate_kvb(mut self, enabled: bool) -> Self {
        self.estimate_kvb = enabled;
        self
    }

    pub fn with_secondary_emission(mut self, enabled: bool) -> Self {
        self.secondary_emission = enabled;
        self
    }
}

/// Seed values for every coefficient.
#[derive(Debug, Clone)]
pub struct Estimator {
    pub config: EstimateConfig,
    seeds: ParameterSet,
}

impl Default for Estimator {
    fn default() -> Self {
        Self::new(EstimateConfig::default())
    }
}

impl Estimator {
    pub fn new(config: EstimateConfig) -> Self {
        let seeds = ParameterSet::with_values(&[
            (ParameterId::Mu, 40.0),
            (ParameterId::Kg1, 0.5),
            (ParameterId::X, 1.4),
            (ParameterId::Kp, 500.0),
            (ParameterId::Kvb, 300.0),
            (ParameterId::Kvb1, 10.0),
            (ParameterId::Vct, 0.2),
            (ParameterId::Kg2, 2.0),
            (ParameterId::A, 0.0),
            (ParameterId::Alpha, 0.1),
            (ParameterId::Beta, 0.05),
            (ParameterId::Gamma, 1.0),
            (ParameterId::Psi, 3.5),
            (ParameterId::Omega, 200.0),
            (ParameterId::Lambda, 50.0),
            (ParameterId::Nu, 20.0),
            (ParameterId::S, 0.01),
            (ParameterId::Ap, 0.03),
        ]);
        Self { config, seeds }
    }

    pub fn seeds(&self) -> &ParameterSet {
        &self.seeds
    }

    pub fn value(&self, id: ParameterId) -> f64 {
        self.seeds.get(id)
    }

    fn set(&mut self, id: ParameterId, value: f64) {
        if value.is_finite() {
            self.seeds.set(id, value);
        }
    }

    /// Seed a model of `kind` from `measurement`.
    ///
    /// Pentode kinds fall back to measurement heuristics for their triode
    /// coefficients; use [`Estimator::estimate_with_triode`] to carry them
    /// over from a fitted triode instead.
    pub fn estimate(&mut self, measurement: &Measurement, kind: ModelKind) -> Result<Model> {
        check_samples(measurement)?;
        match kind.device_type() {
            DeviceType::Triode => {
                if measurement.device_type != DeviceType::Triode {
                    return Err(TubeError::invalid_measurement(format!(
                        "{} model needs triode data, got {}",
                        kind, measurement.device_type
                    )));
                }
                self.estimate_triode(measurement);
            }
            DeviceType::Pentode => {
                if kind.fixes_triode_terms() {
                    warn!(
                        model = %kind,
                        "no fitted triode given, triode coefficients seeded from heuristics and held fixed"
                    );
                }
                self.estimate_pentode(measurement, None);
            }
        }
        Ok(self.build(kind))
    }

    /// Seed a pentode model of `kind`, taking the triode coefficients from
    /// an already fitted triode.
    pub fn estimate_with_triode(
        &mut self,
        measurement: &Measurement,
        kind: ModelKind,
        triode: &dyn DeviceModel,
    ) -> Result<Model> {
        check_samples(measurement)?;
        if kind.device_type() != DeviceType::Pentode {
            return Err(TubeError::invalid_measurement(format!(
                "{} is not a pentode model",
                kind
            )));
        }
        self.estimate_pentode(measurement, Some(triode));
        Ok(self.build(kind))
    }

    fn build(&self, kind: ModelKind) -> Model {
        let mut model = Model::new(kind);
        model.from_parameters(&self.seeds);
        model.parameters_mut().clamp_all();
        if kind == ModelKind::ExtractDerkE {
            model.set_secondary_emission(self.config.secondary_emission);
        }
        info!(
            model = %kind,
            mu = model.value(ParameterId::Mu),
            kg1 = model.value(ParameterId::Kg1),
            x = model.value(ParameterId::X),
            kp = model.value(ParameterId::Kp),
            "seeded model"
        );
        model
    }
}

fn check_samples(measurement: &Measurement) -> Result<()> {
    let found = measurement.sample_count();
    if found < 2 {
        return Err(TubeError::InsufficientSamples { required: 2, found });
    }
    Ok(())
}

fn clamp(value: f64, lower: f64, upper: f64) -> f64 {
    value.clamp(lower.min(upper), lower.max(upper))
}
