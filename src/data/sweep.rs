//! Measured samples and sweeps.

use serde::{Deserialize, Serialize};

/// One measured operating point. Voltages in volts, currents in mA.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sample {
    pub va: f64,
    pub ia: f64,
    pub vg1: f64,
    pub vg2: f64,
    pub ig2: f64,
    /// Heater voltage.
    pub vh: f64,
    /// Heater current.
    pub ih: f64,
}

impl Sample {
    /// Sample with no heater readings.
    pub fn new(va: f64, vg1: f64, vg2: f64, ia: f64, ig2: f64) -> Self {
        Self {
            va,
            ia,
            vg1,
            vg2,
            ig2,
            vh: 0.0,
            ih: 0.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.va.is_finite()
            && self.ia.is_finite()
            && self.vg1.is_finite()
            && self.vg2.is_finite()
            && self.ig2.is_finite()
    }
}

/// Samples taken at fixed nominal grid (and screen) voltages while Va varies.
///
/// Samples are expected in increasing Va; the interpolation helpers rely
/// on it but nothing here enforces it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sweep {
    pub va_nominal: f64,
    pub vg1_nominal: f64,
    pub vg2_nominal: f64,
    pub samples: Vec<Sample>,
}

impl Sweep {
    pub fn new(vg1_nominal: f64, vg2_nominal: f64) -> Self {
        Self {
            vg1_nominal,
            vg2_nominal,
            ..Self::default()
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Largest anode current in the sweep, or 0 when empty.
    pub fn max_ia(&self) -> f64 {
        self.samples.iter().map(|s| s.ia).fold(0.0, f64::max)
    }
}
