//! A complete test run: sweeps plus the limits it was taken under.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TubeError};
use crate::models::{DeviceModel, DeviceType};

use super::sweep::{Sample, Sweep};

/// What the test run swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestType {
    /// Va swept at fixed Vg1 (and Vg2).
    #[default]
    AnodeCharacteristics,
    /// Vg2 swept at fixed Vg1 and Va.
    ScreenCharacteristics,
    /// Vg1 swept at fixed Va (and Vg2).
    TransferCharacteristics,
}

fn default_device_type() -> DeviceType {
    DeviceType::Triode
}

/// Sweeps of one test run with the run's limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    #[serde(default = "default_device_type")]
    pub device_type: DeviceType,
    #[serde(default)]
    pub test_type: TestType,
    /// Heater voltage.
    #[serde(default)]
    pub vh: f64,
    #[serde(default)]
    pub ia_max: f64,
    #[serde(default)]
    pub pa_max: f64,
    #[serde(default)]
    pub anode_start: f64,
    #[serde(default)]
    pub anode_stop: f64,
    #[serde(default)]
    pub anode_step: f64,
    #[serde(default)]
    pub grid_start: f64,
    #[serde(default)]
    pub grid_stop: f64,
    #[serde(default)]
    pub grid_step: f64,
    #[serde(default)]
    pub screen_start: f64,
    #[serde(default)]
    pub screen_stop: f64,
    #[serde(default)]
    pub screen_step: f64,
    #[serde(default)]
    pub sweeps: Vec<Sweep>,
}

impl Measurement {
    pub fn new(device_type: DeviceType, test_type: TestType) -> Self {
        Self {
            device_type,
            test_type,
            vh: 0.0,
            ia_max: 0.0,
            pa_max: 0.0,
            anode_start: 0.0,
            anode_stop: 0.0,
            anode_step: 0.0,
            grid_start: 0.0,
            grid_stop: 0.0,
            grid_step: 0.0,
            screen_start: 0.0,
            screen_stop: 0.0,
            screen_step: 0.0,
            sweeps: Vec::new(),
        }
    }

    /// Start a new sweep at the given nominal voltages.
    pub fn next_sweep(&mut self, vg1_nominal: f64, vg2_nominal: f64) -> &mut Sweep {
        self.sweeps.push(Sweep::new(vg1_nominal, vg2_nominal));
        let last = self.sweeps.len() - 1;
        &mut self.sweeps[last]
    }

    pub fn push_sweep(&mut self, sweep: Sweep) {
        self.sweeps.push(sweep);
    }

    pub fn sweeps(&self) -> &[Sweep] {
        &self.sweeps
    }

    pub fn iter_samples(&self) -> impl Iterator<Item = &Sample> {
        self.sweeps.iter().flat_map(|s| s.samples.iter())
    }

    pub fn sample_count(&self) -> usize {
        self.sweeps.iter().map(Sweep::len).sum()
    }

    /// Largest measured anode current, or 0 when there are no samples.
    pub fn max_ia(&self) -> f64 {
        self.sweeps.iter().map(Sweep::max_ia).fold(0.0, f64::max)
    }

    /// Feed every finite sample to a model's fitting state. Returns the
    /// number of samples added.
    pub fn add_to_model(&self, model: &mut dyn DeviceModel) -> usize {
        let mut added = 0;
        for s in self.iter_samples().filter(|s| s.is_finite()) {
            model.add_sample(s.va, s.ia, s.vg1, s.vg2, s.ig2);
            added += 1;
        }
        debug!(samples = added, model = %model.kind(), "measurement added to model");
        added
    }

    /// Parse a measurement from a JSON string.
    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| TubeError::invalid_json("measurement", e.to_string()))
    }

    /// Parse a measurement from a JSON value.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Self::deserialize(value).map_err(|e| TubeError::invalid_json("measurement", e.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Model, ModelKind};

    fn measurement() -> Measurement {
        let mut m = Measurement::new(DeviceType::Triode, TestType::AnodeCharacteristics);
        for (vg1, scale) in [(0.0, 1.0), (-2.0, 0.5)] {
            let sweep = m.next_sweep(vg1, 0.0);
            for step in 1..=4 {
                let va = 50.0 * step as f64;
                sweep.push(Sample::new(va, vg1, 0.0, scale * va / 10.0, 0.0));
            }
        }
        m
    }

    #[test]
    fn test_helpers() {
        let m = measurement();
        assert_eq!(m.sample_count(), 8);
        assert_eq!(m.max_ia(), 20.0);
        assert_eq!(m.iter_samples().count(), 8);
    }

    #[test]
    fn test_add_to_model_skips_non_finite() {
        let mut m = measurement();
        m.sweeps[0].push(Sample::new(f64::NAN, 0.0, 0.0, 1.0, 0.0));
        let mut model = Model::new(ModelKind::Koren);
        assert_eq!(m.add_to_model(&mut model), 8);
        assert_eq!(model.fit_state().samples().len(), 8);
    }

    #[test]
    fn test_json_round_trip() {
        let m = measurement();
        let text = m.to_json_string().unwrap();
        assert!(text.contains("\"deviceType\": \"triode\""));
        assert!(text.contains("\"testType\": \"anodeCharacteristics\""));
        assert!(text.contains("\"vg1Nominal\""));
        assert_eq!(Measurement::from_json_str(&text).unwrap(), m);
    }

    #[test]
    fn test_defaults_on_sparse_input() {
        let m = Measurement::from_json_str(r#"{"sweeps": []}"#).unwrap();
        assert_eq!(m.device_type, DeviceType::Triode);
        assert_eq!(m.test_type, TestType::AnodeCharacteristics);
        assert!(Measurement::from_json_str("not json").is_err());
    }
}
