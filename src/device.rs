//! A characterised device: rated limits, a fitted model and, optionally,
//! the measurement it was fitted on.
//!
//! Device documents are JSON objects:
//!
//! ```text
//! {"name": "EL34", "vaMax": 800, "vg1Max": 40, "vg2Max": 500,
//!  "iaMax": 150, "paMax": 25,
//!  "model": {"device": "pentode", "type": "reefman", ...},
//!  "measurement": {...}, "triodeModel": {...}}
//! ```
//!
//! Only `model` is required. Triode models may also use the nested legacy
//! form, whose `vg1Max` is used when the top level does not carry one.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::data::Measurement;
use crate::error::{Result, TubeError};
use crate::estimate::{find_ia, find_ig2};
use crate::models::{nested_vg1_max, DeviceModel, DeviceType, Model};

pub const DEFAULT_VA_MAX: f64 = 400.0;
pub const DEFAULT_VG1_MAX: f64 = 4.0;
pub const DEFAULT_IA_MAX: f64 = 6.0;
pub const DEFAULT_PA_MAX: f64 = 1.25;

/// Screen sweeps further than this from the requested screen voltage are
/// not used for measured bias.
const SCREEN_TOLERANCE: f64 = 25.0;

/// A named device with its rated limits and fitted model.
#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    /// Maximum anode voltage (V).
    pub va_max: f64,
    /// Magnitude of the most negative grid voltage of interest (V).
    pub vg1_max: f64,
    /// Maximum screen voltage (V).
    pub vg2_max: f64,
    /// Maximum anode current (mA).
    pub ia_max: f64,
    /// Maximum anode dissipation (W).
    pub pa_max: f64,
    model: Model,
    measurement: Option<Measurement>,
    triode_model: Option<Model>,
}

impl Device {
    pub fn new(name: impl Into<String>, model: Model) -> Self {
        Self {
            name: name.into(),
            va_max: DEFAULT_VA_MAX,
            vg1_max: DEFAULT_VG1_MAX,
            vg2_max: DEFAULT_VA_MAX,
            ia_max: DEFAULT_IA_MAX,
            pa_max: DEFAULT_PA_MAX,
            model,
            measurement: None,
            triode_model: None,
        }
    }

    /// Builder-style setter for the rated limits.
    pub fn with_limits(mut self, va_max: f64, vg1_max: f64, ia_max: f64, pa_max: f64) -> Self {
        self.va_max = va_max;
        self.vg1_max = vg1_max;
        self.vg2_max = va_max;
        self.ia_max = ia_max;
        self.pa_max = pa_max;
        self
    }

    /// A device whose limits cover `measurement`, which is kept for
    /// measured-bias lookups. Limits the measurement does not reach stay at
    /// their defaults.
    pub fn from_measurement(name: impl Into<String>, model: Model, measurement: Measurement) -> Self {
        let mut device = Self::new(name, model);
        let va_max = measurement
            .iter_samples()
            .map(|s| s.va)
            .fold(measurement.anode_stop, f64::max);
        let vg1_max = measurement
            .sweeps()
            .iter()
            .map(|s| s.vg1_nominal.abs())
            .fold(0.0, f64::max);
        let ia_max = measurement.ia_max.max(measurement.max_ia());

        if va_max > 0.0 {
            device.va_max = va_max;
            device.vg2_max = va_max;
        }
        if vg1_max > 0.0 {
            device.vg1_max = vg1_max;
        }
        if ia_max > 0.0 {
            device.ia_max = ia_max;
        }
        if measurement.pa_max > 0.0 {
            device.pa_max = measurement.pa_max;
        }
        device.measurement = Some(measurement);
        device
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn set_model(&mut self, model: Model) {
        self.model = model;
    }

    pub fn measurement(&self) -> Option<&Measurement> {
        self.measurement.as_ref()
    }

    pub fn set_measurement(&mut self, measurement: Option<Measurement>) {
        self.measurement = measurement;
    }

    /// Triode model the pentode fit was seeded from, if any.
    pub fn triode_model(&self) -> Option<&Model> {
        self.triode_model.as_ref()
    }

    pub fn set_triode_model(&mut self, model: Option<Model>) {
        self.triode_model = model;
    }

    pub fn device_type(&self) -> DeviceType {
        self.model.device_type()
    }

    /// Anode current in mA.
    pub fn anode_current(&self, va: f64, vg1: f64, vg2: f64) -> f64 {
        self.model.anode_current(va, vg1, vg2)
    }

    /// Screen current in mA, with secondary emission as configured on the
    /// model. Always zero for triodes.
    pub fn screen_current(&self, va: f64, vg1: f64, vg2: f64) -> f64 {
        self.model
            .screen_current(va, vg1, vg2, self.model.secondary_emission())
    }

    /// Anode voltage at which the model draws `ia` mA, or
    /// [`NOT_FOUND`](crate::models::NOT_FOUND).
    pub fn anode_voltage(&self, ia: f64, vg1: f64, vg2: f64) -> f64 {
        self.model.anode_voltage(ia, vg1, vg2)
    }

    /// Cathode bias `Vk` and screen current (mA) at which the embedded
    /// measurement draws `target_ia` mA with `Va = vb` and `Vg2 = vs`.
    ///
    /// Reads the anode current of every sweep at `vb`, keeps the sweeps
    /// closest to `vs` (all of them for triodes), and interpolates between
    /// the two grid sweeps that bracket the target. Returns `None` without a
    /// measurement or when no pair of sweeps brackets the target.
    pub fn find_bias_from_measurement(
        &self,
        vb: f64,
        vs: f64,
        target_ia: f64,
    ) -> Option<(f64, f64)> {
        let measurement = self.measurement.as_ref()?;
        if !(vb > 0.0) || !(target_ia > 0.0) {
            return None;
        }

        let pentode = measurement.device_type == DeviceType::Pentode;
        let screen_distance = if pentode {
            measurement
                .sweeps()
                .iter()
                .map(|s| (s.vg2_nominal - vs).abs())
                .fold(f64::INFINITY, f64::min)
        } else {
            0.0
        };
        if screen_distance > SCREEN_TOLERANCE {
            return None;
        }

        // (vk, ia, ig2) per usable sweep.
        let mut points: Vec<(f64, f64, f64)> = measurement
            .sweeps()
            .iter()
            .filter(|s| !pentode || ((s.vg2_nominal - vs).abs() - screen_distance).abs() < 1e-6)
            .filter_map(|s| {
                let ia = find_ia(s, vb);
                if ia < 0.0 {
                    return None;
                }
                let ig2 = if pentode { find_ig2(s, vb).max(0.0) } else { 0.0 };
                Some((-s.vg1_nominal, ia, ig2))
            })
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        for pair in points.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            let (low_ia, high_ia) = (lo.1.min(hi.1), lo.1.max(hi.1));
            if target_ia < low_ia || target_ia > high_ia {
                continue;
            }
            let span = hi.1 - lo.1;
            let t = if span.abs() < 1e-12 {
                0.0
            } else {
                (target_ia - lo.1) / span
            };
            let vk = lo.0 + t * (hi.0 - lo.0);
            let ig2 = lo.2 + t * (hi.2 - lo.2);
            if vk >= 0.0 && vk.is_finite() && ig2.is_finite() {
                debug!(vb, vs, target_ia, vk, ig2, "bias from measurement");
                return Some((vk, ig2));
            }
        }
        None
    }

    /// Parse a device document.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| TubeError::invalid_json("device", "expected an object"))?;
        let model_value = obj
            .get("model")
            .ok_or_else(|| TubeError::missing_field("model", "device"))?;
        let model = Model::from_json(model_value)?;

        let va_max = limit(obj, "vaMax")?.unwrap_or(DEFAULT_VA_MAX);
        let vg1_max = match limit(obj, "vg1Max")? {
            Some(v) => v,
            None => nested_vg1_max(model_value).unwrap_or(DEFAULT_VG1_MAX),
        };

        let measurement = match obj.get("measurement") {
            Some(v) if !v.is_null() => Some(Measurement::from_value(v)?),
            _ => None,
        };
        let triode_model = match obj.get("triodeModel") {
            Some(v) if !v.is_null() => Some(Model::from_json(v)?),
            _ => None,
        };

        Ok(Self {
            name: obj
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            va_max,
            vg1_max,
            vg2_max: limit(obj, "vg2Max")?.unwrap_or(va_max),
            ia_max: limit(obj, "iaMax")?.unwrap_or(DEFAULT_IA_MAX),
            pa_max: limit(obj, "paMax")?.unwrap_or(DEFAULT_PA_MAX),
            model,
            measurement,
            triode_model,
        })
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(input).map_err(|e| TubeError::invalid_json("device", e.to_string()))?;
        Self::from_json(&value)
    }

    /// Read and parse a device file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TubeError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json_str(&content)
    }

    pub fn to_json(&self) -> Result<Value> {
        let mut obj = Map::new();
        obj.insert("name".into(), Value::from(self.name.as_str()));
        obj.insert("vaMax".into(), Value::from(self.va_max));
        obj.insert("vg1Max".into(), Value::from(self.vg1_max));
        obj.insert("vg2Max".into(), Value::from(self.vg2_max));
        obj.insert("iaMax".into(), Value::from(self.ia_max));
        obj.insert("paMax".into(), Value::from(self.pa_max));
        obj.insert("model".into(), self.model.to_json());
        if let Some(measurement) = &self.measurement {
            obj.insert("measurement".into(), serde_json::to_value(measurement)?);
        }
        if let Some(triode) = &self.triode_model {
            obj.insert("triodeModel".into(), triode.to_json());
        }
        Ok(Value::Object(obj))
    }

    /// Write the device document to `path`, pretty-printed.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.to_json()?)?;
        std::fs::write(path, text).map_err(|e| TubeError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
    }
}

fn number(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(Value::as_f64).filter(|v| v.is_finite())
}

/// A rated limit: absent is fine, present must be positive.
fn limit(obj: &Map<String, Value>, key: &str) -> Result<Option<f64>> {
    match number(obj, key) {
        Some(v) if v <= 0.0 => Err(TubeError::InvalidParameter {
            param: key.to_string(),
            message: format!("must be positive, got {}", v),
        }),
        other => Ok(other),
    }
}
