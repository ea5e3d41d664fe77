//! Operating point, power and distortion of a transformer-coupled output
//! stage, shared by the single-ended, push-pull and ultralinear circuits.

use tracing::debug;

use crate::device::Device;
use crate::models::DeviceType;

use super::geometry::{first_intersection, sample_line, Point};
use super::harmonics::{
    cathode_feedback, BiasRow, HarmonicEstimator, HarmonicRow, Harmonics, ScreenSupply,
    SmallSignal,
};
use super::validate::require_positive;
use super::GainMode;

/// Grid search resolution for the bias point.
const BIAS_STEPS: usize = 1000;

/// Samples of the Vg1 = 0 anode curve.
const CURVE_POINTS: usize = 100;

/// Samples along the AC load line.
const LOAD_LINE_POINTS: usize = 101;

/// Samples per side of the swing-limit search.
const SWING_SAMPLES: usize = 400;

/// Output-stage arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    SingleEnded,
    PushPull,
}

/// Inputs common to every output stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageInputs {
    pub topology: Topology,
    /// Supply voltage (V).
    pub vb: f64,
    pub screen: ScreenSupply,
    /// Anode bias current per valve (mA).
    pub ia: f64,
    /// Anode load (SE) or anode-to-anode load (PP), ohms.
    pub load: f64,
    /// Peak anode swing (V); zero derives it from the swing limits.
    pub headroom: f64,
    pub gain_mode: GainMode,
    /// Derive automatic headroom from the symmetric rather than the
    /// maximum swing.
    pub symmetric_swing: bool,
    /// Multiple of the device's `vg1_max` searched for the bias point.
    pub grid_span: f64,
    /// Try the embedded measurement before the model for the bias point.
    pub measured_bias: bool,
}

/// Everything an output stage reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResult {
    /// Cathode bias (V).
    pub vk: f64,
    /// Cathode current per valve (mA).
    pub ik: f64,
    /// Cathode resistor (ohms); shared by both valves in push-pull.
    pub rk: f64,
    /// Maximum output power (W).
    pub pout: f64,
    /// Output power at the effective headroom (W).
    pub phead: f64,
    pub harmonics: Harmonics,
    /// Transconductance at the bias point (mA/V).
    pub gm: f64,
    /// Anode resistance at the bias point (ohms).
    pub ra: f64,
    /// Peak swing used for `phead`, harmonics and sensitivity (V).
    pub effective_headroom: f64,
    /// Grid drive for the effective headroom (Vpp).
    pub input_sensitivity: f64,
    /// Anode swing between the left and right limits (Vpp).
    pub max_vpp: f64,
    /// Largest swing symmetric about the bias point (Vpp).
    pub sym_vpp: f64,
    /// True when the bias point came from the embedded measurement.
    pub measured_bias: bool,
    pub operating_point: Point,
    pub ac_load_line: Vec<Point>,
    pub anode_curve: Vec<Point>,
}

impl StageInputs {
    fn load_slope(&self) -> f64 {
        match self.topology {
            Topology::SingleEnded => -1000.0 / self.load,
            Topology::PushPull => -2000.0 / self.load,
        }
    }

    /// Per-valve load seen by the gain calculation.
    fn valve_load(&self) -> f64 {
        match self.topology {
            Topology::SingleEnded => self.load,
            Topology::PushPull => self.load / 2.0,
        }
    }

    pub fn validate(&self, circuit: &str) -> bool {
        require_positive(circuit, "vb", self.vb)
            && require_positive(circuit, "ia", self.ia)
            && require_positive(circuit, "load", self.load)
    }

    pub(crate) fn estimator<'a>(&self, device: &'a Device) -> HarmonicEstimator<'a> {
        HarmonicEstimator::new(device, self.vb, self.load, self.screen)
            .with_grid_span(device.vg1_max * self.grid_span)
            .with_push_pull(self.topology == Topology::PushPull)
    }

    /// Recompute every output. Missing device or invalid inputs give the
    /// all-zero result.
    pub fn solve(&self, device: Option<&Device>, circuit: &str) -> StageResult {
        let mut result = StageResult::default();
        let Some(device) = device else {
            return result;
        };
        if !self.validate(circuit) {
            return result;
        }

        let (vb, ia) = (self.vb, self.ia);
        let slope = self.load_slope();

        // AC load line through the bias point.
        let line_start = Point::new(0.0, ia - slope * vb);
        let line_end = match self.topology {
            Topology::SingleEnded => Point::new(-line_start.ia / slope, 0.0),
            Topology::PushPull => Point::new(device.va_max, ia + slope * (device.va_max - vb)),
        };
        result.ac_load_line = sample_line(line_start, line_end, LOAD_LINE_POINTS);

        result.anode_curve = (1..=CURVE_POINTS)
            .filter_map(|i| {
                let va = device.va_max * i as f64 / CURVE_POINTS as f64;
                let ia0 = device.anode_current(va, 0.0, self.screen.at(va));
                (ia0.is_finite() && ia0 >= 0.0).then(|| Point::new(va, ia0))
            })
            .collect();

        let knee = first_intersection(line_start, line_end, &result.anode_curve);
        if knee.is_found() {
            result.pout = (vb - knee.va) * knee.ia / 2000.0;
        }

        let vg2 = self.screen.at(vb);
        let (vk, ig2) = match self.measured_bias(device, vg2) {
            Some(bias) => {
                result.measured_bias = true;
                bias
            }
            None => {
                let vk = self.search_bias(device, vg2);
                let ig2 = match device.device_type() {
                    DeviceType::Pentode => device.screen_current(vb, -vk, vg2),
                    DeviceType::Triode => 0.0,
                };
                (vk, ig2)
            }
        };

        result.vk = vk;
        result.ik = ia + ig2;
        if result.ik > 0.0 {
            result.rk = match self.topology {
                Topology::SingleEnded => 1000.0 * vk / result.ik,
                Topology::PushPull => 1000.0 * vk / (2.0 * result.ik),
            };
        }
        result.operating_point = Point::new(vb, ia);

        let small = SmallSignal::at(device, vb, -vk, vg2);
        result.gm = small.gm;
        result.ra = small.ra;

        let (max_vpp, sym_vpp) = self.swing_limits(device);
        result.max_vpp = max_vpp;
        result.sym_vpp = sym_vpp;

        let headroom = if self.headroom > 0.0 {
            self.headroom
        } else if self.symmetric_swing && sym_vpp > 0.0 {
            sym_vpp / 2.0
        } else {
            max_vpp / 2.0
        };
        result.effective_headroom = headroom;
        if !(headroom > 0.0) {
            return result;
        }

        result.phead = match self.topology {
            Topology::SingleEnded => headroom * headroom / (2.0 * self.load),
            Topology::PushPull => 2.0 * headroom * headroom / self.load,
        };

        let feedback = match self.gain_mode {
            GainMode::Unbypassed => cathode_feedback(small.gm, result.rk),
            GainMode::Bypassed => None,
        };

        if let Some(harmonics) = self.estimator(device).simulate(ia, headroom) {
            result.harmonics = feedback.map_or(harmonics, |f| harmonics.reduced(f));
        }

        let mut gain = (small.gm / 1000.0 * self.valve_load()).abs();
        if let Some(f) = feedback {
            gain /= f;
        }
        if gain.is_finite() && gain > 1e-6 {
            result.input_sensitivity = 2.0 * headroom / gain;
        }

        debug!(
            circuit,
            vk = result.vk,
            rk = result.rk,
            pout = result.pout,
            thd = result.harmonics.thd,
            "stage updated"
        );
        result
    }

    fn measured_bias(&self, device: &Device, vg2: f64) -> Option<(f64, f64)> {
        if !self.measured_bias {
            return None;
        }
        device.find_bias_from_measurement(self.vb, vg2, self.ia)
    }

    /// Grid bias magnitude at which the device draws the bias current at
    /// `Va = Vb`.
    fn search_bias(&self, device: &Device, vg2: f64) -> f64 {
        let span = device.vg1_max * self.grid_span;
        let mut best = 0.0;
        let mut min_err = f64::INFINITY;
        for i in 0..=BIAS_STEPS {
            let vg = span * i as f64 / BIAS_STEPS as f64;
            let test = device.anode_current(self.vb, -vg, vg2);
            if !test.is_finite() {
                continue;
            }
            let err = (self.ia - test).abs();
            if err < min_err {
                min_err = err;
                best = vg;
            }
        }
        best
    }

    /// `(max_vpp, sym_vpp)` along the AC load line. The left limit is the
    /// Vg1 = 0 curve, the right limit the lesser of cut-off and the anode
    /// dissipation hyperbola.
    fn swing_limits(&self, device: &Device) -> (f64, f64) {
        let slope = self.load_slope();
        let (va0, ia0) = (self.vb, self.ia);
        let va_max = device.va_max;
        let line = |va: f64| ia0 + slope * (va - va0);

        let left = find_crossing(
            clamp_va(va0, va_max),
            |i| (va0 * (1.0 - i as f64 / SWING_SAMPLES as f64)).max(0.0),
            |va| device.anode_current(va, 0.0, self.screen.at(va)) - line(va),
        );
        let Some(left) = left else {
            return (0.0, 0.0);
        };

        let cutoff = clamp_va(va0 - ia0 / slope, va_max);
        let mut dissipation = va_max + 1.0;
        if device.pa_max > 0.0 {
            let hyperbola = |va: f64| {
                if va <= 0.0 {
                    1e9
                } else {
                    line(va) - 1000.0 * device.pa_max / va
                }
            };
            if let Some(va) = find_crossing(
                va0.max(1e-3),
                |i| va0 + (va_max - va0) * i as f64 / SWING_SAMPLES as f64,
                hyperbola,
            ) {
                dissipation = va;
            }
        }
        let right = clamp_va(cutoff.min(dissipation), va_max);

        if !(left < va0 && right > va0) {
            return (0.0, 0.0);
        }
        let sym = (va0 - left).min(right - va0);
        (right - left, if sym > 0.0 { 2.0 * sym } else { 0.0 })
    }

    pub fn headroom_scan(&self, device: Option<&Device>, circuit: &str) -> Vec<HarmonicRow> {
        match device {
            Some(device) if self.validate(circuit) => self.estimator(device).headroom_scan(self.ia),
            _ => Vec::new(),
        }
    }

    pub fn bias_sweep(&self, device: Option<&Device>, circuit: &str, headroom: f64) -> Vec<BiasRow> {
        match device {
            Some(device) if self.validate(circuit) => {
                self.estimator(device).bias_sweep(self.ia, headroom)
            }
            _ => Vec::new(),
        }
    }
}

fn clamp_va(va: f64, va_max: f64) -> f64 {
    va.min(va_max).max(0.0)
}

/// Walk `x(1..=SWING_SAMPLES)` from `start` until `f` changes sign and
/// interpolate the crossing.
fn find_crossing(
    start: f64,
    x: impl Fn(usize) -> f64,
    f: impl Fn(f64) -> f64,
) -> Option<f64> {
    let mut last_x = start;
    let mut last_f = f(start);
    for i in 1..=SWING_SAMPLES {
        let cur_x = x(i);
        let cur_f = f(cur_x);
        if (last_f <= 0.0 && cur_f >= 0.0) || (last_f >= 0.0 && cur_f <= 0.0) {
            let denom = cur_f - last_f;
            let t = if denom.abs() > 1e-12 {
                (-last_f / denom).clamp(0.0, 1.0)
            } else {
                0.5
            };
            return Some(last_x + t * (cur_x - last_x));
        }
        last_x = cur_x;
        last_f = cur_f;
    }
    None
}
