//! Harmonic distortion along a load line.
//!
//! Five anode currents are read off the DC load line at the bias point and
//! at half and full headroom either side of it. The grid drive for the
//! positive peak is found first, then mirrored, so the negative half of the
//! waveform carries the device's curvature:
//!
//! ```text
//!   Ia = I(Va_op − h)            Vg_max  = grid bias for Ia
//!   Ib = I(Va at Vg_bias + ½Δ)   Δ       = Vg_max − Vg_bias
//!   Ic = I_bias
//!   Id = I(Va at Vg_bias − ½Δ)
//!   Ie = I(Va at Vg_bias − Δ)
//! ```
//!
//! The samples are either combined directly ([`FivePoint::harmonics`]) or
//! treated as one period of a waveform, interpolated to 512 points, Hann
//! windowed and run through a direct DFT ([`time_domain_harmonics`]).

use crate::device::Device;

use super::geometry::dc_load_line_current;

/// Samples per period of the synthesised waveform.
const DFT_SAMPLES: usize = 512;

/// Highest harmonic evaluated.
const MAX_HARMONIC: usize = 5;

/// Grid search resolution for the bias of a target current.
const GRID_STEPS: usize = 400;

/// Headroom steps in a scan.
const SCAN_STEPS: usize = 32;

/// Bias currents in a sweep, from a quarter to twice the nominal bias.
const BIAS_STEPS: usize = 32;

/// Harmonic levels in percent of the fundamental.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Harmonics {
    pub hd2: f64,
    pub hd3: f64,
    pub hd4: f64,
    pub hd5: f64,
    pub thd: f64,
}

impl Harmonics {
    /// Every level divided by `factor` (local feedback).
    pub fn reduced(self, factor: f64) -> Self {
        Self {
            hd2: self.hd2 / factor,
            hd3: self.hd3 / factor,
            hd4: self.hd4 / factor,
            hd5: self.hd5 / factor,
            thd: self.thd / factor,
        }
    }
}

/// One row of a headroom scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicRow {
    /// Peak anode swing (V).
    pub headroom: f64,
    pub harmonics: Harmonics,
}

/// One row of a bias sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasRow {
    /// Anode bias current (mA).
    pub ia: f64,
    pub harmonics: Harmonics,
}

/// Load-line currents (mA) at `+1, +½, 0, −½, −1` headroom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FivePoint {
    pub ia: f64,
    pub ib: f64,
    pub ic: f64,
    pub id: f64,
    pub ie: f64,
}

impl FivePoint {
    pub fn samples(&self) -> [f64; 5] {
        [self.ia, self.ib, self.ic, self.id, self.ie]
    }

    /// Differential current of a push-pull pair, one valve driven by each
    /// half of the waveform.
    pub fn push_pull(&self) -> [f64; 5] {
        [
            self.ia - self.ie,
            self.ib - self.id,
            0.0,
            self.id - self.ib,
            self.ie - self.ia,
        ]
    }

    /// Fixed-coefficient HD2..HD4 estimate. All zero when the swing is
    /// degenerate.
    pub fn harmonics(&self) -> Harmonics {
        let FivePoint { ia, ib, ic, id, ie } = *self;
        let denom = ia + ib - id - ie;
        if denom.abs() < 1e-12 {
            return Harmonics::default();
        }
        let hd2 = (75.0 * (ia + ie - 2.0 * ic) / denom).abs();
        let hd3 = (50.0 * (ia - 2.0 * ib + 2.0 * id - ie) / denom).abs();
        let hd4 = (25.0 * (ia - 4.0 * ib + 6.0 * ic - 4.0 * id + ie) / denom).abs();
        Harmonics {
            hd2,
            hd3,
            hd4,
            hd5: 0.0,
            thd: (hd2 * hd2 + hd3 * hd3 + hd4 * hd4).sqrt(),
        }
    }
}

/// Harmonic levels of one period given as five equally spaced samples.
///
/// Returns `None` when the fundamental is zero or not finite.
pub fn time_domain_harmonics(samples: &[f64; 5]) -> Option<Harmonics> {
    use std::f64::consts::TAU;

    let n = DFT_SAMPLES as f64;
    let mut a = [0.0f64; MAX_HARMONIC + 1];
    let mut b = [0.0f64; MAX_HARMONIC + 1];

    for k in 0..DFT_SAMPLES {
        let phase = TAU * k as f64 / n;
        let pos = k as f64 / n * 5.0;
        let i0 = (pos.floor() as usize) % 5;
        let i1 = (i0 + 1) % 5;
        let frac = pos - pos.floor();
        let value = samples[i0] + (samples[i1] - samples[i0]) * frac;

        let window = 0.5 * (1.0 - (TAU * k as f64 / (n - 1.0)).cos());
        let v = value * window;

        for h in 1..=MAX_HARMONIC {
            let angle = h as f64 * phase;
            a[h] += v * angle.cos();
            b[h] += v * angle.sin();
        }
    }

    let scale = 2.0 / n;
    let mut amplitude = [0.0f64; MAX_HARMONIC + 1];
    for h in 1..=MAX_HARMONIC {
        amplitude[h] = ((a[h] * scale).powi(2) + (b[h] * scale).powi(2)).sqrt();
    }

    let fundamental = amplitude[1];
    if !(fundamental > 0.0) || !fundamental.is_finite() {
        return None;
    }

    let percent = |h: usize| {
        let v = 100.0 * amplitude[h] / fundamental;
        if v.is_finite() && v > 0.0 {
            v
        } else {
            0.0
        }
    };
    let (hd2, hd3, hd4, hd5) = (percent(2), percent(3), percent(4), percent(5));
    let thd = (hd2 * hd2 + hd3 * hd3 + hd4 * hd4 + hd5 * hd5).sqrt();

    Some(Harmonics {
        hd2,
        hd3,
        hd4,
        hd5,
        thd: if thd.is_finite() { thd } else { 0.0 },
    })
}

/// Screen supply of an output stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScreenSupply {
    /// Regulated or decoupled screen at a fixed voltage.
    Fixed(f64),
    /// Ultralinear tap: `Vg2 = Va·tap + Vb·(1 − tap)`.
    Ultralinear { tap: f64, vb: f64 },
}

impl ScreenSupply {
    pub fn at(&self, va: f64) -> f64 {
        match *self {
            ScreenSupply::Fixed(vs) => vs,
            ScreenSupply::Ultralinear { tap, vb } => va * tap + vb * (1.0 - tap),
        }
    }
}

/// Small-signal parameters at an operating point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmallSignal {
    /// Transconductance (mA/V).
    pub gm: f64,
    /// Amplification factor.
    pub mu: f64,
    /// Anode resistance (ohms).
    pub ra: f64,
}

impl SmallSignal {
    /// Central differences around `(va, vg1, vg2)`: `gm` with
    /// `dVg = max(0.05, 2%·|Vg1|)`, anode slope with ±1 V.
    pub fn at(device: &Device, va: f64, vg1: f64, vg2: f64) -> Self {
        let gm = transconductance(device, va, vg1, vg2);
        let slope = (device.anode_current(va + 1.0, vg1, vg2)
            - device.anode_current(va - 1.0, vg1, vg2))
            / 2.0;
        if !(gm > 0.0) || !(slope > 0.0) || !slope.is_finite() {
            return Self {
                gm: gm.max(0.0),
                ..Self::default()
            };
        }
        // kΩ = V/mA.
        let ra_k = 1.0 / slope;
        let mu = gm * ra_k;
        Self {
            gm,
            mu,
            ra: 1000.0 * mu / gm,
        }
    }
}

/// Transconductance in mA/V by central difference on the grid.
pub fn transconductance(device: &Device, va: f64, vg1: f64, vg2: f64) -> f64 {
    let dvg = (0.02 * vg1.abs()).max(0.05);
    let plus = device.anode_current(va, vg1 + dvg, vg2);
    let minus = device.anode_current(va, vg1 - dvg, vg2);
    let gm = (plus - minus) / (2.0 * dvg);
    if gm.is_finite() {
        gm
    } else {
        0.0
    }
}

/// Feedback factor `1 + gm·Rk` of an unbypassed cathode resistor, or
/// `None` when it would not reduce anything.
pub fn cathode_feedback(gm_ma_per_v: f64, rk: f64) -> Option<f64> {
    if !(rk > 0.0) {
        return None;
    }
    let factor = 1.0 + gm_ma_per_v / 1000.0 * rk;
    (factor > 1.0 && factor.is_finite()).then_some(factor)
}

/// Harmonic estimator for one valve on a resistive load line.
#[derive(Debug, Clone, Copy)]
pub struct HarmonicEstimator<'a> {
    device: &'a Device,
    vb: f64,
    load: f64,
    screen: ScreenSupply,
    grid_span: f64,
    push_pull: bool,
}

impl<'a> HarmonicEstimator<'a> {
    /// Load line from `vb` through `load` ohms.
    pub fn new(device: &'a Device, vb: f64, load: f64, screen: ScreenSupply) -> Self {
        Self {
            device,
            vb,
            load,
            screen,
            grid_span: device.vg1_max,
            push_pull: false,
        }
    }

    /// Magnitude of the most negative grid voltage searched.
    pub fn with_grid_span(mut self, span: f64) -> Self {
        self.grid_span = span;
        self
    }

    /// Analyse the differential current of a push-pull pair.
    pub fn with_push_pull(mut self, enabled: bool) -> Self {
        self.push_pull = enabled;
        self
    }

    fn current(&self, va: f64, vg1: f64) -> f64 {
        self.device.anode_current(va, vg1, self.screen.at(va))
    }

    pub fn load_line_current(&self, va: f64) -> f64 {
        dc_load_line_current(self.vb, self.load, va)
    }

    /// Grid bias magnitude at which the device draws `target_ia` mA where
    /// the load line carries that current. Zero when the load line cannot.
    pub fn grid_bias_for_current(&self, target_ia: f64) -> f64 {
        let va = self.vb - target_ia * self.load / 1000.0;
        if !(va > 0.0) || !va.is_finite() {
            return 0.0;
        }

        let mut best = 0.0;
        let mut min_err = f64::INFINITY;
        for i in 0..=GRID_STEPS {
            let vg = self.grid_span * i as f64 / GRID_STEPS as f64;
            let ia = self.current(va, -vg);
            if !ia.is_finite() || ia < 0.0 {
                continue;
            }
            let err = (target_ia - ia).abs();
            if err < min_err {
                min_err = err;
                best = vg;
            }
        }
        best
    }

    /// Anode voltage where the device curve at grid bias `-vg1` meets the
    /// load line, by coarse-to-fine stepping up from 0 V.
    pub fn va_from_grid(&self, vg1: f64) -> f64 {
        let mut va = 0.0;
        let mut step = self.vb / 10.0;

        for _ in 0..10_000 {
            let tube = self.current(va, -vg1);
            let line = self.load_line_current(va);
            if !tube.is_finite() || !line.is_finite() {
                break;
            }
            if tube >= line {
                if step <= 1e-6 {
                    break;
                }
                va -= step;
                step *= 0.1;
            }
            va += step;
            if va < 0.0 || va > 2.0 * self.vb {
                break;
            }
        }
        va
    }

    /// Load-line currents at the five swing positions around `ia_bias`.
    pub fn five_point(&self, ia_bias: f64, headroom: f64) -> Option<FivePoint> {
        if !(self.vb > 0.0) || !(self.load > 0.0) || !(ia_bias > 0.0) || !(headroom > 0.0) {
            return None;
        }

        let va_op = self.vb - ia_bias * self.load / 1000.0;
        let va_min = (va_op - headroom).max(1e-3);
        let va_max = (va_op + headroom).clamp(va_min + 1e-6, (2.0 * self.vb).max(va_min + 1e-6));

        let i_max = self.load_line_current(va_min);
        let i_min = self.load_line_current(va_max);
        if !i_max.is_finite() || !i_min.is_finite() {
            return None;
        }

        let vg_bias = self.grid_bias_for_current(ia_bias);
        let vg_peak = self.grid_bias_for_current(i_max);
        let delta = vg_peak - vg_bias;

        let ib = self.load_line_current(self.va_from_grid(vg_bias + delta / 2.0));
        let id = self.load_line_current(self.va_from_grid(vg_bias - delta / 2.0));
        let ie = self.load_line_current(self.va_from_grid(vg_bias - delta));
        if !ib.is_finite() || !id.is_finite() || !ie.is_finite() {
            return None;
        }

        Some(FivePoint {
            ia: i_max,
            ib,
            ic: ia_bias,
            id,
            ie,
        })
    }

    /// Time-domain harmonic levels at `headroom` volts peak.
    pub fn simulate(&self, ia_bias: f64, headroom: f64) -> Option<Harmonics> {
        let points = self.five_point(ia_bias, headroom)?;
        let samples = if self.push_pull {
            points.push_pull()
        } else {
            points.samples()
        };
        time_domain_harmonics(&samples)
    }

    /// Harmonic levels over 32 headroom steps up to 90% of the usable
    /// supply. Steps the estimator cannot evaluate are left out.
    pub fn headroom_scan(&self, ia_bias: f64) -> Vec<HarmonicRow> {
        let limit = 0.9 * self.vb.min(self.device.va_max).max(1.0);
        (1..=SCAN_STEPS)
            .filter_map(|i| {
                let headroom = limit * i as f64 / SCAN_STEPS as f64;
                self.simulate(ia_bias, headroom)
                    .map(|harmonics| HarmonicRow { headroom, harmonics })
            })
            .collect()
    }

    /// Harmonic levels at fixed `headroom` over bias currents from
    /// `0.25·ia_bias` to `2·ia_bias`.
    pub fn bias_sweep(&self, ia_bias: f64, headroom: f64) -> Vec<BiasRow> {
        if !(ia_bias > 0.0) {
            return Vec::new();
        }
        let (low, high) = (0.25 * ia_bias, 2.0 * ia_bias);
        (0..BIAS_STEPS)
            .filter_map(|i| {
                let ia = low + (high - low) * i as f64 / (BIAS_STEPS - 1) as f64;
                self.simulate(ia, headroom)
                    .map(|harmonics| BiasRow { ia, harmonics })
            })
            .collect()
    }
}
