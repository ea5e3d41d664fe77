//! Ultralinear output stages: the screen is fed from a tap on the output
//! transformer primary, `Vg2 = Va·tap + Vb·(1 − tap)`.
//!
//! The screen follows the anode, so the grid search covers twice the
//! device's usual grid span.

use crate::device::Device;
use crate::models::DeviceType;

use super::harmonics::{BiasRow, HarmonicRow, ScreenSupply};
use super::stage::{StageInputs, StageResult, Topology};
use super::validate::require_range;
use super::{Circuit, GainMode};

const SE_NAME: &str = "single-ended ultralinear output";
const PP_NAME: &str = "push-pull ultralinear output";

const GRID_SPAN: f64 = 2.0;

/// Single-ended ultralinear output stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleEndedUltralinear {
    /// Supply voltage (V).
    pub vb: f64,
    /// Screen tap as a fraction of the primary, 0 (pentode) to 1 (triode).
    pub tap: f64,
    /// Anode bias current (mA).
    pub ia: f64,
    /// Anode load (ohms).
    pub ra: f64,
    /// Peak anode swing (V); zero uses the full swing to the knee.
    pub headroom: f64,
    pub gain_mode: GainMode,
    result: StageResult,
}

impl Default for SingleEndedUltralinear {
    fn default() -> Self {
        Self {
            vb: 300.0,
            tap: 0.5,
            ia: 30.0,
            ra: 8000.0,
            headroom: 0.0,
            gain_mode: GainMode::Bypassed,
            result: StageResult::default(),
        }
    }
}

impl SingleEndedUltralinear {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self) -> &StageResult {
        &self.result
    }

    fn inputs(&self) -> StageInputs {
        StageInputs {
            topology: Topology::SingleEnded,
            vb: self.vb,
            screen: ScreenSupply::Ultralinear {
                tap: self.tap,
                vb: self.vb,
            },
            ia: self.ia,
            load: self.ra,
            headroom: self.headroom,
            gain_mode: self.gain_mode,
            symmetric_swing: false,
            grid_span: GRID_SPAN,
            measured_bias: false,
        }
    }

    pub fn headroom_scan(&self, device: Option<&Device>) -> Vec<HarmonicRow> {
        self.inputs().headroom_scan(device, SE_NAME)
    }

    pub fn bias_sweep(&self, device: Option<&Device>, headroom: f64) -> Vec<BiasRow> {
        self.inputs().bias_sweep(device, SE_NAME, headroom)
    }
}

impl Circuit for SingleEndedUltralinear {
    fn name(&self) -> &'static str {
        SE_NAME
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Pentode
    }

    fn update(&mut self, device: Option<&Device>) {
        self.result = if require_range(SE_NAME, "tap", self.tap, 0.0, 1.0) {
            self.inputs().solve(device, SE_NAME)
        } else {
            StageResult::default()
        };
    }
}

/// Push-pull ultralinear output stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PushPullUltralinear {
    /// Supply voltage (V).
    pub vb: f64,
    /// Screen tap as a fraction of each half-primary.
    pub tap: f64,
    /// Anode bias current per valve (mA).
    pub ia: f64,
    /// Anode-to-anode load (ohms).
    pub raa: f64,
    /// Peak anode swing (V); zero derives it from the swing limits.
    pub headroom: f64,
    pub symmetric_swing: bool,
    pub gain_mode: GainMode,
    result: StageResult,
}

impl Default for PushPullUltralinear {
    fn default() -> Self {
        Self {
            vb: 300.0,
            tap: 0.3,
            ia: 30.0,
            raa: 8000.0,
            headroom: 0.0,
            symmetric_swing: false,
            gain_mode: GainMode::Bypassed,
            result: StageResult::default(),
        }
    }
}

impl PushPullUltralinear {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self) -> &StageResult {
        &self.result
    }

    fn inputs(&self) -> StageInputs {
        StageInputs {
            topology: Topology::PushPull,
            vb: self.vb,
            screen: ScreenSupply::Ultralinear {
                tap: self.tap,
                vb: self.vb,
            },
            ia: self.ia,
            load: self.raa,
            headroom: self.headroom,
            gain_mode: self.gain_mode,
            symmetric_swing: self.symmetric_swing,
            grid_span: GRID_SPAN,
            measured_bias: false,
        }
    }

    pub fn headroom_scan(&self, device: Option<&Device>) -> Vec<HarmonicRow> {
        self.inputs().headroom_scan(device, PP_NAME)
    }

    pub fn bias_sweep(&self, device: Option<&Device>, headroom: f64) -> Vec<BiasRow> {
        self.inputs().bias_sweep(device, PP_NAME, headroom)
    }
}

impl Circuit for PushPullUltralinear {
    fn name(&self) -> &'static str {
        PP_NAME
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Pentode
    }

    fn update(&mut self, device: Option<&Device>) {
        self.result = if require_range(PP_NAME, "tap", self.tap, 0.0, 1.0) {
            self.inputs().solve(device, PP_NAME)
        } else {
            StageResult::default()
        };
    }
}
