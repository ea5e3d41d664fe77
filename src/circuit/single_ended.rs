//! Single-ended transformer-coupled output stage.

use crate::device::Device;
use crate::models::DeviceType;

use super::harmonics::{BiasRow, HarmonicRow, ScreenSupply};
use super::stage::{StageInputs, StageResult, Topology};
use super::{Circuit, GainMode};

const NAME: &str = "single-ended output";

/// Single-ended output stage with a fixed screen supply.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleEndedOutput {
    /// Supply voltage (V).
    pub vb: f64,
    /// Screen voltage (V).
    pub vs: f64,
    /// Anode bias current (mA).
    pub ia: f64,
    /// Anode load (ohms).
    pub ra: f64,
    /// Peak anode swing (V); zero uses the full swing to the knee.
    pub headroom: f64,
    pub gain_mode: GainMode,
    result: StageResult,
}

impl Default for SingleEndedOutput {
    fn default() -> Self {
        Self {
            vb: 300.0,
            vs: 250.0,
            ia: 30.0,
            ra: 8000.0,
            headroom: 0.0,
            gain_mode: GainMode::Bypassed,
            result: StageResult::default(),
        }
    }
}

impl SingleEndedOutput {
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
            screen: ScreenSupply::Fixed(self.vs),
            ia: self.ia,
            load: self.ra,
            headroom: self.headroom,
            gain_mode: self.gain_mode,
            symmetric_swing: false,
            grid_span: 1.0,
            measured_bias: false,
        }
    }

    /// Harmonic levels over increasing headroom at the current bias.
    pub fn headroom_scan(&self, device: Option<&Device>) -> Vec<HarmonicRow> {
        self.inputs().headroom_scan(device, NAME)
    }

    /// Harmonic levels over bias current at a fixed headroom.
    pub fn bias_sweep(&self, device: Option<&Device>, headroom: f64) -> Vec<BiasRow> {
        self.inputs().bias_sweep(device, NAME, headroom)
    }
}

impl Circuit for SingleEndedOutput {
    fn name(&self) -> &'static str {
        NAME
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Pentode
    }

    fn update(&mut self, device: Option<&Device>) {
        self.result = self.inputs().solve(device, NAME);
    }
}
