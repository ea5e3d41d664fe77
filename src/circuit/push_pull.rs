//! Class-A/AB push-pull output stage.
//!
//! Both valves share one cathode resistor. Harmonics are computed on the
//! differential primary current rather than on a single valve.

use crate::device::Device;
use crate::models::DeviceType;

use super::harmonics::{BiasRow, HarmonicRow, ScreenSupply};
use super::stage::{StageInputs, StageResult, Topology};
use super::{Circuit, GainMode};

const NAME: &str = "push-pull output";

/// Push-pull output stage with a fixed screen supply.
#[derive(Debug, Clone, PartialEq)]
pub struct PushPullOutput {
    /// Supply voltage (V).
    pub vb: f64,
    /// Screen voltage (V).
    pub vs: f64,
    /// Anode bias current per valve (mA).
    pub ia: f64,
    /// Anode-to-anode load (ohms).
    pub raa: f64,
    /// Peak anode swing (V); zero derives it from the swing limits.
    pub headroom: f64,
    /// With automatic headroom, use the symmetric swing instead of the
    /// maximum swing.
    pub symmetric_swing: bool,
    pub gain_mode: GainMode,
    result: StageResult,
}

impl Default for PushPullOutput {
    fn default() -> Self {
        Self {
            vb: 300.0,
            vs: 250.0,
            ia: 30.0,
            raa: 8000.0,
            headroom: 0.0,
            symmetric_swing: false,
            gain_mode: GainMode::Bypassed,
            result: StageResult::default(),
        }
    }
}

impl PushPullOutput {
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
            screen: ScreenSupply::Fixed(self.vs),
            ia: self.ia,
            load: self.raa,
            headroom: self.headroom,
            gain_mode: self.gain_mode,
            symmetric_swing: self.symmetric_swing,
            grid_span: 1.0,
            measured_bias: true,
        }
    }

    pub fn headroom_scan(&self, device: Option<&Device>) -> Vec<HarmonicRow> {
        self.inputs().headroom_scan(device, NAME)
    }

    pub fn bias_sweep(&self, device: Option<&Device>, headroom: f64) -> Vec<BiasRow> {
        self.inputs().bias_sweep(device, NAME, headroom)
    }
}

impl Circuit for PushPullOutput {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::test_triode;
    use crate::data::{Measurement, Sample, TestType};
    use crate::models::{Model, ModelKind};
    use approx::assert_relative_eq;

    fn stage() -> PushPullOutput {
        PushPullOutput {
            raa: 6000.0,
            ..PushPullOutput::default()
        }
    }

    #[test]
    fn test_shared_cathode_resistor() {
        let device = test_triode();
        let mut pp = stage();
        pp.update(Some(&device));
        let r = pp.result();
        assert!(r.vk > 0.0);
        assert_relative_eq!(r.rk, 1000.0 * r.vk / (2.0 * r.ik));
        assert!(!r.measured_bias);
    }

    #[test]
    fn test_headroom_power_and_symmetric_swing() {
        let device = test_triode();
        let mut pp = PushPullOutput {
            headroom: 50.0,
            ..stage()
        };
        pp.update(Some(&device));
        assert_relative_eq!(pp.result().phead, 2.0 * 50.0 * 50.0 / 6000.0);

        let mut auto = PushPullOutput {
            symmetric_swing: true,
            ..stage()
        };
        auto.update(Some(&device));
        let r = auto.result();
        assert!(r.sym_vpp > 0.0);
        assert!(r.sym_vpp <= r.max_vpp + 1e-9);
        assert_relative_eq!(r.effective_headroom, r.sym_vpp / 2.0);
    }

    #[test]
    fn test_differential_harmonics() {
        let device = test_triode();
        let mut pp = PushPullOutput {
            headroom: 60.0,
            ..stage()
        };
        pp.update(Some(&device));
        let h = pp.result().harmonics;
        assert!(h.thd > 0.0);
        let sum = h.hd2 * h.hd2 + h.hd3 * h.hd3 + h.hd4 * h.hd4 + h.hd5 * h.hd5;
        assert_relative_eq!(h.thd, sum.sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn test_measured_bias_takes_precedence() {
        let mut m = Measurement::new(DeviceType::Pentode, TestType::AnodeCharacteristics);
        for (vg1, ia) in [(-10.0, 50.0), (-20.0, 10.0)] {
            let sweep = m.next_sweep(vg1, 250.0);
            for va in [100.0, 200.0, 300.0, 400.0] {
                sweep.push(Sample::new(va, vg1, 250.0, ia, 2.0));
            }
        }
        let mut device = Device::new("pentode", Model::new(ModelKind::ReefmanDerkE));
        device.set_measurement(Some(m));

        let mut pp = PushPullOutput::new();
        pp.update(Some(&device));
        let r = pp.result();
        assert!(r.measured_bias);
        assert_relative_eq!(r.vk, 15.0, epsilon = 1e-9);
        assert_relative_eq!(r.ik, 32.0, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_device() {
        let mut pp = PushPullOutput::new();
        pp.update(None);
        assert_eq!(pp.result(), &StageResult::default());
    }
}
