//! AC-coupled triode cathode follower.
//!
//! The grid is returned to the junction of a bias resistor `Rb` and the
//! cathode resistor `Rk`, so the valve sets its own bias: `Vg = Ik·Rb`.
//! The operating point is where the DC line `Ik = Vb/(Rb + Rk)` meets the
//! curve of anode voltages that pass `Ik = Vg/Rb` at grid bias `−Vg`.

use tracing::debug;

use crate::device::Device;
use crate::models::DeviceType;

use super::geometry::{first_intersection, Point};
use super::harmonics::transconductance;
use super::validate::require_positive;
use super::Circuit;

const NAME: &str = "triode cathode follower";

/// Points on the cathode bias curve.
const CATHODE_LINE_STEPS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CathodeFollowerResult {
    /// Grid bias across `Rb` (V).
    pub vg: f64,
    /// Cathode voltage (V).
    pub vk: f64,
    /// Cathode current (mA).
    pub ik: f64,
    /// Transconductance at the operating point (mA/V).
    pub gm: f64,
    /// Output impedance (ohms).
    pub ro: f64,
    /// Voltage gain into `Rk ∥ RL`.
    pub gain: f64,
    pub operating_point: Point,
    pub bias_load_line: Vec<Point>,
    pub cathode_load_line: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriodeCathodeFollower {
    /// Supply voltage (V).
    pub vb: f64,
    /// Grid bias resistor (ohms).
    pub rb: f64,
    /// Cathode resistor (ohms).
    pub rk: f64,
    /// External load (ohms); zero leaves the cathode unloaded.
    pub rl: f64,
    result: CathodeFollowerResult,
}

impl Default for TriodeCathodeFollower {
    fn default() -> Self {
        Self {
            vb: 300.0,
            rb: 620.0,
            rk: 47000.0,
            rl: 100000.0,
            result: CathodeFollowerResult::default(),
        }
    }
}

impl TriodeCathodeFollower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self) -> &CathodeFollowerResult {
        &self.result
    }

    fn validate(&self) -> bool {
        require_positive(NAME, "vb", self.vb)
            && require_positive(NAME, "rb", self.rb)
            && require_positive(NAME, "rk", self.rk)
    }

    fn bias_load_line(&self) -> Vec<Point> {
        let ia_max = 1000.0 * self.vb / (self.rb + self.rk);
        vec![Point::new(0.0, ia_max), Point::new(self.vb, 0.0)]
    }

    fn cathode_load_line(&self, device: &Device) -> Vec<Point> {
        (1..=CATHODE_LINE_STEPS)
            .filter_map(|j| {
                let vg = device.vg1_max * j as f64 / CATHODE_LINE_STEPS as f64;
                let ia = vg * 1000.0 / self.rb;
                if !(ia > 0.0) {
                    return None;
                }
                let va = device.anode_voltage(ia, -vg, 0.0);
                (va.is_finite() && va > 1e-4).then(|| Point::new(va, ia))
            })
            .collect()
    }

    fn load(&self) -> f64 {
        if self.rl > 0.0 {
            self.rk * self.rl / (self.rk + self.rl)
        } else {
            self.rk
        }
    }
}

impl Circuit for TriodeCathodeFollower {
    fn name(&self) -> &'static str {
        NAME
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Triode
    }

    fn update(&mut self, device: Option<&Device>) {
        self.result = CathodeFollowerResult::default();
        let Some(device) = device else {
            return;
        };
        if !self.validate() {
            return;
        }

        let bias = self.bias_load_line();
        let cathode = self.cathode_load_line(device);
        let op = match bias.as_slice() {
            [start, end] if cathode.len() >= 2 => first_intersection(*start, *end, &cathode),
            _ => Point::NOT_FOUND,
        };
        self.result.bias_load_line = bias;
        self.result.cathode_load_line = cathode;
        if !op.is_found() || op.ia <= 0.0 {
            debug!(circuit = NAME, "no operating point");
            return;
        }

        let ik = op.ia;
        let vg = ik * self.rb / 1000.0;
        let gm = transconductance(device, op.va, -vg, 0.0);
        let load = self.load();

        let r = &mut self.result;
        r.operating_point = op;
        r.ik = ik;
        r.vg = vg;
        r.vk = ik * (self.rk + self.rb) / 1000.0;
        r.gm = gm;
        if gm > 0.0 {
            r.ro = 1000.0 / gm;
            let g_load = gm / 1000.0 * load;
            r.gain = g_load / (1.0 + g_load);
        }
        debug!(
            circuit = NAME,
            va = op.va,
            ik = r.ik,
            vk = r.vk,
            gm = r.gm,
            "operating point"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::test_triode;
    use approx::assert_relative_eq;

    #[test]
    fn test_no_device_leaves_outputs_zero() {
        let mut cf = TriodeCathodeFollower::new();
        cf.update(None);
        let r = cf.result();
        assert_eq!(r.vg, 0.0);
        assert_eq!(r.vk, 0.0);
        assert_eq!(r.ik, 0.0);
        assert_eq!(r.ro, 0.0);
        assert_eq!(r.operating_point, Point::new(-1.0, -1.0));
    }

    #[test]
    fn test_operating_point_on_both_lines() {
        let device = test_triode();
        let mut cf = TriodeCathodeFollower::new();
        cf.update(Some(&device));
        let r = cf.result();

        assert!(r.operating_point.is_found());
        // On the DC line.
        let expected = 1000.0 * 300.0 / 47620.0 * (1.0 - r.operating_point.va / 300.0);
        assert_relative_eq!(r.ik, expected, max_relative = 1e-9);
        assert_relative_eq!(r.vk, r.ik * 47.62, max_relative = 1e-9);
        assert_relative_eq!(r.vg, r.ik * 0.62, max_relative = 1e-9);
        assert!(r.ik > 4.0 && r.ik < 6.0);
    }

    #[test]
    fn test_output_impedance_and_gain() {
        let device = test_triode();
        let mut cf = TriodeCathodeFollower::new();
        cf.update(Some(&device));
        let r = cf.result();
        assert!(r.gm > 0.0);
        assert_relative_eq!(r.ro, 1000.0 / r.gm);
        assert!(r.gain > 0.9 && r.gain < 1.0);

        let mut unloaded = cf.clone();
        unloaded.rl = 0.0;
        unloaded.update(Some(&device));
        assert!(unloaded.result().gain > r.gain);
    }

    #[test]
    fn test_transconductance_matches_stage_rule() {
        let device = test_triode();
        let mut cf = TriodeCathodeFollower::new();
        cf.update(Some(&device));
        let r = cf.result();
        let op = r.operating_point;

        // Same central difference as the output stages: dVg = max(0.05, 2%·|Vg|).
        let dvg = (0.02 * r.vg).max(0.05);
        let expected = (device.anode_current(op.va, -r.vg + dvg, 0.0)
            - device.anode_current(op.va, -r.vg - dvg, 0.0))
            / (2.0 * dvg);
        assert_relative_eq!(r.gm, expected, max_relative = 1e-12);
        assert_relative_eq!(r.gm, transconductance(&device, op.va, -r.vg, 0.0));
    }

    #[test]
    fn test_invalid_resistor() {
        let device = test_triode();
        let mut cf = TriodeCathodeFollower {
            rb: 0.0,
            ..TriodeCathodeFollower::default()
        };
        cf.update(Some(&device));
        assert_eq!(cf.result(), &CathodeFollowerResult::default());
    }
}
