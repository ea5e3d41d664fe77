//! Output-stage circuit analysis on a fitted [`Device`].
//!
//! Each circuit is a plain struct of named inputs plus the outputs of its
//! last [`Circuit::update`]. Updates never fail: a missing device or an
//! input that cannot describe a working stage leaves every output at zero
//! and the operating point at [`Point::NOT_FOUND`].
//!
//! - [`SingleEndedOutput`] and [`PushPullOutput`]: pentode (or triode)
//!   output stages with a fixed screen supply.
//! - [`SingleEndedUltralinear`] and [`PushPullUltralinear`]: the same with
//!   the screen fed from an output-transformer tap.
//! - [`TriodeCathodeFollower`]: AC-coupled cathode follower.
//!
//! Voltages are in volts, currents in mA, resistances in ohms and power in
//! watts.

mod cathode_follower;
mod geometry;
mod harmonics;
mod push_pull;
mod single_ended;
mod stage;
mod ultralinear;
mod validate;

pub use cathode_follower::{CathodeFollowerResult, TriodeCathodeFollower};
pub use geometry::{dc_load_line_current, find_line_intersection, first_intersection, Point};
pub use harmonics::{
    time_domain_harmonics, transconductance, BiasRow, FivePoint, HarmonicEstimator, HarmonicRow,
    Harmonics, ScreenSupply, SmallSignal,
};
pub use push_pull::PushPullOutput;
pub use single_ended::SingleEndedOutput;
pub use stage::{StageInputs, StageResult, Topology};
pub use ultralinear::{PushPullUltralinear, SingleEndedUltralinear};

use crate::device::Device;
use crate::models::DeviceType;

/// Cathode decoupling of an output stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GainMode {
    /// Cathode resistor left unbypassed: local feedback of `1 + gm·Rk`
    /// reduces gain and distortion.
    Unbypassed,
    /// Cathode resistor AC-bypassed.
    #[default]
    Bypassed,
}

/// A circuit that can be recomputed against a device.
pub trait Circuit {
    /// Display name.
    fn name(&self) -> &'static str;

    /// Device family the circuit is designed around.
    fn device_type(&self) -> DeviceType;

    /// Recompute every output from the current inputs. Outputs are cleared
    /// first, so a failed update never leaves stale values behind.
    fn update(&mut self, device: Option<&Device>);
}

#[cfg(test)]
pub(crate) fn test_triode() -> Device {
    use crate::models::{DeviceModel, Model, ModelKind, ParameterId};

    // Ia = (Va/10 + Vg1)^1.5 mA.
    let mut model = Model::new(ModelKind::Simple);
    let p = model.parameters_mut();
    p.set(ParameterId::Mu, 10.0);
    p.set(ParameterId::Kg1, 1.0);
    p.set(ParameterId::X, 1.5);
    p.set(ParameterId::Vct, 0.0);
    Device::new("test triode", model).with_limits(600.0, 40.0, 200.0, 25.0)
}
