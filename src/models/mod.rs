//! Device current models.
//!
//! This module provides the empirical tube equations and their fitting:
//! - Triodes: Simple power law, Koren, Cohen-Helie, Gardiner
//! - Pentodes: Reefman Derk / Derk-E, Gardiner, beam-tetrode (Derk-E exact)
//!
//! Each family is a separate struct implementing [`DeviceModel`] on top of
//! the shared free functions in [`equations`]. [`Model`] wraps all of them
//! behind one enum so devices and circuits can hold any family.
//!
//! Currents are in mA, voltages in volts.

pub mod equations;
mod fit;
mod json;
mod parameter;

mod cohen_helie;
mod extract;
mod gardiner;
mod koren;
mod reefman;
mod simple;

pub use cohen_helie::CohenHelieTriode;
pub use extract::ExtractModelPentode;
pub use fit::{fit_parameters, FitSample, FitState};
pub use gardiner::{GardinerPentode, GardinerTriode};
pub use json::{model_to_json, model_to_nested_json};
pub(crate) use json::nested_vg1_max;
pub use koren::KorenTriode;
pub use parameter::{Bounds, Parameter, ParameterId, ParameterSet};
pub use reefman::{DerkVariant, ReefmanPentode};
pub use simple::SimpleTriode;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TubeError};
use crate::solver::FitReport;

/// Iteration cap for [`DeviceModel::anode_voltage`].
const ANODE_VOLTAGE_ITERATIONS: usize = 1000;

/// Relative current error accepted by [`DeviceModel::anode_voltage`].
const ANODE_VOLTAGE_TOLERANCE: f64 = 0.01;

/// Upper limit of the anode voltage search.
const ANODE_VOLTAGE_LIMIT: f64 = 1e6;

/// Sentinel for a search that found nothing.
pub const NOT_FOUND: f64 = -1.0;

/// Triode or pentode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Triode,
    Pentode,
}

impl DeviceType {
    pub fn tag(self) -> &'static str {
        match self {
            DeviceType::Triode => "triode",
            DeviceType::Pentode => "pentode",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Simple,
    Koren,
    CohenHelie,
    Gardiner,
    ReefmanDerk,
    ReefmanDerkE,
    GardinerPentode,
    ExtractDerkE,
}

impl ModelKind {
    pub const ALL: [ModelKind; 8] = [
        ModelKind::Simple,
        ModelKind::Koren,
        ModelKind::CohenHelie,
        ModelKind::Gardiner,
        ModelKind::ReefmanDerk,
        ModelKind::ReefmanDerkE,
        ModelKind::GardinerPentode,
        ModelKind::ExtractDerkE,
    ];

    pub fn device_type(self) -> DeviceType {
        match self {
            ModelKind::Simple | ModelKind::Koren | ModelKind::CohenHelie | ModelKind::Gardiner => {
                DeviceType::Triode
            }
            _ => DeviceType::Pentode,
        }
    }

    /// Pentode models that hold some triode coefficients fixed during the
    /// fit and so depend on a prior triode fit for them.
    pub fn fixes_triode_terms(self) -> bool {
        matches!(
            self,
            ModelKind::ReefmanDerk | ModelKind::ReefmanDerkE | ModelKind::GardinerPentode
        )
    }

    /// The `"type"` tag written to model JSON.
    pub fn type_tag(self) -> &'static str {
        match self {
            ModelKind::Simple => "simple",
            ModelKind::Koren => "koren",
            ModelKind::CohenHelie => "cohenHelie",
            ModelKind::Gardiner | ModelKind::GardinerPentode => "gardiner",
            ModelKind::ReefmanDerk | ModelKind::ReefmanDerkE => "reefman",
            ModelKind::ExtractDerkE => "extractDerkE",
        }
    }

    /// Resolve a `"device"`/`"type"` tag pair. `variant` only matters for Reefman.
    pub fn from_tags(device: DeviceType, type_tag: &str, variant: Option<&str>) -> Result<Self> {
        let kind = match (device, type_tag) {
            (DeviceType::Triode, "simple") => ModelKind::Simple,
            (DeviceType::Triode, "koren") => ModelKind::Koren,
            (DeviceType::Triode, "cohenHelie") => ModelKind::CohenHelie,
            (DeviceType::Triode, "gardiner") => ModelKind::Gardiner,
            (DeviceType::Pentode, "reefman") => match variant {
                Some("derk") => ModelKind::ReefmanDerk,
                _ => ModelKind::ReefmanDerkE,
            },
            (DeviceType::Pentode, "gardiner") => ModelKind::GardinerPentode,
            (DeviceType::Pentode, "extractDerkE") => ModelKind::ExtractDerkE,
            // Legacy files tag pentode models without a device string.
            (DeviceType::Triode, "reefman") => ModelKind::ReefmanDerkE,
            (DeviceType::Triode, "extractDerkE") => ModelKind::ExtractDerkE,
            _ => return Err(TubeError::unknown_model(device.tag(), type_tag)),
        };
        Ok(kind)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Simple => "simple",
            ModelKind::Koren => "koren",
            ModelKind::CohenHelie => "cohen-helie",
            ModelKind::Gardiner => "gardiner",
            ModelKind::ReefmanDerk => "derk",
            ModelKind::ReefmanDerkE => "derk-e",
            ModelKind::GardinerPentode => "gardiner-pentode",
            ModelKind::ExtractDerkE => "extract",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ModelKind {
    type Err = TubeError;

    fn from_str(s: &str) -> Result<Self> {
        ModelKind::ALL
            .iter()
            .copied()
            .find(|k| k.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| TubeError::unknown_model("any", s))
    }
}

/// Common contract of every tube model.
pub trait DeviceModel {
    fn kind(&self) -> ModelKind;

    /// Coefficients this family reads, in display order.
    fn parameter_ids(&self) -> &'static [ParameterId];

    /// Coefficients written to model JSON. Usually the ones it reads.
    fn json_ids(&self) -> &'static [ParameterId] {
        self.parameter_ids()
    }

    fn parameters(&self) -> &ParameterSet;

    fn parameters_mut(&mut self) -> &mut ParameterSet;

    fn fit_state(&self) -> &FitState;

    fn fit_state_mut(&mut self) -> &mut FitState;

    /// Anode current in mA. Never negative, never NaN.
    fn anode_current(&self, va: f64, vg1: f64, vg2: f64) -> f64;

    /// Screen current in mA; zero for triodes.
    fn screen_current(&self, _va: f64, _vg1: f64, _vg2: f64, _secondary_emission: bool) -> f64 {
        0.0
    }

    /// Fit the free coefficients to the recorded samples.
    fn solve(&mut self) -> FitReport;

    /// Whether the secondary-emission terms take part in evaluation.
    fn secondary_emission(&self) -> bool {
        false
    }

    fn device_type(&self) -> DeviceType {
        self.kind().device_type()
    }

    /// Record one observation. Non-finite values are dropped.
    fn add_sample(&mut self, va: f64, ia: f64, vg1: f64, vg2: f64, ig2: f64) {
        self.fit_state_mut().add(FitSample {
            va,
            vg1,
            vg2,
            ia,
            ig2,
        });
    }

    /// Forget every recorded observation and the last fit outcome.
    fn clear_samples(&mut self) {
        self.fit_state_mut().clear();
    }

    fn converged(&self) -> bool {
        self.fit_state().converged()
    }

    fn value(&self, id: ParameterId) -> f64 {
        self.parameters().get(id)
    }

    fn to_parameters(&self) -> ParameterSet {
        self.parameters().clone()
    }

    /// Copy the values this family uses out of `source`.
    fn from_parameters(&mut self, source: &ParameterSet) {
        let ids = self.parameter_ids();
        let params = self.parameters_mut();
        for &id in ids {
            params.set(id, source.get(id));
        }
    }

    /// Anode voltage at which the model draws `ia` mA.
    ///
    /// Secant search from 100 V with each step limited to a factor of 1.2.
    /// Returns [`NOT_FOUND`] when `ia` is not positive, the search leaves
    /// the physical range or the iteration budget runs out.
    fn anode_voltage(&self, ia: f64, vg1: f64, vg2: f64) -> f64 {
        if !(ia > 0.0 && ia.is_finite()) {
            return NOT_FOUND;
        }

        let mut va = 100.0;
        for _ in 0..ANODE_VOLTAGE_ITERATIONS {
            let i = self.anode_current(va, vg1, vg2);
            let err = ia - i;
            if (err / ia).abs() <= ANODE_VOLTAGE_TOLERANCE {
                return va;
            }

            let gradient = i - self.anode_current(va - 1.0, vg1, vg2);
            if gradient == 0.0 {
                va *= 2.0;
            } else {
                let next = va + err / gradient;
                va = next.clamp(va / 1.2, va * 1.2);
            }

            if !(va.is_finite() && va < ANODE_VOLTAGE_LIMIT) {
                return NOT_FOUND;
            }
        }
        NOT_FOUND
    }
}

/// Any model family.
#[derive(Debug, Clone)]
pub enum Model {
    Simple(SimpleTriode),
    Koren(KorenTriode),
    CohenHelie(CohenHelieTriode),
    Gardiner(GardinerTriode),
    Reefman(ReefmanPentode),
    GardinerPentode(GardinerPentode),
    Extract(ExtractModelPentode),
}

impl Model {
    /// A model of the given family with its default coefficients.
    pub fn new(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Simple => Model::Simple(SimpleTriode::new()),
            ModelKind::Koren => Model::Koren(KorenTriode::new()),
            ModelKind::CohenHelie => Model::CohenHelie(CohenHelieTriode::new()),
            ModelKind::Gardiner => Model::Gardiner(GardinerTriode::new()),
            ModelKind::ReefmanDerk => Model::Reefman(ReefmanPentode::new(DerkVariant::Derk)),
            ModelKind::ReefmanDerkE => Model::Reefman(ReefmanPentode::new(DerkVariant::DerkE)),
            ModelKind::GardinerPentode => Model::GardinerPentode(GardinerPentode::new()),
            ModelKind::ExtractDerkE => Model::Extract(ExtractModelPentode::new(false)),
        }
    }

    /// Build a model from its JSON object (flat tagged or nested triode form).
    pub fn from_json(value: &Value) -> Result<Self> {
        json::model_from_json(value)
    }

    /// Tagged JSON object with every coefficient of the family.
    pub fn to_json(&self) -> Value {
        model_to_json(self)
    }

    fn inner(&self) -> &dyn DeviceModel {
        match self {
            Model::Simple(m) => m,
            Model::Koren(m) => m,
            Model::CohenHelie(m) => m,
            Model::Gardiner(m) => m,
            Model::Reefman(m) => m,
            Model::GardinerPentode(m) => m,
            Model::Extract(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn DeviceModel {
        match self {
            Model::Simple(m) => m,
            Model::Koren(m) => m,
            Model::CohenHelie(m) => m,
            Model::Gardiner(m) => m,
            Model::Reefman(m) => m,
            Model::GardinerPentode(m) => m,
            Model::Extract(m) => m,
        }
    }

    /// Enable or disable secondary emission (beam-tetrode model only).
    pub fn set_secondary_emission(&mut self, enabled: bool) {
        if let Model::Extract(m) = self {
            m.set_secondary_emission(enabled);
        }
    }

    /// Retry a failed fit after perturbing the knee coefficients, where the
    /// family supports it. Returns the retry report.
    pub fn solve_with_retry(&mut self) -> FitReport {
        let report = self.solve();
        if report.converged {
            return report;
        }
        match self {
            Model::GardinerPentode(m) => {
                m.setup_retry();
                m.solve()
            }
            _ => report,
        }
    }
}

impl DeviceModel for Model {
    fn kind(&self) -> ModelKind {
        self.inner().kind()
    }

    fn parameter_ids(&self) -> &'static [ParameterId] {
        self.inner().parameter_ids()
    }

    fn json_ids(&self) -> &'static [ParameterId] {
        self.inner().json_ids()
    }

    fn parameters(&self) -> &ParameterSet {
        self.inner().parameters()
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        self.inner_mut().parameters_mut()
    }

    fn fit_state(&self) -> &FitState {
        self.inner().fit_state()
    }

    fn fit_state_mut(&mut self) -> &mut FitState {
        self.inner_mut().fit_state_mut()
    }

    fn anode_current(&self, va: f64, vg1: f64, vg2: f64) -> f64 {
        self.inner().anode_current(va, vg1, vg2)
    }

    fn screen_current(&self, va: f64, vg1: f64, vg2: f64, secondary_emission: bool) -> f64 {
        self.inner().screen_current(va, vg1, vg2, secondary_emission)
    }

    fn solve(&mut self) -> FitReport {
        self.inner_mut().solve()
    }

    fn secondary_emission(&self) -> bool {
        self.inner().secondary_emission()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kind_tags() {
        for kind in ModelKind::ALL {
            let parsed = ModelKind::from_tags(kind.device_type(), kind.type_tag(), match kind {
                ModelKind::ReefmanDerk => Some("derk"),
                _ => Some("derkE"),
            })
            .unwrap();
            assert_eq!(parsed, kind);
            assert_eq!(kind.to_string().parse::<ModelKind>().unwrap(), kind);
        }
        assert!(ModelKind::from_tags(DeviceType::Pentode, "koren", None).is_err());
        assert!("bogus".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_model_defaults_per_kind() {
        let koren = Model::new(ModelKind::Koren);
        assert_relative_eq!(koren.value(ParameterId::Kg1), 1000.0);
        assert_relative_eq!(koren.value(ParameterId::Kp), 100.0);
        assert_eq!(koren.device_type(), DeviceType::Triode);

        let extract = Model::new(ModelKind::ExtractDerkE);
        assert_eq!(extract.device_type(), DeviceType::Pentode);
    }

    #[test]
    fn test_fixed_triode_terms_match_model_flags() {
        for kind in ModelKind::ALL {
            let model = Model::new(kind);
            let kvb1_fixed = model.parameters().parameter(ParameterId::Kvb1).fixed;
            assert_eq!(kind.fixes_triode_terms(), kvb1_fixed, "{kind}");
        }
    }

    #[test]
    fn test_anode_voltage_inverts_current() {
        let mut model = Model::new(ModelKind::Koren);
        model.parameters_mut().set(ParameterId::Kg1, 1.06);
        model.parameters_mut().set(ParameterId::Kp, 600.0);
        let ia = model.anode_current(220.0, -1.0, 0.0);
        let va = model.anode_voltage(ia, -1.0, 0.0);
        let back = model.anode_current(va, -1.0, 0.0);
        assert_relative_eq!(back, ia, max_relative = 0.011);
    }

    #[test]
    fn test_anode_voltage_rejects_zero_current() {
        let model = Model::new(ModelKind::Koren);
        assert_relative_eq!(model.anode_voltage(0.0, -1.0, 0.0), NOT_FOUND);
    }

    /// A characteristic with a jump from 1.1 mA to 3.1 mA at 110 V.
    struct Stepped {
        params: ParameterSet,
        state: FitState,
    }

    impl DeviceModel for Stepped {
        fn kind(&self) -> ModelKind {
            ModelKind::Simple
        }

        fn parameter_ids(&self) -> &'static [ParameterId] {
            &[]
        }

        fn parameters(&self) -> &ParameterSet {
            &self.params
        }

        fn parameters_mut(&mut self) -> &mut ParameterSet {
            &mut self.params
        }

        fn fit_state(&self) -> &FitState {
            &self.state
        }

        fn fit_state_mut(&mut self) -> &mut FitState {
            &mut self.state
        }

        fn anode_current(&self, va: f64, _vg1: f64, _vg2: f64) -> f64 {
            if va < 110.0 {
                1.0 + 0.001 * va
            } else {
                3.0 + 0.001 * va
            }
        }

        fn solve(&mut self) -> FitReport {
            FitReport::empty()
        }
    }

    #[test]
    fn test_anode_voltage_gives_up_after_iteration_budget() {
        let model = Stepped {
            params: ParameterSet::default(),
            state: FitState::default(),
        };
        // 2 mA falls in the jump: the search bounces between 100 V and 120 V.
        assert_relative_eq!(model.anode_voltage(2.0, 0.0, 0.0), NOT_FOUND);
    }

    #[test]
    fn test_from_parameters_copies_family_values() {
        let mut source = ParameterSet::default();
        source.set(ParameterId::Mu, 42.0);
        source.set(ParameterId::Kg2, 9.0);

        let mut model = Model::new(ModelKind::Koren);
        model.from_parameters(&source);
        assert_relative_eq!(model.value(ParameterId::Mu), 42.0);
        // Koren has no Kg2, so it is left alone.
        assert_relative_eq!(model.value(ParameterId::Kg2), 0.0);
    }
}
