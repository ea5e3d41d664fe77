//! Named model coefficients.

use std::fmt;

/// Identity of every coefficient any model family uses.
///
/// The order is stable; it is the index into a [`ParameterSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterId {
    Mu,
    Kg1,
    X,
    Kp,
    Kvb,
    Kvb1,
    Vct,
    Kg2,
    Kg2a,
    A,
    Alpha,
    Beta,
    Gamma,
    Os,
    Tau,
    Rho,
    Theta,
    Psi,
    Omega,
    Lambda,
    Nu,
    S,
    Ap,
}

impl ParameterId {
    /// Every id in index order.
    pub const ALL: [ParameterId; 23] = [
        ParameterId::Mu,
        ParameterId::Kg1,
        ParameterId::X,
        ParameterId::Kp,
        ParameterId::Kvb,
        ParameterId::Kvb1,
        ParameterId::Vct,
        ParameterId::Kg2,
        ParameterId::Kg2a,
        ParameterId::A,
        ParameterId::Alpha,
        ParameterId::Beta,
        ParameterId::Gamma,
        ParameterId::Os,
        ParameterId::Tau,
        ParameterId::Rho,
        ParameterId::Theta,
        ParameterId::Psi,
        ParameterId::Omega,
        ParameterId::Lambda,
        ParameterId::Nu,
        ParameterId::S,
        ParameterId::Ap,
    ];

    /// Index into a [`ParameterSet`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            ParameterId::Mu => "Mu",
            ParameterId::Kg1 => "Kg1",
            ParameterId::X => "X",
            ParameterId::Kp => "Kp",
            ParameterId::Kvb => "Kvb",
            ParameterId::Kvb1 => "Kvb1",
            ParameterId::Vct => "Vct",
            ParameterId::Kg2 => "Kg2",
            ParameterId::Kg2a => "Kg2a",
            ParameterId::A => "A",
            ParameterId::Alpha => "Alpha",
            ParameterId::Beta => "Beta",
            ParameterId::Gamma => "Gamma",
            ParameterId::Os => "Os",
            ParameterId::Tau => "Tau",
            ParameterId::Rho => "Rho",
            ParameterId::Theta => "Theta",
            ParameterId::Psi => "Psi",
            ParameterId::Omega => "Omega",
            ParameterId::Lambda => "Lambda",
            ParameterId::Nu => "Nu",
            ParameterId::S => "S",
            ParameterId::Ap => "Ap",
        }
    }

    /// Strictly positive scale coefficients, fitted in log space.
    pub fn is_scale(self) -> bool {
        matches!(
            self,
            ParameterId::Kg1 | ParameterId::Kg2 | ParameterId::Kp | ParameterId::Kvb
        )
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Closed interval; an infinite end leaves that side open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub const UNBOUNDED: Bounds = Bounds {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };

    /// Two-sided bounds. Swapped ends are reordered.
    pub fn new(lower: f64, upper: f64) -> Self {
        if lower <= upper {
            Self { lower, upper }
        } else {
            Self {
                lower: upper,
                upper: lower,
            }
        }
    }

    pub fn at_least(lower: f64) -> Self {
        Self {
            lower,
            upper: f64::INFINITY,
        }
    }

    pub fn at_most(upper: f64) -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// A named scalar coefficient with optimization bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: ParameterId,
    pub value: f64,
    pub bounds: Bounds,
    /// Held constant during a fit.
    pub fixed: bool,
}

impl Parameter {
    pub fn new(id: ParameterId, value: f64) -> Self {
        Self {
            id,
            value,
            bounds: Bounds::UNBOUNDED,
            fixed: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.id.label()
    }
}

/// One [`Parameter`] per [`ParameterId`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            params: ParameterId::ALL
                .iter()
                .map(|&id| Parameter::new(id, 0.0))
                .collect(),
        }
    }
}

impl ParameterSet {
    /// Build a set from `(id, value)` pairs; every other id is zero.
    pub fn with_values(values: &[(ParameterId, f64)]) -> Self {
        let mut set = Self::default();
        for &(id, value) in values {
            set.set(id, value);
        }
        set
    }

    pub fn get(&self, id: ParameterId) -> f64 {
        self.params[id.index()].value
    }

    pub fn set(&mut self, id: ParameterId, value: f64) {
        self.params[id.index()].value = value;
    }

    pub fn parameter(&self, id: ParameterId) -> &Parameter {
        &self.params[id.index()]
    }

    pub fn parameter_mut(&mut self, id: ParameterId) -> &mut Parameter {
        &mut self.params[id.index()]
    }

    pub fn set_bounds(&mut self, id: ParameterId, bounds: Bounds) {
        self.params[id.index()].bounds = bounds;
    }

    pub fn set_fixed(&mut self, id: ParameterId, fixed: bool) {
        self.params[id.index()].fixed = fixed;
    }

    /// Pull every value back inside its bounds.
    pub fn clamp_all(&mut self) {
        for p in &mut self.params {
            p.value = p.bounds.clamp(p.value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_index_order() {
        for (i, id) in ParameterId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
        assert_eq!(ParameterId::Ap.index(), 22);
    }

    #[test]
    fn test_bounds_clamp() {
        let b = Bounds::new(1.0, 2.0);
        assert_relative_eq!(b.clamp(0.5), 1.0);
        assert_relative_eq!(b.clamp(3.0), 2.0);
        assert_relative_eq!(Bounds::at_least(0.1).clamp(1e9), 1e9);

        let swapped = Bounds::new(5.0, 0.0);
        assert_relative_eq!(swapped.lower, 0.0);
        assert_relative_eq!(swapped.upper, 5.0);
    }

    #[test]
    fn test_parameter_set() {
        let mut set = ParameterSet::with_values(&[(ParameterId::Mu, 100.0), (ParameterId::X, 1.4)]);
        assert_relative_eq!(set.get(ParameterId::Mu), 100.0);
        assert_relative_eq!(set.get(ParameterId::Kg2), 0.0);

        set.set_bounds(ParameterId::X, Bounds::new(1.0, 1.2));
        set.clamp_all();
        assert_relative_eq!(set.get(ParameterId::X), 1.2);
        assert_eq!(set.parameter(ParameterId::X).name(), "X");
    }
}
