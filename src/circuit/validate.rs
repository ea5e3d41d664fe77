//! Circuit input validation.
//!
//! Circuits never fail: an input that cannot describe a working stage is
//! logged and the circuit reports all-zero outputs instead.

use tracing::warn;

/// True when `value` is finite and positive; otherwise logs the rejection.
pub fn require_positive(circuit: &str, input: &str, value: f64) -> bool {
    if value.is_finite() && value > 0.0 {
        return true;
    }
    warn!(circuit, input, value, "input must be positive, outputs cleared");
    false
}

/// True when `value` is finite and within `[low, high]`.
pub fn require_range(circuit: &str, input: &str, value: f64, low: f64, high: f64) -> bool {
    if value.is_finite() && (low..=high).contains(&value) {
        return true;
    }
    warn!(circuit, input, value, low, high, "input out of range, outputs cleared");
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_positive() {
        assert!(require_positive("test", "vb", 300.0));
        assert!(!require_positive("test", "vb", 0.0));
        assert!(!require_positive("test", "vb", -1.0));
        assert!(!require_positive("test", "vb", f64::NAN));
        assert!(!require_positive("test", "vb", f64::INFINITY));
    }

    #[test]
    fn test_require_range() {
        assert!(require_range("test", "tap", 0.5, 0.0, 1.0));
        assert!(require_range("test", "tap", 1.0, 0.0, 1.0));
        assert!(!require_range("test", "tap", 1.5, 0.0, 1.0));
    }
}
