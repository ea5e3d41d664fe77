//! Linear interpolation along a single sweep.
//!
//! Both searches start from the origin below the target and an unbounded
//! sentinel above it, keep the closest samples on each side, and
//! interpolate between them. A target above everything the sweep reached
//! leaves the sentinel in place and yields [`NOT_FOUND`].

use crate::data::{Sample, Sweep};
use crate::models::NOT_FOUND;

const SENTINEL: (f64, f64) = (f64::INFINITY, f64::INFINITY);

fn interpolate(lower: (f64, f64), upper: (f64, f64), x: f64) -> f64 {
    let dx = upper.0 - lower.0;
    if dx == 0.0 {
        return upper.1;
    }
    let y = lower.1 + (x - lower.0) * (upper.1 - lower.1) / dx;
    if y.is_finite() {
        y
    } else {
        NOT_FOUND
    }
}

/// Anode voltage at which the sweep reaches `target_ia` mA.
pub fn find_va(sweep: &Sweep, target_ia: f64) -> f64 {
    let mut lower = (0.0, 0.0);
    let mut upper = SENTINEL;

    for s in sweep.iter() {
        if s.ia < target_ia && s.ia > lower.0 {
            lower = (s.ia, s.va);
        }
        if s.ia >= target_ia && s.ia < upper.0 {
            upper = (s.ia, s.va);
        }
    }

    if upper.0.is_infinite() {
        return NOT_FOUND;
    }
    interpolate(lower, upper, target_ia)
}

/// Anode current in mA at anode voltage `target_va`.
pub fn find_ia(sweep: &Sweep, target_va: f64) -> f64 {
    current_at(sweep, target_va, |s| s.ia)
}

/// Screen current in mA at anode voltage `target_va`.
pub fn find_ig2(sweep: &Sweep, target_va: f64) -> f64 {
    current_at(sweep, target_va, |s| s.ig2)
}

fn current_at(sweep: &Sweep, target_va: f64, current: impl Fn(&Sample) -> f64) -> f64 {
    let mut lower = (0.0, 0.0);
    let mut upper = SENTINEL;

    for s in sweep.iter() {
        if s.va < target_va && s.va > lower.0 {
            lower = (s.va, current(s));
        }
        if s.va >= target_va && s.va < upper.0 {
            upper = (s.va, current(s));
        }
    }

    if upper.0.is_infinite() {
        return NOT_FOUND;
    }
    interpolate(lower, upper, target_va)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sweep() -> Sweep {
        let mut sweep = Sweep::new(-2.0, 0.0);
        for &(va, ia) in &[(50.0, 1.0), (100.0, 4.0), (150.0, 9.0), (200.0, 16.0)] {
            sweep.push(Sample::new(va, -2.0, 0.0, ia, ia / 4.0));
        }
        sweep
    }

    #[test]
    fn test_find_va_inside() {
        let s = sweep();
        assert_relative_eq!(find_va(&s, 6.5), 125.0);
        assert_relative_eq!(find_va(&s, 4.0), 100.0);
    }

    #[test]
    fn test_find_ia_inside() {
        let s = sweep();
        assert_relative_eq!(find_ia(&s, 175.0), 12.5);
        assert_relative_eq!(find_ia(&s, 200.0), 16.0);
        assert_relative_eq!(find_ig2(&s, 175.0), 12.5 / 4.0);
    }

    #[test]
    fn test_outside_range_is_not_found() {
        let s = sweep();
        assert_relative_eq!(find_va(&s, 20.0), NOT_FOUND);
        assert_relative_eq!(find_ia(&s, 250.0), NOT_FOUND);
        assert_relative_eq!(find_va(&Sweep::default(), 1.0), NOT_FOUND);
    }

    #[test]
    fn test_high_voltage_sweep_is_reachable() {
        let mut s = Sweep::new(0.0, 0.0);
        for &(va, ia) in &[(800.0, 600.0), (1200.0, 1100.0), (1600.0, 1500.0)] {
            s.push(Sample::new(va, 0.0, 0.0, ia, 0.0));
        }
        assert_relative_eq!(find_ia(&s, 1000.0), 850.0);
        assert_relative_eq!(find_va(&s, 1300.0), 1400.0);
        assert_relative_eq!(find_ia(&s, 1700.0), NOT_FOUND);
    }

    #[test]
    fn test_below_first_sample_interpolates_from_origin() {
        let s = sweep();
        assert_relative_eq!(find_ia(&s, 25.0), 0.5);
    }
}
