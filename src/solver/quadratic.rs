//! Least-squares parabola fit `y = a·x² + b·x + c`.
//!
//! The residual is linear in all three coefficients, so the fit is a direct
//! solve of the 3x3 normal equations by Cramer's rule. With `fixed_a` set the
//! quadratic coefficient is held at its current value and only `b` and `c`
//! are fitted against `y − a·x²`.

/// Determinant below which the normal equations are treated as singular.
const SINGULAR_DETERMINANT: f64 = 1e-10;

/// Closed-form least-squares fit of a parabola.
#[derive(Debug, Clone)]
pub struct QuadraticSolver {
    a: f64,
    b: f64,
    c: f64,
    samples: Vec<(f64, f64)>,
    fixed_a: bool,
    require_positive: bool,
    converged: bool,
}

impl Default for QuadraticSolver {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

impl QuadraticSolver {
    /// Create a solver with initial coefficients.
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self {
            a,
            b,
            c,
            samples: Vec::new(),
            fixed_a: false,
            require_positive: false,
            converged: false,
        }
    }

    /// Hold `a` at its current value during the fit.
    pub fn with_fixed_a(mut self, fixed: bool) -> Self {
        self.fixed_a = fixed;
        self
    }

    /// Clamp `b` and `c` to be non-negative after the fit.
    pub fn with_require_positive(mut self, positive: bool) -> Self {
        self.require_positive = positive;
        self
    }

    /// Record one observation.
    pub fn add_sample(&mut self, x: f64, y: f64) {
        if x.is_finite() && y.is_finite() {
            self.samples.push((x, y));
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Fit the parabola. Returns the convergence flag.
    pub fn solve(&mut self) -> bool {
        self.converged = false;
        if self.samples.len() < 3 {
            return false;
        }

        let solved = if self.fixed_a {
            self.solve_fixed_a()
        } else {
            self.solve_full()
        };

        let Some((a, b, c)) = solved else {
            return false;
        };
        if !(a.is_finite() && b.is_finite() && c.is_finite()) {
            return false;
        }

        self.a = a;
        if self.require_positive {
            self.b = b.max(0.0);
            self.c = c.max(0.0);
        } else {
            self.b = b;
            self.c = c;
        }
        self.converged = true;
        true
    }

    fn solve_fixed_a(&self) -> Option<(f64, f64, f64)> {
        let n = self.samples.len() as f64;
        let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
        for &(x, y) in &self.samples {
            let r = y - self.a * x * x;
            sx += x;
            sy += r;
            sxx += x * x;
            sxy += x * r;
        }

        let denom = n * sxx - sx * sx;
        if denom.abs() < SINGULAR_DETERMINANT {
            return None;
        }
        let b = (n * sxy - sx * sy) / denom;
        let c = (sy - b * sx) / n;
        Some((self.a, b, c))
    }

    fn solve_full(&self) -> Option<(f64, f64, f64)> {
        let n = self.samples.len() as f64;
        let (mut sx, mut sx2, mut sx3, mut sx4) = (0.0, 0.0, 0.0, 0.0);
        let (mut sy, mut sxy, mut sx2y) = (0.0, 0.0, 0.0);
        for &(x, y) in &self.samples {
            let x2 = x * x;
            sx += x;
            sx2 += x2;
            sx3 += x2 * x;
            sx4 += x2 * x2;
            sy += y;
            sxy += x * y;
            sx2y += x2 * y;
        }

        // | sx4 sx3 sx2 | |a|   | sx2y |
        // | sx3 sx2 sx  | |b| = | sxy  |
        // | sx2 sx  n   | |c|   | sy   |
        let det = sx4 * (sx2 * n - sx * sx) - sx3 * (sx3 * n - sx * sx2)
            + sx2 * (sx3 * sx - sx2 * sx2);
        if det.abs() < SINGULAR_DETERMINANT {
            return None;
        }

        let det_a = sx2y * (sx2 * n - sx * sx) - sx3 * (sxy * n - sx * sy)
            + sx2 * (sxy * sx - sx2 * sy);
        let det_b = sx4 * (sxy * n - sy * sx) - sx2y * (sx3 * n - sx2 * sx)
            + sx2 * (sx3 * sy - sx2 * sxy);
        let det_c = sx4 * (sx2 * sy - sx * sxy) - sx3 * (sx3 * sy - sx2 * sxy)
            + sx2y * (sx3 * sx - sx2 * sx2);

        Some((det_a / det, det_b / det, det_c / det))
    }

    pub fn a(&self) -> f64 {
        self.a
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    pub fn c(&self) -> f64 {
        self.c
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_parabola() {
        let mut solver = QuadraticSolver::default();
        for i in -5..=5 {
            let x = i as f64;
            solver.add_sample(x, x * x - 3.0 * x + 2.0);
        }
        assert!(solver.solve());
        assert_relative_eq!(solver.a(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(solver.b(), -3.0, epsilon = 1e-9);
        assert_relative_eq!(solver.c(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fixed_a() {
        let mut solver = QuadraticSolver::new(1.0, 0.0, 0.0).with_fixed_a(true);
        for i in 0..8 {
            let x = 10.0 * i as f64;
            solver.add_sample(x, x * x + 30.0 * x + 300.0);
        }
        assert!(solver.solve());
        assert_relative_eq!(solver.a(), 1.0);
        assert_relative_eq!(solver.b(), 30.0, epsilon = 1e-6);
        assert_relative_eq!(solver.c(), 300.0, epsilon = 1e-6);
    }

    #[test]
    fn test_require_positive_clamps() {
        let mut solver = QuadraticSolver::new(1.0, 0.0, 0.0)
            .with_fixed_a(true)
            .with_require_positive(true);
        for i in 0..6 {
            let x = i as f64;
            solver.add_sample(x, x * x - 2.0 * x - 5.0);
        }
        assert!(solver.solve());
        assert_relative_eq!(solver.b(), 0.0);
        assert_relative_eq!(solver.c(), 0.0);
    }

    #[test]
    fn test_insufficient_samples() {
        let mut solver = QuadraticSolver::new(2.0, 3.0, 4.0);
        solver.add_sample(1.0, 1.0);
        solver.add_sample(2.0, 4.0);
        assert!(!solver.solve());
        assert_relative_eq!(solver.a(), 2.0);
        assert_relative_eq!(solver.b(), 3.0);
        assert_relative_eq!(solver.c(), 4.0);
    }

    #[test]
    fn test_collinear_x_is_singular() {
        let mut solver = QuadraticSolver::default();
        for y in [1.0, 2.0, 3.0, 4.0] {
            solver.add_sample(5.0, y);
        }
        assert!(!solver.solve());
        assert!(!solver.converged());
    }
}
