//! Ordinary least-squares line fit `y = a·x + b`.

/// Denominator below which the normal equations are treated as degenerate.
const DEGENERATE_DENOMINATOR: f64 = 1e-10;

/// Closed-form least-squares fit of a straight line.
///
/// Non-finite samples are dropped on entry. A failed solve leaves the
/// previous coefficients untouched and reports `converged() == false`.
#[derive(Debug, Clone)]
pub struct LinearSolver {
    a: f64,
    b: f64,
    samples: Vec<(f64, f64)>,
    converged: bool,
}

impl Default for LinearSolver {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl LinearSolver {
    /// Create a solver with initial coefficients.
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            a,
            b,
            samples: Vec::new(),
            converged: false,
        }
    }

    /// Record one observation.
    pub fn add_sample(&mut self, x: f64, y: f64) {
        if x.is_finite() && y.is_finite() {
            self.samples.push((x, y));
        }
    }

    /// Number of accepted samples.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Fit the line. Returns the convergence flag.
    pub fn solve(&mut self) -> bool {
        self.converged = false;

        let n = self.samples.len();
        if n < 2 {
            return false;
        }

        let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
        for &(x, y) in &self.samples {
            sx += x;
            sy += y;
            sxx += x * x;
            sxy += x * y;
        }

        let n = n as f64;
        let denom = n * sxx - sx * sx;
        if denom.abs() < DEGENERATE_DENOMINATOR || !denom.is_finite() {
            return false;
        }

        let a = (n * sxy - sx * sy) / denom;
        let b = (sy - a * sx) / n;
        if !a.is_finite() || !b.is_finite() {
            return false;
        }

        self.a = a;
        self.b = b;
        self.converged = true;
        true
    }

    /// Slope.
    pub fn a(&self) -> f64 {
        self.a
    }

    /// Intercept.
    pub fn b(&self) -> f64 {
        self.b
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}
