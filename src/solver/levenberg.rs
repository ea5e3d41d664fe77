//! Bounded Levenberg-Marquardt minimization of a sum of squared residuals.
//!
//! The optimizer owns nothing but scratch space: the caller passes an
//! explicit parameter vector together with per-entry bounds and a closure
//! that fills the residual vector for a trial point. Steps are projected
//! back into the box after every solve of the damped normal equations
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr
//! ```

use tracing::{debug, warn};

use super::dense::DenseSystem;
use super::{
    DEFAULT_FIT_ITERATIONS, DEFAULT_FUNCTION_TOLERANCE, DEFAULT_GRADIENT_TOLERANCE,
    DEFAULT_PARAMETER_TOLERANCE,
};

/// Relative forward-difference step for the numerical Jacobian.
const JACOBIAN_STEP: f64 = 1.5e-8;

/// Initial and limiting damping factors.
const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e16;

/// Cost below which the residuals are considered exactly matched.
const ABSOLUTE_COST: f64 = 1e-24;

/// Configuration for a nonlinear fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    /// Maximum outer iterations (accepted or rejected Jacobian evaluations).
    pub max_iterations: usize,
    /// Converged when a step reduces the cost by less than this fraction.
    pub function_tolerance: f64,
    /// Converged when the step norm falls below this fraction of the parameter norm.
    pub parameter_tolerance: f64,
    /// Converged when the largest projected gradient entry falls below this.
    pub gradient_tolerance: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_FIT_ITERATIONS,
            function_tolerance: DEFAULT_FUNCTION_TOLERANCE,
            parameter_tolerance: DEFAULT_PARAMETER_TOLERANCE,
            gradient_tolerance: DEFAULT_GRADIENT_TOLERANCE,
        }
    }
}

impl FitConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative cost-reduction tolerance.
    ///
    /// Looser tolerances stop earlier on noisy data:
    /// - 1e-10 (default): runs until the cost stops moving
    /// - 1e-5: enough for large pentode fits with many free coefficients
    pub fn with_function_tolerance(mut self, tolerance: f64) -> Self {
        self.function_tolerance = tolerance;
        self
    }

    /// Set the relative step-size tolerance.
    pub fn with_parameter_tolerance(mut self, tolerance: f64) -> Self {
        self.parameter_tolerance = tolerance;
        self
    }

    /// Set the projected-gradient tolerance.
    pub fn with_gradient_tolerance(mut self, tolerance: f64) -> Self {
        self.gradient_tolerance = tolerance;
        self
    }
}

/// Outcome of a nonlinear fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitReport {
    /// Whether a tolerance was met before the budget ran out.
    pub converged: bool,
    /// Outer iterations used.
    pub iterations: usize,
    /// Half the sum of squared residuals at the starting point.
    pub initial_cost: f64,
    /// Half the sum of squared residuals at the returned point.
    pub final_cost: f64,
}

impl FitReport {
    /// Report for a fit that never ran.
    pub fn empty() -> Self {
        Self {
            converged: false,
            iterations: 0,
            initial_cost: 0.0,
            final_cost: 0.0,
        }
    }
}

/// Levenberg-Marquardt solver with box constraints.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    pub config: FitConfig,
}

impl LevenbergMarquardt {
    /// Create a solver with the given configuration.
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    /// Minimize `½·Σ r(x)²` in place.
    ///
    /// `lower` and `upper` must have the same length as `x`; infinite
    /// entries leave that side open. `residual_count` fixes the length of
    /// the slice handed to `residuals`.
    pub fn minimize<F>(
        &self,
        x: &mut [f64],
        lower: &[f64],
        upper: &[f64],
        residual_count: usize,
        mut residuals: F,
    ) -> FitReport
    where
        F: FnMut(&[f64], &mut [f64]),
    {
        let n = x.len();
        let m = residual_count;
        debug_assert_eq!(lower.len(), n);
        debug_assert_eq!(upper.len(), n);

        for j in 0..n {
            x[j] = project(x[j], lower[j], upper[j]);
        }

        let mut r = vec![0.0; m];
        residuals(x, &mut r);
        let mut cost = half_sum_squares(&r);
        let initial_cost = cost;

        let finish = |converged: bool, iterations: usize, final_cost: f64| FitReport {
            converged,
            iterations,
            initial_cost,
            final_cost,
        };

        if !cost.is_finite() {
            warn!(cost, "initial residuals are not finite");
            return finish(false, 0, cost);
        }
        if n == 0 || m == 0 {
            return finish(true, 0, cost);
        }

        let mut jacobian = vec![0.0; m * n];
        let mut gradient = vec![0.0; n];
        let mut normal = vec![0.0; n * n];
        let mut trial = vec![0.0; n];
        let mut r_trial = vec![0.0; m];
        let mut system = DenseSystem::new(n);
        let mut lambda = INITIAL_DAMPING;
        let tol = &self.config;

        for iter in 0..tol.max_iterations {
            if cost <= ABSOLUTE_COST {
                debug!(iterations = iter, cost, "residuals matched exactly");
                return finish(true, iter, cost);
            }

            self.jacobian(x, upper, &r, &mut jacobian, &mut trial, &mut r_trial, &mut residuals);

            gradient.fill(0.0);
            normal.fill(0.0);
            for i in 0..m {
                let row = &jacobian[i * n..(i + 1) * n];
                for j in 0..n {
                    gradient[j] += row[j] * r[i];
                    for k in j..n {
                        normal[j * n + k] += row[j] * row[k];
                    }
                }
            }
            for j in 0..n {
                for k in 0..j {
                    normal[j * n + k] = normal[k * n + j];
                }
            }

            let projected_gradient = (0..n)
                .map(|j| {
                    let g = gradient[j];
                    let blocked = (x[j] <= lower[j] && g > 0.0) || (x[j] >= upper[j] && g < 0.0);
                    if blocked {
                        0.0
                    } else {
                        g.abs()
                    }
                })
                .fold(0.0, f64::max);
            if projected_gradient <= tol.gradient_tolerance {
                debug!(iterations = iter + 1, cost, "gradient tolerance reached");
                return finish(true, iter + 1, cost);
            }

            let x_norm = norm(x);
            loop {
                system.clear();
                for j in 0..n {
                    for k in 0..n {
                        system.set(j, k, normal[j * n + k]);
                    }
                    let diag = normal[j * n + j];
                    let scale = if diag > f64::MIN_POSITIVE { diag } else { 1.0 };
                    system.add(j, j, lambda * scale);
                    system.set_rhs(j, -gradient[j]);
                }

                if let Ok(step) = system.solve() {
                    let mut step_norm = 0.0;
                    for j in 0..n {
                        trial[j] = project(x[j] + step[j], lower[j], upper[j]);
                        step_norm += (trial[j] - x[j]).powi(2);
                    }
                    let step_norm = step_norm.sqrt();
                    let small_step = step_norm <= tol.parameter_tolerance * (x_norm + tol.parameter_tolerance);

                    residuals(&trial, &mut r_trial);
                    let trial_cost = half_sum_squares(&r_trial);

                    if trial_cost.is_finite() && trial_cost < cost {
                        let reduction = cost - trial_cost;
                        let previous = cost;
                        x.copy_from_slice(&trial);
                        r.copy_from_slice(&r_trial);
                        cost = trial_cost;
                        lambda = (lambda / 10.0).max(MIN_DAMPING);

                        if reduction <= tol.function_tolerance * previous || small_step {
                            debug!(iterations = iter + 1, cost, "fit converged");
                            return finish(true, iter + 1, cost);
                        }
                        break;
                    }

                    if small_step {
                        debug!(iterations = iter + 1, cost, "no further descent possible");
                        return finish(true, iter + 1, cost);
                    }
                }

                lambda *= 10.0;
                if lambda > MAX_DAMPING {
                    warn!(iterations = iter + 1, cost, "damping diverged");
                    return finish(false, iter + 1, cost);
                }
            }
        }

        warn!(
            iterations = tol.max_iterations,
            cost, "fit exhausted its iteration budget"
        );
        finish(false, tol.max_iterations, cost)
    }

    /// Forward-difference Jacobian, stepping inward at an upper bound.
    #[allow(clippy::too_many_arguments)]
    fn jacobian<F>(
        &self,
        x: &[f64],
        upper: &[f64],
        r: &[f64],
        jacobian: &mut [f64],
        trial: &mut [f64],
        r_trial: &mut [f64],
        residuals: &mut F,
    ) where
        F: FnMut(&[f64], &mut [f64]),
    {
        let n = x.len();
        trial.copy_from_slice(x);
        for j in 0..n {
            let mut h = JACOBIAN_STEP * x[j].abs().max(1.0);
            if x[j] + h > upper[j] {
                h = -h;
            }
            trial[j] = x[j] + h;
            residuals(trial, r_trial);
            for (i, (&rt, &r0)) in r_trial.iter().zip(r).enumerate() {
                let d = (rt - r0) / h;
                jacobian[i * n + j] = if d.is_finite() { d } else { 0.0 };
            }
            trial[j] = x[j];
        }
    }
}

fn project(value: f64, lower: f64, upper: f64) -> f64 {
    value.max(lower).min(upper)
}

fn half_sum_squares(r: &[f64]) -> f64 {
    0.5 * r.iter().map(|v| v * v).sum::<f64>()
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exponential_decay() {
        // y = 3·exp(−0.5·t)
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = t.iter().map(|t| 3.0 * (-0.5 * t).exp()).collect();

        let mut x = [1.0, 0.1];
        let lm = LevenbergMarquardt::default();
        let report = lm.minimize(
            &mut x,
            &[f64::NEG_INFINITY; 2],
            &[f64::INFINITY; 2],
            t.len(),
            |p, r| {
                for i in 0..t.len() {
                    r[i] = y[i] - p[0] * (-p[1] * t[i]).exp();
                }
            },
        );

        assert!(report.converged);
        assert!(report.final_cost < report.initial_cost);
        assert_relative_eq!(x[0], 3.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_rosenbrock() {
        let mut x = [-1.2, 1.0];
        let lm = LevenbergMarquardt::new(FitConfig::new().with_max_iterations(500));
        let report = lm.minimize(
            &mut x,
            &[f64::NEG_INFINITY; 2],
            &[f64::INFINITY; 2],
            2,
            |p, r| {
                r[0] = 10.0 * (p[1] - p[0] * p[0]);
                r[1] = 1.0 - p[0];
            },
        );

        assert!(report.converged);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bounds_are_respected() {
        // Unconstrained minimum at 5, box stops at 2.
        let mut x = [0.0];
        let lm = LevenbergMarquardt::default();
        let report = lm.minimize(&mut x, &[-1.0], &[2.0], 1, |p, r| {
            r[0] = p[0] - 5.0;
        });

        assert!(report.converged);
        assert_relative_eq!(x[0], 2.0);
    }

    #[test]
    fn test_non_finite_start() {
        let mut x = [1.0];
        let lm = LevenbergMarquardt::default();
        let report = lm.minimize(&mut x, &[f64::NEG_INFINITY], &[f64::INFINITY], 1, |_, r| {
            r[0] = f64::NAN;
        });
        assert!(!report.converged);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn test_config_builder() {
        let config = FitConfig::new()
            .with_max_iterations(800)
            .with_function_tolerance(1e-5);
        assert_eq!(config.max_iterations, 800);
        assert_relative_eq!(config.function_tolerance, 1e-5);
        assert_relative_eq!(config.parameter_tolerance, DEFAULT_PARAMETER_TOLERANCE);
    }
}
