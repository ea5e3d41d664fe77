//! Numerical solvers.
//!
//! This module provides the numerical engine behind model fitting and
//! parameter estimation.
//!
//! ## Nonlinear least squares
//!
//! Device models are fitted by minimizing
//! ```text
//! ½ · Σ (Ia_measured − Ia_model(p))²
//! ```
//! over the free coefficients `p` with a bounded Levenberg-Marquardt
//! iteration ([`LevenbergMarquardt`]). Each iteration assembles the damped
//! normal equations into a [`DenseSystem`] and solves them by Gaussian
//! elimination with partial pivoting.
//!
//! ## Regression
//!
//! [`LinearSolver`] and [`QuadraticSolver`] are closed-form least-squares
//! fits used by the estimator to seed the nonlinear fit.

mod dense;
mod levenberg;
mod linear;
mod quadratic;

pub use dense::DenseSystem;
pub use levenberg::{FitConfig, FitReport, LevenbergMarquardt};
pub use linear::LinearSolver;
pub use quadratic::QuadraticSolver;

/// Default outer-iteration budget for a nonlinear fit.
pub const DEFAULT_FIT_ITERATIONS: usize = 200;

/// Default relative cost-reduction tolerance.
pub const DEFAULT_FUNCTION_TOLERANCE: f64 = 1e-10;

/// Default relative step tolerance.
pub const DEFAULT_PARAMETER_TOLERANCE: f64 = 1e-10;

/// Default projected-gradient tolerance.
pub const DEFAULT_GRADIENT_TOLERANCE: f64 = 1e-12;
