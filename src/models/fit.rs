//! Glue between device models and the Levenberg-Marquardt engine.
//!
//! A fit copies the free coefficients out of a [`ParameterSet`] into a flat
//! vector, lets the optimizer move that vector, and writes the result back.
//! Scale coefficients (Kg1, Kg2, Kp, Kvb) travel in log space so a start
//! several decades away from the optimum still converges.

use tracing::{debug, warn};

use crate::solver::{FitConfig, FitReport, LevenbergMarquardt};

use super::parameter::{ParameterId, ParameterSet};

/// Smallest value a log-space coefficient may decode to.
const MIN_SCALE: f64 = 1e-12;

/// One fitting observation. Currents in mA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSample {
    pub va: f64,
    pub vg1: f64,
    pub vg2: f64,
    pub ia: f64,
    pub ig2: f64,
}

impl FitSample {
    pub fn is_finite(&self) -> bool {
        self.va.is_finite()
            && self.vg1.is_finite()
            && self.vg2.is_finite()
            && self.ia.is_finite()
            && self.ig2.is_finite()
    }
}

/// Samples and the last fit outcome held by every model.
#[derive(Debug, Clone, Default)]
pub struct FitState {
    samples: Vec<FitSample>,
    pub config: FitConfig,
    report: Option<FitReport>,
}

impl FitState {
    pub fn with_config(config: FitConfig) -> Self {
        Self {
            samples: Vec::new(),
            config,
            report: None,
        }
    }

    /// Record a sample. Non-finite observations are dropped.
    pub fn add(&mut self, sample: FitSample) {
        if sample.is_finite() {
            self.samples.push(sample);
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.report = None;
    }

    pub fn samples(&self) -> &[FitSample] {
        &self.samples
    }

    pub fn report(&self) -> Option<&FitReport> {
        self.report.as_ref()
    }

    pub fn set_report(&mut self, report: FitReport) {
        self.report = Some(report);
    }

    pub fn converged(&self) -> bool {
        self.report.map_or(false, |r| r.converged)
    }
}

fn encode(id: ParameterId, value: f64) -> f64 {
    if id.is_scale() {
        value.max(MIN_SCALE).ln()
    } else {
        value
    }
}

fn decode(id: ParameterId, value: f64) -> f64 {
    if id.is_scale() {
        value.exp()
    } else {
        value
    }
}

fn encode_bound(id: ParameterId, bound: f64) -> f64 {
    if !id.is_scale() {
        bound
    } else if bound <= 0.0 {
        f64::NEG_INFINITY
    } else {
        bound.ln()
    }
}

/// Fit the non-fixed ids of `free` to minimize the residuals.
///
/// `residuals` receives a trial parameter set and fills a slice of length
/// `residual_count`. On return `params` holds the best point found, clamped
/// to its bounds, whether or not the fit converged.
pub fn fit_parameters<F>(
    params: &mut ParameterSet,
    free: &[ParameterId],
    residual_count: usize,
    config: &FitConfig,
    mut residuals: F,
) -> FitReport
where
    F: FnMut(&ParameterSet, &mut [f64]),
{
    if residual_count == 0 {
        warn!("fit requested with no samples");
        return FitReport::empty();
    }
    params.clamp_all();

    let ids: Vec<ParameterId> = free
        .iter()
        .copied()
        .filter(|&id| !params.parameter(id).fixed)
        .collect();

    let mut x: Vec<f64> = ids.iter().map(|&id| encode(id, params.get(id))).collect();
    let lower: Vec<f64> = ids
        .iter()
        .map(|&id| encode_bound(id, params.parameter(id).bounds.lower))
        .collect();
    let upper: Vec<f64> = ids
        .iter()
        .map(|&id| encode_bound(id, params.parameter(id).bounds.upper))
        .collect();

    let mut trial = params.clone();
    let solver = LevenbergMarquardt::new(config.clone());
    let report = solver.minimize(&mut x, &lower, &upper, residual_count, |v, r| {
        for (&id, &value) in ids.iter().zip(v) {
            trial.set(id, decode(id, value));
        }
        residuals(&trial, r);
    });

    for (&id, &value) in ids.iter().zip(&x) {
        params.set(id, decode(id, value));
    }
    params.clamp_all();

    debug!(
        free = ids.len(),
        samples = residual_count,
        converged = report.converged,
        iterations = report.iterations,
        cost = report.final_cost,
        "parameter fit finished"
    );
    report
}

/// Fit `stages` in turn, each starting from where the previous one stopped.
///
/// The report spans every stage; convergence is that of the last.
pub fn fit_staged<F>(
    params: &mut ParameterSet,
    stages: &[&[ParameterId]],
    residual_count: usize,
    config: &FitConfig,
    mut residuals: F,
) -> FitReport
where
    F: FnMut(&ParameterSet, &mut [f64]),
{
    let mut combined: Option<FitReport> = None;
    for (stage, free) in stages.iter().enumerate() {
        let report = fit_parameters(params, free, residual_count, config, &mut residuals);
        debug!(
            stage,
            converged = report.converged,
            cost = report.final_cost,
            "fit stage finished"
        );
        combined = Some(match combined {
            None => report,
            Some(previous) => FitReport {
                converged: report.converged,
                iterations: previous.iterations + report.iterations,
                initial_cost: previous.initial_cost,
                final_cost: report.final_cost,
            },
        });
    }
    combined.unwrap_or_else(FitReport::empty)
}
