//! Parameter Analysis
//!
//! Step-by-step derivation of the MLE fit (autocorrelation, theta, mu, sigma
//! and the stationary distribution) and a side-by-side comparison of all
//! estimation methods, optionally scored against known true parameters.

use serde::Serialize;

use crate::domain::{OuError, PriceSeries};
use crate::strategy::estimator::{estimate_all, fit_mle, EstimationMethod};
use crate::strategy::ou_process::OUParameters;

/// Absolute percentage errors against known parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterErrors {
    pub theta_pct: f64,
    pub mu_pct: f64,
    pub sigma_pct: f64,
}

impl ParameterErrors {
    pub fn between(estimated: &OUParameters, truth: &OUParameters) -> Self {
        Self {
            theta_pct: pct_error(estimated.theta, truth.theta),
            mu_pct: pct_error(estimated.mu, truth.mu),
            sigma_pct: pct_error(estimated.sigma, truth.sigma),
        }
    }
}

fn pct_error(estimated: f64, truth: f64) -> f64 {
    if truth == 0.0 {
        return if estimated == 0.0 { 0.0 } else { f64::INFINITY };
    }
    (estimated - truth).abs() / truth.abs() * 100.0
}

/// Detailed MLE derivation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterAnalysis {
    pub sample_size: usize,
    pub dt: f64,
    pub rho: f64,
    pub theta: f64,
    pub half_life: f64,
    pub mu: f64,
    pub sigma: f64,
    /// e^(-theta*dt)
    pub decay: f64,
    /// e^(-2*theta*dt)
    pub decay_squared: f64,
    pub residual_sum_squares: f64,
    pub denominator: f64,
    pub stationary_variance: f64,
    pub stationary_std: f64,
    pub errors: Option<ParameterErrors>,
}

/// Walk through the MLE fit and keep every intermediate quantity
pub fn analyze_parameters(series: &PriceSeries, truth: Option<&OUParameters>) -> Result<ParameterAnalysis, OuError> {
    let fit = fit_mle(series)?;
    let params = fit.params;

    // theta > 0 is guaranteed by a successful fit
    let stationary_variance = params.sigma.powi(2) / (2.0 * params.theta);

    Ok(ParameterAnalysis {
        sample_size: series.len(),
        dt: series.dt(),
        rho: fit.rho,
        theta: params.theta,
        half_life: std::f64::consts::LN_2 / params.theta,
        mu: params.mu,
        sigma: params.sigma,
        decay: fit.decay,
        decay_squared: fit.decay_squared,
        residual_sum_squares: fit.residual_sum_squares,
        denominator: fit.denominator,
        stationary_variance,
        stationary_std: stationary_variance.sqrt(),
        errors: truth.map(|t| ParameterErrors::between(&params, t)),
    })
}

/// One method's row in a comparison table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub method: EstimationMethod,
    pub params: Option<OUParameters>,
    pub half_life: Option<f64>,
    pub stationary_variance: Option<f64>,
    pub errors: Option<ParameterErrors>,
    /// Failure message when the method could not fit the series
    pub error: Option<String>,
}

impl ComparisonRow {
    fn from_outcome(method: EstimationMethod, outcome: Result<OUParameters, OuError>, truth: Option<&OUParameters>) -> Self {
        match outcome {
            Ok(params) => Self {
                method,
                params: Some(params),
                half_life: params.half_life(),
                stationary_variance: params.stationary_variance(),
                errors: truth.map(|t| ParameterErrors::between(&params, t)),
                error: None,
            },
            Err(e) => Self {
                method,
                params: None,
                half_life: None,
                stationary_variance: None,
                errors: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.params.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodComparison {
    pub rows: Vec<ComparisonRow>,
    pub truth: Option<OUParameters>,
}

impl MethodComparison {
    pub fn row(&self, method: EstimationMethod) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.method == method)
    }

    /// Successful method with the smallest theta error, when truth is known
    pub fn most_accurate(&self) -> Option<EstimationMethod> {
        self.rows
            .iter()
            .filter_map(|r| r.errors.map(|e| (r.method, e.theta_pct)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(method, _)| method)
    }
}

/// Run every estimation method and tabulate the results
pub fn compare_methods(series: &PriceSeries, truth: Option<&OUParameters>) -> MethodComparison {
    let rows = estimate_all(series)
        .into_iter()
        .map(|(method, outcome)| ComparisonRow::from_outcome(method, outcome, truth))
        .collect();

    MethodComparison {
        rows,
        truth: truth.copied(),
    }
}
