//! OU Parameter Estimation
//!
//! Three independent estimators mapping a validated series to `OUParameters`:
//!
//! - `Mle`: lag-1 autocorrelation for theta, sample mean for mu, and sigma from
//!   the exact transition density with those fitted values held fixed
//! - `Regression`: AR(1) fit X(t+1) = a + b*X(t) + e, theta = -ln(b)/dt, mu = a/(1-b)
//! - `Ols`: direct fit of dX(t) = theta*(mu - X(t))*dt + e on (X(t), dX(t)) pairs.
//!   The slope beta is mapped through theta = -ln(1 + beta)/dt, which is -beta/dt
//!   to first order but stays unbiased when theta*dt is not small. Sigma is the
//!   residual std over sqrt(dt) and is only first-order accurate in theta*dt.
//!
//! Every method returns a typed error rather than a NaN or clamped value when
//! the series is not consistent with mean reversion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::{OuError, PriceSeries};
use crate::strategy::ou_process::OUParameters;

/// Minimum sum of squares for a usable regressor
const MIN_VARIANCE: f64 = 1e-12;
/// Distance from a unit root below which mu cannot be recovered
const UNIT_ROOT_TOLERANCE: f64 = 1e-10;

/// Estimation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMethod {
    Mle,
    Regression,
    Ols,
}

impl EstimationMethod {
    pub const ALL: [EstimationMethod; 3] = [
        EstimationMethod::Mle,
        EstimationMethod::Regression,
        EstimationMethod::Ols,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EstimationMethod::Mle => "MLE",
            EstimationMethod::Regression => "Regression",
            EstimationMethod::Ols => "OLS",
        }
    }
}

impl Default for EstimationMethod {
    fn default() -> Self {
        EstimationMethod::Mle
    }
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EstimationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mle" | "autocorrelation" => Ok(EstimationMethod::Mle),
            "regression" | "ar1" => Ok(EstimationMethod::Regression),
            "ols" | "differences" => Ok(EstimationMethod::Ols),
            other => Err(format!(
                "unknown estimation method '{}' (expected mle, regression or ols)",
                other
            )),
        }
    }
}

/// Per-method outcome of a batch estimation
pub type EstimationResults = BTreeMap<EstimationMethod, Result<OUParameters, OuError>>;

/// Intermediate quantities of the autocorrelation/MLE fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MleFit {
    /// Lag-1 autocorrelation
    pub rho: f64,
    /// e^(-theta*dt)
    pub decay: f64,
    /// e^(-2*theta*dt)
    pub decay_squared: f64,
    /// Sum over pairs of (X(i+1) - X(i)*e^(-theta*dt) - mu*(1 - e^(-theta*dt)))^2
    pub residual_sum_squares: f64,
    /// n * (1 - e^(-2*theta*dt))
    pub denominator: f64,
    pub params: OUParameters,
}

/// Run one estimation method
pub fn estimate(series: &PriceSeries, method: EstimationMethod) -> Result<OUParameters, OuError> {
    let params = match method {
        EstimationMethod::Mle => estimate_mle(series),
        EstimationMethod::Regression => estimate_regression(series),
        EstimationMethod::Ols => estimate_ols(series),
    }?;

    tracing::info!(
        method = %method,
        theta = params.theta,
        mu = params.mu,
        sigma = params.sigma,
        "Fitted OU parameters"
    );
    Ok(params)
}

/// Run every method on the same series. A failing method is recorded next
/// to the others instead of aborting the batch.
pub fn estimate_all(series: &PriceSeries) -> EstimationResults {
    EstimationMethod::ALL
        .iter()
        .map(|&method| {
            let result = estimate(series, method);
            if let Err(ref e) = result {
                tracing::warn!(method = %method, error = %e, "Estimation method failed");
            }
            (method, result)
        })
        .collect()
}

/// Lag-1 autocorrelation around the full-sample mean (biased estimator):
/// rho = sum (X(t) - m)(X(t+1) - m) / sum (X(t) - m)^2
pub fn lag1_autocorrelation(values: &[f64]) -> Result<f64, OuError> {
    if values.len() < 2 {
        return Err(OuError::InsufficientData {
            required: 2,
            actual: values.len(),
        });
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance_sum: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();

    if variance_sum < MIN_VARIANCE {
        return Err(OuError::NumericalInstability(
            "series has no variance; autocorrelation undefined".to_string(),
        ));
    }

    let covariance_sum: f64 = values
        .windows(2)
        .map(|w| (w[0] - mean) * (w[1] - mean))
        .sum();

    Ok(covariance_sum / variance_sum)
}

/// Autocorrelation/MLE method
pub fn estimate_mle(series: &PriceSeries) -> Result<OUParameters, OuError> {
    fit_mle(series).map(|fit| fit.params)
}

/// Autocorrelation/MLE method, keeping the intermediate terms
pub fn fit_mle(series: &PriceSeries) -> Result<MleFit, OuError> {
    series.validate()?;
    let dt = series.dt();
    let values = series.values();

    let rho = lag1_autocorrelation(values)?;
    tracing::debug!(rho, "Lag-1 autocorrelation");

    if rho <= 0.0 {
        return Err(OuError::NumericalInstability(format!(
            "lag-1 autocorrelation {:.6} <= 0: no positive serial correlation",
            rho
        )));
    }
    if rho >= 1.0 {
        return Err(OuError::NumericalInstability(format!(
            "lag-1 autocorrelation {:.6} >= 1: non-reverting fit",
            rho
        )));
    }

    let theta = -rho.ln() / dt;
    let mu = series.mean();

    let decay = (-theta * dt).exp();
    let decay_squared = (-2.0 * theta * dt).exp();
    let drift = mu * (1.0 - decay);

    let n_pairs = (values.len() - 1) as f64;
    let residual_sum_squares: f64 = series
        .pairs()
        .map(|(x, next)| (next - x * decay - drift).powi(2))
        .sum();
    let denominator = n_pairs * (1.0 - decay_squared);

    let sigma_squared = 2.0 * theta * residual_sum_squares / denominator;
    let sigma = checked_sigma(sigma_squared)?;

    Ok(MleFit {
        rho,
        decay,
        decay_squared,
        residual_sum_squares,
        denominator,
        params: OUParameters::new(theta, mu, sigma, dt),
    })
}

/// AR(1) regression method
pub fn estimate_regression(series: &PriceSeries) -> Result<OUParameters, OuError> {
    series.validate()?;
    let dt = series.dt();
    let values = series.values();

    let x = &values[..values.len() - 1];
    let y = &values[1..];
    let fit = least_squares(x, y)?;
    let (a, b) = (fit.intercept, fit.slope);
    tracing::debug!(a, b, "AR(1) regression coefficients");

    if (1.0 - b).abs() < UNIT_ROOT_TOLERANCE {
        return Err(OuError::DegenerateParameter(format!(
            "AR(1) slope {} is a unit root; mu = a / (1 - b) is unstable",
            b
        )));
    }
    if b <= 0.0 || b >= 1.0 {
        return Err(OuError::NumericalInstability(format!(
            "AR(1) slope {:.6} outside (0, 1): no positive reversion speed",
            b
        )));
    }

    let theta = -b.ln() / dt;
    let mu = a / (1.0 - b);

    // Residual variance scaled by 2*theta / (1 - e^(-2*theta*dt)), with e^(-theta*dt) = b
    let sigma_squared = fit.residual_variance * 2.0 * theta / (1.0 - b * b);
    let sigma = checked_sigma(sigma_squared)?;

    Ok(OUParameters::new(theta, mu, sigma, dt))
}

/// Least squares on the discretized SDE: dX = alpha + beta*X with
/// 1 + beta = e^(-theta*dt) and mu = -alpha / beta
pub fn estimate_ols(series: &PriceSeries) -> Result<OUParameters, OuError> {
    series.validate()?;
    let dt = series.dt();
    let values = series.values();

    let x = &values[..values.len() - 1];
    let dx: Vec<f64> = series.pairs().map(|(x, next)| next - x).collect();
    let fit = least_squares(x, &dx)?;
    let (alpha, beta) = (fit.intercept, fit.slope);
    tracing::debug!(alpha, beta, "Difference regression coefficients");

    if beta.abs() < UNIT_ROOT_TOLERANCE {
        return Err(OuError::DegenerateParameter(format!(
            "difference slope {} is zero; mu = -alpha / beta is unstable",
            beta
        )));
    }

    let decay = 1.0 + beta;
    if decay <= 0.0 || decay >= 1.0 {
        return Err(OuError::NumericalInstability(format!(
            "difference slope {:.6} outside (-1, 0): no positive reversion speed",
            beta
        )));
    }
    let theta = -decay.ln() / dt;

    let mu = -alpha / beta;
    let sigma = checked_sigma(fit.residual_variance)? / dt.sqrt();

    Ok(OUParameters::new(theta, mu, sigma, dt))
}

/// Simple linear regression y = intercept + slope * x
#[derive(Debug, Clone, Copy)]
struct LinearFit {
    intercept: f64,
    slope: f64,
    /// Mean squared residual (divides by the number of pairs)
    residual_variance: f64,
}

fn least_squares(x: &[f64], y: &[f64]) -> Result<LinearFit, OuError> {
    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;

    let sxx: f64 = x.iter().map(|xi| (xi - x_mean).powi(2)).sum();
    if sxx < MIN_VARIANCE {
        return Err(OuError::NumericalInstability(
            "regressor has no variance; slope undefined".to_string(),
        ));
    }
    let sxy: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (xi - x_mean) * (yi - y_mean))
        .sum();

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    let residual_variance = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (yi - intercept - slope * xi).powi(2))
        .sum::<f64>()
        / n;

    Ok(LinearFit {
        intercept,
        slope,
        residual_variance,
    })
}

fn checked_sigma(sigma_squared: f64) -> Result<f64, OuError> {
    if !sigma_squared.is_finite() || sigma_squared < 0.0 {
        return Err(OuError::NumericalInstability(format!(
            "volatility estimate sigma^2 = {} is not a finite non-negative value",
            sigma_squared
        )));
    }
    Ok(sigma_squared.sqrt())
}
