//! Ornstein-Uhlenbeck Process Model
//!
//! The OU process follows: dX(t) = theta(mu - X(t))dt + sigma*dW(t)
//!
//! - theta: Mean reversion speed (higher = faster reversion)
//! - mu: Long-term equilibrium level
//! - sigma: Volatility
//!
//! Stationary distribution: N(mu, sigma^2 / (2*theta)), defined only for theta > 0.
//! Signals are measured by z = (price - mu) / sqrt(sigma^2 / (2*theta)).

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;

use crate::domain::OuError;

/// Fitted OU parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OUParameters {
    /// Mean reversion speed
    pub theta: f64,
    /// Long-run mean
    pub mu: f64,
    /// Volatility of the process
    pub sigma: f64,
    /// Sampling interval the parameters were fitted at
    pub dt: f64,
}

impl OUParameters {
    pub fn new(theta: f64, mu: f64, sigma: f64, dt: f64) -> Self {
        Self { theta, mu, sigma, dt }
    }

    /// Non-mean-reverting fit: stationary variance undefined
    pub fn is_degenerate(&self) -> bool {
        !(self.theta.is_finite() && self.theta > 0.0)
    }

    /// Fail with `DegenerateParameter` unless the parameters describe a
    /// mean-reverting process with a finite, non-negative volatility.
    pub fn ensure_mean_reverting(&self) -> Result<(), OuError> {
        if self.is_degenerate() {
            return Err(OuError::DegenerateParameter(format!(
                "theta must be positive and finite, got {}",
                self.theta
            )));
        }
        if !self.mu.is_finite() {
            return Err(OuError::DegenerateParameter(format!("mu is not finite: {}", self.mu)));
        }
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(OuError::DegenerateParameter(format!(
                "sigma must be finite and non-negative, got {}",
                self.sigma
            )));
        }
        Ok(())
    }

    /// sigma^2 / (2*theta)
    pub fn stationary_variance(&self) -> Option<f64> {
        if self.is_degenerate() {
            return None;
        }
        Some(self.sigma.powi(2) / (2.0 * self.theta))
    }

    pub fn stationary_std(&self) -> Option<f64> {
        self.stationary_variance().map(f64::sqrt)
    }

    /// ln(2) / theta
    pub fn half_life(&self) -> Option<f64> {
        if self.is_degenerate() {
            return None;
        }
        Some(LN_2 / self.theta)
    }

    /// Signed deviation from `mu` in stationary-std units.
    ///
    /// With zero volatility the deviation is either exactly zero or
    /// infinitely far out.
    pub fn z_score(&self, price: f64) -> Result<f64, OuError> {
        self.ensure_mean_reverting()?;
        let std = self.sigma / (2.0 * self.theta).sqrt();
        let deviation = price - self.mu;
        if std == 0.0 {
            return Ok(if deviation == 0.0 {
                0.0
            } else {
                f64::INFINITY.copysign(deviation)
            });
        }
        Ok(deviation / std)
    }

    /// `(mu - m*s, mu + m*s)` where s is the stationary std
    pub fn band(&self, multiplier: f64) -> Result<(f64, f64), OuError> {
        self.ensure_mean_reverting()?;
        let std = self.sigma / (2.0 * self.theta).sqrt();
        Ok((self.mu - multiplier * std, self.mu + multiplier * std))
    }
}

/// Ornstein-Uhlenbeck process model built from known or fitted parameters
#[derive(Debug, Clone)]
pub struct OUProcess {
    params: OUParameters,
}

impl OUProcess {
    pub fn new(params: OUParameters) -> Result<Self, OuError> {
        params.ensure_mean_reverting()?;
        if !params.dt.is_finite() || params.dt <= 0.0 {
            return Err(OuError::DegenerateParameter(format!(
                "dt must be positive and finite, got {}",
                params.dt
            )));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &OUParameters {
        &self.params
    }

    /// Simulate `n_steps` observations with the exact transition density:
    /// X(t+dt) = mu + (X(t) - mu) e^(-theta dt) + N(0, sigma^2 (1 - e^(-2 theta dt)) / (2 theta))
    ///
    /// Starts at `x0`, or at `mu` when `x0` is `None`.
    pub fn simulate_exact<R: Rng + ?Sized>(&self, n_steps: usize, x0: Option<f64>, rng: &mut R) -> Vec<f64> {
        let OUParameters { theta, mu, sigma, dt } = self.params;
        let decay = (-theta * dt).exp();
        let step_std = (sigma.powi(2) * (1.0 - (-2.0 * theta * dt).exp()) / (2.0 * theta)).sqrt();

        self.walk(n_steps, x0, |x| mu + (x - mu) * decay + step_std * standard_normal(rng))
    }

    /// Simulate with the Euler-Maruyama scheme:
    /// X(t+dt) = X(t) + theta (mu - X(t)) dt + sigma sqrt(dt) Z
    pub fn simulate_euler<R: Rng + ?Sized>(&self, n_steps: usize, x0: Option<f64>, rng: &mut R) -> Vec<f64> {
        let OUParameters { theta, mu, sigma, dt } = self.params;
        let sqrt_dt = dt.sqrt();

        self.walk(n_steps, x0, |x| x + theta * (mu - x) * dt + sigma * sqrt_dt * standard_normal(rng))
    }

    fn walk<F: FnMut(f64) -> f64>(&self, n_steps: usize, x0: Option<f64>, mut next: F) -> Vec<f64> {
        let mut path = Vec::with_capacity(n_steps);
        if n_steps == 0 {
            return path;
        }
        let mut x = x0.unwrap_or(self.params.mu);
        path.push(x);
        for _ in 1..n_steps {
            x = next(x);
            path.push(x);
        }
        path
    }

    /// E[X(t) | X(0) = x0] = mu + (x0 - mu) e^(-theta t)
    pub fn expected_value(&self, t: f64, x0: f64) -> f64 {
        self.params.mu + (x0 - self.params.mu) * (-self.params.theta * t).exp()
    }

    /// Var[X(t) | X(0)] = sigma^2 (1 - e^(-2 theta t)) / (2 theta)
    pub fn variance(&self, t: f64) -> f64 {
        let OUParameters { theta, sigma, .. } = self.params;
        sigma.powi(2) * (1.0 - (-2.0 * theta * t).exp()) / (2.0 * theta)
    }

    pub fn stationary_variance(&self) -> f64 {
        self.params.sigma.powi(2) / (2.0 * self.params.theta)
    }

    pub fn half_life(&self) -> f64 {
        LN_2 / self.params.theta
    }

    /// Two-sided tail mass beyond the current deviation: 1 - 2|Φ(z) - 0.5|.
    ///
    /// 1.0 at the mean, falling toward 0 as the price moves out into the tails.
    pub fn probability_reversion(&self, current_value: f64) -> f64 {
        use statrs::function::erf::erf;

        let deviation = current_value - self.params.mu;
        if deviation.abs() < 1e-10 {
            return 1.0;
        }
        let std = self.stationary_variance().sqrt();
        if std == 0.0 {
            return 0.0;
        }
        let z = deviation / std;
        let cdf = 0.5 * (1.0 + erf(z / f64::sqrt(2.0)));
        1.0 - (cdf - 0.5).abs() * 2.0
    }
}

/// Box-Muller draw from N(0, 1)
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // gen() is in [0, 1); shift to (0, 1] so ln() stays finite
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
