//! Strategy Layer - OU estimation and z-score signal classification
//!
//! - `ou_process`: OU parameters, stationary distribution and path simulation
//! - `estimator`: three interchangeable estimators (MLE, AR(1) regression, OLS on differences)
//! - `classifier`: BUY / SELL / HOLD from the stationary z-score
//! - `params`: validated strategy and backtest configuration

pub mod params;
pub mod ou_process;
pub mod estimator;
pub mod classifier;

pub use params::{StrategyConfig, ConfigError};
pub use ou_process::{OUParameters, OUProcess};
pub use estimator::{
    estimate, estimate_all, estimate_mle, estimate_ols, estimate_regression, fit_mle,
    lag1_autocorrelation, EstimationMethod, EstimationResults, MleFit,
};
pub use classifier::{classify, decide, generate_signals, signal_strength, SignalClassifier, DEFAULT_THRESHOLD};
