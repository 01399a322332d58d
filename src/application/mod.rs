//! Application Layer - End-to-end workflows over the strategy and backtest
//!
//! - `pipeline`: validate, estimate, classify and backtest one series
//! - `analysis`: detailed MLE derivation and estimator comparison reports

pub mod analysis;
pub mod pipeline;

pub use analysis::{
    analyze_parameters, compare_methods, ComparisonRow, MethodComparison, ParameterAnalysis, ParameterErrors,
};
pub use pipeline::{MeanReversionPipeline, PipelineError, PipelineReport, Stage};
