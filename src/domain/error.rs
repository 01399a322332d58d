use thiserror::Error;

/// Failures raised while validating a series, fitting parameters,
/// classifying prices or running a backtest.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OuError {
    #[error("Insufficient data: requires at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Non-finite value {value} at index {index}")]
    NonFiniteValue { index: usize, value: f64 },

    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error("Degenerate parameters: {0}")]
    DegenerateParameter(String),
}

impl OuError {
    /// Short machine-friendly tag, used by reports and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            OuError::InsufficientData { .. } => "insufficient_data",
            OuError::NonFiniteValue { .. } => "non_finite_value",
            OuError::NumericalInstability(_) => "numerical_instability",
            OuError::DegenerateParameter(_) => "degenerate_parameter",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OuError::InsufficientData { required: 3, actual: 2 };
        assert_eq!(
            err.to_string(),
            "Insufficient data: requires at least 3 observations, got 2"
        );

        let err = OuError::NonFiniteValue { index: 4, value: f64::INFINITY };
        assert!(err.to_string().contains("index 4"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            OuError::NumericalInstability("rho <= 0".into()).kind(),
            "numerical_instability"
        );
        assert_eq!(
            OuError::DegenerateParameter("theta <= 0".into()).kind(),
            "degenerate_parameter"
        );
    }
}
