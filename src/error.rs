use thiserror::Error;

/// Error types for the fidfit-rs library.
#[derive(Error, Debug)]
pub enum FidFitError {
    /// The dimensionality of two inputs disagrees (table vs. metadata, signal vs. metadata,
    /// parameter vector vs. layout).
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// More oscillators were requested than the signal can resolve.
    #[error("Requested {requested} oscillators, but at most {max} can be estimated from this signal")]
    OrderTooLarge { requested: usize, max: usize },

    /// A configuration that cannot be interpreted unambiguously.
    #[error("Ambiguous configuration: {0}")]
    AmbiguousConfiguration(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error for invalid parameter values.
    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    /// An oscillator index outside of the table.
    #[error("Index {index} out of range for a table of {len} oscillators")]
    IndexOutOfRange { index: usize, len: usize },

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebraError(String),

    /// Error parsing a sort key or parameter mode.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl FidFitError {
    /// Returns true for errors caused by the caller's input rather than by numerics.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, FidFitError::LinearAlgebraError(_))
    }
}

/// Result type alias for fidfit-rs operations.
pub type Result<T> = std::result::Result<T, FidFitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FidFitError::DimensionMismatch("table is 2D, expinfo is 1D".to_string());
        assert!(format!("{}", err).contains("table is 2D, expinfo is 1D"));

        let err = FidFitError::OrderTooLarge {
            requested: 40,
            max: 16,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("40"));
        assert!(msg.contains("16"));
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<f64>("not a number").unwrap_err();
        let err: FidFitError = json_err.into();

        match err {
            FidFitError::JsonError(_) => (),
            _ => panic!("Expected JsonError variant"),
        }
    }

    #[test]
    fn test_input_error_classification() {
        assert!(FidFitError::InvalidInput("x".into()).is_input_error());
        assert!(!FidFitError::LinearAlgebraError("x".into()).is_input_error());
    }
}
