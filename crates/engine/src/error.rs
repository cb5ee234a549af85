//! Error types for match engines.

use thiserror::Error;

/// Errors raised while configuring an engine or handling its geometry.
///
/// All of these are configuration-level problems: they are reported before
/// any matching work starts.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum EngineError {
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    #[error("tuple arity mismatch: expected {expected} fields, got {actual}")]
    TupleArity { expected: usize, actual: usize },

    #[error("dimension mismatch: {left}-d range combined with {right}-d range")]
    DimensionMismatch { left: usize, right: usize },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Bin(#[from] BinError),
}

/// Errors produced when turning a single tuple into bin keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BinError {
    /// The tuple has a missing or non-finite field and cannot be binned.
    #[error("tuple contains a non-finite value")]
    NonFinite,

    #[error("tuple has {actual} fields, engine expects {expected}")]
    Arity { expected: usize, actual: usize },

    /// The tuple's match radius covers more grid cells than allowed.
    #[error("tuple covers {cells} grid cells (limit {limit}); scale is too fine for the data")]
    TooManyBins { cells: u128, limit: usize },
}

/// Reject zero, negative and non-finite values for a named parameter.
pub(crate) fn check_positive(name: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{name} must be a positive finite number (got {value})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_positive_accepts_positive() {
        assert!(check_positive("scale", 0.5).is_ok());
    }

    #[test]
    fn check_positive_rejects_zero_negative_nan() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = check_positive("scale", bad).unwrap_err();
            assert!(err.to_string().contains("scale must be a positive"));
        }
    }

    #[test]
    fn bin_error_converts_into_engine_error() {
        let err: EngineError = BinError::NonFinite.into();
        assert_eq!(err, EngineError::Bin(BinError::NonFinite));
        assert_eq!(err.to_string(), "tuple contains a non-finite value");
    }

    #[test]
    fn too_many_bins_message_mentions_limit() {
        let err = BinError::TooManyBins {
            cells: 1_000_000,
            limit: 65_536,
        };
        assert!(err.to_string().contains("limit 65536"));
    }
}
