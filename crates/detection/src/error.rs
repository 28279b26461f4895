//! Error taxonomy for the detection core
//!
//! Deliberately narrow: bad data on the hot path degrades to safe defaults
//! and never errors. The only fallible surfaces are component construction
//! (invalid configuration is a host-side bug) and calibrator import.

use thiserror::Error;

/// Invalid configuration passed at construction time
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NonPositive { field: &'static str },

    #[error("{field} is out of range, got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },

    #[error("{field} thresholds must be strictly increasing")]
    NotIncreasing { field: &'static str },

    #[error("at least one detection strategy must be enabled")]
    NoStrategyEnabled,

    #[error("window list must not be empty")]
    NoWindows,
}

/// Malformed calibrator import payload
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to parse calibrator export: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("adjustment curve must have {expected} points, got {actual}")]
    BadCurveLength { expected: usize, actual: usize },
}
