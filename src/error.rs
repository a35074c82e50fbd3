//! Custom error types for the crate.
//!
//! This module defines the primary error type, `ScanError`. Using the `thiserror`
//! crate, it provides a centralized and consistent way to handle the different
//! kinds of errors that can occur, from unsolvable scan parameters to invalid
//! configuration files.
//!
//! ## Error Hierarchy
//!
//! `ScanError` is an enum that consolidates various error sources:
//!
//! - **`Solve`**: Wraps [`SolveError`] from the constraint solver: missing inputs
//!   (`Underdetermined`), contradictory inputs (`Conflicting`), cycles, and
//!   formulas that produced non-physical values.
//! - **`InvalidParameter`**: A caller-supplied value failed a range check before it
//!   reached the solver (e.g. downsample outside 1..=100).
//! - **`Trajectory`** / **`Mapping`**: Waveform generation failed, either inside the
//!   generator or in the caller's device coordinate mapper.
//! - **`Image`**: Image data does not match the scan it claims to come from.
//! - **`Config`** / **`Configuration`**: Figment extraction errors and semantic
//!   validation errors in configuration files.
//! - **`Io`** / **`Serialization`**: Writing waveforms to disk.
//!
//! By using `#[from]`, `ScanError` can be created from the underlying error types,
//! simplifying error handling with the `?` operator.

use crate::solver::SolveError;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Solver error: {0}")]
    Solve(#[from] SolveError),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Trajectory error: {0}")]
    Trajectory(String),

    #[error("Device mapping failed: {0}")]
    Mapping(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScanError {
    /// Shorthand for [`ScanError::InvalidParameter`].
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        ScanError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the caller supplied too few inputs.
    pub fn is_underdetermined(&self) -> bool {
        matches!(
            self,
            ScanError::Solve(SolveError::Underdetermined { .. })
                | ScanError::Solve(SolveError::Unresolvable(_))
        )
    }
}
