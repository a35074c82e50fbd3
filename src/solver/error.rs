//! Errors raised while building or resolving a variable graph.

use super::value::{Kind, Value};
use thiserror::Error;

/// Convenience alias for solver results.
pub type SolveResult<T> = std::result::Result<T, SolveError>;

/// Failure modes of the constraint solver.
///
/// `Unresolvable` and `CyclicDependency` are *recoverable* inside a formula:
/// they make the solver fall through to the next formula registered for the
/// same variable. Every other variant aborts the resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("Variable '{0}' cannot be resolved from the current inputs")]
    Unresolvable(String),

    #[error("Cyclic dependency: {}", .path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    #[error("Underdetermined: no formula chain resolves {}", .unresolved.join(", "))]
    Underdetermined { unresolved: Vec<String> },

    #[error("Conflicting inputs: '{variable}' is fixed to {fixed} but other inputs imply {computed}")]
    Conflicting {
        variable: String,
        fixed: Value,
        computed: Value,
    },

    #[error("Variable '{0}' is not settable")]
    NotSettable(String),

    #[error("Variable '{name}' expects a {expected} value, got {found}")]
    TypeMismatch {
        name: String,
        expected: Kind,
        found: Kind,
    },

    #[error("Formula for '{variable}' read undeclared dependency '{dependency}'")]
    UndeclaredDependency {
        variable: String,
        dependency: String,
    },

    #[error("Forbidden dependency of '{variable}': {}", .path.join(" -> "))]
    ForbiddenDependency { variable: String, path: Vec<String> },

    #[error("Variable '{0}' registered twice")]
    DuplicateVariable(String),

    #[error("Invalid value for '{variable}': {reason}")]
    InvalidValue { variable: String, reason: String },
}

impl SolveError {
    /// Whether the solver may try the next formula after this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SolveError::Unresolvable(_) | SolveError::CyclicDependency { .. }
        )
    }

    /// Shorthand for [`SolveError::InvalidValue`].
    pub fn invalid(variable: &str, reason: impl Into<String>) -> Self {
        SolveError::InvalidValue {
            variable: variable.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resolution_failures_are_recoverable() {
        assert!(SolveError::Unresolvable("width".into()).is_recoverable());
        assert!(SolveError::CyclicDependency {
            path: vec!["a".into(), "b".into(), "a".into()]
        }
        .is_recoverable());
        assert!(!SolveError::NotSettable("numRows".into()).is_recoverable());
        assert!(!SolveError::invalid("pixelHeight", "division by zero").is_recoverable());
    }

    #[test]
    fn cycle_message_lists_path() {
        let err = SolveError::CyclicDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency: a -> b -> a");
    }
}
