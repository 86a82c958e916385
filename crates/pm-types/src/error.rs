// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all kernel failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PmError {
    /// Parameter path is empty or malformed.
    #[error("invalid parameter path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Lookup of a path that was never registered.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// Attempt to overwrite an established input from a different source.
    #[error("parameter '{path}' is established by '{owner}' and cannot be overwritten by '{writer}'")]
    ProtectedParameter {
        path: String,
        owner: String,
        writer: String,
    },

    /// NaN/Inf reached a place that only accepts finite numbers.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// A formula returned an error from its own computation.
    #[error("formula '{formula}' failed: {message}")]
    Formula { formula: String, message: String },

    /// A formula wrote a path it did not declare as an output.
    #[error("formula '{formula}' produced undeclared output '{path}'")]
    UndeclaredOutput { formula: String, path: String },

    /// Two formulas registered with the same id.
    #[error("duplicate formula id: {0}")]
    DuplicateFormula(String),

    /// Two formulas declared the same output path.
    #[error("output '{path}' is produced by both '{first}' and '{second}'")]
    DuplicateOutput {
        path: String,
        first: String,
        second: String,
    },

    /// A formula input is neither produced upstream nor present in the registry.
    #[error("formula '{formula}' requires missing input '{path}'")]
    MissingDependency { formula: String, path: String },

    /// The formula dependency graph is not a DAG.
    #[error("dependency cycle among formulas: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// Vector/matrix shapes disagree.
    #[error("dimension mismatch: {0}")]
    Dimension(String),

    /// Covariance matrix cannot be inverted by Cholesky.
    #[error("matrix is not positive definite: {0}")]
    NotPositiveDefinite(String),

    /// Degrees of freedom would be zero or negative.
    #[error("invalid degrees of freedom: {observations} observations, {fitted} fitted parameters")]
    DegreesOfFreedom { observations: usize, fitted: usize },

    /// Reference dataset has no such key.
    #[error("reference '{key}' not found in dataset '{dataset}'")]
    UnknownReference { dataset: String, key: String },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PmError {
    fn from(e: serde_json::Error) -> Self {
        PmError::Serialization(e.to_string())
    }
}

pub type PmResult<T> = Result<T, PmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_members() {
        let e = PmError::DependencyCycle(vec!["a".into(), "b".into()]);
        assert_eq!(e.to_string(), "dependency cycle among formulas: a, b");
    }

    #[test]
    fn test_serde_error_converts() {
        let err: PmError = serde_json::from_str::<f64>("not json").unwrap_err().into();
        assert!(matches!(err, PmError::Serialization(_)));
    }
}
