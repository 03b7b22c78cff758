//! Error types for the rotordynamics solver

use thiserror::Error;

/// Main error type for rotor model construction and analysis
#[derive(Error, Debug)]
pub enum RotorError {
    #[error("Invalid material '{name}': {reason}")]
    InvalidMaterial { name: String, reason: String },

    #[error("Invalid element '{element}': {reason}")]
    InvalidElement { element: String, reason: String },

    #[error("Element '{element}' references node {node}, but the model only has nodes 0..={max}")]
    NodeOutOfRange {
        element: String,
        node: usize,
        max: usize,
    },

    #[error("Diameter mismatch at node {node} between conical elements '{left}' and '{right}'")]
    DiameterMismatch {
        node: usize,
        left: String,
        right: String,
    },

    #[error("Length mismatch between elements sharing n={n}: {first} vs {second}")]
    LengthMismatch { n: usize, first: f64, second: f64 },

    #[error("Coefficient '{name}' of '{element}' has {found} values but {expected} table points")]
    CoefficientLength {
        element: String,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Value {value} is outside the coefficient table range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    #[error("Eigenvalue solve failed at speed {speed} rad/s")]
    EigenSolveFailed { speed: f64 },

    #[error("Convergence failed at step {step} after {iterations} iterations (residual {residual:e})")]
    ConvergenceFailed {
        step: usize,
        iterations: usize,
        residual: f64,
    },

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl RotorError {
    /// Shorthand for an element configuration error
    pub(crate) fn element(element: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidElement {
            element: element.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for rotor operations
pub type RotorResult<T> = Result<T, RotorError>;
