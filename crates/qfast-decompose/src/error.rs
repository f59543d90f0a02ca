//! Error types for the decomposition crate.

use qfast_linalg::LinalgError;
use thiserror::Error;

/// Errors produced while building models or running a decomposition.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecomposeError {
    /// Matrix shape or Pauli-basis failure from the numerical layer.
    #[error(transparent)]
    Linalg(#[from] LinalgError),

    /// Operator fails the unitarity check.
    #[error("matrix is not unitary: deviation {deviation:e} exceeds {tolerance:e}")]
    NotUnitary {
        /// Largest entry-wise deviation of `U U†` from the identity.
        deviation: f64,
        /// Tolerance that was applied.
        tolerance: f64,
    },

    /// Location is empty, repeats a qubit or leaves the register.
    #[error("invalid location {location:?} for a {num_qubits}-qubit operator")]
    InvalidLocation {
        /// The offending qubit indices.
        location: Vec<usize>,
        /// Width of the register.
        num_qubits: usize,
    },

    /// Matrix dimension does not match its location.
    #[error("operator of dimension {dim} cannot act on location {location:?}")]
    LocationMismatch {
        /// Matrix dimension.
        dim: usize,
        /// The location it was paired with.
        location: Vec<usize>,
    },

    /// Gate size is zero or not smaller than the operator.
    #[error("gate size {gate_size} is invalid for a {num_qubits}-qubit operator")]
    InvalidGateSize {
        /// Requested gate size.
        gate_size: usize,
        /// Width of the operator.
        num_qubits: usize,
    },

    /// Topology admits no connected location of the requested size.
    #[error("no connected location of size {gate_size} exists in the coupling graph")]
    NoLocations {
        /// Requested gate size.
        gate_size: usize,
    },

    /// No model is registered under this name.
    #[error("unknown model '{name}', available: {available}")]
    UnknownModel {
        /// Requested name.
        name: String,
        /// Comma-separated registered names.
        available: String,
    },

    /// No optimizer is registered under this name.
    #[error("unknown optimizer '{name}', available: {available}")]
    UnknownOptimizer {
        /// Requested name.
        name: String,
        /// Comma-separated registered names.
        available: String,
    },

    /// Hierarchy function returned a size outside `0 < next < size`.
    #[error("hierarchy maps {size} qubits to {next}, expected 0 < next < {size}")]
    InvalidHierarchy {
        /// Gate size that was being split.
        size: usize,
        /// Size returned by the hierarchy.
        next: usize,
    },

    /// Coupling graph contains an invalid edge.
    #[error("invalid coupling graph: {0}")]
    InvalidCouplingGraph(String),

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Ill-conditioned step inside the optimizer or a factorization.
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    /// Cancellation was requested or the deadline elapsed.
    #[error("decomposition cancelled")]
    Cancelled,

    /// Malformed unitary text.
    #[error("parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// File could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Gate list (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a [`DecomposeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input operator or location.
    Validation,
    /// Bad model, optimizer, hierarchy or topology setting.
    Configuration,
    /// Singular or ill-conditioned numerics.
    NumericalDegeneracy,
    /// Stopped by a cancellation token.
    Cancelled,
    /// File system or serialization failure.
    Io,
}

impl DecomposeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecomposeError::Linalg(LinalgError::NumericalDegeneracy(_))
            | DecomposeError::NumericalDegeneracy(_) => ErrorKind::NumericalDegeneracy,
            DecomposeError::Linalg(_)
            | DecomposeError::NotUnitary { .. }
            | DecomposeError::InvalidLocation { .. }
            | DecomposeError::LocationMismatch { .. }
            | DecomposeError::Parse { .. } => ErrorKind::Validation,
            DecomposeError::InvalidGateSize { .. }
            | DecomposeError::NoLocations { .. }
            | DecomposeError::UnknownModel { .. }
            | DecomposeError::UnknownOptimizer { .. }
            | DecomposeError::InvalidHierarchy { .. }
            | DecomposeError::InvalidCouplingGraph(_)
            | DecomposeError::InvalidConfig(_) => ErrorKind::Configuration,
            DecomposeError::Cancelled => ErrorKind::Cancelled,
            DecomposeError::Io(_) | DecomposeError::Json(_) => ErrorKind::Io,
        }
    }
}

/// Result type for decomposition operations.
pub type DecomposeResult<T> = Result<T, DecomposeError>;
