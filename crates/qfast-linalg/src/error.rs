//! Error types for the linear-algebra crate.

use thiserror::Error;

/// Errors produced by the basis and matrix-exponential routines.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LinalgError {
    /// Matrix is not square.
    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },

    /// Matrix dimension is not a power of two.
    #[error("matrix dimension {0} is not a power of two")]
    NotPowerOfTwo(usize),

    /// Coefficient vector length is not a power of four.
    #[error("coefficient vector of length {0} is not a power of four")]
    NotPowerOfFour(usize),

    /// Operand shapes disagree.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Dimension that was supplied.
        actual: usize,
    },

    /// A qubit list is empty, has duplicates, or is out of range.
    #[error("invalid qubit list {qubits:?} for a {num_qubits}-qubit system")]
    InvalidQubits {
        /// The offending qubit indices.
        qubits: Vec<usize>,
        /// Width of the system.
        num_qubits: usize,
    },

    /// Operator expected to be Hermitian is not.
    #[error("matrix is not Hermitian (max deviation {0:e})")]
    NotHermitian(f64),

    /// Operator expected to be unitary is not.
    #[error("matrix is not unitary (max deviation {0:e})")]
    NotUnitary(f64),

    /// A factorization failed or produced a singular factor.
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),
}

/// Result type for linear-algebra operations.
pub type LinalgResult<T> = Result<T, LinalgError>;
