//! Error types for the synthesis pipeline.

use thiserror::Error;

use qfast_decompose::DecomposeError;

/// Errors produced while instantiating or recombining gates.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SynthError {
    /// Decomposition stage failed.
    #[error(transparent)]
    Decompose(#[from] DecomposeError),

    /// No native tool is registered under this name.
    #[error("unknown native tool '{name}', available: {available}")]
    UnknownTool {
        /// Requested name.
        name: String,
        /// Comma-separated registered names.
        available: String,
    },

    /// No combiner is registered under this name.
    #[error("unknown combiner '{name}', available: {available}")]
    UnknownCombiner {
        /// Requested name.
        name: String,
        /// Comma-separated registered names.
        available: String,
    },

    /// Gate is wider than the native tool accepts.
    #[error("native tool '{tool}' handles at most {maximum} qubits, gate has {gate_size}")]
    GateTooLarge {
        /// Tool name.
        tool: String,
        /// Tool limit.
        maximum: usize,
        /// Gate width.
        gate_size: usize,
    },

    /// Native tool failed on a gate.
    #[error("native tool '{tool}' failed: {message}")]
    Tool {
        /// Tool name.
        tool: String,
        /// Reason reported by the tool.
        message: String,
    },

    /// Program fragment could not be parsed.
    #[error("QASM error on line {line}: {message}")]
    Qasm {
        /// 1-based line number inside the fragment.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// Fragment addresses a qubit its location does not cover.
    #[error("fragment qubit {qubit} is outside its location {location:?}")]
    QubitOutOfLocation {
        /// Fragment-local qubit index.
        qubit: usize,
        /// Location of the fragment.
        location: Vec<usize>,
    },
}

/// Result type for synthesis operations.
pub type SynthResult<T> = Result<T, SynthError>;
