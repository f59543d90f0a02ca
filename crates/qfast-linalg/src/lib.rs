//! `qfast-linalg`: numerical kernels for hierarchical unitary decomposition.
//!
//! Provides the pure-math layer the decomposer is built on:
//!
//! - **Pauli basis**: memoized tensor-product bases, projections onto qubit
//!   subsets, Pauli expansion of Hermitian operators and its inverse
//! - **Permutations**: matrices relocating an operator onto arbitrary qubits
//! - **Matrix exponential**: Padé scaling-and-squaring with analytic
//!   directional derivatives for a batch of tangents
//! - **Helpers**: unitarity checks, nearest unitary, Hilbert-Schmidt distance
//!
//! # Quick start
//!
//! ```rust
//! use qfast_linalg::{is_unitary, unitary_from_pauli_coefs};
//!
//! // exp(i (0.3 X⊗I + 0.2 Z⊗Z))
//! let mut alpha = vec![0.0; 16];
//! alpha[4] = 0.3;
//! alpha[15] = 0.2;
//! let u = unitary_from_pauli_coefs(&alpha).unwrap();
//! assert!(is_unitary(&u, 1e-14));
//! ```

pub mod error;
pub mod expm;
pub mod matrix;
pub mod pauli;
pub mod perm;

pub use error::{LinalgError, LinalgResult};
pub use expm::{dexpm, dexpmv, expm};
pub use matrix::{
    CMatrix, closest_unitary, hilbert_schmidt_distance, identity, inf_norm, is_hermitian,
    is_unitary, kron, max_abs_diff, qubit_count, qubits_for_dim, trace_of_product,
    unitarity_deviation,
};
pub use pauli::{
    PauliBasis, PauliOp, log_no_i, norder_paulis, pauli_expansion, pauli_projection, pauli_string,
    pauli_sum, unitary_from_pauli_coefs,
};
pub use perm::{embed_operator, permutation_matrix, swap_bit};

pub use num_complex::Complex64;
